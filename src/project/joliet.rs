//! Bookkeeping for names that do not fit the Joliet limit.
//!
//! Names longer than [`JOLIET_MAX_NAME`] bytes are grouped by their parent
//! and their truncated name. Only at export time do groups get
//! collision-free short names.

use std::collections::{HashMap, HashSet};

use hashlink::LinkedHashMap;

use crate::project::uri;

pub const JOLIET_MAX_NAME: usize = 64;

/// Longest extension, dot included, kept intact when shortening a name.
const MAX_KEPT_EXTENSION: usize = 4;

/// Longest prefix of `name` of at most `max` bytes ending on a char boundary.
fn truncate(name: &str, max: usize) -> &str {
    if name.len() <= max {
        return name;
    }
    let mut end = max;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(dot) if dot > 0 && name.len() - dot <= MAX_KEPT_EXTENSION => name.split_at(dot),
        _ => (name, ""),
    }
}

/// Shortens `name` to the Joliet limit with `suffix` placed before a short extension.
pub fn shorten(name: &str, suffix: &str) -> String {
    let (stem, extension) = split_extension(name);
    let budget = JOLIET_MAX_NAME.saturating_sub(extension.len() + suffix.len());
    format!("{}{}{}", truncate(stem, budget), suffix, extension)
}

fn key_for(path: &str) -> Option<String> {
    let name = uri::basename(path);
    if !is_incompatible(name) {
        return None;
    }
    let parent = uri::parent(path)?;
    Some(uri::join(parent, truncate(name, JOLIET_MAX_NAME)))
}

/// Whether `name` is too long for a Joliet directory record.
pub fn is_incompatible(name: &str) -> bool {
    name.len() > JOLIET_MAX_NAME
}

#[derive(Debug, Default, Clone)]
pub struct JolietIndex {
    groups: LinkedHashMap<String, Vec<String>>,
}

impl JolietIndex {
    /// Registers a virtual path; returns false when its name fits or it is already known.
    pub fn register(&mut self, path: &str) -> bool {
        let Some(key) = key_for(path) else {
            return false;
        };
        let group = self.groups.entry(key).or_insert_with(Vec::new);
        if group.iter().any(|known| known == path) {
            return false;
        }
        group.push(path.to_string());
        true
    }

    pub fn unregister(&mut self, path: &str) {
        let Some(key) = key_for(path) else {
            return;
        };
        if let Some(group) = self.groups.get_mut(&key) {
            group.retain(|known| known != path);
            if group.is_empty() {
                self.groups.remove(&key);
            }
        }
    }

    /// Drops every path at or below `path`.
    pub fn unregister_under(&mut self, path: &str) {
        let stale = self
            .paths()
            .filter(|known| uri::is_ancestor_or_self(path, known))
            .map(str::to_string)
            .collect::<Vec<_>>();
        for known in stale {
            self.unregister(&known);
        }
    }

    /// Follows a rename of `old_path` (and everything below it) to `new_path`.
    pub fn rename_prefix(&mut self, old_path: &str, new_path: &str) {
        let moved = self
            .paths()
            .filter(|known| uri::is_ancestor_or_self(old_path, known))
            .map(str::to_string)
            .collect::<Vec<_>>();
        for known in moved {
            self.unregister(&known);
            if let Some(renamed) = uri::rebase(&known, old_path, new_path) {
                self.register(&renamed);
            }
        }
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.groups.values().flatten().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn clear(&mut self) {
        self.groups.clear();
    }

    /// Full virtual path → Joliet-compatible virtual path, for every registered path.
    ///
    /// Paths sharing a truncated name get numbered suffixes in registration
    /// order, so the same sequence of registrations always yields the same names.
    /// `occupied` tells whether a virtual path is already taken by a name that
    /// fits; shortened names never land on one.
    pub fn disambiguate(&self, occupied: impl Fn(&str) -> bool) -> Vec<(String, String)> {
        let mut groups = self.groups.iter().collect::<Vec<_>>();
        groups.sort_by_key(|(key, _)| key.matches('/').count());

        let mut renamed: HashMap<String, String> = HashMap::new();
        let mut taken: HashSet<String> = HashSet::new();
        let mut result = Vec::with_capacity(self.len());

        for (_, paths) in groups {
            let mut counter = 1usize;
            for path in paths {
                let Some(original_parent) = uri::parent(path) else {
                    continue;
                };
                let parent = Self::renamed_parent(&renamed, original_parent);
                let name = uri::basename(path);

                let mut short = if paths.len() == 1 {
                    Some(shorten(name, ""))
                } else {
                    None
                };
                let candidate = loop {
                    if let Some(short) = &short {
                        let candidate = uri::join(&parent, short);
                        if !occupied(&uri::join(original_parent, short))
                            && taken.insert(candidate.clone())
                        {
                            break candidate;
                        }
                    }
                    short = Some(shorten(name, &counter.to_string()));
                    counter += 1;
                };

                renamed.insert(path.clone(), candidate.clone());
                result.push((path.clone(), candidate));
            }
        }
        result
    }

    fn renamed_parent(renamed: &HashMap<String, String>, parent: &str) -> String {
        std::iter::once(parent)
            .chain(uri::ancestors(parent))
            .find_map(|ancestor| {
                renamed
                    .get(ancestor)
                    .and_then(|short| uri::rebase(parent, ancestor, short))
            })
            .unwrap_or_else(|| parent.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn long_name(extension: &str) -> String {
        format!("{}{}", "verylongname".repeat(6), extension)
    }

    #[test]
    fn short_names_are_not_registered() {
        let mut index = JolietIndex::default();
        assert!(!index.register("/dir/short.txt"));
        assert!(index.is_empty());
    }

    #[test]
    fn colliding_names_get_distinct_suffixed_names() {
        let name = long_name(".txt");
        assert!(name.len() > JOLIET_MAX_NAME);
        let first = format!("/docs/{name}");
        let second = format!("/docs/{}", name.replace(".txt", "-copy.txt"));

        let mut index = JolietIndex::default();
        assert!(index.register(&first));
        assert!(index.register(&second));

        let names = index.disambiguate(|_| false);
        assert_eq!(names.len(), 2);
        let (a, b) = (&names[0].1, &names[1].1);
        assert_ne!(a, b);
        for (_, short) in &names {
            let base = uri::basename(short);
            assert!(base.len() <= JOLIET_MAX_NAME, "{base} is too long");
            assert!(base.ends_with(".txt"));
        }
        assert!(uri::basename(a).ends_with("1.txt"));
        assert!(uri::basename(b).ends_with("2.txt"));
    }

    #[test]
    fn shortened_names_avoid_siblings_that_fit() {
        let long = format!("/j/{}.txt", "x".repeat(70));
        let sibling = format!("/j/{}.txt", "x".repeat(60));
        let mut index = JolietIndex::default();
        index.register(&long);
        assert!(!index.register(&sibling));

        let names = index.disambiguate(|path| path == sibling);
        assert_eq!(names.len(), 1);
        let short = &names[0].1;
        assert_ne!(short, &sibling);
        assert!(uri::basename(short).len() <= JOLIET_MAX_NAME);
        assert!(short.ends_with("1.txt"));
    }

    #[test]
    fn disambiguation_is_deterministic() {
        let name = long_name(".txt");
        let paths = [format!("/d/{name}"), format!("/d/{name}.bak")];
        let run = || {
            let mut index = JolietIndex::default();
            for path in &paths {
                index.register(path);
            }
            index.disambiguate(|_| false)
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn long_extensions_are_not_preserved() {
        let name = format!("{}.extension", "x".repeat(70));
        let short = shorten(&name, "3");
        assert_eq!(short.len(), JOLIET_MAX_NAME);
        assert!(short.ends_with('3'));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let name = "é".repeat(40);
        let short = shorten(&name, "");
        assert!(short.len() <= JOLIET_MAX_NAME);
        assert!(short.chars().all(|c| c == 'é'));
    }

    #[test]
    fn nested_long_names_use_the_shortened_parent() {
        let outer = format!("/{}", long_name(""));
        let inner = format!("{outer}/{}", long_name(".ogg"));
        let mut index = JolietIndex::default();
        index.register(&outer);
        index.register(&inner);

        let names = index.disambiguate(|_| false).into_iter().collect::<HashMap<_, _>>();
        let short_outer = &names[&outer];
        assert!(names[&inner].starts_with(short_outer.as_str()));
    }

    #[test]
    fn renames_rekey_the_index() {
        let name = long_name(".txt");
        let mut index = JolietIndex::default();
        index.register(&format!("/old/{name}"));
        index.rename_prefix("/old", "/new");
        assert_eq!(index.paths().collect::<Vec<_>>(), vec![format!("/new/{name}")]);

        index.unregister_under("/new");
        assert!(index.is_empty());
    }
}
