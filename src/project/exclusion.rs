use std::collections::HashMap;

use crate::project::uri;

/// Filesystem URI → graft points that no longer inherit it.
///
/// Exclusion is always relative to a graft point: the same URI may be
/// excluded below one graft and still inherited below another. The last
/// known size of each excluded URI is kept alongside, since its parent
/// directory may not be explored.
#[derive(Debug, Default, Clone)]
pub struct ExclusionSet {
    excluded: HashMap<String, Vec<String>>,
    sizes: HashMap<String, i64>,
}

impl ExclusionSet {
    /// Returns false when `uri` was already excluded at `graft`.
    pub fn exclude(&mut self, graft: &str, uri: &str) -> bool {
        let grafts = self.excluded.entry(uri.to_string()).or_default();
        if grafts.iter().any(|existing| existing == graft) {
            return false;
        }
        grafts.push(graft.to_string());
        true
    }

    /// Returns false when `uri` was not excluded at `graft`.
    pub fn restore(&mut self, graft: &str, uri: &str) -> bool {
        let Some(grafts) = self.excluded.get_mut(uri) else {
            return false;
        };
        let before = grafts.len();
        grafts.retain(|existing| existing != graft);
        let removed = grafts.len() != before;
        if grafts.is_empty() {
            self.excluded.remove(uri);
        }
        if !self.excluded.contains_key(uri) {
            self.sizes.remove(uri);
        }
        removed
    }

    /// Remembers the size of an excluded `uri`; ignored when nothing excludes it.
    pub fn record_size(&mut self, uri: &str, sectors: i64) {
        if self.excluded.contains_key(uri) {
            self.sizes.insert(uri.to_string(), sectors.max(0));
        }
    }

    pub fn size_of(&self, uri: &str) -> Option<i64> {
        self.sizes.get(uri).copied()
    }

    pub fn is_excluded_at(&self, uri: &str, graft: &str) -> bool {
        self.excluded
            .get(uri)
            .is_some_and(|grafts| grafts.iter().any(|existing| existing == graft))
    }

    pub fn excluding(&self, uri: &str) -> &[String] {
        self.excluded.get(uri).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Drops every exclusion keyed to `graft` and returns the URIs it released.
    pub fn forget_graft(&mut self, graft: &str) -> Vec<String> {
        let released = self
            .excluded
            .iter()
            .filter(|(_, grafts)| grafts.iter().any(|existing| existing == graft))
            .map(|(uri, _)| uri.clone())
            .collect::<Vec<_>>();
        for uri in &released {
            self.restore(graft, uri);
        }
        released
    }

    /// Re-keys exclusions held by graft points at or below `old_path`.
    pub fn rename_grafts(&mut self, old_path: &str, new_path: &str) {
        for grafts in self.excluded.values_mut() {
            for graft in grafts.iter_mut() {
                if let Some(moved) = uri::rebase(graft, old_path, new_path) {
                    *graft = moved;
                }
            }
        }
    }

    /// Drops every exclusion of URIs at or below `uri`.
    pub fn remove_under(&mut self, uri: &str) {
        self.excluded
            .retain(|candidate, _| !uri::is_ancestor_or_self(uri, candidate));
        self.sizes
            .retain(|candidate, _| !uri::is_ancestor_or_self(uri, candidate));
    }

    pub fn relabel_uris(&mut self, old_uri: &str, new_uri: &str) {
        let moved = self
            .excluded
            .keys()
            .filter(|key| uri::is_ancestor_or_self(old_uri, key))
            .cloned()
            .collect::<Vec<_>>();
        for key in moved {
            if let (Some(grafts), Some(new_key)) =
                (self.excluded.remove(&key), uri::rebase(&key, old_uri, new_uri))
            {
                if let Some(sectors) = self.sizes.remove(&key) {
                    self.sizes.insert(new_key.clone(), sectors);
                }
                self.excluded.entry(new_key).or_default().extend(grafts);
            }
        }
    }

    pub fn uris(&self) -> impl Iterator<Item = &str> {
        self.excluded.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.excluded
            .iter()
            .map(|(uri, grafts)| (uri.as_str(), grafts.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.excluded.is_empty()
    }

    pub fn clear(&mut self) {
        self.excluded.clear();
        self.sizes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exclusions_are_kept_per_graft() {
        let mut set = ExclusionSet::default();
        assert!(set.exclude("/one", "file:///d/f"));
        assert!(!set.exclude("/one", "file:///d/f"));
        assert!(set.exclude("/two", "file:///d/f"));

        assert!(set.is_excluded_at("file:///d/f", "/one"));
        assert!(set.restore("/one", "file:///d/f"));
        assert!(!set.is_excluded_at("file:///d/f", "/one"));
        assert!(set.is_excluded_at("file:///d/f", "/two"));
        assert!(!set.restore("/one", "file:///d/f"));
    }

    #[test]
    fn forgetting_a_graft_releases_its_uris() {
        let mut set = ExclusionSet::default();
        set.exclude("/one", "file:///d/a");
        set.exclude("/one", "file:///d/b");
        set.exclude("/two", "file:///d/b");

        let mut released = set.forget_graft("/one");
        released.sort();
        assert_eq!(released, vec!["file:///d/a", "file:///d/b"]);
        assert_eq!(set.excluding("file:///d/b"), ["/two"]);
        assert!(set.excluding("file:///d/a").is_empty());
    }

    #[test]
    fn renaming_a_graft_rekeys_its_exclusions() {
        let mut set = ExclusionSet::default();
        set.exclude("/old", "file:///d/a");
        set.exclude("/old/inner", "file:///d/b");
        set.rename_grafts("/old", "/new");

        assert!(set.is_excluded_at("file:///d/a", "/new"));
        assert!(set.is_excluded_at("file:///d/b", "/new/inner"));
    }

    #[test]
    fn sizes_follow_their_exclusions() {
        let mut set = ExclusionSet::default();
        set.record_size("file:///d/a", 4);
        assert_eq!(set.size_of("file:///d/a"), None);

        set.exclude("/g", "file:///d/a");
        set.record_size("file:///d/a", 4);
        set.relabel_uris("file:///d", "file:///e");
        assert_eq!(set.size_of("file:///e/a"), Some(4));

        set.restore("/g", "file:///e/a");
        assert_eq!(set.size_of("file:///e/a"), None);
    }

    #[test]
    fn removing_a_subtree_drops_nested_uris() {
        let mut set = ExclusionSet::default();
        set.exclude("/g", "file:///d/sub/a");
        set.exclude("/g", "file:///d/other");
        set.remove_under("file:///d/sub");
        assert_eq!(set.uris().collect::<Vec<_>>(), vec!["file:///d/other"]);
    }
}
