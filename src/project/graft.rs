use std::collections::HashMap;

use bincode::{Decode, Encode};
use hashlink::LinkedHashMap;

use crate::project::uri;

/// What a graft point puts at its virtual path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Encode, Decode)]
pub enum GraftTarget {
    Filesystem(String),
    /// An empty folder created by the user, with no filesystem backing.
    Created,
    /// A file or folder belonging to a previously burnt session.
    Imported,
}

impl GraftTarget {
    pub fn uri(&self) -> Option<&str> {
        match self {
            GraftTarget::Filesystem(uri) => Some(uri),
            GraftTarget::Created | GraftTarget::Imported => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct GraftPoint {
    pub path: String,
    pub target: GraftTarget,
}

/// Virtual path → target mapping plus its inverse for filesystem targets.
///
/// Insertion order is kept so exported graft lists are stable.
#[derive(Debug, Default, Clone)]
pub struct GraftTable {
    paths: LinkedHashMap<String, GraftTarget>,
    grafts: HashMap<String, Vec<String>>,
}

impl GraftTable {
    /// Returns false when `path` already has a graft point.
    pub fn add(&mut self, target: GraftTarget, path: &str) -> bool {
        if self.paths.contains_key(path) {
            return false;
        }
        if let Some(uri) = target.uri() {
            self.grafts
                .entry(uri.to_string())
                .or_default()
                .push(path.to_string());
        }
        self.paths.insert(path.to_string(), target);
        true
    }

    pub fn remove(&mut self, path: &str) -> Option<GraftTarget> {
        let target = self.paths.remove(path)?;
        if let Some(uri) = target.uri() {
            if let Some(list) = self.grafts.get_mut(uri) {
                list.retain(|graft| graft != path);
                if list.is_empty() {
                    self.grafts.remove(uri);
                }
            }
        }
        Some(target)
    }

    pub fn target(&self, path: &str) -> Option<&GraftTarget> {
        self.paths.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains_key(path)
    }

    pub fn grafts_of(&self, uri: &str) -> &[String] {
        self.grafts.get(uri).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_grafts(&self, uri: &str) -> bool {
        self.grafts.contains_key(uri)
    }

    /// Nearest graft point at or above `path`.
    pub fn resolve<'a>(&self, path: &'a str) -> Option<&'a str> {
        std::iter::once(path)
            .chain(uri::ancestors(path))
            .find(|candidate| self.paths.contains_key(*candidate))
    }

    /// Graft points strictly below `path`, deepest first.
    pub fn descendants(&self, path: &str) -> Vec<String> {
        let mut below = self
            .paths
            .keys()
            .filter(|graft| uri::is_strict_ancestor(path, graft))
            .cloned()
            .collect::<Vec<_>>();
        below.sort_by_key(|graft| std::cmp::Reverse(graft.matches('/').count()));
        below
    }

    /// Filesystem URIs with graft points located at or below `uri`.
    pub fn uris_under(&self, uri: &str) -> Vec<String> {
        self.grafts
            .keys()
            .filter(|candidate| uri::is_ancestor_or_self(uri, candidate))
            .cloned()
            .collect()
    }

    /// Moves a graft point to another virtual path, keeping its target.
    pub fn relocate(&mut self, old_path: &str, new_path: &str) -> bool {
        if self.paths.contains_key(new_path) {
            return false;
        }
        match self.remove(old_path) {
            Some(target) => self.add(target, new_path),
            None => false,
        }
    }

    /// Points every filesystem graft at or below `old_uri` to the matching URI below `new_uri`.
    pub fn relabel_uris(&mut self, old_uri: &str, new_uri: &str) {
        for (_, target) in self.paths.iter_mut() {
            if let GraftTarget::Filesystem(current) = target {
                if let Some(moved) = uri::rebase(current, old_uri, new_uri) {
                    *current = moved;
                }
            }
        }
        let moved = self
            .grafts
            .keys()
            .filter(|key| uri::is_ancestor_or_self(old_uri, key))
            .cloned()
            .collect::<Vec<_>>();
        for key in moved {
            if let (Some(list), Some(new_key)) =
                (self.grafts.remove(&key), uri::rebase(&key, old_uri, new_uri))
            {
                self.grafts.entry(new_key).or_default().extend(list);
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &GraftTarget)> {
        self.paths.iter().map(|(path, target)| (path.as_str(), target))
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn clear(&mut self) {
        self.paths.clear();
        self.grafts.clear();
    }
}
