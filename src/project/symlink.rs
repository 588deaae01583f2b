use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::project::uri;

/// Symlink URI → resolution target URI.
///
/// Symlinks are never disc content themselves; only their targets are.
#[derive(Debug, Default, Clone)]
pub struct SymlinkTable {
    links: HashMap<String, String>,
}

impl SymlinkTable {
    pub fn insert(&mut self, symlink: &str, target: &str) {
        self.links.insert(symlink.to_string(), target.to_string());
    }

    pub fn remove(&mut self, symlink: &str) -> Option<String> {
        self.links.remove(symlink)
    }

    pub fn target(&self, symlink: &str) -> Option<&str> {
        self.links.get(symlink).map(String::as_str)
    }

    /// Symlinks whose target is `target`.
    pub fn links_to(&self, target: &str) -> Vec<String> {
        self.links
            .iter()
            .filter(|(_, candidate)| candidate.as_str() == target)
            .map(|(link, _)| link.clone())
            .collect()
    }

    /// Whether following `symlink` into `target` can lead back to `symlink`
    /// itself, directly or through further known symlinks located inside
    /// the subtrees entered along the way.
    pub fn is_recursive(&self, symlink: &str, target: &str) -> bool {
        let mut visited = HashSet::new();
        let mut pending = vec![target.to_string()];

        while let Some(entered) = pending.pop() {
            if uri::is_ancestor_or_self(&entered, symlink) {
                debug!("Symlink {} re-enters itself through {}", symlink, entered);
                return true;
            }
            if !visited.insert(entered.clone()) {
                continue;
            }
            pending.extend(
                self.links
                    .iter()
                    .filter(|(link, _)| uri::is_strict_ancestor(&entered, link))
                    .map(|(_, next)| next.clone()),
            );
        }
        false
    }

    pub fn remove_under(&mut self, uri: &str) {
        self.links
            .retain(|link, _| !uri::is_ancestor_or_self(uri, link));
    }

    pub fn relabel_uris(&mut self, old_uri: &str, new_uri: &str) {
        self.links = self
            .links
            .drain()
            .map(|(link, target)| {
                let link = uri::rebase(&link, old_uri, new_uri).unwrap_or(link);
                let target = uri::rebase(&target, old_uri, new_uri).unwrap_or(target);
                (link, target)
            })
            .collect();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.links
            .iter()
            .map(|(link, target)| (link.as_str(), target.as_str()))
    }

    pub fn clear(&mut self) {
        self.links.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_link_to_its_own_ancestor_is_recursive() {
        let table = SymlinkTable::default();
        assert!(table.is_recursive("file:///a/b/up", "file:///a"));
        assert!(!table.is_recursive("file:///a/b/side", "file:///c"));
    }

    #[test]
    fn a_three_hop_cycle_is_detected() {
        let mut table = SymlinkTable::default();
        table.insert("file:///x/a", "file:///y");
        table.insert("file:///y/b", "file:///z");

        assert!(table.is_recursive("file:///z/c", "file:///x"));
    }

    #[test]
    fn a_three_hop_chain_is_not_a_cycle() {
        let mut table = SymlinkTable::default();
        table.insert("file:///x/a", "file:///y");
        table.insert("file:///y/b", "file:///z");

        assert!(!table.is_recursive("file:///z/c", "file:///w"));
        assert!(!table.is_recursive("file:///w/d", "file:///x"));
    }

    #[test]
    fn prefix_lookalikes_do_not_count() {
        let mut table = SymlinkTable::default();
        table.insert("file:///xy/a", "file:///x");
        assert!(!table.is_recursive("file:///x/b", "file:///xy2"));
    }

    #[test]
    fn relabel_rewrites_links_and_targets() {
        let mut table = SymlinkTable::default();
        table.insert("file:///d/link", "file:///d/target");
        table.relabel_uris("file:///d", "file:///e");
        assert_eq!(table.target("file:///e/link"), Some("file:///e/target"));
    }
}
