use std::collections::HashMap;

use bincode::{Decode, Encode};
use derive_more::Display;

use crate::project::uri;
use crate::vfs::FsError;

/// Why a filesystem object was kept off the disc.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, Encode, Decode)]
pub enum FilterStatus {
    #[display("hidden")]
    Hidden,
    #[display("unreadable")]
    Unreadable,
    #[display("broken symlink")]
    BrokenSymlink,
    #[display("recursive symlink")]
    RecursiveSymlink,
    #[display("unknown")]
    Unknown,
}

impl From<&FsError> for FilterStatus {
    fn from(error: &FsError) -> Self {
        match error {
            FsError::NotFound | FsError::PermissionDenied => FilterStatus::Unreadable,
            FsError::Loop => FilterStatus::RecursiveSymlink,
            FsError::Io(_) => FilterStatus::Unknown,
        }
    }
}

/// Filtering policy of one project.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterConfig {
    /// Keep names starting with a dot off the disc.
    pub hidden: bool,
    /// Keep symlinks whose target does not resolve off the disc.
    pub broken_symlinks: bool,
    /// Report filtered files to the presentation layer.
    pub notify: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            hidden: true,
            broken_symlinks: true,
            notify: true,
        }
    }
}

/// Sent whenever the filter status of a URI changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterNotice {
    pub uri: String,
    pub restored: bool,
    pub status: FilterStatus,
}

/// Unreadable and restored sets.
#[derive(Debug, Default, Clone)]
pub struct FilterTable {
    unreadable: HashMap<String, FilterStatus>,
    restored: HashMap<String, FilterStatus>,
}

impl FilterTable {
    pub fn filter(&mut self, uri: &str, status: FilterStatus) -> bool {
        self.unreadable.insert(uri.to_string(), status) != Some(status)
    }

    pub fn unfilter(&mut self, uri: &str) -> Option<FilterStatus> {
        self.unreadable.remove(uri)
    }

    pub fn status(&self, uri: &str) -> Option<FilterStatus> {
        self.unreadable.get(uri).copied()
    }

    pub fn is_filtered(&self, uri: &str) -> bool {
        self.unreadable.contains_key(uri)
    }

    pub fn mark_restored(&mut self, uri: &str, status: FilterStatus) {
        self.restored.insert(uri.to_string(), status);
    }

    pub fn unrestore(&mut self, uri: &str) -> Option<FilterStatus> {
        self.restored.remove(uri)
    }

    pub fn is_restored(&self, uri: &str) -> bool {
        self.restored.contains_key(uri)
    }

    pub fn unreadable(&self) -> impl Iterator<Item = (&str, FilterStatus)> {
        self.unreadable
            .iter()
            .map(|(uri, status)| (uri.as_str(), *status))
    }

    pub fn restored(&self) -> impl Iterator<Item = (&str, FilterStatus)> {
        self.restored
            .iter()
            .map(|(uri, status)| (uri.as_str(), *status))
    }

    pub fn remove_under(&mut self, uri: &str) {
        self.unreadable
            .retain(|candidate, _| !uri::is_ancestor_or_self(uri, candidate));
        self.restored
            .retain(|candidate, _| !uri::is_ancestor_or_self(uri, candidate));
    }

    pub fn relabel_uris(&mut self, old_uri: &str, new_uri: &str) {
        for map in [&mut self.unreadable, &mut self.restored] {
            let moved = map
                .keys()
                .filter(|key| uri::is_ancestor_or_self(old_uri, key))
                .cloned()
                .collect::<Vec<_>>();
            for key in moved {
                if let (Some(status), Some(new_key)) =
                    (map.remove(&key), uri::rebase(&key, old_uri, new_uri))
                {
                    map.insert(new_key, status);
                }
            }
        }
    }

    pub fn clear(&mut self) {
        self.unreadable.clear();
        self.restored.clear();
    }
}
