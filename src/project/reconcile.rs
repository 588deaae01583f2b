//! Keeping the project in line with filesystem changes.

use std::cmp::Reverse;
use std::time::{Duration, Instant};

use snafu::location;
use tracing::{debug, info, warn};

use crate::project::data_project::{DataProject, Pending, PendingMove};
use crate::project::file_entry::DirState;
use crate::project::filter::FilterStatus;
use crate::project::uri;
use crate::vfs::{VfsRequest, WatchEvent, WatchEventKind};

/// How long a `MovedFrom` waits for its `MovedTo` before it counts as a deletion.
pub const MOVE_TIMEOUT: Duration = Duration::from_millis(500);

impl DataProject {
    pub fn handle_event(&mut self, event: WatchEvent, now: Instant) {
        let Some(dir) = self.watches.get(&event.handle).cloned() else {
            debug!("Dropping event for unknown {}", event.handle);
            return;
        };
        let Some(entry) = self.files.get(&dir) else {
            warn!(
                "Assumption that watched directories are tracked failed {}",
                location!()
            );
            return;
        };
        if entry.state == DirState::Exploring {
            debug!("Ignoring {:?} in {} while it is explored", event.kind, dir);
            return;
        }
        let content = !entry.is_dummy() && entry.state.is_explored();
        let child = uri::join(&dir, &event.name);
        debug!("{:?} on {}", event.kind, child);

        match event.kind {
            WatchEventKind::Create if content => self.rescan(&child),
            WatchEventKind::Modify if content || self.files.contains_key(&child) => {
                self.rescan(&child)
            }
            WatchEventKind::AttributeChange => self.recheck(&child),
            WatchEventKind::Delete => self.remove_uri(&child),
            WatchEventKind::MovedFrom(cookie) => self.moves.push(PendingMove {
                cookie,
                uri: child,
                deadline: now + MOVE_TIMEOUT,
            }),
            WatchEventKind::MovedTo(cookie) => {
                match self.moves.iter().position(|pending| pending.cookie == cookie) {
                    Some(index) => {
                        let moved = self.moves.remove(index);
                        self.relabel(&moved.uri, &child);
                    }
                    None if content => self.rescan(&child),
                    None => {}
                }
            }
            WatchEventKind::SelfDeleted | WatchEventKind::Unmounted => self.remove_uri(&dir),
            WatchEventKind::SelfMoved | WatchEventKind::Create | WatchEventKind::Modify => {}
        }
    }

    /// Expires moves whose destination never showed up.
    pub fn tick(&mut self, now: Instant) {
        let (expired, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.moves)
            .into_iter()
            .partition(|pending| pending.deadline <= now);
        self.moves = waiting;
        for pending in expired {
            info!("{} moved out of sight", pending.uri);
            self.remove_uri(&pending.uri);
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.moves.iter().map(|pending| pending.deadline).min()
    }

    fn recheck(&mut self, uri: &str) {
        let uri = uri.to_string();
        self.request(
            |id| VfsRequest::Stat {
                id,
                uris: vec![uri.clone()],
            },
            Pending::Attributes { uri: uri.clone() },
        );
    }

    /// Takes `uri` out of the project and files it under `status`.
    pub(super) fn demote(&mut self, uri: &str, status: FilterStatus) {
        self.remove_uri(uri);
        self.filter_uri(uri, status);
    }

    /// Removes `uri` and everything below it from every table and every
    /// virtual path it occupies.
    pub(super) fn remove_uri(&mut self, uri: &str) {
        let locations = self.to_virtual_paths(uri, true);
        debug!("Removing {} from {} locations", uri, locations.len());

        for grafted in self.grafts.uris_under(uri) {
            for path in self.grafts.grafts_of(&grafted).to_vec() {
                for below in self.grafts.descendants(&path) {
                    self.remove_graft(&below);
                }
                self.remove_graft(&path);
            }
        }
        self.drop_child(uri);
        for path in &locations {
            self.joliet.unregister_under(path);
            self.references.invalidate_under(path);
        }

        let dangling = self
            .symlinks
            .iter()
            .filter(|(link, target)| {
                uri::is_ancestor_or_self(uri, target) && !uri::is_ancestor_or_self(uri, link)
            })
            .map(|(link, _)| link.to_string())
            .collect::<Vec<_>>();
        for link in dangling {
            self.symlinks.remove(&link);
            if self.config.broken_symlinks {
                self.filter_uri(&link, FilterStatus::BrokenSymlink);
            }
        }
        self.symlinks.remove_under(uri);
        self.exclusions.remove_under(uri);
        self.filters.remove_under(uri);

        let mut tracked = self
            .files
            .keys()
            .filter(|candidate| uri::is_ancestor_or_self(uri, candidate))
            .cloned()
            .collect::<Vec<_>>();
        tracked.sort_by_key(|candidate| Reverse(candidate.len()));
        for candidate in tracked {
            match self.files.get_mut(&candidate) {
                Some(entry) if entry.refs > 0 => entry.set_content(None),
                Some(_) => self.drop_entry(&candidate),
                None => {}
            }
        }
    }

    /// Follows a rename or move of `old` to `new` without exploring again.
    fn relabel(&mut self, old: &str, new: &str) {
        info!("{} moved to {}", old, new);
        let before = self.inherited_locations(old);
        let own = self.grafts.grafts_of(old).len();
        let child = self.files.get(uri::parent(old).unwrap_or_default()).and_then(|parent| {
            parent.children.get(uri::basename(old)).copied()
        });

        for _ in 0..own {
            self.release_parent(old);
        }
        self.drop_child(old);

        self.grafts.relabel_uris(old, new);
        self.exclusions.relabel_uris(old, new);
        self.symlinks.relabel_uris(old, new);
        self.filters.relabel_uris(old, new);
        self.relabel_entries(old, new);
        for _ in 0..own {
            self.hold_parent(new);
        }

        let destination = uri::parent(new).unwrap_or_default().to_string();
        let listed = self
            .files
            .get(&destination)
            .is_some_and(|entry| !entry.is_dummy() && entry.state.is_explored());
        match child {
            Some(child) if listed => {
                if let Some(entry) = self.files.get_mut(&destination) {
                    entry
                        .children
                        .insert(uri::basename(new).to_string(), child);
                    let total = entry.children_sectors();
                    self.set_sectors(&destination, total);
                }
            }
            None if listed => self.rescan(new),
            _ => {}
        }

        let after = self.inherited_locations(new);
        for (graft, path) in before {
            match after.iter().find(|(candidate, _)| *candidate == graft) {
                Some((_, moved)) => {
                    self.references.rename_prefix(&path, moved);
                    self.joliet.rename_prefix(&path, moved);
                }
                None => {
                    self.references.invalidate_under(&path);
                    self.joliet.unregister_under(&path);
                }
            }
        }

        let (Some(old_name), Some(new_name)) = (uri::display_name(old), uri::display_name(new))
        else {
            return;
        };
        if old_name == new_name {
            return;
        }
        for path in self.grafts.grafts_of(new).to_vec() {
            if uri::basename(&path) != old_name {
                continue;
            }
            let Some(parent) = uri::parent(&path) else {
                continue;
            };
            let renamed = uri::join(parent, &new_name);
            if self.lookup(&renamed).is_none() {
                debug!("Renaming graft point {} to {}", path, renamed);
                self.relocate_grafts(&path, &renamed, true);
            }
        }
    }

    fn relabel_entries(&mut self, old: &str, new: &str) {
        let moved = self
            .files
            .keys()
            .filter(|candidate| uri::is_ancestor_or_self(old, candidate))
            .cloned()
            .collect::<Vec<_>>();
        for key in moved {
            let (Some(mut entry), Some(new_key)) =
                (self.files.remove(&key), uri::rebase(&key, old, new))
            else {
                continue;
            };
            if let Some(existing) = self.files.remove(&new_key) {
                entry.refs += existing.refs;
                match (entry.monitor, existing.monitor) {
                    (None, Some(handle)) => entry.monitor = Some(handle),
                    (Some(_), Some(handle)) => {
                        self.monitor.unwatch(handle);
                        self.watches.remove(&handle);
                    }
                    _ => {}
                }
            }
            if let Some(handle) = entry.monitor {
                self.watches.insert(handle, new_key.clone());
            }
            entry.uri = new_key.clone();
            self.files.insert(new_key, entry);
        }
    }
}
