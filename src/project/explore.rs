//! Folding filesystem listings and metadata into the project.

use std::collections::HashMap;

use snafu::{OptionExt, ensure, location};
use tracing::{debug, info, warn};

use crate::project::data_project::{
    DataProject, NotADirectorySnafu, Pending, PathTarget, ProjectError,
};
use crate::project::file_entry::{Child, ChildKind, DirState};
use crate::project::filter::FilterStatus;
use crate::project::graft::GraftTarget;
use crate::project::reference::Reference;
use crate::project::uri;
use crate::vfs::{FileInfo, FileKind, FsError, RequestId, VfsEntry, VfsReply, VfsRequest};

/// How one listed object enters the project.
enum Discovery {
    Filtered(FilterStatus),
    Ignored,
    Ordinary(FileInfo),
    /// A name that is not valid UTF-8.
    InvalidName(FileInfo),
    Symlink { target: String, info: FileInfo },
}

impl DataProject {
    /// Lists a tracked directory. Returns the id of the listing request,
    /// which may be one already in flight.
    pub fn explore_directory(&mut self, uri: &str) -> Option<RequestId> {
        let entry = self.files.get_mut(uri)?;
        if !entry.is_dir || entry.is_dummy() {
            warn!(
                "Assumption that only content directories get explored failed {}",
                location!()
            );
            return None;
        }
        if entry.state == DirState::Exploring {
            return self.listing_of(uri);
        }
        entry.state = DirState::Exploring;
        self.watch(uri);

        debug!("Exploring {}", uri);
        let owned = uri.to_string();
        Some(self.request(
            |id| VfsRequest::List {
                id,
                uri: owned.clone(),
            },
            Pending::Listing { uri: owned.clone() },
        ))
    }

    fn listing_of(&self, uri: &str) -> Option<RequestId> {
        self.pending.iter().find_map(|(id, pending)| match pending {
            Pending::Listing { uri: listed } if listed == uri => Some(*id),
            _ => None,
        })
    }

    /// Folds a backend reply in. Replies to requests issued before a reset,
    /// or about paths that left the project since, are dropped.
    pub fn handle_reply(&mut self, reply: VfsReply) {
        let Some(pending) = self.pending.remove(&reply.id()) else {
            debug!("Dropping stale reply {}", reply.id());
            return;
        };
        match (pending, reply) {
            (Pending::Listing { uri }, VfsReply::Listing { result, .. }) => {
                self.fold_listing(&uri, result)
            }
            (Pending::Added { reference, uri }, VfsReply::Stat { entries, .. }) => {
                self.complete_add(reference, &uri, entries)
            }
            (Pending::Created { .. }, VfsReply::Stat { entries, .. }) => {
                for found in entries {
                    self.fold_created(found);
                }
            }
            (Pending::Attributes { .. }, VfsReply::Stat { entries, .. }) => {
                for found in entries {
                    self.fold_attributes(found);
                }
            }
            (Pending::ExcludedSize { uri }, VfsReply::Stat { entries, .. }) => {
                match entries.into_iter().find(|found| found.uri == uri) {
                    Some(VfsEntry { info: Ok(info), .. }) => {
                        self.exclusions.record_size(&uri, info.sectors)
                    }
                    _ => debug!("No size for excluded {}", uri),
                }
            }
            (pending, reply) => warn!(
                "Assumption that {} answers {:?} failed {}",
                reply.id(),
                pending,
                location!()
            ),
        }
    }

    fn classify(&self, found: &VfsEntry) -> Discovery {
        let info = match &found.info {
            Ok(info) => info,
            Err(error) => return Discovery::Filtered(FilterStatus::from(error)),
        };
        let restored = self.filters.is_restored(&found.uri);
        let name = uri::unescape(uri::basename(&found.uri));

        if self.config.hidden && !restored && name.first() == Some(&b'.') {
            return Discovery::Filtered(FilterStatus::Hidden);
        }
        if let Some(target) = &info.symlink_target {
            if info.kind == FileKind::BrokenSymlink {
                return if self.config.broken_symlinks && !restored {
                    Discovery::Filtered(FilterStatus::BrokenSymlink)
                } else {
                    Discovery::Ignored
                };
            }
            if self.symlinks.is_recursive(&found.uri, target) {
                return Discovery::Filtered(FilterStatus::RecursiveSymlink);
            }
            return Discovery::Symlink {
                target: target.clone(),
                info: info.clone(),
            };
        }
        if !info.readable && !restored {
            return Discovery::Filtered(FilterStatus::Unreadable);
        }
        if info.kind == FileKind::Other {
            return Discovery::Ignored;
        }
        if std::str::from_utf8(&name).is_err() {
            return Discovery::InvalidName(info.clone());
        }
        Discovery::Ordinary(info.clone())
    }

    /// Folds the listing of an explored directory in: ordinary entries
    /// first, then entries with invalid names, then symlinks, since the
    /// latter two get grafted next to what the former established.
    fn fold_listing(&mut self, uri: &str, result: Result<Vec<VfsEntry>, FsError>) {
        let Some(entry) = self.files.get(uri) else {
            debug!("{} left the project while being explored", uri);
            return;
        };
        if entry.state != DirState::Exploring {
            debug!("Dropping outdated listing of {}", uri);
            return;
        }
        let expand = entry.expand_on_explore;

        let listed = match result {
            Ok(listed) => listed,
            Err(error) => {
                warn!("Failed to explore {}: {}", uri, error);
                if let Some(entry) = self.files.get_mut(uri) {
                    entry.state = DirState::Explored;
                }
                self.filter_uri(uri, FilterStatus::from(&error));
                return;
            }
        };

        let mut children = HashMap::new();
        let mut subdirs = Vec::new();
        let mut invalid = Vec::new();
        let mut links = Vec::new();
        for found in listed {
            match self.classify(&found) {
                Discovery::Filtered(status) => self.filter_uri(&found.uri, status),
                Discovery::Ignored => debug!("Ignoring {}", found.uri),
                Discovery::Ordinary(info) => {
                    let kind = if info.is_dir() {
                        subdirs.push((found.uri.clone(), info.clone()));
                        ChildKind::Directory
                    } else {
                        ChildKind::File
                    };
                    children.insert(
                        uri::basename(&found.uri).to_string(),
                        Child {
                            kind,
                            sectors: info.sectors,
                        },
                    );
                }
                Discovery::InvalidName(info) => invalid.push((found.uri, info)),
                Discovery::Symlink { target, info } => links.push((found.uri, target, info)),
            }
        }
        debug!(
            "Explored {}: {} entries, {} invalid names, {} symlinks",
            uri,
            children.len(),
            invalid.len(),
            links.len()
        );

        let total: i64 = children.values().map(|child: &Child| child.sectors).sum();
        if let Some(entry) = self.files.get_mut(uri) {
            entry.children = children;
            entry.state = if expand {
                DirState::Expanded
            } else {
                DirState::Explored
            };
            entry.expand_on_explore = false;
        }
        self.set_sectors(uri, total);

        for (subdir, info) in subdirs {
            self.track(&subdir, &info);
            if expand {
                self.explore_directory(&subdir);
            }
        }

        let locations = self.virtual_paths(uri);
        for (graft, path) in &locations {
            self.register_joliet_tree(graft, path, uri);
        }
        for (invalid_uri, info) in invalid {
            self.graft_invalid_name(&invalid_uri, &info, &locations);
        }
        for (link, target, info) in links {
            self.graft_symlink(&link, &target, &info, &locations, expand);
        }
    }

    /// A name that cannot be shown is grafted under a valid replacement and
    /// excluded from its natural location.
    fn graft_invalid_name(&mut self, found: &str, info: &FileInfo, locations: &[(String, String)]) {
        let name = uri::valid_name(found);
        for (graft, path) in locations {
            let already = self
                .grafts
                .grafts_of(found)
                .iter()
                .any(|existing| uri::parent(existing) == Some(path.as_str()));
            if !already {
                let grafted = self.free_child_path(path, &name);
                info!("Grafting {} with an invalid name at {}", found, grafted);
                self.add_graft(GraftTarget::Filesystem(found.to_string()), &grafted);
            }
            self.exclusions.exclude(graft, found);
        }
        if !locations.is_empty() {
            self.track(found, info);
        }
    }

    /// Symlinks are never content: their target is grafted where the link
    /// would appear and the link itself is excluded.
    fn graft_symlink(
        &mut self,
        link: &str,
        target: &str,
        info: &FileInfo,
        locations: &[(String, String)],
        expand: bool,
    ) {
        self.symlinks.insert(link, target);
        if locations.is_empty() {
            return;
        }
        self.track(target, info);

        let name = uri::display_name(link).unwrap_or_else(|| uri::valid_name(link));
        for (graft, path) in locations {
            let natural = uri::join(path, &name);
            let already = self
                .grafts
                .target(&natural)
                .is_some_and(|existing| existing.uri() == Some(target));
            if !already {
                let grafted = self.free_child_path(path, &name);
                debug!("Grafting {} at {} for symlink {}", target, grafted, link);
                self.add_graft(GraftTarget::Filesystem(target.to_string()), &grafted);
                self.register_joliet_tree(&grafted, &grafted, target);
            }
            self.exclusions.exclude(graft, link);
        }
        if info.is_dir() && expand {
            self.explore_directory(target);
        }
    }

    /// `name` below `parent`, suffixed until nothing sits there yet.
    fn free_child_path(&self, parent: &str, name: &str) -> String {
        let mut candidate = uri::join(parent, name);
        let mut counter = 1;
        while self.lookup(&candidate).is_some() {
            candidate = uri::join(parent, &format!("{name}_{counter}"));
            counter += 1;
        }
        candidate
    }

    fn complete_add(&mut self, reference: Reference, uri: &str, entries: Vec<VfsEntry>) {
        let path = self.references.resolve(reference).map(str::to_string);
        self.references.release(reference);
        let Some(path) = path else {
            debug!("{} left the project before its metadata arrived", uri);
            return;
        };
        if self.grafts.target(&path).and_then(GraftTarget::uri) != Some(uri) {
            debug!("{} no longer points to {}", path, uri);
            return;
        }
        let Some(found) = entries.into_iter().find(|found| found.uri == uri) else {
            warn!(
                "Assumption that a metadata reply covers {} failed {}",
                uri,
                location!()
            );
            return;
        };

        let restored = self.filters.is_restored(uri);
        let info = match found.info {
            Ok(info) => info,
            Err(error) => {
                self.remove_graft(&path);
                self.filter_uri(uri, FilterStatus::from(&error));
                return;
            }
        };
        if info.kind == FileKind::BrokenSymlink {
            self.remove_graft(&path);
            if self.config.broken_symlinks && !restored {
                self.filter_uri(uri, FilterStatus::BrokenSymlink);
            }
            return;
        }
        if !info.readable && !restored {
            self.remove_graft(&path);
            self.filter_uri(uri, FilterStatus::Unreadable);
            return;
        }

        let content = match &info.symlink_target {
            Some(target) => {
                debug!("{} is a symlink to {}", uri, target);
                self.remove_graft(&path);
                self.symlinks.insert(uri, target);
                self.add_graft(GraftTarget::Filesystem(target.clone()), &path);
                target.clone()
            }
            None => uri.to_string(),
        };
        self.track(&content, &info);
        self.register_joliet_tree(&path, &path, &content);

        let top_level = uri::parent(&path).is_some_and(uri::is_root);
        if info.is_dir() && (top_level || self.is_expanded_path(uri::parent(&path))) {
            self.explore_directory(&content);
        }
    }

    fn is_expanded_path(&self, path: Option<&str>) -> bool {
        path.and_then(|path| self.lookup(path))
            .and_then(|target| target.uri().map(str::to_string))
            .and_then(|uri| self.files.get(&uri))
            .is_some_and(|entry| entry.state == DirState::Expanded)
    }

    /// Runs a single object through the same pipeline as a listing entry.
    pub(super) fn fold_created(&mut self, found: VfsEntry) {
        if let Ok(info) = &found.info {
            if self.files.get(&found.uri).is_some_and(|entry| !entry.is_dir) {
                self.set_sectors(&found.uri, info.sectors);
            }
        }
        let Some(parent) = uri::parent(&found.uri).map(str::to_string) else {
            return;
        };
        let Some(entry) = self.files.get(&parent) else {
            return;
        };
        if entry.is_dummy() || !entry.state.is_explored() {
            debug!("{} is not explored, ignoring {}", parent, found.uri);
            return;
        }
        let expand = entry.state == DirState::Expanded;
        let locations = self.virtual_paths(&parent);

        match self.classify(&found) {
            Discovery::Filtered(status) => {
                self.drop_child(&found.uri);
                self.filter_uri(&found.uri, status);
            }
            Discovery::Ignored => debug!("Ignoring {}", found.uri),
            Discovery::Ordinary(info) => {
                self.filters.unfilter(&found.uri);
                let kind = if info.is_dir() {
                    ChildKind::Directory
                } else {
                    ChildKind::File
                };
                if let Some(entry) = self.files.get_mut(&parent) {
                    entry.children.insert(
                        uri::basename(&found.uri).to_string(),
                        Child {
                            kind,
                            sectors: info.sectors,
                        },
                    );
                    let total = entry.children_sectors();
                    self.set_sectors(&parent, total);
                }
                if info.is_dir() {
                    self.track(&found.uri, &info);
                    if expand {
                        self.explore_directory(&found.uri);
                    }
                }
                for (graft, path) in &locations {
                    let child_path = uri::join(path, &uri::unescape_relative(uri::basename(&found.uri)));
                    self.register_joliet_tree(graft, &child_path, &found.uri);
                }
            }
            Discovery::InvalidName(info) => self.graft_invalid_name(&found.uri, &info, &locations),
            Discovery::Symlink { target, info } => {
                self.graft_symlink(&found.uri, &target, &info, &locations, expand)
            }
        }
    }

    fn fold_attributes(&mut self, found: VfsEntry) {
        let readable = found.info.as_ref().is_ok_and(|info| info.readable);
        match self.filters.status(&found.uri) {
            Some(FilterStatus::Unreadable) if readable => {
                info!("{} became readable", found.uri);
                self.filters.unfilter(&found.uri);
                self.fold_created(found);
            }
            None if !readable && !self.filters.is_restored(&found.uri) => {
                info!("{} became unreadable", found.uri);
                self.demote(&found.uri, FilterStatus::Unreadable);
            }
            _ => {}
        }
    }

    /// Removes `uri` from the listing of its parent.
    pub(super) fn drop_child(&mut self, uri: &str) {
        let Some(parent) = uri::parent(uri).map(str::to_string) else {
            return;
        };
        let Some(entry) = self.files.get_mut(&parent) else {
            return;
        };
        if entry.children.remove(uri::basename(uri)).is_some() {
            let total = entry.children_sectors();
            self.set_sectors(&parent, total);
        }
    }

    /// Marks the directory shown at `path` as unfolded; its subdirectories
    /// get explored right away from now on.
    pub fn set_expanded(&mut self, path: &str) -> Result<(), ProjectError> {
        let uri = self
            .lookup(path)
            .and_then(|target| target.uri().map(str::to_string))
            .context(NotADirectorySnafu { path })?;
        ensure!(self.is_tracked_dir(&uri), NotADirectorySnafu { path });
        let Some(entry) = self.files.get_mut(&uri) else {
            return Ok(());
        };

        match entry.state {
            DirState::New | DirState::NotExplored => {
                entry.expand_on_explore = true;
                self.explore_directory(&uri);
            }
            DirState::Exploring => {
                entry.expand_on_explore = true;
                if let Some(id) = self.listing_of(&uri) {
                    self.prioritize(id);
                }
            }
            DirState::Explored => {
                entry.state = DirState::Expanded;
                let subdirs = entry
                    .children
                    .iter()
                    .filter(|(_, child)| child.kind == ChildKind::Directory)
                    .map(|(name, _)| uri::join(&uri, name))
                    .collect::<Vec<_>>();
                for subdir in subdirs {
                    if self
                        .files
                        .get(&subdir)
                        .is_some_and(|entry| entry.state == DirState::NotExplored)
                    {
                        self.explore_directory(&subdir);
                    }
                }
            }
            DirState::Expanded => {}
        }
        Ok(())
    }

    pub fn set_collapsed(&mut self, path: &str) -> Result<(), ProjectError> {
        let Some(PathTarget::Graft(GraftTarget::Filesystem(uri)) | PathTarget::Inherited { uri, .. }) =
            self.lookup(path)
        else {
            return NotADirectorySnafu { path }.fail();
        };
        if let Some(entry) = self.files.get_mut(&uri) {
            entry.expand_on_explore = false;
            if entry.state == DirState::Expanded {
                entry.state = DirState::Explored;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::filter::FilterNotice;
    use crate::vfs::memory::{MemoryVfs, recorded_project};

    fn mixed() -> MemoryVfs {
        let mut fs = MemoryVfs::default();
        fs.file("file:///p/.hidden", 1)
            .file("file:///p/ok", 2)
            .file("file:///p/%FF", 3)
            .symlink("file:///p/link", "file:///q")
            .file("file:///q/z", 6)
            .symlink("file:///p/loop", "file:///p")
            .symlink("file:///p/dead", "file:///missing");
        fs
    }

    #[test]
    fn listings_sort_out_what_enters_the_disc() {
        let fs = mixed();
        let (mut project, _) = recorded_project();
        project.add_uri("file:///p", "/").expect("adding should succeed");
        fs.serve(&mut project);

        assert!(matches!(
            project.lookup("/p/ok"),
            Some(PathTarget::Inherited { .. })
        ));
        assert_eq!(project.lookup("/p/.hidden"), None);
        assert_eq!(
            project.lookup("/p/_"),
            Some(PathTarget::Graft(GraftTarget::Filesystem("file:///p/%FF".into())))
        );
        assert_eq!(
            project.lookup("/p/link"),
            Some(PathTarget::Graft(GraftTarget::Filesystem("file:///q".into())))
        );
        assert_eq!(project.sectors(), 11);

        let mut notices = project.take_notices();
        notices.sort_by(|a, b| a.uri.cmp(&b.uri));
        assert_eq!(
            notices,
            vec![
                FilterNotice {
                    uri: "file:///p/.hidden".into(),
                    restored: false,
                    status: FilterStatus::Hidden,
                },
                FilterNotice {
                    uri: "file:///p/dead".into(),
                    restored: false,
                    status: FilterStatus::BrokenSymlink,
                },
                FilterNotice {
                    uri: "file:///p/loop".into(),
                    restored: false,
                    status: FilterStatus::RecursiveSymlink,
                },
            ]
        );
        assert_eq!(
            project.excluded_list(),
            vec![
                "file:///p/%FF",
                "file:///p/.hidden",
                "file:///p/dead",
                "file:///p/link",
                "file:///p/loop",
            ]
        );
    }

    #[test]
    fn symlinked_directories_are_explored_on_demand() {
        let fs = mixed();
        let (mut project, _) = recorded_project();
        project.add_uri("file:///p", "/").expect("adding should succeed");
        fs.serve(&mut project);
        assert_eq!(
            project.entry("file:///q").map(|entry| entry.state),
            Some(DirState::NotExplored)
        );

        project.set_expanded("/p/link").expect("expanding should succeed");
        fs.serve(&mut project);
        assert_eq!(
            project.entry("file:///q").map(|entry| entry.state),
            Some(DirState::Expanded)
        );
        assert_eq!(
            project.lookup("/p/link/z"),
            Some(PathTarget::Inherited {
                graft: "/p/link".into(),
                uri: "file:///q/z".into(),
            })
        );
    }

    #[test]
    fn expanded_directories_explore_their_subdirectories() {
        let mut fs = MemoryVfs::default();
        fs.file("file:///t/a/b/c", 1);
        let (mut project, _) = recorded_project();
        project.add_uri("file:///t", "/").expect("adding should succeed");
        fs.serve(&mut project);

        let state = |project: &DataProject, uri: &str| project.entry(uri).map(|entry| entry.state);
        assert_eq!(state(&project, "file:///t"), Some(DirState::Explored));
        assert_eq!(state(&project, "file:///t/a"), Some(DirState::NotExplored));

        project.set_expanded("/t").expect("expanding should succeed");
        fs.serve(&mut project);
        assert_eq!(state(&project, "file:///t"), Some(DirState::Expanded));
        assert_eq!(state(&project, "file:///t/a"), Some(DirState::Explored));
        assert_eq!(state(&project, "file:///t/a/b"), Some(DirState::NotExplored));

        project.set_expanded("/t/a/b").expect("expanding should succeed");
        fs.serve(&mut project);
        assert_eq!(state(&project, "file:///t/a/b"), Some(DirState::Expanded));

        project.set_collapsed("/t").expect("collapsing should succeed");
        assert_eq!(state(&project, "file:///t"), Some(DirState::Explored));
        assert!(matches!(
            project.set_expanded("/t/a/b/c"),
            Err(ProjectError::NotADirectory { .. })
        ));
    }

    #[test]
    fn restored_files_come_back_and_leave_again() {
        let fs = mixed();
        let (mut project, _) = recorded_project();
        project.add_uri("file:///p", "/").expect("adding should succeed");
        fs.serve(&mut project);
        project.take_notices();

        project
            .restore("file:///p/.hidden")
            .expect("restoring should succeed");
        fs.serve(&mut project);
        assert!(project.lookup("/p/.hidden").is_some());
        assert_eq!(
            project.restored_list(),
            vec![("file:///p/.hidden".to_string(), FilterStatus::Hidden)]
        );
        assert_eq!(project.sectors(), 12);

        project
            .unrestore("file:///p/.hidden")
            .expect("unrestoring should succeed");
        assert_eq!(project.lookup("/p/.hidden"), None);
        assert_eq!(project.sectors(), 11);

        assert!(matches!(
            project.restore("file:///p/loop"),
            Err(ProjectError::Unrestorable { .. })
        ));
        assert!(matches!(
            project.restore("file:///p/ok"),
            Err(ProjectError::NotFiltered { .. })
        ));
    }

    #[test]
    fn disabling_a_filter_rule_rescans() {
        let fs = mixed();
        let (mut project, _) = recorded_project();
        project.add_uri("file:///p", "/").expect("adding should succeed");
        fs.serve(&mut project);

        let mut config = project.config();
        config.hidden = false;
        project.set_filter_policy(config);
        fs.serve(&mut project);
        assert!(project.lookup("/p/.hidden").is_some());
        assert!(!project.excluded_list().contains(&"file:///p/.hidden".to_string()));
    }

    #[test]
    fn long_names_get_joliet_replacements() {
        let long = "x".repeat(70);
        let mut fs = MemoryVfs::default();
        fs.file(&format!("file:///j/{long}.txt"), 1);
        let (mut project, _) = recorded_project();
        project.add_uri("file:///j", "/").expect("adding should succeed");
        fs.serve(&mut project);

        let names = project.joliet_names();
        assert_eq!(names.len(), 1);
        assert_eq!(names[0].0, format!("/j/{long}.txt"));
        assert!(uri::basename(&names[0].1).len() <= crate::project::JOLIET_MAX_NAME);
        assert!(names[0].1.ends_with(".txt"));
    }
}
