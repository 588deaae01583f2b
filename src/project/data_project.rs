use std::cmp::Reverse;
use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use snafu::{OptionExt, Snafu, ensure, location};
use tracing::{debug, info, warn};

use crate::project::file_entry::{ChildKind, FileEntry};
use crate::project::filter::{FilterConfig, FilterNotice, FilterStatus, FilterTable};
use crate::project::graft::{GraftTable, GraftTarget};
use crate::project::joliet::JolietIndex;
use crate::project::reference::{Reference, ReferenceTable};
use crate::project::exclusion::ExclusionSet;
use crate::project::symlink::SymlinkTable;
use crate::project::uri;
use crate::vfs::{FileInfo, Monitor, RequestId, VfsRequest, WatchHandle};

/// What an in-flight request was issued for.
#[derive(Debug)]
pub(super) enum Pending {
    Listing { uri: String },
    Added { reference: Reference, uri: String },
    Created { uri: String },
    Attributes { uri: String },
    ExcludedSize { uri: String },
}

#[derive(Debug)]
pub(super) struct PendingMove {
    pub(super) cookie: u32,
    pub(super) uri: String,
    pub(super) deadline: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct ImportedEntry {
    pub(super) sectors: i64,
    pub(super) is_dir: bool,
}

/// What a virtual path stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathTarget {
    Graft(GraftTarget),
    /// Content of the directory grafted at `graft`, not grafted itself.
    Inherited { graft: String, uri: String },
}

impl PathTarget {
    pub fn uri(&self) -> Option<&str> {
        match self {
            PathTarget::Graft(target) => target.uri(),
            PathTarget::Inherited { uri, .. } => Some(uri),
        }
    }
}

/// The data-disc project: a virtual disc hierarchy projected over the local
/// filesystem through graft points.
///
/// The project never touches the filesystem itself. Whatever it needs to
/// know is queued as a [`VfsRequest`] (see [`DataProject::take_requests`])
/// and folded back in through [`DataProject::handle_reply`]; filesystem
/// changes arrive through [`DataProject::handle_event`].
pub struct DataProject {
    pub(super) config: FilterConfig,
    pub(super) monitor: Box<dyn Monitor>,
    pub(super) grafts: GraftTable,
    pub(super) exclusions: ExclusionSet,
    pub(super) files: HashMap<String, FileEntry>,
    pub(super) watches: HashMap<WatchHandle, String>,
    pub(super) symlinks: SymlinkTable,
    pub(super) filters: FilterTable,
    pub(super) joliet: JolietIndex,
    pub(super) references: ReferenceTable,
    pub(super) imported: HashMap<String, ImportedEntry>,
    pub(super) pending: HashMap<RequestId, Pending>,
    pub(super) moves: Vec<PendingMove>,
    requests: VecDeque<VfsRequest>,
    notices: Vec<FilterNotice>,
    next_request: u64,
}

impl DataProject {
    pub fn new(config: FilterConfig, monitor: Box<dyn Monitor>) -> Self {
        Self {
            config,
            monitor,
            grafts: GraftTable::default(),
            exclusions: ExclusionSet::default(),
            files: HashMap::new(),
            watches: HashMap::new(),
            symlinks: SymlinkTable::default(),
            filters: FilterTable::default(),
            joliet: JolietIndex::default(),
            references: ReferenceTable::default(),
            imported: HashMap::new(),
            pending: HashMap::new(),
            moves: Vec::new(),
            requests: VecDeque::new(),
            notices: Vec::new(),
            next_request: 0,
        }
    }

    pub fn config(&self) -> FilterConfig {
        self.config
    }

    /// Replaces the filtering policy. Objects filtered only because of a
    /// rule that got turned off are scanned again.
    pub fn set_filter_policy(&mut self, config: FilterConfig) {
        let previous = std::mem::replace(&mut self.config, config);
        let released = self
            .filters
            .unreadable()
            .filter(|(_, status)| match status {
                FilterStatus::Hidden => previous.hidden && !config.hidden,
                FilterStatus::BrokenSymlink => previous.broken_symlinks && !config.broken_symlinks,
                _ => false,
            })
            .map(|(uri, _)| uri.to_string())
            .collect::<Vec<_>>();

        info!(
            "Filter policy changed, {} filtered files are scanned again",
            released.len()
        );
        for uri in released {
            self.filters.unfilter(&uri);
            self.rescan(&uri);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.grafts.is_empty()
    }

    pub fn entry(&self, uri: &str) -> Option<&FileEntry> {
        self.files.get(uri)
    }

    /// Requests queued for the filesystem backend since the last call.
    pub fn take_requests(&mut self) -> Vec<VfsRequest> {
        self.requests.drain(..).collect()
    }

    /// Filter status changes since the last call.
    pub fn take_notices(&mut self) -> Vec<FilterNotice> {
        std::mem::take(&mut self.notices)
    }

    /// Whether replies or move expirations are still expected.
    pub fn has_pending_work(&self) -> bool {
        !self.pending.is_empty() || !self.moves.is_empty() || !self.requests.is_empty()
    }

    pub(super) fn request(
        &mut self,
        build: impl FnOnce(RequestId) -> VfsRequest,
        pending: Pending,
    ) -> RequestId {
        self.next_request += 1;
        let id = RequestId(self.next_request);
        self.requests.push_back(build(id));
        self.pending.insert(id, pending);
        id
    }

    pub(super) fn prioritize(&mut self, id: RequestId) {
        self.requests.push_back(VfsRequest::Prioritize { id });
    }

    /// Queues a metadata request for `uri`, folded in like a newly created file.
    pub(super) fn rescan(&mut self, uri: &str) {
        let uri = uri.to_string();
        self.request(
            |id| VfsRequest::Stat {
                id,
                uris: vec![uri.clone()],
            },
            Pending::Created { uri: uri.clone() },
        );
    }

    pub(super) fn filter_uri(&mut self, uri: &str, status: FilterStatus) {
        if !self.filters.filter(uri, status) {
            return;
        }
        info!("Filtered {} ({})", uri, status);
        self.notify(uri, false, status);
    }

    pub(super) fn notify(&mut self, uri: &str, restored: bool, status: FilterStatus) {
        if self.config.notify {
            self.notices.push(FilterNotice {
                uri: uri.to_string(),
                restored,
                status,
            });
        }
    }

    /// Nearest graft point at or above `path`.
    pub fn resolve_graft<'a>(&self, path: &'a str) -> Option<&'a str> {
        self.grafts.resolve(path)
    }

    /// Returns false when `path` is already grafted.
    pub fn add_graft(&mut self, target: GraftTarget, path: &str) -> bool {
        if !self.grafts.add(target.clone(), path) {
            debug!("{} already has a graft point", path);
            return false;
        }
        debug!("Grafted {:?} at {}", target, path);
        if let GraftTarget::Filesystem(uri) = &target {
            self.hold_parent(uri);
        }
        self.joliet.register(path);
        true
    }

    /// Removes one graft point. Exclusions keyed to it are dropped and its
    /// target leaves the project once no virtual path exposes it anymore.
    pub fn remove_graft(&mut self, path: &str) -> bool {
        let Some(target) = self.grafts.remove(path) else {
            return false;
        };
        let released = self.exclusions.forget_graft(path);
        debug!(
            "Removed graft point {}, releasing {} exclusions",
            path,
            released.len()
        );
        self.imported.remove(path);

        if let GraftTarget::Filesystem(uri) = &target {
            self.release_parent(uri);
            if !self.grafts.has_grafts(uri) && self.inherited_locations(uri).is_empty() {
                self.forget_uri(uri);
            }
        }
        if self.lookup(path).is_none() {
            self.joliet.unregister_under(path);
            self.references.invalidate_under(path);
        }
        true
    }

    /// Stops `graft` from exposing `uri`; returns false when it already did not.
    pub fn exclude_uri(&mut self, graft: &str, uri: &str) -> bool {
        if !self.exclusions.exclude(graft, uri) {
            return false;
        }
        if let Some((_, sectors)) = self.child(uri) {
            self.exclusions.record_size(uri, sectors);
        }
        if let Some(path) = self.path_at_graft(graft, uri) {
            debug!("Excluded {} at {}", uri, path);
            self.joliet.unregister_under(&path);
            self.references.invalidate_under(&path);
        }
        true
    }

    pub fn restore_uri(&mut self, graft: &str, uri: &str) -> bool {
        if !self.exclusions.restore(graft, uri) {
            return false;
        }
        if let Some(path) = self.path_at_graft(graft, uri) {
            debug!("Restored {} at {}", uri, path);
            self.register_joliet_tree(graft, &path, uri);
        }
        true
    }

    /// Whether no graft point exposes `uri` anymore although one would
    /// without exclusions. A URI with graft points of its own is never excluded.
    pub fn is_excluded(&self, uri: &str) -> bool {
        if self.grafts.has_grafts(uri) {
            return false;
        }
        let mut exposed = false;
        for ancestor in uri::ancestors(uri) {
            if !self.is_tracked_dir(ancestor) {
                break;
            }
            for graft in self.grafts.grafts_of(ancestor) {
                exposed = true;
                if self.reaches(uri, ancestor, graft) {
                    return false;
                }
            }
        }
        exposed
    }

    /// Every virtual path at which `uri` currently appears.
    pub fn to_virtual_paths(&self, uri: &str, include_own: bool) -> Vec<String> {
        let mut paths = self
            .inherited_locations(uri)
            .into_iter()
            .map(|(_, path)| path)
            .collect::<Vec<_>>();
        if include_own {
            paths.extend(self.grafts.grafts_of(uri).iter().cloned());
        }
        paths
    }

    /// `(graft, virtual path)` pairs through which `uri` is inherited content.
    pub(super) fn inherited_locations(&self, uri: &str) -> Vec<(String, String)> {
        let mut locations = Vec::new();
        for ancestor in uri::ancestors(uri) {
            if !self.is_tracked_dir(ancestor) {
                break;
            }
            let Some(relative) = uri::relative_to(uri, ancestor) else {
                continue;
            };
            let suffix = uri::unescape_relative(relative);
            for graft in self.grafts.grafts_of(ancestor) {
                if self.reaches(uri, ancestor, graft) {
                    locations.push((graft.clone(), uri::join(graft, &suffix)));
                }
            }
        }
        locations
    }

    /// Inherited locations plus the graft points of `uri` itself.
    pub(super) fn virtual_paths(&self, uri: &str) -> Vec<(String, String)> {
        let mut locations = self.inherited_locations(uri);
        locations.extend(
            self.grafts
                .grafts_of(uri)
                .iter()
                .map(|graft| (graft.clone(), graft.clone())),
        );
        locations
    }

    /// Whether nothing between `ancestor` (grafted at `graft`) and `uri` is excluded at `graft`.
    fn reaches(&self, uri: &str, ancestor: &str, graft: &str) -> bool {
        std::iter::once(uri)
            .chain(uri::ancestors(uri))
            .take_while(|candidate| *candidate != ancestor)
            .all(|candidate| !self.exclusions.is_excluded_at(candidate, graft))
    }

    fn path_at_graft(&self, graft: &str, uri: &str) -> Option<String> {
        let base = self.grafts.target(graft)?.uri()?;
        let relative = uri::relative_to(uri, base)?;
        Some(uri::join(graft, &uri::unescape_relative(relative)))
    }

    pub(super) fn is_tracked_dir(&self, uri: &str) -> bool {
        self.files
            .get(uri)
            .is_some_and(|entry| entry.is_dir && !entry.is_dummy())
    }

    /// What sits at `path`, if anything.
    pub fn lookup(&self, path: &str) -> Option<PathTarget> {
        if let Some(target) = self.grafts.target(path) {
            return Some(PathTarget::Graft(target.clone()));
        }
        let graft = self.grafts.resolve(path)?;
        let base = self.grafts.target(graft)?.uri()?;
        let relative = uri::relative_to(path, graft)?;
        let uri = uri::join(base, &uri::escape_relative(relative));

        let parent = self.files.get(uri::parent(&uri)?)?;
        if parent.is_dummy() || !parent.children.contains_key(uri::basename(&uri)) {
            return None;
        }
        self.reaches(&uri, base, graft).then(|| PathTarget::Inherited {
            graft: graft.to_string(),
            uri,
        })
    }

    pub fn is_directory_path(&self, path: &str) -> bool {
        if uri::is_root(path) {
            return true;
        }
        match self.lookup(path) {
            Some(PathTarget::Graft(GraftTarget::Created)) => true,
            Some(PathTarget::Graft(GraftTarget::Imported)) => self
                .imported
                .get(path)
                .is_some_and(|imported| imported.is_dir),
            Some(PathTarget::Graft(GraftTarget::Filesystem(uri))) => self.is_tracked_dir(&uri),
            Some(PathTarget::Inherited { uri, .. }) => {
                self.child(&uri).map(|(kind, _)| kind) == Some(ChildKind::Directory)
            }
            None => false,
        }
    }

    /// Kind and size of `uri` as listed by its explored parent.
    pub(super) fn child(&self, uri: &str) -> Option<(ChildKind, i64)> {
        let parent = self.files.get(uri::parent(uri)?)?;
        parent
            .children
            .get(uri::basename(uri))
            .map(|child| (child.kind, child.sectors))
    }

    /// Grafts whose target lives directly in a directory keep that directory
    /// watched, as a dummy entry if it is not content itself.
    pub(super) fn hold_parent(&mut self, uri: &str) {
        let Some(parent) = uri::parent(uri) else {
            return;
        };
        let entry = self.files.entry(parent.to_string()).or_insert_with(|| {
            debug!("Keeping dummy directory {} to watch {}", parent, uri);
            FileEntry::dummy(parent)
        });
        entry.refs += 1;
        self.watch(parent);
    }

    pub(super) fn release_parent(&mut self, uri: &str) {
        let Some(parent) = uri::parent(uri) else {
            return;
        };
        let Some(entry) = self.files.get_mut(parent) else {
            warn!(
                "Assumption that the parent of a graft target is tracked failed {}",
                location!()
            );
            return;
        };
        entry.refs = entry.refs.saturating_sub(1);
        if entry.refs == 0 && entry.is_dummy() {
            debug!("Reclaiming dummy directory {}", parent);
            self.drop_entry(parent);
        }
    }

    pub(super) fn watch(&mut self, uri: &str) {
        let Some(entry) = self.files.get_mut(uri) else {
            return;
        };
        if entry.monitor.is_some() {
            return;
        }
        if let Some(handle) = self.monitor.watch(uri) {
            entry.monitor = Some(handle);
            self.watches.insert(handle, uri.to_string());
        }
    }

    pub(super) fn drop_entry(&mut self, uri: &str) {
        let Some(entry) = self.files.remove(uri) else {
            return;
        };
        if let Some(handle) = entry.monitor {
            self.monitor.unwatch(handle);
            self.watches.remove(&handle);
        }
    }

    /// Drops the tracked entries of a subtree no virtual path exposes anymore.
    /// Entries still exposed by other grafts survive; entries still holding
    /// graft parents become dummies.
    pub(super) fn forget_uri(&mut self, uri: &str) {
        let mut tracked = self
            .files
            .keys()
            .filter(|candidate| uri::is_ancestor_or_self(uri, candidate))
            .cloned()
            .collect::<Vec<_>>();
        tracked.sort_by_key(|candidate| Reverse(candidate.len()));

        for candidate in tracked {
            if candidate != uri
                && (self.grafts.has_grafts(&candidate)
                    || !self.inherited_locations(&candidate).is_empty())
            {
                continue;
            }
            let Some(entry) = self.files.get_mut(&candidate) else {
                continue;
            };
            if entry.refs > 0 {
                entry.set_content(None);
            } else {
                self.drop_entry(&candidate);
            }
        }

        if self.grafts.uris_under(uri).is_empty() {
            self.filters.remove_under(uri);
            self.symlinks.remove_under(uri);
            self.exclusions.remove_under(uri);
        }
        debug!("Forgot {}", uri);
    }

    pub(super) fn track(&mut self, uri: &str, info: &FileInfo) {
        if info.is_dir() {
            match self.files.get_mut(uri) {
                Some(entry) if entry.is_dummy() => entry.set_content(Some(info.sectors)),
                Some(_) => {}
                None => {
                    self.files
                        .insert(uri.to_string(), FileEntry::directory(uri, info.sectors));
                }
            }
        } else {
            self.files
                .entry(uri.to_string())
                .and_modify(|entry| entry.sectors = info.sectors)
                .or_insert_with(|| FileEntry::file(uri, info.sectors));
        }
    }

    /// Sets the size of a tracked entry and carries the difference up
    /// through the explored directories listing it.
    pub(super) fn set_sectors(&mut self, uri: &str, sectors: i64) {
        let Some(entry) = self.files.get_mut(uri) else {
            return;
        };
        let delta = sectors - entry.sectors.max(0);
        entry.sectors = sectors;
        if delta == 0 {
            return;
        }

        let mut current = uri.to_string();
        while let Some(parent) = uri::parent(&current).map(str::to_string) {
            let Some(entry) = self.files.get_mut(&parent) else {
                break;
            };
            let Some(child) = entry.children.get_mut(uri::basename(&current)) else {
                break;
            };
            child.sectors += delta;
            entry.sectors += delta;
            current = parent;
        }
    }

    /// Registers `path` and the explored content below it for Joliet checks.
    pub(super) fn register_joliet_tree(&mut self, graft: &str, path: &str, uri: &str) {
        self.joliet.register(path);
        let Some(entry) = self.files.get(uri) else {
            return;
        };
        if entry.is_dummy() || !entry.state.is_explored() {
            return;
        }
        let children = entry
            .children
            .iter()
            .map(|(name, child)| (name.clone(), child.kind))
            .collect::<Vec<_>>();

        for (name, kind) in children {
            let child_uri = uri::join(uri, &name);
            if self.exclusions.is_excluded_at(&child_uri, graft) {
                continue;
            }
            let child_path = uri::join(path, &uri::unescape_relative(&name));
            match kind {
                ChildKind::Directory => self.register_joliet_tree(graft, &child_path, &child_uri),
                ChildKind::File => {
                    self.joliet.register(&child_path);
                }
            }
        }
    }

    /// Total size of the disc content in sectors.
    pub fn sectors(&self) -> i64 {
        self.grafts
            .iter()
            .map(|(path, target)| match target {
                GraftTarget::Filesystem(uri) => {
                    let own = self
                        .files
                        .get(uri)
                        .map_or(0, |entry| entry.sectors.max(0));
                    own - self.excluded_sectors(path, uri)
                }
                GraftTarget::Imported => self
                    .imported
                    .get(path)
                    .map_or(0, |imported| imported.sectors),
                GraftTarget::Created => 0,
            })
            .sum()
    }

    /// Size of the content below `base` that `graft` does not expose.
    fn excluded_sectors(&self, graft: &str, base: &str) -> i64 {
        self.exclusions
            .iter()
            .filter(|(uri, grafts)| {
                uri::is_strict_ancestor(base, uri) && grafts.iter().any(|g| g == graft)
            })
            .filter(|(uri, _)| {
                !uri::ancestors(uri)
                    .take_while(|ancestor| *ancestor != base)
                    .any(|ancestor| self.exclusions.is_excluded_at(ancestor, graft))
            })
            .filter_map(|(uri, _)| {
                self.child(uri)
                    .map(|(_, sectors)| sectors)
                    .or_else(|| self.exclusions.size_of(uri))
            })
            .sum()
    }

    /// Grafts a filesystem object below the virtual directory `parent`; it
    /// is completed once its metadata arrives.
    pub fn add_uri(&mut self, uri: &str, parent: &str) -> Result<Reference, ProjectError> {
        ensure!(
            self.is_directory_path(parent),
            NotADirectorySnafu { path: parent }
        );
        let name = uri::display_name(uri).unwrap_or_else(|| uri::valid_name(uri));
        let path = uri::join(parent, &name);
        ensure!(self.lookup(&path).is_none(), NameCollisionSnafu { path: &path });

        info!("Adding {} at {}", uri, path);
        self.add_graft(GraftTarget::Filesystem(uri.to_string()), &path);
        Ok(self.stat_graft(uri, &path))
    }

    /// Queues a metadata request for the size of an excluded `uri`.
    pub(super) fn measure_excluded(&mut self, uri: &str) {
        let uri = uri.to_string();
        self.request(
            |id| VfsRequest::Stat {
                id,
                uris: vec![uri.clone()],
            },
            Pending::ExcludedSize { uri: uri.clone() },
        );
    }

    pub(super) fn stat_graft(&mut self, uri: &str, path: &str) -> Reference {
        let reference = self.references.insert(path);
        let uri = uri.to_string();
        self.request(
            |id| VfsRequest::Stat {
                id,
                uris: vec![uri.clone()],
            },
            Pending::Added {
                reference,
                uri: uri.clone(),
            },
        );
        reference
    }

    pub fn add_created_dir(&mut self, path: &str) -> Result<(), ProjectError> {
        let parent = uri::parent(path).context(InvalidNameSnafu { name: path })?;
        ensure!(
            self.is_directory_path(parent),
            NotADirectorySnafu { path: parent }
        );
        ensure!(self.lookup(path).is_none(), NameCollisionSnafu { path });
        self.add_graft(GraftTarget::Created, path);
        Ok(())
    }

    /// Removes a virtual path with everything below it. Inherited content
    /// is excluded at its graft point rather than removed.
    pub fn remove_path(&mut self, path: &str) -> Result<(), ProjectError> {
        let target = self.lookup(path).context(PathNotFoundSnafu { path })?;
        for graft in self.grafts.descendants(path) {
            self.remove_graft(&graft);
        }
        match target {
            PathTarget::Graft(_) => {
                self.remove_graft(path);
            }
            PathTarget::Inherited { graft, uri } => {
                self.exclude_uri(&graft, &uri);
            }
        }
        Ok(())
    }

    pub fn rename_path(&mut self, path: &str, new_name: &str) -> Result<String, ProjectError> {
        ensure!(
            !new_name.is_empty() && !new_name.contains('/'),
            InvalidNameSnafu { name: new_name }
        );
        let parent = uri::parent(path).context(PathNotFoundSnafu { path })?;
        let new_path = uri::join(parent, new_name);
        self.move_to(path, &new_path)?;
        Ok(new_path)
    }

    pub fn move_path(&mut self, path: &str, new_parent: &str) -> Result<String, ProjectError> {
        ensure!(
            !uri::is_ancestor_or_self(path, new_parent),
            MoveIntoItselfSnafu { path }
        );
        ensure!(
            self.is_directory_path(new_parent),
            NotADirectorySnafu { path: new_parent }
        );
        let new_path = uri::join(new_parent, uri::basename(path));
        self.move_to(path, &new_path)?;
        Ok(new_path)
    }

    fn move_to(&mut self, path: &str, new_path: &str) -> Result<(), ProjectError> {
        if path == new_path {
            return Ok(());
        }
        let target = self.lookup(path).context(PathNotFoundSnafu { path })?;
        ensure!(
            self.lookup(new_path).is_none(),
            NameCollisionSnafu { path: new_path }
        );
        info!("Moving {} to {}", path, new_path);

        match target {
            PathTarget::Graft(_) => self.relocate_grafts(path, new_path, true),
            PathTarget::Inherited { graft, uri } => {
                let child = self.child(&uri);
                self.relocate_grafts(path, new_path, false);
                self.exclusions.exclude(&graft, &uri);
                self.joliet.unregister_under(path);
                self.add_graft(GraftTarget::Filesystem(uri.clone()), new_path);
                if !self.files.contains_key(&uri) {
                    if let Some((kind, sectors)) = child {
                        let info = match kind {
                            ChildKind::Directory => FileInfo::directory(sectors),
                            ChildKind::File => FileInfo::file(sectors),
                        };
                        self.track(&uri, &info);
                    }
                }
                self.register_joliet_tree(new_path, new_path, &uri);
            }
        }
        Ok(())
    }

    /// Moves the graft points below `old` (and `old` itself when asked) to
    /// `new`, together with everything keyed by their virtual paths.
    pub(super) fn relocate_grafts(&mut self, old: &str, new: &str, include_self: bool) {
        let mut moved = self.grafts.descendants(old);
        if include_self {
            moved.push(old.to_string());
        }
        for graft in moved {
            let Some(destination) = uri::rebase(&graft, old, new) else {
                continue;
            };
            if !self.grafts.relocate(&graft, &destination) {
                warn!("Could not move graft point {} to {}", graft, destination);
                continue;
            }
            if let Some(imported) = self.imported.remove(&graft) {
                self.imported.insert(destination, imported);
            }
        }
        self.exclusions.rename_grafts(old, new);
        self.references.rename_prefix(old, new);
        self.joliet.rename_prefix(old, new);
        if include_self {
            self.joliet.register(new);
        }
    }

    /// Puts a filtered URI back into the project.
    pub fn restore(&mut self, uri: &str) -> Result<(), ProjectError> {
        let status = self.filters.status(uri).context(NotFilteredSnafu { uri })?;
        ensure!(
            status != FilterStatus::RecursiveSymlink,
            UnrestorableSnafu { uri, status }
        );
        self.filters.unfilter(uri);
        self.filters.mark_restored(uri, status);
        info!("Restored {} ({})", uri, status);
        self.notify(uri, true, status);
        self.rescan(uri);
        Ok(())
    }

    /// Filters a restored URI again.
    pub fn unrestore(&mut self, uri: &str) -> Result<(), ProjectError> {
        let status = self
            .filters
            .unrestore(uri)
            .context(NotRestoredSnafu { uri })?;
        self.demote(uri, status);
        Ok(())
    }

    /// Empties the project. Handles and replies issued so far go stale.
    pub fn reset(&mut self) {
        info!("Resetting project");
        for (handle, _) in self.watches.drain() {
            self.monitor.unwatch(handle);
        }
        self.references.invalidate_all();
        self.grafts.clear();
        self.exclusions.clear();
        self.files.clear();
        self.symlinks.clear();
        self.filters.clear();
        self.joliet.clear();
        self.imported.clear();
        self.pending.clear();
        self.moves.clear();
        self.notices.clear();
        self.requests.clear();
        self.requests.push_back(VfsRequest::CancelAll);
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ProjectError {
    #[snafu(display("'{path}' is not a directory of the project"))]
    NotADirectory { path: String },
    #[snafu(display("'{path}' already exists in the project"))]
    NameCollision { path: String },
    #[snafu(display("'{path}' is not part of the project"))]
    PathNotFound { path: String },
    #[snafu(display("'{name}' is not a valid name"))]
    InvalidName { name: String },
    #[snafu(display("Cannot move '{path}' into itself"))]
    MoveIntoItself { path: String },
    #[snafu(display("{uri} is not filtered"))]
    NotFiltered { uri: String },
    #[snafu(display("{uri} was not restored"))]
    NotRestored { uri: String },
    #[snafu(display("{uri} cannot be restored ({status})"))]
    Unrestorable { uri: String, status: FilterStatus },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::memory::{MemoryVfs, recorded_project};

    fn music() -> MemoryVfs {
        let mut fs = MemoryVfs::default();
        fs.file("file:///home/u/music/a.ogg", 10)
            .file("file:///home/u/music/b.ogg", 20)
            .file("file:///home/u/music/sub/c.ogg", 5);
        fs
    }

    const MUSIC: &str = "file:///home/u/music";

    #[test]
    fn graft_points_are_unique() {
        let (mut project, _) = recorded_project();
        assert!(project.add_graft(GraftTarget::Created, "/x"));
        assert!(!project.add_graft(GraftTarget::Created, "/x"));
        assert!(project.remove_graft("/x"));
        assert!(!project.remove_graft("/x"));
        assert!(project.add_graft(GraftTarget::Created, "/x"));
    }

    #[test]
    fn added_directories_are_sized_and_explored() {
        let fs = music();
        let (mut project, monitor) = recorded_project();
        project.add_uri(MUSIC, "/").expect("adding should succeed");
        fs.serve(&mut project);

        assert_eq!(project.sectors(), 35);
        assert_eq!(
            project.lookup("/music/sub"),
            Some(PathTarget::Inherited {
                graft: "/music".into(),
                uri: format!("{MUSIC}/sub"),
            })
        );
        assert!(project.is_directory_path("/music/sub"));
        assert!(!project.is_directory_path("/music/a.ogg"));
        assert!(monitor.is_watched(MUSIC));
        assert!(!project.has_pending_work());
    }

    #[test]
    fn dummy_parents_live_as_long_as_their_grafts() {
        let mut fs = MemoryVfs::default();
        fs.file("file:///a/s1/f", 1)
            .file("file:///a/s2/f", 1)
            .file("file:///a/s3/f", 1);
        let (mut project, monitor) = recorded_project();
        for sub in ["s1", "s2", "s3"] {
            project
                .add_uri(&format!("file:///a/{sub}"), "/")
                .expect("adding should succeed");
        }
        fs.serve(&mut project);

        let parent = project.entry("file:///a").expect("parent should be kept");
        assert!(parent.is_dummy());
        assert_eq!(parent.refs, 3);
        assert!(monitor.is_watched("file:///a"));

        project.remove_path("/s1").expect("removal should succeed");
        assert_eq!(project.entry("file:///a").map(|entry| entry.refs), Some(2));
        assert!(!monitor.is_watched("file:///a/s1"));
        project.remove_path("/s2").expect("removal should succeed");
        assert_eq!(project.entry("file:///a").map(|entry| entry.refs), Some(1));
        project.remove_path("/s3").expect("removal should succeed");

        assert!(project.entry("file:///a").is_none());
        assert!(!monitor.is_watched("file:///a"));
        assert!(project.is_empty());
    }

    #[test]
    fn exclusion_needs_every_graft() {
        let mut fs = MemoryVfs::default();
        fs.file("file:///d/x", 4).file("file:///d/y", 1);
        let (mut project, _) = recorded_project();
        project.add_uri("file:///d", "/").expect("adding should succeed");
        project.add_created_dir("/copy").expect("creating should succeed");
        project
            .add_uri("file:///d", "/copy")
            .expect("adding should succeed");
        fs.serve(&mut project);

        let x = "file:///d/x";
        assert!(!project.is_excluded(x));
        assert_eq!(project.sectors(), 10);

        assert!(project.exclude_uri("/d", x));
        assert!(!project.is_excluded(x));
        assert_eq!(project.lookup("/d/x"), None);
        assert!(project.lookup("/copy/d/x").is_some());
        assert_eq!(project.sectors(), 6);

        assert!(project.exclude_uri("/copy/d", x));
        assert!(project.is_excluded(x));
        assert!(project.to_virtual_paths(x, true).is_empty());
        assert_eq!(project.sectors(), 2);

        assert!(project.restore_uri("/d", x));
        assert!(!project.is_excluded(x));
        assert!(project.lookup("/d/x").is_some());
        assert!(!project.restore_uri("/d", x));
    }

    #[test]
    fn virtual_paths_resolve_back_to_their_uri() {
        let mut fs = MemoryVfs::default();
        fs.file("file:///d/x", 4).file("file:///d/sub/z", 2);
        let (mut project, _) = recorded_project();
        project.add_uri("file:///d", "/").expect("adding should succeed");
        project.add_created_dir("/copy").expect("creating should succeed");
        project
            .add_uri("file:///d", "/copy")
            .expect("adding should succeed");
        fs.serve(&mut project);
        project.set_expanded("/d").expect("expanding should succeed");
        fs.serve(&mut project);

        for uri in ["file:///d/x", "file:///d/sub", "file:///d/sub/z"] {
            let paths = project.to_virtual_paths(uri, true);
            assert_eq!(paths.len(), 2, "{uri} should appear under both grafts");
            for path in paths {
                let target = project.lookup(&path).expect("path should resolve");
                assert_eq!(target.uri(), Some(uri));
                assert!(project.resolve_graft(&path).is_some());
            }
        }
    }

    #[test]
    fn renaming_inherited_content_grafts_it() {
        let fs = music();
        let (mut project, _) = recorded_project();
        project.add_uri(MUSIC, "/").expect("adding should succeed");
        fs.serve(&mut project);

        let renamed = project
            .rename_path("/music/a.ogg", "first.ogg")
            .expect("renaming should succeed");
        assert_eq!(renamed, "/music/first.ogg");
        assert_eq!(project.lookup("/music/a.ogg"), None);
        assert_eq!(
            project.lookup("/music/first.ogg"),
            Some(PathTarget::Graft(GraftTarget::Filesystem(format!(
                "{MUSIC}/a.ogg"
            ))))
        );
        assert_eq!(project.sectors(), 35);
    }

    #[test]
    fn moving_a_graft_carries_its_content() {
        let fs = music();
        let (mut project, _) = recorded_project();
        project.add_uri(MUSIC, "/").expect("adding should succeed");
        fs.serve(&mut project);
        project.add_created_dir("/box").expect("creating should succeed");

        let moved = project
            .move_path("/music", "/box")
            .expect("moving should succeed");
        assert_eq!(moved, "/box/music");
        assert_eq!(project.lookup("/music"), None);
        assert!(matches!(
            project.lookup("/box/music/b.ogg"),
            Some(PathTarget::Inherited { .. })
        ));
        assert!(matches!(
            project.move_path("/box", "/box/music"),
            Err(ProjectError::MoveIntoItself { .. })
        ));
    }

    #[test]
    fn removing_inherited_content_excludes_it() {
        let fs = music();
        let (mut project, _) = recorded_project();
        project.add_uri(MUSIC, "/").expect("adding should succeed");
        fs.serve(&mut project);

        project
            .remove_path("/music/b.ogg")
            .expect("removal should succeed");
        assert_eq!(project.sectors(), 15);
        assert_eq!(project.excluded_list(), vec![format!("{MUSIC}/b.ogg")]);
    }

    #[test]
    fn invalid_edits_are_refused() {
        let fs = music();
        let (mut project, _) = recorded_project();
        project.add_uri(MUSIC, "/").expect("adding should succeed");
        fs.serve(&mut project);

        assert!(matches!(
            project.add_uri("file:///elsewhere/x", "/music/b.ogg"),
            Err(ProjectError::NotADirectory { .. })
        ));
        assert!(matches!(
            project.add_uri("file:///elsewhere/b.ogg", "/music"),
            Err(ProjectError::NameCollision { .. })
        ));
        assert!(matches!(
            project.remove_path("/nothing"),
            Err(ProjectError::PathNotFound { .. })
        ));
        assert!(matches!(
            project.rename_path("/music/b.ogg", "a/b"),
            Err(ProjectError::InvalidName { .. })
        ));
        assert!(matches!(
            project.rename_path("/music/b.ogg", "a.ogg"),
            Err(ProjectError::NameCollision { .. })
        ));
    }

    #[test]
    fn unreadable_additions_are_filtered() {
        let mut fs = MemoryVfs::default();
        fs.file("file:///secret", 1).set_readable("file:///secret", false);
        let (mut project, _) = recorded_project();
        project
            .add_uri("file:///secret", "/")
            .expect("adding should succeed");
        fs.serve(&mut project);

        assert_eq!(project.lookup("/secret"), None);
        assert!(project.is_empty());
        assert!(project.entry("file:///").is_none());
        assert_eq!(
            project.take_notices(),
            vec![FilterNotice {
                uri: "file:///secret".into(),
                restored: false,
                status: FilterStatus::Unreadable,
            }]
        );
    }

    #[test]
    fn replies_issued_before_a_reset_are_stale() {
        let fs = music();
        let (mut project, monitor) = recorded_project();
        project.add_uri(MUSIC, "/").expect("adding should succeed");
        let requests = project.take_requests();

        project.reset();
        assert_eq!(project.take_requests(), vec![VfsRequest::CancelAll]);
        for request in &requests {
            if let Some(reply) = fs.answer(request) {
                project.handle_reply(reply);
            }
        }
        assert!(project.is_empty());
        assert!(project.entry(MUSIC).is_none());
        assert!(!monitor.is_watched("file:///home/u"));
        assert!(!project.has_pending_work());
    }
}
