//! An in-memory filesystem answering project requests synchronously, and a
//! monitor that only records what is watched.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use crate::project::{DataProject, uri};
use crate::vfs::{
    FileInfo, FsError, Monitor, VfsEntry, VfsReply, VfsRequest, WatchHandle,
};

const MAX_SYMLINK_HOPS: usize = 8;

#[derive(Debug, Clone)]
enum Node {
    File { sectors: i64, readable: bool },
    Directory { readable: bool },
    Symlink { target: String },
}

#[derive(Debug, Default)]
pub struct MemoryVfs {
    nodes: BTreeMap<String, Node>,
}

impl MemoryVfs {
    fn ensure_parents(&mut self, path: &str) {
        for ancestor in uri::ancestors(path) {
            self.nodes
                .entry(ancestor.to_string())
                .or_insert(Node::Directory { readable: true });
        }
    }

    pub fn file(&mut self, path: &str, sectors: i64) -> &mut Self {
        self.ensure_parents(path);
        self.nodes.insert(
            path.to_string(),
            Node::File {
                sectors,
                readable: true,
            },
        );
        self
    }

    pub fn dir(&mut self, path: &str) -> &mut Self {
        self.ensure_parents(path);
        self.nodes
            .insert(path.to_string(), Node::Directory { readable: true });
        self
    }

    pub fn symlink(&mut self, path: &str, target: &str) -> &mut Self {
        self.ensure_parents(path);
        self.nodes.insert(
            path.to_string(),
            Node::Symlink {
                target: target.to_string(),
            },
        );
        self
    }

    pub fn set_readable(&mut self, path: &str, value: bool) -> &mut Self {
        match self.nodes.get_mut(path) {
            Some(Node::File { readable, .. } | Node::Directory { readable }) => *readable = value,
            _ => {}
        }
        self
    }

    pub fn remove(&mut self, path: &str) {
        self.nodes
            .retain(|candidate, _| !uri::is_ancestor_or_self(path, candidate));
    }

    pub fn rename(&mut self, old: &str, new: &str) {
        let moved = self
            .nodes
            .keys()
            .filter(|candidate| uri::is_ancestor_or_self(old, candidate))
            .cloned()
            .collect::<Vec<_>>();
        for key in moved {
            if let (Some(node), Some(new_key)) = (self.nodes.remove(&key), uri::rebase(&key, old, new)) {
                self.nodes.insert(new_key, node);
            }
        }
    }

    fn dir_sectors(&self, path: &str) -> i64 {
        self.nodes
            .iter()
            .filter(|(candidate, _)| uri::is_strict_ancestor(path, candidate))
            .map(|(_, node)| match node {
                Node::File { sectors, .. } => *sectors,
                _ => 0,
            })
            .sum()
    }

    fn resolve(&self, path: &str, hops: usize) -> Result<FileInfo, FsError> {
        match self.nodes.get(path).ok_or(FsError::NotFound)? {
            Node::File { sectors, readable } => {
                let info = FileInfo::file(*sectors);
                Ok(if *readable { info } else { info.unreadable() })
            }
            Node::Directory { readable } => {
                let info = FileInfo::directory(self.dir_sectors(path));
                Ok(if *readable { info } else { info.unreadable() })
            }
            Node::Symlink { target } if hops < MAX_SYMLINK_HOPS => self.resolve(target, hops + 1),
            Node::Symlink { .. } => Err(FsError::Loop),
        }
    }

    pub fn info(&self, path: &str) -> Result<FileInfo, FsError> {
        match self.nodes.get(path) {
            Some(Node::Symlink { target }) => match self.resolve(target, 1) {
                Ok(resolved) => Ok(FileInfo::symlink(target.clone(), resolved)),
                Err(FsError::NotFound) => Ok(FileInfo::broken_symlink(target.clone())),
                Err(error) => Err(error),
            },
            _ => self.resolve(path, 0),
        }
    }

    pub fn answer(&self, request: &VfsRequest) -> Option<VfsReply> {
        match request {
            VfsRequest::List { id, uri: listed } => {
                let result = match self.nodes.get(listed.as_str()) {
                    Some(Node::Directory { readable: true }) => Ok(self
                        .nodes
                        .keys()
                        .filter(|candidate| uri::parent(candidate) == Some(listed.as_str()))
                        .map(|child| VfsEntry::new(child.clone(), self.info(child)))
                        .collect()),
                    Some(Node::Directory { readable: false }) => Err(FsError::PermissionDenied),
                    Some(_) => Err(FsError::Io("not a directory".into())),
                    None => Err(FsError::NotFound),
                };
                Some(VfsReply::Listing {
                    id: *id,
                    uri: listed.clone(),
                    result,
                })
            }
            VfsRequest::Stat { id, uris } => Some(VfsReply::Stat {
                id: *id,
                entries: uris
                    .iter()
                    .map(|stat| VfsEntry::new(stat.clone(), self.info(stat)))
                    .collect(),
            }),
            VfsRequest::Prioritize { .. } | VfsRequest::CancelAll => None,
        }
    }

    /// Answers queued requests until the project asks for nothing more.
    pub fn serve(&self, project: &mut DataProject) {
        loop {
            let requests = project.take_requests();
            if requests.is_empty() {
                return;
            }
            for request in requests {
                if let Some(reply) = self.answer(&request) {
                    project.handle_reply(reply);
                }
            }
        }
    }
}

#[derive(Debug, Default)]
struct Watched {
    next: u64,
    active: HashMap<WatchHandle, String>,
}

/// Hands out handles and remembers which directories are watched.
#[derive(Debug, Default, Clone)]
pub struct RecordingMonitor {
    watched: Rc<RefCell<Watched>>,
}

impl RecordingMonitor {
    pub fn handle(&self, path: &str) -> Option<WatchHandle> {
        self.watched
            .borrow()
            .active
            .iter()
            .find(|(_, watched)| watched.as_str() == path)
            .map(|(handle, _)| *handle)
    }

    pub fn is_watched(&self, path: &str) -> bool {
        self.handle(path).is_some()
    }
}

impl Monitor for RecordingMonitor {
    fn watch(&mut self, path: &str) -> Option<WatchHandle> {
        let mut watched = self.watched.borrow_mut();
        watched.next += 1;
        let handle = WatchHandle(watched.next);
        watched.active.insert(handle, path.to_string());
        Some(handle)
    }

    fn unwatch(&mut self, handle: WatchHandle) {
        self.watched.borrow_mut().active.remove(&handle);
    }
}

/// A project watched by a [`RecordingMonitor`], with default filters.
pub fn recorded_project() -> (DataProject, RecordingMonitor) {
    let monitor = RecordingMonitor::default();
    let project = DataProject::new(Default::default(), Box::new(monitor.clone()));
    (project, monitor)
}
