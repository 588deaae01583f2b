use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use snafu::ResultExt;
use tracing::{debug, warn};

use crate::ext::BestEffortPathExt;
use crate::project::uri;
use crate::vfs::error::{VfsError, WatcherSnafu};
use crate::vfs::types::{WatchEvent, WatchEventKind, WatchHandle};

/// Directory watching as seen by the project.
pub trait Monitor {
    /// Starts watching the directory at `uri`. `None` when it can't be watched.
    fn watch(&mut self, uri: &str) -> Option<WatchHandle>;
    fn unwatch(&mut self, handle: WatchHandle);
}

/// Watches nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMonitor;

impl Monitor for NullMonitor {
    fn watch(&mut self, _uri: &str) -> Option<WatchHandle> {
        None
    }

    fn unwatch(&mut self, _handle: WatchHandle) {}
}

#[derive(Debug, Default)]
struct WatchedDirs {
    by_path: HashMap<PathBuf, WatchHandle>,
    by_handle: HashMap<WatchHandle, PathBuf>,
}

fn lock(watched: &Mutex<WatchedDirs>) -> MutexGuard<'_, WatchedDirs> {
    watched.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Non-recursive watches through the platform watcher. Events come out of
/// the receiver returned by [`NotifyMonitor::new`].
pub struct NotifyMonitor {
    watcher: RecommendedWatcher,
    watched: Arc<Mutex<WatchedDirs>>,
    next_handle: u64,
}

impl NotifyMonitor {
    pub fn new() -> Result<(Self, UnboundedReceiver<WatchEvent>), VfsError> {
        let (sender, receiver) = mpsc::unbounded();
        let watched = Arc::new(Mutex::new(WatchedDirs::default()));
        let shared = Arc::clone(&watched);

        let watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            match result {
                Ok(event) => forward(&shared, &sender, event),
                Err(error) => warn!("Filesystem watcher reported an error: {}", error),
            }
        })
        .context(WatcherSnafu)?;

        Ok((
            Self {
                watcher,
                watched,
                next_handle: 0,
            },
            receiver,
        ))
    }
}

impl Monitor for NotifyMonitor {
    fn watch(&mut self, uri: &str) -> Option<WatchHandle> {
        let path = uri::to_path(uri);
        if let Err(error) = self.watcher.watch(&path, RecursiveMode::NonRecursive) {
            warn!(
                "Failed to watch {}: {}",
                path.best_effort_path_display(),
                error
            );
            return None;
        }

        self.next_handle += 1;
        let handle = WatchHandle(self.next_handle);
        let mut watched = lock(&self.watched);
        watched.by_path.insert(path.clone(), handle);
        watched.by_handle.insert(handle, path);
        Some(handle)
    }

    fn unwatch(&mut self, handle: WatchHandle) {
        let Some(path) = lock(&self.watched).by_handle.remove(&handle) else {
            return;
        };
        lock(&self.watched).by_path.remove(&path);
        if let Err(error) = self.watcher.unwatch(&path) {
            debug!(
                "Failed to unwatch {}: {}",
                path.best_effort_path_display(),
                error
            );
        }
    }
}

fn forward(watched: &Mutex<WatchedDirs>, sender: &UnboundedSender<WatchEvent>, event: Event) {
    for translated in translate(&lock(watched), &event) {
        if let Err(error) = sender.unbounded_send(translated) {
            debug!("Dropping filesystem event: {}", error);
        }
    }
}

/// Maps a platform event onto the watched directories it concerns.
fn translate(watched: &WatchedDirs, event: &Event) -> Vec<WatchEvent> {
    let cookie = event.tracker().map(|tracker| tracker as u32);
    event
        .paths
        .iter()
        .filter_map(|path| {
            if let Some(&handle) = watched.by_path.get(path) {
                let kind = match event.kind {
                    EventKind::Remove(_) => WatchEventKind::SelfDeleted,
                    EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                        WatchEventKind::SelfMoved
                    }
                    _ => return None,
                };
                return Some(WatchEvent::new(handle, "", kind));
            }

            let &handle = watched.by_path.get(path.parent()?)?;
            let kind = match event.kind {
                EventKind::Create(_) => WatchEventKind::Create,
                EventKind::Remove(_) => WatchEventKind::Delete,
                EventKind::Modify(ModifyKind::Metadata(_)) => WatchEventKind::AttributeChange,
                EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                    cookie.map_or(WatchEventKind::Delete, WatchEventKind::MovedFrom)
                }
                EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                    cookie.map_or(WatchEventKind::Create, WatchEventKind::MovedTo)
                }
                // Both halves were already reported on their own.
                EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => return None,
                EventKind::Modify(_) => WatchEventKind::Modify,
                _ => return None,
            };
            Some(WatchEvent::new(handle, name_of(path), kind))
        })
        .collect()
}

fn name_of(path: &Path) -> String {
    uri::basename(&uri::from_path(path)).to_string()
}
