use std::fs::{self, Metadata};
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::available_parallelism;

use compio::dispatcher::{Dispatcher, DispatcherBuilder};
use compio::runtime::spawn;
use futures_channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use snafu::ResultExt;
use tracing::{debug, info, warn};

use crate::ext::BestEffortPathExt;
use crate::project::uri;
use crate::vfs::error::{DispatcherSnafu, VfsError};
use crate::vfs::types::{FileInfo, FsError, RequestId, VfsEntry, VfsReply, VfsRequest, bytes_to_sectors};

/// Default number of worker threads when unable to determine system parallelism
const DEFAULT_WORKER_THREADS: NonZeroUsize = NonZeroUsize::MIN;

/// Serves project requests from the local filesystem on a worker pool.
///
/// Replies come out of the receiver returned by [`LocalVfs::new`], in
/// completion order. Replies to requests submitted before a
/// [`VfsRequest::CancelAll`] are dropped.
pub struct LocalVfs {
    dispatcher: Dispatcher,
    sender: UnboundedSender<VfsReply>,
    generation: Arc<AtomicU64>,
}

impl LocalVfs {
    pub fn new() -> Result<(Self, UnboundedReceiver<VfsReply>), VfsError> {
        let workers_num = Self::determine_worker_count();
        debug!("Using {} worker threads for filesystem requests", workers_num);

        let dispatcher = DispatcherBuilder::new()
            .worker_threads(workers_num)
            .build()
            .context(DispatcherSnafu)?;
        let (sender, receiver) = mpsc::unbounded();

        Ok((
            Self {
                dispatcher,
                sender,
                generation: Arc::new(AtomicU64::new(0)),
            },
            receiver,
        ))
    }

    fn determine_worker_count() -> NonZeroUsize {
        available_parallelism().unwrap_or(DEFAULT_WORKER_THREADS)
    }

    pub fn submit(&self, request: VfsRequest) -> Result<(), VfsError> {
        match request {
            VfsRequest::List { id, uri } => {
                let fallback = uri.clone();
                self.dispatch(
                    id,
                    move || {
                        let result = list(&uri);
                        VfsReply::Listing { id, uri, result }
                    },
                    move |error| VfsReply::Listing {
                        id,
                        uri: fallback,
                        result: Err(error),
                    },
                )
            }
            VfsRequest::Stat { id, uris } => {
                let fallback = uris.clone();
                self.dispatch(
                    id,
                    move || VfsReply::Stat {
                        id,
                        entries: uris
                            .into_iter()
                            .map(|uri| {
                                let info = stat(&uri);
                                VfsEntry::new(uri, info)
                            })
                            .collect(),
                    },
                    move |error| VfsReply::Stat {
                        id,
                        entries: fallback
                            .into_iter()
                            .map(|uri| VfsEntry::new(uri, Err(error.clone())))
                            .collect(),
                    },
                )
            }
            VfsRequest::Prioritize { id } => {
                debug!("{} is served in submission order", id);
                Ok(())
            }
            VfsRequest::CancelAll => {
                let previous = self.generation.fetch_add(1, Ordering::SeqCst);
                info!("Cancelled filesystem requests of generation {}", previous);
                Ok(())
            }
        }
    }

    /// Runs `work` on the pool and forwards its reply. `failed` stands in for
    /// the reply when the worker goes away.
    fn dispatch<W, F>(&self, id: RequestId, work: W, failed: F) -> Result<(), VfsError>
    where
        W: FnOnce() -> VfsReply + Send + 'static,
        F: FnOnce(FsError) -> VfsReply + 'static,
    {
        let generation = self.generation.load(Ordering::SeqCst);
        let receiver = self
            .dispatcher
            .dispatch(move || async move { work() })
            .map_err(|e| VfsError::DispatchError {
                request: id.to_string(),
                error: e.to_string(),
            })?;
        debug!("Dispatched {}", id);

        let sender = self.sender.clone();
        let current = Arc::clone(&self.generation);
        spawn(async move {
            let reply = match receiver.await {
                Ok(reply) => reply,
                Err(e) => {
                    warn!("{} was canceled: {}", id, e);
                    failed(FsError::Io(e.to_string()))
                }
            };
            if current.load(Ordering::SeqCst) != generation {
                debug!("Dropping reply to cancelled {}", id);
                return;
            }
            if let Err(send_err) = sender.unbounded_send(reply) {
                debug!("Failed to send reply to {}: {}", id, send_err);
            }
        })
        .detach();

        Ok(())
    }
}

/// Metadata of the object at `uri`, following symlinks.
pub(super) fn stat(uri: &str) -> Result<FileInfo, FsError> {
    let path = uri::to_path(uri);
    let metadata = fs::symlink_metadata(&path)?;
    if !metadata.file_type().is_symlink() {
        return Ok(describe(&path, &metadata));
    }

    match fs::canonicalize(&path) {
        Ok(target) => {
            let resolved = fs::metadata(&target)?;
            Ok(FileInfo::symlink(
                uri::from_path(&target),
                describe(&target, &resolved),
            ))
        }
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            let target = fs::read_link(&path)?;
            let target = match path.parent() {
                Some(parent) if target.is_relative() => parent.join(target),
                _ => target,
            };
            Ok(FileInfo::broken_symlink(uri::from_path(&target)))
        }
        Err(error) => Err(error.into()),
    }
}

fn describe(path: &Path, metadata: &Metadata) -> FileInfo {
    let info = if metadata.is_dir() {
        FileInfo::directory(tree_sectors(path))
    } else if metadata.is_file() {
        FileInfo::file(bytes_to_sectors(metadata.len()))
    } else {
        return FileInfo::other();
    };

    let readable = if metadata.is_dir() {
        fs::read_dir(path).is_ok()
    } else {
        fs::File::open(path).is_ok()
    };
    if readable { info } else { info.unreadable() }
}

/// Sectors of every regular file below `path`, symlinks not followed.
/// Unreadable parts count as empty.
fn tree_sectors(path: &Path) -> i64 {
    let mut total = 0;
    let mut pending = vec![path.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let Ok(entries) = fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if file_type.is_dir() {
                pending.push(entry.path());
            } else if file_type.is_file() {
                total += entry
                    .metadata()
                    .map(|metadata| bytes_to_sectors(metadata.len()))
                    .unwrap_or(0);
            }
        }
    }
    total
}

/// The children of the directory at `uri`, sorted by URI.
pub(super) fn list(uri: &str) -> Result<Vec<VfsEntry>, FsError> {
    let path = uri::to_path(uri);
    let mut entries = fs::read_dir(&path)?
        .map(|entry| {
            let child = uri::from_path(&entry?.path());
            let info = stat(&child);
            Ok(VfsEntry::new(child, info))
        })
        .collect::<Result<Vec<_>, std::io::Error>>()?;
    entries.sort_by(|a, b| a.uri.cmp(&b.uri));
    debug!(
        "Listed {} entries in {}",
        entries.len(),
        path.best_effort_path_display()
    );
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::types::FileKind;
    use futures::StreamExt;
    use tempfile::TempDir;

    fn fixture() -> TempDir {
        let dir = TempDir::new().expect("Failed to create temp dir");
        fs::create_dir(dir.path().join("sub")).expect("Failed to create dir");
        fs::write(dir.path().join("sub/big"), vec![0u8; 5000]).expect("Failed to write file");
        fs::write(dir.path().join("small"), b"x").expect("Failed to write file");
        dir
    }

    #[test]
    fn directories_are_sized_recursively() {
        let dir = fixture();
        let info = stat(&uri::from_path(dir.path())).expect("stat should succeed");
        assert_eq!(info, FileInfo::directory(3 + 1));
    }

    #[test]
    fn missing_objects_are_not_found() {
        let dir = fixture();
        let missing = uri::from_path(&dir.path().join("missing"));
        assert_eq!(stat(&missing), Err(FsError::NotFound));
        assert_eq!(list(&missing), Err(FsError::NotFound));
    }

    #[test]
    fn listings_are_sorted() {
        let dir = fixture();
        let root = uri::from_path(dir.path());
        let entries = list(&root).expect("listing should succeed");
        let names = entries
            .iter()
            .map(|entry| uri::basename(&entry.uri).to_string())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["small", "sub"]);
        assert_eq!(entries[0].info, Ok(FileInfo::file(1)));
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_report_their_target() {
        use std::os::unix::fs::symlink;

        let dir = fixture();
        let canonical = dir.path().canonicalize().expect("Failed to canonicalize");
        symlink(canonical.join("sub"), canonical.join("link")).expect("Failed to symlink");
        symlink("nowhere", canonical.join("dead")).expect("Failed to symlink");
        symlink(canonical.join("loop"), canonical.join("loop")).expect("Failed to symlink");

        let link = stat(&uri::from_path(&canonical.join("link"))).expect("stat should succeed");
        assert_eq!(link.kind, FileKind::Directory);
        assert_eq!(link.sectors, 3);
        assert_eq!(
            link.symlink_target,
            Some(uri::from_path(&canonical.join("sub")))
        );

        let dead = stat(&uri::from_path(&canonical.join("dead"))).expect("stat should succeed");
        assert_eq!(
            dead,
            FileInfo::broken_symlink(uri::from_path(&canonical.join("nowhere")))
        );

        assert_eq!(
            stat(&uri::from_path(&canonical.join("loop"))),
            Err(FsError::Loop)
        );
    }

    #[compio::test]
    async fn requests_are_answered_through_the_channel() {
        let dir = fixture();
        let root = uri::from_path(dir.path());
        let (vfs, mut replies) = LocalVfs::new().expect("Failed to create vfs");

        vfs.submit(VfsRequest::Stat {
            id: RequestId(4),
            uris: vec![root.clone()],
        })
        .expect("submit should succeed");

        let reply = replies.next().await.expect("reply should arrive");
        assert_eq!(
            reply,
            VfsReply::Stat {
                id: RequestId(4),
                entries: vec![VfsEntry::new(root, Ok(FileInfo::directory(4)))],
            }
        );
    }
}
