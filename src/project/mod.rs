mod data_project;
mod exclusion;
mod explore;
mod export;
mod file_entry;
mod filter;
mod graft;
mod joliet;
mod reconcile;
mod reference;
mod snapshot;
mod symlink;
pub mod uri;

pub use data_project::{DataProject, PathTarget, ProjectError};
pub use file_entry::{Child, ChildKind, DirState, FileEntry};
pub use filter::{FilterConfig, FilterNotice, FilterStatus};
pub use graft::{GraftPoint, GraftTarget};
pub use joliet::{JOLIET_MAX_NAME, is_incompatible as is_joliet_incompatible};
pub use reconcile::MOVE_TIMEOUT;
pub use reference::Reference;
pub use snapshot::{ProjectSnapshot, SnapshotError};
