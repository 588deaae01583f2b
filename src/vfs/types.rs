use derive_more::Display;

/// Disc sector size used for every size computation.
pub const SECTOR_SIZE: u64 = 2048;

pub fn bytes_to_sectors(bytes: u64) -> i64 {
    bytes.div_ceil(SECTOR_SIZE) as i64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
#[display("req#{_0}")]
pub struct RequestId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    File,
    Directory,
    /// A symlink whose target does not resolve.
    BrokenSymlink,
    Other,
}

/// Transient filesystem failures; these never abort a bulk operation.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum FsError {
    #[display("not found")]
    NotFound,
    #[display("permission denied")]
    PermissionDenied,
    #[display("too many levels of symbolic links")]
    Loop,
    #[display("i/o error: {_0}")]
    Io(String),
}

impl From<std::io::Error> for FsError {
    fn from(error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::NotFound => FsError::NotFound,
            std::io::ErrorKind::PermissionDenied => FsError::PermissionDenied,
            _ if error.raw_os_error() == Some(ELOOP) => FsError::Loop,
            _ => FsError::Io(error.to_string()),
        }
    }
}

#[cfg(target_os = "linux")]
const ELOOP: i32 = 40;
#[cfg(not(target_os = "linux"))]
const ELOOP: i32 = 62;

/// Metadata of a filesystem object. For a symlink, `kind` and `sectors`
/// describe its resolution target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub kind: FileKind,
    /// For directories, the recursive total of their content.
    pub sectors: i64,
    pub readable: bool,
    pub symlink_target: Option<String>,
}

impl FileInfo {
    pub fn file(sectors: i64) -> Self {
        Self {
            kind: FileKind::File,
            sectors,
            readable: true,
            symlink_target: None,
        }
    }

    pub fn directory(sectors: i64) -> Self {
        Self {
            kind: FileKind::Directory,
            sectors,
            readable: true,
            symlink_target: None,
        }
    }

    pub fn symlink(target: impl Into<String>, resolved: FileInfo) -> Self {
        Self {
            symlink_target: Some(target.into()),
            ..resolved
        }
    }

    pub fn broken_symlink(target: impl Into<String>) -> Self {
        Self {
            kind: FileKind::BrokenSymlink,
            sectors: 0,
            readable: true,
            symlink_target: Some(target.into()),
        }
    }

    /// Sockets, devices and other objects that never go on a disc.
    pub fn other() -> Self {
        Self {
            kind: FileKind::Other,
            sectors: 0,
            readable: true,
            symlink_target: None,
        }
    }

    pub fn unreadable(mut self) -> Self {
        self.readable = false;
        self
    }

    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Directory
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VfsEntry {
    pub uri: String,
    pub info: Result<FileInfo, FsError>,
}

impl VfsEntry {
    pub fn new(uri: impl Into<String>, info: Result<FileInfo, FsError>) -> Self {
        Self {
            uri: uri.into(),
            info,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VfsRequest {
    /// Lists the direct children of a directory.
    List { id: RequestId, uri: String },
    /// Fetches the metadata of each URI.
    Stat { id: RequestId, uris: Vec<String> },
    /// Asks the backend to serve an in-flight listing first.
    Prioritize { id: RequestId },
    /// Drops every request issued so far.
    CancelAll,
}

impl VfsRequest {
    pub fn id(&self) -> Option<RequestId> {
        match self {
            VfsRequest::List { id, .. }
            | VfsRequest::Stat { id, .. }
            | VfsRequest::Prioritize { id } => Some(*id),
            VfsRequest::CancelAll => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VfsReply {
    Listing {
        id: RequestId,
        uri: String,
        result: Result<Vec<VfsEntry>, FsError>,
    },
    Stat {
        id: RequestId,
        entries: Vec<VfsEntry>,
    },
}

impl VfsReply {
    pub fn id(&self) -> RequestId {
        match self {
            VfsReply::Listing { id, .. } | VfsReply::Stat { id, .. } => *id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[display("watch#{_0}")]
pub struct WatchHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    Create,
    Delete,
    Modify,
    AttributeChange,
    MovedFrom(u32),
    MovedTo(u32),
    SelfDeleted,
    SelfMoved,
    Unmounted,
}

/// A change reported for one watched directory. `name` is the escaped name
/// of the affected child and is empty for events about the directory itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub handle: WatchHandle,
    pub name: String,
    pub kind: WatchEventKind,
}

impl WatchEvent {
    pub fn new(handle: WatchHandle, name: impl Into<String>, kind: WatchEventKind) -> Self {
        Self {
            handle,
            name: name.into(),
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, 0)]
    #[case(1, 1)]
    #[case(2048, 1)]
    #[case(2049, 2)]
    fn sizes_round_up_to_whole_sectors(#[case] bytes: u64, #[case] sectors: i64) {
        assert_eq!(bytes_to_sectors(bytes), sectors);
    }

    #[test]
    fn io_errors_map_to_transient_kinds() {
        let missing = std::io::Error::from(std::io::ErrorKind::NotFound);
        let denied = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
        assert_eq!(FsError::from(missing), FsError::NotFound);
        assert_eq!(FsError::from(denied), FsError::PermissionDenied);
        assert_eq!(
            FsError::from(std::io::Error::from_raw_os_error(ELOOP)),
            FsError::Loop
        );
    }
}
