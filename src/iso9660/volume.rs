use std::io::{Read, Seek};

use tracing::{debug, info};

use crate::iso9660::descriptor::{find_joliet_root, read_primary_volume_descriptor};
use crate::iso9660::directory::DirectoryWalker;
use crate::iso9660::error::VolumeError;
use crate::iso9660::vol_file::VolFile;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// First sector of the session to read, 0 for single-session images.
    pub session_start: u64,
    /// Prefer the Joliet hierarchy when the volume has one.
    pub joliet: bool,
}

/// A parsed volume. Immutable once read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Volume {
    pub label: String,
    /// Volume space size in sectors.
    pub size: u32,
    /// Whether names come from the Joliet hierarchy.
    pub joliet: bool,
    pub root: VolFile,
}

/// Reads the descriptors of a session and the whole file tree. Any I/O or
/// structural error fails the read.
pub fn read_volume<R: Read + Seek>(
    source: &mut R,
    options: ReadOptions,
) -> Result<Volume, VolumeError> {
    let primary = read_primary_volume_descriptor(source, options.session_start)?;
    debug!(
        "Volume '{}' spans {} sectors",
        primary.label(),
        primary.size()
    );

    let joliet_root = if options.joliet {
        find_joliet_root(source, options.session_start)?
    } else {
        None
    };
    let joliet = joliet_root.is_some();
    let root_record = joliet_root.unwrap_or_else(|| primary.root.clone());

    let root = DirectoryWalker::new(source, joliet).read_tree(&root_record)?;
    info!(
        "Read volume '{}' with {} entries",
        primary.label(),
        root.walk().len()
    );
    Ok(Volume {
        label: primary.label().to_string(),
        size: primary.size(),
        joliet,
        root,
    })
}
