//! Directory records and the walk over a directory hierarchy.

use std::collections::HashSet;
use std::io::{Read, Seek};

use snafu::ensure;
use tracing::debug;

use crate::iso9660::descriptor::{SECTOR_SIZE, le_u32, read_sector};
use crate::iso9660::error::{DirectoryLoopSnafu, MalformedRecordSnafu, VolumeError};
use crate::iso9660::vol_file::VolFile;

const HEADER_LEN: usize = 33;
const FLAG_DIRECTORY: u8 = 0x02;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryRecord {
    pub extent: u32,
    pub size: u32,
    pub flags: u8,
    pub identifier: Vec<u8>,
}

impl DirectoryRecord {
    /// Parses the record starting at `bytes[0]`; `sector` and `offset` only
    /// locate it in errors.
    pub fn parse(bytes: &[u8], sector: u64, offset: usize) -> Result<Self, VolumeError> {
        let malformed = MalformedRecordSnafu { sector, offset };
        ensure!(bytes.len() > HEADER_LEN, malformed);
        let len = bytes[0] as usize;
        let name_len = bytes[32] as usize;
        ensure!(
            len <= bytes.len() && HEADER_LEN + name_len <= len,
            malformed
        );
        Ok(Self {
            extent: le_u32(bytes, 2),
            size: le_u32(bytes, 10),
            flags: bytes[25],
            identifier: bytes[HEADER_LEN..HEADER_LEN + name_len].to_vec(),
        })
    }

    pub fn is_dir(&self) -> bool {
        self.flags & FLAG_DIRECTORY != 0
    }

    /// The `.` and `..` entries opening every directory.
    fn is_self_or_parent(&self) -> bool {
        matches!(self.identifier.as_slice(), [0] | [1])
    }

    /// Readable name: UTF-16BE for Joliet, without `;version` or a trailing dot.
    pub fn name(&self, joliet: bool) -> String {
        let mut name = if joliet {
            let units = self
                .identifier
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]));
            char::decode_utf16(units)
                .map(|unit| unit.unwrap_or(char::REPLACEMENT_CHARACTER))
                .collect::<String>()
        } else {
            String::from_utf8_lossy(&self.identifier).into_owned()
        };
        if let Some(version) = name.find(';') {
            name.truncate(version);
        }
        if name.ends_with('.') {
            name.pop();
        }
        name
    }
}

/// Walks the directory hierarchy below `root`.
pub struct DirectoryWalker<'a, R> {
    source: &'a mut R,
    joliet: bool,
    visited: HashSet<u32>,
}

impl<'a, R: Read + Seek> DirectoryWalker<'a, R> {
    pub fn new(source: &'a mut R, joliet: bool) -> Self {
        Self {
            source,
            joliet,
            visited: HashSet::new(),
        }
    }

    pub fn read_tree(&mut self, root: &DirectoryRecord) -> Result<VolFile, VolumeError> {
        let children = self.read_directory(root)?;
        Ok(VolFile::Directory {
            name: String::new(),
            children,
        })
    }

    /// Reads every record of a directory, then descends into the
    /// subdirectories found.
    fn read_directory(&mut self, directory: &DirectoryRecord) -> Result<Vec<VolFile>, VolumeError> {
        ensure!(
            self.visited.insert(directory.extent),
            DirectoryLoopSnafu {
                sector: u64::from(directory.extent)
            }
        );

        let records = self.read_records(directory)?;
        debug!(
            "Directory at sector {} holds {} records",
            directory.extent,
            records.len()
        );

        let mut files = Vec::with_capacity(records.len());
        for record in records {
            let name = record.name(self.joliet);
            if record.is_dir() {
                let children = self.read_directory(&record)?;
                files.push(VolFile::Directory { name, children });
            } else {
                files.push(VolFile::File {
                    name,
                    size_bytes: u64::from(record.size),
                    start_sector: record.extent,
                });
            }
        }
        Ok(files)
    }

    /// A zero length byte pads the rest of a sector; records never span sectors.
    fn read_records(&mut self, directory: &DirectoryRecord) -> Result<Vec<DirectoryRecord>, VolumeError> {
        let sectors = (directory.size as usize).div_ceil(SECTOR_SIZE);
        let mut records = Vec::new();

        for index in 0..sectors {
            let sector = u64::from(directory.extent) + index as u64;
            let data = read_sector(&mut *self.source, sector)?;
            let mut offset = 0;
            while offset < SECTOR_SIZE && index * SECTOR_SIZE + offset < directory.size as usize {
                let len = data[offset] as usize;
                if len == 0 {
                    break;
                }
                let record = DirectoryRecord::parse(&data[offset..], sector, offset)?;
                if !record.is_self_or_parent() {
                    records.push(record);
                }
                offset += len;
            }
        }
        Ok(records)
    }
}
