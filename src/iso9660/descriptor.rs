//! Volume descriptors (ECMA-119 §8).
//!
//! Only the little-endian half of both-byte-order fields is decoded.

use std::io::{Read, Seek, SeekFrom};

use snafu::{OptionExt, ResultExt, ensure};
use tracing::debug;

use crate::iso9660::directory::DirectoryRecord;
use crate::iso9660::error::{
    NotPrimarySnafu, ReadSnafu, SectorOutOfRangeSnafu, UnknownTagSnafu,
    UnterminatedDescriptorSetSnafu, VolumeError,
};

pub const SECTOR_SIZE: usize = 2048;

/// Sectors 0 to 15 of a session are the System Area.
pub const SYSTEM_AREA_SECTORS: u64 = 16;

/// Descriptor tags of the ISO9660 and UDF volume recognition sequences.
pub const RECOGNIZED_TAGS: [&[u8; 5]; 7] = [
    b"CD001", b"BEA01", b"BOOT2", b"CDW02", b"NSR02", b"NSR03", b"TEA01",
];

const ISO9660_TAG: &[u8; 5] = b"CD001";
const MAX_DESCRIPTORS: u64 = 64;

const TYPE_PRIMARY: u8 = 1;
const TYPE_SUPPLEMENTARY: u8 = 2;
const TYPE_TERMINATOR: u8 = 255;

const VOLUME_ID: std::ops::Range<usize> = 40..72;
const VOLUME_SPACE_SIZE: usize = 80;
const ESCAPE_SEQUENCES: std::ops::Range<usize> = 88..120;
const ROOT_RECORD: std::ops::Range<usize> = 156..190;

/// UCS-2 levels 1 to 3.
const JOLIET_ESCAPES: [&[u8; 3]; 3] = [b"%/@", b"%/C", b"%/E"];

pub type Sector = Box<[u8; SECTOR_SIZE]>;

pub fn read_sector<R: Read + Seek>(source: &mut R, sector: u64) -> Result<Sector, VolumeError> {
    let offset = sector
        .checked_mul(SECTOR_SIZE as u64)
        .context(SectorOutOfRangeSnafu { sector })?;
    let mut buffer = Box::new([0u8; SECTOR_SIZE]);
    source
        .seek(SeekFrom::Start(offset))
        .and_then(|_| source.read_exact(buffer.as_mut_slice()))
        .context(ReadSnafu { sector })?;
    Ok(buffer)
}

pub(super) fn le_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(word)
}

/// One descriptor of the volume descriptor set.
pub struct VolumeDescriptor {
    pub sector: u64,
    pub kind: u8,
    pub tag: [u8; 5],
    data: Sector,
}

impl VolumeDescriptor {
    fn is_iso9660(&self) -> bool {
        &self.tag == ISO9660_TAG
    }
}

/// Reads the descriptor at `sector` and checks its tag.
pub fn read_volume_descriptor<R: Read + Seek>(
    source: &mut R,
    sector: u64,
) -> Result<VolumeDescriptor, VolumeError> {
    let data = read_sector(source, sector)?;
    let mut tag = [0u8; 5];
    tag.copy_from_slice(&data[1..6]);
    ensure!(
        RECOGNIZED_TAGS.contains(&&tag),
        UnknownTagSnafu {
            sector,
            tag: String::from_utf8_lossy(&tag).into_owned(),
        }
    );
    Ok(VolumeDescriptor {
        sector,
        kind: data[0],
        tag,
        data,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryDescriptor {
    label: String,
    size: u32,
    pub(super) root: DirectoryRecord,
}

impl PrimaryDescriptor {
    fn parse(descriptor: &VolumeDescriptor) -> Result<Self, VolumeError> {
        let data = descriptor.data.as_slice();
        let label = String::from_utf8_lossy(&data[VOLUME_ID])
            .trim_end_matches([' ', '\0'])
            .to_string();
        let root = DirectoryRecord::parse(&data[ROOT_RECORD], descriptor.sector, ROOT_RECORD.start)?;
        Ok(Self {
            label,
            size: le_u32(data, VOLUME_SPACE_SIZE),
            root,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Volume space size in sectors.
    pub fn size(&self) -> u32 {
        self.size
    }
}

/// Sector of the first descriptor, leaving room for the whole descriptor set.
fn first_descriptor(session_start: u64) -> Result<u64, VolumeError> {
    session_start
        .checked_add(SYSTEM_AREA_SECTORS + MAX_DESCRIPTORS)
        .context(SectorOutOfRangeSnafu {
            sector: session_start,
        })?;
    Ok(session_start + SYSTEM_AREA_SECTORS)
}

/// Reads the first descriptor of the session starting at `session_start`,
/// which must be the ISO9660 primary descriptor.
pub fn read_primary_volume_descriptor<R: Read + Seek>(
    source: &mut R,
    session_start: u64,
) -> Result<PrimaryDescriptor, VolumeError> {
    let sector = first_descriptor(session_start)?;
    let descriptor = read_volume_descriptor(source, sector)?;
    ensure!(
        descriptor.is_iso9660() && descriptor.kind == TYPE_PRIMARY,
        NotPrimarySnafu { sector }
    );
    PrimaryDescriptor::parse(&descriptor)
}

/// Root of the Joliet hierarchy, found in a supplementary descriptor
/// announcing UCS-2.
pub fn find_joliet_root<R: Read + Seek>(
    source: &mut R,
    session_start: u64,
) -> Result<Option<DirectoryRecord>, VolumeError> {
    let first = first_descriptor(session_start)?;
    for sector in first..first + MAX_DESCRIPTORS {
        let descriptor = read_volume_descriptor(source, sector)?;
        if !descriptor.is_iso9660() {
            continue;
        }
        match descriptor.kind {
            TYPE_TERMINATOR => return Ok(None),
            TYPE_SUPPLEMENTARY => {
                let escapes = &descriptor.data[ESCAPE_SEQUENCES];
                if JOLIET_ESCAPES
                    .iter()
                    .any(|escape| escapes.windows(3).any(|window| window == escape.as_slice()))
                {
                    debug!("Found Joliet descriptor at sector {}", sector);
                    let root = DirectoryRecord::parse(
                        &descriptor.data[ROOT_RECORD],
                        sector,
                        ROOT_RECORD.start,
                    )?;
                    return Ok(Some(root));
                }
            }
            _ => {}
        }
    }
    UnterminatedDescriptorSetSnafu {
        limit: MAX_DESCRIPTORS,
    }
    .fail()
}
