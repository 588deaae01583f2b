use std::hash::Hasher;
use std::path::{Path, PathBuf};

use bincode::{Decode, Encode};
use compio::fs;
use metrohash::MetroHash64;
use snafu::{ResultExt, Snafu, ensure};
use tracing::debug;

use crate::ext::BestEffortPathExt;
use crate::project::filter::FilterStatus;
use crate::project::graft::GraftPoint;

const MAGIC: &[u8; 4] = b"DGP1";
const HEADER_LEN: usize = MAGIC.len() + size_of::<u64>();
const COMPRESSION_LEVEL: i32 = 3;

/// The three lists exchanged with the session layer, plus a label.
#[derive(Debug, Clone, PartialEq, Eq, Default, Encode, Decode)]
pub struct ProjectSnapshot {
    pub label: String,
    pub grafts: Vec<GraftPoint>,
    pub excluded: Vec<String>,
    pub restored: Vec<(String, FilterStatus)>,
}

fn checksum(bytes: &[u8]) -> u64 {
    let mut hasher = MetroHash64::default();
    hasher.write(bytes);
    hasher.finish()
}

impl ProjectSnapshot {
    /// Magic, checksum of the payload, then the zstd-compressed bincode payload.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SnapshotError> {
        let encoded =
            bincode::encode_to_vec(self, bincode::config::standard()).context(EncodeSnafu)?;
        let compressed =
            zstd::encode_all(encoded.as_slice(), COMPRESSION_LEVEL).context(CompressionSnafu)?;

        let mut bytes = Vec::with_capacity(HEADER_LEN + compressed.len());
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&checksum(&compressed).to_le_bytes());
        bytes.extend_from_slice(&compressed);
        Ok(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SnapshotError> {
        ensure!(
            bytes.len() >= HEADER_LEN && bytes.starts_with(MAGIC),
            NotASnapshotSnafu
        );
        let (header, payload) = bytes.split_at(HEADER_LEN);
        let mut stored = [0u8; 8];
        stored.copy_from_slice(&header[MAGIC.len()..]);
        let expected = u64::from_le_bytes(stored);
        let actual = checksum(payload);
        ensure!(expected == actual, ChecksumSnafu { expected, actual });

        let encoded = zstd::decode_all(payload).context(CompressionSnafu)?;
        let (snapshot, _) = bincode::decode_from_slice(&encoded, bincode::config::standard())
            .context(DecodeSnafu)?;
        Ok(snapshot)
    }

    pub async fn write(&self, path: &Path) -> Result<(), SnapshotError> {
        debug!("Writing project to {}", path.best_effort_path_display());
        let bytes = self.to_bytes()?;
        fs::write(path, bytes).await.0.context(IoSnafu {
            path: path.to_path_buf(),
        })
    }

    pub async fn read(path: &Path) -> Result<Self, SnapshotError> {
        debug!("Reading project from {}", path.best_effort_path_display());
        let bytes = fs::read(path).await.context(IoSnafu {
            path: path.to_path_buf(),
        })?;
        Self::from_bytes(&bytes)
    }
}

#[derive(Debug, Snafu)]
pub enum SnapshotError {
    #[snafu(display("Failed to encode the project"))]
    EncodeError { source: bincode::error::EncodeError },
    #[snafu(display("Failed to decode the project"))]
    DecodeError { source: bincode::error::DecodeError },
    #[snafu(display("Failed to (de)compress the project"))]
    CompressionError { source: std::io::Error },
    #[snafu(display("Not a project file"))]
    NotASnapshot,
    #[snafu(display("Project file is corrupted (checksum {actual:#x}, expected {expected:#x})"))]
    ChecksumError { expected: u64, actual: u64 },
    #[snafu(display("Failed to access {}", path.best_effort_path_display()))]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::graft::GraftTarget;
    use tempfile::TempDir;

    fn sample() -> ProjectSnapshot {
        ProjectSnapshot {
            label: "Holidays".into(),
            grafts: vec![
                GraftPoint {
                    path: "/photos".into(),
                    target: GraftTarget::Filesystem("file:///home/u/photos".into()),
                },
                GraftPoint {
                    path: "/empty".into(),
                    target: GraftTarget::Created,
                },
            ],
            excluded: vec!["file:///home/u/photos/raw".into()],
            restored: vec![("file:///home/u/photos/.album".into(), FilterStatus::Hidden)],
        }
    }

    #[test]
    fn corrupted_payloads_are_rejected() {
        let mut bytes = sample().to_bytes().expect("encoding should succeed");
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        assert!(matches!(
            ProjectSnapshot::from_bytes(&bytes),
            Err(SnapshotError::ChecksumError { .. })
        ));
        assert!(matches!(
            ProjectSnapshot::from_bytes(b"nope"),
            Err(SnapshotError::NotASnapshot)
        ));
    }

    #[compio::test]
    async fn snapshots_survive_the_disk() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("project.dgp");
        sample().write(&path).await.expect("write should succeed");
        let loaded = ProjectSnapshot::read(&path).await.expect("read should succeed");
        assert_eq!(loaded, sample());
    }
}
