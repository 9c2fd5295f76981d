//! Header section payloads: `root`, `index`, `metadata`,
//! `statistics`, `errors`. Each is serialized, then runs through the
//! same compress/encrypt/pack pipeline as any other blob, as a single
//! unit rather than being content-defined-chunked. Serialized with
//! `serde`/`ciborium`, same as [`super::config::Config`].

use crate::chunk::ChunkParams;
use crate::error::{EngineError, Result};
use crate::vfs::FileInfo;
use serde::{Deserialize, Serialize};

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    ciborium::ser::into_writer(value, &mut out)
        .map_err(|e| EngineError::Format(format!("section encode: {e}")))?;
    Ok(out)
}

fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T> {
    ciborium::de::from_reader(bytes).map_err(|e| EngineError::Format(format!("section decode: {e}")))
}

/// Plain-data mirror of [`FileInfo`] for serialization — kept separate
/// so the VFS's in-memory type isn't forced to carry `serde` derives it
/// has no other use for.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct FileInfoRecord {
    pub mode: u32,
    pub mtime: i64,
    pub size: u64,
    pub dev: u64,
    pub ino: u64,
}

impl From<FileInfo> for FileInfoRecord {
    fn from(f: FileInfo) -> Self {
        FileInfoRecord {
            mode: f.mode,
            mtime: f.mtime,
            size: f.size,
            dev: f.dev,
            ino: f.ino,
        }
    }
}

impl From<FileInfoRecord> for FileInfo {
    fn from(r: FileInfoRecord) -> Self {
        FileInfo {
            mode: r.mode,
            mtime: r.mtime,
            size: r.size,
            dev: r.dev,
            ino: r.ino,
        }
    }
}

/// `index` section: every path this snapshot indexed, with the file
/// info needed to rebuild [`crate::vfs::Index`] (pathnames, inodes,
/// tree, and `stat_info` are all re-derived by replaying `entries`
/// through [`crate::vfs::Index::build`]), plus recorded symlink
/// targets.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct IndexSection {
    pub entries: Vec<(String, FileInfoRecord)>,
    pub symlinks: Vec<(String, String)>,
}

impl IndexSection {
    pub fn serialize(&self) -> Result<Vec<u8>> {
        encode(self)
    }
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        decode(bytes)
    }
}

/// `root` section: the path -> object-digest map tying the VFS tree's
/// file leaves to their chunk-list objects.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RootSection {
    pub objects: Vec<(String, [u8; 32])>,
}

impl RootSection {
    pub fn serialize(&self) -> Result<Vec<u8>> {
        encode(self)
    }
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        decode(bytes)
    }
}

/// `metadata` section: the effective hashing/compression/chunking
/// configuration this snapshot was produced under, recorded
/// per-snapshot (not just per-repository)
/// so a later repository-wide config change doesn't retroactively
/// misdescribe older snapshots.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetadataSection {
    pub hashing: String,
    pub compression: String,
    pub chunking: ChunkParams,
    pub worker_pool_size: usize,
    pub target_packfile_size: u64,
}

impl MetadataSection {
    pub fn serialize(&self) -> Result<Vec<u8>> {
        encode(self)
    }
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        decode(bytes)
    }
}

/// `statistics` section: per-file counters beyond the header's coarse
/// `summary`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StatisticsSection {
    pub total_chunks: u64,
    pub total_objects: u64,
    pub bytes_before_compression: u64,
    pub bytes_after_compression: u64,
    pub deduplicated_chunks: u64,
}

impl StatisticsSection {
    pub fn serialize(&self) -> Result<Vec<u8>> {
        encode(self)
    }
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        decode(bytes)
    }
}

/// `errors` section: one entry per path that failed to read/digest/
/// encode during the backup.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ErrorsSection {
    pub entries: Vec<(String, String)>,
}

impl ErrorsSection {
    pub fn serialize(&self) -> Result<Vec<u8>> {
        encode(self)
    }
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        decode(bytes)
    }
}
