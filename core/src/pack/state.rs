//! `STATE` mapping: content digest -> `(packfile digest, offset,
//! length)`. One fixed-width record per content digest, stored under
//! `Namespace::State` keyed by that digest — a hand-rolled fixed-width
//! record layout rather than a length-prefixed log, since each `STATE`
//! key here already has exactly one record, not a stream of them.

use super::EntryKind;
use crate::codec::CodecId;
use crate::error::{EngineError, Result};
use crate::hash::Digest;
use crate::storage::{Backend, Namespace};

/// record layout: packfile_digest(32) + offset(8) + length(8) +
/// kind(1) + codec(1) + u_len(8)
const RECORD_LEN: usize = 32 + 8 + 8 + 1 + 1 + 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StateRecord {
    pub packfile_digest: Digest,
    pub offset: u64,
    pub length: u64,
    pub kind: EntryKind,
    pub codec: CodecId,
    pub u_len: u64,
}

impl StateRecord {
    fn to_bytes(self) -> [u8; RECORD_LEN] {
        let mut out = [0u8; RECORD_LEN];
        out[0..32].copy_from_slice(self.packfile_digest.as_bytes());
        out[32..40].copy_from_slice(&self.offset.to_le_bytes());
        out[40..48].copy_from_slice(&self.length.to_le_bytes());
        out[48] = self.kind.to_byte();
        out[49] = self.codec.as_u8();
        out[50..58].copy_from_slice(&self.u_len.to_le_bytes());
        out
    }

    fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() != RECORD_LEN {
            return Err(EngineError::corruption(
                "state record",
                format!("record is {} bytes, expected {RECORD_LEN}", buf.len()),
            ));
        }
        let mut packfile_digest = [0u8; 32];
        packfile_digest.copy_from_slice(&buf[0..32]);
        let offset = u64::from_le_bytes(buf[32..40].try_into().unwrap());
        let length = u64::from_le_bytes(buf[40..48].try_into().unwrap());
        let kind = EntryKind::from_byte(buf[48])?;
        let codec = CodecId::from_u8(buf[49])?;
        let u_len = u64::from_le_bytes(buf[50..58].try_into().unwrap());
        Ok(StateRecord {
            packfile_digest: Digest(packfile_digest),
            offset,
            length,
            kind,
            codec,
            u_len,
        })
    }
}

/// Record where `content_digest`'s encoded bytes live. `AlreadyExists`
/// from the backend is swallowed: a second blob flushing to the same
/// content digest (deduplication doing its job) is not an error here.
pub fn record(
    backend: &dyn Backend,
    content_digest: &Digest,
    rec: StateRecord,
) -> Result<()> {
    match backend.put(Namespace::State, content_digest, &rec.to_bytes()) {
        Ok(()) | Err(EngineError::AlreadyExists(_)) => Ok(()),
        Err(e) => Err(e),
    }
}

/// Resolve a content digest to where it is packed. `NotFound` means the
/// digest has never been written into this repository.
pub fn lookup(backend: &dyn Backend, content_digest: &Digest) -> Result<StateRecord> {
    let bytes = backend.get(Namespace::State, content_digest)?;
    StateRecord::from_bytes(&bytes)
}

pub fn exists(backend: &dyn Backend, content_digest: &Digest) -> Result<bool> {
    backend.exists(Namespace::State, content_digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::default_hasher;
    use crate::storage::filesystem::FsBackend;

    #[test]
    fn records_round_trip_through_the_state_namespace() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FsBackend::init(dir.path()).unwrap();
        let content = default_hasher().digest_bytes(b"a chunk's content");
        let packfile_digest = default_hasher().digest_bytes(b"some packfile");

        let rec = StateRecord {
            packfile_digest,
            offset: 4096,
            length: 128,
            kind: EntryKind::Chunk,
            codec: CodecId::Lz4,
            u_len: 256,
        };
        record(&backend, &content, rec).unwrap();

        assert!(exists(&backend, &content).unwrap());
        let back = lookup(&backend, &content).unwrap();
        assert_eq!(back, rec);
    }

    #[test]
    fn duplicate_record_for_the_same_content_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FsBackend::init(dir.path()).unwrap();
        let content = default_hasher().digest_bytes(b"dup me");
        let rec = StateRecord {
            packfile_digest: default_hasher().digest_bytes(b"pf"),
            offset: 0,
            length: 10,
            kind: EntryKind::Object,
            codec: CodecId::Store,
            u_len: 10,
        };
        record(&backend, &content, rec).unwrap();
        record(&backend, &content, rec).unwrap();
    }

    #[test]
    fn unknown_content_digest_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FsBackend::init(dir.path()).unwrap();
        let missing = default_hasher().digest_bytes(b"never written");
        assert!(lookup(&backend, &missing).is_err());
    }
}
