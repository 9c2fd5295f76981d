//! Storage backend abstraction: the minimal put/get/list/delete
//! contract over content-addressed blobs that lets filesystem,
//! object-store, and network backends coexist. A five-namespace
//! key/value contract over one already-open backend connection.

pub mod filesystem;
pub mod network;
pub mod null;
pub mod object_store;

use crate::error::Result;
use crate::hash::Digest;

/// The four content-addressed namespaces, plus a fifth
/// singleton/keyed-by-uuid namespace folded into the same key space
/// (a snapshot id is, like a digest, a fixed-width random byte string).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Namespace {
    Snapshot,
    Blob,
    Chunk,
    Packfile,
    State,
}

impl Namespace {
    pub fn dir_name(&self) -> &'static str {
        match self {
            Namespace::Snapshot => "SNAPSHOT",
            Namespace::Blob => "BLOB",
            Namespace::Chunk => "CHUNK",
            Namespace::Packfile => "PACKFILE",
            Namespace::State => "STATE",
        }
    }
}

/// Capability set a backend variant must provide. Implementations must give atomic put-or-fail
/// semantics per key; overwriting an existing key is a no-op if the
/// content is identical, and SHOULD be rejected otherwise.
pub trait Backend: Send + Sync {
    /// Write the singleton `CONFIG` blob. Fails with `AlreadyExists` if
    /// one is already present.
    fn create_config(&self, bytes: &[u8]) -> Result<()>;

    fn read_config(&self) -> Result<Vec<u8>>;

    fn put(&self, ns: Namespace, key: &Digest, bytes: &[u8]) -> Result<()>;

    fn get(&self, ns: Namespace, key: &Digest) -> Result<Vec<u8>>;

    /// Read `[offset, offset + len)` of a stored blob without fetching
    /// the whole thing. The default implementation falls back to a full
    /// `get` and slices in memory; backends that can do better (local
    /// files, HTTP range requests) should override it — this matters
    /// most for `Namespace::Packfile`.
    fn get_subpart(&self, ns: Namespace, key: &Digest, offset: u64, len: u64) -> Result<Vec<u8>> {
        let whole = self.get(ns, key)?;
        let start = offset as usize;
        let end = (offset + len) as usize;
        if end > whole.len() {
            return Err(crate::error::EngineError::corruption(
                "storage",
                format!("subpart [{start},{end}) out of bounds for {} bytes", whole.len()),
            ));
        }
        Ok(whole[start..end].to_vec())
    }

    /// Does this key exist without fetching it.
    fn exists(&self, ns: Namespace, key: &Digest) -> Result<bool>;

    /// Stored length in bytes, without fetching the content — the
    /// packfile layer needs this to locate a trailer by seeking from
    /// end-of-file. The default falls back to a full `get`; filesystem
    /// and object-store backends override it with a metadata-only
    /// lookup.
    fn size(&self, ns: Namespace, key: &Digest) -> Result<u64> {
        Ok(self.get(ns, key)?.len() as u64)
    }

    fn delete(&self, ns: Namespace, key: &Digest) -> Result<()>;

    /// Iteration order is unspecified.
    fn list(&self, ns: Namespace) -> Result<Vec<Digest>>;
}
