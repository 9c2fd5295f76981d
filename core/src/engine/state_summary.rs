//! The committed per-snapshot `STATE` summary. This is a different view of the
//! same `Namespace::State` key space as [`crate::pack::state`] (which
//! answers "where is this digest packed") — both are
//! digest-keyed blobs in the same namespace, so they coexist without
//! collision as long as a summary's own digest never matches a content
//! digest, which a 32-byte cryptographic hash makes practically
//! certain.
//!
//! Finalizing also stores the identical bytes a second time under the
//! snapshot's own id (itself a fixed-width random byte string, fitting
//! the same key type) so `delete_snapshot`/`check` can find a
//! snapshot's summary in O(1) instead of scanning `Namespace::State`
//! for a digest whose preimage isn't known in advance.

use crate::error::Result;
use crate::hash::{default_hasher, Digest};
use crate::storage::{Backend, Namespace};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StateSummary {
    pub snapshot_id: [u8; 32],
    pub digests: Vec<[u8; 32]>,
}

impl StateSummary {
    fn serialize(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        ciborium::ser::into_writer(self, &mut out)
            .map_err(|e| crate::error::EngineError::Format(format!("state summary encode: {e}")))?;
        Ok(out)
    }

    fn deserialize(bytes: &[u8]) -> Result<Self> {
        ciborium::de::from_reader(bytes)
            .map_err(|e| crate::error::EngineError::Format(format!("state summary decode: {e}")))
    }
}

/// Commit the summary for `snapshot_id` referencing every digest the
/// snapshot produced or reused. Stored both content-addressed (its own
/// digest) and snapshot-addressed (`snapshot_id`). `STATE` commit must
/// strictly follow all packfile puts of the same snapshot; callers must
/// finish packing before calling this.
pub fn commit(backend: &dyn Backend, snapshot_id: Digest, digests: Vec<Digest>) -> Result<Digest> {
    let summary = StateSummary {
        snapshot_id: *snapshot_id.as_bytes(),
        digests: digests.iter().map(|d| *d.as_bytes()).collect(),
    };
    let bytes = summary.serialize()?;
    let content_digest = default_hasher().digest_bytes(&bytes);

    match backend.put(Namespace::State, &content_digest, &bytes) {
        Ok(()) | Err(crate::error::EngineError::AlreadyExists(_)) => {}
        Err(e) => return Err(e),
    }
    match backend.put(Namespace::State, &snapshot_id, &bytes) {
        Ok(()) | Err(crate::error::EngineError::AlreadyExists(_)) => {}
        Err(e) => return Err(e),
    }
    Ok(content_digest)
}

/// Load the summary committed for `snapshot_id`, if any.
pub fn load(backend: &dyn Backend, snapshot_id: &Digest) -> Result<Option<StateSummary>> {
    match backend.get(Namespace::State, snapshot_id) {
        Ok(bytes) => Ok(Some(StateSummary::deserialize(&bytes)?)),
        Err(crate::error::EngineError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Remove the snapshot-addressed summary entry.
pub fn remove(backend: &dyn Backend, snapshot_id: &Digest) -> Result<()> {
    backend.delete(Namespace::State, snapshot_id)
}
