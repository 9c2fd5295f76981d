//! The repository `CONFIG` blob: the one thing every backend
//! must hold before anything else is written. Serialized with
//! `serde`/`ciborium` like the rest of the crate's structured records —
//! unlike [`crate::snapshot::header::Header`], `CONFIG` has no
//! hand-rolled stable-field-order requirement, so this stays in the
//! crate's ordinary serde idiom.

use crate::chunk::ChunkParams;
use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EncryptionConfig {
    pub algorithm: String,
    /// `base64(salt(16) || scrypt(passphrase, salt))`.
    pub key_blob: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub version: u32,
    pub repository_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub creation_time: OffsetDateTime,
    pub hashing: String,
    pub chunking: ChunkParams,
    /// `"NONE"` is a valid configuration.
    pub compression: String,
    pub encryption: Option<EncryptionConfig>,
}

impl Config {
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        ciborium::ser::into_writer(self, &mut out)
            .map_err(|e| EngineError::Format(format!("config encode: {e}")))?;
        Ok(out)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        ciborium::de::from_reader(bytes)
            .map_err(|e| EngineError::Format(format!("config decode: {e}")))
    }
}
