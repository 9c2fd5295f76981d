//! `Repository` — `create`/`open` a backend: the handle a backend is
//! opened through, carrying the decoded `CONFIG` and (if the repository
//! is encrypted) the passphrase-derived master key. One handle serves
//! any number of snapshots against any [`Backend`].

use super::config::{Config, EncryptionConfig};
use crate::chunk::ChunkParams;
use crate::codec::{self, CodecId};
use crate::crypto::aead::{self, MasterKey};
use crate::crypto::kdf;
use crate::error::{EngineError, Result};
use crate::hash::{self, Digest, Hasher};
use crate::pack::writer::DEFAULT_TARGET_SIZE;
use crate::snapshot::Header;
use crate::storage::{Backend, Namespace};
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

/// Inputs to [`Repository::create`]. Names, not values, so the hashing
/// and compression registry lookups are the single source of truth for
/// what's valid.
#[derive(Clone, Debug)]
pub struct CreateOptions {
    pub hashing: String,
    pub compression: String,
    pub chunking: ChunkParams,
    /// `None` leaves the repository unencrypted.
    pub passphrase: Option<Vec<u8>>,
    pub worker_pool_size: Option<usize>,
    pub target_packfile_size: Option<u64>,
}

impl Default for CreateOptions {
    fn default() -> Self {
        CreateOptions {
            hashing: "BLAKE3".to_string(),
            compression: "LZ4".to_string(),
            chunking: ChunkParams::default(),
            passphrase: None,
            worker_pool_size: None,
            target_packfile_size: None,
        }
    }
}

pub struct Repository {
    backend: Arc<dyn Backend>,
    config: Config,
    master_key: Option<MasterKey>,
    worker_pool_size: usize,
    target_packfile_size: u64,
}

fn default_worker_pool_size() -> usize {
    8 * num_cpus::get() + 1
}

impl Repository {
    /// Write a fresh `CONFIG` blob and return a handle to it. Fails with
    /// `AlreadyExists` if the backend already carries one.
    pub fn create(backend: Arc<dyn Backend>, opts: CreateOptions) -> Result<Arc<Repository>> {
        hash::lookup(&opts.hashing)?;
        CodecId::from_name(&opts.compression)?;

        let (encryption, master_key) = match &opts.passphrase {
            Some(pass) => {
                let (key_blob, key) = kdf::create_secret(pass);
                (
                    Some(EncryptionConfig {
                        algorithm: "XCHACHA20POLY1305".to_string(),
                        key_blob,
                    }),
                    Some(MasterKey(key)),
                )
            }
            None => (None, None),
        };

        let config = Config {
            version: 1,
            repository_id: Uuid::new_v4(),
            creation_time: OffsetDateTime::now_utc(),
            hashing: opts.hashing,
            chunking: opts.chunking,
            compression: opts.compression,
            encryption,
        };
        backend.create_config(&config.serialize()?)?;

        tracing::info!(
            repository_id = %config.repository_id,
            hashing = %config.hashing,
            compression = %config.compression,
            encrypted = config.encryption.is_some(),
            "repository created"
        );

        Ok(Arc::new(Repository {
            backend,
            config,
            master_key,
            worker_pool_size: opts.worker_pool_size.unwrap_or_else(default_worker_pool_size),
            target_packfile_size: opts.target_packfile_size.unwrap_or(DEFAULT_TARGET_SIZE),
        }))
    }

    /// Read back an existing `CONFIG` blob and, if the repository is
    /// encrypted, verify `passphrase` against it.
    pub fn open(backend: Arc<dyn Backend>, passphrase: Option<&[u8]>) -> Result<Arc<Repository>> {
        let config = Config::deserialize(&backend.read_config()?)?;
        let master_key = match &config.encryption {
            Some(enc) => {
                let pass = passphrase.ok_or(EngineError::BadPassphrase)?;
                Some(MasterKey(kdf::verify_secret(&enc.key_blob, pass)?))
            }
            None => None,
        };
        tracing::info!(
            repository_id = %config.repository_id,
            encrypted = master_key.is_some(),
            "repository opened"
        );
        Ok(Arc::new(Repository {
            backend,
            config,
            master_key,
            worker_pool_size: default_worker_pool_size(),
            target_packfile_size: DEFAULT_TARGET_SIZE,
        }))
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_encrypted(&self) -> bool {
        self.master_key.is_some()
    }

    pub fn worker_pool_size(&self) -> usize {
        self.worker_pool_size
    }

    pub fn target_packfile_size(&self) -> u64 {
        self.target_packfile_size
    }

    pub(crate) fn hasher(&self) -> &'static dyn Hasher {
        hash::lookup(&self.config.hashing).expect("config hashing validated at create/open")
    }

    fn aad(kind_tag: &str, digest: &Digest) -> Vec<u8> {
        format!("{kind_tag}:{}", digest.to_hex()).into_bytes()
    }

    /// Compress `plaintext` under the repository's codec, then seal it
    /// under the master key if the repository is encrypted.
    pub(crate) fn encode_and_seal(
        &self,
        kind_tag: &str,
        digest: &Digest,
        plaintext: &[u8],
    ) -> Result<(CodecId, Vec<u8>)> {
        let codec_id = CodecId::from_name(&self.config.compression)?;
        let compressed = codec::get(codec_id).compress(plaintext)?;
        let sealed = match &self.master_key {
            Some(mk) => aead::seal(mk, &Self::aad(kind_tag, digest), &compressed),
            None => compressed,
        };
        Ok((codec_id, sealed))
    }

    /// Reverse of [`Self::encode_and_seal`]: open (if encrypted), then
    /// decompress under `codec`.
    pub(crate) fn fetch_and_open(
        &self,
        kind_tag: &str,
        digest: &Digest,
        codec_id: CodecId,
        stored: Vec<u8>,
    ) -> Result<Vec<u8>> {
        let compressed = match &self.master_key {
            Some(mk) => aead::open(mk, &Self::aad(kind_tag, digest), &stored)?,
            None => stored,
        };
        codec::get(codec_id).decompress(&compressed)
    }

    fn header_aad(snapshot_id: &Digest) -> Vec<u8> {
        format!("header:{}", snapshot_id.to_hex()).into_bytes()
    }

    /// Store a finalized [`Header`] under its own `snapshot_id` (spec
    /// §4.9). Headers are small, uniquely keyed records — stored directly,
    /// not through the packfile/`STATE` path the way chunks/objects/
    /// sections are.
    pub(crate) fn store_header(&self, header: &Header) -> Result<()> {
        tracing::debug!(snapshot_id = %header.snapshot_id.to_hex(), "storing header");
        let plaintext = header.serialize();
        let codec_id = CodecId::from_name(&self.config.compression)?;
        let compressed = codec::get(codec_id).compress(&plaintext)?;
        let sealed = match &self.master_key {
            Some(mk) => aead::seal(mk, &Self::header_aad(&header.snapshot_id), &compressed),
            None => compressed,
        };
        match self.backend.put(Namespace::Snapshot, &header.snapshot_id, &sealed) {
            Ok(()) | Err(EngineError::AlreadyExists(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub(crate) fn load_header(&self, snapshot_id: &Digest) -> Result<Header> {
        let stored = self.backend.get(Namespace::Snapshot, snapshot_id)?;
        let compressed = match &self.master_key {
            Some(mk) => aead::open(mk, &Self::header_aad(snapshot_id), &stored)?,
            None => stored,
        };
        let codec_id = CodecId::from_name(&self.config.compression)?;
        let plaintext = codec::get(codec_id).decompress(&compressed)?;
        Header::deserialize(&plaintext)
    }

    /// `list_snapshots`: iteration order is unspecified, same
    /// as the underlying backend's `list`.
    pub fn list_snapshots(&self) -> Result<Vec<Digest>> {
        self.backend.list(Namespace::Snapshot)
    }

    /// `begin_snapshot`.
    pub fn begin_snapshot(self: &Arc<Self>) -> super::builder::SnapshotBuilder {
        super::builder::SnapshotBuilder::new(Arc::clone(self))
    }
}
