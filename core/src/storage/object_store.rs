//! Object-store backend, one key per blob with an
//! optional two-byte shard prefix. Built on the `object_store` crate,
//! already a dependency in the example pack for exactly this role
//! (`tvlfyi-tvix/castore/src/blobservice/object_store.rs`, a content-
//! addressed blob service over the same crate). `object_store`'s API is
//! async; this backend runs a small dedicated Tokio runtime internally
//! so it can implement the synchronous [`Backend`] trait the rest of
//! the engine shares across all variants.

use super::{Backend, Namespace};
use crate::error::{EngineError, Result};
use crate::hash::Digest;
use ::object_store::{ObjectStore, path::Path as ObjPath};
use bytes::Bytes;
use std::sync::Arc;
use tokio::runtime::{Builder, Runtime};

pub struct ObjectStoreBackend {
    store: Arc<dyn ObjectStore>,
    base: ObjPath,
    rt: Runtime,
}

impl ObjectStoreBackend {
    pub fn new(store: Arc<dyn ObjectStore>, base_path: &str) -> Result<Self> {
        let rt = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| EngineError::Format(format!("failed to start runtime: {e}")))?;
        Ok(ObjectStoreBackend {
            store,
            base: ObjPath::from(base_path),
            rt,
        })
    }

    fn config_path(&self) -> ObjPath {
        self.base.child("CONFIG")
    }

    fn key_path(&self, ns: Namespace, key: &Digest) -> ObjPath {
        let hex = key.to_hex();
        self.base
            .child(ns.dir_name())
            .child(hex[0..2].to_string())
            .child(hex)
    }
}

fn map_not_found(e: ::object_store::Error, what: String) -> EngineError {
    match e {
        ::object_store::Error::NotFound { .. } => EngineError::not_found(what),
        other => EngineError::Io(std::io::Error::other(other)),
    }
}

impl Backend for ObjectStoreBackend {
    fn create_config(&self, bytes: &[u8]) -> Result<()> {
        let path = self.config_path();
        self.rt.block_on(async {
            if self.store.head(&path).await.is_ok() {
                return Err(EngineError::AlreadyExists("CONFIG".into()));
            }
            self.store
                .put(&path, Bytes::copy_from_slice(bytes).into())
                .await
                .map_err(|e| EngineError::Io(std::io::Error::other(e)))?;
            Ok(())
        })
    }

    fn read_config(&self) -> Result<Vec<u8>> {
        let path = self.config_path();
        self.rt.block_on(async {
            let res = self
                .store
                .get(&path)
                .await
                .map_err(|e| map_not_found(e, "CONFIG".into()))?;
            let bytes = res
                .bytes()
                .await
                .map_err(|e| EngineError::Io(std::io::Error::other(e)))?;
            Ok(bytes.to_vec())
        })
    }

    fn put(&self, ns: Namespace, key: &Digest, bytes: &[u8]) -> Result<()> {
        let path = self.key_path(ns, key);
        let payload = bytes.to_vec();
        self.rt.block_on(async {
            if let Ok(existing) = self.store.get(&path).await {
                let existing = existing
                    .bytes()
                    .await
                    .map_err(|e| EngineError::Io(std::io::Error::other(e)))?;
                if existing.as_ref() == payload.as_slice() {
                    return Ok(());
                }
                return Err(EngineError::AlreadyExists(format!("{}/{}", ns.dir_name(), key)));
            }
            self.store
                .put(&path, Bytes::from(payload).into())
                .await
                .map_err(|e| EngineError::Io(std::io::Error::other(e)))?;
            Ok(())
        })
    }

    fn get(&self, ns: Namespace, key: &Digest) -> Result<Vec<u8>> {
        let path = self.key_path(ns, key);
        self.rt.block_on(async {
            let res = self
                .store
                .get(&path)
                .await
                .map_err(|e| map_not_found(e, format!("{}/{}", ns.dir_name(), key)))?;
            let bytes = res
                .bytes()
                .await
                .map_err(|e| EngineError::Io(std::io::Error::other(e)))?;
            Ok(bytes.to_vec())
        })
    }

    fn get_subpart(&self, ns: Namespace, key: &Digest, offset: u64, len: u64) -> Result<Vec<u8>> {
        let path = self.key_path(ns, key);
        let range = (offset as usize)..((offset + len) as usize);
        self.rt.block_on(async {
            let bytes = self
                .store
                .get_range(&path, range)
                .await
                .map_err(|e| map_not_found(e, format!("{}/{}", ns.dir_name(), key)))?;
            Ok(bytes.to_vec())
        })
    }

    fn exists(&self, ns: Namespace, key: &Digest) -> Result<bool> {
        let path = self.key_path(ns, key);
        self.rt
            .block_on(async { Ok(self.store.head(&path).await.is_ok()) })
    }

    fn size(&self, ns: Namespace, key: &Digest) -> Result<u64> {
        let path = self.key_path(ns, key);
        self.rt.block_on(async {
            let meta = self
                .store
                .head(&path)
                .await
                .map_err(|e| map_not_found(e, format!("{}/{}", ns.dir_name(), key)))?;
            Ok(meta.size as u64)
        })
    }

    fn delete(&self, ns: Namespace, key: &Digest) -> Result<()> {
        let path = self.key_path(ns, key);
        self.rt.block_on(async {
            match self.store.delete(&path).await {
                Ok(()) => Ok(()),
                Err(::object_store::Error::NotFound { .. }) => Ok(()),
                Err(e) => Err(EngineError::Io(std::io::Error::other(e))),
            }
        })
    }

    fn list(&self, ns: Namespace) -> Result<Vec<Digest>> {
        use futures::StreamExt;
        let prefix = self.base.child(ns.dir_name());
        self.rt.block_on(async {
            let mut stream = self.store.list(Some(&prefix));
            let mut out = Vec::new();
            while let Some(meta) = stream.next().await {
                let meta = meta.map_err(|e| EngineError::Io(std::io::Error::other(e)))?;
                if let Some(name) = meta.location.filename() {
                    if let Ok(d) = Digest::from_hex(name) {
                        out.push(d);
                    }
                }
            }
            Ok(out)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::default_hasher;
    use ::object_store::memory::InMemory;

    fn backend() -> ObjectStoreBackend {
        ObjectStoreBackend::new(Arc::new(InMemory::new()), "repo").unwrap()
    }

    #[test]
    fn put_get_round_trips() {
        let backend = backend();
        let key = default_hasher().digest_bytes(b"hello");
        backend.put(Namespace::Chunk, &key, b"hello").unwrap();
        assert!(backend.exists(Namespace::Chunk, &key).unwrap());
        assert_eq!(backend.get(Namespace::Chunk, &key).unwrap(), b"hello");
    }

    #[test]
    fn duplicate_put_with_different_content_is_rejected() {
        let backend = backend();
        let key = default_hasher().digest_bytes(b"hello");
        backend.put(Namespace::Chunk, &key, b"hello").unwrap();
        assert!(backend.put(Namespace::Chunk, &key, b"world").is_err());
    }

    #[test]
    fn config_create_once() {
        let backend = backend();
        backend.create_config(b"cfg-v1").unwrap();
        assert!(backend.create_config(b"cfg-v2").is_err());
        assert_eq!(backend.read_config().unwrap(), b"cfg-v1");
    }

    #[test]
    fn subpart_reads_a_byte_range() {
        let backend = backend();
        let payload = (0..255u16).map(|b| b as u8).collect::<Vec<_>>();
        let key = default_hasher().digest_bytes(&payload);
        backend.put(Namespace::Packfile, &key, &payload).unwrap();
        let part = backend.get_subpart(Namespace::Packfile, &key, 10, 20).unwrap();
        assert_eq!(part, payload[10..30]);
    }

    #[test]
    fn list_returns_every_put_key() {
        let backend = backend();
        let mut keys = Vec::new();
        for i in 0..5u8 {
            let key = default_hasher().digest_bytes(&[i]);
            backend.put(Namespace::Blob, &key, &[i]).unwrap();
            keys.push(key);
        }
        let mut listed = backend.list(Namespace::Blob).unwrap();
        listed.sort();
        keys.sort();
        assert_eq!(listed, keys);
    }
}
