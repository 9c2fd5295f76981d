//! Discard-everything backend. Puts succeed and are dropped;
//! every get is `NotFound`; `list` is always empty. Useful for dry-run
//! backups and pipeline benchmarking where the cost of persistence
//! itself isn't what's being measured.

use super::{Backend, Namespace};
use crate::error::{EngineError, Result};
use crate::hash::Digest;
use std::sync::Mutex;

#[derive(Default)]
pub struct NullBackend {
    config_created: Mutex<bool>,
}

impl NullBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Backend for NullBackend {
    fn create_config(&self, _bytes: &[u8]) -> Result<()> {
        let mut created = self.config_created.lock().unwrap();
        if *created {
            return Err(EngineError::AlreadyExists("CONFIG".into()));
        }
        *created = true;
        Ok(())
    }

    fn read_config(&self) -> Result<Vec<u8>> {
        Err(EngineError::not_found("CONFIG"))
    }

    fn put(&self, _ns: Namespace, _key: &Digest, _bytes: &[u8]) -> Result<()> {
        Ok(())
    }

    fn get(&self, ns: Namespace, key: &Digest) -> Result<Vec<u8>> {
        Err(EngineError::not_found(format!("{}/{}", ns.dir_name(), key)))
    }

    fn exists(&self, _ns: Namespace, _key: &Digest) -> Result<bool> {
        Ok(false)
    }

    fn delete(&self, _ns: Namespace, _key: &Digest) -> Result<()> {
        Ok(())
    }

    fn list(&self, _ns: Namespace) -> Result<Vec<Digest>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::default_hasher;

    #[test]
    fn puts_are_accepted_but_never_retrievable() {
        let backend = NullBackend::new();
        let key = default_hasher().digest_bytes(b"x");
        backend.put(Namespace::Chunk, &key, b"x").unwrap();
        assert!(backend.get(Namespace::Chunk, &key).is_err());
        assert!(!backend.exists(Namespace::Chunk, &key).unwrap());
        assert!(backend.list(Namespace::Chunk).unwrap().is_empty());
    }

    #[test]
    fn config_is_still_create_once() {
        let backend = NullBackend::new();
        backend.create_config(b"cfg").unwrap();
        assert!(backend.create_config(b"cfg").is_err());
    }
}
