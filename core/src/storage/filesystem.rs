//! On-disk filesystem backend, sharded by the first byte of the hex
//! digest:
//! `<root>/<NS>/<hex[0:2]>/<hex>`, files `0600`, directories `0700`.
//! A directory-per-namespace content-addressed tree, written with
//! tempfile-then-rename so a reader never observes a partial blob.

use super::{Backend, Namespace};
use crate::error::{EngineError, Result};
use crate::hash::Digest;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct FsBackend {
    root: PathBuf,
}

impl FsBackend {
    /// Open an existing repository root; does not create anything.
    pub fn open(root: impl Into<PathBuf>) -> Self {
        FsBackend { root: root.into() }
    }

    /// Create the namespace directory tree for a brand new repository.
    pub fn init(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        set_dir_mode(&root)?;
        for ns in [
            Namespace::Snapshot,
            Namespace::Blob,
            Namespace::Chunk,
            Namespace::Packfile,
            Namespace::State,
        ] {
            let dir = root.join(ns.dir_name());
            fs::create_dir_all(&dir)?;
            set_dir_mode(&dir)?;
        }
        Ok(FsBackend { root })
    }

    fn config_path(&self) -> PathBuf {
        self.root.join("CONFIG")
    }

    fn shard_dir(&self, ns: Namespace, key: &Digest) -> PathBuf {
        let hex = key.to_hex();
        self.root.join(ns.dir_name()).join(&hex[0..2])
    }

    fn path_for(&self, ns: Namespace, key: &Digest) -> PathBuf {
        self.shard_dir(ns, key).join(key.to_hex())
    }

    /// Write `bytes` to `path` atomically: write to a temp file in the
    /// same directory, then rename, so a reader never observes a
    /// partial write.
    fn atomic_write(&self, dir: &Path, path: &Path, bytes: &[u8]) -> Result<()> {
        fs::create_dir_all(dir)?;
        set_dir_mode(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(bytes)?;
        tmp.flush()?;
        let file = tmp.persist(path).map_err(|e| e.error)?;
        set_file_mode(&file)?;
        Ok(())
    }
}

#[cfg(unix)]
fn set_dir_mode(p: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(p, fs::Permissions::from_mode(0o700))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_dir_mode(_p: &Path) -> Result<()> {
    Ok(())
}

#[cfg(unix)]
fn set_file_mode(f: &fs::File) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    f.set_permissions(fs::Permissions::from_mode(0o600))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_file_mode(_f: &fs::File) -> Result<()> {
    Ok(())
}

impl Backend for FsBackend {
    fn create_config(&self, bytes: &[u8]) -> Result<()> {
        let path = self.config_path();
        if path.exists() {
            return Err(EngineError::AlreadyExists("CONFIG".into()));
        }
        self.atomic_write(&self.root, &path, bytes)
    }

    fn read_config(&self) -> Result<Vec<u8>> {
        fs::read(self.config_path())
            .map_err(|_| EngineError::not_found("CONFIG".to_string()))
    }

    fn put(&self, ns: Namespace, key: &Digest, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(ns, key);
        if path.exists() {
            let existing = fs::read(&path)?;
            if existing == bytes {
                return Ok(());
            }
            return Err(EngineError::AlreadyExists(format!(
                "{}/{}",
                ns.dir_name(),
                key
            )));
        }
        tracing::debug!(namespace = ns.dir_name(), key = %key, bytes = bytes.len(), "writing new object");
        self.atomic_write(&self.shard_dir(ns, key), &path, bytes)
    }

    fn get(&self, ns: Namespace, key: &Digest) -> Result<Vec<u8>> {
        fs::read(self.path_for(ns, key))
            .map_err(|_| EngineError::not_found(format!("{}/{}", ns.dir_name(), key)))
    }

    fn get_subpart(&self, ns: Namespace, key: &Digest, offset: u64, len: u64) -> Result<Vec<u8>> {
        use std::io::{Read, Seek, SeekFrom};
        let path = self.path_for(ns, key);
        let mut f = fs::File::open(&path)
            .map_err(|_| EngineError::not_found(format!("{}/{}", ns.dir_name(), key)))?;
        f.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len as usize];
        f.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn exists(&self, ns: Namespace, key: &Digest) -> Result<bool> {
        Ok(self.path_for(ns, key).exists())
    }

    fn size(&self, ns: Namespace, key: &Digest) -> Result<u64> {
        let path = self.path_for(ns, key);
        let meta = fs::metadata(&path)
            .map_err(|_| EngineError::not_found(format!("{}/{}", ns.dir_name(), key)))?;
        Ok(meta.len())
    }

    fn delete(&self, ns: Namespace, key: &Digest) -> Result<()> {
        let path = self.path_for(ns, key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self, ns: Namespace) -> Result<Vec<Digest>> {
        let base = self.root.join(ns.dir_name());
        let mut out = Vec::new();
        if !base.exists() {
            return Ok(out);
        }
        for shard in fs::read_dir(&base)? {
            let shard = shard?;
            if !shard.file_type()?.is_dir() {
                continue;
            }
            for entry in fs::read_dir(shard.path())? {
                let entry = entry?;
                if let Some(name) = entry.file_name().to_str() {
                    if let Ok(d) = Digest::from_hex(name) {
                        out.push(d);
                    }
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::default_hasher;

    #[test]
    fn put_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let fs_backend = FsBackend::init(dir.path()).unwrap();
        let key = default_hasher().digest_bytes(b"hello");
        fs_backend.put(Namespace::Chunk, &key, b"hello").unwrap();
        assert!(fs_backend.exists(Namespace::Chunk, &key).unwrap());
        assert_eq!(fs_backend.get(Namespace::Chunk, &key).unwrap(), b"hello");
    }

    #[test]
    fn duplicate_put_with_same_content_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let fs_backend = FsBackend::init(dir.path()).unwrap();
        let key = default_hasher().digest_bytes(b"hello");
        fs_backend.put(Namespace::Chunk, &key, b"hello").unwrap();
        fs_backend.put(Namespace::Chunk, &key, b"hello").unwrap();
    }

    #[test]
    fn duplicate_put_with_different_content_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let fs_backend = FsBackend::init(dir.path()).unwrap();
        let key = default_hasher().digest_bytes(b"hello");
        fs_backend.put(Namespace::Chunk, &key, b"hello").unwrap();
        assert!(fs_backend.put(Namespace::Chunk, &key, b"world").is_err());
    }

    #[test]
    fn config_create_once() {
        let dir = tempfile::tempdir().unwrap();
        let fs_backend = FsBackend::init(dir.path()).unwrap();
        fs_backend.create_config(b"cfg-v1").unwrap();
        assert!(fs_backend.create_config(b"cfg-v2").is_err());
        assert_eq!(fs_backend.read_config().unwrap(), b"cfg-v1");
    }

    #[test]
    fn subpart_reads_a_byte_range() {
        let dir = tempfile::tempdir().unwrap();
        let fs_backend = FsBackend::init(dir.path()).unwrap();
        let payload = (0..255u16).map(|b| b as u8).collect::<Vec<_>>();
        let key = default_hasher().digest_bytes(&payload);
        fs_backend.put(Namespace::Packfile, &key, &payload).unwrap();
        let part = fs_backend
            .get_subpart(Namespace::Packfile, &key, 10, 20)
            .unwrap();
        assert_eq!(part, payload[10..30]);
    }

    #[test]
    fn list_returns_every_put_key() {
        let dir = tempfile::tempdir().unwrap();
        let fs_backend = FsBackend::init(dir.path()).unwrap();
        let mut keys = Vec::new();
        for i in 0..5u8 {
            let key = default_hasher().digest_bytes(&[i]);
            fs_backend.put(Namespace::Blob, &key, &[i]).unwrap();
            keys.push(key);
        }
        let mut listed = fs_backend.list(Namespace::Blob).unwrap();
        listed.sort();
        keys.sort();
        assert_eq!(listed, keys);
    }
}
