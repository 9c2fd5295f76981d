//! `Snapshot` — `open`/`list_files`/`delete`/`check`: read access to
//! one committed [`Header`] and the VFS tree/object map its sections
//! describe. Each snapshot resolves independently through `STATE`
//! rather than sharing one chunk table.

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use super::blob::{blob_exists, get_blob};
use super::repository::Repository;
use super::sections::{ErrorsSection, IndexSection, MetadataSection, RootSection, StatisticsSection};
use super::state_summary;
use crate::error::{EngineError, Result};
use crate::hash::Digest;
use crate::snapshot::Header;

pub struct Snapshot {
    repo: Arc<Repository>,
    header: Header,
    index: crate::vfs::Index,
    objects: HashMap<String, Digest>,
}

impl Snapshot {
    /// `open_snapshot(id)`: load the header, then eagerly
    /// rebuild the VFS tree and path->object map from its `index`/`root`
    /// sections.
    pub fn open(repo: Arc<Repository>, snapshot_id: &Digest) -> Result<Snapshot> {
        let header = repo.load_header(snapshot_id)?;

        let index = crate::vfs::Index::new();
        if !header.index.is_zero() {
            let bytes = get_blob(&repo, "index", &header.index)?;
            let section = IndexSection::deserialize(&bytes)?;
            for (path, info) in section.entries {
                index.build(&path, info.into())?;
            }
            for (path, target) in section.symlinks {
                index.record_symlink(&path, &target);
            }
        }

        let mut objects = HashMap::new();
        if !header.root.is_zero() {
            let bytes = get_blob(&repo, "root", &header.root)?;
            let section = RootSection::deserialize(&bytes)?;
            for (path, digest_bytes) in section.objects {
                objects.insert(path, Digest(digest_bytes));
            }
        }

        Ok(Snapshot {
            repo,
            header,
            index,
            objects,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn list_files(&self) -> Vec<String> {
        self.index.list_files()
    }

    pub fn list_directories(&self) -> Vec<String> {
        self.index.list_directories()
    }

    pub fn list_children(&self, path: &str) -> Result<Vec<String>> {
        self.index.lookup_children(path)
    }

    pub fn symlink_target(&self, path: &str) -> Option<String> {
        self.index.symlink_target(path)
    }

    pub fn metadata(&self) -> Result<Option<MetadataSection>> {
        if self.header.metadata.is_zero() {
            return Ok(None);
        }
        Ok(Some(MetadataSection::deserialize(&get_blob(
            &self.repo,
            "metadata",
            &self.header.metadata,
        )?)?))
    }

    pub fn statistics(&self) -> Result<Option<StatisticsSection>> {
        if self.header.statistics.is_zero() {
            return Ok(None);
        }
        Ok(Some(StatisticsSection::deserialize(&get_blob(
            &self.repo,
            "statistics",
            &self.header.statistics,
        )?)?))
    }

    pub fn errors(&self) -> Result<Option<ErrorsSection>> {
        if self.header.errors.is_zero() {
            return Ok(None);
        }
        Ok(Some(ErrorsSection::deserialize(&get_blob(
            &self.repo,
            "errors",
            &self.header.errors,
        )?)?))
    }

    /// `restore`: reassemble one file's bytes in chunk order.
    pub fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let object_digest = self
            .objects
            .get(path)
            .ok_or_else(|| EngineError::not_found(path.to_string()))?;
        let object_bytes = get_blob(&self.repo, "object", object_digest)?;
        let mut out = Vec::with_capacity(object_bytes.len() * 4);
        for chunk_digest in object_bytes.chunks_exact(32) {
            let cd = Digest(chunk_digest.try_into().unwrap());
            out.extend_from_slice(&get_blob(&self.repo, "chunk", &cd)?);
        }
        Ok(out)
    }

    /// Streaming counterpart of [`Self::read_file`] for restoring
    /// directly to a destination without buffering the whole file.
    pub fn write_file_to(&self, path: &str, mut out: impl Write) -> Result<()> {
        let object_digest = self
            .objects
            .get(path)
            .ok_or_else(|| EngineError::not_found(path.to_string()))?;
        let object_bytes = get_blob(&self.repo, "object", object_digest)?;
        for chunk_digest in object_bytes.chunks_exact(32) {
            let cd = Digest(chunk_digest.try_into().unwrap());
            out.write_all(&get_blob(&self.repo, "chunk", &cd)?)?;
        }
        Ok(())
    }

    /// `delete_snapshot`: remove the header and its
    /// snapshot-addressed `STATE` summary copy. Packed chunk/object bytes
    /// are left in place — other snapshots may still reference them
    /// through deduplication, and reclaiming them is a separate,
    /// out-of-scope garbage-collection pass.
    pub fn delete(repo: &Repository, snapshot_id: &Digest) -> Result<()> {
        repo.backend().delete(crate::storage::Namespace::Snapshot, snapshot_id)?;
        state_summary::remove(repo.backend(), snapshot_id)
    }
}

/// `check(fast|full)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckMode {
    /// Confirm every referenced digest resolves through `STATE`, without
    /// fetching or decoding bytes.
    Fast,
    /// Additionally fetch, decode, and re-hash every chunk reachable from
    /// the snapshot's root.
    Full,
}

#[derive(Clone, Debug, Default)]
pub struct CheckReport {
    pub chunks_checked: u64,
    pub corruptions: Vec<String>,
}

impl CheckReport {
    pub fn is_ok(&self) -> bool {
        self.corruptions.is_empty()
    }
}

/// Verify a committed snapshot without necessarily opening it for
/// reading. Takes the raw digest rather than an
/// already-`open`ed [`Snapshot`] so a corrupt `index`/`root` section
/// doesn't prevent checking what *is* reachable.
pub fn check(repo: &Repository, snapshot_id: &Digest, mode: CheckMode) -> Result<CheckReport> {
    let mut report = CheckReport::default();
    let header = match repo.load_header(snapshot_id) {
        Ok(h) => h,
        Err(e) => {
            report.corruptions.push(format!("header: {e}"));
            return Ok(report);
        }
    };

    let named_sections = [
        ("root", header.root),
        ("index", header.index),
        ("metadata", header.metadata),
        ("statistics", header.statistics),
        ("errors", header.errors),
    ];

    let mut root_bytes: Option<Vec<u8>> = None;
    for (name, digest) in named_sections {
        match mode {
            CheckMode::Fast => {
                if !blob_exists(repo, &digest)? {
                    report.corruptions.push(format!("{name} section {digest}: missing from STATE"));
                }
            }
            CheckMode::Full => match get_blob(repo, name, &digest) {
                Ok(bytes) => {
                    if name == "root" {
                        root_bytes = Some(bytes);
                    }
                }
                Err(e) => report.corruptions.push(format!("{name} section {digest}: {e}")),
            },
        }
    }

    if mode == CheckMode::Full && !header.root.is_zero() {
        if let Some(bytes) = root_bytes {
            match RootSection::deserialize(&bytes) {
                Ok(root) => {
                    for (path, object_digest_bytes) in root.objects {
                        let object_digest = Digest(object_digest_bytes);
                        match get_blob(repo, "object", &object_digest) {
                            Ok(object_bytes) => {
                                for chunk_digest_bytes in object_bytes.chunks_exact(32) {
                                    let cd = Digest(chunk_digest_bytes.try_into().unwrap());
                                    report.chunks_checked += 1;
                                    if let Err(e) = get_blob(repo, "chunk", &cd) {
                                        report.corruptions.push(format!("{path}: chunk {cd}: {e}"));
                                    }
                                }
                            }
                            Err(e) => report.corruptions.push(format!("{path}: object {object_digest}: {e}")),
                        }
                    }
                }
                Err(e) => report.corruptions.push(format!("root section: {e}")),
            }
        }
    }

    if report.is_ok() {
        tracing::debug!(
            snapshot_id = %snapshot_id.to_hex(),
            chunks_checked = report.chunks_checked,
            "check found no corruption"
        );
    } else {
        tracing::warn!(
            snapshot_id = %snapshot_id.to_hex(),
            corruptions = report.corruptions.len(),
            "check found corruption"
        );
    }

    Ok(report)
}
