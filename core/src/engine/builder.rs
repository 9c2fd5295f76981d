//! `SnapshotBuilder` — `begin_snapshot`/`put_file`/`finalize`. Drives
//! one snapshot's worth of work against the hashing, codec, chunking,
//! crypto, storage, and packing layers behind a [`Repository`]: chunk,
//! dedupe, compress/seal, and pack each file; accumulate the VFS tree
//! and the five header sections; finalize into one committed
//! [`Header`].

use std::collections::HashSet;
use std::io::Read;
use std::sync::Arc;
use std::time::Instant;

use super::blob::{self, put_blob};
use super::cancel::CancellationToken;
use super::repository::Repository;
use super::sections::{ErrorsSection, FileInfoRecord, IndexSection, MetadataSection, RootSection, StatisticsSection};
use super::state_summary;
use crate::error::Result;
use crate::hash::Digest;
use crate::pack::writer::Packer;
use crate::pack::EntryKind;
use crate::snapshot::Header;
use crate::storage::Namespace;
use crate::vfs::{self, FileInfo};

pub struct SnapshotBuilder {
    repo: Arc<Repository>,
    header: Header,
    index: vfs::Index,
    packer: Packer,
    seen: HashSet<[u8; 32]>,
    referenced: Vec<Digest>,
    objects: Vec<(String, [u8; 32])>,
    entries: Vec<(String, FileInfoRecord)>,
    symlinks: Vec<(String, String)>,
    stats: StatisticsSection,
    errors: Vec<(String, String)>,
    cancel: CancellationToken,
    started: Instant,
}

impl SnapshotBuilder {
    pub(super) fn new(repo: Arc<Repository>) -> Self {
        let target_packfile_size = repo.target_packfile_size();
        SnapshotBuilder {
            header: Header::new(repo.config().version),
            index: vfs::Index::new(),
            packer: Packer::new(target_packfile_size),
            seen: HashSet::new(),
            referenced: Vec::new(),
            objects: Vec::new(),
            entries: Vec::new(),
            symlinks: Vec::new(),
            stats: StatisticsSection::default(),
            errors: Vec::new(),
            cancel: CancellationToken::new(),
            started: Instant::now(),
            repo,
        }
    }

    /// The token that [`Self::put_file`]/[`Self::finalize`] check at every
    /// suspension point; clone it out to cancel this snapshot from
    /// another thread.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn set_category(&mut self, category: impl Into<String>) {
        self.header.category = category.into();
    }

    pub fn add_tag(&mut self, tag: impl Into<String>) {
        self.header.tags.push(tag.into());
    }

    pub fn set_context(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.header.set_context(key, value);
    }

    pub fn set_importer(&mut self, kind: impl Into<String>, origin: impl Into<String>, directory: impl Into<String>) {
        self.header.importer.kind = kind.into();
        self.header.importer.origin = origin.into();
        self.header.importer.directory = directory.into();
    }

    fn flush_packer(&mut self) -> Result<()> {
        if self.packer.is_empty() {
            return Ok(());
        }
        let full = std::mem::replace(&mut self.packer, Packer::new(self.repo.target_packfile_size()));
        let (packfile_digest, bytes, entries) = full.finish();
        tracing::debug!(
            packfile_digest = %packfile_digest.to_hex(),
            entries = entries.len(),
            bytes = bytes.len(),
            "flushing packfile"
        );
        self.repo.backend().put(Namespace::Packfile, &packfile_digest, &bytes)?;
        for e in &entries {
            crate::pack::state::record(
                self.repo.backend(),
                &e.digest,
                crate::pack::state::StateRecord {
                    packfile_digest,
                    offset: e.offset,
                    length: e.c_len,
                    kind: e.kind,
                    codec: e.codec,
                    u_len: e.u_len,
                },
            )?;
        }
        Ok(())
    }

    fn put_blob_tracked(&mut self, kind_tag: &str, kind: EntryKind, plaintext: &[u8]) -> Result<Digest> {
        let (digest, _) = self.put_blob_tracked_sized(kind_tag, kind, plaintext)?;
        Ok(digest)
    }

    fn put_blob_tracked_sized(
        &mut self,
        kind_tag: &str,
        kind: EntryKind,
        plaintext: &[u8],
    ) -> Result<(Digest, Option<usize>)> {
        let (digest, packed_size) = put_blob(&self.repo, kind_tag, kind, plaintext, &mut self.packer, &mut self.seen)?;
        if self.packer.is_full() {
            self.flush_packer()?;
        }
        self.referenced.push(digest);
        Ok((digest, packed_size))
    }

    /// Record a directory's own stat info; no content to chunk.
    pub fn put_directory(&mut self, path: &str, info: FileInfo) -> Result<()> {
        self.cancel.check()?;
        self.index.build(path, info)?;
        self.entries.push((path.to_string(), info.into()));
        Ok(())
    }

    /// Record a symlink verbatim, never dereferenced.
    pub fn put_symlink(&mut self, path: &str, info: FileInfo, target: &str) -> Result<()> {
        self.cancel.check()?;
        self.index.build(path, info)?;
        self.index.record_symlink(path, target);
        self.entries.push((path.to_string(), info.into()));
        self.symlinks.push((path.to_string(), target.to_string()));
        Ok(())
    }

    /// Chunk, dedupe, compress/seal, and pack one regular file's content
    ///, then assemble and pack its object (the ordered
    /// list of chunk digests) and index the path. Equivalent to
    /// [`Self::prepare_file`] immediately followed by
    /// [`Self::commit_prepared_file`]; callers that want the expensive
    /// chunk/hash/compress work to run off this builder's lock should call those two
    /// directly instead, as [`super::pipeline::backup_tree`] does.
    pub fn put_file(&mut self, path: &str, info: FileInfo, reader: impl Read) -> Result<()> {
        self.cancel.check()?;
        let params = self.repo.config().chunking;
        let prepared = blob::prepare_file(&self.repo, params, reader)?;
        self.commit_prepared_file(path, info, prepared)
    }

    /// The stateless half of [`Self::put_file`]: read, chunk, hash, and
    /// compress/seal `reader`'s content. Touches only `repo` (shared,
    /// `Send + Sync`), none of this builder's own fields, so it's safe to
    /// call without holding any lock on the builder itself. Crate-internal
    /// (used by [`super::pipeline`]): its return type carries encoded,
    /// not-yet-committed bytes that only make sense alongside
    /// [`Self::commit_prepared_file`].
    pub(crate) fn prepare_file(&self, reader: impl Read) -> Result<blob::PreparedFile> {
        blob::prepare_file(&self.repo, self.repo.config().chunking, reader)
    }

    /// The commit half of [`Self::put_file`]: dedupe each already-encoded
    /// chunk/object against `seen`/`STATE`, pack what's new, and record
    /// the path in the VFS tree and header sections. This is the only
    /// part of handling one file that needs exclusive access to the
    /// builder.
    pub(crate) fn commit_prepared_file(&mut self, path: &str, info: FileInfo, prepared: blob::PreparedFile) -> Result<()> {
        self.cancel.check()?;
        self.stats.total_chunks += prepared.total_chunks;
        self.stats.bytes_before_compression += prepared.bytes_before_compression;

        for chunk in &prepared.chunks {
            match blob::commit_encoded(&self.repo, &mut self.packer, &mut self.seen, chunk)? {
                Some(size) => self.stats.bytes_after_compression += size as u64,
                None => self.stats.deduplicated_chunks += 1,
            }
            if self.packer.is_full() {
                self.flush_packer()?;
            }
            self.referenced.push(chunk.digest);
        }

        self.stats.total_objects += 1;
        blob::commit_encoded(&self.repo, &mut self.packer, &mut self.seen, &prepared.object)?;
        if self.packer.is_full() {
            self.flush_packer()?;
        }
        self.referenced.push(prepared.object.digest);

        self.index.build(path, info)?;
        self.entries.push((path.to_string(), info.into()));
        self.objects.push((path.to_string(), *prepared.object.digest.as_bytes()));
        Ok(())
    }

    /// Record that `path` failed to read/digest/encode.
    pub fn record_error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push((path.into(), message.into()));
    }

    fn store_section(&mut self, kind_tag: &str, is_empty: bool, bytes: Vec<u8>) -> Result<Digest> {
        if is_empty {
            return Ok(Digest::ZERO);
        }
        self.put_blob_tracked(kind_tag, EntryKind::Object, &bytes)
    }

    /// `finalize_snapshot`: flush the last packfile, write
    /// the five header sections, fill in the header's summary/duration/
    /// section digests, commit the `STATE` digest-membership summary, and
    /// store the header itself.
    pub fn finalize(mut self) -> Result<Header> {
        self.cancel.check()?;
        self.flush_packer()?;

        let vfs_summary = self.index.summary();
        self.header.summary = crate::snapshot::Summary {
            files: vfs_summary.files,
            directories: vfs_summary.directories,
            total_size: vfs_summary.total_size,
        };
        self.header.creation_duration = self.started.elapsed();

        let index_section = IndexSection {
            entries: std::mem::take(&mut self.entries),
            symlinks: std::mem::take(&mut self.symlinks),
        };
        let index_empty = index_section.entries.is_empty() && index_section.symlinks.is_empty();
        let index_bytes = index_section.serialize()?;
        self.header.index = self.store_section("index", index_empty, index_bytes)?;

        let root_section = RootSection {
            objects: std::mem::take(&mut self.objects),
        };
        let root_empty = root_section.objects.is_empty();
        let root_bytes = root_section.serialize()?;
        self.header.root = self.store_section("root", root_empty, root_bytes)?;

        let metadata_section = MetadataSection {
            hashing: self.repo.config().hashing.clone(),
            compression: self.repo.config().compression.clone(),
            chunking: self.repo.config().chunking,
            worker_pool_size: self.repo.worker_pool_size(),
            target_packfile_size: self.repo.target_packfile_size(),
        };
        let metadata_bytes = metadata_section.serialize()?;
        self.header.metadata = self.store_section("metadata", false, metadata_bytes)?;

        let stats_bytes = self.stats.serialize()?;
        self.header.statistics = self.store_section("statistics", false, stats_bytes)?;

        let errors_section = ErrorsSection {
            entries: std::mem::take(&mut self.errors),
        };
        let errors_empty = errors_section.entries.is_empty();
        let errors_bytes = errors_section.serialize()?;
        self.header.errors = self.store_section("errors", errors_empty, errors_bytes)?;

        self.flush_packer()?;

        state_summary::commit(self.repo.backend(), self.header.snapshot_id, std::mem::take(&mut self.referenced))?;
        self.repo.store_header(&self.header)?;

        tracing::info!(
            snapshot_id = %self.header.snapshot_id.to_hex(),
            files = self.header.summary.files,
            directories = self.header.summary.directories,
            total_size = self.header.summary.total_size,
            duration_ms = self.header.creation_duration.as_millis() as u64,
            "snapshot finalized"
        );

        Ok(self.header)
    }
}
