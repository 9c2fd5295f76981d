//! Shared store/fetch helpers used by both [`super::builder::SnapshotBuilder`]
//! (packing new chunks/objects/sections) and [`super::snapshot::Snapshot`]
//! (reading them back), so both sides agree on exactly one encode/decode
//! pipeline: dedupe against `STATE`, then compress, then optionally seal
//!.

use crate::chunk::{self, ChunkParams};
use crate::codec::CodecId;
use crate::error::{EngineError, Result};
use crate::hash::Digest;
use crate::pack::writer::Packer;
use crate::pack::EntryKind;
use crate::pack::{reader, state};
use std::collections::HashSet;
use std::io::Read;

use super::repository::Repository;

/// Dedupe `plaintext` against `seen` and the repository's `STATE` table;
/// if genuinely new, compress (+ seal) it and append to `packer`. Returns
/// the content digest and, when this call actually packed new bytes, the
/// encoded size (callers use `None` to recognize a deduplicated blob).
pub(crate) fn put_blob(
    repo: &Repository,
    kind_tag: &str,
    kind: EntryKind,
    plaintext: &[u8],
    packer: &mut Packer,
    seen: &mut HashSet<[u8; 32]>,
) -> Result<(Digest, Option<usize>)> {
    let digest = repo.hasher().digest_bytes(plaintext);
    if seen.contains(digest.as_bytes()) || state::exists(repo.backend(), &digest)? {
        return Ok((digest, None));
    }
    let (codec, sealed) = repo.encode_and_seal(kind_tag, &digest, plaintext)?;
    let encoded_len = sealed.len();
    packer.add(digest, kind, codec, &sealed, plaintext.len() as u64);
    seen.insert(*digest.as_bytes());
    Ok((digest, Some(encoded_len)))
}

/// Resolve a content digest through `STATE` to its packfile location,
/// fetch the encoded bytes, open (+ decompress) them, and verify the
/// result actually hashes back to `digest` — every read is a check read
///. `Digest::ZERO` (an absent section) yields an empty blob.
pub(crate) fn get_blob(repo: &Repository, kind_tag: &str, digest: &Digest) -> Result<Vec<u8>> {
    if digest.is_zero() {
        return Ok(Vec::new());
    }
    let rec = state::lookup(repo.backend(), digest)?;
    let encoded = reader::read_entry(repo.backend(), &rec.packfile_digest, rec.offset, rec.length)?;
    let plaintext = repo.fetch_and_open(kind_tag, digest, rec.codec, encoded)?;
    let actual = repo.hasher().digest_bytes(&plaintext);
    if actual != *digest {
        return Err(EngineError::corruption(
            kind_tag,
            format!("digest mismatch: expected {digest}, got {actual}"),
        ));
    }
    Ok(plaintext)
}

/// `Fast` check: confirm the digest is resolvable without
/// fetching or decoding its bytes.
pub(crate) fn blob_exists(repo: &Repository, digest: &Digest) -> Result<bool> {
    if digest.is_zero() {
        return Ok(true);
    }
    state::exists(repo.backend(), digest)
}

/// One chunk or object, already hashed and compressed/sealed — the
/// output of the expensive, stateless half of [`put_blob`] that doesn't
/// need to touch a [`super::builder::SnapshotBuilder`]'s shared `packer`/
/// `seen` state and so can run off the builder's lock entirely.
pub(crate) struct EncodedBlob {
    pub digest: Digest,
    pub kind: EntryKind,
    pub codec: CodecId,
    pub encoded: Vec<u8>,
    pub u_len: u64,
}

/// A whole file's worth of prepared work: its chunks in file order, plus
/// the object blob assembled from their digests.
pub(crate) struct PreparedFile {
    pub chunks: Vec<EncodedBlob>,
    pub object: EncodedBlob,
    pub total_chunks: u64,
    pub bytes_before_compression: u64,
}

/// Read, content-defined-chunk, hash, and compress/seal a whole file
/// without touching any builder-owned state — safe to call concurrently
/// across many files with no lock held.
pub(crate) fn prepare_file(repo: &Repository, params: ChunkParams, mut reader: impl Read) -> Result<PreparedFile> {
    let mut chunks = Vec::new();
    let mut chunk_digests: Vec<Digest> = Vec::new();
    let mut bytes_before_compression = 0u64;

    for chunk_result in chunk::chunk_stream(&mut reader, params) {
        let bytes = chunk_result?;
        bytes_before_compression += bytes.len() as u64;
        let digest = repo.hasher().digest_bytes(&bytes);
        let (codec, encoded) = repo.encode_and_seal("chunk", &digest, &bytes)?;
        chunk_digests.push(digest);
        chunks.push(EncodedBlob {
            digest,
            kind: EntryKind::Chunk,
            codec,
            encoded,
            u_len: bytes.len() as u64,
        });
    }

    let mut object_bytes = Vec::with_capacity(chunk_digests.len() * 32);
    for d in &chunk_digests {
        object_bytes.extend_from_slice(d.as_bytes());
    }
    let object_digest = repo.hasher().digest_bytes(&object_bytes);
    let (object_codec, object_encoded) = repo.encode_and_seal("object", &object_digest, &object_bytes)?;

    Ok(PreparedFile {
        total_chunks: chunks.len() as u64,
        chunks,
        object: EncodedBlob {
            digest: object_digest,
            kind: EntryKind::Object,
            codec: object_codec,
            encoded: object_encoded,
            u_len: object_bytes.len() as u64,
        },
        bytes_before_compression,
    })
}

/// Dedupe an already-encoded blob against `seen`/`STATE` and, if
/// genuinely new, append it to `packer` — the one part of
/// [`prepare_file`]'s output that does need a builder's exclusive access,
/// kept as small as possible so the lock around it is held only briefly.
/// Returns the encoded size when this call actually packed new bytes,
/// `None` when the blob was already present (deduplicated).
pub(crate) fn commit_encoded(
    repo: &Repository,
    packer: &mut Packer,
    seen: &mut HashSet<[u8; 32]>,
    blob: &EncodedBlob,
) -> Result<Option<usize>> {
    if seen.contains(blob.digest.as_bytes()) || state::exists(repo.backend(), &blob.digest)? {
        return Ok(None);
    }
    packer.add(blob.digest, blob.kind, blob.codec, &blob.encoded, blob.u_len);
    seen.insert(*blob.digest.as_bytes());
    Ok(Some(blob.encoded.len()))
}
