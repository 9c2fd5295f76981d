//! Reads packfiles back: locating the trailer at end-of-file, parsing
//! the in-band index, and fetching one entry's encoded bytes — the
//! read-side counterpart of [`super::writer::Packer`], expressed as
//! ranged reads against the [`crate::storage::Backend`] abstraction
//! rather than seeks against one already-open local file handle.

use super::{PackfileEntry, Trailer, ENTRY_SIZE, TRAILER_LEN};
use crate::error::Result;
use crate::hash::Digest;
use crate::storage::{Backend, Namespace};

/// Parse the trailer out of an in-memory packfile. Used by tests and by
/// [`read_trailer`] once the final `TRAILER_LEN` bytes have been fetched.
pub(super) fn parse_trailer(packfile: &[u8]) -> Result<Trailer> {
    Trailer::parse(&packfile[packfile.len() - TRAILER_LEN as usize..])
}

/// Parse every index row out of an in-memory packfile.
pub(super) fn parse_index(packfile: &[u8], trailer: &Trailer) -> Result<Vec<PackfileEntry>> {
    let start = trailer.index_offset as usize;
    let mut out = Vec::with_capacity(trailer.entry_count as usize);
    for i in 0..trailer.entry_count as usize {
        let off = start + i * ENTRY_SIZE;
        out.push(PackfileEntry::read_from(&packfile[off..off + ENTRY_SIZE])?);
    }
    Ok(out)
}

/// Slice out one entry's encoded bytes from an in-memory packfile.
pub(super) fn read_entry_slice<'a>(packfile: &'a [u8], entry: &PackfileEntry) -> &'a [u8] {
    let start = entry.offset as usize;
    let end = start + entry.c_len as usize;
    &packfile[start..end]
}

/// Fetch and parse the trailer of a stored packfile without downloading
/// its body, via [`Backend::size`] + a tail-sized [`Backend::get_subpart`].
pub fn read_trailer(backend: &dyn Backend, packfile_digest: &Digest) -> Result<Trailer> {
    let total = backend.size(Namespace::Packfile, packfile_digest)?;
    let tail = backend.get_subpart(
        Namespace::Packfile,
        packfile_digest,
        total.saturating_sub(TRAILER_LEN),
        TRAILER_LEN,
    )?;
    Trailer::parse(&tail)
}

/// Fetch and parse the full in-band index of a stored packfile.
pub fn read_index(
    backend: &dyn Backend,
    packfile_digest: &Digest,
    trailer: &Trailer,
) -> Result<Vec<PackfileEntry>> {
    let len = trailer.entry_count * ENTRY_SIZE as u64;
    let bytes = backend.get_subpart(Namespace::Packfile, packfile_digest, trailer.index_offset, len)?;
    let mut out = Vec::with_capacity(trailer.entry_count as usize);
    for i in 0..trailer.entry_count as usize {
        let off = i * ENTRY_SIZE;
        out.push(PackfileEntry::read_from(&bytes[off..off + ENTRY_SIZE])?);
    }
    Ok(out)
}

/// Fetch one entry's encoded bytes from a stored packfile without
/// downloading the whole thing — the hot path for ordinary blob reads
/// once the `STATE` mapping has already resolved a content
/// digest to `(packfile_digest, offset, length)`.
pub fn read_entry(
    backend: &dyn Backend,
    packfile_digest: &Digest,
    offset: u64,
    len: u64,
) -> Result<Vec<u8>> {
    backend.get_subpart(Namespace::Packfile, packfile_digest, offset, len)
}

#[cfg(test)]
mod tests {
    use super::super::writer::{Packer, DEFAULT_TARGET_SIZE};
    use super::super::EntryKind;
    use super::*;
    use crate::codec::CodecId;
    use crate::hash::default_hasher;
    use crate::storage::filesystem::FsBackend;

    #[test]
    fn reads_trailer_and_index_back_from_a_stored_packfile() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FsBackend::init(dir.path()).unwrap();

        let mut packer = Packer::new(DEFAULT_TARGET_SIZE);
        let mut expected = Vec::new();
        for i in 0..4u8 {
            let payload = vec![i; 100];
            let digest = default_hasher().digest_bytes(&payload);
            packer.add(digest, EntryKind::Chunk, CodecId::Store, &payload, payload.len() as u64);
            expected.push((digest, payload));
        }
        let (packfile_digest, bytes, _entries) = packer.finish();
        backend.put(Namespace::Packfile, &packfile_digest, &bytes).unwrap();

        let trailer = read_trailer(&backend, &packfile_digest).unwrap();
        assert_eq!(trailer.entry_count, 4);
        let index = read_index(&backend, &packfile_digest, &trailer).unwrap();
        assert_eq!(index.len(), 4);

        for (entry, (digest, payload)) in index.iter().zip(expected.iter()) {
            assert_eq!(&entry.digest, digest);
            let fetched = read_entry(&backend, &packfile_digest, entry.offset, entry.c_len).unwrap();
            assert_eq!(&fetched, payload);
        }
    }
}
