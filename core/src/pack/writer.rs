//! Accumulates encoded blobs into one packfile at a time and flushes it
//! once it reaches a target size, batching many blobs' worth of index
//! entries into a single self-indexed file.

use super::{EntryKind, PackfileEntry, Trailer, TRAILER_LEN};
use crate::codec::CodecId;
use crate::hash::{default_hasher, Digest};

/// Default target packfile size before a flush is triggered.
pub const DEFAULT_TARGET_SIZE: u64 = 32 * 1024 * 1024;

pub struct Packer {
    target_size: u64,
    buf: Vec<u8>,
    entries: Vec<PackfileEntry>,
}

impl Packer {
    pub fn new(target_size: u64) -> Self {
        Packer {
            target_size,
            buf: Vec::new(),
            entries: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[PackfileEntry] {
        &self.entries
    }

    /// Whether this packer has reached its target size and should be
    /// flushed before accepting more blobs.
    pub fn is_full(&self) -> bool {
        self.buf.len() as u64 >= self.target_size
    }

    /// Append one already-encoded (compressed, pre-encryption) blob.
    /// Returns the offset it was written at within the eventual
    /// packfile.
    pub fn add(&mut self, digest: Digest, kind: EntryKind, codec: CodecId, encoded: &[u8], u_len: u64) -> u64 {
        let offset = self.buf.len() as u64;
        self.buf.extend_from_slice(encoded);
        self.entries.push(PackfileEntry {
            kind,
            codec,
            digest,
            offset,
            u_len,
            c_len: encoded.len() as u64,
        });
        offset
    }

    /// Append the in-band index and trailer, and compute the packfile's
    /// own content digest — the key it will be stored under in
    /// `Namespace::Packfile`. Consumes the packer; the entries are
    /// handed back so the caller can update the `STATE` mapping.
    pub fn finish(self) -> (Digest, Vec<u8>, Vec<PackfileEntry>) {
        let mut out = self.buf;
        let index_offset = out.len() as u64;
        for e in &self.entries {
            e.write_to(&mut out);
        }
        let entry_count = self.entries.len() as u64;
        let footer_digest = default_hasher().digest_bytes(&out);

        let trailer = Trailer {
            index_offset,
            entry_count,
            footer_digest,
        };
        trailer.write_to(&mut out);
        debug_assert_eq!(
            out.len() as u64,
            index_offset + entry_count * super::ENTRY_SIZE as u64 + TRAILER_LEN
        );

        let packfile_digest = default_hasher().digest_bytes(&out);
        (packfile_digest, out, self.entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CodecId;
    use crate::pack::reader;

    #[test]
    fn single_blob_round_trips_through_index_and_trailer() {
        let mut packer = Packer::new(DEFAULT_TARGET_SIZE);
        let payload = b"packed blob payload";
        let digest = default_hasher().digest_bytes(payload);
        packer.add(digest, EntryKind::Chunk, CodecId::Store, payload, payload.len() as u64);

        let (packfile_digest, bytes, entries) = packer.finish();
        assert_eq!(entries.len(), 1);

        let trailer = reader::parse_trailer(&bytes).unwrap();
        assert_eq!(trailer.entry_count, 1);
        let parsed_entries = reader::parse_index(&bytes, &trailer).unwrap();
        assert_eq!(parsed_entries, entries);

        let slice = reader::read_entry_slice(&bytes, &parsed_entries[0]);
        assert_eq!(slice, payload);
        assert!(!packfile_digest.is_zero());
    }

    #[test]
    fn target_size_drives_is_full() {
        let mut packer = Packer::new(8);
        assert!(!packer.is_full());
        let digest = default_hasher().digest_bytes(b"12345678");
        packer.add(digest, EntryKind::Chunk, CodecId::Store, b"12345678", 8);
        assert!(packer.is_full());
    }
}
