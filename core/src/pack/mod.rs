//! Packfile layer: many self-indexed packfiles, each
//! carrying its own contiguous blob data, an in-band index, and a
//! trailer located by seeking from end-of-file.

pub mod reader;
pub mod state;
pub mod writer;

use crate::codec::CodecId;
use crate::error::{EngineError, Result};
use crate::hash::Digest;

pub const TRAILER_MAGIC: [u8; 8] = *b"PACKTAIL";
/// kind(1) + codec(1) + digest(32) + offset(8) + u_len(8) + c_len(8)
pub const ENTRY_SIZE: usize = 1 + 1 + 32 + 8 + 8 + 8;
/// magic(8) + index_offset(8) + entry_count(8) + footer digest(32)
pub const TRAILER_LEN: u64 = 8 + 8 + 8 + 32;

/// What a packed blob was: a content chunk, or a whole small object
/// (header section, chunk-digest list) packed without a chunk table
/// entry of its own.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    Chunk,
    Object,
}

impl EntryKind {
    fn to_byte(self) -> u8 {
        match self {
            EntryKind::Chunk => 0,
            EntryKind::Object => 1,
        }
    }

    fn from_byte(b: u8) -> Result<Self> {
        match b {
            0 => Ok(EntryKind::Chunk),
            1 => Ok(EntryKind::Object),
            other => Err(EngineError::corruption(
                "packfile index",
                format!("unknown entry kind tag {other}"),
            )),
        }
    }
}

/// One in-band index row: where a blob's encoded (compressed, not yet
/// encrypted) bytes sit within the packfile, and how to decode them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackfileEntry {
    pub kind: EntryKind,
    pub codec: CodecId,
    pub digest: Digest,
    pub offset: u64,
    pub u_len: u64,
    pub c_len: u64,
}

impl PackfileEntry {
    fn write_to(&self, out: &mut Vec<u8>) {
        out.push(self.kind.to_byte());
        out.push(self.codec.as_u8());
        out.extend_from_slice(self.digest.as_bytes());
        out.extend_from_slice(&self.offset.to_le_bytes());
        out.extend_from_slice(&self.u_len.to_le_bytes());
        out.extend_from_slice(&self.c_len.to_le_bytes());
    }

    fn read_from(buf: &[u8]) -> Result<Self> {
        if buf.len() != ENTRY_SIZE {
            return Err(EngineError::corruption(
                "packfile index",
                format!("entry is {} bytes, expected {ENTRY_SIZE}", buf.len()),
            ));
        }
        let kind = EntryKind::from_byte(buf[0])?;
        let codec = CodecId::from_u8(buf[1])?;
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&buf[2..34]);
        let offset = le64(&buf[34..42]);
        let u_len = le64(&buf[42..50]);
        let c_len = le64(&buf[50..58]);
        Ok(PackfileEntry {
            kind,
            codec,
            digest: Digest(digest),
            offset,
            u_len,
            c_len,
        })
    }
}

fn le64(b: &[u8]) -> u64 {
    u64::from_le_bytes(b.try_into().unwrap())
}

/// Parsed trailer, located by reading the last
/// [`TRAILER_LEN`] bytes of a packfile — an end-of-file-relative
/// lookup against a backend's [`crate::storage::Backend::size`]/
/// `get_subpart` instead of a local file handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Trailer {
    pub index_offset: u64,
    pub entry_count: u64,
    pub footer_digest: Digest,
}

impl Trailer {
    fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&TRAILER_MAGIC);
        out.extend_from_slice(&self.index_offset.to_le_bytes());
        out.extend_from_slice(&self.entry_count.to_le_bytes());
        out.extend_from_slice(self.footer_digest.as_bytes());
    }

    fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() != TRAILER_LEN as usize {
            return Err(EngineError::corruption(
                "packfile trailer",
                format!("trailer is {} bytes, expected {TRAILER_LEN}", buf.len()),
            ));
        }
        if buf[0..8] != TRAILER_MAGIC {
            return Err(EngineError::corruption("packfile trailer", "bad magic"));
        }
        let index_offset = le64(&buf[8..16]);
        let entry_count = le64(&buf[16..24]);
        let mut footer_digest = [0u8; 32];
        footer_digest.copy_from_slice(&buf[24..56]);
        Ok(Trailer {
            index_offset,
            entry_count,
            footer_digest: Digest(footer_digest),
        })
    }
}
