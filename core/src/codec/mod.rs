//! Compression registry: a `CodecId`/`Compressor` trait pair driven by
//! name rather than hard-coded call sites, so new codecs register
//! without touching their callers.

pub mod gzip;
pub mod lz4;
pub mod store;

use crate::error::{EngineError, Result};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum CodecId {
    /// Identity codec — stores bytes unchanged.
    Store,
    /// Default codec.
    Lz4,
    Gzip,
}

impl CodecId {
    pub fn name(&self) -> &'static str {
        match self {
            CodecId::Store => "NONE",
            CodecId::Lz4 => "LZ4",
            CodecId::Gzip => "GZIP",
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "NONE" => Ok(CodecId::Store),
            "LZ4" => Ok(CodecId::Lz4),
            "GZIP" => Ok(CodecId::Gzip),
            other => Err(EngineError::UnsupportedAlgorithm(other.to_string())),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            CodecId::Store => 0,
            CodecId::Lz4 => 1,
            CodecId::Gzip => 2,
        }
    }

    pub fn from_u8(v: u8) -> Result<Self> {
        match v {
            0 => Ok(CodecId::Store),
            1 => Ok(CodecId::Lz4),
            2 => Ok(CodecId::Gzip),
            other => Err(EngineError::UnsupportedAlgorithm(format!("codec id {other}"))),
        }
    }
}

pub trait Compressor: Send + Sync {
    fn id(&self) -> CodecId;
    fn compress(&self, src: &[u8]) -> Result<Vec<u8>>;
    fn decompress(&self, src: &[u8]) -> Result<Vec<u8>>;
}

pub fn get(id: CodecId) -> &'static dyn Compressor {
    match id {
        CodecId::Store => &store::Store,
        CodecId::Lz4 => &lz4::Lz4Compressor,
        CodecId::Gzip => &gzip::GzipCompressor,
    }
}

/// `compress(name, bytes) -> bytes`. `"NONE"` is a valid
/// configuration meaning identity codec.
pub fn compress(name: &str, bytes: &[u8]) -> Result<Vec<u8>> {
    get(CodecId::from_name(name)?).compress(bytes)
}

/// `decompress(name, bytes) -> bytes`. Errors surface as `Codec` naming
/// the offending codec.
pub fn decompress(name: &str, bytes: &[u8]) -> Result<Vec<u8>> {
    get(CodecId::from_name(name)?).decompress(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_codec_round_trips() {
        let payload = b"the quick brown fox jumps over the lazy dog".repeat(64);
        for id in [CodecId::Store, CodecId::Lz4, CodecId::Gzip] {
            let c = get(id);
            let packed = c.compress(&payload).unwrap();
            let unpacked = c.decompress(&packed).unwrap();
            assert_eq!(unpacked, payload, "codec {:?} failed round trip", id);
        }
    }

    #[test]
    fn unknown_codec_name_rejected() {
        assert!(compress("BZIP2", b"x").is_err());
    }
}
