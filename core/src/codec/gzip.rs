use super::{CodecId, Compressor};
use crate::error::{EngineError, Result};
use flate2::Compression;
use flate2::read::{GzDecoder, GzEncoder};
use std::io::Read;

pub struct GzipCompressor;

impl Compressor for GzipCompressor {
    fn id(&self) -> CodecId {
        CodecId::Gzip
    }

    fn compress(&self, src: &[u8]) -> Result<Vec<u8>> {
        let mut enc = GzEncoder::new(src, Compression::default());
        let mut out = Vec::with_capacity(src.len());
        enc.read_to_end(&mut out)
            .map_err(|e| EngineError::codec("GZIP", e.to_string()))?;
        Ok(out)
    }

    fn decompress(&self, src: &[u8]) -> Result<Vec<u8>> {
        let mut dec = GzDecoder::new(src);
        let mut out = Vec::new();
        dec.read_to_end(&mut out)
            .map_err(|e| EngineError::codec("GZIP", e.to_string()))?;
        Ok(out)
    }
}
