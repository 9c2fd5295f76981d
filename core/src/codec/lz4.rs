use super::{CodecId, Compressor};
use crate::error::{EngineError, Result};

/// Default compressor. Frame format carries its own
/// uncompressed length so `decompress` doesn't need it passed separately.
pub struct Lz4Compressor;

impl Compressor for Lz4Compressor {
    fn id(&self) -> CodecId {
        CodecId::Lz4
    }

    fn compress(&self, src: &[u8]) -> Result<Vec<u8>> {
        Ok(lz4_flex::block::compress_prepend_size(src))
    }

    fn decompress(&self, src: &[u8]) -> Result<Vec<u8>> {
        lz4_flex::block::decompress_size_prepended(src)
            .map_err(|e| EngineError::codec("LZ4", e.to_string()))
    }
}
