use super::{CodecId, Compressor};
use crate::error::Result;

pub struct Store;

impl Compressor for Store {
    fn id(&self) -> CodecId {
        CodecId::Store
    }

    fn compress(&self, src: &[u8]) -> Result<Vec<u8>> {
        Ok(src.to_vec())
    }

    fn decompress(&self, src: &[u8]) -> Result<Vec<u8>> {
        Ok(src.to_vec())
    }
}
