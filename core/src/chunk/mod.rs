//! Content-defined chunking, built on `fastcdc::v2020`
//! over `(min, avg, max)` bounds.

use crate::error::{EngineError, Result};
use fastcdc::v2020::{FastCDC, StreamCDC};
use std::io::Read;

/// Default bounds: 512 KiB / 1 MiB / 8 MiB.
pub const DEFAULT_MIN: u32 = 512 * 1024;
pub const DEFAULT_NORMAL: u32 = 1024 * 1024;
pub const DEFAULT_MAX: u32 = 8 * 1024 * 1024;

#[derive(Clone, Copy, Debug, serde::Serialize, serde::Deserialize)]
pub struct ChunkParams {
    pub min: u32,
    pub normal: u32,
    pub max: u32,
}

impl Default for ChunkParams {
    fn default() -> Self {
        ChunkParams {
            min: DEFAULT_MIN,
            normal: DEFAULT_NORMAL,
            max: DEFAULT_MAX,
        }
    }
}

/// One output chunk: its byte offset and length within the stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkSpan {
    pub offset: u64,
    pub length: u64,
}

/// Split an in-memory buffer into content-defined chunk spans. Used for
/// small, already-materialized payloads (VFS tree, headers) where
/// streaming from a file isn't applicable.
///
/// Every output span has `min <= len <= max`, except the final span,
/// which may be shorter than `min`. An empty buffer
/// yields zero spans.
pub fn chunk_slice(data: &[u8], params: ChunkParams) -> Vec<ChunkSpan> {
    if data.is_empty() {
        return Vec::new();
    }
    FastCDC::new(data, params.min, params.normal, params.max)
        .map(|c| ChunkSpan {
            offset: c.offset as u64,
            length: c.length as u64,
        })
        .collect()
}

/// Chunk a readable stream without buffering it entirely in memory.
/// Boundaries are a pure function of content, independent of how the
/// caller's reader happens to buffer its I/O.
pub fn chunk_stream<R: Read>(
    r: R,
    params: ChunkParams,
) -> impl Iterator<Item = Result<Vec<u8>>> {
    StreamCDC::new(r, params.min, params.normal, params.max)
        .map(|res| res.map(|c| c.data).map_err(|e| EngineError::Format(e.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(chunk_slice(&[], ChunkParams::default()).is_empty());
    }

    #[test]
    fn exactly_max_bytes_yields_one_chunk() {
        let params = ChunkParams {
            min: 4096,
            normal: 8192,
            max: 16384,
        };
        let data = vec![0xAAu8; params.max as usize];
        let spans = chunk_slice(&data, params);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].length, params.max as u64);
    }

    #[test]
    fn spans_are_contiguous_and_cover_the_input() {
        let params = ChunkParams {
            min: 256,
            normal: 1024,
            max: 4096,
        };
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let spans = chunk_slice(&data, params);
        let mut cursor = 0u64;
        for s in &spans {
            assert_eq!(s.offset, cursor);
            cursor += s.length;
        }
        assert_eq!(cursor, data.len() as u64);
        for s in &spans[..spans.len().saturating_sub(1)] {
            assert!(s.length >= params.min as u64);
            assert!(s.length <= params.max as u64);
        }
    }

    #[test]
    fn boundaries_are_independent_of_buffering() {
        let params = ChunkParams {
            min: 256,
            normal: 1024,
            max: 4096,
        };
        let data: Vec<u8> = (0..200_000u32).map(|i| ((i * 7) % 241) as u8).collect();

        let whole = chunk_slice(&data, params);

        // Stream the same bytes through a reader that only ever hands
        // back tiny reads, forcing StreamCDC to refill its buffer many
        // times over the same content.
        struct Trickle<'a> {
            data: &'a [u8],
            pos: usize,
        }
        impl<'a> Read for Trickle<'a> {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                let n = buf.len().min(3).min(self.data.len() - self.pos);
                buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
                self.pos += n;
                Ok(n)
            }
        }

        let streamed: Vec<Vec<u8>> = chunk_stream(
            Trickle {
                data: &data,
                pos: 0,
            },
            params,
        )
        .collect::<Result<_>>()
        .unwrap();

        assert_eq!(streamed.len(), whole.len());
        for (chunk, span) in streamed.iter().zip(whole.iter()) {
            assert_eq!(chunk.len() as u64, span.length);
        }
    }
}
