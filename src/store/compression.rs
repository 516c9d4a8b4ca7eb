//! Chunk compression.
//!
//! Every stored chunk starts with one flag byte: [`RAW`] or [`ZLIB`]. Zlib
//! chunks are followed by the uncompressed size (`u64` LE) and the stream.

use std::io::{Read, Write};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::util::{StoreError, StoreResult};

/// Chunk stored verbatim.
pub const RAW: u8 = 0;

/// Chunk stored as a zlib stream.
pub const ZLIB: u8 = 1;

/// Encode a chunk at the given level (`<= 0` disables compression).
///
/// Falls back to a raw chunk when compression does not save space.
pub fn compress(data: &[u8], level: i32) -> StoreResult<Vec<u8>> {
    if level > 0 && !data.is_empty() {
        let compression_level = match level {
            1 => Compression::fast(),
            2..=5 => Compression::default(),
            _ => Compression::best(),
        };

        let mut encoder = ZlibEncoder::new(Vec::new(), compression_level);
        encoder.write_all(data)?;
        let compressed = encoder.finish()?;

        if compressed.len() + 9 < data.len() + 1 {
            let mut result = Vec::with_capacity(9 + compressed.len());
            result.push(ZLIB);
            result.extend_from_slice(&(data.len() as u64).to_le_bytes());
            result.extend_from_slice(&compressed);
            return Ok(result);
        }
    }

    let mut result = Vec::with_capacity(1 + data.len());
    result.push(RAW);
    result.extend_from_slice(data);
    Ok(result)
}

/// Decode a chunk written by [`compress`].
pub fn decompress(block: &[u8]) -> StoreResult<Vec<u8>> {
    match block.first() {
        Some(&RAW) => Ok(block[1..].to_vec()),
        Some(&ZLIB) => {
            if block.len() < 9 {
                return Err(StoreError::corrupt("compressed chunk header truncated"));
            }
            let mut size = [0u8; 8];
            size.copy_from_slice(&block[1..9]);
            let uncompressed_size = u64::from_le_bytes(size) as usize;

            let mut decoder = ZlibDecoder::new(&block[9..]);
            let mut decompressed = Vec::with_capacity(uncompressed_size);
            decoder.read_to_end(&mut decompressed)?;

            if decompressed.len() != uncompressed_size {
                return Err(StoreError::corrupt(format!(
                    "chunk decompressed to {} bytes, expected {}",
                    decompressed.len(),
                    uncompressed_size
                )));
            }
            Ok(decompressed)
        }
        Some(flag) => Err(StoreError::corrupt(format!("unknown chunk flag {}", flag))),
        None => Err(StoreError::corrupt("empty chunk block")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compress_decompress() {
        let original = vec![0u8; 4096];

        let compressed = compress(&original, 6).unwrap();
        assert_eq!(compressed[0], ZLIB);
        assert!(compressed.len() < original.len());

        let decompressed = decompress(&compressed).unwrap();
        assert_eq!(decompressed, original);
    }

    #[test]
    fn test_no_compression() {
        let original = b"short".to_vec();
        let block = compress(&original, 0).unwrap();
        assert_eq!(block[0], RAW);
        assert_eq!(decompress(&block).unwrap(), original);
    }

    #[test]
    fn test_incompressible_stays_raw() {
        let original: Vec<u8> = (0..64u8).map(|i| i.wrapping_mul(151).wrapping_add(7)).collect();
        let block = compress(&original, 9).unwrap();
        assert_eq!(decompress(&block).unwrap(), original);
    }

    #[test]
    fn test_unknown_flag() {
        assert!(decompress(&[7, 1, 2]).is_err());
        assert!(decompress(&[]).is_err());
    }
}
