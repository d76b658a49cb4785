//! Payload encoding for persisted chunks

use crate::error::{ProcessingError, Result};
use flate2::read::{DeflateDecoder, DeflateEncoder};
use flate2::Compression as FlateCompression;
use serde::{Deserialize, Serialize};
use std::io::Read;

/// How chunk payloads are encoded on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkCodec {
    /// Stored as-is
    Raw,
    /// Deflate/ZIP compression
    Deflate,
    /// Zstandard compression
    #[default]
    Zstd,
}

impl ChunkCodec {
    /// Encode `data`; `level` is clamped to 0-9 and ignored for `Raw`
    pub fn encode(&self, data: &[u8], level: u8) -> Result<Vec<u8>> {
        let level = level.min(9);
        match self {
            ChunkCodec::Raw => Ok(data.to_vec()),
            ChunkCodec::Deflate => {
                let mut encoder = DeflateEncoder::new(data, FlateCompression::new(level as u32));
                let mut compressed = Vec::new();
                encoder
                    .read_to_end(&mut compressed)
                    .map_err(|e| ProcessingError::Codec(e.to_string()))?;
                Ok(compressed)
            }
            ChunkCodec::Zstd => zstd::encode_all(data, level as i32)
                .map_err(|e| ProcessingError::Codec(e.to_string())),
        }
    }

    /// Decode `data`, checking the result length when `expected_size` is known
    pub fn decode(&self, data: &[u8], expected_size: Option<usize>) -> Result<Vec<u8>> {
        let decoded = match self {
            ChunkCodec::Raw => data.to_vec(),
            ChunkCodec::Deflate => {
                let mut decoder = DeflateDecoder::new(data);
                let mut decompressed = Vec::with_capacity(expected_size.unwrap_or(0));
                decoder
                    .read_to_end(&mut decompressed)
                    .map_err(|e| ProcessingError::Codec(e.to_string()))?;
                decompressed
            }
            ChunkCodec::Zstd => {
                zstd::decode_all(data).map_err(|e| ProcessingError::Codec(e.to_string()))?
            }
        };

        match expected_size {
            Some(size) if size != decoded.len() => Err(ProcessingError::Codec(format!(
                "decoded {} bytes, expected {}",
                decoded.len(),
                size
            ))),
            _ => Ok(decoded),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compressing_codecs_shrink_repetitive_data() {
        let data = vec![7u8; 4096];
        for codec in [ChunkCodec::Deflate, ChunkCodec::Zstd] {
            let encoded = codec.encode(&data, 6).unwrap();
            assert!(encoded.len() < data.len(), "{:?} did not compress", codec);
            assert_eq!(codec.decode(&encoded, Some(data.len())).unwrap(), data);
        }
    }

    #[test]
    fn test_raw_passthrough() {
        let data = b"voxels".to_vec();
        assert_eq!(ChunkCodec::Raw.encode(&data, 9).unwrap(), data);
    }

    #[test]
    fn test_size_check() {
        let encoded = ChunkCodec::Zstd.encode(b"abc", 3).unwrap();
        assert!(ChunkCodec::Zstd.decode(&encoded, Some(4)).is_err());
    }
}
