//! Whole-file compression stage.
//!
//! The on-page format keys compression off a single `mode` bit
//! ([`crate::superblock::PBM_COMPRESSED`]) — there is no per-block codec
//! selector, so unlike a general-purpose archive format this stage is a
//! single fixed algorithm, not a registry. `spec.md` §4.4 describes
//! "deterministic block-sorting compression" — the original source's
//! `bz_stream` field (`paperbak.h`) ties this directly to bzip2, so that is
//! what this module wraps.
//!
//! # Levels
//! [`CompressionLevel::None`] stores data verbatim (still padded, see
//! below). [`CompressionLevel::Fast`] and [`CompressionLevel::Max`] map onto
//! bzip2's own block-size knob (1..=9, in 100 KiB units): fast uses a small
//! block size for speed, max uses the largest block size for ratio.
//!
//! # Padding
//! The on-page stream's `datasize` must be a multiple of 16 bytes (the
//! encryption stage's block size, even when encryption is off, so the
//! reassembler's arithmetic doesn't change shape based on `mode`).
//! [`pad_to_block`] appends zero bytes and returns the padding count; the
//! original length isn't otherwise encoded, since `origsize` already belongs
//! to the superblock payload.

use bzip2::read::{BzDecoder, BzEncoder};
use bzip2::Compression;
use std::io::Read;
use thiserror::Error;

/// Encryption (and the padding step that always precedes it) works in
/// fixed-size chunks of this many bytes.
pub const PAD_BLOCK_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionLevel {
    /// Stored verbatim, no bzip2 framing.
    None,
    /// Small bzip2 block size — optimizes for encode speed.
    Fast,
    /// Largest bzip2 block size — optimizes for ratio.
    Max,
}

impl CompressionLevel {
    /// Parse the `spec.md` §6 `compression` config value (0/1/2).
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(CompressionLevel::None),
            1 => Some(CompressionLevel::Fast),
            2 => Some(CompressionLevel::Max),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            CompressionLevel::None => 0,
            CompressionLevel::Fast => 1,
            CompressionLevel::Max => 2,
        }
    }

    fn bzip2_level(self) -> Compression {
        match self {
            CompressionLevel::None => Compression::none(),
            CompressionLevel::Fast => Compression::fast(),
            CompressionLevel::Max => Compression::best(),
        }
    }
}

#[derive(Error, Debug)]
pub enum CompressionError {
    #[error("bzip2 compression failed: {0}")]
    Compress(std::io::Error),
    #[error("bzip2 decompression failed: {0}")]
    Decompress(std::io::Error),
}

/// Compress `data` per `level`. `CompressionLevel::None` returns `data`
/// unchanged (the caller still pads and CRCs the result identically).
pub fn compress(data: &[u8], level: CompressionLevel) -> Result<Vec<u8>, CompressionError> {
    if level == CompressionLevel::None {
        return Ok(data.to_vec());
    }
    let mut encoder = BzEncoder::new(data, level.bzip2_level());
    let mut out = Vec::new();
    encoder.read_to_end(&mut out).map_err(CompressionError::Compress)?;
    Ok(out)
}

/// Decompress a stream produced by [`compress`] with the matching level.
/// `CompressionLevel::None` returns `data` unchanged.
pub fn decompress(data: &[u8], level: CompressionLevel) -> Result<Vec<u8>, CompressionError> {
    if level == CompressionLevel::None {
        return Ok(data.to_vec());
    }
    let mut decoder = BzDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).map_err(CompressionError::Decompress)?;
    Ok(out)
}

/// Zero-pad `data` up to the next multiple of [`PAD_BLOCK_LEN`] bytes.
/// Returns the padded buffer; the original (unpadded) length is always
/// recoverable from `origsize`/`datasize` in the superblock, so no length
/// marker is embedded here.
pub fn pad_to_block(mut data: Vec<u8>) -> Vec<u8> {
    let remainder = data.len() % PAD_BLOCK_LEN;
    if remainder != 0 {
        data.resize(data.len() + (PAD_BLOCK_LEN - remainder), 0);
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_level_is_identity() {
        let data = b"HELLO\n".to_vec();
        let compressed = compress(&data, CompressionLevel::None).unwrap();
        assert_eq!(compressed, data);
        let decompressed = decompress(&compressed, CompressionLevel::None).unwrap();
        assert_eq!(decompressed, data);
    }

    #[test]
    fn fast_and_max_roundtrip() {
        let data: Vec<u8> = (0..10_000).map(|i| (i % 251) as u8).collect();
        for level in [CompressionLevel::Fast, CompressionLevel::Max] {
            let compressed = compress(&data, level).unwrap();
            let decompressed = decompress(&compressed, level).unwrap();
            assert_eq!(decompressed, data);
        }
    }

    #[test]
    fn compression_actually_shrinks_repetitive_data() {
        let data = vec![0x41u8; 50_000];
        let compressed = compress(&data, CompressionLevel::Max).unwrap();
        assert!(compressed.len() < data.len() / 10);
    }

    #[test]
    fn pad_to_block_rounds_up_to_16() {
        assert_eq!(pad_to_block(vec![1, 2, 3]).len(), 16);
        assert_eq!(pad_to_block(vec![0u8; 16]).len(), 16);
        assert_eq!(pad_to_block(vec![0u8; 17]).len(), 32);
        assert_eq!(pad_to_block(Vec::new()).len(), 0);
    }

    #[test]
    fn level_u8_roundtrip() {
        for v in 0..3u8 {
            let level = CompressionLevel::from_u8(v).unwrap();
            assert_eq!(level.as_u8(), v);
        }
        assert!(CompressionLevel::from_u8(3).is_none());
    }
}
