//! # paperback — high-density paper backup encode/decode core
//!
//! Encodes an arbitrary binary file into a printable black/white dot bitmap
//! ("page") and reconstructs the original file from a scan of one or more
//! such pages.
//!
//! Format guarantees:
//! - Every on-page block is exactly 128 bytes: `addr + 90-byte payload +
//!   CRC16 + 32-byte RS(255,223) parity`, little-endian throughout.
//! - A superblock (`addr = 0xFFFF_FFFF`) carries per-file metadata and
//!   appears once per page at a fixed scan position.
//! - `ngroup` data blocks are followed by one XOR recovery block, enabling
//!   single-erasure reconstruction within the group.
//! - Grid geometry is deterministic from `(dpi, dotpercent, margins, flags,
//!   page_size)` — encoder and decoder derive it identically.
//! - The encode and decode pipelines are cooperatively stepped state
//!   machines (`step` + `next_step`); no operation blocks indefinitely.

pub mod bitmap;
pub mod block;
pub mod compression;
pub mod config;
pub mod crc16;
pub mod crypto;
pub mod decode;
pub mod decoder;
pub mod encode;
pub mod error;
pub mod geometry;
pub mod perf;
pub mod reassembler;
pub mod recovery;
pub mod render;
pub mod rs255;
pub mod superblock;

// Flat re-exports for the most common types.
pub use bitmap::{read_bmp_gray, write_bmp_gray, GrayBitmap, MonoBitmap};
pub use block::{Block, DecodeResult};
pub use config::{DecodeConfig, EncodeConfig, Margins};
pub use decode::DecodeState;
pub use encode::EncodeState;
pub use error::StepError;
pub use reassembler::{Reassembler, RestoredFile};
pub use superblock::Superblock;
