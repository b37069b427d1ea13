//! The 128-byte on-page block — the atomic unit printed and scanned.
//!
//! # On-page layout (128 bytes, all multi-byte fields little-endian)
//!
//! ```text
//! Offset  Size  Field
//!    0      4   addr     block address, or `SUPERBLOCK_ADDR` for a file header
//!    4     90   payload  useful data (opaque to this module)
//!   94      2   crc      crc16(addr || payload) ^ CRC_XOR_MASK
//!   96     32   ecc      RS(255,223) parity over bytes [0..96)
//! ```
//!
//! This is the memory/wire image of the original format's `t_data`: a block
//! address, 90 bytes of payload, a CRC16, and 32 bytes of Reed-Solomon
//! parity — 128 bytes total, matching the dot grid's `NDOT × NDOT` block
//! capacity exactly.
//!
//! # Address space
//! Ordinary data blocks use `addr` as a byte offset into the (compressed)
//! file stream. [`SUPERBLOCK_ADDR`] (`0xFFFFFFFF`) is reserved: a block
//! carrying that address is a [`crate::superblock::Superblock`] instead of
//! file data, and its payload is interpreted by `superblock.rs`.
//!
//! # Error correction and erasures
//! `encode` always produces a block with a valid CRC and ECC. `decode` never
//! panics on corrupted input — scanning the real world guarantees noisy
//! input — and instead reports what it could recover via [`DecodeResult`].

use crate::crc16::{crc16, CRC_XOR_MASK};
use crate::rs255::{self, DecodeOutcome};
use thiserror::Error;

/// Number of payload bytes in a block.
pub const PAYLOAD_LEN: usize = 90;
/// Total on-page size of one block, in bytes.
pub const BLOCK_LEN: usize = 128;
/// Reserved address marking a block as a file-header (superblock) carrier.
pub const SUPERBLOCK_ADDR: u32 = 0xFFFF_FFFF;
/// Largest `datasize` this format can address: a data block's `addr` must
/// stay strictly below this.
pub const MAXSIZE: u32 = 0x0FFF_FF80;

/// Byte range over which the CRC is computed: `addr || payload`.
const CRC_COVERED_LEN: usize = 4 + PAYLOAD_LEN;
/// Byte range over which the RS parity is computed: `addr || payload || crc`.
const ECC_COVERED_LEN: usize = CRC_COVERED_LEN + 2;

#[derive(Error, Debug)]
pub enum BlockCodecError {
    #[error("payload is {0} bytes, expected at most {PAYLOAD_LEN}")]
    PayloadTooLong(usize),
    #[error("block is {0} bytes, expected exactly {BLOCK_LEN}")]
    WrongLength(usize),
}

/// A block ready to be laid out on the page, or as read back before decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub addr: u32,
    pub payload: [u8; PAYLOAD_LEN],
}

impl Block {
    pub fn new(addr: u32, payload: [u8; PAYLOAD_LEN]) -> Self {
        Self { addr, payload }
    }

    /// Build a block from a data slice shorter than [`PAYLOAD_LEN`],
    /// zero-padding the remainder (used for the final partial block of a file).
    pub fn from_slice(addr: u32, data: &[u8]) -> Result<Self, BlockCodecError> {
        if data.len() > PAYLOAD_LEN {
            return Err(BlockCodecError::PayloadTooLong(data.len()));
        }
        let mut payload = [0u8; PAYLOAD_LEN];
        payload[..data.len()].copy_from_slice(data);
        Ok(Self { addr, payload })
    }

    /// Encode this block into its full 128-byte on-page image, computing the
    /// CRC16 and RS(255,223) parity.
    pub fn encode(&self) -> [u8; BLOCK_LEN] {
        let mut buf = [0u8; BLOCK_LEN];
        buf[0..4].copy_from_slice(&self.addr.to_le_bytes());
        buf[4..4 + PAYLOAD_LEN].copy_from_slice(&self.payload);

        let crc = crc16(&buf[..CRC_COVERED_LEN]) ^ CRC_XOR_MASK;
        buf[CRC_COVERED_LEN..CRC_COVERED_LEN + 2].copy_from_slice(&crc.to_le_bytes());

        let parity = rs255::encode(&buf[..ECC_COVERED_LEN]);
        buf[ECC_COVERED_LEN..BLOCK_LEN].copy_from_slice(&parity);
        buf
    }
}

/// Outcome of decoding one scanned 128-byte block image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeResult {
    /// Whether the CRC validated after ECC correction (`ok` in `spec.md` §3).
    pub ok: bool,
    pub addr: u32,
    pub payload: [u8; PAYLOAD_LEN],
    /// Number of bytes the RS step actually altered (0 if the block was clean).
    pub restored_bytes: usize,
}

/// Decode a scanned 128-byte block image, correcting errors via RS(255,223)
/// and verifying the result with CRC16.
///
/// `erasures` lists zero-based byte positions within the first 96 bytes
/// (`addr || payload || crc`) the caller already knows are unreliable (e.g.
/// dots the sampler could not confidently binarize). Never panics: a
/// thoroughly unreadable block simply reports `ok: false`.
pub fn decode(image: &[u8], erasures: &[usize]) -> Result<DecodeResult, BlockCodecError> {
    if image.len() != BLOCK_LEN {
        return Err(BlockCodecError::WrongLength(image.len()));
    }

    let mut buf = [0u8; ECC_COVERED_LEN + rs255::PARITY_LEN];
    buf.copy_from_slice(image);

    let outcome = rs255::decode(&mut buf, erasures);
    let restored_bytes = match outcome {
        DecodeOutcome::NoErrors => 0,
        DecodeOutcome::Corrected(n) => n,
        DecodeOutcome::Failure => {
            let addr = u32::from_le_bytes(image[0..4].try_into().unwrap());
            let mut payload = [0u8; PAYLOAD_LEN];
            payload.copy_from_slice(&image[4..4 + PAYLOAD_LEN]);
            return Ok(DecodeResult {
                ok: false,
                addr,
                payload,
                restored_bytes: 0,
            });
        }
    };

    let addr = u32::from_le_bytes(buf[0..4].try_into().unwrap());
    let mut payload = [0u8; PAYLOAD_LEN];
    payload.copy_from_slice(&buf[4..4 + PAYLOAD_LEN]);
    let stored_crc =
        u16::from_le_bytes(buf[CRC_COVERED_LEN..CRC_COVERED_LEN + 2].try_into().unwrap());
    let expected_crc = crc16(&buf[..CRC_COVERED_LEN]) ^ CRC_XOR_MASK;

    Ok(DecodeResult {
        ok: stored_crc == expected_crc,
        addr,
        payload,
        restored_bytes,
    })
}
