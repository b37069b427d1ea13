//! The superblock — the file-header variant of a [`crate::block::Block`].
//!
//! Every encoded file begins with one superblock, addressed at
//! [`crate::block::SUPERBLOCK_ADDR`]. Its payload packs into the same
//! 90-byte envelope ordinary data blocks use, so it rides through the same
//! CRC16 + RS(255,223) machinery with no special casing in `block.rs`.
//!
//! # Payload layout (90 bytes, little-endian)
//!
//! ```text
//! Offset  Size  Field
//!    0      4   datasize      compressed (+ encrypted) size, bytes
//!    4      4   pagesize      bytes of `datasize` carried on this page
//!    8      4   origsize      original uncompressed file size, bytes
//!   12      1   mode          PBM_COMPRESSED | PBM_ENCRYPTED
//!   13      1   attributes    basic file attributes (platform-defined bits)
//!   14      2   page          1-based page number
//!   16      8   modified      milliseconds since the Unix epoch
//!   24      2   filecrc       crc16 of the compressed+encrypted stream
//!   26     64   name          file name, NUL-padded, UTF-8
//! ```
//!
//! `ngroup` (the redundancy grouping in effect for this file) is not part of
//! the on-page payload — it is derived by the reassembler from how many
//! blocks land between consecutive recovery blocks (see `recovery.rs`).

use crate::block::{Block, PAYLOAD_LEN, SUPERBLOCK_ADDR};
use chrono::{DateTime, TimeZone, Utc};
use thiserror::Error;

/// File is compressed.
pub const PBM_COMPRESSED: u8 = 0x01;
/// File is encrypted.
pub const PBM_ENCRYPTED: u8 = 0x02;

/// Fixed width of the `name` field, bytes.
pub const NAME_LEN: usize = 64;

const OFF_DATASIZE: usize = 0;
const OFF_PAGESIZE: usize = 4;
const OFF_ORIGSIZE: usize = 8;
const OFF_MODE: usize = 12;
const OFF_ATTRIBUTES: usize = 13;
const OFF_PAGE: usize = 14;
const OFF_MODIFIED: usize = 16;
const OFF_FILECRC: usize = 24;
const OFF_NAME: usize = 26;
const PAYLOAD_USED: usize = OFF_NAME + NAME_LEN; // 90, must equal PAYLOAD_LEN

#[derive(Error, Debug)]
pub enum SuperblockError {
    #[error("block address {0:#010x} is not the superblock address")]
    NotASuperblock(u32),
    #[error("file name is {0} bytes, exceeds the {NAME_LEN}-byte field")]
    NameTooLong(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Superblock {
    pub datasize: u32,
    pub pagesize: u32,
    pub origsize: u32,
    pub mode: u8,
    pub attributes: u8,
    pub page: u16,
    pub modified: DateTime<Utc>,
    pub filecrc: u16,
    pub name: String,
}

impl Superblock {
    pub fn is_compressed(&self) -> bool {
        self.mode & PBM_COMPRESSED != 0
    }

    pub fn is_encrypted(&self) -> bool {
        self.mode & PBM_ENCRYPTED != 0
    }

    /// Pack into a [`Block`] at [`SUPERBLOCK_ADDR`], ready for `block::encode`.
    pub fn to_block(&self) -> Result<Block, SuperblockError> {
        let name_bytes = self.name.as_bytes();
        if name_bytes.len() > NAME_LEN {
            return Err(SuperblockError::NameTooLong(name_bytes.len()));
        }

        let mut payload = [0u8; PAYLOAD_LEN];
        payload[OFF_DATASIZE..OFF_DATASIZE + 4].copy_from_slice(&self.datasize.to_le_bytes());
        payload[OFF_PAGESIZE..OFF_PAGESIZE + 4].copy_from_slice(&self.pagesize.to_le_bytes());
        payload[OFF_ORIGSIZE..OFF_ORIGSIZE + 4].copy_from_slice(&self.origsize.to_le_bytes());
        payload[OFF_MODE] = self.mode;
        payload[OFF_ATTRIBUTES] = self.attributes;
        payload[OFF_PAGE..OFF_PAGE + 2].copy_from_slice(&self.page.to_le_bytes());
        payload[OFF_MODIFIED..OFF_MODIFIED + 8]
            .copy_from_slice(&self.modified.timestamp_millis().to_le_bytes());
        payload[OFF_FILECRC..OFF_FILECRC + 2].copy_from_slice(&self.filecrc.to_le_bytes());
        payload[OFF_NAME..OFF_NAME + name_bytes.len()].copy_from_slice(name_bytes);

        Ok(Block::new(SUPERBLOCK_ADDR, payload))
    }

    /// Unpack from a decoded [`Block`] (typically `block::decode`'s `payload`
    /// once `addr == SUPERBLOCK_ADDR` and `ok` was true).
    pub fn from_block(addr: u32, payload: &[u8; PAYLOAD_LEN]) -> Result<Self, SuperblockError> {
        if addr != SUPERBLOCK_ADDR {
            return Err(SuperblockError::NotASuperblock(addr));
        }

        let datasize = u32::from_le_bytes(payload[OFF_DATASIZE..OFF_DATASIZE + 4].try_into().unwrap());
        let pagesize = u32::from_le_bytes(payload[OFF_PAGESIZE..OFF_PAGESIZE + 4].try_into().unwrap());
        let origsize = u32::from_le_bytes(payload[OFF_ORIGSIZE..OFF_ORIGSIZE + 4].try_into().unwrap());
        let mode = payload[OFF_MODE];
        let attributes = payload[OFF_ATTRIBUTES];
        let page = u16::from_le_bytes(payload[OFF_PAGE..OFF_PAGE + 2].try_into().unwrap());
        let millis = i64::from_le_bytes(payload[OFF_MODIFIED..OFF_MODIFIED + 8].try_into().unwrap());
        let modified = Utc.timestamp_millis_opt(millis).single().unwrap_or_else(Utc::now);
        let filecrc = u16::from_le_bytes(payload[OFF_FILECRC..OFF_FILECRC + 2].try_into().unwrap());

        let name_raw = &payload[OFF_NAME..OFF_NAME + NAME_LEN];
        let nul_at = name_raw.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
        let name = String::from_utf8_lossy(&name_raw[..nul_at]).into_owned();

        let _ = PAYLOAD_USED;
        Ok(Self {
            datasize,
            pagesize,
            origsize,
            mode,
            attributes,
            page,
            modified,
            filecrc,
            name,
        })
    }
}
