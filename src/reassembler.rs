//! File reassembler — `spec.md` §4.10.
//!
//! Tracks up to [`NFILE`] files concurrently in flight. Each arriving
//! superblock opens or resumes a slot by `name`; each arriving data or
//! recovery block is folded into that slot's redundancy groups; at the end
//! of a page, any group with exactly one missing member is reconstructed by
//! XOR. A file is complete once every payload slot is valid, at which point
//! it is decrypted, integrity-checked, decompressed, and handed back to the
//! caller to write out.

use std::collections::HashMap;

use crate::block::{DecodeResult, PAYLOAD_LEN};
use crate::compression::{self, CompressionLevel};
use crate::crypto::{self, CryptoError};
use crate::recovery::GroupState;
use crate::superblock::{Superblock, PBM_COMPRESSED, PBM_ENCRYPTED};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Maximum number of files the reassembler tracks concurrently.
pub const NFILE: usize = 5;

#[derive(Error, Debug)]
pub enum ReassemblyError {
    #[error("no free file slot (all {NFILE} are in use)")]
    SlotExhausted,
    #[error("slot {0} does not hold an in-progress file")]
    UnknownSlot(usize),
    #[error("whole-file integrity check failed: wrong password or corrupted stream")]
    IntegrityMismatch,
    #[error("file is not yet complete: {0} of {1} payload slots still missing")]
    NotComplete(usize, usize),
    #[error("decryption failed: {0}")]
    Crypto(#[from] CryptoError),
    #[error("decompression failed: {0}")]
    Decompression(#[from] compression::CompressionError),
}

/// Which side of a redundancy group a decoded block belongs to, determined
/// by its position in the page's scan order (`spec.md` §4.5: "every
/// `(ngroup+1)`-th block in scan order is recovery").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Data,
    Recovery,
}

/// Classify a block by its zero-based position in the page's render/scan
/// order, given the page's `ngroup`.
pub fn kind_for_scan_index(scan_index: usize, ngroup: u32) -> BlockKind {
    let period = (ngroup + 1) as usize;
    if (scan_index + 1) % period == 0 {
        BlockKind::Recovery
    } else {
        BlockKind::Data
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FileStats {
    pub goodblocks: u32,
    pub badblocks: u32,
    pub restoredbytes: u32,
    pub recoveredblocks: u32,
}

/// A file's reconstructed contents and metadata, ready to be written out.
#[derive(Debug, Clone)]
pub struct RestoredFile {
    pub name: String,
    pub modified: DateTime<Utc>,
    pub attributes: u8,
    pub bytes: Vec<u8>,
}

struct FileSlot {
    name: String,
    modified: DateTime<Utc>,
    attributes: u8,
    origsize: u32,
    datasize: u32,
    mode: u8,
    filecrc: u16,
    page: u16,
    ngroup: u32,
    data: Vec<u8>,
    datavalid: Vec<bool>,
    groups: Vec<GroupState>,
    /// `(min_addr, max_addr)` of data-block addresses seen while processing
    /// each page, used to report which pages still carry missing payloads.
    page_addr_ranges: HashMap<u16, (u32, u32)>,
    stats: FileStats,
}

impl FileSlot {
    fn new(sb: &Superblock, ngroup: u32) -> Self {
        let npayloads = sb.datasize.div_ceil(PAYLOAD_LEN as u32) as usize;
        let ngroups = npayloads.div_ceil(ngroup as usize).max(1);
        let groups = (0..ngroups)
            .map(|g| {
                let remaining = npayloads - g * ngroup as usize;
                GroupState::new(remaining.min(ngroup as usize))
            })
            .collect();
        Self {
            name: sb.name.clone(),
            modified: sb.modified,
            attributes: sb.attributes,
            origsize: sb.origsize,
            datasize: sb.datasize,
            mode: sb.mode,
            filecrc: sb.filecrc,
            page: sb.page,
            ngroup,
            data: vec![0u8; sb.datasize as usize],
            datavalid: vec![false; npayloads],
            groups,
            page_addr_ranges: HashMap::new(),
            stats: FileStats::default(),
        }
    }

    fn payload_index(&self, addr: u32) -> usize {
        (addr / PAYLOAD_LEN as u32) as usize
    }

    fn group_index(&self, addr: u32) -> usize {
        self.payload_index(addr) / self.ngroup as usize
    }

    fn position_in_group(&self, addr: u32) -> usize {
        self.payload_index(addr) % self.ngroup as usize
    }

    fn write_payload(&mut self, payload_index: usize, bytes: &[u8; PAYLOAD_LEN]) {
        let start = payload_index * PAYLOAD_LEN;
        let end = (start + PAYLOAD_LEN).min(self.data.len());
        if start < self.data.len() {
            self.data[start..end].copy_from_slice(&bytes[..end - start]);
        }
        self.datavalid[payload_index] = true;
    }

    fn is_complete(&self) -> bool {
        self.datavalid.iter().all(|&v| v)
    }

    fn missing_count(&self) -> usize {
        self.datavalid.iter().filter(|&&v| !v).count()
    }

    fn rempages(&self) -> Vec<u32> {
        let missing_addrs: Vec<u32> = self
            .datavalid
            .iter()
            .enumerate()
            .filter(|(_, &valid)| !valid)
            .map(|(i, _)| (i * PAYLOAD_LEN) as u32)
            .collect();
        if missing_addrs.is_empty() {
            return Vec::new();
        }
        let mut pages: Vec<u32> = self
            .page_addr_ranges
            .iter()
            .filter(|(_, (min, max))| missing_addrs.iter().any(|a| a >= min && a <= max))
            .map(|(page, _)| *page as u32)
            .collect();
        pages.sort_unstable();
        pages
    }
}

/// Tracks up to [`NFILE`] files concurrently being reassembled from a stream
/// of decoded blocks.
pub struct Reassembler {
    slots: Vec<Option<FileSlot>>,
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new()
    }
}

impl Reassembler {
    pub fn new() -> Self {
        Self {
            slots: (0..NFILE).map(|_| None).collect(),
        }
    }

    /// Open or resume a slot for the file named by `superblock`. `ngroup`
    /// must be supplied by the caller (inferred from how many blocks fall
    /// between consecutive recovery blocks on this page, per `spec.md`
    /// §4.5) since it is not itself part of the on-page payload.
    pub fn start_next_page(&mut self, superblock: &Superblock, ngroup: u32) -> Result<usize, ReassemblyError> {
        if let Some(idx) = self
            .slots
            .iter()
            .position(|s| s.as_ref().is_some_and(|f| f.name == superblock.name))
        {
            self.slots[idx].as_mut().unwrap().page = superblock.page;
            return Ok(idx);
        }
        let free = self.slots.iter().position(|s| s.is_none());
        match free {
            Some(idx) => {
                self.slots[idx] = Some(FileSlot::new(superblock, ngroup));
                Ok(idx)
            }
            None => Err(ReassemblyError::SlotExhausted),
        }
    }

    fn slot_mut(&mut self, slot: usize) -> Result<&mut FileSlot, ReassemblyError> {
        self.slots
            .get_mut(slot)
            .and_then(|s| s.as_mut())
            .ok_or(ReassemblyError::UnknownSlot(slot))
    }

    /// Fold one successfully-ECC-decoded block into `slot`'s groups.
    /// Blocks that failed CRC validation should be reported via
    /// [`Reassembler::note_bad_block`] instead.
    pub fn add_block(&mut self, slot: usize, scan_index: usize, result: &DecodeResult) -> Result<(), ReassemblyError> {
        let file = self.slot_mut(slot)?;
        let ngroup = file.ngroup;
        let kind = kind_for_scan_index(scan_index, ngroup);
        let group_idx = file.group_index(result.addr).min(file.groups.len() - 1);

        match kind {
            BlockKind::Data => {
                let payload_idx = file.payload_index(result.addr);
                let position = file.position_in_group(result.addr);
                if position < file.groups[group_idx].data.len() {
                    file.groups[group_idx].data[position] = Some(result.payload);
                }
                file.write_payload(payload_idx, &result.payload);

                let page = file.page;
                let entry = file.page_addr_ranges.entry(page).or_insert((result.addr, result.addr));
                entry.0 = entry.0.min(result.addr);
                entry.1 = entry.1.max(result.addr);
            }
            BlockKind::Recovery => {
                file.groups[group_idx].recovery = Some(result.payload);
            }
        }
        file.stats.goodblocks += 1;
        file.stats.restoredbytes += result.restored_bytes as u32;
        Ok(())
    }

    /// Record a block that failed ECC/CRC decoding entirely.
    pub fn note_bad_block(&mut self, slot: usize) -> Result<(), ReassemblyError> {
        self.slot_mut(slot)?.stats.badblocks += 1;
        Ok(())
    }

    /// End-of-page reconciliation: reconstruct any group with exactly one
    /// missing member via XOR.
    pub fn finish_page(&mut self, slot: usize) -> Result<FileStats, ReassemblyError> {
        let file = self.slot_mut(slot)?;
        for group_idx in 0..file.groups.len() {
            if let Some(missing_pos) = file.groups[group_idx].try_reconstruct() {
                let payload = file.groups[group_idx].data[missing_pos].unwrap();
                let payload_idx = group_idx * file.ngroup as usize + missing_pos;
                if payload_idx < file.datavalid.len() {
                    file.write_payload(payload_idx, &payload);
                    file.stats.recoveredblocks += 1;
                }
            }
        }
        Ok(file.stats)
    }

    pub fn rempages(&self, slot: usize) -> Vec<u32> {
        self.slots
            .get(slot)
            .and_then(|s| s.as_ref())
            .map(|f| f.rempages())
            .unwrap_or_default()
    }

    pub fn is_complete(&self, slot: usize) -> bool {
        self.slots
            .get(slot)
            .and_then(|s| s.as_ref())
            .is_some_and(|f| f.is_complete())
    }

    /// Finalize a completed file: decrypt (if `mode & PBM_ENCRYPTED`), verify
    /// `filecrc`, decompress (if `mode & PBM_COMPRESSED`) to `origsize`, and
    /// free the slot. `password` is only consulted when the encryption bit
    /// is set.
    pub fn save_restored_file(&mut self, slot: usize, password: Option<&str>) -> Result<RestoredFile, ReassemblyError> {
        {
            let file = self.slot_mut(slot)?;
            if !file.is_complete() {
                return Err(ReassemblyError::NotComplete(file.missing_count(), file.datavalid.len()));
            }
        }

        let mut file = self.slots[slot].take().ok_or(ReassemblyError::UnknownSlot(slot))?;
        let original = file.data.clone();

        let mut padded = file.data.clone();
        if file.mode & PBM_ENCRYPTED != 0 {
            let password = password.unwrap_or("");
            let key = crypto::derive_key(password)?;
            let iv = crypto::derive_iv(password)?;
            padded = crypto::decrypt(&key, &iv, &padded)?;
        }

        if crate::crc16::crc16(&padded) != file.filecrc {
            // Retain the slot so the caller can supply another scan
            // (`spec.md` §4.10: "slot retained so user can supply another
            // scan"), keeping the original (still-encrypted) bytes rather
            // than the failed decrypt attempt.
            file.data = original;
            self.slots[slot] = Some(file);
            return Err(ReassemblyError::IntegrityMismatch);
        }

        let bytes = if file.mode & PBM_COMPRESSED != 0 {
            let level = CompressionLevel::Max; // level only affects the encoder; decode is level-agnostic
            let mut decompressed = compression::decompress(&padded, level)?;
            decompressed.truncate(file.origsize as usize);
            decompressed
        } else {
            padded.truncate(file.origsize as usize);
            padded
        };

        Ok(RestoredFile {
            name: file.name,
            modified: file.modified,
            attributes: file.attributes,
            bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::SUPERBLOCK_ADDR;
    use chrono::Utc;

    fn sample_superblock(datasize: u32) -> Superblock {
        Superblock {
            datasize,
            pagesize: datasize,
            origsize: datasize,
            mode: 0,
            attributes: 0,
            page: 1,
            modified: Utc::now(),
            filecrc: 0,
            name: "test.bin".to_string(),
        }
    }

    fn make_result(addr: u32, payload: [u8; PAYLOAD_LEN]) -> DecodeResult {
        DecodeResult {
            ok: true,
            addr,
            payload,
            restored_bytes: 0,
        }
    }

    #[test]
    fn single_block_file_completes_without_redundancy_loss() {
        let mut reassembler = Reassembler::new();
        let payload = {
            let mut p = [0u8; PAYLOAD_LEN];
            p[..6].copy_from_slice(b"HELLO\n");
            p
        };
        let mut sb = sample_superblock(PAYLOAD_LEN as u32);
        sb.filecrc = crate::crc16::crc16(&payload);
        let slot = reassembler.start_next_page(&sb, 5).unwrap();

        reassembler.add_block(slot, 0, &make_result(0, payload)).unwrap();
        reassembler.finish_page(slot).unwrap();

        assert!(reassembler.is_complete(slot));
        let restored = reassembler.save_restored_file(slot, None).unwrap();
        assert_eq!(&restored.bytes[..6], b"HELLO\n");
    }

    #[test]
    fn recovers_missing_payload_via_group_xor() {
        let mut reassembler = Reassembler::new();
        let ngroup = 3u32;
        let datasize = PAYLOAD_LEN as u32 * ngroup;
        let sb = sample_superblock(datasize);
        let slot = reassembler.start_next_page(&sb, ngroup).unwrap();

        let payloads: Vec<[u8; PAYLOAD_LEN]> = (0..ngroup).map(|i| [i as u8 + 1; PAYLOAD_LEN]).collect();
        let mut recovery = [0u8; PAYLOAD_LEN];
        for p in &payloads {
            for (r, b) in recovery.iter_mut().zip(p.iter()) {
                *r ^= b;
            }
        }

        // scan order: data, data, [missing data], recovery (period = ngroup+1 = 4)
        reassembler.add_block(slot, 0, &make_result(0, payloads[0])).unwrap();
        reassembler.add_block(slot, 1, &make_result(PAYLOAD_LEN as u32, payloads[1])).unwrap();
        reassembler
            .add_block(slot, 3, &make_result(0, recovery))
            .unwrap();
        reassembler.finish_page(slot).unwrap();

        assert!(reassembler.is_complete(slot));
    }

    #[test]
    fn slot_exhaustion_is_reported() {
        let mut reassembler = Reassembler::new();
        for i in 0..NFILE {
            let mut sb = sample_superblock(PAYLOAD_LEN as u32);
            sb.name = format!("file-{i}.bin");
            reassembler.start_next_page(&sb, 5).unwrap();
        }
        let mut overflow = sample_superblock(PAYLOAD_LEN as u32);
        overflow.name = "one-too-many.bin".to_string();
        assert!(matches!(
            reassembler.start_next_page(&overflow, 5),
            Err(ReassemblyError::SlotExhausted)
        ));
    }

    #[test]
    fn wrong_password_reports_integrity_mismatch_and_retains_slot() {
        let mut reassembler = Reassembler::new();
        let mut sb = sample_superblock(16); // must be a multiple of 16 for CBC
        sb.mode = PBM_ENCRYPTED;
        sb.filecrc = 0xDEAD; // won't match after "decryption" with wrong key
        let slot = reassembler.start_next_page(&sb, 5).unwrap();
        reassembler
            .add_block(slot, 0, &make_result(0, [0u8; PAYLOAD_LEN]))
            .unwrap();

        let result = reassembler.save_restored_file(slot, Some("wrong password"));
        assert!(matches!(result, Err(ReassemblyError::IntegrityMismatch)));
        assert!(reassembler.slots[slot].is_some());
    }

    #[test]
    fn kind_for_scan_index_places_recovery_every_ngroup_plus_one() {
        assert_eq!(kind_for_scan_index(0, 5), BlockKind::Data);
        assert_eq!(kind_for_scan_index(4, 5), BlockKind::Data);
        assert_eq!(kind_for_scan_index(5, 5), BlockKind::Recovery);
        assert_eq!(kind_for_scan_index(11, 5), BlockKind::Recovery);
    }
}
