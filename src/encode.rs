//! Encode step machine — `spec.md` §5/§6.
//!
//! `EncodeState` is driven by repeatedly calling [`EncodeState::next_step`]
//! until [`EncodeState::is_finished`]; each call advances exactly one stage
//! of the pipeline named in §6: "open+stat → compress → pad → encrypt →
//! compute filecrc → initialize page layout → render page k → write bmp →
//! advance page or finish." Writing the rendered bitmap to a `.bmp` file is
//! the caller's job (`bitmap::write_bmp_gray`); this module hands back a
//! [`MonoBitmap`] per page instead of touching the filesystem itself.

use std::fs;
use std::path::Path;
use std::time::UNIX_EPOCH;

use chrono::{DateTime, Utc};

use crate::bitmap::MonoBitmap;
use crate::block::{Block, MAXSIZE, SUPERBLOCK_ADDR};
use crate::compression;
use crate::config::EncodeConfig;
use crate::crc16::crc16;
use crate::crypto;
use crate::error::StepError;
use crate::geometry::{self, PageGeometry};
use crate::recovery::{self, GroupedBlock};
use crate::render::render_page;
use crate::superblock::{Superblock, PBM_COMPRESSED, PBM_ENCRYPTED};

/// What happened during the most recent [`EncodeState::next_step`] call.
pub enum StepOutcome {
    /// The stage advanced; call `next_step` again.
    Continue,
    /// A page's bitmap is ready; the caller should write it out (e.g. via
    /// `bitmap::write_bmp_gray`) before calling `next_step` again.
    PageReady { page_number: u32, bitmap: MonoBitmap },
    /// Every page has been produced; `step` is now 0.
    Finished,
}

struct FileMeta {
    name: String,
    modified: DateTime<Utc>,
    attributes: u8,
    origsize: u32,
}

pub struct EncodeState {
    pub step: usize,
    pub error: Option<StepError>,
    config: EncodeConfig,
    input_path: std::path::PathBuf,
    meta: Option<FileMeta>,
    raw: Vec<u8>,
    compressed: Vec<u8>,
    padded: Vec<u8>,
    datasize: u32,
    filecrc: u16,
    grouped: Vec<GroupedBlock>,
    geometry: Option<PageGeometry>,
    next_block_index: usize,
    page_number: u32,
}

/// Blocks per page reserved for the superblock itself.
const SUPERBLOCK_SLOTS_PER_PAGE: usize = 1;

impl EncodeState {
    /// `spec.md` §6 `printfile`: initialize state and set `step=1`.
    pub fn printfile(input_path: impl AsRef<Path>, config: EncodeConfig) -> Self {
        Self {
            step: 1,
            error: None,
            config,
            input_path: input_path.as_ref().to_path_buf(),
            meta: None,
            raw: Vec::new(),
            compressed: Vec::new(),
            padded: Vec::new(),
            datasize: 0,
            filecrc: 0,
            grouped: Vec::new(),
            geometry: None,
            next_block_index: 0,
            page_number: 1,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.step == 0
    }

    fn fail(&mut self, err: impl Into<StepError>) -> StepOutcome {
        self.error = Some(err.into());
        self.step = 0;
        self.raw.clear();
        self.compressed.clear();
        self.padded.clear();
        self.grouped.clear();
        StepOutcome::Continue
    }

    /// `spec.md` §6 `next_print_step`: advance exactly one stage.
    pub fn next_step(&mut self) -> StepOutcome {
        match self.step {
            0 => StepOutcome::Finished,
            1 => self.step_open_stat(),
            2 => self.step_compress(),
            3 => self.step_pad(),
            4 => self.step_encrypt(),
            5 => self.step_compute_filecrc(),
            6 => self.step_init_layout(),
            7 => self.step_render_page(),
            _ => unreachable!("encode step machine has no stage {}", self.step),
        }
    }

    fn step_open_stat(&mut self) -> StepOutcome {
        if let Err(e) = self.config.validate() {
            return self.fail(e);
        }
        let data = match fs::read(&self.input_path) {
            Ok(d) => d,
            Err(e) => return self.fail(e),
        };
        if data.len() as u64 > MAXSIZE as u64 {
            return self.fail(StepError::FileTooLarge(data.len() as u64));
        }
        let metadata = match fs::metadata(&self.input_path) {
            Ok(m) => m,
            Err(e) => return self.fail(e),
        };
        let modified = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| DateTime::<Utc>::from_timestamp_millis(d.as_millis() as i64).unwrap_or_else(Utc::now))
            .unwrap_or_else(Utc::now);
        let name = self
            .input_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        self.meta = Some(FileMeta {
            name,
            modified,
            attributes: readonly_attribute_bit(&metadata),
            origsize: data.len() as u32,
        });
        self.raw = data;
        self.step = 2;
        StepOutcome::Continue
    }

    fn step_compress(&mut self) -> StepOutcome {
        match compression::compress(&self.raw, self.config.compression) {
            Ok(c) => {
                self.compressed = c;
                self.step = 3;
                StepOutcome::Continue
            }
            Err(e) => self.fail(e),
        }
    }

    fn step_pad(&mut self) -> StepOutcome {
        let mut taken = std::mem::take(&mut self.compressed);
        // `spec.md` §8: a zero-byte input still prints one data block of
        // zeros, so `split_payloads` downstream always has at least one
        // payload to lay out rather than producing a superblock-only page.
        if taken.is_empty() {
            taken.resize(crate::block::PAYLOAD_LEN, 0);
        }
        self.padded = compression::pad_to_block(taken);
        self.datasize = self.padded.len() as u32;
        self.step = 4;
        StepOutcome::Continue
    }

    fn step_encrypt(&mut self) -> StepOutcome {
        if self.config.encryption {
            let password = self.config.password.as_deref().unwrap_or("");
            let key = match crypto::derive_key(password) {
                Ok(k) => k,
                Err(e) => return self.fail(e),
            };
            let iv = match crypto::derive_iv(password) {
                Ok(i) => i,
                Err(e) => return self.fail(e),
            };
            match crypto::encrypt(&key, &iv, &self.padded) {
                Ok(c) => self.padded = c,
                Err(e) => return self.fail(e),
            }
        }
        self.step = 5;
        StepOutcome::Continue
    }

    fn step_compute_filecrc(&mut self) -> StepOutcome {
        self.filecrc = crc16(&self.padded);
        self.step = 6;
        StepOutcome::Continue
    }

    fn step_init_layout(&mut self) -> StepOutcome {
        let payloads = recovery::split_payloads(&self.padded);
        self.grouped = recovery::interleave(&payloads, self.config.redundancy);

        let (page_width_px, page_height_px) = geometry::letter_page_size_px();
        let geometry = match geometry::compute_geometry(
            self.config.dpi,
            self.config.dotpercent,
            page_width_px,
            page_height_px,
            self.config.printheader,
            self.config.printborder,
        ) {
            Ok(g) => g,
            Err(e) => return self.fail(e),
        };
        self.geometry = Some(geometry);
        self.next_block_index = 0;
        self.page_number = 1;
        self.step = 7;
        StepOutcome::Continue
    }

    fn step_render_page(&mut self) -> StepOutcome {
        let geometry = *self.geometry.as_ref().expect("layout initialized before render");
        let capacity = (geometry.nx as usize) * (geometry.ny as usize);
        let data_capacity = capacity.saturating_sub(SUPERBLOCK_SLOTS_PER_PAGE);

        let remaining = &self.grouped[self.next_block_index..];
        let take = take_whole_groups(remaining, data_capacity);
        let page_blocks = &remaining[..take];

        let pagesize: u32 = page_blocks
            .iter()
            .filter(|b| matches!(b, GroupedBlock::Data(_)))
            .count() as u32
            * crate::block::PAYLOAD_LEN as u32;

        let meta = self.meta.as_ref().expect("metadata set before render");
        let mut mode = 0u8;
        if self.config.compression != crate::compression::CompressionLevel::None {
            mode |= PBM_COMPRESSED;
        }
        if self.config.encryption {
            mode |= PBM_ENCRYPTED;
        }
        let superblock = Superblock {
            datasize: self.datasize,
            pagesize,
            origsize: meta.origsize,
            mode,
            attributes: meta.attributes,
            page: self.page_number as u16,
            modified: meta.modified,
            filecrc: self.filecrc,
            name: meta.name.clone(),
        };

        let mut images = Vec::with_capacity(take + 1);
        images.push(match superblock.to_block() {
            Ok(b) => b.encode(),
            Err(e) => return self.fail(std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())),
        });
        let page_blocks_raw: Vec<Block> = page_blocks
            .iter()
            .map(|grouped| match grouped {
                GroupedBlock::Data(d) => Block::new(d.addr, d.bytes),
                GroupedBlock::Recovery { addr, bytes } => Block::new(*addr, *bytes),
            })
            .collect();
        images.extend(crate::perf::encode_blocks_parallel(&page_blocks_raw));
        debug_assert_eq!(
            images.iter().filter(|i| u32::from_le_bytes(i[0..4].try_into().unwrap()) == SUPERBLOCK_ADDR).count(),
            1
        );

        let bitmap = render_page(&geometry, &images);
        self.next_block_index += take;
        let page_number = self.page_number;
        self.page_number += 1;

        if self.next_block_index >= self.grouped.len() {
            self.step = 0;
        }
        StepOutcome::PageReady { page_number, bitmap }
    }
}

/// How many leading blocks of `remaining` to place on this page, rounded to
/// whole redundancy groups (`recovery::interleave` always terminates a group
/// with exactly one `Recovery` block) so a page boundary never splits a
/// group mid-way. `decode.rs` resets its own group-position counter once per
/// page, which only stays correct if groups never straddle that reset.
/// Always takes at least one full group, even if it overflows
/// `data_capacity`, so a pathologically small page still makes progress.
fn take_whole_groups(remaining: &[GroupedBlock], data_capacity: usize) -> usize {
    let mut take = 0usize;
    let mut group_start = 0usize;
    for (i, block) in remaining.iter().enumerate() {
        if matches!(block, GroupedBlock::Recovery { .. }) {
            let group_len = i - group_start + 1;
            if take > 0 && take + group_len > data_capacity {
                break;
            }
            take += group_len;
            group_start = i + 1;
        }
    }
    take
}

#[cfg(unix)]
fn readonly_attribute_bit(metadata: &fs::Metadata) -> u8 {
    use std::os::unix::fs::PermissionsExt;
    if metadata.permissions().mode() & 0o200 == 0 {
        1
    } else {
        0
    }
}

#[cfg(not(unix))]
fn readonly_attribute_bit(metadata: &fs::Metadata) -> u8 {
    if metadata.permissions().readonly() {
        1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn run_to_completion(state: &mut EncodeState) -> Vec<MonoBitmap> {
        let mut pages = Vec::new();
        loop {
            match state.next_step() {
                StepOutcome::Continue => {}
                StepOutcome::PageReady { bitmap, .. } => pages.push(bitmap),
                StepOutcome::Finished => break,
            }
            if state.is_finished() && pages.is_empty() {
                // error path: step went to 0 without ever producing a page
                break;
            }
        }
        pages
    }

    #[test]
    fn encodes_small_file_into_one_page() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"HELLO\n").unwrap();

        let mut config = EncodeConfig::default();
        config.compression = crate::compression::CompressionLevel::None;
        config.redundancy = 5;
        let mut state = EncodeState::printfile(file.path(), config);

        let pages = run_to_completion(&mut state);
        assert!(state.error.is_none());
        assert_eq!(pages.len(), 1);
    }

    #[test]
    fn rejects_invalid_config_without_panicking() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"x").unwrap();
        let mut config = EncodeConfig::default();
        config.dpi = 1000;
        let mut state = EncodeState::printfile(file.path(), config);
        let _ = run_to_completion(&mut state);
        assert!(state.error.is_some());
        assert_eq!(state.step, 0);
    }

    #[test]
    fn empty_file_still_produces_one_data_block() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"").unwrap();

        let mut config = EncodeConfig::default();
        config.compression = crate::compression::CompressionLevel::None;
        let mut state = EncodeState::printfile(file.path(), config);

        let pages = run_to_completion(&mut state);
        assert!(state.error.is_none());
        assert_eq!(pages.len(), 1);
        assert!(state.datasize > 0);
        assert!(state.grouped.iter().any(|g| matches!(g, GroupedBlock::Data(_))));
    }

    #[test]
    fn take_whole_groups_never_splits_a_group() {
        let payloads: Vec<recovery::DataPayload> = (0..20u32)
            .map(|i| recovery::DataPayload {
                addr: i * crate::block::PAYLOAD_LEN as u32,
                bytes: [i as u8; crate::block::PAYLOAD_LEN],
            })
            .collect();
        let grouped = recovery::interleave(&payloads, 3);

        // Each group is 3 data + 1 recovery = 4 blocks; a capacity that isn't
        // a multiple of 4 must still only ever take whole groups.
        let mut offset = 0usize;
        while offset < grouped.len() {
            let take = take_whole_groups(&grouped[offset..], 5);
            assert!(take > 0, "must always make progress");
            let page = &grouped[offset..offset + take];
            // last block of every non-empty page must be a recovery block
            assert!(matches!(page.last().unwrap(), GroupedBlock::Recovery { .. }));
            offset += take;
        }
    }
}
