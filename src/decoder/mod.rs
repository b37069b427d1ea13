//! Bitmap decoder — `spec.md` §4.8-§4.9: grid lock, per-block sampling, and
//! orientation auto-detection.

pub mod gridlock;
pub mod sampler;

use crate::bitmap::GrayBitmap;
use gridlock::{lock_grid, GridLock, GridLockError};
use sampler::{count_good, sweep, BlockOutcome};
use thiserror::Error;

/// The four page orientations a scan might arrive in, clockwise from the
/// orientation the page was rendered at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Orientation {
    fn quarter_turns(self) -> u8 {
        match self {
            Orientation::Deg0 => 0,
            Orientation::Deg90 => 1,
            Orientation::Deg180 => 2,
            Orientation::Deg270 => 3,
        }
    }

    /// All four, starting from `self` — used to retry a previously-successful
    /// orientation first on the next page (`spec.md` §4.8: "the winning
    /// orientation is remembered and tried first on the next page").
    pub fn retry_order(self) -> [Orientation; 4] {
        use Orientation::*;
        let all = [Deg0, Deg90, Deg180, Deg270];
        let start = self.quarter_turns() as usize;
        [
            all[start % 4],
            all[(start + 1) % 4],
            all[(start + 2) % 4],
            all[(start + 3) % 4],
        ]
    }
}

impl Default for Orientation {
    fn default() -> Self {
        Orientation::Deg0
    }
}

#[derive(Error, Debug)]
pub enum PageDecodeError {
    #[error("grid lock failed at every tried orientation: {0}")]
    NoOrientationLocked(GridLockError),
}

/// Minimum fraction of swept positions that must decode cleanly before a
/// candidate orientation is accepted; below this the page is most likely
/// being read in the wrong rotation rather than simply damaged.
const MIN_GOOD_FRACTION: f64 = 0.05;

/// Result of decoding one scanned page image.
pub struct PageDecode {
    pub orientation: Orientation,
    pub lock: GridLock,
    pub blocks: Vec<BlockOutcome>,
}

/// Lock the grid and sweep every block position, trying `last_orientation`
/// first and then the other three rotations until one yields a plausible
/// fraction of good blocks.
pub fn decode_page(
    image: &GrayBitmap,
    dpi_hint: u32,
    best_quality: bool,
    last_orientation: Orientation,
) -> Result<PageDecode, PageDecodeError> {
    let mut last_err = None;
    for orientation in last_orientation.retry_order() {
        let rotated = image.rotated(orientation.quarter_turns());
        let lock = match lock_grid(&rotated, dpi_hint, best_quality) {
            Ok(l) => l,
            Err(e) => {
                last_err = Some(e);
                continue;
            }
        };
        let blocks = sweep(&rotated, &lock);
        let total = blocks.len().max(1);
        let good = count_good(&blocks);
        if (good as f64) / (total as f64) >= MIN_GOOD_FRACTION {
            return Ok(PageDecode {
                orientation,
                lock,
                blocks,
            });
        }
    }
    Err(PageDecodeError::NoOrientationLocked(
        last_err.unwrap_or(GridLockError::NoXPeaks),
    ))
}
