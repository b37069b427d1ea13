//! Grid lock — `spec.md` §4.8: estimate dot pitch, phase, and tilt from a
//! scanned grayscale page.
//!
//! The renderer (`render.rs`) paints a one-dot-wide inked line at every
//! cell boundary, spanning the full height/width of the data grid. That
//! line is far darker, column for column, than any individual data dot (it
//! runs the whole grid height vs. a dot's `py` rows), so a column/row
//! darkness profile has unmistakable periodic peaks at the cell pitch —
//! this is the signal this module cross-correlates against.

use crate::bitmap::GrayBitmap;
use crate::geometry::NDOT;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GridLockError {
    #[error("no periodic grid signal found along the x axis")]
    NoXPeaks,
    #[error("no periodic grid signal found along the y axis")]
    NoYPeaks,
    #[error("image too small to contain a single block cell")]
    ImageTooSmall,
}

#[derive(Debug, Clone, Copy)]
pub struct GridLock {
    pub cmean: u8,
    pub cmin: u8,
    pub cmax: u8,
    pub sharpfactor: f64,
    pub xpeak: f64,
    pub xstep: f64,
    pub xangle: f64,
    pub ypeak: f64,
    pub ystep: f64,
    pub yangle: f64,
    pub nposx: u32,
    pub nposy: u32,
}

impl GridLock {
    /// Per-axis dot pitch implied by the cell pitch (`cell = (NDOT+1)` dots).
    pub fn dot_pitch_x(&self) -> f64 {
        self.xstep / (NDOT as f64 + 1.0)
    }
    pub fn dot_pitch_y(&self) -> f64 {
        self.ystep / (NDOT as f64 + 1.0)
    }
}

fn intensity_stats(image: &GrayBitmap) -> (u8, u8, u8) {
    let mut sum: u64 = 0;
    let mut min = 255u8;
    let mut max = 0u8;
    for &p in &image.pixels {
        sum += p as u64;
        min = min.min(p);
        max = max.max(p);
    }
    let mean = (sum / image.pixels.len().max(1) as u64) as u8;
    (mean, min, max)
}

/// Darkness profile (count of pixels darker than `threshold`) along one axis.
fn darkness_profile(image: &GrayBitmap, threshold: u8, along_x: bool) -> Vec<u32> {
    let (outer, inner) = if along_x {
        (image.width, image.height)
    } else {
        (image.height, image.width)
    };
    let mut profile = vec![0u32; outer as usize];
    for o in 0..outer {
        let mut count = 0u32;
        for i in 0..inner {
            let (x, y) = if along_x { (o, i) } else { (i, o) };
            if image.get(x, y) < threshold {
                count += 1;
            }
        }
        profile[o as usize] = count;
    }
    profile
}

/// Cluster indices whose profile value exceeds `min_value` into single peak
/// centers (handles a multi-dot-wide inked line collapsing to one index).
fn peak_centers(profile: &[u32], min_value: u32) -> Vec<f64> {
    let mut peaks = Vec::new();
    let mut run_start: Option<usize> = None;
    let mut run_weight_sum = 0f64;
    let mut run_pos_sum = 0f64;

    for (i, &v) in profile.iter().enumerate() {
        if v >= min_value {
            if run_start.is_none() {
                run_start = Some(i);
                run_weight_sum = 0.0;
                run_pos_sum = 0.0;
            }
            run_weight_sum += v as f64;
            run_pos_sum += (i as f64) * (v as f64);
        } else if let Some(_) = run_start.take() {
            peaks.push(run_pos_sum / run_weight_sum);
        }
    }
    if run_start.is_some() {
        peaks.push(run_pos_sum / run_weight_sum);
    }
    peaks
}

/// Median of consecutive differences between sorted peak positions.
fn median_step(peaks: &[f64]) -> Option<f64> {
    if peaks.len() < 2 {
        return None;
    }
    let mut diffs: Vec<f64> = peaks.windows(2).map(|w| w[1] - w[0]).collect();
    diffs.sort_by(|a, b| a.partial_cmp(b).unwrap());
    Some(diffs[diffs.len() / 2])
}

/// Best-effort tilt estimate: compare the first peak's position in the top
/// third of the image against the bottom third, along the given axis.
fn estimate_tilt(image: &GrayBitmap, threshold: u8, along_x: bool, min_value_frac: f64) -> f64 {
    let total = if along_x { image.height } else { image.width };
    if total < 6 {
        return 0.0;
    }
    let band = total / 3;

    let sub = |start: u32, end: u32| -> Option<f64> {
        let outer = if along_x { image.width } else { image.height };
        let mut profile = vec![0u32; outer as usize];
        for o in 0..outer {
            let mut count = 0u32;
            for i in start..end {
                let (x, y) = if along_x { (o, i) } else { (i, o) };
                if image.get(x, y) < threshold {
                    count += 1;
                }
            }
            profile[o as usize] = count;
        }
        let max = *profile.iter().max().unwrap_or(&0);
        if max == 0 {
            return None;
        }
        peak_centers(&profile, ((max as f64) * min_value_frac) as u32)
            .into_iter()
            .next()
    };

    let top = sub(0, band);
    let bottom = sub(total - band, total);
    match (top, bottom) {
        (Some(t), Some(b)) => {
            let separation = (total - band / 2 - band / 2) as f64;
            if separation <= 0.0 {
                0.0
            } else {
                ((b - t) / separation).atan()
            }
        }
        _ => 0.0,
    }
}

/// Run grid lock once. `dpi_hint` narrows the expected pitch but is not
/// load-bearing for correctness here (the periodic-line signal is strong
/// enough to find without it); it's kept as an input because the spec names
/// it and a future tilt-aware cross-correlation pass would use it directly.
pub fn lock_grid(image: &GrayBitmap, _dpi_hint: u32, best_quality: bool) -> Result<GridLock, GridLockError> {
    if image.width < (NDOT + 2) || image.height < (NDOT + 2) {
        return Err(GridLockError::ImageTooSmall);
    }
    let (cmean, cmin, cmax) = intensity_stats(image);
    let threshold = ((cmin as u16 + cmax as u16) / 2) as u8;

    let col_profile = darkness_profile(image, threshold, true);
    let row_profile = darkness_profile(image, threshold, false);

    let col_max = *col_profile.iter().max().unwrap_or(&0);
    let row_max = *row_profile.iter().max().unwrap_or(&0);

    let mut x_peaks = peak_centers(&col_profile, (col_max as f64 * 0.6) as u32);
    let mut y_peaks = peak_centers(&row_profile, (row_max as f64 * 0.6) as u32);

    if best_quality {
        // Finer pass: lower the acceptance threshold to pick up partially
        // occluded border lines, keeping only the refinement (strictly more
        // peaks found is strictly more information for the median step).
        let finer_x = peak_centers(&col_profile, (col_max as f64 * 0.45) as u32);
        let finer_y = peak_centers(&row_profile, (row_max as f64 * 0.45) as u32);
        if finer_x.len() > x_peaks.len() {
            x_peaks = finer_x;
        }
        if finer_y.len() > y_peaks.len() {
            y_peaks = finer_y;
        }
    }

    if x_peaks.is_empty() {
        return Err(GridLockError::NoXPeaks);
    }
    if y_peaks.is_empty() {
        return Err(GridLockError::NoYPeaks);
    }

    let xstep = median_step(&x_peaks).unwrap_or(NDOT as f64 + 1.0);
    let ystep = median_step(&y_peaks).unwrap_or(NDOT as f64 + 1.0);
    let xpeak = x_peaks[0];
    let ypeak = y_peaks[0];

    let xangle = estimate_tilt(image, threshold, true, 0.6);
    let yangle = estimate_tilt(image, threshold, false, 0.6);

    let nposx = if xstep > 0.0 {
        (((image.width as f64) - xpeak) / xstep).floor().max(0.0) as u32
    } else {
        0
    };
    let nposy = if ystep > 0.0 {
        (((image.height as f64) - ypeak) / ystep).floor().max(0.0) as u32
    } else {
        0
    };

    Ok(GridLock {
        cmean,
        cmin,
        cmax,
        sharpfactor: 1.0,
        xpeak,
        xstep,
        xangle,
        ypeak,
        ystep,
        yangle,
        nposx,
        nposy,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitmap::MonoBitmap;

    fn synthetic_grid(nx: u32, ny: u32, pitch: u32) -> GrayBitmap {
        let w = nx * pitch + pitch;
        let h = ny * pitch + pitch;
        let mut bmp = MonoBitmap::new(w, h);
        for col in 0..=nx {
            bmp.fill_rect(col * pitch, 0, 1, h, true);
        }
        for row in 0..=ny {
            bmp.fill_rect(0, row * pitch, w, 1, true);
        }
        bmp.to_gray()
    }

    #[test]
    fn locks_onto_known_pitch() {
        let image = synthetic_grid(10, 8, 33);
        let lock = lock_grid(&image, 200, false).unwrap();
        assert!((lock.xstep - 33.0).abs() < 1.0);
        assert!((lock.ystep - 33.0).abs() < 1.0);
    }

    #[test]
    fn rejects_tiny_images() {
        let bmp = MonoBitmap::new(4, 4);
        assert!(matches!(
            lock_grid(&bmp.to_gray(), 200, false),
            Err(GridLockError::ImageTooSmall)
        ));
    }

    #[test]
    fn best_quality_never_reduces_peak_count() {
        let image = synthetic_grid(6, 6, 40);
        let fast = lock_grid(&image, 200, false).unwrap();
        let best = lock_grid(&image, 200, true).unwrap();
        assert!((best.xstep - fast.xstep).abs() < 2.0);
    }
}
