//! Page raster renderer — `spec.md` §4.7.
//!
//! Consumes one page's already-encoded 128-byte block images in scan order
//! (left-to-right, top-to-bottom — data and recovery blocks interleaved
//! exactly as `recovery::interleave` produced them) and a [`PageGeometry`],
//! and produces a bilevel [`MonoBitmap`].
//!
//! # Bit order within a block image
//! Bytes advance along x first, then wrap to the next dot row: 32 dot
//! columns per row need exactly 4 bytes (`32 / 8`), so 32 rows × 4 bytes =
//! 128 bytes = 1024 bits = `NDOT × NDOT`. Within a byte, bit 0 (LSB) is the
//! leftmost dot.
//!
//! # Cell borders
//! `PageGeometry::cell_pitch` reserves exactly one extra dot beyond the
//! `NDOT × NDOT` data area; this renderer spends that dot on an inked grid
//! line shared between adjacent cells, giving the decoder's grid-lock pass
//! (`decoder::gridlock`) a strong periodic signal to cross-correlate
//! against.

use crate::bitmap::MonoBitmap;
use crate::block::BLOCK_LEN;
use crate::geometry::{PageGeometry, NDOT};

const BYTES_PER_ROW: usize = (NDOT as usize) / 8;

/// Render one page. `blocks` holds up to `geometry.nx * geometry.ny`
/// pre-encoded 128-byte block images; positions beyond `blocks.len()` are
/// left as blank cells (this only happens on a page's final, partially
/// filled grid).
pub fn render_page(geometry: &PageGeometry, blocks: &[[u8; BLOCK_LEN]]) -> MonoBitmap {
    let mut bitmap = MonoBitmap::new(geometry.width, geometry.height);
    let (origin_x, origin_y) = geometry.grid_origin();
    let cell_pitch = geometry.cell_pitch();

    draw_cell_borders(&mut bitmap, geometry, origin_x, origin_y, cell_pitch);

    for (idx, image) in blocks.iter().enumerate() {
        let col = (idx as u32) % geometry.nx;
        let row = (idx as u32) / geometry.nx;
        if row >= geometry.ny {
            break; // more blocks than this page's grid holds: caller's bug, don't panic
        }
        let cell_x = origin_x + col * cell_pitch + geometry.dx;
        let cell_y = origin_y + row * cell_pitch + geometry.dy;
        draw_block(&mut bitmap, geometry, cell_x, cell_y, image);
    }

    if geometry.border > 0 {
        draw_page_border(&mut bitmap, geometry);
    }

    bitmap
}

fn draw_cell_borders(
    bitmap: &mut MonoBitmap,
    geometry: &PageGeometry,
    origin_x: u32,
    origin_y: u32,
    cell_pitch: u32,
) {
    let grid_w = geometry.nx * cell_pitch + geometry.dx;
    let grid_h = geometry.ny * cell_pitch + geometry.dy;

    for col in 0..=geometry.nx {
        let x = origin_x + col * cell_pitch;
        bitmap.fill_rect(x, origin_y, geometry.dx, grid_h, true);
    }
    for row in 0..=geometry.ny {
        let y = origin_y + row * cell_pitch;
        bitmap.fill_rect(origin_x, y, grid_w, geometry.dy, true);
    }
}

fn draw_block(bitmap: &mut MonoBitmap, geometry: &PageGeometry, cell_x: u32, cell_y: u32, image: &[u8; BLOCK_LEN]) {
    for row in 0..NDOT {
        let row_bytes = &image[(row as usize) * BYTES_PER_ROW..(row as usize) * BYTES_PER_ROW + BYTES_PER_ROW];
        for col in 0..NDOT {
            let byte = row_bytes[(col / 8) as usize];
            let bit = (byte >> (col % 8)) & 1;
            if bit != 0 {
                let x = cell_x + col * geometry.dx;
                let y = cell_y + row * geometry.dy;
                bitmap.fill_rect(x, y, geometry.px, geometry.py, true);
            }
        }
    }
}

fn draw_page_border(bitmap: &mut MonoBitmap, geometry: &PageGeometry) {
    let b = geometry.border;
    bitmap.fill_rect(0, 0, geometry.width, b, true);
    bitmap.fill_rect(0, geometry.height.saturating_sub(b), geometry.width, b, true);
    bitmap.fill_rect(0, 0, b, geometry.height, true);
    bitmap.fill_rect(geometry.width.saturating_sub(b), 0, b, geometry.height, true);
}
