//! Page geometry — `spec.md` §4.6: derive dot pitch, dot size, and grid
//! dimensions from DPI, dot-size percent, margins, and header/border flags.
//!
//! # Rendering resolution
//! The original tool rendered directly to a physical printer device context
//! at the printer's native resolution (`pb_resx`/`pb_resy`), which is
//! typically much finer than the "data dpi" (`pb_dpi`) the user picks for
//! the dot grid — that's what gives a dot its printed footprint at
//! `dotpercent < 100`: a gap of un-inked pixels around a smaller-than-pitch
//! dot. This crate has no printer device of its own (printer interaction is
//! explicitly out of scope, `spec.md` §1), so it fixes a single, generous
//! rendering oversampling constant, [`RENDER_DPI`], in its place. This keeps
//! `dotpercent` meaningful (it reserves a visible un-inked margin around
//! each dot) without requiring a real device context.
use thiserror::Error;

/// Fixed bitmap rendering resolution, dots per inch. Stands in for the
/// original's device-reported printer resolution.
pub const RENDER_DPI: u32 = 1200;
/// Dots per block cell along each axis.
pub const NDOT: u32 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageGeometry {
    /// Dot pitch, render pixels.
    pub dx: u32,
    pub dy: u32,
    /// Dot footprint (the inked square within one pitch cell), render pixels.
    pub px: u32,
    pub py: u32,
    /// Grid dimensions, blocks.
    pub nx: u32,
    pub ny: u32,
    /// Page border width, render pixels (0 if disabled).
    pub border: u32,
    /// Header/footer band heights, render pixels (0 if disabled).
    pub header_height: u32,
    pub footer_height: u32,
    /// Full page raster dimensions, render pixels.
    pub width: u32,
    pub height: u32,
}

impl PageGeometry {
    /// Pixel width of one block cell including its 1-dot gutter.
    pub fn cell_pitch(&self) -> u32 {
        NDOT * self.dx + self.dx
    }

    /// Pixel coordinate of the top-left corner of the data grid (inside any
    /// page border and header band).
    pub fn grid_origin(&self) -> (u32, u32) {
        (self.border, self.border + self.header_height)
    }
}

#[derive(Error, Debug)]
pub enum GeometryError {
    #[error("dpi {0} out of range [40,300]")]
    DpiOutOfRange(u32),
    #[error("dotpercent {0} out of range [50,100]")]
    DotPercentOutOfRange(u32),
    #[error("page too small for even one block cell at dpi={dpi}, dotpercent={dotpercent}")]
    PageTooSmall { dpi: u32, dotpercent: u32 },
}

/// Page-border width, dots (reserved around the data grid when `printborder`
/// is enabled).
pub const BORDER_DOTS: u32 = 4;

/// Derive [`PageGeometry`] for a page of `page_width_px × page_height_px`
/// render pixels. Deterministic in `(dpi, dotpercent, printheader,
/// printborder, page size)`, satisfying `spec.md` §4.6's invariant.
pub fn compute_geometry(
    dpi: u32,
    dotpercent: u32,
    page_width_px: u32,
    page_height_px: u32,
    printheader: bool,
    printborder: bool,
) -> Result<PageGeometry, GeometryError> {
    if !(40..=300).contains(&dpi) {
        return Err(GeometryError::DpiOutOfRange(dpi));
    }
    if !(50..=100).contains(&dotpercent) {
        return Err(GeometryError::DotPercentOutOfRange(dotpercent));
    }

    let dx = ((RENDER_DPI as f64 / dpi as f64).round() as u32).max(1);
    let dy = dx;
    let px = (((dx as f64) * (dotpercent as f64) / 100.0).round() as u32).max(1);
    let py = px;

    let border = if printborder { BORDER_DOTS * dx } else { 0 };
    // Title line: 1/6-inch-high font band. Info line: 1/10-inch-high.
    let header_height = if printheader { RENDER_DPI / 6 } else { 0 };
    let footer_height = if printheader { RENDER_DPI / 10 } else { 0 };

    let cell = NDOT * dx + dx;
    let usable_width = page_width_px.saturating_sub(2 * border);
    let usable_height =
        page_height_px.saturating_sub(2 * border + header_height + footer_height);

    let nx = usable_width / cell;
    let ny = usable_height / cell;
    if nx == 0 || ny == 0 {
        return Err(GeometryError::PageTooSmall { dpi, dotpercent });
    }

    Ok(PageGeometry {
        dx,
        dy,
        px,
        py,
        nx,
        ny,
        border,
        header_height,
        footer_height,
        width: page_width_px,
        height: page_height_px,
    })
}

/// US Letter page size at [`RENDER_DPI`], render pixels.
pub fn letter_page_size_px() -> (u32, u32) {
    ((8.5 * RENDER_DPI as f64).round() as u32, (11.0 * RENDER_DPI as f64).round() as u32)
}
