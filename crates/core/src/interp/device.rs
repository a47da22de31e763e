//! Image output interface for content interpretation.
//!
//! The image engine does not rasterize by itself; it decodes and validates
//! image data, then streams scanlines into an `ImageSink` — the seam where
//! the general graphics pipeline (scaling, halftoning, per-pixel device
//! encode) takes over.

use crate::error::Result;
use crate::model::color::ColorSpace;
use crate::model::state::GraphicState;
use crate::utils::Matrix;

/// Rendering variant selected for an image.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageVariant {
    /// Single-plane image (also used for ImageMask).
    Plain,
    /// Explicit stencil mask: a second 1-bit plane selects visible pixels.
    Stencil { mask: MaskParams },
    /// Color-key masking: a per-component value range is transparent.
    ColorKey { ranges: Vec<u32> },
}

/// Geometry of a stencil mask plane.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskParams {
    pub width: i64,
    pub height: i64,
    pub bpc: i64,
    pub decode: Vec<f32>,
    pub matrix: Matrix,
}

/// Everything the pipeline needs to know about an image before the first
/// scanline arrives.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageParams {
    pub width: i64,
    pub height: i64,
    pub bpc: i64,
    /// Maps image space onto the unit square.
    pub matrix: Matrix,
    /// Component decode ranges, two entries per component.
    pub decode: Vec<f32>,
    pub interpolate: bool,
    /// True for a 1-bit mask painted with the current non-stroking color.
    pub image_mask: bool,
    /// None for ImageMask and for the uninterpreted pass-through path.
    pub colorspace: Option<ColorSpace>,
    /// Components per pixel in the data stream.
    pub ncomps: usize,
    pub variant: ImageVariant,
}

impl ImageParams {
    /// Packed byte length of one scanline.
    pub fn line_bytes(&self) -> usize {
        line_bytes(self.width, self.ncomps, self.bpc)
    }

    /// Packed byte length of the whole image.
    pub fn data_bytes(&self) -> usize {
        self.line_bytes() * self.height.max(0) as usize
    }
}

/// Packed byte length of one scanline of `width` pixels.
pub fn line_bytes(width: i64, ncomps: usize, bpc: i64) -> usize {
    let bits = width.max(0) as usize * ncomps * bpc.max(0) as usize;
    bits.div_ceil(8)
}

/// Packed byte length of a full `width` x `height` sample grid.
pub fn data_bytes(width: i64, height: i64, ncomps: usize, bpc: i64) -> usize {
    line_bytes(width, ncomps, bpc) * height.max(0) as usize
}

/// Consumer of decoded image scanlines.
///
/// `image_row` is called exactly once per scanline, top row first. For the
/// stencil variant the complete mask plane accompanies every call, because
/// the pipeline needs simultaneous access to both planes.
pub trait ImageSink {
    fn begin_image(&mut self, gstate: &GraphicState, params: &ImageParams) -> Result<()>;

    fn image_row(&mut self, row: &[u8], mask_plane: Option<&[u8]>) -> Result<()>;

    fn end_image(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Sink that swallows everything; useful when only the side effects of
/// decoding (validation, stream positioning) are wanted.
#[derive(Debug, Default)]
pub struct NullSink;

impl ImageSink for NullSink {
    fn begin_image(&mut self, _gstate: &GraphicState, _params: &ImageParams) -> Result<()> {
        Ok(())
    }

    fn image_row(&mut self, _row: &[u8], _mask_plane: Option<&[u8]>) -> Result<()> {
        Ok(())
    }
}
