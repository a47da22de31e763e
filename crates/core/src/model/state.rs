//! Graphics state.
//!
//! The slice of the full graphics state the image pipeline consumes: the
//! current transformation matrix, fill/stroke colors (an image mask paints
//! with the current non-stroking color) and the transparency-related
//! ExtGState values.

use crate::utils::{MATRIX_IDENTITY, Matrix};

/// Color value in the current color space.
#[derive(Debug, Clone, PartialEq)]
pub enum Color {
    /// Greyscale color (0.0 = black, 1.0 = white)
    Gray(f64),
    /// RGB color
    Rgb(f64, f64, f64),
    /// CMYK color
    Cmyk(f64, f64, f64, f64),
    /// Color in a Separation/DeviceN space: one tint per colorant
    Tints(Vec<f64>),
}

impl Default for Color {
    fn default() -> Self {
        Color::Gray(0.0)
    }
}

impl Color {
    /// Component values as a flat vector.
    pub fn to_vec(&self) -> Vec<f64> {
        match self {
            Color::Gray(g) => vec![*g],
            Color::Rgb(r, g, b) => vec![*r, *g, *b],
            Color::Cmyk(c, m, y, k) => vec![*c, *m, *y, *k],
            Color::Tints(t) => t.clone(),
        }
    }
}

/// Graphics state snapshot handed to the rendering seam.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphicState {
    /// Current transformation matrix
    pub ctm: Matrix,
    /// Stroking color
    pub scolor: Color,
    /// Non-stroking color (used to paint image masks)
    pub ncolor: Color,
    /// Stroking constant alpha (CA)
    pub stroke_alpha: f64,
    /// Non-stroking constant alpha (ca)
    pub fill_alpha: f64,
    /// Blend mode name (BM)
    pub blend_mode: String,
}

impl Default for GraphicState {
    fn default() -> Self {
        Self {
            ctm: MATRIX_IDENTITY,
            scolor: Color::default(),
            ncolor: Color::default(),
            stroke_alpha: 1.0,
            fill_alpha: 1.0,
            blend_mode: "Normal".to_string(),
        }
    }
}
