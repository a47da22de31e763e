//! inkplane - spot-color aware PDF page analysis and raster output.
//!
//! Three engines make up this crate:
//! - the resource-graph walker ([`interp::check`]), which decides per page
//!   whether transparency compositing is needed and which named spot
//!   colorants the page references;
//! - the image decode/render engine ([`interp::image`]), which turns image
//!   XObjects and inline images into scanlines for the graphics pipeline;
//! - the spot-color raster device ([`device::spot`]), which packs up to 7
//!   one-bit color channels per pixel and writes page bands to a seekable
//!   file from multiple worker threads.

pub mod codec;
pub mod device;
pub mod error;
pub mod interp;
pub mod model;
pub mod utils;

// Re-export interp modules for backwards compatibility
pub use interp::check as pdfcheck;
pub use interp::image as pdfimage;

// Re-export model modules for backwards compatibility
pub use model::color as pdfcolor;
pub use model::objects as pdftypes;
pub use model::state as pdfstate;

pub use error::{RenderError, Result};
