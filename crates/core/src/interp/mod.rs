//! Content interpretation: page analysis and image rendering.
//!
//! This module contains:
//! - `check`: page-level transparency and spot-colorant detection
//! - `image`: the image decode/render engine
//! - `ops`: operator-level wrappers (Do, inline images)
//! - `device`: the image-plane consumer interface
//! - `loop_detect`: cycle-safe traversal bookkeeping

pub mod check;
pub mod device;
pub mod image;
pub mod loop_detect;
pub mod ops;

// Re-export main types for convenience
pub use check::{CheckOptions, PageCheck, SpotColorSet, check_page};
pub use device::{ImageParams, ImageSink, ImageVariant, MaskParams, NullSink};
pub use image::{ImageInfo, ImageSource, RenderContext, do_image};
pub use loop_detect::LoopDetector;
pub use ops::{DoAction, exec_do, exec_inline_image};
