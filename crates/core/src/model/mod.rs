//! PDF model types - objects, storage, state, and color definitions.
//!
//! This module contains the core PDF data model types:
//! - `objects` - PDF object types (Object, Stream, ObjRef, Dict)
//! - `store` - Indirect object storage and reference resolution
//! - `state` - Graphics state (GraphicState, Color)
//! - `color` - Color space definitions (ColorSpace)

pub mod color;
pub mod objects;
pub mod state;
pub mod store;

// Re-export main types for convenience
pub use color::{ColorSpace, resolve_colorspace};
pub use objects::{Dict, ObjRef, Object, Stream, dict_from};
pub use state::{Color, GraphicState};
pub use store::{ObjectStore, Resolved};
