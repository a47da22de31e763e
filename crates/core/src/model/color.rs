//! PDF color space definitions.
//!
//! A structural model of color spaces, sufficient for component counting,
//! Decode-array defaulting and spot-colorant discovery. Full color
//! management (ICC transforms, tint transforms) is outside this crate.

use crate::error::{RenderError, Result};
use crate::model::objects::{Dict, Object};
use crate::model::store::ObjectStore;
use tracing::warn;

/// Structural description of a PDF color space.
#[derive(Debug, Clone, PartialEq)]
pub enum ColorSpace {
    DeviceGray,
    DeviceRGB,
    DeviceCMYK,
    CalGray,
    CalRGB,
    Lab,
    /// ICC profile based; `n` is the declared component count. The profile
    /// itself is handled by an external CMS.
    IccBased {
        n: usize,
        alternate: Option<Box<ColorSpace>>,
    },
    /// Indexed space: base space plus the highest valid index value.
    Indexed {
        base: Box<ColorSpace>,
        hival: i64,
    },
    /// Named separation over an alternate space.
    Separation {
        name: String,
        alternate: Box<ColorSpace>,
    },
    /// Multi-colorant space over an alternate space.
    DeviceN {
        names: Vec<String>,
        alternate: Box<ColorSpace>,
    },
    /// Pattern space, optionally over an underlying space.
    Pattern {
        base: Option<Box<ColorSpace>>,
    },
}

impl ColorSpace {
    /// Number of color components a sample of this space carries.
    pub fn ncomponents(&self) -> usize {
        match self {
            Self::DeviceGray | Self::CalGray => 1,
            Self::DeviceRGB | Self::CalRGB | Self::Lab => 3,
            Self::DeviceCMYK => 4,
            Self::IccBased { n, .. } => *n,
            Self::Indexed { .. } => 1,
            Self::Separation { .. } => 1,
            Self::DeviceN { names, .. } => names.len(),
            Self::Pattern { .. } => 1,
        }
    }

    /// Map a JPEG2000 enumerated color space code to a device space.
    ///
    /// Codes 20 (e-sRGB) and 24 (ROMM) have no direct device equivalent and
    /// are treated as DeviceRGB with a warning, matching the rendering the
    /// rest of the pipeline expects.
    pub fn from_jpx_enum(cs_enum: u32) -> Option<Self> {
        match cs_enum {
            12 => Some(Self::DeviceCMYK),
            16 | 18 => Some(Self::DeviceRGB),
            17 => Some(Self::DeviceGray),
            20 | 24 => {
                warn!(cs_enum, "unsupported JPX enumerated color space, assuming DeviceRGB");
                Some(Self::DeviceRGB)
            }
            _ => None,
        }
    }

    /// Resolve a name to one of the predefined spaces.
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "DeviceGray" | "G" => Some(Self::DeviceGray),
            "DeviceRGB" | "RGB" => Some(Self::DeviceRGB),
            "DeviceCMYK" | "CMYK" => Some(Self::DeviceCMYK),
            "CalGray" => Some(Self::CalGray),
            "CalRGB" => Some(Self::CalRGB),
            "Lab" => Some(Self::Lab),
            "Pattern" => Some(Self::Pattern { base: None }),
            _ => None,
        }
    }
}

/// Longest tolerated nesting of color space constructions.
const MAX_CS_DEPTH: usize = 16;

/// Build a `ColorSpace` from a color space object (a name, or an array such
/// as `[/Indexed base hival lookup]`).
pub fn resolve_colorspace(store: &ObjectStore, obj: &Object) -> Result<ColorSpace> {
    resolve_colorspace_depth(store, obj, 0)
}

fn resolve_colorspace_depth(store: &ObjectStore, obj: &Object, depth: usize) -> Result<ColorSpace> {
    if depth > MAX_CS_DEPTH {
        return Err(RenderError::LimitCheck(
            "color space nesting too deep".into(),
        ));
    }
    let resolved = store.resolve(obj)?;
    match &*resolved {
        Object::Name(name) => ColorSpace::from_name(&name)
            .ok_or_else(|| RenderError::Undefined(format!("color space {name}"))),
        Object::Array(arr) => resolve_colorspace_array(store, &arr, depth),
        other => Err(RenderError::TypeCheck {
            expected: "name or array",
            got: other.type_name(),
        }),
    }
}

fn resolve_colorspace_array(
    store: &ObjectStore,
    arr: &[Object],
    depth: usize,
) -> Result<ColorSpace> {
    let family = match arr.first() {
        Some(o) => store.resolve(o)?,
        None => {
            return Err(RenderError::SyntaxError("empty color space array".into()));
        }
    };
    let family = family.as_name()?.to_string();

    match family.as_str() {
        "ICCBased" => {
            let stream_obj = arr
                .get(1)
                .ok_or_else(|| RenderError::SyntaxError("ICCBased without stream".into()))?;
            let resolved = store.resolve(stream_obj)?;
            let dict: &Dict = resolved.as_dict()?;
            let n = store
                .known_get_int(dict, "N")
                .ok_or_else(|| RenderError::Undefined("ICCBased /N".into()))?;
            if !matches!(n, 1 | 3 | 4) {
                return Err(RenderError::RangeCheck(format!("ICCBased N = {n}")));
            }
            let alternate = match store.known_get(dict, "Alternate") {
                Some(alt) => Some(Box::new(resolve_colorspace_depth(store, &alt, depth + 1)?)),
                None => None,
            };
            Ok(ColorSpace::IccBased {
                n: n as usize,
                alternate,
            })
        }
        "Indexed" | "I" => {
            let base_obj = arr
                .get(1)
                .ok_or_else(|| RenderError::SyntaxError("Indexed without base".into()))?;
            let base = resolve_colorspace_depth(store, base_obj, depth + 1)?;
            let hival = match arr.get(2) {
                Some(o) => store.resolve(o)?.as_int()?,
                None => {
                    return Err(RenderError::SyntaxError("Indexed without hival".into()));
                }
            };
            if !(0..=255).contains(&hival) {
                return Err(RenderError::RangeCheck(format!("Indexed hival = {hival}")));
            }
            Ok(ColorSpace::Indexed {
                base: Box::new(base),
                hival,
            })
        }
        "Separation" => {
            let name = match arr.get(1) {
                Some(o) => store.resolve(o)?.as_name()?.to_string(),
                None => {
                    return Err(RenderError::SyntaxError("Separation without name".into()));
                }
            };
            let alt_obj = arr
                .get(2)
                .ok_or_else(|| RenderError::SyntaxError("Separation without alternate".into()))?;
            let alternate = resolve_colorspace_depth(store, alt_obj, depth + 1)?;
            Ok(ColorSpace::Separation {
                name,
                alternate: Box::new(alternate),
            })
        }
        "DeviceN" => {
            let names_obj = arr
                .get(1)
                .ok_or_else(|| RenderError::SyntaxError("DeviceN without names".into()))?;
            let resolved = store.resolve(names_obj)?;
            let mut names = Vec::new();
            for n in resolved.as_array()? {
                names.push(store.resolve(n)?.as_name()?.to_string());
            }
            let alt_obj = arr
                .get(2)
                .ok_or_else(|| RenderError::SyntaxError("DeviceN without alternate".into()))?;
            let alternate = resolve_colorspace_depth(store, alt_obj, depth + 1)?;
            Ok(ColorSpace::DeviceN {
                names,
                alternate: Box::new(alternate),
            })
        }
        "Pattern" => {
            let base = match arr.get(1) {
                Some(o) => Some(Box::new(resolve_colorspace_depth(store, o, depth + 1)?)),
                None => None,
            };
            Ok(ColorSpace::Pattern { base })
        }
        // Single-element forms like [/DeviceGray], and the CIE families whose
        // parameter dictionaries we don't need to inspect.
        other => ColorSpace::from_name(other)
            .ok_or_else(|| RenderError::Undefined(format!("color space {other}"))),
    }
}
