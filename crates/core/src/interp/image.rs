//! Image operations for content interpretation.
//!
//! One image invocation runs through a fixed sequence: extract the governing
//! attributes, substitute a printing alternate if one is flagged, resolve the
//! mask (color-key range or stencil plane), resolve the color space (possibly
//! from the JPEG2000 container header), select the rendering variant, and
//! stream the pixel data into the graphics pipeline one scanline at a time.

use crate::codec::{self, ExternalFilter};
use crate::codec::jpx::{self, JpxInfo};
use crate::error::{RenderError, Result};
use crate::interp::device::{ImageParams, ImageSink, ImageVariant, MaskParams, data_bytes};
use crate::model::color::{ColorSpace, resolve_colorspace};
use crate::model::objects::{Dict, Object, Stream};
use crate::model::state::GraphicState;
use crate::model::store::{ObjectStore, Resolved};
use crate::utils::image_matrix;
use std::sync::Arc;
use tracing::{debug, warn};

/// Most components a single image sample may carry.
pub const MAX_IMAGE_COMPONENTS: usize = 8;

/// Shared state for image rendering within one content stream.
pub struct RenderContext<'a, S: ImageSink> {
    pub store: &'a ObjectStore,
    pub sink: &'a mut S,
    pub gstate: GraphicState,
    /// Component count of the target device's native color space, used when
    /// an image carries no color space at all.
    pub device_ncomps: usize,
    /// Abort the content stream on image errors instead of skipping the
    /// failed operator.
    pub stop_on_error: bool,
    /// Decoder hook for DCT/JPX/JBIG2/CCITT compressed data.
    pub external: Option<&'a dyn ExternalFilter>,
}

impl<'a, S: ImageSink> RenderContext<'a, S> {
    pub fn new(store: &'a ObjectStore, sink: &'a mut S) -> Self {
        Self {
            store,
            sink,
            gstate: GraphicState::default(),
            device_ncomps: 4,
            stop_on_error: false,
            external: None,
        }
    }
}

/// Attributes governing one image, pulled out of its dictionary.
///
/// Inline images may use the abbreviated key forms (W/H/BPC/IM/I/CS/D/F/DP);
/// both spellings are accepted everywhere.
#[derive(Debug, Default)]
pub struct ImageInfo {
    pub length: i64,
    pub width: i64,
    pub height: i64,
    pub bpc: i64,
    pub image_mask: bool,
    pub interpolate: bool,
    pub smask_in_data: i64,
    pub struct_parent: Option<i64>,
    pub mask: Option<Arc<Object>>,
    pub smask: Option<Arc<Object>>,
    pub colorspace: Option<Arc<Object>>,
    pub intent: Option<Arc<Object>>,
    pub alternates: Option<Arc<Object>>,
    pub name: Option<Arc<Object>>,
    pub decode: Option<Arc<Object>>,
    pub oc: Option<Arc<Object>>,
    pub filter: Option<Arc<Object>>,
    pub decode_parms: Option<Arc<Object>>,
    pub is_jpx: bool,
}

impl ImageInfo {
    /// Extract image attributes, enforcing required keys and defaults.
    ///
    /// Width and Height are required; everything else falls back to its
    /// default (BitsPerComponent 1, ImageMask/Interpolate false,
    /// SMaskInData 0). Type mismatches in optional keys are ignored.
    pub fn from_dict(store: &ObjectStore, dict: &Dict) -> Result<Self> {
        let height = store.get_required_int2(dict, "Height", "H")?;
        let width = store.get_required_int2(dict, "Width", "W")?;
        if width < 0 || height < 0 {
            return Err(RenderError::RangeCheck(format!(
                "image dimensions {width}x{height}"
            )));
        }

        let bpc = store
            .known_get2(dict, "BitsPerComponent", "BPC")
            .and_then(|o| o.as_int().ok())
            .unwrap_or(1);
        if !matches!(bpc, 1 | 2 | 4 | 8 | 16) {
            return Err(RenderError::RangeCheck(format!(
                "BitsPerComponent {bpc}"
            )));
        }

        let filter = store.known_get2(dict, "Filter", "F").map(Resolved::into_shared);
        let is_jpx = matches!(filter.as_deref(), Some(Object::Name(n)) if n == "JPXDecode");

        Ok(Self {
            length: store.known_get_int(dict, "Length").unwrap_or(0),
            width,
            height,
            bpc,
            image_mask: store
                .known_get2(dict, "ImageMask", "IM")
                .and_then(|o| o.as_bool().ok())
                .unwrap_or(false),
            interpolate: store
                .known_get2(dict, "Interpolate", "I")
                .and_then(|o| o.as_bool().ok())
                .unwrap_or(false),
            smask_in_data: store.known_get_int(dict, "SMaskInData").unwrap_or(0),
            struct_parent: store.known_get_int(dict, "StructParent"),
            mask: store.known_get(dict, "Mask").map(Resolved::into_shared),
            smask: store.known_get(dict, "SMask").map(Resolved::into_shared),
            colorspace: store
                .known_get2(dict, "ColorSpace", "CS")
                .map(Resolved::into_shared),
            intent: store.known_get(dict, "Intent").map(Resolved::into_shared),
            alternates: store.known_get(dict, "Alternates").map(Resolved::into_shared),
            name: store.known_get(dict, "Name").map(Resolved::into_shared),
            decode: store.known_get2(dict, "Decode", "D").map(Resolved::into_shared),
            oc: store.known_get(dict, "OC").map(Resolved::into_shared),
            filter,
            decode_parms: store
                .known_get2(dict, "DecodeParms", "DP")
                .map(Resolved::into_shared),
            is_jpx,
        })
    }
}

/// Where an image's dictionary and data come from.
pub enum ImageSource<'a> {
    /// An image XObject (stream object with its own data).
    XObject(&'a Stream),
    /// An inline image: dictionary from the operand stack, data positioned
    /// at the first byte after the ID operator.
    Inline { dict: &'a Dict, data: &'a [u8] },
}

/// Find the first Alternates entry flagged for printing and return its
/// substitute image stream.
fn find_alternate(store: &ObjectStore, alternates: &Object) -> Option<Arc<Object>> {
    let resolved = store.resolve(alternates).ok()?;
    let arr = resolved.as_array().ok()?;
    for item in arr {
        let Ok(item) = store.resolve(item) else {
            continue;
        };
        let Ok(dict) = item.as_dict() else { continue };
        if store.known_get_bool(dict, "DefaultForPrinting") != Some(true) {
            continue;
        }
        if let Some(image) = store.known_get(dict, "Image")
            && image.as_stream().is_ok()
        {
            return Some(image.into_shared());
        }
    }
    None
}

/// Build the common image parameters: the image-space matrix and the decode
/// array (explicit, or defaulted per component — `[0, hival]` for an Indexed
/// target, `[0, 1]` otherwise).
fn data_image_params(
    store: &ObjectStore,
    info: &ImageInfo,
    ncomps: usize,
    cs: Option<&ColorSpace>,
) -> Result<(crate::utils::Matrix, Vec<f32>)> {
    let matrix = image_matrix(info.width, info.height);

    let decode = if let Some(decode_obj) = info.decode.as_deref() {
        let resolved = store.resolve(decode_obj)?;
        let arr = resolved.as_array()?;
        if arr.len() > MAX_IMAGE_COMPONENTS * 2 {
            return Err(RenderError::LimitCheck(format!(
                "Decode array with {} entries",
                arr.len()
            )));
        }
        let mut out = Vec::with_capacity(arr.len());
        for v in arr {
            out.push(store.resolve(v)?.as_num()? as f32);
        }
        out
    } else {
        let maxval = match cs {
            Some(ColorSpace::Indexed { hival, .. }) => *hival as f32,
            _ => 1.0,
        };
        let mut out = Vec::with_capacity(ncomps * 2);
        for _ in 0..ncomps {
            out.push(0.0);
            out.push(maxval);
        }
        out
    };

    Ok((matrix, decode))
}

/// Render one image through the context's sink.
///
/// Returns the number of content-stream bytes consumed, which matters only
/// for inline images: even the no-op pass-through path must account for
/// exactly `ceil(W*comps*bpc/8) * H` bytes so the caller can reposition.
pub fn do_image<S: ImageSink>(
    ctx: &mut RenderContext<'_, S>,
    _page_dict: &Dict,
    source: ImageSource<'_>,
) -> Result<u64> {
    let (mut dict, mut raw, inline): (&Dict, &[u8], bool) = match source {
        ImageSource::XObject(s) => (&s.dict, s.raw_data(), false),
        ImageSource::Inline { dict, data } => (dict, data, true),
    };

    let mut info = ImageInfo::from_dict(ctx.store, dict)?;

    // If an alternate image is flagged as the one to use for printing, swap
    // it in and start over on its dictionary.
    let alt_holder = if inline {
        None
    } else {
        info.alternates
            .as_deref()
            .and_then(|a| find_alternate(ctx.store, a))
    };
    if let Some(alt) = &alt_holder {
        let stream = alt.as_stream()?;
        info = ImageInfo::from_dict(ctx.store, &stream.dict)?;
        dict = &stream.dict;
        raw = stream.raw_data();
    }

    // JPXDecode images may define everything we need in their own header.
    let mut jpx_info = JpxInfo::default();
    if info.is_jpx && !inline {
        jpx_info = jpx::scan_jpx_header(raw);
    }

    // Soft masks are not composited yet; while one is present the Mask key
    // is disregarded as well.
    let mut mask_ranges: Option<Vec<u32>> = None;
    let mut stencil_stream: Option<&Stream> = None;
    if info.smask.is_some() {
        warn!("image has unsupported SMask");
    } else if let Some(mask) = info.mask.as_deref() {
        match mask {
            Object::Array(arr) => {
                if arr.len() > MAX_IMAGE_COMPONENTS * 2 {
                    return Err(RenderError::LimitCheck(format!(
                        "Mask array with {} entries",
                        arr.len()
                    )));
                }
                let mut ranges = Vec::with_capacity(arr.len());
                for v in arr {
                    ranges.push(ctx.store.resolve(&v)?.as_num()? as u32);
                }
                mask_ranges = Some(ranges);
            }
            Object::Stream(s) => stencil_stream = Some(&s),
            other => {
                return Err(RenderError::TypeCheck {
                    expected: "array or stream",
                    got: other.type_name(),
                });
            }
        }
    }

    // A stencil mask plane must be fully in memory before the first
    // scanline goes out, since every row call carries both planes.
    let mut mask_plane: Option<Vec<u8>> = None;
    let mut mask_params: Option<MaskParams> = None;
    if let Some(mask_stream) = stencil_stream {
        let mi = ImageInfo::from_dict(ctx.store, &mask_stream.dict)?;
        let (mmatrix, mdecode) = data_image_params(ctx.store, &mi, 1, None)?;
        let msize = data_bytes(mi.width, mi.height, 1, mi.bpc);
        let mut decoded = codec::decode_stream(ctx.store, mask_stream, ctx.external)?;
        if decoded.len() < msize {
            return Err(RenderError::LimitCheck(format!(
                "stencil mask data {} bytes, expected {msize}",
                decoded.len()
            )));
        }
        decoded.truncate(msize);
        mask_plane = Some(decoded);
        mask_params = Some(MaskParams {
            width: mi.width,
            height: mi.height,
            bpc: mi.bpc,
            decode: mdecode,
            matrix: mmatrix,
        });
    }

    // Resolve the color space. ImageMask and ColorSpace are mutually
    // exclusive in PDF.
    let mut bpc = info.bpc;
    let (ncomps, colorspace) = if info.image_mask {
        (1, None)
    } else if let Some(cs_obj) = info.colorspace.as_deref() {
        let cs = resolve_colorspace(ctx.store, cs_obj).inspect_err(|e| {
            warn!(error = %e, "image has unsupported ColorSpace");
        })?;
        (cs.ncomponents(), Some(cs))
    } else if info.is_jpx {
        let cs = if jpx_info.icc_based {
            // The profile bytes live at jpx_info.icc_offset; color
            // conversion is the CMS' problem, we only need the shape.
            ColorSpace::IccBased {
                n: jpx_info.comps as usize,
                alternate: None,
            }
        } else {
            match ColorSpace::from_jpx_enum(jpx_info.cs_enum) {
                Some(cs) => cs,
                None => {
                    // Matches the long-standing behavior: an unusable
                    // enumerated space skips the image without failing it.
                    warn!(
                        cs_enum = jpx_info.cs_enum,
                        "unsupported JPX enumerated color space, skipping image"
                    );
                    return Ok(0);
                }
            }
        };
        // 12-bit samples come out of the decoder widened to 16 bits.
        bpc = if jpx_info.bpc == 12 { 16 } else { jpx_info.bpc as i64 };
        (cs.ncomponents(), Some(cs))
    } else {
        // No color space and nothing to infer one from: the data passes
        // through uninterpreted. The stream still has to be accounted for.
        let total = data_bytes(info.width, info.height, ctx.device_ncomps, info.bpc) as u64;
        debug!(total, "image without color space, flushing data");
        return Ok(if inline { total } else { 0 });
    };

    if ncomps == 0 || ncomps > MAX_IMAGE_COMPONENTS {
        return Err(RenderError::RangeCheck(format!(
            "image with {ncomps} components"
        )));
    }

    let (matrix, decode) = data_image_params(ctx.store, &info, ncomps, colorspace.as_ref())?;

    let variant = if let Some(ranges) = mask_ranges {
        ImageVariant::ColorKey { ranges }
    } else if let Some(mask) = mask_params {
        ImageVariant::Stencil { mask }
    } else {
        ImageVariant::Plain
    };

    let params = ImageParams {
        width: info.width,
        height: info.height,
        bpc,
        matrix,
        decode,
        interpolate: info.interpolate,
        image_mask: info.image_mask,
        colorspace,
        ncomps,
        variant,
    };

    // Decode the pixel data. Unfiltered inline data is consumed by exact
    // byte count; everything else takes the filter chain.
    let has_filters = !codec::get_filters(ctx.store, dict).is_empty();
    let decoded_storage: Vec<u8>;
    let (data, consumed): (&[u8], u64) = if inline && !has_filters {
        let total = params.data_bytes();
        if raw.len() < total {
            return Err(RenderError::LimitCheck(format!(
                "inline image data {} bytes, expected {total}",
                raw.len()
            )));
        }
        (&raw[..total], total as u64)
    } else {
        decoded_storage = codec::decode_data(ctx.store, dict, raw, ctx.external)?;
        (&decoded_storage, if inline { raw.len() as u64 } else { 0 })
    };

    stream_pixels(ctx, &params, data, mask_plane.as_deref())?;

    Ok(consumed)
}

/// Feed decoded data to the sink, exactly one scanline per call.
fn stream_pixels<S: ImageSink>(
    ctx: &mut RenderContext<'_, S>,
    params: &ImageParams,
    data: &[u8],
    mask_plane: Option<&[u8]>,
) -> Result<()> {
    ctx.sink.begin_image(&ctx.gstate, params)?;

    let linelen = params.line_bytes();
    let total = params.data_bytes();
    let mut off = 0;
    while off < total {
        let Some(row) = data.get(off..off + linelen) else {
            warn!(
                remaining = total - off,
                linelen, "image data ended mid-scanline"
            );
            return Err(RenderError::LimitCheck("short image data read".into()));
        };
        ctx.sink.image_row(row, mask_plane)?;
        off += linelen;
    }

    ctx.sink.end_image()
}
