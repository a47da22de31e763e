//! XObject and inline image operators.
//!
//! Handles: Do, BI/ID/EI
//!
//! The content lexer itself lives with the interpreter; this layer takes the
//! already-parsed operands and enforces the operator contracts: the `Do`
//! operand is always popped whether or not rendering succeeds, and the
//! stop-on-error policy decides whether a failed image aborts the content
//! stream or is skipped.

use crate::error::{RenderError, Result};
use crate::interp::device::ImageSink;
use crate::interp::image::{ImageSource, RenderContext, do_image};
use crate::model::objects::{Dict, Object};
use crate::model::store::{ObjectStore, Resolved};
use std::sync::Arc;
use tracing::warn;

/// What `Do` resolved to. Form XObjects carry their own content stream and
/// go back to the content interpreter; everything image-shaped is rendered
/// here.
#[derive(Debug)]
pub enum DoAction {
    /// The operator was fully handled (rendered, skipped, or swallowed).
    Done,
    /// A Form XObject the caller must interpret.
    Form(Arc<Object>),
}

/// Look up a named resource, first in the content stream's own resource
/// dictionary, then in the page's.
fn find_resource(
    store: &ObjectStore,
    category: &str,
    name: &str,
    stream_resources: Option<&Dict>,
    page_dict: &Dict,
) -> Option<Arc<Object>> {
    if let Some(resources) = stream_resources
        && let Some(cat) = store.known_get(resources, category)
        && let Ok(cat_dict) = cat.as_dict()
        && let Some(obj) = store.known_get(cat_dict, name)
    {
        return Some(obj.into_shared());
    }

    let page_resources = store.known_get(page_dict, "Resources")?;
    let resources = page_resources.as_dict().ok()?;
    let cat = store.known_get(resources, category)?;
    let cat_dict = cat.as_dict().ok()?;
    store
        .known_get(cat_dict, name)
        .map(Resolved::into_shared)
}

/// Execute the `Do` operator.
///
/// The operand (an XObject name) is popped from `stack` in every outcome.
/// Image XObjects render through the context's sink; Form XObjects are
/// returned to the caller; PS XObjects are deprecated and swallowed.
pub fn exec_do<S: ImageSink>(
    ctx: &mut RenderContext<'_, S>,
    stack: &mut Vec<Object>,
    stream_resources: Option<&Dict>,
    page_dict: &Dict,
) -> Result<DoAction> {
    let Some(top) = stack.pop() else {
        if ctx.stop_on_error {
            return Err(RenderError::StackUnderflow);
        }
        return Ok(DoAction::Done);
    };

    let name = match top.as_name() {
        Ok(n) => n.to_string(),
        Err(e) => return absorb(ctx.stop_on_error, e, "Do operand"),
    };

    let Some(xobj) = find_resource(ctx.store, "XObject", &name, stream_resources, page_dict)
    else {
        return absorb(
            ctx.stop_on_error,
            RenderError::Undefined(format!("XObject {name}")),
            "Do lookup",
        );
    };

    let subtype = xobj
        .as_dict()
        .ok()
        .and_then(|d| ctx.store.known_get_name(d, "Subtype"));

    match subtype.as_deref() {
        Some("Image") => {
            let stream = match xobj.as_stream() {
                Ok(s) => s,
                Err(e) => return absorb(ctx.stop_on_error, e, "image XObject"),
            };
            match do_image(ctx, page_dict, ImageSource::XObject(stream)) {
                Ok(_) => Ok(DoAction::Done),
                Err(e) => absorb(ctx.stop_on_error, e, "image render"),
            }
        }
        Some("Form") => Ok(DoAction::Form(Arc::clone(&xobj))),
        Some("PS") => {
            warn!("PostScript XObjects are deprecated, ignoring");
            Ok(DoAction::Done)
        }
        _ => absorb(
            ctx.stop_on_error,
            RenderError::TypeCheck {
                expected: "Image, Form or PS XObject",
                got: "other",
            },
            "Do subtype",
        ),
    }
}

/// Execute an inline image (the BI ... ID ... EI sequence).
///
/// `dict` is the inline dictionary the lexer collected between BI and ID;
/// `data` starts at the first byte after ID. Returns the number of data
/// bytes consumed so the caller can reposition its cursor; on a swallowed
/// error the whole segment counts as consumed.
pub fn exec_inline_image<S: ImageSink>(
    ctx: &mut RenderContext<'_, S>,
    dict: &Dict,
    data: &[u8],
    page_dict: &Dict,
) -> Result<u64> {
    match do_image(ctx, page_dict, ImageSource::Inline { dict, data }) {
        Ok(n) => Ok(n),
        Err(RenderError::VmError) => Err(RenderError::VmError),
        Err(e) if ctx.stop_on_error => Err(e),
        Err(e) => {
            warn!(error = %e, "skipping failed inline image");
            Ok(data.len() as u64)
        }
    }
}

/// Apply the stop-on-error policy to a failed operator. VM errors always
/// propagate.
fn absorb(stop_on_error: bool, e: RenderError, what: &str) -> Result<DoAction> {
    if matches!(e, RenderError::VmError) || stop_on_error {
        return Err(e);
    }
    warn!(what, error = %e, "skipping failed operator");
    Ok(DoAction::Done)
}
