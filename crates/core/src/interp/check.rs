//! Page-level transparency and spot-colorant detection.
//!
//! Before a page is rendered we need to know two independent things: whether
//! the transparency compositor must be installed at all, and which named spot
//! colorants the page references (so a separation device can size its color
//! planes before it is first opened). Both are discovered in a single
//! recursive walk over the page's resource dictionaries.
//!
//! Transparency is triggered by soft masks, non-Normal blend modes,
//! non-opaque constant alpha, Form XObject groups and Highlight annotations.
//! Spot names come from Separation/DeviceN color spaces wherever they can be
//! reached: ColorSpace and Shading resources, image and form XObjects,
//! patterns, group color spaces, and annotation appearance streams.

use crate::error::{RenderError, Result};
use crate::interp::loop_detect::LoopDetector;
use crate::model::objects::{Dict, Object};
use crate::model::store::{ObjectStore, Resolved};
use indexmap::IndexSet;
use tracing::debug;

/// Insertion-ordered, deduplicated set of spot colorant names.
pub type SpotColorSet = IndexSet<String>;

/// Caller configuration for a page check.
#[derive(Debug, Clone)]
pub struct CheckOptions {
    /// Collect spot colorant names. Skipped entirely for devices without
    /// separation support, which also allows the walk to stop as soon as
    /// transparency is confirmed.
    pub track_spots: bool,
    /// Inspect the page's annotations (only relevant when annotations will
    /// be rendered).
    pub render_annotations: bool,
    /// Escalate errors in individual resources instead of skipping them.
    pub stop_on_error: bool,
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self {
            track_spots: false,
            render_annotations: true,
            stop_on_error: false,
        }
    }
}

/// Result of a page check.
#[derive(Debug, Clone, Default)]
pub struct PageCheck {
    /// True if any construct on the page requires transparency compositing.
    pub transparent: bool,
    /// Spot colorants referenced by the page, in discovery order.
    pub spot_names: SpotColorSet,
}

impl PageCheck {
    /// Number of distinct spot colorants found.
    pub fn num_spots(&self) -> usize {
        self.spot_names.len()
    }
}

/// Check a page for transparency usage and spot colorants.
///
/// The page's own top-level `Group` entry is deliberately not treated as a
/// transparency trigger: some authoring tools emit a page group whether or
/// not transparency is actually used, and in the absence of other
/// transparency features it has no effect. The group's color space still
/// feeds spot discovery.
///
/// On a `VmError` (loop-detection bookkeeping exhausted) the whole check
/// fails; callers should fall back to assuming the page has transparency.
pub fn check_page(
    store: &ObjectStore,
    page_dict: &Dict,
    options: &CheckOptions,
) -> Result<PageCheck> {
    let mut checker = Checker {
        store,
        opts: options,
        detector: LoopDetector::new(),
        transparent: false,
        spots: options.track_spots.then(SpotColorSet::new),
    };

    checker.check_page_inner(page_dict)?;

    Ok(PageCheck {
        transparent: checker.transparent,
        spot_names: checker.spots.unwrap_or_default(),
    })
}

/// Process colorants and the reserved separation names never counted as
/// page spot colors.
const NON_SPOT_NAMES: [&str; 6] = ["None", "All", "Cyan", "Magenta", "Yellow", "Black"];

struct Checker<'a> {
    store: &'a ObjectStore,
    opts: &'a CheckOptions,
    detector: LoopDetector,
    transparent: bool,
    /// `None` when the caller is not interested in spot colorants.
    spots: Option<SpotColorSet>,
}

impl<'a> Checker<'a> {
    /// True once there is nothing left to learn: transparency is confirmed
    /// and spot names are not being collected.
    fn done_early(&self) -> bool {
        self.transparent && self.spots.is_none()
    }

    /// Best-effort sub-check: log and continue on failure. VM errors always
    /// propagate (the conservative-fallback contract depends on it).
    fn swallow(&self, r: Result<()>, what: &str) -> Result<()> {
        match r {
            Ok(()) => Ok(()),
            Err(RenderError::VmError) => Err(RenderError::VmError),
            Err(e) => {
                debug!(what, error = %e, "ignoring error in page check");
                Ok(())
            }
        }
    }

    /// Sub-check honoring the stop-on-error policy. VM errors always
    /// propagate.
    fn policy(&self, r: Result<()>, what: &str) -> Result<()> {
        match r {
            Ok(()) => Ok(()),
            Err(RenderError::VmError) => Err(RenderError::VmError),
            Err(e) if self.opts.stop_on_error => Err(e),
            Err(e) => {
                debug!(what, error = %e, "ignoring error in page check");
                Ok(())
            }
        }
    }

    /// Run `f` over a resolved dictionary inside a fresh loop-detection
    /// scope. A dictionary already open in an enclosing scope is treated as
    /// explored and skipped.
    fn with_dict<F>(&mut self, resolved: &Resolved<'_>, f: F) -> Result<()>
    where
        F: FnOnce(&mut Self, &Dict) -> Result<()>,
    {
        let Ok(dict) = resolved.as_dict() else {
            return Ok(());
        };
        self.detector.mark()?;
        let entered = match self.detector.test_and_add(resolved.identity()) {
            Ok(v) => v,
            Err(e) => {
                self.detector.cleartomark();
                return Err(e);
            }
        };
        let result = if entered { f(self, dict) } else { Ok(()) };
        self.detector.cleartomark();
        result
    }

    fn check_page_inner(&mut self, page_dict: &Dict) -> Result<()> {
        // Page group: never a transparency trigger, but its color space can
        // name spot colorants.
        if self.spots.is_some()
            && let Some(group) = self.store.known_get(page_dict, "Group")
            && let Ok(group_dict) = group.as_dict()
            && let Some(cs) = self.store.known_get(group_dict, "CS")
        {
            let r = self.check_colorspace_for_spots(&cs);
            self.policy(r, "page group color space")?;
        }

        if let Some(resources) = self.store.known_get(page_dict, "Resources") {
            let r = self.with_dict(&resources, |s, d| s.check_resources(d));
            self.policy(r, "page resources")?;
        }

        if self.opts.render_annotations
            && let Some(annots) = self.store.known_get(page_dict, "Annots")
            && let Ok(arr) = annots.as_array()
        {
            let r = self.check_annots(arr);
            self.policy(r, "page annotations")?;
        }

        Ok(())
    }

    /// Check one Resources dictionary. Color spaces and shadings are only
    /// visited when spot names are wanted; they cannot introduce
    /// transparency and the scan is comparatively expensive.
    fn check_resources(&mut self, resources: &Dict) -> Result<()> {
        if self.spots.is_some() {
            if let Some(d) = self.store.known_get(resources, "ColorSpace") {
                let r = self.with_dict(&d, |s, dict| s.check_colorspace_dict(dict));
                self.swallow(r, "ColorSpace resources")?;
            }
            if let Some(d) = self.store.known_get(resources, "Shading") {
                let r = self.with_dict(&d, |s, dict| s.check_shading_dict(dict));
                self.swallow(r, "Shading resources")?;
            }
        }

        if let Some(d) = self.store.known_get(resources, "XObject") {
            let r = self.with_dict(&d, |s, dict| s.check_xobject_dict(dict));
            self.swallow(r, "XObject resources")?;
        }

        if let Some(d) = self.store.known_get(resources, "Pattern") {
            let r = self.with_dict(&d, |s, dict| s.check_pattern_dict(dict));
            self.swallow(r, "Pattern resources")?;
        }

        if let Some(d) = self.store.known_get(resources, "Font") {
            let r = self.with_dict(&d, |s, dict| s.check_font_dict(dict));
            self.swallow(r, "Font resources")?;
        }

        // From this point on, all reachable spot colorants have been
        // counted; confirmed transparency can end the walk.
        if self.done_early() {
            return Ok(());
        }

        if let Some(d) = self.store.known_get(resources, "ExtGState") {
            let r = self.with_dict(&d, |s, dict| s.check_extgstate_dict(dict));
            self.swallow(r, "ExtGState resources")?;
        }

        Ok(())
    }

    fn check_colorspace_dict(&mut self, cs_dict: &Dict) -> Result<()> {
        for value in cs_dict.values() {
            if let Ok(resolved) = self.store.resolve(value) {
                let r = self.check_colorspace_for_spots(&resolved);
                self.swallow(r, "ColorSpace entry")?;
            }
        }
        Ok(())
    }

    fn check_shading(&mut self, shading: &Dict) -> Result<()> {
        if let Some(cs) = self.store.known_get(shading, "ColorSpace") {
            self.check_colorspace_for_spots(&cs)?;
        }
        Ok(())
    }

    fn check_shading_dict(&mut self, shading_dict: &Dict) -> Result<()> {
        for value in shading_dict.values() {
            if let Ok(resolved) = self.store.resolve(value) {
                let r = self.with_dict(&resolved, |s, d| s.check_shading(d));
                self.swallow(r, "Shading entry")?;
            }
        }
        Ok(())
    }

    /// Check a single XObject for transparency usage and spot colorants.
    fn check_xobject(&mut self, xobject: &Dict) -> Result<()> {
        let Some(subtype) = self.store.known_get_name(xobject, "Subtype") else {
            return Ok(());
        };

        if subtype == "Image" {
            if xobject.contains_key("SMask") {
                self.transparent = true;
                if self.spots.is_none() {
                    return Ok(());
                }
            }
            if let Some(f) = self.store.known_get_number(xobject, "SMaskInData") {
                if f != 0.0 {
                    self.transparent = true;
                }
                if self.spots.is_none() {
                    return Ok(());
                }
            }
            if self.spots.is_some()
                && let Some(cs) = self.store.known_get(xobject, "ColorSpace")
            {
                // Errors here don't matter; they resurface if the color
                // space is actually used.
                let r = self.check_colorspace_for_spots(&cs);
                self.swallow(r, "image color space")?;
            }
        } else if subtype == "Form" {
            if let Some(group) = self.store.known_get(xobject, "Group")
                && group.as_dict().is_ok()
            {
                self.transparent = true;
                if self.spots.is_none() {
                    return Ok(());
                }
                // Fresh detection scope so the group object is not mistaken
                // for a cycle by the Resources check below.
                let group_dict = group.as_dict()?;
                self.detector.mark()?;
                if let Some(cs) = self.store.known_get(group_dict, "CS") {
                    let r = self.check_colorspace_for_spots(&cs);
                    let r = self.swallow(r, "form group color space");
                    if r.is_err() {
                        self.detector.cleartomark();
                        return r;
                    }
                }
                self.detector.cleartomark();
            }

            if let Some(resources) = self.store.known_get(xobject, "Resources") {
                self.with_dict(&resources, |s, d| s.check_resources(d))?;
            }
        }

        Ok(())
    }

    fn check_xobject_dict(&mut self, xobject_dict: &Dict) -> Result<()> {
        for value in xobject_dict.values() {
            if let Ok(resolved) = self.store.resolve(value) {
                let r = self.with_dict(&resolved, |s, d| s.check_xobject(d));
                self.swallow(r, "XObject entry")?;
            }
            if self.done_early() {
                return Ok(());
            }
        }
        Ok(())
    }

    /// Check an ExtGState dictionary (or the same keys on an annotation).
    fn check_extgstate(&mut self, gs_dict: &Dict) -> Result<()> {
        // SMask first: if transparency comes from it we can stop before the
        // cheaper checks below.
        if let Some(smask) = self.store.known_get(gs_dict, "SMask") {
            if let Ok(name) = smask.as_name() {
                if name != "None" {
                    self.transparent = true;
                    return Ok(());
                }
            } else if let Ok(smask_dict) = smask.as_dict() {
                self.transparent = true;
                if self.spots.is_some()
                    && let Some(g) = self.store.known_get(smask_dict, "G")
                {
                    let r = self.with_dict(&g, |s, d| s.check_xobject(d));
                    self.swallow(r, "soft mask group")?;
                }
                return Ok(());
            }
        }

        if let Some(bm) = self.store.known_get_name(gs_dict, "BM")
            && bm != "Normal"
            && bm != "Compatible"
        {
            self.transparent = true;
            return Ok(());
        }

        if let Some(ca) = self.store.known_get_number(gs_dict, "CA")
            && ca != 1.0
        {
            self.transparent = true;
            return Ok(());
        }

        if let Some(ca) = self.store.known_get_number(gs_dict, "ca")
            && ca != 1.0
        {
            self.transparent = true;
            return Ok(());
        }

        Ok(())
    }

    fn check_extgstate_dict(&mut self, gs_dict: &Dict) -> Result<()> {
        for value in gs_dict.values() {
            if let Ok(resolved) = self.store.resolve(value) {
                let r = self.with_dict(&resolved, |s, d| s.check_extgstate(d));
                self.swallow(r, "ExtGState entry")?;
            }
            if self.done_early() {
                return Ok(());
            }
        }
        Ok(())
    }

    /// Check one Pattern for spot colorants and transparency.
    fn check_pattern(&mut self, pattern: &Dict) -> Result<()> {
        if self.spots.is_some()
            && let Some(shading) = self.store.known_get(pattern, "Shading")
        {
            let r = self.with_dict(&shading, |s, d| s.check_shading(d));
            self.swallow(r, "pattern shading")?;
        }

        if let Some(resources) = self.store.known_get(pattern, "Resources") {
            let r = self.with_dict(&resources, |s, d| s.check_resources(d));
            self.swallow(r, "pattern resources")?;
        }
        if self.done_early() {
            return Ok(());
        }

        if let Some(gs) = self.store.known_get(pattern, "ExtGState") {
            let r = self.with_dict(&gs, |s, d| s.check_extgstate(d));
            self.swallow(r, "pattern graphics state")?;
        }

        Ok(())
    }

    fn check_pattern_dict(&mut self, pattern_dict: &Dict) -> Result<()> {
        for value in pattern_dict.values() {
            if let Ok(resolved) = self.store.resolve(value) {
                let r = self.with_dict(&resolved, |s, d| s.check_pattern(d));
                self.swallow(r, "Pattern entry")?;
            }
            if self.done_early() {
                return Ok(());
            }
        }
        Ok(())
    }

    /// Only Type3 fonts can carry resources of interest.
    fn check_font(&mut self, font: &Dict) -> Result<()> {
        if let Some(subtype) = self.store.known_get_name(font, "Subtype")
            && subtype == "Type3"
            && let Some(resources) = self.store.known_get(font, "Resources")
        {
            self.with_dict(&resources, |s, d| s.check_resources(d))?;
        }
        Ok(())
    }

    fn check_font_dict(&mut self, font_dict: &Dict) -> Result<()> {
        for value in font_dict.values() {
            if let Ok(resolved) = self.store.resolve(value) {
                let r = self.with_dict(&resolved, |s, d| s.check_font(d));
                self.swallow(r, "Font entry")?;
            }
        }
        Ok(())
    }

    fn check_annots(&mut self, annots: &[Object]) -> Result<()> {
        for entry in annots {
            if let Ok(resolved) = self.store.resolve(entry)
                && resolved.as_dict().is_ok()
            {
                let r = self.with_dict(&resolved, |s, d| s.check_annot(d));
                self.policy(r, "annotation")?;
            }
            if self.done_early() {
                return Ok(());
            }
        }
        Ok(())
    }

    fn check_annot(&mut self, annot: &Dict) -> Result<()> {
        // The normal appearance stream's resources are the only place an
        // annotation can introduce new spot colorants, so they go first;
        // after them, confirmed transparency ends this annotation's checks.
        if let Some(ap) = self.store.known_get(annot, "AP")
            && let Ok(ap_dict) = ap.as_dict()
            && let Some(n) = self.store.known_get(ap_dict, "N")
            && let Ok(n_dict) = n.as_dict()
            && let Some(resources) = self.store.known_get(n_dict, "Resources")
        {
            self.with_dict(&resources, |s, d| s.check_resources(d))?;
        }

        if self.transparent {
            return Ok(());
        }

        let Some(subtype) = self.store.known_get_name(annot, "Subtype") else {
            if self.opts.stop_on_error {
                return Err(RenderError::Undefined("annotation Subtype".into()));
            }
            return Ok(());
        };

        // Highlight annotations always composite with transparency.
        if subtype == "Highlight" {
            self.transparent = true;
            return Ok(());
        }

        if let Some(bm) = self.store.known_get_name(annot, "BM")
            && bm != "Normal"
            && bm != "Compatible"
        {
            self.transparent = true;
            return Ok(());
        }

        if let Some(ca) = self.store.known_get_number(annot, "CA")
            && ca != 1.0
        {
            self.transparent = true;
            return Ok(());
        }

        if let Some(ca) = self.store.known_get_number(annot, "ca")
            && ca != 1.0
        {
            self.transparent = true;
            return Ok(());
        }

        Ok(())
    }

    /// Walk a color space object collecting Separation/DeviceN colorant
    /// names, recursing through Indexed bases, ICCBased alternates and
    /// Pattern bases.
    fn check_colorspace_for_spots(&mut self, obj: &Resolved<'_>) -> Result<()> {
        if self.spots.is_none() {
            return Ok(());
        }
        let Ok(arr) = obj.as_array() else {
            // Names are predefined device spaces; nothing to collect.
            return Ok(());
        };

        self.detector.mark()?;
        let entered = match self.detector.test_and_add(obj.identity()) {
            Ok(v) => v,
            Err(e) => {
                self.detector.cleartomark();
                return Err(e);
            }
        };
        let result = if entered {
            self.check_colorspace_array(arr)
        } else {
            Ok(())
        };
        self.detector.cleartomark();
        result
    }

    fn check_colorspace_array(&mut self, arr: &[Object]) -> Result<()> {
        let Some(first) = arr.first() else {
            return Ok(());
        };
        let Ok(family) = self.store.resolve(first) else {
            return Ok(());
        };
        let Ok(family) = family.as_name() else {
            return Ok(());
        };

        match family {
            "Separation" => {
                if let Some(name_obj) = arr.get(1)
                    && let Ok(resolved) = self.store.resolve(name_obj)
                    && let Ok(name) = resolved.as_name()
                {
                    self.add_spot(name);
                }
            }
            "DeviceN" => {
                if let Some(names_obj) = arr.get(1)
                    && let Ok(resolved) = self.store.resolve(names_obj)
                    && let Ok(names) = resolved.as_array()
                {
                    for n in names {
                        if let Ok(r) = self.store.resolve(n)
                            && let Ok(name) = r.as_name()
                        {
                            self.add_spot(name);
                        }
                    }
                }
            }
            "Indexed" | "I" => {
                if let Some(base) = arr.get(1)
                    && let Ok(resolved) = self.store.resolve(base)
                {
                    self.check_colorspace_for_spots(&resolved)?;
                }
            }
            "ICCBased" => {
                if let Some(stream_obj) = arr.get(1)
                    && let Ok(resolved) = self.store.resolve(stream_obj)
                    && let Ok(dict) = resolved.as_dict()
                    && let Some(alt) = self.store.known_get(dict, "Alternate")
                {
                    self.check_colorspace_for_spots(&alt)?;
                }
            }
            "Pattern" => {
                if let Some(base) = arr.get(1)
                    && let Ok(resolved) = self.store.resolve(base)
                {
                    self.check_colorspace_for_spots(&resolved)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn add_spot(&mut self, name: &str) {
        if NON_SPOT_NAMES.contains(&name) {
            return;
        }
        if let Some(spots) = &mut self.spots {
            spots.insert(name.to_string());
        }
    }
}
