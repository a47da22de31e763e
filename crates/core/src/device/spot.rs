//! Spot-color raster device.
//!
//! A printer-class device with a constant component count of up to 7 (CMYK
//! plus at most 3 named inks), one bit per component packed into a single
//! chunky output byte. Rendered bands are written straight to a seekable
//! output file from multiple worker threads, and pixels that were actually
//! painted (as opposed to page clearing) carry a marker bit so a downstream
//! process can build knockout overlays. Optionally accumulates which inks
//! were ever used on the page and appends a machine-readable report line.

use crate::device::output::{self, OutputFile, OutputKind};
use crate::device::raster::{BandRect, BitsSource};
use crate::device::{
    ColorInfo, ColorValue, DeviceParams, DevnParams, EquivColorParams, GraphicsTag, MAX_COMPONENTS,
    MAX_SPOTS, NUM_PROCESS_COMPONENTS, ParamUpdate, SeparationDevice,
};
use crate::error::{RenderError, Result};
use std::collections::BTreeMap;
use std::io::{Seek, SeekFrom, Write};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use tracing::{debug, warn};

/// Color channels this device packs (process + spot).
pub const COMPONENT_COUNT: usize = NUM_PROCESS_COMPONENTS + MAX_SPOTS;

/// Marker ORed onto every pixel that is an opaque mark rather than a
/// background fill.
pub const PAINTED_MARKER: u8 = 0x80;

/// Size caps on the queued-output and report file names.
const NEXT_FNAME_MAX: usize = 256;
const REPORT_FNAME_MAX: usize = 4096;

/// The spot-color banded raster device.
///
/// `graphic_type_tag_valid` is true only on instances that went through the
/// live `open()` path. Copies made for command-list playback must be
/// constructed with [`SpotColorDevice::playback_copy`], which forces the
/// flag false: during playback the graphics tag is stale, but encode calls
/// in that state only ever combine halftone tiles from recorded pixel
/// values, never background fills, so the untouched-tag test is safely
/// skipped.
#[derive(Debug, Clone)]
pub struct SpotColorDevice {
    pub width: u32,
    pub height: u32,
    color_info: ColorInfo,
    devn: DevnParams,
    equiv: EquivColorParams,
    graphic_type_tag_valid: bool,
    graphics_type_tag: GraphicsTag,
    is_open: bool,
    /// Active output file name (may contain a page-number format).
    fname: String,
    /// Output name queued to become active at the next page boundary.
    next_fname: String,
    /// Ink-usage report path; empty disables the report.
    report_fname: String,
    lock_safety_params: bool,
    page_count: i64,
    /// Rows per band for page processing.
    band_height: usize,
    /// Worker threads for band processing; 0 picks the pool default.
    render_threads: usize,
}

impl SpotColorDevice {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            color_info: ColorInfo::default(),
            devn: DevnParams::default(),
            equiv: EquivColorParams::default(),
            graphic_type_tag_valid: false,
            graphics_type_tag: GraphicsTag::Untouched,
            is_open: false,
            fname: String::new(),
            next_fname: String::new(),
            report_fname: String::new(),
            lock_safety_params: false,
            page_count: 0,
            band_height: 64,
            render_threads: 0,
        }
    }

    /// Duplicate this device for command-list playback.
    ///
    /// The copy never goes through `open()`, so its graphics tag cannot be
    /// trusted; the validity flag is forced off rather than inherited.
    pub fn playback_copy(&self) -> Self {
        let mut copy = self.clone();
        copy.graphic_type_tag_valid = false;
        copy
    }

    pub fn set_output_file(&mut self, name: &str) {
        self.fname = name.to_string();
    }

    pub fn set_band_height(&mut self, rows: usize) {
        self.band_height = rows.max(1);
    }

    pub fn set_render_threads(&mut self, threads: usize) {
        self.render_threads = threads;
    }

    pub fn set_lock_safety_params(&mut self, lock: bool) {
        self.lock_safety_params = lock;
    }

    /// Classify subsequent drawing operations for the encode-time
    /// background-fill test.
    pub fn set_graphics_tag(&mut self, tag: GraphicsTag) {
        self.graphics_type_tag = tag;
    }

    pub fn num_components(&self) -> usize {
        self.color_info.num_components
    }

    pub fn page_count(&self) -> i64 {
        self.page_count
    }

    /// Bit shift and mask tables for the separable-and-linear packed
    /// layout: component 0 occupies the least significant bits.
    fn set_linear_color_bits_mask_shift(&mut self) {
        let bpc = self.devn.bits_per_component;
        for i in 0..MAX_COMPONENTS {
            if i < self.color_info.num_components {
                let shift = i as u8 * bpc;
                self.color_info.comp_bits[i] = bpc;
                self.color_info.comp_shift[i] = shift;
                self.color_info.comp_mask[i] = (((1u16 << bpc) - 1) << shift) as u8;
            } else {
                self.color_info.comp_bits[i] = 0;
                self.color_info.comp_shift[i] = 0;
                self.color_info.comp_mask[i] = 0;
            }
        }
    }
}

impl SpotColorDevice {
    /// The DeviceN slice of the parameter protocol: spot count, separation
    /// names, and the (ignored) depth request.
    fn apply_devn_params(&mut self, update: &ParamUpdate) -> Result<()> {
        if let Some(spots) = update.page_spot_colors {
            if spots < -1 {
                return Err(RenderError::RangeCheck(format!("PageSpotColors {spots}")));
            }
            self.devn.page_spot_colors = spots;
            if spots >= 0 {
                self.color_info.num_components =
                    NUM_PROCESS_COMPONENTS + (spots as usize).min(MAX_SPOTS);
            }
        }

        if let Some(names) = &update.separation_names {
            if names.len() > MAX_SPOTS {
                return Err(RenderError::LimitCheck(format!(
                    "{} separations, device carries at most {MAX_SPOTS}",
                    names.len()
                )));
            }
            self.devn.separations = names.clone();
            self.color_info.num_components = NUM_PROCESS_COMPONENTS + names.len();
        }

        if let Some(bpp) = update.bits_per_pixel {
            if !(1..=64).contains(&bpp) {
                return Err(RenderError::RangeCheck(format!("BitsPerPixel {bpp}")));
            }
            // Recomputed here the way the generic machinery would; the
            // caller forces it back to 8 immediately after.
            self.color_info.depth = bpp as u8;
        }

        Ok(())
    }
}

/// Round a full-scale component value down to `bpc` bits.
fn colround(value: ColorValue, bpc: u8) -> u8 {
    (((value as u32) * ((1u32 << bpc) - 1) + 0x7fff) / 0xffff) as u8
}

/// Expand a `bpc`-bit component back to full scale.
fn coldup(bits: u8, bpc: u8) -> ColorValue {
    ((bits as u32 * 0xffff) / ((1u32 << bpc) - 1)) as ColorValue
}

impl SeparationDevice for SpotColorDevice {
    /// Open the device for live rendering.
    ///
    /// Every plane is one bit deep regardless of what parameter traffic
    /// claimed earlier, and the graphics tag becomes trustworthy from here
    /// on (playback copies never run this).
    fn open(&mut self) -> Result<()> {
        for k in 0..MAX_COMPONENTS {
            self.color_info.comp_bits[k] = 1;
        }
        self.graphic_type_tag_valid = true;
        self.set_linear_color_bits_mask_shift();
        self.color_info.depth = 8;
        self.is_open = true;
        debug!(
            components = self.color_info.num_components,
            "spot device opened"
        );
        Ok(())
    }

    /// Pack component values, component 0 least significant, and mark the
    /// pixel as painted unless this call is the page-clearing background
    /// fill. The untouched-tag test only runs while the tag is valid; in
    /// playback state the remaining encode traffic is halftone-tile
    /// combination, which must always carry the marker.
    fn encode_color(&self, components: &[ColorValue]) -> u8 {
        let bpc = self.devn.bits_per_component;
        let ncomp = self.color_info.num_components.min(COMPONENT_COUNT);
        let mut color: u32 = 0;
        for i in (0..ncomp).rev() {
            color <<= bpc;
            color |= u32::from(colround(components.get(i).copied().unwrap_or(0), bpc));
        }

        let is_fillpage =
            self.graphic_type_tag_valid && self.graphics_type_tag == GraphicsTag::Untouched;
        color as u8 | if is_fillpage { 0 } else { PAINTED_MARKER }
    }

    /// Unpack a pixel into component values. The marker bit is stripped
    /// first and never shows up in the components.
    fn decode_color(&self, color: u8) -> Vec<ColorValue> {
        let bpc = self.devn.bits_per_component;
        let mask = ((1u16 << bpc) - 1) as u8;
        let ncomp = self.color_info.num_components.min(COMPONENT_COUNT);
        let mut color = color & !PAINTED_MARKER;
        let mut out = vec![0; ncomp];
        for slot in out.iter_mut() {
            *slot = coldup(color & mask, bpc);
            color >>= bpc;
        }
        out
    }

    fn get_params(&self) -> DeviceParams {
        DeviceParams {
            next_output_file: self.next_fname.clone(),
            report_file: self.report_fname.clone(),
            page_spot_colors: self.devn.page_spot_colors,
            separations: self.devn.separations.clone(),
            bits_per_pixel: i32::from(self.color_info.depth),
            num_components: self.color_info.num_components,
            width: self.width,
            height: self.height,
        }
    }

    /// Apply a parameter batch.
    ///
    /// The two file-name parameters are validated up front (size cap,
    /// safety lock, format check) so a rejected batch leaves no trace. A
    /// structural change to the color configuration closes the device and
    /// recomputes the packing tables; the caller must reopen.
    fn put_params(&mut self, update: &ParamUpdate) -> Result<bool> {
        if let Some(next) = &update.next_output_file {
            if next.len() >= NEXT_FNAME_MAX {
                return Err(RenderError::LimitCheck(format!(
                    "NextOutputFile longer than {NEXT_FNAME_MAX}"
                )));
            }
            if self.lock_safety_params && *next != self.next_fname {
                return Err(RenderError::InvalidAccess(
                    "NextOutputFile is locked".into(),
                ));
            }
            output::validate_output_file(next)?;
        }
        if let Some(report) = &update.report_file {
            if report.len() >= REPORT_FNAME_MAX {
                return Err(RenderError::LimitCheck(format!(
                    "ReportFile longer than {REPORT_FNAME_MAX}"
                )));
            }
            if self.lock_safety_params && *report != self.report_fname {
                return Err(RenderError::InvalidAccess("ReportFile is locked".into()));
            }
            output::validate_output_file(report)?;
        }

        // Save current data in case we have a problem.
        let save_info = self.color_info.clone();
        let save_devn = self.devn.clone();
        let save_equiv = self.equiv.clone();

        let applied = self.apply_devn_params(update);
        // The depth is a fixed capability of this device; whatever the
        // generic recomputation produced is overridden right here.
        self.color_info.depth = 8;

        if let Err(e) = applied {
            self.color_info = save_info;
            self.devn = save_devn;
            self.equiv = save_equiv;
            return Err(e);
        }

        let mut closed = false;
        if self.color_info != save_info || self.devn != save_devn || self.equiv != save_equiv {
            self.close()?;
            closed = true;
            self.set_linear_color_bits_mask_shift();
        }

        // All validation passed; commit the pre-validated names.
        if let Some(next) = &update.next_output_file {
            self.next_fname = next.clone();
        }
        if let Some(report) = &update.report_file {
            self.report_fname = report.clone();
        }

        Ok(closed)
    }

    /// Promote a queued output name, render the page's bands and emit the
    /// report. The queued-name promotion happens here, not when the
    /// parameter is set, so the interpreter thread never blocks on the
    /// renderer's file handling.
    fn output_page(&mut self, src: &dyn BitsSource, _num_copies: i32, _flush: bool) -> Result<()> {
        if !self.is_open {
            return Err(RenderError::InvalidAccess("device is not open".into()));
        }
        if !self.next_fname.is_empty() {
            self.fname = self.next_fname.clone();
        }

        let mut out = output::open_output_file(&self.fname, self.page_count + 1)?;
        let mut outcome = self.process_page(src, &mut out);
        if let Err(e) = out.finish()
            && outcome.error.is_none()
        {
            outcome.error = Some(e);
        }

        if !self.report_fname.is_empty()
            && let Err(e) = self.write_report(&outcome)
        {
            warn!(error = %e, "failed to write usage report");
        }

        self.page_count += 1;
        match outcome.error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn close(&mut self) -> Result<()> {
        // Separation name storage lives in `devn` and is released with the
        // device regardless of whether open ever succeeded.
        self.is_open = false;
        Ok(())
    }
}

/// Shared state for one page's band processing.
struct ProcessState {
    accumulate: bool,
    failed: AtomicBool,
    error: Mutex<Option<RenderError>>,
    usage: AtomicU8,
}

impl ProcessState {
    fn record_error(&self, e: RenderError) {
        if !self.failed.swap(true, Ordering::SeqCst) {
            let mut slot = match self.error.lock() {
                Ok(g) => g,
                Err(p) => p.into_inner(),
            };
            *slot = Some(e);
        }
    }
}

/// Result of processing one page.
pub struct ProcessOutcome {
    pub error: Option<RenderError>,
    /// Per-separation "ink ever used" bitmap: process colors in the low
    /// bits, then spots, marker bit masked off.
    pub usage: u8,
}

enum BandWriter<'a> {
    /// Seekable target: every band writes at its own page offset.
    Positioned(Mutex<&'a mut std::fs::File>),
    /// Non-seekable target: bands are buffered and drained in page order.
    Ordered(Mutex<BTreeMap<usize, Vec<u8>>>),
}

impl SpotColorDevice {
    /// Run the page's bands through a fixed-size worker pool. Bands may
    /// complete in any order; output correctness comes from each band
    /// writing at its own file offset (or from the ordered drain when the
    /// target cannot seek).
    fn process_page(&self, src: &dyn BitsSource, out: &mut OutputFile) -> ProcessOutcome {
        let width = self.width as usize;
        let height = self.height as usize;
        let state = ProcessState {
            accumulate: !self.report_fname.is_empty(),
            failed: AtomicBool::new(false),
            error: Mutex::new(None),
            usage: AtomicU8::new(0),
        };

        if width == 0 || height == 0 {
            return ProcessOutcome {
                error: None,
                usage: 0,
            };
        }

        let band_h = self.band_height.max(1);
        let bands: Vec<BandRect> = (0..height)
            .step_by(band_h)
            .map(|y0| BandRect {
                x0: 0,
                y0,
                x1: width,
                y1: (y0 + band_h).min(height),
            })
            .collect();

        let writer = match &mut out.kind {
            OutputKind::File(f) => BandWriter::Positioned(Mutex::new(f)),
            _ => BandWriter::Ordered(Mutex::new(BTreeMap::new())),
        };

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.render_threads)
            .build();
        let pool = match pool {
            Ok(p) => p,
            Err(e) => {
                return ProcessOutcome {
                    error: Some(RenderError::LimitCheck(format!(
                        "cannot start band workers: {e}"
                    ))),
                    usage: 0,
                };
            }
        };

        pool.install(|| {
            use rayon::prelude::*;
            bands.par_iter().for_each_init(
                // One scratch buffer per worker, sized for the largest band.
                || vec![0u8; width * band_h],
                |scratch, band| self.process_band(&state, src, band, scratch, &writer),
            );
        });

        // Ordered drain for non-seekable targets.
        if let BandWriter::Ordered(buffers) = writer {
            let buffers = match buffers.into_inner() {
                Ok(b) => b,
                Err(p) => p.into_inner(),
            };
            let result = match &mut out.kind {
                OutputKind::Stdout(s) => {
                    let mut lock = s.lock();
                    buffers.values().try_for_each(|b| lock.write_all(b))
                }
                OutputKind::Pipe(child) => match child.stdin.as_mut() {
                    Some(stdin) => buffers.values().try_for_each(|b| stdin.write_all(b)),
                    None => Ok(()),
                },
                OutputKind::File(_) => unreachable!("positioned writer handled above"),
            };
            if let Err(e) = result {
                state.record_error(RenderError::Io(e));
            }
        }

        let error = match state.error.lock() {
            Ok(mut g) => g.take(),
            Err(p) => p.into_inner().take(),
        };
        ProcessOutcome {
            error,
            usage: state.usage.load(Ordering::SeqCst),
        }
    }

    /// Process one band: pull its packed pixels, compact away any stride
    /// padding, write it at its page offset, and fold its bytes into the
    /// usage accumulator. Thread-safe and order-independent.
    fn process_band(
        &self,
        state: &ProcessState,
        src: &dyn BitsSource,
        band: &BandRect,
        scratch: &mut [u8],
        writer: &BandWriter<'_>,
    ) {
        // Fail fast once a sibling band has failed; in-flight work is not
        // aborted but new bands skip straight out.
        if state.failed.load(Ordering::SeqCst) {
            return;
        }

        let w = band.width();
        let h = band.height();
        let stride = src.raster();
        let bits = match src.get_bits_rectangle(band) {
            Ok(b) => b,
            Err(e) => {
                state.record_error(e);
                return;
            }
        };

        // Force the stride down to the logical width if the renderer
        // padded its rows.
        let tight: &[u8] = if stride != w {
            for r in 0..h {
                let so = r * stride;
                scratch[r * w..(r + 1) * w].copy_from_slice(&bits[so..so + w]);
            }
            &scratch[..w * h]
        } else {
            &bits[..w * h]
        };

        match writer {
            BandWriter::Positioned(file) => {
                let ofs = (band.y0 * w) as u64;
                let mut file = match file.lock() {
                    Ok(g) => g,
                    Err(p) => p.into_inner(),
                };
                let wrote = file
                    .seek(SeekFrom::Start(ofs))
                    .and_then(|_| file.write_all(tight));
                if let Err(e) = wrote {
                    state.record_error(RenderError::Io(e));
                    return;
                }
            }
            BandWriter::Ordered(buffers) => {
                let mut buffers = match buffers.lock() {
                    Ok(g) => g,
                    Err(p) => p.into_inner(),
                };
                buffers.insert(band.y0, tight.to_vec());
            }
        }

        if state.accumulate {
            state
                .usage
                .fetch_or(or_fold(tight) & !PAINTED_MARKER, Ordering::SeqCst);
        }
    }

    /// Append the page's report line: output name, status code and string,
    /// page dimensions, one field per spot-name slot (blank when unused)
    /// and the usage bitmap, tab separated and CRLF terminated.
    fn write_report(&self, outcome: &ProcessOutcome) -> Result<()> {
        let mut w = output::open_report_file(&self.report_fname)?;
        let (code, status) = match &outcome.error {
            Some(e) => (e.code(), e.status_str()),
            None => (0, "OK"),
        };
        write!(
            w,
            "{}\t{}\t{}\t{}\t{}\t",
            self.fname, code, status, self.width, self.height
        )?;

        // Separation order never changes on this device, so the map is not
        // consulted here.
        let spot_fields = self.devn.max_separations - self.devn.num_std_colorant_names;
        for i in 0..spot_fields {
            if let Some(name) = self.devn.separations.get(i) {
                w.write_all(name.as_bytes())?;
            }
            w.write_all(b"\t")?;
        }

        write!(w, "{}", outcome.usage)?;
        w.write_all(b"\r\n")?;
        w.flush()?;
        Ok(())
    }
}

/// Bitwise-OR of every byte in the band, word-parallel for throughput.
fn or_fold(data: &[u8]) -> u8 {
    let mut chunks = data.chunks_exact(8);
    let mut accum: u64 = 0;
    for chunk in chunks.by_ref() {
        let mut word = [0u8; 8];
        word.copy_from_slice(chunk);
        accum |= u64::from_le_bytes(word);
    }
    let mut out = chunks.remainder().iter().fold(0u8, |a, &b| a | b);
    for i in 0..8 {
        out |= (accum >> (i * 8)) as u8;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_device(spots: i32) -> SpotColorDevice {
        let mut dev = SpotColorDevice::new(8, 8);
        dev.put_params(&ParamUpdate {
            page_spot_colors: Some(spots),
            ..Default::default()
        })
        .unwrap();
        dev.open().unwrap();
        dev
    }

    #[test]
    fn encode_marks_painted_pixels() {
        let mut dev = open_device(1);
        dev.set_graphics_tag(GraphicsTag::Vector);
        // Cyan + spot 1 at full value.
        let packed = dev.encode_color(&[0xffff, 0, 0, 0, 0xffff]);
        assert_eq!(packed, 0x11 | PAINTED_MARKER);
    }

    #[test]
    fn background_fill_is_not_marked_when_tag_is_valid() {
        let mut dev = open_device(0);
        dev.set_graphics_tag(GraphicsTag::Untouched);
        assert_eq!(dev.encode_color(&[0, 0, 0, 0]), 0x00);
        dev.set_graphics_tag(GraphicsTag::Text);
        assert_eq!(dev.encode_color(&[0, 0, 0, 0]), PAINTED_MARKER);
    }

    #[test]
    fn playback_copy_always_marks() {
        let mut dev = open_device(0);
        dev.set_graphics_tag(GraphicsTag::Untouched);
        let copy = dev.playback_copy();
        // Halftone combination during playback must produce marked pixels
        // even though the stale tag still says untouched.
        assert_eq!(copy.encode_color(&[0, 0, 0, 0]), PAINTED_MARKER);
    }

    #[test]
    fn encode_decode_roundtrip() {
        let mut dev = open_device(3);
        dev.set_graphics_tag(GraphicsTag::Image);
        for pattern in 0u8..(1 << 7) {
            let comps: Vec<ColorValue> = (0..7)
                .map(|i| if pattern & (1 << i) != 0 { 0xffff } else { 0 })
                .collect();
            let packed = dev.encode_color(&comps);
            assert_eq!(packed & PAINTED_MARKER, PAINTED_MARKER);
            assert_eq!(dev.decode_color(packed), comps);
        }
    }

    #[test]
    fn marker_never_leaks_into_components() {
        let dev = open_device(0);
        assert_eq!(dev.decode_color(PAINTED_MARKER), vec![0, 0, 0, 0]);
    }

    #[test]
    fn or_fold_matches_naive_fold() {
        let data: Vec<u8> = (0..37).map(|i| (i * 7) as u8).collect();
        let naive = data.iter().fold(0u8, |a, &b| a | b);
        assert_eq!(or_fold(&data), naive);
    }

    #[test]
    fn put_params_rejects_oversized_names() {
        let mut dev = SpotColorDevice::new(8, 8);
        let long = "x".repeat(NEXT_FNAME_MAX);
        let err = dev
            .put_params(&ParamUpdate {
                next_output_file: Some(long),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, RenderError::LimitCheck(_)));
    }

    #[test]
    fn put_params_honors_safety_lock() {
        let mut dev = SpotColorDevice::new(8, 8);
        dev.set_lock_safety_params(true);
        let err = dev
            .put_params(&ParamUpdate {
                next_output_file: Some("other.raw".into()),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, RenderError::InvalidAccess(_)));
    }

    #[test]
    fn spot_count_change_closes_the_device() {
        let mut dev = open_device(0);
        assert_eq!(dev.num_components(), 4);
        let closed = dev
            .put_params(&ParamUpdate {
                page_spot_colors: Some(2),
                ..Default::default()
            })
            .unwrap();
        assert!(closed);
        assert_eq!(dev.num_components(), 6);
    }

    #[test]
    fn depth_change_attempts_are_overridden() {
        let mut dev = open_device(0);
        let closed = dev
            .put_params(&ParamUpdate {
                bits_per_pixel: Some(16),
                ..Default::default()
            })
            .unwrap();
        // Forced back to 8 before comparison, so nothing changed.
        assert!(!closed);
        assert_eq!(dev.get_params().bits_per_pixel, 8);
    }
}
