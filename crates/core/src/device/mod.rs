//! Raster output devices.
//!
//! This module contains:
//! - `spot`: the spot-color (CMYK + up to 3 named inks) banded raster device
//! - `raster`: band geometry and the packed-pixel page source interface
//! - `output`: output filename templating and file opening
//!
//! The historical device interface is a huge procedure table of which a
//! separation printer overrides a handful of entries; here that collapses to
//! the `SeparationDevice` trait with default implementations for everything
//! a concrete device does not care about.

pub mod output;
pub mod raster;
pub mod spot;

use crate::error::Result;
use raster::BitsSource;

// Re-export main types for convenience
pub use spot::SpotColorDevice;

/// Full-scale color component value (white = 0, full ink = 0xffff for a
/// subtractive device).
pub type ColorValue = u16;

/// Upper bound on packed components (7 color channels + the marker bit fill
/// one byte).
pub const MAX_COMPONENTS: usize = 8;

/// Maximum number of spot colorants the spot device carries.
pub const MAX_SPOTS: usize = 3;

/// Process colorant count (CMYK).
pub const NUM_PROCESS_COMPONENTS: usize = 4;

/// Names of the process colorants, in channel order.
pub const PROCESS_COLORANT_NAMES: [&str; NUM_PROCESS_COMPONENTS] =
    ["Cyan", "Magenta", "Yellow", "Black"];

/// Graphics object classification accompanying each drawing operation.
///
/// `Untouched` is the page-clearing sentinel: encode calls carrying it are
/// background fills, not marks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GraphicsTag {
    #[default]
    Untouched,
    Vector,
    Image,
    Text,
}

/// Per-channel packing description of the device's chunky pixel format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorInfo {
    /// Active color channels (4 process + configured spots).
    pub num_components: usize,
    /// Total bits per pixel. Fixed at 8 for the spot device.
    pub depth: u8,
    pub comp_bits: [u8; MAX_COMPONENTS],
    pub comp_shift: [u8; MAX_COMPONENTS],
    pub comp_mask: [u8; MAX_COMPONENTS],
}

impl Default for ColorInfo {
    fn default() -> Self {
        Self {
            num_components: NUM_PROCESS_COMPONENTS,
            depth: 8,
            comp_bits: [1; MAX_COMPONENTS],
            comp_shift: [0; MAX_COMPONENTS],
            comp_mask: [0; MAX_COMPONENTS],
        }
    }
}

/// Multi-separation device parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevnParams {
    /// Bits per color component in the packed pixel.
    pub bits_per_component: u8,
    /// Names of the standard (process) colorants.
    pub std_colorant_names: &'static [&'static str],
    /// Count of standard (process) colorant names.
    pub num_std_colorant_names: usize,
    /// Hard cap on total separations (process + spot).
    pub max_separations: usize,
    /// Spot count negotiated for the coming page; -1 when unspecified.
    pub page_spot_colors: i32,
    /// Names of the spot separations, in plane order after the process set.
    pub separations: Vec<String>,
    /// Channel reordering map (identity for this device).
    pub separation_order_map: [u8; MAX_COMPONENTS],
}

impl Default for DevnParams {
    fn default() -> Self {
        Self {
            bits_per_component: 1,
            std_colorant_names: &PROCESS_COLORANT_NAMES,
            num_std_colorant_names: NUM_PROCESS_COMPONENTS,
            max_separations: NUM_PROCESS_COMPONENTS + MAX_SPOTS,
            page_spot_colors: -1,
            separations: Vec::new(),
            separation_order_map: [0, 1, 2, 3, 4, 5, 6, 7],
        }
    }
}

/// CMYK rendering equivalent of one spot colorant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EquivCmykColor {
    pub valid: bool,
    pub c: i32,
    pub m: i32,
    pub y: i32,
    pub k: i32,
}

/// Equivalent-CMYK table for all separations.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EquivColorParams {
    pub all_valid: bool,
    pub colors: [EquivCmykColor; MAX_COMPONENTS],
}

/// A batch of parameter changes. Unset fields keep their current values.
#[derive(Debug, Clone, Default)]
pub struct ParamUpdate {
    /// Output file name queued for promotion at the next page boundary.
    pub next_output_file: Option<String>,
    /// Ink-usage report path; empty disables reporting.
    pub report_file: Option<String>,
    /// Spot colorants expected on the coming page.
    pub page_spot_colors: Option<i32>,
    /// Explicit spot separation names.
    pub separation_names: Option<Vec<String>>,
    /// Attempted pixel-depth change. The spot device treats its depth as a
    /// fixed capability and overrides this back to 8.
    pub bits_per_pixel: Option<i32>,
}

/// Read-side snapshot of the device parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceParams {
    pub next_output_file: String,
    pub report_file: String,
    pub page_spot_colors: i32,
    pub separations: Vec<String>,
    pub bits_per_pixel: i32,
    pub num_components: usize,
    pub width: u32,
    pub height: u32,
}

/// Capability interface of a separable-and-linear multi-component printer
/// device. Only the methods a concrete device actually overrides appear
/// here; everything else the generic machinery used to carry is gone.
pub trait SeparationDevice {
    /// Open the device for live rendering.
    fn open(&mut self) -> Result<()>;

    /// Pack component values into a single pixel index.
    fn encode_color(&self, components: &[ColorValue]) -> u8;

    /// Unpack a pixel index into component values.
    fn decode_color(&self, color: u8) -> Vec<ColorValue>;

    /// Read the device parameters.
    fn get_params(&self) -> DeviceParams;

    /// Apply a parameter batch transactionally. Returns true if the change
    /// required closing the device (the caller must reopen before the next
    /// page).
    fn put_params(&mut self, update: &ParamUpdate) -> Result<bool>;

    /// Render one finished page to the output file.
    fn output_page(&mut self, src: &dyn BitsSource, num_copies: i32, flush: bool) -> Result<()>;

    /// Close the device.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
