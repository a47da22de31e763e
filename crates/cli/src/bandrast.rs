//! bandrast - drive the spot-color raster device over a synthetic page.
//!
//! A smoke-test harness for the banded output path: renders a deterministic
//! test pattern into an in-memory page raster, then pushes it through the
//! device with a chosen band height and worker count. Useful for comparing
//! single- and multi-band output and for exercising the ink-usage report
//! without a full interpreter in front.

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use inkplane_core::device::raster::PageRaster;
use inkplane_core::device::spot::{PAINTED_MARKER, SpotColorDevice};
use inkplane_core::device::{ParamUpdate, SeparationDevice};

/// Render a synthetic page through the spot-color raster device.
#[derive(Parser, Debug)]
#[command(name = "bandrast")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Output file (supports %d page substitution, %stdout%, %pipe%cmd)
    output: String,

    /// Page width in pixels
    #[arg(long, default_value = "600")]
    width: u32,

    /// Page height in pixels
    #[arg(long, default_value = "800")]
    height: u32,

    /// Comma-separated spot colorant names (at most 3)
    #[arg(long = "spots", value_delimiter = ',')]
    spots: Vec<String>,

    /// Ink-usage report file (appended per page)
    #[arg(long)]
    report: Option<String>,

    /// Rows per band
    #[arg(long = "band-height", default_value = "64")]
    band_height: usize,

    /// Worker threads (0 = automatic)
    #[arg(long, default_value = "0")]
    threads: usize,

    /// Number of pages to render
    #[arg(long, default_value = "1")]
    pages: u32,

    /// Use debug logging level
    #[arg(short = 'd', long, action = ArgAction::SetTrue)]
    debug: bool,
}

/// Diagonal stripes cycling through the active channels, every pixel
/// marked as painted.
fn test_pattern(width: u32, height: u32, ncomps: usize) -> PageRaster {
    let mut page = PageRaster::new(width as usize, height as usize);
    for y in 0..height as usize {
        for x in 0..width as usize {
            let channel = ((x + y) / 16) % ncomps;
            page.set_pixel(x, y, (1 << channel) | PAINTED_MARKER);
        }
    }
    page
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.debug { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut dev = SpotColorDevice::new(args.width, args.height);
    dev.put_params(&ParamUpdate {
        separation_names: (!args.spots.is_empty()).then(|| args.spots.clone()),
        report_file: args.report.clone(),
        ..Default::default()
    })
    .context("device parameters rejected")?;
    dev.set_output_file(&args.output);
    dev.set_band_height(args.band_height);
    dev.set_render_threads(args.threads);
    dev.open().map_err(|e| anyhow::anyhow!("open failed: {e}"))?;

    let page = test_pattern(args.width, args.height, dev.num_components());
    for _ in 0..args.pages {
        dev.output_page(&page, 1, true)
            .map_err(|e| anyhow::anyhow!("page output failed: {e}"))?;
    }

    eprintln!(
        "{} page(s) of {}x{} written to {}",
        args.pages, args.width, args.height, args.output
    );
    Ok(())
}
