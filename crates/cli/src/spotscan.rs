//! spotscan - report transparency usage and spot colorants for a page graph.
//!
//! Reads a JSON description of a page's object graph (a debugging format,
//! not PDF itself), runs the page check and prints what a separation-capable
//! device would want to know before rendering: whether the transparency
//! compositor is needed and which named inks the page references.
//!
//! Input format:
//!
//! ```json
//! {
//!   "objects": { "10": { "Subtype": "Form", "Group": {} } },
//!   "page": { "Resources": { "XObject": { "F0": { "$ref": 10 } } } }
//! }
//! ```
//!
//! JSON strings become PDF names; `{"$ref": N}` becomes an indirect
//! reference to object N.

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser};
use inkplane_core::interp::check::{CheckOptions, check_page};
use inkplane_core::model::objects::{Dict, ObjRef, Object};
use inkplane_core::model::store::ObjectStore;
use serde_json::Value;
use std::io::Read;
use std::path::PathBuf;

/// Report transparency and spot-colorant usage for a page graph.
#[derive(Parser, Debug)]
#[command(name = "spotscan")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the page-graph JSON file, or "-" for stdin
    input: PathBuf,

    /// Skip spot-colorant collection (transparency only)
    #[arg(long = "no-spots", action = ArgAction::SetTrue)]
    no_spots: bool,

    /// Skip annotation checks
    #[arg(long = "no-annots", action = ArgAction::SetTrue)]
    no_annots: bool,

    /// Escalate errors in individual resources instead of skipping them
    #[arg(long = "stop-on-error", action = ArgAction::SetTrue)]
    stop_on_error: bool,

    /// Use debug logging level
    #[arg(short = 'd', long, action = ArgAction::SetTrue)]
    debug: bool,
}

fn json_to_object(value: &Value) -> Result<Object> {
    Ok(match value {
        Value::Null => Object::Null,
        Value::Bool(b) => Object::Bool(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Object::Int(i)
            } else {
                Object::Real(n.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(s) => Object::Name(s.strip_prefix('/').unwrap_or(s.as_str()).to_string()),
        Value::Array(arr) => {
            Object::Array(arr.iter().map(json_to_object).collect::<Result<Vec<_>>>()?)
        }
        Value::Object(map) => {
            if map.len() == 1
                && let Some(r) = map.get("$ref")
            {
                let objid = r
                    .as_u64()
                    .context("$ref must be a non-negative object number")?;
                Object::Ref(ObjRef::new(objid as u32, 0))
            } else {
                Object::Dict(json_to_dict(map)?)
            }
        }
    })
}

fn json_to_dict(map: &serde_json::Map<String, Value>) -> Result<Dict> {
    let mut dict = Dict::new();
    for (k, v) in map {
        dict.insert(k.clone(), json_to_object(v)?);
    }
    Ok(dict)
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

    let text = if args.input.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(&args.input)
            .with_context(|| format!("cannot read {}", args.input.display()))?
    };

    let root: Value = serde_json::from_str(&text).context("invalid JSON input")?;
    let Some(page_value) = root.get("page") else {
        bail!("input has no \"page\" entry");
    };
    let page = match json_to_object(page_value)? {
        Object::Dict(d) => d,
        other => bail!("\"page\" must be a dictionary, got {}", other.type_name()),
    };

    let mut store = ObjectStore::new();
    if let Some(objects) = root.get("objects").and_then(Value::as_object) {
        for (id, v) in objects {
            let objid: u32 = id
                .parse()
                .with_context(|| format!("bad object id {id:?}"))?;
            store.insert(objid, json_to_object(v)?);
        }
    }

    let options = CheckOptions {
        track_spots: !args.no_spots,
        render_annotations: !args.no_annots,
        stop_on_error: args.stop_on_error,
    };
    let result = check_page(&store, &page, &options)
        .map_err(|e| anyhow::anyhow!("page check failed: {e} (assume transparency)"))?;

    let report = serde_json::json!({
        "transparent": result.transparent,
        "num_spots": result.num_spots(),
        "spot_colors": result.spot_names.iter().collect::<Vec<_>>(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
