//! `satdump-core` CLI: a small `clap`-based binary driving
//! [`satdump_core::pipeline::run`] against a JSON pipeline description and
//! an input file — the Rust-native analogue of SatDump's `satdump-cli`
//! (SPEC_FULL.md §2 "CLI surface").
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{info, warn};

use satdump_core::pipeline::{self, Registry};

#[derive(clap::Parser, Debug)]
#[command(version, about = "Run a satdump-core pipeline against an input file")]
struct Opt {
    /// Path to a pipeline description document (`pipelines.json`).
    pipelines: PathBuf,

    /// Name of the pipeline to run within that document.
    #[arg(long)]
    pipeline: String,

    /// Input file (baseband capture or a file already at `input_level`).
    input: PathBuf,

    /// Output directory; created if missing.
    output: PathBuf,

    /// Level name the input file is already at.
    #[arg(long, default_value = "baseband")]
    input_level: String,

    /// Disable opportunistic fusion of the first two pipeline steps.
    #[arg(long)]
    disable_multi_modules: bool,

    /// Extra runtime parameter overrides, `key=value` (numbers/bools
    /// parsed as JSON scalars, otherwise kept as strings). Repeatable.
    #[arg(long = "param", value_name = "KEY=VALUE")]
    params: Vec<String>,

    /// Verbosity of debug messages.
    #[arg(short, default_value = "0")]
    verbose: usize,
}

fn parse_params(raw: &[String]) -> Result<serde_json::Value> {
    let mut map = serde_json::Map::new();
    for entry in raw {
        let (key, value) = entry
            .split_once('=')
            .with_context(|| format!("parameter '{entry}' is not in key=value form"))?;
        let parsed = serde_json::from_str(value).unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
        map.insert(key.to_string(), parsed);
    }
    Ok(serde_json::Value::Object(map))
}

fn main() -> Result<()> {
    let opt = Opt::parse();
    stderrlog::new()
        .module(module_path!())
        .module("satdump_core")
        .quiet(false)
        .verbosity(opt.verbose)
        .timestamp(stderrlog::Timestamp::Second)
        .init()?;

    ctrlc::set_handler(move || {
        warn!("Got Ctrl-C, exiting");
        std::process::exit(130);
    })
    .context("failed to set Ctrl-C handler")?;

    let mut registry = Registry::new();
    pipeline::register_builtins(&mut registry);

    let descs = pipeline::load_pipelines(&opt.pipelines, &registry)
        .with_context(|| format!("loading pipeline description {}", opt.pipelines.display()))?;
    let Some(desc) = descs.into_iter().find(|d| d.name == opt.pipeline) else {
        bail!(
            "pipeline '{}' not found (or skipped for an unregistered module) in {}",
            opt.pipeline,
            opt.pipelines.display()
        );
    };

    let mut parameters = parse_params(&opt.params)?;
    if opt.disable_multi_modules {
        parameters
            .as_object_mut()
            .expect("constructed as an object in parse_params")
            .insert("disable_multi_modules".to_string(), serde_json::Value::Bool(true));
    }

    info!("running pipeline '{}' from level '{}'", desc.name, opt.input_level);
    let outputs = pipeline::run(&desc, &registry, &opt.input, &opt.output, &opt.input_level, &parameters)?;
    for path in &outputs {
        println!("{path}");
    }
    Ok(())
}
