//! Prepare one z-stack for per-slice 2D inference.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use zstack_prep::manifest::{self, RunManifest};
use zstack_prep::pipeline::{self, OutputLayout, PrepareParams};

/// Resample one z-stack to a target z spacing and cut it into per-slice
/// multi-channel cases for 2D inference. Any failure is fatal; use
/// prepare_bulk for skip-and-record behavior over a directory tree.
#[derive(Parser, Debug)]
#[command(author, about, version, long_about)]
struct Args {
    /// the source z-stack (OME-TIFF)
    #[arg(short, long)]
    input: PathBuf,

    /// sibling stack whose metadata supplies the z spacing when the input has none
    #[arg(long)]
    fallback: Option<PathBuf>,

    /// case id used in output names; defaults to the input file stem
    #[arg(long)]
    id: Option<String>,

    /// the output root directory
    #[arg(short, long)]
    out_root: PathBuf,

    /// target z spacing in physical units per plane
    #[arg(short, long, default_value_t = 0.396, value_parser = positive_spacing)]
    target_dz: f64,

    /// window half-width k; each case gets 2k+1 channel files
    #[arg(short = 'k', long, default_value_t = 3)]
    half_width: usize,
}

fn positive_spacing(text: &str) -> Result<f64, String> {
    let value: f64 = text
        .parse()
        .map_err(|_| format!("`{text}` is not a number"))?;
    if !value.is_finite() || value <= 0.0 {
        return Err(format!("target spacing must be positive, got `{text}`"));
    }
    Ok(value)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let case_id = match args.id.clone() {
        Some(id) => id,
        None => args
            .input
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .context("input path has no file stem")?,
    };

    let params = PrepareParams {
        out_root: args.out_root.clone(),
        target_dz: args.target_dz,
        half_width: args.half_width,
        suffix: None,
    };
    let layout = OutputLayout::new(&params);
    layout.create_dirs()?;

    let record = pipeline::prepare_volume(
        &args.input,
        args.fallback.as_deref(),
        &case_id,
        &params,
        &layout,
    )
    .with_context(|| format!("failed to prepare {}", args.input.display()))?;

    let run = RunManifest {
        target_dz: params.target_dz,
        input_root: None,
        count_total: 1,
        processed: vec![record],
        skipped: Vec::new(),
    };
    manifest::write_json(&layout.manifest_path, &run)?;
    info!(manifest = %layout.manifest_path.display(), "done");
    Ok(())
}
