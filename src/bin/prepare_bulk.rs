//! Prepare every z-stack below a directory for per-slice 2D inference.

use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use zstack_prep::pipeline::{self, PrepareParams};

/// Scan a directory tree for `*.ome.tif` stacks and prepare each one for
/// per-slice 2D inference. Stacks that cannot be processed are skipped and
/// recorded in the run manifest instead of aborting the run.
#[derive(Parser, Debug)]
#[command(author, about, version, long_about)]
struct Args {
    /// the directory tree to scan for stacks
    #[arg(short, long)]
    input_root: PathBuf,

    /// the output root directory
    #[arg(short, long)]
    out_root: PathBuf,

    /// target z spacing in physical units per plane
    #[arg(short, long, default_value_t = 0.396, value_parser = positive_spacing)]
    target_dz: f64,

    /// window half-width k; each case gets 2k+1 channel files
    #[arg(short = 'k', long, default_value_t = 3)]
    half_width: usize,

    /// tag appended to output directory and manifest names; defaults to `all_{2k+1}ch`
    #[arg(short, long)]
    suffix: Option<String>,
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
    let suffix = args
        .suffix
        .clone()
        .unwrap_or_else(|| format!("all_{}ch", 2 * args.half_width + 1));

    let params = PrepareParams {
        out_root: args.out_root.clone(),
        target_dz: args.target_dz,
        half_width: args.half_width,
        suffix: Some(suffix),
    };
    let run = pipeline::prepare_bulk(&args.input_root, &params)?;
    info!(
        processed = run.processed.len(),
        skipped = run.skipped.len(),
        "bulk run finished"
    );
    Ok(())
}
