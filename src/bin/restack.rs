//! Reassemble per-slice model predictions into z-stacks for review.

use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use zstack_prep::pipeline::{self, RestackParams};

/// Stack per-slice model predictions back into z-stacks and collect them,
/// together with the resampled originals, in a review bundle.
#[derive(Parser, Debug)]
#[command(author, about, version, long_about)]
struct Args {
    /// model output root; each subdirectory holds one model's slice files
    #[arg(long)]
    outputs_root: PathBuf,

    /// directory of resampled stacks from the preparation run
    #[arg(long)]
    resampled_root: PathBuf,

    /// directory of per-volume metadata records
    #[arg(long)]
    meta_root: PathBuf,

    /// the review bundle output directory
    #[arg(long)]
    review_root: PathBuf,

    /// run manifest to copy into the bundle
    #[arg(long)]
    manifest: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let params = RestackParams {
        outputs_root: args.outputs_root,
        resampled_root: args.resampled_root,
        meta_root: args.meta_root,
        review_root: args.review_root,
        manifest: args.manifest,
    };
    let summary = pipeline::restack_predictions(&params)?;
    info!(
        stack_ids = summary.stack_ids,
        models = summary.models,
        stacks = summary.stacks_written,
        "restack finished"
    );
    Ok(())
}
