use std::path::PathBuf;

use thiserror::Error;

use crate::volume::Dtype;

/// Errors raised while preparing z-stacks or reassembling per-slice outputs.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("No z spacing found in metadata for {}", .path.display())]
    MissingSpacing { path: PathBuf },

    #[error("Unsupported plane layout in {}: {}", .path.display(), .reason)]
    UnsupportedShape { path: PathBuf, reason: String },

    #[error("Unsupported sample type {} in {}", .found, .path.display())]
    UnsupportedDtype { path: PathBuf, found: String },

    #[error("Plane shape {found:?} does not match {expected:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("Planes mix sample types {expected} and {found}")]
    MixedDtypes { expected: Dtype, found: Dtype },

    #[error("Empty input: at least one file is required")]
    EmptyInput,

    #[error("No depth index token in file name {}", .path.display())]
    UnparsableIndex { path: PathBuf },

    #[error("Invalid scan pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
