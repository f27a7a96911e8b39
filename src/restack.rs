use std::path::PathBuf;

use crate::error::PipelineError;
use crate::naming;
use crate::stack_io;
use crate::volume::Volume;

/// Rebuild a volume from per-slice files, ordered by the `_z<digits>` token
/// in each file name.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] when `files` is empty,
/// [`PipelineError::UnparsableIndex`] when any file name lacks a depth index
/// token, and shape or sample-type errors when the planes do not stack.
pub fn reconstruct(files: &[PathBuf]) -> Result<Volume, PipelineError> {
    if files.is_empty() {
        return Err(PipelineError::EmptyInput);
    }

    let mut indexed = Vec::with_capacity(files.len());
    for path in files {
        let stem = path
            .file_stem()
            .map(|stem| stem.to_string_lossy())
            .unwrap_or_default();
        let index = naming::parse_depth_index(&stem).ok_or_else(|| {
            PipelineError::UnparsableIndex {
                path: path.clone(),
            }
        })?;
        indexed.push((index, path));
    }
    // Ties on the index fall back to the path so the order never depends on
    // input order.
    indexed.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)));

    let mut planes = Vec::with_capacity(indexed.len());
    for (_, path) in &indexed {
        planes.push(stack_io::read_plane(path)?);
    }
    Volume::from_planes(planes)
}
