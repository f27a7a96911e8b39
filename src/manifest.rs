use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Per-volume metadata written next to each prepared stack and echoed in the
/// run manifest. Reconstruction reads these back to locate resampled stacks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeRecord {
    pub id: String,
    pub source_path: PathBuf,
    pub dz_original: f64,
    pub dz_target: f64,
    pub z_original: usize,
    pub z_resampled: usize,
    pub resample_ratio: f64,
    pub resampled_stack: PathBuf,
    /// Number of per-slice cases written for this volume.
    pub cases: usize,
}

/// A volume the bulk run could not process, with a short reason tag:
/// `missing_dz` or `read_error: ...`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkipRecord {
    pub path: PathBuf,
    pub reason: String,
}

/// Summary of one preparation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub target_dz: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_root: Option<PathBuf>,
    pub count_total: usize,
    pub processed: Vec<VolumeRecord>,
    pub skipped: Vec<SkipRecord>,
}

/// Write a value as pretty-printed JSON.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), PipelineError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)?;
    // A drop-time flush would swallow the final write error.
    writer.flush()?;
    Ok(())
}

/// Read a JSON file back into a value.
pub fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, PipelineError> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
}
