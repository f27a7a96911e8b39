use std::fs;
use std::path::Path;

use crate::error::PipelineError;
use crate::naming::SliceKey;
use crate::stack_io;
use crate::volume::Volume;

/// Source plane indices for the `2k + 1` channels centered on `center`,
/// ordered by offset from `-k` to `+k` and clamped to `[0, depth - 1]`.
///
/// # Panics
///
/// Panics when `depth` is zero.
pub fn clamped_window(center: usize, depth: usize, half_width: usize) -> Vec<usize> {
    assert!(depth > 0, "volume must contain at least one plane");
    let last = depth as isize - 1;
    let k = half_width as isize;
    (-k..=k)
        .map(|offset| (center as isize + offset).clamp(0, last) as usize)
        .collect()
}

/// Write one case per plane of `stack`, each case holding `2k + 1` channel
/// files named `{case_id}_z{depth_index:03}_{channel:04}.tif` with a 1-based
/// depth index. Returns the number of cases written.
pub fn write_case_slices(
    stack: &Volume,
    out_dir: &Path,
    case_id: &str,
    half_width: usize,
) -> Result<usize, PipelineError> {
    fs::create_dir_all(out_dir)?;
    let depth = stack.depth();
    for zi in 1..=depth {
        let window = clamped_window(zi - 1, depth, half_width);
        for (channel_index, &source_z) in window.iter().enumerate() {
            let key = SliceKey {
                case_id,
                depth_index: zi,
                channel_index,
            };
            stack_io::write_plane(&out_dir.join(key.file_name()), stack.plane(source_z))?;
        }
    }
    Ok(depth)
}
