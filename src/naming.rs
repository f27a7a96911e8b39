use std::sync::LazyLock;

use regex::Regex;

/// First `_z<digits>` token in a slice file name.
static Z_INDEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_z(\d+)").expect("hard-coded pattern compiles"));

/// Identity of one per-slice channel file within a prepared case.
///
/// `depth_index` is 1-based; `channel_index` counts window offsets from
/// `-k` upward starting at 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceKey<'a> {
    pub case_id: &'a str,
    pub depth_index: usize,
    pub channel_index: usize,
}

impl SliceKey<'_> {
    pub fn file_name(&self) -> String {
        format!(
            "{}_z{:03}_{:04}.tif",
            self.case_id, self.depth_index, self.channel_index
        )
    }
}

/// Extract the depth index from a slice file stem, e.g. `case_z012_0003` -> 12.
///
/// Only the first `_z<digits>` token counts; stems without one yield `None`.
pub fn parse_depth_index(stem: &str) -> Option<usize> {
    Z_INDEX
        .captures(stem)
        .and_then(|captures| captures.get(1))
        .and_then(|token| token.as_str().parse().ok())
}

/// Spacing rendered for file names, with `.` replaced so names stay portable:
/// 0.396 -> `0p396`.
pub fn spacing_tag(dz: f64) -> String {
    format!("{dz}").replace('.', "p")
}

pub fn resampled_stack_name(case_id: &str, dz: f64) -> String {
    format!("{}_dz{}.tif", case_id, spacing_tag(dz))
}

pub fn prediction_stack_name(case_id: &str) -> String {
    format!("{case_id}_pred.tif")
}
