use std::collections::HashSet;
use std::path::Path;

/// Allocates case ids that stay unique across one run.
///
/// The bare file stem is used as long as it is free; a collision qualifies the
/// id with the sanitized parent directory as `{parent}__{stem}`.
#[derive(Debug, Default)]
pub struct CaseIdRegistry {
    seen: HashSet<String>,
}

impl CaseIdRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an id for a stack, where `relative_path` is its path below
    /// the scan root.
    pub fn allocate(&mut self, stem: &str, relative_path: &Path) -> String {
        if self.seen.insert(stem.to_string()) {
            return stem.to_string();
        }
        let parent = relative_path
            .parent()
            .map(|parent| parent.to_string_lossy())
            .unwrap_or_default();
        let qualified = format!("{}__{}", sanitize_component(&parent), stem);
        self.seen.insert(qualified.clone());
        qualified
    }
}

/// Replace every character outside `[A-Za-z0-9_-]` with `_`.
fn sanitize_component(text: &str) -> String {
    text.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
