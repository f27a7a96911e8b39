use std::fs;
use std::path::{Path, PathBuf};

use indicatif::ProgressBar;
use tracing::{info, warn};

use crate::case_id::CaseIdRegistry;
use crate::error::PipelineError;
use crate::manifest::{self, RunManifest, SkipRecord, VolumeRecord};
use crate::naming;
use crate::resample;
use crate::restack;
use crate::spacing::{self, PhysicalSpacing};
use crate::stack_io;
use crate::volume::Volume;
use crate::window;

/// Settings shared by single and bulk preparation runs.
#[derive(Debug, Clone)]
pub struct PrepareParams {
    pub out_root: PathBuf,
    /// Target z spacing, in the same physical unit as the source metadata.
    pub target_dz: f64,
    /// Window half-width k; each case gets 2k + 1 channel files.
    pub half_width: usize,
    /// Optional tag appended to every output directory and the manifest name.
    pub suffix: Option<String>,
}

/// Output directories of one preparation run, all below `out_root`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    /// Resampled stacks, one multi-page TIFF per volume.
    pub resampled_dir: PathBuf,
    /// Per-volume metadata records.
    pub meta_dir: PathBuf,
    /// Per-slice channel files laid out for 2D inference.
    pub cases_dir: PathBuf,
    pub manifest_path: PathBuf,
}

impl OutputLayout {
    pub fn new(params: &PrepareParams) -> Self {
        let tag = naming::spacing_tag(params.target_dz);
        let channels = 2 * params.half_width + 1;
        let suffix = params
            .suffix
            .as_deref()
            .map(|suffix| format!("_{suffix}"))
            .unwrap_or_default();
        OutputLayout {
            resampled_dir: params
                .out_root
                .join(format!("zstacks_resampled_dz{tag}{suffix}")),
            meta_dir: params.out_root.join(format!("meta{suffix}")),
            cases_dir: params
                .out_root
                .join("inputs")
                .join(format!("dz{tag}_{channels}ch{suffix}"))
                .join("imagesTs"),
            manifest_path: params
                .out_root
                .join(format!("manifest_inference_dz{tag}{suffix}.json")),
        }
    }

    pub fn create_dirs(&self) -> Result<(), PipelineError> {
        fs::create_dir_all(&self.resampled_dir)?;
        fs::create_dir_all(&self.meta_dir)?;
        fs::create_dir_all(&self.cases_dir)?;
        Ok(())
    }
}

/// Prepare one volume: resolve its z spacing, resample, and write the
/// resampled stack, the per-slice cases and the metadata record.
///
/// `fallback` names a sibling stack whose metadata supplies the spacing when
/// the source has none. All failures are fatal here; bulk runs wrap this in
/// skip-and-record handling instead. Expects `layout.create_dirs()` to have
/// run.
///
/// # Errors
///
/// Returns [`PipelineError::MissingSpacing`] when neither document yields a
/// spacing, and read, decode or write errors otherwise.
pub fn prepare_volume(
    source: &Path,
    fallback: Option<&Path>,
    case_id: &str,
    params: &PrepareParams,
    layout: &OutputLayout,
) -> Result<VolumeRecord, PipelineError> {
    let primary = stack_io::read_ome_xml(source)?;
    let fallback_xml = match fallback {
        Some(path) => stack_io::read_ome_xml(path)?,
        None => None,
    };
    let spacing = spacing::resolve(primary.as_deref(), fallback_xml.as_deref()).ok_or_else(
        || PipelineError::MissingSpacing {
            path: source.to_path_buf(),
        },
    )?;

    let stack = stack_io::read_stack(source)?;
    finish_volume(source, case_id, spacing, stack, params, layout)
}

/// Prepare every `*.ome.tif` below `input_root`.
///
/// Stacks are processed in sorted path order. Volumes without a resolvable
/// spacing or whose read fails are recorded as skipped and the run continues;
/// failures past the read phase (resampling output, case files, metadata)
/// stay fatal.
pub fn prepare_bulk(
    input_root: &Path,
    params: &PrepareParams,
) -> Result<RunManifest, PipelineError> {
    let layout = OutputLayout::new(params);
    layout.create_dirs()?;

    let sources = scan_ome_stacks(input_root)?;
    info!(count = sources.len(), root = %input_root.display(), "scanned input stacks");

    let mut run = RunManifest {
        target_dz: params.target_dz,
        input_root: Some(input_root.to_path_buf()),
        count_total: sources.len(),
        processed: Vec::new(),
        skipped: Vec::new(),
    };

    let mut registry = CaseIdRegistry::new();
    let bar = ProgressBar::new(sources.len() as u64);
    for source in &sources {
        match load_scanned_stack(source) {
            Ok((spacing, stack)) => {
                let stem = source
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let relative = source.strip_prefix(input_root).unwrap_or(source);
                let case_id = registry.allocate(&stem, relative);
                let record = finish_volume(source, &case_id, spacing, stack, params, &layout)?;
                run.processed.push(record);
            }
            Err(error) => {
                warn!(path = %source.display(), %error, "skipping stack");
                run.skipped.push(SkipRecord {
                    path: source.clone(),
                    reason: skip_reason(&error),
                });
            }
        }
        bar.inc(1);
    }
    bar.finish_and_clear();

    manifest::write_json(&layout.manifest_path, &run)?;
    info!(
        processed = run.processed.len(),
        skipped = run.skipped.len(),
        manifest = %layout.manifest_path.display(),
        "bulk preparation complete"
    );
    Ok(run)
}

/// Inputs for reassembling per-slice predictions into a review bundle.
#[derive(Debug, Clone)]
pub struct RestackParams {
    /// Model output root; each subdirectory holds one model's slice files.
    pub outputs_root: PathBuf,
    /// Directory of resampled stacks from the preparation run.
    pub resampled_root: PathBuf,
    /// Directory of per-volume metadata records naming the expected case ids.
    pub meta_root: PathBuf,
    pub review_root: PathBuf,
    /// Optional run manifest to copy into the bundle for traceability.
    pub manifest: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestackSummary {
    pub stack_ids: usize,
    pub models: usize,
    pub stacks_written: usize,
}

/// Reassemble per-slice predictions into z-stacks and collect them next to
/// the resampled originals under `review_root`.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] when the metadata directory names no
/// case ids; reconstruction failures (unparsable indices, shape mismatches)
/// are fatal. Missing stacks or slices for a known id are warned and skipped.
pub fn restack_predictions(params: &RestackParams) -> Result<RestackSummary, PipelineError> {
    let originals_dir = params.review_root.join("original_zstacks");
    let predictions_dir = params.review_root.join("predictions");
    fs::create_dir_all(&originals_dir)?;
    fs::create_dir_all(&predictions_dir)?;

    let records = load_meta_records(&params.meta_root)?;
    if records.is_empty() {
        return Err(PipelineError::EmptyInput);
    }

    let resampled_files = list_stack_files(&params.resampled_root);
    for (sid, record) in &records {
        match find_resampled_stack(&params.resampled_root, &resampled_files, sid, record.as_ref())
        {
            Some(found) => {
                if let Some(name) = found.file_name() {
                    fs::copy(&found, originals_dir.join(name))?;
                }
            }
            None => warn!(id = %sid, "missing resampled stack"),
        }
    }

    let model_dirs = sorted_model_dirs(&params.outputs_root)?;
    let mut stacks_written = 0;
    for model_dir in &model_dirs {
        let Some(model_name) = model_dir.file_name() else {
            continue;
        };
        let out_model_dir = predictions_dir.join(model_name);
        fs::create_dir_all(&out_model_dir)?;

        let model_files = list_stack_files(model_dir);
        for (sid, _) in &records {
            let prefix = format!("{sid}_z");
            let slices: Vec<PathBuf> = model_files
                .iter()
                .filter(|path| {
                    path.file_name()
                        .and_then(|name| name.to_str())
                        .is_some_and(|name| name.starts_with(&prefix))
                })
                .cloned()
                .collect();
            if slices.is_empty() {
                warn!(model = %model_name.to_string_lossy(), id = %sid, "no prediction slices");
                continue;
            }
            let stack = restack::reconstruct(&slices)?;
            let out_path = out_model_dir.join(naming::prediction_stack_name(sid));
            stack_io::write_stack(&out_path, &stack)?;
            stacks_written += 1;
        }
    }

    if let Some(manifest_path) = &params.manifest {
        if manifest_path.exists() {
            if let Some(name) = manifest_path.file_name() {
                fs::copy(manifest_path, params.review_root.join(name))?;
            }
        } else {
            warn!(path = %manifest_path.display(), "manifest not found, not copied");
        }
    }

    let summary = RestackSummary {
        stack_ids: records.len(),
        models: model_dirs.len(),
        stacks_written,
    };
    info!(
        stack_ids = summary.stack_ids,
        models = summary.models,
        stacks = summary.stacks_written,
        root = %params.review_root.display(),
        "review bundle complete"
    );
    Ok(summary)
}

/// Shared tail of single and bulk preparation: resample, write the stack,
/// the cases and the metadata record.
fn finish_volume(
    source: &Path,
    case_id: &str,
    spacing: PhysicalSpacing,
    stack: Volume,
    params: &PrepareParams,
    layout: &OutputLayout,
) -> Result<VolumeRecord, PipelineError> {
    let z_original = stack.depth();
    let z_resampled = resample::target_depth(z_original, spacing.value, params.target_dz);
    let resampled = resample::resample_z(stack, z_resampled);

    let stack_path = layout
        .resampled_dir
        .join(naming::resampled_stack_name(case_id, params.target_dz));
    stack_io::write_stack(&stack_path, &resampled)?;

    let cases = window::write_case_slices(
        &resampled,
        &layout.cases_dir,
        case_id,
        params.half_width,
    )?;

    let record = VolumeRecord {
        id: case_id.to_string(),
        source_path: source.to_path_buf(),
        dz_original: spacing.value,
        dz_target: params.target_dz,
        z_original,
        z_resampled,
        resample_ratio: spacing.value / params.target_dz,
        resampled_stack: stack_path,
        cases,
    };
    manifest::write_json(&layout.meta_dir.join(format!("{case_id}.json")), &record)?;
    info!(
        id = %record.id,
        z_original,
        z_resampled,
        cases,
        "prepared stack"
    );
    Ok(record)
}

/// Read phase of one scanned stack: spacing resolution and decode. Only
/// failures here are skippable in bulk runs.
fn load_scanned_stack(source: &Path) -> Result<(PhysicalSpacing, Volume), PipelineError> {
    let spacing = resolve_spacing_with_siblings(source)?.ok_or_else(|| {
        PipelineError::MissingSpacing {
            path: source.to_path_buf(),
        }
    })?;
    let stack = stack_io::read_stack(source)?;
    Ok((spacing, stack))
}

/// Resolve the z spacing of a scanned stack, consulting sibling `*.ome.tif`
/// files in the same directory (in sorted order) when the stack's own
/// metadata has none.
///
/// # Errors
///
/// Returns an error when the stack itself cannot be opened; unreadable
/// siblings are skipped.
fn resolve_spacing_with_siblings(
    source: &Path,
) -> Result<Option<PhysicalSpacing>, PipelineError> {
    if let Some(xml) = stack_io::read_ome_xml(source)? {
        if let Some(found) = spacing::resolve_in_document(&xml) {
            return Ok(Some(found));
        }
    }

    let Some(parent) = source.parent() else {
        return Ok(None);
    };
    for sibling in ome_stacks_in(parent) {
        if sibling == source {
            continue;
        }
        let Ok(Some(xml)) = stack_io::read_ome_xml(&sibling) else {
            continue;
        };
        if let Some(found) = spacing::resolve_in_document(&xml) {
            info!(
                path = %source.display(),
                sibling = %sibling.display(),
                "z spacing taken from sibling metadata"
            );
            return Ok(Some(found));
        }
    }
    Ok(None)
}

/// All `*.ome.tif` files below `root`, in sorted order. The root itself is
/// matched literally even when it contains glob metacharacters.
fn scan_ome_stacks(root: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    let root = glob::Pattern::escape(&root.display().to_string());
    let pattern = format!("{root}/**/*.ome.tif");
    let mut files: Vec<PathBuf> = glob::glob(&pattern)?.filter_map(Result::ok).collect();
    files.sort();
    Ok(files)
}

/// `*.ome.tif` files directly inside `dir`, in sorted order.
fn ome_stacks_in(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.ends_with(".ome.tif"))
        })
        .collect();
    files.sort();
    files
}

fn skip_reason(error: &PipelineError) -> String {
    match error {
        PipelineError::MissingSpacing { .. } => "missing_dz".to_string(),
        other => format!("read_error: {other}"),
    }
}

/// Case ids and parsed records from the metadata directory, sorted by id.
/// Records that fail to parse still contribute their id.
fn load_meta_records(
    meta_root: &Path,
) -> Result<Vec<(String, Option<VolumeRecord>)>, PipelineError> {
    let mut records = Vec::new();
    for entry in fs::read_dir(meta_root)? {
        let Ok(entry) = entry else {
            continue;
        };
        let path = entry.path();
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if !is_json {
            continue;
        }
        let Some(sid) = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
        else {
            continue;
        };
        let record = match manifest::read_json::<VolumeRecord>(&path) {
            Ok(record) => Some(record),
            Err(error) => {
                warn!(path = %path.display(), %error, "unreadable metadata record");
                None
            }
        };
        records.push((sid, record));
    }
    records.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(records)
}

/// `.tif` files directly inside `dir`, sorted; an unreadable directory counts
/// as empty.
fn list_stack_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        warn!(path = %dir.display(), "cannot list directory");
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.ends_with(".tif"))
        })
        .collect();
    files.sort();
    files
}

/// Locate the resampled stack for a case id, preferring the exact name the
/// metadata record implies, then the first sorted `.tif` starting with the id.
fn find_resampled_stack(
    root: &Path,
    files: &[PathBuf],
    sid: &str,
    record: Option<&VolumeRecord>,
) -> Option<PathBuf> {
    if let Some(record) = record {
        let preferred = root.join(naming::resampled_stack_name(&record.id, record.dz_target));
        if preferred.exists() {
            return Some(preferred);
        }
    }
    files
        .iter()
        .find(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(sid))
        })
        .cloned()
}

/// Immediate subdirectories of the model output root, sorted.
fn sorted_model_dirs(outputs_root: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    let mut dirs: Vec<PathBuf> = fs::read_dir(outputs_root)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    dirs.sort();
    Ok(dirs)
}
