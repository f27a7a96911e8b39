//! End-to-end tests for the preparation and restacking pipeline, driven
//! through real TIFF files on disk.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use ndarray::Array2;
use tempfile::tempdir;
use tiff::encoder::{TiffEncoder, colortype};
use tiff::tags::Tag;

use zstack_prep::manifest::{self, RunManifest, VolumeRecord};
use zstack_prep::pipeline::{self, OutputLayout, PrepareParams, RestackParams, RestackSummary};
use zstack_prep::stack_io;
use zstack_prep::{PipelineError, Plane, PlaneView, Volume};

fn ome_xml(dz: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<OME xmlns="http://www.openmicroscopy.org/Schemas/OME/2016-06">
  <Image ID="Image:0">
    <Pixels ID="Pixels:0" PhysicalSizeZ="{dz}" PhysicalSizeZUnit="um"/>
  </Image>
</OME>"#
    )
}

/// Write a `depth`-page 4x4 u16 stack where plane `z` is filled with `10 * z`,
/// carrying `description` on the first page.
fn write_ome_stack(path: &Path, depth: usize, description: Option<&str>) {
    let file = File::create(path).unwrap();
    let mut encoder = TiffEncoder::new(BufWriter::new(file)).unwrap();
    for z in 0..depth {
        let data = vec![(z as u16) * 10; 16];
        let mut image = encoder.new_image::<colortype::Gray16>(4, 4).unwrap();
        if z == 0 {
            if let Some(xml) = description {
                image
                    .encoder()
                    .write_tag(Tag::ImageDescription, xml)
                    .unwrap();
            }
        }
        image.write_data(&data).unwrap();
    }
}

fn params(out_root: &Path, half_width: usize, suffix: Option<&str>) -> PrepareParams {
    PrepareParams {
        out_root: out_root.to_path_buf(),
        target_dz: 0.396,
        half_width,
        suffix: suffix.map(str::to_string),
    }
}

#[test]
fn prepares_a_single_stack_end_to_end() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("sample.ome.tif");
    write_ome_stack(&src, 5, Some(&ome_xml("0.2376")));

    let params = params(&dir.path().join("out"), 1, None);
    let layout = OutputLayout::new(&params);
    layout.create_dirs().unwrap();
    let record = pipeline::prepare_volume(&src, None, "sample", &params, &layout).unwrap();

    assert_eq!(record.z_original, 5);
    assert_eq!(record.z_resampled, 3);
    assert_eq!(record.cases, 3);
    assert!((record.resample_ratio - 0.6).abs() < 1e-9);

    // 0.2376 -> 0.396 over 5 planes lands exactly on source planes 0, 2, 4.
    let stack_path = layout.resampled_dir.join("sample_dz0p396.tif");
    assert_eq!(record.resampled_stack, stack_path);
    let Volume::U16(resampled) = stack_io::read_stack(&stack_path).unwrap() else {
        panic!("expected a u16 stack");
    };
    assert_eq!(resampled.dim(), (3, 4, 4));
    assert_eq!(resampled[[0, 0, 0]], 0);
    assert_eq!(resampled[[1, 0, 0]], 20);
    assert_eq!(resampled[[2, 0, 0]], 40);

    let mut names: Vec<String> = fs::read_dir(&layout.cases_dir)
        .unwrap()
        .filter_map(Result::ok)
        .filter_map(|entry| entry.file_name().into_string().ok())
        .collect();
    names.sort();
    assert_eq!(names.len(), 9);
    assert_eq!(names[0], "sample_z001_0000.tif");
    assert_eq!(names[8], "sample_z003_0002.tif");

    // The window of the first case clamps below: channels 0 and 1 repeat
    // plane 0, channel 2 is plane 1.
    let Plane::U16(low) =
        stack_io::read_plane(&layout.cases_dir.join("sample_z001_0000.tif")).unwrap()
    else {
        panic!("expected a u16 plane");
    };
    assert_eq!(low[[0, 0]], 0);
    let Plane::U16(high) =
        stack_io::read_plane(&layout.cases_dir.join("sample_z001_0002.tif")).unwrap()
    else {
        panic!("expected a u16 plane");
    };
    assert_eq!(high[[0, 0]], 20);

    let stored: VolumeRecord = manifest::read_json(&layout.meta_dir.join("sample.json")).unwrap();
    assert_eq!(stored.id, "sample");
    assert_eq!(stored.z_resampled, 3);
    assert_eq!(stored.source_path, src);
}

#[test]
fn the_fallback_document_supplies_a_missing_spacing() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("headless.ome.tif");
    let donor = dir.path().join("donor.ome.tif");
    write_ome_stack(&src, 4, None);
    write_ome_stack(&donor, 2, Some(&ome_xml("0.396")));

    let params = params(&dir.path().join("out"), 0, None);
    let layout = OutputLayout::new(&params);
    layout.create_dirs().unwrap();

    let missing = pipeline::prepare_volume(&src, None, "headless", &params, &layout);
    assert!(matches!(missing, Err(PipelineError::MissingSpacing { .. })));

    let record =
        pipeline::prepare_volume(&src, Some(&donor), "headless", &params, &layout).unwrap();
    assert!((record.dz_original - 0.396).abs() < 1e-9);
    assert_eq!(record.z_resampled, 4);
}

#[test]
fn bulk_runs_scan_skip_and_disambiguate() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("volumes");
    fs::create_dir_all(root.join("day1")).unwrap();
    fs::create_dir_all(root.join("day2")).unwrap();
    fs::create_dir_all(root.join("solo")).unwrap();

    write_ome_stack(&root.join("day1/scan.ome.tif"), 4, Some(&ome_xml("0.198")));
    write_ome_stack(&root.join("day2/scan.ome.tif"), 4, Some(&ome_xml("0.198")));
    // No metadata of its own; the spacing comes from the day1 sibling.
    write_ome_stack(&root.join("day1/bare.ome.tif"), 3, None);
    // No metadata and no sibling that has any.
    write_ome_stack(&root.join("solo/alone.ome.tif"), 3, None);

    let params = params(&dir.path().join("out"), 1, Some("all_3ch"));
    let run = pipeline::prepare_bulk(&root, &params).unwrap();

    assert_eq!(run.count_total, 4);
    assert_eq!(run.input_root.as_deref(), Some(root.as_path()));

    // Sorted scan order; the second `scan` stem gets path-qualified.
    let ids: Vec<&str> = run.processed.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, ["bare.ome", "scan.ome", "day2__scan.ome"]);

    assert_eq!(run.skipped.len(), 1);
    assert_eq!(run.skipped[0].reason, "missing_dz");
    assert!(run.skipped[0].path.ends_with("alone.ome.tif"));

    // bare: 3 planes at the sibling's 0.198 halves to round(1.5) = 2.
    assert_eq!(run.processed[0].z_resampled, 2);
    assert!((run.processed[0].dz_original - 0.198).abs() < 1e-9);

    let layout = OutputLayout::new(&params);
    let on_disk: RunManifest = manifest::read_json(&layout.manifest_path).unwrap();
    assert_eq!(on_disk.count_total, 4);
    assert_eq!(on_disk.processed.len(), 3);
    assert_eq!(on_disk.skipped.len(), 1);

    // Three stacks of 2 cases, 3 channels each.
    assert_eq!(fs::read_dir(&layout.cases_dir).unwrap().count(), 18);
}

#[test]
fn predictions_round_trip_back_into_review_stacks() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("sample.ome.tif");
    write_ome_stack(&src, 6, Some(&ome_xml("0.198")));

    let params = params(&dir.path().join("out"), 1, None);
    let layout = OutputLayout::new(&params);
    layout.create_dirs().unwrap();
    let record = pipeline::prepare_volume(&src, None, "sample", &params, &layout).unwrap();
    assert_eq!(record.z_resampled, 3);
    let run = RunManifest {
        target_dz: params.target_dz,
        input_root: None,
        count_total: 1,
        processed: vec![record],
        skipped: Vec::new(),
    };
    manifest::write_json(&layout.manifest_path, &run).unwrap();

    // One prediction slice per depth index, written out of order.
    let model_dir = dir.path().join("model_outputs/unet_a");
    fs::create_dir_all(&model_dir).unwrap();
    for zi in [3usize, 1, 2] {
        let plane = Array2::from_elem((4, 4), (zi * 100) as u16);
        stack_io::write_plane(
            &model_dir.join(format!("sample_z{zi:03}.tif")),
            PlaneView::U16(plane.view()),
        )
        .unwrap();
    }

    let restack_params = RestackParams {
        outputs_root: dir.path().join("model_outputs"),
        resampled_root: layout.resampled_dir.clone(),
        meta_root: layout.meta_dir.clone(),
        review_root: dir.path().join("review"),
        manifest: Some(layout.manifest_path.clone()),
    };
    let summary = pipeline::restack_predictions(&restack_params).unwrap();
    assert_eq!(
        summary,
        RestackSummary {
            stack_ids: 1,
            models: 1,
            stacks_written: 1,
        }
    );

    let pred_path = restack_params
        .review_root
        .join("predictions/unet_a/sample_pred.tif");
    let Volume::U16(pred) = stack_io::read_stack(&pred_path).unwrap() else {
        panic!("expected a u16 stack");
    };
    assert_eq!(pred.dim(), (3, 4, 4));
    assert_eq!(pred[[0, 0, 0]], 100);
    assert_eq!(pred[[1, 0, 0]], 200);
    assert_eq!(pred[[2, 0, 0]], 300);

    assert!(
        restack_params
            .review_root
            .join("original_zstacks/sample_dz0p396.tif")
            .exists()
    );
    assert!(
        restack_params
            .review_root
            .join("manifest_inference_dz0p396.json")
            .exists()
    );
}

#[test]
fn restacking_requires_metadata_records() {
    let dir = tempdir().unwrap();
    let params = RestackParams {
        outputs_root: dir.path().join("outputs"),
        resampled_root: dir.path().join("resampled"),
        meta_root: dir.path().join("meta"),
        review_root: dir.path().join("review"),
        manifest: None,
    };
    fs::create_dir_all(&params.outputs_root).unwrap();
    fs::create_dir_all(&params.resampled_root).unwrap();
    fs::create_dir_all(&params.meta_root).unwrap();

    let result = pipeline::restack_predictions(&params);
    assert!(matches!(result, Err(PipelineError::EmptyInput)));
}
