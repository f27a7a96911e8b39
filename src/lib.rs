//! # zstack-prep
//!
//! Prepares 3-D microscopy z-stacks for 2-D per-slice inference and
//! reassembles the per-slice outputs into volumes afterwards.
//!
//! Stacks are read from OME-TIFF files, resampled along z to a target
//! physical spacing (linear interpolation, xy untouched), and cut into
//! per-slice cases of `2k + 1` channel files where the channels are the
//! neighboring planes at offsets `-k..=k`, clamped at the stack boundaries.
//! The z spacing comes from the OME-XML metadata embedded in the TIFF, with
//! a fallback to a sibling stack's metadata when a file carries none. After
//! a model has produced one prediction per slice, the per-slice files are
//! stacked back into volumes using the `_z<digits>` token in their names.
//!
//! Each prepared volume gets a JSON metadata record, and every run writes a
//! manifest listing what was processed and what was skipped. Bulk runs skip
//! and record volumes that cannot be read or lack a spacing; single-volume
//! runs treat every failure as fatal.
//!
//! # Examples
//!
//! Prepare one stack and write the resampled volume, the per-slice cases
//! and the metadata record below `out/`:
//!
//! ```no_run
//! use std::path::{Path, PathBuf};
//! use zstack_prep::pipeline::{self, OutputLayout, PrepareParams};
//!
//! let params = PrepareParams {
//!     out_root: PathBuf::from("out"),
//!     target_dz: 0.396,
//!     half_width: 3,
//!     suffix: None,
//! };
//! let layout = OutputLayout::new(&params);
//! layout.create_dirs().expect("should have created output directories");
//! let record = pipeline::prepare_volume(
//!     Path::new("scan.ome.tif"),
//!     None,
//!     "scan",
//!     &params,
//!     &layout,
//! )
//! .expect("should have prepared the stack");
//! println!("{} cases from {} planes", record.cases, record.z_resampled);
//! ```

pub mod case_id;
pub mod error;
pub mod manifest;
pub mod naming;
pub mod pipeline;
pub mod resample;
pub mod restack;
pub mod spacing;
pub mod stack_io;
pub mod volume;
pub mod window;

pub use error::PipelineError;
pub use spacing::PhysicalSpacing;
pub use volume::{Dtype, Plane, PlaneView, Volume};
