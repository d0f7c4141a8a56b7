//! # DICOM-reslice library
//!
//! Turns CT series acquired with a tilted gantry into upright volumes of a
//! fixed in-plane footprint.
//!
//! A series directory is read into a [`Volume`](volume::Volume) with the
//! dicom-rs ecosystem, the gantry tilt is derived from the Image Orientation
//! (Patient) and removed by reslicing through a shear. The result may be
//! resampled to a requested spacing before it is extracted as a
//! (depth, height, width) array in Hounsfield units.
//!
//! Series that cannot be corrected (unreadable files, non-axial orientation,
//! too few slices after reconstruction) are stacked slice by slice instead.
//! Either way the volume is cropped around the centroid of its body voxels
//! and written as one `.npy` file per slice plus a `meta.json`.
//!
//! Heavy steps run in parallel using rayon.
//!
//! # Examples
//!
//! ## Reconstructing one series
//!
//! ```no_run
//! # use dicom_reslice::{NativeEngine, Reconstruction, ReconstructionOptions, SpacingPolicy};
//! let engine = NativeEngine::default();
//! let options = ReconstructionOptions {
//!     spacing: SpacingPolicy::Auto,
//!     ..Default::default()
//! };
//! let mut reconstruction = Reconstruction::open(&engine, "case/dicom", &options)
//!     .expect("should have read the series");
//! let scan = reconstruction
//!     .get_slices()
//!     .expect("should have corrected the tilt");
//! println!("{:?} at {:?} mm", scan.array.dim(), scan.spacing);
//! ```
//!
//! ## Processing a scan to disk
//!
//! ```no_run
//! # use dicom_reslice::{ProcessingConfig, ScanPaths, ScanProcessor};
//! let processor = ScanProcessor::native(ProcessingConfig::default());
//! let paths = ScanPaths::mirrored("case/dicom", "3d").expect("scan has a parent directory");
//! let outcome = processor.process_scan(&paths).expect("should have written the scan");
//! println!("{} slices", outcome.slices_written);
//! ```

pub mod batch;
pub mod config;
pub mod crop;
pub mod engine;
pub mod enums;
pub mod fallback;
pub mod geometry;
mod interpolator;
pub mod npy;
pub mod processor;
pub mod reconstruction;
pub mod reslice;
pub mod spacing;
#[cfg(test)]
mod test_utils;
pub mod volume;
pub mod volume_loader;

pub use config::ProcessingConfig;
pub use engine::{NativeEngine, VolumeEngine};
pub use enums::{Interpolation, SortBy, SpacingPolicy};
pub use processor::{ScanPaths, ScanProcessor};
pub use reconstruction::{Reconstruction, ReconstructionOptions};
pub use volume::Volume;
pub use volume_loader::VolumeLoader;
