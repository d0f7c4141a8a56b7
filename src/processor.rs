use log::{debug, info, warn};
use ndarray::{Array3, Axis};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};
use thiserror::Error;
use web_time::Instant;

use crate::{
    config::ProcessingConfig,
    crop::{CropError, crop_scan, mask_centroid},
    engine::{NativeEngine, VolumeEngine},
    fallback::{DicomSliceLoader, FallbackError, FallbackStackLoader, SliceLoader},
    geometry::OrientationVector,
    npy::{NpyError, write_npy},
    reconstruction::{Reconstruction, ReconstructionError},
    volume::{Window, slice_to_image},
};

pub const META_FILE_NAME: &str = "meta.json";
pub const PREVIEW_FILE_NAME: &str = "preview.png";

/// Errors that abort a single scan
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Fallback reconstruction of {} failed: {source}", .path.display())]
    Fallback {
        path: PathBuf,
        source: FallbackError,
    },

    #[error("Reconstruction of {} failed: {source}", .path.display())]
    Reconstruction {
        path: PathBuf,
        source: ReconstructionError,
    },

    #[error(transparent)]
    Crop(#[from] CropError),

    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Writing metadata: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Writing slice {}: {source}", .path.display())]
    Npy { path: PathBuf, source: NpyError },

    #[error("Writing preview: {0}")]
    Image(#[from] image::ImageError),

    #[error("Cannot render preview of an empty volume")]
    EmptyPreview,

    #[error("Scan directory {} has no parent to write results to", .0.display())]
    Layout(PathBuf),
}

/// Where the outputs of one scan go
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanPaths {
    pub scan_dir: PathBuf,
    pub out_dir: PathBuf,
    pub meta_path: PathBuf,
    pub preview_path: PathBuf,
}

impl ScanPaths {
    /// `<root>/<series>/` maps to `<root>/<output_dir_name>/` for slices and
    /// `<root>/meta.json` for metadata
    pub fn mirrored(scan_dir: impl AsRef<Path>, output_dir_name: &str) -> Result<Self, ScanError> {
        let scan_dir = scan_dir.as_ref();
        let root = scan_dir
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .ok_or_else(|| ScanError::Layout(scan_dir.to_path_buf()))?;
        Ok(Self {
            scan_dir: scan_dir.to_path_buf(),
            out_dir: root.join(output_dir_name),
            meta_path: root.join(META_FILE_NAME),
            preview_path: root.join(PREVIEW_FILE_NAME),
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconstructionPath {
    Primary,
    Fallback,
}

/// Per-scan record written next to the slices
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CropMetadata {
    pub spacing: Option<[f64; 3]>,
    #[serde(rename = "image_orientation")]
    pub orientation: Option<OrientationVector>,
    #[serde(rename = "crop_x")]
    pub centroid_x: f64,
    #[serde(rename = "crop_y")]
    pub centroid_y: f64,
    pub pre_crop_shape: [usize; 3],
    pub out_shape: [usize; 3],
}

/// Volume from either reconstruction path, before cropping
#[derive(Clone, Debug)]
pub struct ReconstructedVolume {
    pub array: Array3<f32>,
    pub spacing: Option<[f64; 3]>,
    pub orientation: Option<OrientationVector>,
    pub path: ReconstructionPath,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ScanOutcome {
    pub meta: CropMetadata,
    pub path: ReconstructionPath,
    pub slices_written: usize,
}

fn shape3(array: &Array3<f32>) -> [usize; 3] {
    let (d, h, w) = array.dim();
    [d, h, w]
}

pub struct ScanProcessor<E = NativeEngine, L = DicomSliceLoader> {
    engine: E,
    slice_loader: L,
    config: ProcessingConfig,
}

impl ScanProcessor {
    /// Processor reading DICOM with the built-in engine
    pub fn native(config: ProcessingConfig) -> Self {
        Self::new(NativeEngine::new(config.sort_by), DicomSliceLoader, config)
    }
}

impl<E: VolumeEngine, L: SliceLoader> ScanProcessor<E, L> {
    pub fn new(engine: E, slice_loader: L, config: ProcessingConfig) -> Self {
        Self {
            engine,
            slice_loader,
            config,
        }
    }

    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }

    /// Reconstruct with tilt correction, or stack the raw slices when the
    /// input data does not allow it.
    ///
    /// # Errors
    ///
    /// Errors of the stacking path and non-data errors of the primary path
    /// are returned; recoverable primary errors are logged and absorbed.
    pub fn reconstruct(&self, scan_dir: &Path) -> Result<ReconstructedVolume, ScanError> {
        let options = self.config.reconstruction_options();
        let primary = Reconstruction::open(&self.engine, scan_dir, &options).and_then(|mut r| {
            let scan = r.get_slices()?;
            Ok((scan, r.orientation()))
        });

        match primary {
            Ok((scan, orientation)) => Ok(ReconstructedVolume {
                array: scan.array,
                spacing: Some(scan.spacing),
                orientation: Some(orientation),
                path: ReconstructionPath::Primary,
            }),
            Err(e) if e.is_recoverable() => {
                warn!(
                    "{}: reconstruction failed, stacking raw slices: {e}",
                    scan_dir.display()
                );
                let array = FallbackStackLoader::new(&self.slice_loader)
                    .load(scan_dir)
                    .map_err(|source| ScanError::Fallback {
                        path: scan_dir.to_path_buf(),
                        source,
                    })?;
                Ok(ReconstructedVolume {
                    array,
                    spacing: None,
                    orientation: None,
                    path: ReconstructionPath::Fallback,
                })
            }
            Err(source) => Err(ScanError::Reconstruction {
                path: scan_dir.to_path_buf(),
                source,
            }),
        }
    }

    /// Reconstruct, crop and persist one scan
    pub fn process_scan(&self, paths: &ScanPaths) -> Result<ScanOutcome, ScanError> {
        let started = Instant::now();
        let io_error = |path: &Path| {
            let path = path.to_path_buf();
            move |source: std::io::Error| ScanError::Io { path, source }
        };

        // stale results from an earlier run are dropped, missing ones are fine
        if let Err(e) = fs::remove_dir_all(&paths.out_dir) {
            if e.kind() != ErrorKind::NotFound {
                return Err(io_error(&paths.out_dir)(e));
            }
        }
        fs::create_dir_all(&paths.out_dir).map_err(io_error(&paths.out_dir))?;

        let scan = self.reconstruct(&paths.scan_dir)?;
        let centroid = mask_centroid(&scan.array.view())?;
        let cropped = crop_scan(
            &scan.array.view(),
            self.config.out_size,
            centroid,
            self.config.background,
        )?;

        let meta = CropMetadata {
            spacing: scan.spacing,
            orientation: scan.orientation,
            centroid_x: centroid.x,
            centroid_y: centroid.y,
            pre_crop_shape: shape3(&scan.array),
            out_shape: shape3(&cropped),
        };
        let json = serde_json::to_string_pretty(&meta)?;
        fs::write(&paths.meta_path, json).map_err(io_error(&paths.meta_path))?;

        for (idx, slice) in cropped.axis_iter(Axis(0)).enumerate() {
            let path = paths.out_dir.join(format!("{idx:03}.npy"));
            let narrowed = slice.mapv(|v| v as i16);
            write_npy(&path, &narrowed.view()).map_err(|source| ScanError::Npy { path, source })?;
        }

        if self.config.preview {
            let centre = cropped.len_of(Axis(0)) / 2;
            let slice = cropped.index_axis(Axis(0), centre);
            let image = slice_to_image(&slice, Window::default()).ok_or(ScanError::EmptyPreview)?;
            image.save(&paths.preview_path)?;
        }

        debug!(
            "{}: {:?} -> {:?} in {:?}",
            paths.scan_dir.display(),
            meta.pre_crop_shape,
            meta.out_shape,
            started.elapsed()
        );
        if scan.path == ReconstructionPath::Fallback {
            info!("{}: written from raw slices", paths.scan_dir.display());
        }

        Ok(ScanOutcome {
            slices_written: meta.out_shape[0],
            meta,
            path: scan.path,
        })
    }
}
