//! Primary reconstruction path: series → tilt correction → spacing →
//! plain array.
//!
//! [`Reconstruction`] owns the raw series and a [`TransformState`]. The
//! corrected volume is computed lazily: the first request runs the pipeline
//! and caches the result, and any setter drops the cache so the next
//! request recomputes it.

use log::debug;
use ndarray::Array3;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::{
    engine::VolumeEngine,
    enums::{Interpolation, SpacingPolicy},
    geometry::{OrientationVector, ShearParams},
    reslice::{build_transform, horizontal_padding},
    spacing::resolve_spacing,
    volume::Volume,
    volume_loader::VolumeLoaderError,
};

#[derive(Debug, Error)]
pub enum ReconstructionError {
    #[error(transparent)]
    Loader(#[from] VolumeLoaderError),

    #[error("Invalid scan spacing {0:?}")]
    InvalidSpacing([f64; 3]),

    #[error("Cannot read 3D dicom image: {depth} slices, need at least {min_depth}")]
    ShortVolume { depth: usize, min_depth: usize },

    #[error("Reslice produced an empty volume")]
    EmptyReslice,

    #[error("Internal reconstruction error: {0}")]
    Internal(String),
}

impl ReconstructionError {
    /// Whether the error describes bad input data, in which case the scan
    /// can still be stacked without geometric correction
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ReconstructionError::Internal(_))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ReconstructionOptions {
    pub spacing: SpacingPolicy,
    pub interpolation: Interpolation,
    pub background: f32,
    pub min_depth: usize,
}

impl Default for ReconstructionOptions {
    fn default() -> Self {
        Self {
            spacing: SpacingPolicy::None,
            interpolation: Interpolation::Cubic,
            background: -2000.0,
            min_depth: 5,
        }
    }
}

#[derive(Clone, Debug, Default)]
enum Cache {
    #[default]
    Dirty,
    Clean(Volume),
}

/// Mutable pipeline parameters plus the cached result computed from them
#[derive(Clone, Debug, Default)]
pub struct TransformState {
    angle_z: f64,
    angle_y: f64,
    origin_x: Option<i64>,
    spacing: SpacingPolicy,
    cache: Cache,
}

impl TransformState {
    pub fn new(spacing: SpacingPolicy) -> Self {
        Self {
            spacing,
            ..Default::default()
        }
    }

    /// Rotation angles in degrees and the x index to recentre on
    pub fn set_transform(&mut self, angle_z: f64, angle_y: f64, origin_x: Option<i64>) {
        self.angle_z = angle_z;
        self.angle_y = angle_y;
        self.origin_x = origin_x;
        self.cache = Cache::Dirty;
    }

    pub fn set_spacing(&mut self, spacing: SpacingPolicy) {
        self.spacing = spacing;
        self.cache = Cache::Dirty;
    }

    pub fn is_dirty(&self) -> bool {
        matches!(self.cache, Cache::Dirty)
    }

    pub fn angle_z(&self) -> f64 {
        self.angle_z
    }

    pub fn angle_y(&self) -> f64 {
        self.angle_y
    }

    pub fn origin_x(&self) -> Option<i64> {
        self.origin_x
    }

    pub fn spacing(&self) -> &SpacingPolicy {
        &self.spacing
    }
}

/// Result of the primary path
#[derive(Clone, Debug)]
pub struct ReconstructedScan {
    /// (depth, height, width) in viewing orientation
    pub array: Array3<f32>,
    /// (x, y, z) spacing of the final volume
    pub spacing: [f64; 3],
    pub shear_params: ShearParams,
}

pub struct Reconstruction<'e, E: VolumeEngine + ?Sized> {
    engine: &'e E,
    scan_dir: PathBuf,
    series: Volume,
    orientation: OrientationVector,
    shear_params: ShearParams,
    state: TransformState,
    interpolation: Interpolation,
    background: f32,
    min_depth: usize,
}

impl<'e, E: VolumeEngine + ?Sized> Reconstruction<'e, E> {
    /// Read the series and derive the shear parameters
    ///
    /// # Errors
    ///
    /// Fails if the series cannot be read or its orientation is not
    /// tilt-correctable.
    pub fn open(
        engine: &'e E,
        scan_dir: impl AsRef<Path>,
        options: &ReconstructionOptions,
    ) -> Result<Self, ReconstructionError> {
        let scan_dir = scan_dir.as_ref().to_path_buf();
        let series = engine.read_series(&scan_dir)?;
        let shear_params = ShearParams::new(&series.orientation, series.volume.bounds()[5])?;
        debug!("{}: shear {:?}", scan_dir.display(), shear_params);

        Ok(Self {
            engine,
            scan_dir,
            series: series.volume,
            orientation: series.orientation,
            shear_params,
            state: TransformState::new(options.spacing),
            interpolation: options.interpolation,
            background: options.background,
            min_depth: options.min_depth,
        })
    }

    pub fn scan_dir(&self) -> &Path {
        &self.scan_dir
    }

    pub fn orientation(&self) -> OrientationVector {
        self.orientation
    }

    pub fn shear_params(&self) -> ShearParams {
        self.shear_params
    }

    pub fn state(&self) -> &TransformState {
        &self.state
    }

    pub fn set_transform(&mut self, angle_z: f64, angle_y: f64, origin_x: Option<i64>) {
        self.state.set_transform(angle_z, angle_y, origin_x);
    }

    pub fn set_spacing(&mut self, spacing: SpacingPolicy) {
        self.state.set_spacing(spacing);
    }

    fn update_image(&self) -> Result<Volume, ReconstructionError> {
        let padded;
        let input = match self.state.origin_x {
            Some(origin_x) => {
                let (left, right) = horizontal_padding(self.series.dims_xyz()[0], origin_x);
                padded = self
                    .engine
                    .pad_width(&self.series, left, right, self.background);
                &padded
            }
            None => &self.series,
        };

        let transform = build_transform(&self.shear_params, self.state.angle_z, self.state.angle_y);
        let resliced = self
            .engine
            .reslice(input, &transform, self.interpolation, self.background)?;

        match resolve_spacing(&self.state.spacing, resliced.spacing_xyz())? {
            Some(spacing) => self.engine.resample(&resliced, spacing, self.interpolation),
            None => Ok(resliced),
        }
    }

    /// The corrected volume, recomputed only if a setter ran since the last
    /// call
    pub fn volume(&mut self) -> Result<&Volume, ReconstructionError> {
        if self.state.is_dirty() {
            let volume = self.update_image()?;
            self.state.cache = Cache::Clean(volume);
        }
        match &self.state.cache {
            Cache::Clean(volume) => Ok(volume),
            Cache::Dirty => Err(ReconstructionError::Internal(
                "transform cache still dirty after update".into(),
            )),
        }
    }

    /// All slices after tilt handling, as a (depth, height, width) array
    ///
    /// # Errors
    ///
    /// Fails with [`ReconstructionError::ShortVolume`] when fewer than
    /// `min_depth` slices remain.
    pub fn get_slices(&mut self) -> Result<ReconstructedScan, ReconstructionError> {
        let engine = self.engine;
        let min_depth = self.min_depth;
        let shear_params = self.shear_params;

        let volume = self.volume()?;
        let spacing = volume.spacing_xyz();
        let array = engine.extract_array(volume);

        if array.dim() != volume.dim() {
            return Err(ReconstructionError::Internal(format!(
                "extracted array {:?} does not match volume {:?}",
                array.dim(),
                volume.dim()
            )));
        }

        let depth = array.len_of(ndarray::Axis(0));
        if depth < min_depth {
            return Err(ReconstructionError::ShortVolume { depth, min_depth });
        }

        Ok(ReconstructedScan {
            array,
            spacing,
            shear_params,
        })
    }
}
