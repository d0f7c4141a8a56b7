//! Geometry engine capabilities used by the reconstruction pipeline.
//!
//! The pipeline only talks to [`VolumeEngine`], so the series reader,
//! reslicer and resampler can be swapped without touching the
//! orchestration. [`NativeEngine`] implements everything on the CPU with
//! `ndarray` and `rayon`.

use ndarray::Array3;
use std::path::Path;

use crate::{
    enums::{Interpolation, SortBy},
    geometry::AffineTransform,
    reconstruction::ReconstructionError,
    reslice, spacing,
    volume::Volume,
    volume_loader::{Series, VolumeLoader, VolumeLoaderError},
};

pub trait VolumeEngine: Send + Sync {
    /// Read an ordered series from a directory
    fn read_series(&self, dir: &Path) -> Result<Series, VolumeLoaderError>;

    /// Grow the x axis by `left` and `right` voxels of `fill`
    fn pad_width(&self, volume: &Volume, left: usize, right: usize, fill: f32) -> Volume;

    /// Reslice through an output-to-input transform, auto-cropping the
    /// output to the transformed input
    fn reslice(
        &self,
        volume: &Volume,
        transform: &AffineTransform,
        interpolation: Interpolation,
        background: f32,
    ) -> Result<Volume, ReconstructionError>;

    /// Resample to the given (x, y, z) spacing
    fn resample(
        &self,
        volume: &Volume,
        spacing: [f64; 3],
        interpolation: Interpolation,
    ) -> Result<Volume, ReconstructionError>;

    /// Plain (depth, height, width) array in viewing orientation
    fn extract_array(&self, volume: &Volume) -> Array3<f32>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NativeEngine {
    pub sort_by: SortBy,
}

impl NativeEngine {
    pub fn new(sort_by: SortBy) -> Self {
        Self { sort_by }
    }
}

impl VolumeEngine for NativeEngine {
    fn read_series(&self, dir: &Path) -> Result<Series, VolumeLoaderError> {
        VolumeLoader::read_series(dir, self.sort_by)
    }

    fn pad_width(&self, volume: &Volume, left: usize, right: usize, fill: f32) -> Volume {
        reslice::pad_width(volume, left, right, fill)
    }

    fn reslice(
        &self,
        volume: &Volume,
        transform: &AffineTransform,
        interpolation: Interpolation,
        background: f32,
    ) -> Result<Volume, ReconstructionError> {
        reslice::reslice(volume, transform, interpolation, background)
    }

    fn resample(
        &self,
        volume: &Volume,
        spacing: [f64; 3],
        interpolation: Interpolation,
    ) -> Result<Volume, ReconstructionError> {
        spacing::resample(volume, spacing, interpolation)
    }

    fn extract_array(&self, volume: &Volume) -> Array3<f32> {
        volume.to_array()
    }
}
