use ndarray::{Array2, Array3};
use std::{
    path::Path,
    sync::atomic::{AtomicUsize, Ordering},
};

use crate::{
    engine::{NativeEngine, VolumeEngine},
    enums::Interpolation,
    fallback::{FallbackError, SliceLoader},
    geometry::{AffineTransform, OrientationVector},
    reconstruction::ReconstructionError,
    volume::Volume,
    volume_loader::{Series, VolumeLoaderError},
};

/// Series of `depth` slices of -1000 HU with a 100 HU disc centred in
/// every slice; spacing (0.7, 0.7, 2.5) mm
pub(crate) fn blob_series(
    depth: usize,
    height: usize,
    width: usize,
    orientation: OrientationVector,
) -> Series {
    let (cy, cx) = (height as f64 / 2.0, width as f64 / 2.0);
    let radius = (height.min(width) as f64 / 4.0).max(1.0);
    let data = Array3::from_shape_fn((depth, height, width), |(_, y, x)| {
        let (dy, dx) = (y as f64 + 0.5 - cy, x as f64 + 0.5 - cx);
        if dy * dy + dx * dx <= radius * radius {
            100.0
        } else {
            -1000.0
        }
    });
    Series {
        volume: Volume::new(data, (0.7, 0.7, 2.5), (-100.0, -100.0, -300.0)),
        orientation,
    }
}

/// Engine returning a fixed series and counting reslices
pub(crate) struct SyntheticEngine {
    series: Option<Series>,
    native: NativeEngine,
    pub(crate) reslices: AtomicUsize,
}

impl SyntheticEngine {
    pub(crate) fn new(series: Series) -> Self {
        Self {
            series: Some(series),
            native: NativeEngine::default(),
            reslices: AtomicUsize::new(0),
        }
    }

    /// An engine whose every read fails as an unreadable directory
    pub(crate) fn unreadable() -> Self {
        Self {
            series: None,
            native: NativeEngine::default(),
            reslices: AtomicUsize::new(0),
        }
    }
}

impl VolumeEngine for SyntheticEngine {
    fn read_series(&self, dir: &Path) -> Result<Series, VolumeLoaderError> {
        self.series
            .clone()
            .ok_or_else(|| VolumeLoaderError::NoValidImages(dir.to_path_buf()))
    }

    fn pad_width(&self, volume: &Volume, left: usize, right: usize, fill: f32) -> Volume {
        self.native.pad_width(volume, left, right, fill)
    }

    fn reslice(
        &self,
        volume: &Volume,
        transform: &AffineTransform,
        interpolation: Interpolation,
        background: f32,
    ) -> Result<Volume, ReconstructionError> {
        self.reslices.fetch_add(1, Ordering::SeqCst);
        self.native
            .reslice(volume, transform, interpolation, background)
    }

    fn resample(
        &self,
        volume: &Volume,
        spacing: [f64; 3],
        interpolation: Interpolation,
    ) -> Result<Volume, ReconstructionError> {
        self.native.resample(volume, spacing, interpolation)
    }

    fn extract_array(&self, volume: &Volume) -> Array3<f32> {
        self.native.extract_array(volume)
    }
}

/// Loads a slice whose every pixel is the number in the file's contents
pub(crate) struct TextSliceLoader {
    pub(crate) shape: (usize, usize),
}

impl SliceLoader for TextSliceLoader {
    fn load(&self, path: &Path) -> Result<Array2<f32>, FallbackError> {
        let text = std::fs::read_to_string(path)?;
        let value: f32 = text.trim().parse().map_err(|_| FallbackError::Decode {
            path: path.to_path_buf(),
            reason: format!("not a number: {text:?}"),
        })?;
        Ok(Array2::from_elem(self.shape, value))
    }
}
