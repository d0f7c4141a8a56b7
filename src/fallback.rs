//! Reconstruction by plain stacking, used when the geometric path fails.
//!
//! Every entry of the series directory is loaded in file name order and
//! stacked along depth. No tilt, spacing or Hounsfield correction is done,
//! and any error is returned to the caller as is.

use dicom::{
    object::open_file,
    pixeldata::{ConvertOptions, ModalityLutOption, PixelDecoder, VoiLutOption},
};
use ndarray::{Array2, Array3, ArrayView2, Axis, s};
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FallbackError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DICOM error: {0}")]
    Dicom(#[from] dicom::object::ReadError),

    #[error("Cannot decode slice {}: {reason}", .path.display())]
    Decode { path: PathBuf, reason: String },

    #[error("No slices found in {}", .0.display())]
    Empty(PathBuf),

    #[error("Slices cannot be stacked: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

/// Loads a single cross-section as stored, without any correction
pub trait SliceLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Array2<f32>, FallbackError>;
}

/// Reads the raw stored values of the first frame of a DICOM file
#[derive(Clone, Copy, Debug, Default)]
pub struct DicomSliceLoader;

impl SliceLoader for DicomSliceLoader {
    fn load(&self, path: &Path) -> Result<Array2<f32>, FallbackError> {
        let decode_error = |reason: String| FallbackError::Decode {
            path: path.to_path_buf(),
            reason,
        };
        let object = open_file(path)?;
        let pixel_data = object
            .decode_pixel_data()
            .map_err(|e| decode_error(e.to_string()))?;
        let options = ConvertOptions::new()
            .with_modality_lut(ModalityLutOption::None)
            .with_voi_lut(VoiLutOption::Identity);
        let array = pixel_data
            .to_ndarray_with_options::<f32>(&options)
            .map_err(|e| decode_error(e.to_string()))?;
        Ok(array.slice_move(s![0, .., .., 0]))
    }
}

pub struct FallbackStackLoader<'a, L: SliceLoader + ?Sized> {
    loader: &'a L,
}

impl<'a, L: SliceLoader + ?Sized> FallbackStackLoader<'a, L> {
    pub fn new(loader: &'a L) -> Self {
        Self { loader }
    }

    /// Stack every entry of `dir`, sorted by file name, into a
    /// (depth, height, width) array
    pub fn load(&self, dir: &Path) -> Result<Array3<f32>, FallbackError> {
        let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
            .map(|entry| entry.map(|entry| entry.path()))
            .collect::<Result<_, _>>()?;
        if paths.is_empty() {
            return Err(FallbackError::Empty(dir.to_path_buf()));
        }
        paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        let slices = paths
            .iter()
            .map(|path| self.loader.load(path))
            .collect::<Result<Vec<_>, _>>()?;
        let views: Vec<ArrayView2<f32>> = slices.iter().map(|slice| slice.view()).collect();

        Ok(ndarray::stack(Axis(0), &views)?)
    }
}
