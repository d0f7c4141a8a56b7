use crate::{enums::SortBy, geometry::OrientationVector, volume::Volume};

use dicom::{
    object::{FileDicomObject, InMemDicomObject, open_file},
    pixeldata::{ConvertOptions, ModalityLutOption, PixelDecoder, VoiLutOption},
};
use dicom_dictionary_std::tags;
use log::debug;
use ndarray::{Array2, Array3, s};
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VolumeLoaderError {
    #[error("No valid DICOM images found in {0}")]
    NoValidImages(PathBuf),

    #[error("Inconsistent image dimensions")]
    InconsistentDimensions,

    #[error("Missing spacing information")]
    MissingSpacing,

    #[error("Missing image orientation")]
    MissingOrientation,

    #[error("Wrong patient orientation: {0:?}")]
    NonStandardOrientation([f64; 6]),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DICOM error: {0}")]
    Dicom(#[from] dicom::object::ReadError),
}

/// A series read from disk together with its slice orientation
#[derive(Clone, Debug)]
pub struct Series {
    pub volume: Volume,
    pub orientation: OrientationVector,
}

struct SliceRecord {
    order: Option<f64>,
    position: Option<[f64; 3]>,
    image: Array2<f32>,
}

pub struct VolumeLoader;

impl VolumeLoader {
    /// Read every DICOM file of a directory into an oriented volume
    ///
    /// Files with a `.dcm` extension or without any extension are
    /// considered. Pixel values are converted to Hounsfield units.
    ///
    /// # Errors
    ///
    /// Fails if the directory cannot be read, holds no decodable image,
    /// or the slice orientation is not tilt-correctable.
    pub fn read_series(
        path: impl AsRef<Path>,
        sort_by: SortBy,
    ) -> Result<Series, VolumeLoaderError> {
        let path = path.as_ref();
        let mut paths: Vec<_> = fs::read_dir(path)?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .filter(|path| match path.extension().and_then(|s| s.to_str()) {
                Some(ext) => ext.eq_ignore_ascii_case("dcm"),
                None => true,
            })
            .collect();

        if paths.is_empty() {
            return Err(VolumeLoaderError::NoValidImages(path.to_path_buf()));
        }
        paths.sort();

        let objects: Vec<_> = paths
            .iter()
            .filter_map(|path| match open_file(path) {
                Ok(object) => Some(object),
                Err(e) => {
                    debug!("skipping {}: {e}", path.display());
                    None
                }
            })
            .collect();

        Self::load_from_dicom_objects(&objects, sort_by).map_err(|e| match e {
            VolumeLoaderError::NoValidImages(_) => {
                VolumeLoaderError::NoValidImages(path.to_path_buf())
            }
            other => other,
        })
    }

    /// Load a series from DICOM objects
    ///
    /// # Arguments
    ///
    /// * `dicom_objects` - Slice of DICOM file objects
    /// * `sort_by` - Key the slices are ordered by along the scan axis
    ///
    /// # Errors
    ///
    /// Returns error if no valid images found, dimensions are inconsistent
    /// or the orientation is missing or non-standard
    pub fn load_from_dicom_objects(
        dicom_objects: &[FileDicomObject<InMemDicomObject>],
        sort_by: SortBy,
    ) -> Result<Series, VolumeLoaderError> {
        let mut slices: Vec<_> = dicom_objects
            .iter()
            .filter_map(|dicom_object| Self::extract_slice(dicom_object, &sort_by))
            .collect();

        if slices.is_empty() {
            return Err(VolumeLoaderError::NoValidImages(PathBuf::new()));
        }

        Self::sort_slices(&mut slices, sort_by);
        Self::ascend_along_z(&mut slices);
        Self::validate_dimensions(&slices)?;

        let orientation = Self::get_orientation(dicom_objects)?;
        // reject before spending time on the volume
        orientation.tilt_angle()?;

        let (x_spacing, y_spacing) =
            Self::get_pixel_spacing(dicom_objects).ok_or(VolumeLoaderError::MissingSpacing)?;
        let z_spacing = Self::get_slice_spacing(&slices, dicom_objects)
            .ok_or(VolumeLoaderError::MissingSpacing)?;
        let origin = slices[0].position.unwrap_or([0.0; 3]);

        let volume = Volume::new(
            Self::build_volume_array(&slices),
            (x_spacing, y_spacing, z_spacing),
            (origin[0], origin[1], origin[2]),
        );
        debug!(
            "read series {:?} spacing {:?} orientation {:?}",
            volume.dim(),
            volume.spacing,
            orientation
        );

        Ok(Series {
            volume,
            orientation,
        })
    }

    fn extract_slice(
        dicom_object: &FileDicomObject<InMemDicomObject>,
        sort_by: &SortBy,
    ) -> Option<SliceRecord> {
        let position = Self::get_position(dicom_object);
        let order = Self::get_sort_order(dicom_object, sort_by, position)?;
        let image = Self::decode_image(dicom_object)?;
        Some(SliceRecord {
            order,
            position,
            image,
        })
    }

    fn get_position(dicom_object: &FileDicomObject<InMemDicomObject>) -> Option<[f64; 3]> {
        let pos = dicom_object
            .element(tags::IMAGE_POSITION_PATIENT)
            .ok()?
            .to_multi_float64()
            .ok()?;
        Some([*pos.first()?, *pos.get(1)?, *pos.get(2)?])
    }

    fn get_sort_order(
        dicom_object: &FileDicomObject<InMemDicomObject>,
        sort_by: &SortBy,
        position: Option<[f64; 3]>,
    ) -> Option<Option<f64>> {
        match sort_by {
            SortBy::ImagePositionPatient => Some(Some(position?[2])),
            SortBy::TablePosition => {
                let pos = dicom_object
                    .element(tags::TABLE_POSITION)
                    .ok()?
                    .to_float64()
                    .ok();
                Some(pos)
            }
            SortBy::InstanceNumber => {
                let num = dicom_object
                    .element(tags::INSTANCE_NUMBER)
                    .ok()?
                    .to_int::<i32>()
                    .ok()
                    .map(f64::from);
                Some(num)
            }
            SortBy::None => Some(Some(0.0)),
        }
    }

    /// Decode the first frame, applying the modality LUT (Hounsfield units)
    fn decode_image(dicom_object: &FileDicomObject<InMemDicomObject>) -> Option<Array2<f32>> {
        let pixel_data = dicom_object.decode_pixel_data().ok()?;
        let options = ConvertOptions::new()
            .with_modality_lut(ModalityLutOption::Default)
            .with_voi_lut(VoiLutOption::Identity);
        pixel_data
            .to_ndarray_with_options::<f32>(&options)
            .ok()
            .map(|arr| arr.slice_move(s![0, .., .., 0]))
    }

    fn sort_slices(slices: &mut [SliceRecord], sort_by: SortBy) {
        if !matches!(sort_by, SortBy::None) {
            slices.sort_by(|a, b| {
                a.order
                    .partial_cmp(&b.order)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }
    }

    /// Reverse the stack if the sort key runs against z, so the first slice
    /// is always the lowest one and the origin sits at the bottom
    fn ascend_along_z(slices: &mut [SliceRecord]) {
        let first = slices.first().and_then(|slice| slice.position);
        let last = slices.last().and_then(|slice| slice.position);
        if let (Some(first), Some(last)) = (first, last) {
            if last[2] < first[2] {
                slices.reverse();
            }
        }
    }

    fn validate_dimensions(slices: &[SliceRecord]) -> Result<(), VolumeLoaderError> {
        let first_dim = slices[0].image.dim();
        if slices.iter().any(|slice| slice.image.dim() != first_dim) {
            return Err(VolumeLoaderError::InconsistentDimensions);
        }
        Ok(())
    }

    /// Stack slices along z with rows stored bottom-up
    fn build_volume_array(slices: &[SliceRecord]) -> Array3<f32> {
        let (height, width) = slices[0].image.dim();
        let depth = slices.len();
        let mut volume = Array3::<f32>::zeros((depth, height, width));

        for (i, slice) in slices.iter().enumerate() {
            volume
                .slice_mut(s![i, .., ..])
                .assign(&slice.image.slice(s![..;-1, ..]));
        }

        volume
    }

    fn get_orientation(
        dicom_objects: &[FileDicomObject<InMemDicomObject>],
    ) -> Result<OrientationVector, VolumeLoaderError> {
        dicom_objects
            .iter()
            .find_map(|dicom_object| {
                let values = dicom_object
                    .element(tags::IMAGE_ORIENTATION_PATIENT)
                    .ok()?
                    .to_multi_float64()
                    .ok()?;
                let values: [f64; 6] = values.get(..6)?.try_into().ok()?;
                Some(OrientationVector(values))
            })
            .ok_or(VolumeLoaderError::MissingOrientation)
    }

    /// (column spacing, row spacing) from PixelSpacing
    fn get_pixel_spacing(
        dicom_objects: &[FileDicomObject<InMemDicomObject>],
    ) -> Option<(f64, f64)> {
        dicom_objects.iter().find_map(|dicom_object| {
            let pixel_spacing = dicom_object
                .element(tags::PIXEL_SPACING)
                .ok()?
                .to_multi_float64()
                .ok()?;
            // PixelSpacing is (row spacing, column spacing)
            Some((*pixel_spacing.get(1)?, *pixel_spacing.first()?))
        })
    }

    /// Mean z step between the first and last slice, or SliceThickness for
    /// a single slice
    fn get_slice_spacing(
        slices: &[SliceRecord],
        dicom_objects: &[FileDicomObject<InMemDicomObject>],
    ) -> Option<f64> {
        if slices.len() > 1 {
            let first = slices.first()?.position;
            let last = slices.last()?.position;
            if let (Some(first), Some(last)) = (first, last) {
                return Some((last[2] - first[2]).abs() / (slices.len() - 1) as f64);
            }
        }

        dicom_objects.iter().find_map(|dicom_object| {
            dicom_object
                .element(tags::SLICE_THICKNESS)
                .ok()?
                .to_float64()
                .ok()
        })
    }
}
