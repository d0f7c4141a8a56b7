//! Gantry-tilt correction.
//!
//! The tilt is removed by reslicing the volume through a shear about the
//! centre plane of the scan, optionally followed by two rotations that
//! re-align the patient. The output grid keeps the input spacing and is
//! cropped to the bounding box of the transformed input.

use log::debug;
use ndarray::{Array3, Zip, s};

use crate::{
    enums::Interpolation,
    geometry::{AffineTransform, ShearParams},
    interpolator::Interpolator,
    reconstruction::ReconstructionError,
    volume::Volume,
};

/// Voxels added on the (left, right) of the x axis so that `origin_x`
/// becomes the centre of the padded extent. Never removes voxels.
pub fn horizontal_padding(width: usize, origin_x: i64) -> (usize, usize) {
    let x_size = width.saturating_sub(1) as i64;
    let left = (x_size - 2 * origin_x).max(0);
    let right = (2 * origin_x - x_size).max(0);
    (left as usize, right as usize)
}

/// Pad the x axis with `fill`, keeping the physical position of existing
/// voxels
pub fn pad_width(volume: &Volume, left: usize, right: usize, fill: f32) -> Volume {
    if left == 0 && right == 0 {
        return volume.clone();
    }
    let (depth, height, width) = volume.dim();
    let mut data = Array3::from_elem((depth, height, width + left + right), fill);
    data.slice_mut(s![.., .., left..left + width])
        .assign(volume.data());

    let (ox, oy, oz) = volume.origin;
    Volume::new(
        data,
        volume.spacing,
        (ox - left as f64 * volume.spacing.0, oy, oz),
    )
}

/// Shear first, then the "top" rotation about z and the "front" rotation
/// about y when either angle is set. Angles are in degrees.
pub fn build_transform(shear: &ShearParams, angle_z: f64, angle_y: f64) -> AffineTransform {
    let mut transform = AffineTransform::identity();
    transform.shear(0.0, shear.rad_tilt, shear.minus_center_z);

    if angle_z != 0.0 || angle_y != 0.0 {
        transform
            .rotate_wxyz(-angle_z, [0.0, 0.0, 1.0])
            .rotate_wxyz(angle_y, [0.0, 1.0, 0.0]);
    }
    transform
}

/// Bounds of the input volume after mapping its corners into output space
fn output_bounds(volume: &Volume, inverse: &AffineTransform) -> [f64; 6] {
    let b = volume.bounds();
    let mut out = [
        f64::INFINITY,
        f64::NEG_INFINITY,
        f64::INFINITY,
        f64::NEG_INFINITY,
        f64::INFINITY,
        f64::NEG_INFINITY,
    ];
    for corner in 0..8 {
        let point = [
            b[corner & 1],
            b[2 + ((corner >> 1) & 1)],
            b[4 + ((corner >> 2) & 1)],
        ];
        let mapped = inverse.transform_point(point);
        for axis in 0..3 {
            out[2 * axis] = out[2 * axis].min(mapped[axis]);
            out[2 * axis + 1] = out[2 * axis + 1].max(mapped[axis]);
        }
    }
    out
}

/// Reslice `volume` through `transform` (output to input mapping).
///
/// Output samples that fall outside the input are set to `background`.
pub fn reslice(
    volume: &Volume,
    transform: &AffineTransform,
    interpolation: Interpolation,
    background: f32,
) -> Result<Volume, ReconstructionError> {
    let spacing = volume.spacing_xyz();
    if spacing.iter().any(|s| !(s.is_finite() && *s > 0.0)) {
        return Err(ReconstructionError::InvalidSpacing(spacing));
    }
    if volume.data().is_empty() {
        return Err(ReconstructionError::EmptyReslice);
    }

    let inverse = transform
        .inverse()
        .ok_or_else(|| ReconstructionError::Internal("singular reslice transform".into()))?;
    let bounds = output_bounds(volume, &inverse);

    let mut dims = [0usize; 3];
    for axis in 0..3 {
        let extent = (bounds[2 * axis + 1] - bounds[2 * axis]) / spacing[axis];
        if !extent.is_finite() {
            return Err(ReconstructionError::EmptyReslice);
        }
        dims[axis] = extent.round() as usize + 1;
    }
    let out_origin = [bounds[0], bounds[2], bounds[4]];
    debug!(
        "reslice {:?} -> (depth, height, width) = ({}, {}, {})",
        volume.dim(),
        dims[2],
        dims[1],
        dims[0]
    );

    let in_origin = volume.origin_xyz();
    let input = volume.data().view();
    let mut data = Array3::<f32>::zeros((dims[2], dims[1], dims[0]));

    Zip::indexed(&mut data).par_for_each(|(z, y, x), value| {
        let point = [
            out_origin[0] + x as f64 * spacing[0],
            out_origin[1] + y as f64 * spacing[1],
            out_origin[2] + z as f64 * spacing[2],
        ];
        let source = transform.transform_point(point);
        let index = [
            (source[0] - in_origin[0]) / spacing[0],
            (source[1] - in_origin[1]) / spacing[1],
            (source[2] - in_origin[2]) / spacing[2],
        ];
        *value = Interpolator::sample(&input, index, interpolation).unwrap_or(background);
    });

    Ok(Volume::new(
        data,
        volume.spacing,
        (out_origin[0], out_origin[1], out_origin[2]),
    ))
}
