use log::debug;
use ndarray::Axis;

use crate::{
    enums::{Interpolation, SpacingPolicy},
    interpolator::Interpolator,
    reconstruction::ReconstructionError,
    volume::Volume,
};

/// Target (x, y, z) spacing for a resliced volume, or `None` to keep it as is
///
/// # Errors
///
/// `Auto` fails when the smallest axis spacing is not positive, `Explicit`
/// when any requested component is not positive.
pub fn resolve_spacing(
    policy: &SpacingPolicy,
    native: [f64; 3],
) -> Result<Option<[f64; 3]>, ReconstructionError> {
    match policy {
        SpacingPolicy::None => Ok(None),
        SpacingPolicy::Auto => {
            let min_spacing = native.iter().copied().fold(f64::INFINITY, f64::min);
            if !(min_spacing.is_finite() && min_spacing > 0.0) {
                return Err(ReconstructionError::InvalidSpacing(native));
            }
            Ok(Some([min_spacing; 3]))
        }
        SpacingPolicy::Explicit(spacing) => {
            if spacing.iter().any(|s| !(s.is_finite() && *s > 0.0)) {
                return Err(ReconstructionError::InvalidSpacing(*spacing));
            }
            Ok(Some(*spacing))
        }
    }
}

/// Resample each axis independently to `spacing` (x, y, z), keeping the
/// origin in place
pub fn resample(
    volume: &Volume,
    spacing: [f64; 3],
    interpolation: Interpolation,
) -> Result<Volume, ReconstructionError> {
    let native = volume.spacing_xyz();
    if native.iter().any(|s| !(s.is_finite() && *s > 0.0)) {
        return Err(ReconstructionError::InvalidSpacing(native));
    }

    // array axes are [z, y, x]
    let mut data = volume.data().clone();
    for (xyz, array_axis) in [(0, Axis(2)), (1, Axis(1)), (2, Axis(0))] {
        if native[xyz] != spacing[xyz] {
            data = Interpolator::resample_axis(
                &data,
                array_axis,
                native[xyz],
                spacing[xyz],
                interpolation,
            );
        }
    }
    debug!("resampled {:?} -> {:?} at {:?}", volume.dim(), data.dim(), spacing);

    Ok(Volume::new(
        data,
        (spacing[0], spacing[1], spacing[2]),
        volume.origin,
    ))
}
