//! Patient orientation and the affine transforms used for reslicing.
//!
//! Transforms follow the reslice convention: they map a point of the
//! *output* grid to the position in the *input* volume that is sampled for
//! it. Composition is pre-multiplied, so the first operation concatenated is
//! the outermost one applied to an output point.

use nalgebra::{Matrix4, Unit, Vector3, Vector4};
use serde::{Deserialize, Serialize};

use crate::volume_loader::VolumeLoaderError;

/// Direction cosines of the first row and first column of a slice
/// (x1, y1, z1, x2, y2, z2), as stored in ImageOrientationPatient
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrientationVector(pub [f64; 6]);

impl OrientationVector {
    /// Gantry tilt in radians, `atan(z2 / y2)`.
    ///
    /// A zero `y2` means the column direction has no in-plane component,
    /// which is not an axial acquisition and cannot be tilt corrected.
    pub fn tilt_angle(&self) -> Result<f64, VolumeLoaderError> {
        let [_, _, _, _, y2, z2] = self.0;
        if y2 == 0.0 {
            return Err(VolumeLoaderError::NonStandardOrientation(self.0));
        }
        Ok((z2 / y2).atan())
    }
}

/// Parameters of the gantry-tilt shear, fixed for a scan
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShearParams {
    pub rad_tilt: f64,
    pub minus_center_z: f64,
}

impl ShearParams {
    /// `z_bound_max` is the largest physical z coordinate of the volume.
    pub fn new(
        orientation: &OrientationVector,
        z_bound_max: f64,
    ) -> Result<Self, VolumeLoaderError> {
        Ok(Self {
            rad_tilt: orientation.tilt_angle()?,
            minus_center_z: -(z_bound_max / 2.0),
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AffineTransform {
    matrix: Matrix4<f64>,
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl AffineTransform {
    pub fn identity() -> Self {
        Self {
            matrix: Matrix4::identity(),
        }
    }

    pub fn matrix(&self) -> &Matrix4<f64> {
        &self.matrix
    }

    pub fn concatenate(&mut self, other: &Matrix4<f64>) -> &mut Self {
        self.matrix = self.matrix * other;
        self
    }

    /// Shear about the plane `z = -zplane`:
    /// `x' = x - dxdz * (z + zplane)`, `y' = y - dydz * (z + zplane)`
    pub fn shear(&mut self, dxdz: f64, dydz: f64, zplane: f64) -> &mut Self {
        let mut m = Matrix4::identity();
        m[(0, 2)] = -dxdz;
        m[(1, 2)] = -dydz;
        m[(0, 3)] = -zplane * dxdz;
        m[(1, 3)] = -zplane * dydz;
        self.concatenate(&m)
    }

    /// Right-handed rotation of `angle_deg` degrees about `axis`
    pub fn rotate_wxyz(&mut self, angle_deg: f64, axis: [f64; 3]) -> &mut Self {
        let axis = Vector3::from(axis);
        if angle_deg == 0.0 || axis.norm() == 0.0 {
            return self;
        }
        let rotation = nalgebra::Rotation3::from_axis_angle(
            &Unit::new_normalize(axis),
            angle_deg.to_radians(),
        );
        self.concatenate(&rotation.to_homogeneous())
    }

    pub fn transform_point(&self, point: [f64; 3]) -> [f64; 3] {
        let p = self.matrix * Vector4::new(point[0], point[1], point[2], 1.0);
        [p[0], p[1], p[2]]
    }

    /// `None` when the transform is singular
    pub fn inverse(&self) -> Option<Self> {
        self.matrix.try_inverse().map(|matrix| Self { matrix })
    }

    pub fn is_identity(&self) -> bool {
        self.matrix == Matrix4::identity()
    }
}
