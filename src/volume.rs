use image::{ImageBuffer, Luma};
use ndarray::{Array3, ArrayView2, s};
use rayon::prelude::*;

/// An oriented scalar volume.
///
/// `data` is indexed `[z, y, x]` in engine convention: z ascends along the
/// scan axis and y points up, so row 0 is the bottom row of a slice.
/// `spacing` and `origin` are given as (x, y, z) in millimetres.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Volume {
    pub data: Array3<f32>,
    pub spacing: (f64, f64, f64),
    pub origin: (f64, f64, f64),
}

impl Volume {
    pub fn new(data: Array3<f32>, spacing: (f64, f64, f64), origin: (f64, f64, f64)) -> Self {
        Self {
            data,
            spacing,
            origin,
        }
    }

    /// Get the dimensions of the volume (depth, height, width)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Get a reference to the underlying data
    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }

    /// Get a mutable reference to the underlying data
    pub fn data_mut(&mut self) -> &mut Array3<f32> {
        &mut self.data
    }

    pub fn spacing_xyz(&self) -> [f64; 3] {
        [self.spacing.0, self.spacing.1, self.spacing.2]
    }

    pub fn origin_xyz(&self) -> [f64; 3] {
        [self.origin.0, self.origin.1, self.origin.2]
    }

    /// Number of samples along (x, y, z)
    pub fn dims_xyz(&self) -> [usize; 3] {
        let (depth, height, width) = self.dim();
        [width, height, depth]
    }

    /// Physical bounds (x_min, x_max, y_min, y_max, z_min, z_max) of the
    /// sample grid
    pub fn bounds(&self) -> [f64; 6] {
        let origin = self.origin_xyz();
        let spacing = self.spacing_xyz();
        let dims = self.dims_xyz();
        let mut bounds = [0.0; 6];
        for axis in 0..3 {
            let a = origin[axis];
            let b = origin[axis] + dims[axis].saturating_sub(1) as f64 * spacing[axis];
            bounds[2 * axis] = a.min(b);
            bounds[2 * axis + 1] = a.max(b);
        }
        bounds
    }

    /// Plain array in viewing convention, shape (depth, height, width).
    ///
    /// Depth and row order are both reversed, which rotates the volume by
    /// 180 degrees in the (depth, height) plane.
    pub fn to_array(&self) -> Array3<f32> {
        self.data.slice(s![..;-1, ..;-1, ..]).to_owned()
    }
}

/// HU window used when rendering slices to 8-bit images
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Window {
    pub center: f32,
    pub width: f32,
}

impl Default for Window {
    fn default() -> Self {
        Self {
            center: 0.0,
            width: 2000.0,
        }
    }
}

impl Window {
    #[inline]
    fn normalize_to_u8(&self, value: f32) -> u8 {
        let low = self.center - self.width / 2.0;
        (((value - low) / self.width) * 255.0).clamp(0.0, 255.0) as u8
    }
}

/// Render a 2D slice to a grayscale image
pub fn slice_to_image(
    slice: &ArrayView2<'_, f32>,
    window: Window,
) -> Option<ImageBuffer<Luma<u8>, Vec<u8>>> {
    let (height, width) = slice.dim();
    let pixel_data: Vec<u8> = slice
        .outer_iter()
        .into_par_iter()
        .flat_map_iter(|row| {
            row.iter()
                .map(|&v| window.normalize_to_u8(v))
                .collect::<Vec<u8>>()
        })
        .collect();
    ImageBuffer::from_raw(width as u32, height as u32, pixel_data)
}
