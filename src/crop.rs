use ndarray::{Array3, ArrayView3, Axis, s};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum CropError {
    #[error("No voxel above 0 to centre the crop on")]
    EmptyMask,

    #[error("Crop centre ({x}, {y}) is not finite")]
    NonFinite { x: f64, y: f64 },

    #[error("Crop size must be non-zero, got {0:?}")]
    EmptyTarget((usize, usize)),
}

/// In-plane centre of the voxels that contain body
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Centroid {
    pub x: f64,
    pub y: f64,
}

/// Centroid of the `value > 0` mask over the whole volume.
///
/// Every masked voxel has the same weight, whatever its intensity.
pub fn mask_centroid(volume: &ArrayView3<f32>) -> Result<Centroid, CropError> {
    let (count, sum_y, sum_x) = volume
        .axis_iter(Axis(0))
        .into_par_iter()
        .map(|slice| {
            let mut acc = (0u64, 0f64, 0f64);
            for ((y, x), &value) in slice.indexed_iter() {
                if value > 0.0 {
                    acc.0 += 1;
                    acc.1 += y as f64;
                    acc.2 += x as f64;
                }
            }
            acc
        })
        .reduce(|| (0, 0.0, 0.0), |a, b| (a.0 + b.0, a.1 + b.1, a.2 + b.2));

    if count == 0 {
        return Err(CropError::EmptyMask);
    }
    Ok(Centroid {
        x: sum_x / count as f64,
        y: sum_y / count as f64,
    })
}

/// Crop every slice to `out_size` (width, height) around `centre`.
///
/// The window starts at `floor(centre - size / 2)` on each axis and always
/// spans exactly `size` voxels; parts outside the volume are filled with
/// `fill`.
pub fn crop_scan(
    volume: &ArrayView3<f32>,
    out_size: (usize, usize),
    centre: Centroid,
    fill: f32,
) -> Result<Array3<f32>, CropError> {
    let (out_width, out_height) = out_size;
    if out_width == 0 || out_height == 0 {
        return Err(CropError::EmptyTarget(out_size));
    }
    if !(centre.x.is_finite() && centre.y.is_finite()) {
        return Err(CropError::NonFinite {
            x: centre.x,
            y: centre.y,
        });
    }

    let (depth, height, width) = volume.dim();
    let y0 = (centre.y - out_height as f64 / 2.0).floor() as isize;
    let x0 = (centre.x - out_width as f64 / 2.0).floor() as isize;

    let mut cropped = Array3::from_elem((depth, out_height, out_width), fill);

    let (src_y, dst_y) = overlap(y0, out_height, height);
    let (src_x, dst_x) = overlap(x0, out_width, width);
    if let (Some(src_y), Some(src_x)) = (src_y, src_x) {
        cropped
            .slice_mut(s![.., dst_y..dst_y + src_y.len(), dst_x..dst_x + src_x.len()])
            .assign(&volume.slice(s![.., src_y, src_x]));
    }
    Ok(cropped)
}

/// Source range inside `0..len` covered by the window `start..start + size`
/// and where it lands in the window
fn overlap(start: isize, size: usize, len: usize) -> (Option<std::ops::Range<usize>>, usize) {
    let end = start + size as isize;
    let src_start = start.max(0);
    let src_end = end.min(len as isize);
    if src_start >= src_end {
        return (None, 0);
    }
    (
        Some(src_start as usize..src_end as usize),
        (src_start - start) as usize,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centroid_ignores_intensity() {
        let mut volume = Array3::<f32>::from_elem((2, 10, 10), -1000.0);
        volume[[0, 2, 4]] = 5000.0;
        volume[[1, 6, 8]] = 1.0;
        let centroid = mask_centroid(&volume.view()).unwrap();
        assert_eq!(centroid, Centroid { x: 6.0, y: 4.0 });
    }

    #[test]
    fn empty_mask_is_an_error() {
        let volume = Array3::<f32>::zeros((3, 4, 4));
        assert_eq!(mask_centroid(&volume.view()), Err(CropError::EmptyMask));
    }

    #[test]
    fn centred_crop_has_target_shape() {
        let volume = Array3::from_shape_fn((10, 512, 512), |(_, y, x)| (y * 512 + x) as f32);
        let cropped = crop_scan(
            &volume.view(),
            (400, 400),
            Centroid { x: 256.0, y: 256.0 },
            -2000.0,
        )
        .unwrap();

        assert_eq!(cropped.dim(), (10, 400, 400));
        // window starts at 56 on both axes
        assert_eq!(cropped[[3, 0, 0]], volume[[3, 56, 56]]);
        assert_eq!(cropped[[3, 399, 399]], volume[[3, 455, 455]]);
    }

    #[test]
    fn edge_crop_is_padded_with_background() {
        let volume = Array3::<f32>::from_elem((10, 512, 512), 7.0);
        let cropped = crop_scan(
            &volume.view(),
            (400, 400),
            Centroid { x: 10.0, y: 10.0 },
            -2000.0,
        )
        .unwrap();

        assert_eq!(cropped.dim(), (10, 400, 400));
        // window starts at -190
        assert_eq!(cropped[[0, 189, 300]], -2000.0);
        assert_eq!(cropped[[0, 300, 189]], -2000.0);
        assert_eq!(cropped[[9, 190, 190]], 7.0);
        assert_eq!(cropped[[9, 399, 399]], 7.0);
    }

    #[test]
    fn fractional_centre_keeps_exact_size() {
        let volume = Array3::<f32>::ones((1, 7, 9));
        for (x, y) in [(0.5, 0.5), (4.49, 3.51), (8.99, 6.01)] {
            let cropped = crop_scan(&volume.view(), (5, 3), Centroid { x, y }, 0.0).unwrap();
            assert_eq!(cropped.dim(), (1, 3, 5));
        }
    }

    #[test]
    fn window_beyond_volume_is_all_background() {
        let volume = Array3::<f32>::ones((2, 4, 4));
        let centre = Centroid { x: 100.0, y: -50.0 };
        let cropped = crop_scan(&volume.view(), (2, 2), centre, -1.0).unwrap();
        assert!(cropped.iter().all(|&v| v == -1.0));
    }

    #[test]
    fn non_finite_centre_is_rejected() {
        let volume = Array3::<f32>::ones((1, 4, 4));
        let result = crop_scan(&volume.view(), (2, 2), Centroid { x: f64::NAN, y: 1.0 }, 0.0);
        assert!(matches!(result, Err(CropError::NonFinite { .. })));
    }
}
