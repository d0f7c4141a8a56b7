use ndarray::{Array3, ArrayView1, ArrayView3, ArrayViewMut1, Axis, Zip};

use crate::enums::Interpolation;

/// Sample positions closer than this to the grid edge count as inside.
const EDGE_TOLERANCE: f64 = 1e-4;

pub(crate) struct Interpolator;

impl Interpolator {
    /// Number of samples covering the same physical extent at a new spacing,
    /// keeping the first sample in place.
    pub(crate) fn resampled_len(len: usize, in_spacing: f64, out_spacing: f64) -> usize {
        if len == 0 {
            return 0;
        }
        let extent = (len - 1) as f64 * in_spacing;
        // tolerate rounding just below a whole sample
        ((extent / out_spacing) + EDGE_TOLERANCE).floor() as usize + 1
    }

    /// Catmull-Rom weights for offsets -1, 0, 1, 2 around the base sample
    #[inline]
    pub(crate) fn cubic_weights(t: f64) -> [f64; 4] {
        let t2 = t * t;
        let t3 = t2 * t;
        [
            0.5 * (-t3 + 2.0 * t2 - t),
            0.5 * (3.0 * t3 - 5.0 * t2 + 2.0),
            0.5 * (-3.0 * t3 + 4.0 * t2 + t),
            0.5 * (t3 - t2),
        ]
    }

    /// Split a continuous index into clamped neighbour indices and weights.
    /// Returns `None` when the position lies outside the grid.
    #[inline]
    fn taps(
        position: f64,
        len: usize,
        interpolation: Interpolation,
    ) -> Option<([usize; 4], [f64; 4])> {
        let max = len.checked_sub(1)? as f64;
        if !(position >= -EDGE_TOLERANCE && position <= max + EDGE_TOLERANCE) {
            return None;
        }
        let position = position.clamp(0.0, max);
        let base = position.floor();
        let t = position - base;
        let base = base as isize;
        let last = len as isize - 1;
        let clamp = |i: isize| i.clamp(0, last) as usize;

        match interpolation {
            Interpolation::Linear => Some((
                [clamp(base), clamp(base + 1), 0, 0],
                [1.0 - t, t, 0.0, 0.0],
            )),
            Interpolation::Cubic => Some((
                [
                    clamp(base - 1),
                    clamp(base),
                    clamp(base + 1),
                    clamp(base + 2),
                ],
                Self::cubic_weights(t),
            )),
        }
    }

    /// Sample a `[z, y, x]` volume at the continuous index (x, y, z)
    pub(crate) fn sample(
        volume: &ArrayView3<f32>,
        position: [f64; 3],
        interpolation: Interpolation,
    ) -> Option<f32> {
        let (depth, height, width) = volume.dim();
        let (xi, xw) = Self::taps(position[0], width, interpolation)?;
        let (yi, yw) = Self::taps(position[1], height, interpolation)?;
        let (zi, zw) = Self::taps(position[2], depth, interpolation)?;

        let mut value = 0.0;
        for (&z, &wz) in zi.iter().zip(zw.iter()) {
            if wz == 0.0 {
                continue;
            }
            for (&y, &wy) in yi.iter().zip(yw.iter()) {
                if wy == 0.0 {
                    continue;
                }
                let row: f64 = xi
                    .iter()
                    .zip(xw.iter())
                    .map(|(&x, &wx)| wx * volume[[z, y, x]] as f64)
                    .sum();
                value += wz * wy * row;
            }
        }
        Some(value as f32)
    }

    fn resample_lane(
        input: ArrayView1<f32>,
        mut output: ArrayViewMut1<f32>,
        step: f64,
        interpolation: Interpolation,
    ) {
        let len = input.len();
        for (j, out) in output.iter_mut().enumerate() {
            let position = (j as f64 * step).min((len - 1) as f64);
            if let Some((idx, w)) = Self::taps(position, len, interpolation) {
                *out = idx
                    .iter()
                    .zip(w.iter())
                    .map(|(&i, &wi)| wi * input[i] as f64)
                    .sum::<f64>() as f32;
            }
        }
    }

    /// Resample one array axis from `in_spacing` to `out_spacing`
    pub(crate) fn resample_axis(
        input: &Array3<f32>,
        axis: Axis,
        in_spacing: f64,
        out_spacing: f64,
        interpolation: Interpolation,
    ) -> Array3<f32> {
        let len = input.len_of(axis);
        let mut shape = input.raw_dim();
        shape[axis.index()] = Self::resampled_len(len, in_spacing, out_spacing);
        let mut output = Array3::<f32>::zeros(shape);
        if len == 0 {
            return output;
        }
        let step = out_spacing / in_spacing;

        Zip::from(output.lanes_mut(axis))
            .and(input.lanes(axis))
            .par_for_each(|out, lane| Self::resample_lane(lane, out, step, interpolation));
        output
    }
}
