//! Intensity-weighted centroid used by centroid alignment.

use ndarray::Array2;
use rayon::prelude::*;

use crate::consts::PARALLEL_PIXEL_THRESHOLD;
use crate::frame::PointF;

/// Centre of mass of pixels brighter than `threshold * max_intensity`.
///
/// An all-black image yields its geometric centre.
pub fn centroid(data: &Array2<f32>, threshold: f32) -> PointF {
    let (h, w) = data.dim();
    let max_val = data.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let centre = PointF::new(w as f64 / 2.0, h as f64 / 2.0);

    if max_val <= 0.0 {
        return centre;
    }

    let cutoff = threshold * max_val;
    let row_sum = |row: usize| {
        let mut acc = (0.0f64, 0.0f64, 0.0f64);
        for col in 0..w {
            let val = data[[row, col]];
            if val > cutoff {
                let weight = val as f64;
                acc.0 += col as f64 * weight;
                acc.1 += row as f64 * weight;
                acc.2 += weight;
            }
        }
        acc
    };
    let add = |a: (f64, f64, f64), b: (f64, f64, f64)| (a.0 + b.0, a.1 + b.1, a.2 + b.2);

    let (sum_x, sum_y, sum_w) = if h * w >= PARALLEL_PIXEL_THRESHOLD {
        (0..h)
            .into_par_iter()
            .map(row_sum)
            .reduce(|| (0.0, 0.0, 0.0), add)
    } else {
        (0..h).map(row_sum).fold((0.0, 0.0, 0.0), add)
    };

    if sum_w > 0.0 {
        PointF::new(sum_x / sum_w, sum_y / sum_w)
    } else {
        centre
    }
}
