//! Detail-based sharpness measure used by quality estimation.
//!
//! A region's quality is the mean absolute difference between the region
//! and a box-blurred copy of itself. Fine detail that turbulence smears out
//! disappears under the blur, so sharper renditions score higher.

use ndarray::{Array2, ArrayView2};

/// Box blur with a `(2 * radius + 1)` square kernel; edges are clamped.
///
/// Implemented as two 1D running-sum passes.
pub fn box_blur(data: &ArrayView2<f32>, radius: u32) -> Array2<f32> {
    let (h, w) = data.dim();
    if radius == 0 || h == 0 || w == 0 {
        return data.to_owned();
    }
    let r = radius as isize;
    let norm = 1.0 / (2 * radius + 1) as f32;

    let mut horizontal = Array2::<f32>::zeros((h, w));
    for row in 0..h {
        let at = |c: isize| data[[row, c.clamp(0, w as isize - 1) as usize]];
        let mut acc: f32 = (-r..=r).map(at).sum();
        for col in 0..w {
            horizontal[[row, col]] = acc * norm;
            let c = col as isize;
            acc += at(c + r + 1) - at(c - r);
        }
    }

    let mut result = Array2::<f32>::zeros((h, w));
    for col in 0..w {
        let at = |rr: isize| horizontal[[rr.clamp(0, h as isize - 1) as usize, col]];
        let mut acc: f32 = (-r..=r).map(at).sum();
        for row in 0..h {
            result[[row, col]] = acc * norm;
            let rr = row as isize;
            acc += at(rr + r + 1) - at(rr - r);
        }
    }

    result
}

/// Mean absolute difference between `area` and its box blur.
pub fn area_quality(area: &ArrayView2<f32>, detail_scale: u32) -> f64 {
    if area.is_empty() {
        return 0.0;
    }
    let blurred = box_blur(area, detail_scale);
    let total: f64 = area
        .iter()
        .zip(blurred.iter())
        .map(|(&a, &b)| (a - b).abs() as f64)
        .sum();
    total / area.len() as f64
}
