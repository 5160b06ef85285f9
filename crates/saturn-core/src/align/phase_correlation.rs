use std::sync::Arc;

use ndarray::Array2;
use num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::error::{Result, SaturnError};
use crate::frame::AlignmentOffset;

/// Outcome of correlating a target window against a reference window.
#[derive(Clone, Debug)]
pub struct Correlation {
    /// How far the target content is displaced relative to the reference.
    pub displacement: AlignmentOffset,
    /// Correlation peak divided by the mean absolute correlation.
    pub confidence: f64,
}

/// FFT phase correlator with a fixed reference window.
///
/// The reference spectrum and FFT plans are computed once, so tracking the
/// same block through many frames costs one forward and one inverse
/// transform per frame.
pub struct PhaseCorrelator {
    height: usize,
    width: usize,
    reference_fft: Array2<Complex<f64>>,
    fwd_row: Arc<dyn Fft<f64>>,
    fwd_col: Arc<dyn Fft<f64>>,
    inv_row: Arc<dyn Fft<f64>>,
    inv_col: Arc<dyn Fft<f64>>,
}

impl PhaseCorrelator {
    pub fn new(reference: &Array2<f32>) -> Self {
        let (h, w) = reference.dim();
        let mut planner = FftPlanner::new();
        let mut correlator = Self {
            height: h,
            width: w,
            reference_fft: Array2::zeros((h, w)),
            fwd_row: planner.plan_fft_forward(w),
            fwd_col: planner.plan_fft_forward(h),
            inv_row: planner.plan_fft_inverse(w),
            inv_col: planner.plan_fft_inverse(h),
        };
        correlator.reference_fft = correlator.fft2d(&apply_hann(reference));
        correlator
    }

    pub fn dim(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    /// Measure the displacement of `target` relative to the reference.
    pub fn correlate(&self, target: &Array2<f32>) -> Result<Correlation> {
        let (th, tw) = target.dim();
        if th != self.height || tw != self.width {
            return Err(SaturnError::InvalidParameters(format!(
                "Correlation window size mismatch: {}x{} vs {}x{}",
                self.width, self.height, tw, th
            )));
        }

        let tgt_fft = self.fft2d(&apply_hann(target));
        let cross_power = normalized_cross_power(&self.reference_fft, &tgt_fft);
        let correlation = self.ifft2d(cross_power);

        let (peak_row, peak_col, peak_val) = find_peak(&correlation);
        let (h, w) = (self.height, self.width);

        // Peak position is the shift that brings the target back onto the
        // reference; negate it to get the target's displacement.
        let signed = |peak: usize, n: usize| {
            if peak > n / 2 {
                peak as f64 - n as f64
            } else {
                peak as f64
            }
        };
        let (sub_dy, sub_dx) = refine_peak_paraboloid(&correlation, peak_row, peak_col);
        let dy = signed(peak_row, h) + sub_dy;
        let dx = signed(peak_col, w) + sub_dx;

        let mean_abs = correlation.iter().map(|v| v.abs()).sum::<f64>() / (h * w) as f64;
        let confidence = if mean_abs > 1e-12 {
            peak_val / mean_abs
        } else {
            0.0
        };

        Ok(Correlation {
            displacement: AlignmentOffset { dx: -dx, dy: -dy },
            confidence,
        })
    }

    /// 2D FFT: row-wise FFT, then column-wise FFT.
    fn fft2d(&self, data: &Array2<f32>) -> Array2<Complex<f64>> {
        let (h, w) = data.dim();
        let mut result = data.mapv(|v| Complex::new(v as f64, 0.0));

        for mut row in result.rows_mut() {
            let mut row_data: Vec<Complex<f64>> = row.to_vec();
            self.fwd_row.process(&mut row_data);
            row.assign(&ndarray::ArrayView1::from(row_data.as_slice()));
        }

        let mut col_data = vec![Complex::new(0.0, 0.0); h];
        for col in 0..w {
            for row in 0..h {
                col_data[row] = result[[row, col]];
            }
            self.fwd_col.process(&mut col_data);
            for row in 0..h {
                result[[row, col]] = col_data[row];
            }
        }

        result
    }

    /// Inverse 2D FFT, real part, normalized.
    fn ifft2d(&self, mut work: Array2<Complex<f64>>) -> Array2<f64> {
        let (h, w) = work.dim();

        let mut col_data = vec![Complex::new(0.0, 0.0); h];
        for col in 0..w {
            for row in 0..h {
                col_data[row] = work[[row, col]];
            }
            self.inv_col.process(&mut col_data);
            for row in 0..h {
                work[[row, col]] = col_data[row];
            }
        }

        for mut row in work.rows_mut() {
            let mut row_data: Vec<Complex<f64>> = row.to_vec();
            self.inv_row.process(&mut row_data);
            row.assign(&ndarray::ArrayView1::from(row_data.as_slice()));
        }

        let scale = 1.0 / (h * w) as f64;
        work.mapv(|c| c.re * scale)
    }
}

/// Correlate two equally sized arrays once.
pub fn compute_offset_with_confidence(
    reference: &Array2<f32>,
    target: &Array2<f32>,
) -> Result<Correlation> {
    PhaseCorrelator::new(reference).correlate(target)
}

fn apply_hann(data: &Array2<f32>) -> Array2<f32> {
    let (h, w) = data.dim();
    let wy: Vec<f64> = (0..h)
        .map(|r| 0.5 * (1.0 - (std::f64::consts::TAU * r as f64 / h as f64).cos()))
        .collect();
    let wx: Vec<f64> = (0..w)
        .map(|c| 0.5 * (1.0 - (std::f64::consts::TAU * c as f64 / w as f64).cos()))
        .collect();

    Array2::from_shape_fn((h, w), |(r, c)| data[[r, c]] * (wy[r] * wx[c]) as f32)
}

fn normalized_cross_power(
    ref_fft: &Array2<Complex<f64>>,
    tgt_fft: &Array2<Complex<f64>>,
) -> Array2<Complex<f64>> {
    let mut result = ref_fft.clone();
    result.zip_mut_with(tgt_fft, |r, t| {
        let cross = *r * t.conj();
        let mag = cross.norm();
        *r = if mag > 1e-12 {
            cross / mag
        } else {
            Complex::new(0.0, 0.0)
        };
    });
    result
}

fn find_peak(data: &Array2<f64>) -> (usize, usize, f64) {
    let mut best = (0, 0, f64::NEG_INFINITY);
    for ((row, col), &v) in data.indexed_iter() {
        if v > best.2 {
            best = (row, col, v);
        }
    }
    best
}

/// Paraboloid refinement of the correlation peak. The surface is periodic,
/// so neighbours wrap around the edges.
///
/// Returns (delta_row, delta_col) as fractional offsets from the integer peak.
fn refine_peak_paraboloid(correlation: &Array2<f64>, peak_row: usize, peak_col: usize) -> (f64, f64) {
    let (h, w) = correlation.dim();
    if h < 3 || w < 3 {
        return (0.0, 0.0);
    }

    let fit = |prev: f64, curr: f64, next: f64| {
        let denom = prev - 2.0 * curr + next;
        if denom.abs() > 1e-12 {
            ((prev - next) / (2.0 * denom)).clamp(-0.5, 0.5)
        } else {
            0.0
        }
    };

    let up = (peak_row + h - 1) % h;
    let down = (peak_row + 1) % h;
    let left = (peak_col + w - 1) % w;
    let right = (peak_col + 1) % w;
    let centre = correlation[[peak_row, peak_col]];

    (
        fit(correlation[[up, peak_col]], centre, correlation[[down, peak_col]]),
        fit(correlation[[peak_row, left]], centre, correlation[[peak_row, right]]),
    )
}

/// Bilinear sample with zero outside the array.
pub fn bilinear_sample(data: &Array2<f32>, y: f64, x: f64) -> f32 {
    let (h, w) = data.dim();

    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    let x1 = x0 + 1;
    let y1 = y0 + 1;

    let fx = (x - x0 as f64) as f32;
    let fy = (y - y0 as f64) as f32;

    let sample = |r: i64, c: i64| -> f32 {
        if r >= 0 && r < h as i64 && c >= 0 && c < w as i64 {
            data[[r as usize, c as usize]]
        } else {
            0.0
        }
    };

    sample(y0, x0) * (1.0 - fx) * (1.0 - fy)
        + sample(y0, x1) * fx * (1.0 - fy)
        + sample(y1, x0) * (1.0 - fx) * fy
        + sample(y1, x1) * fx * fy
}
