//! Triangle-wise warping of frames into the stacking grid.

use ndarray::Array2;

use crate::align::bilinear_sample;
use crate::error::{try_reserve, Result};
use crate::frame::{ColorFrame, Frame, ImageData, PointF};

use super::triangulation::orientation;

/// Running per-pixel sums of warped frame content.
pub struct StackAccumulator {
    sums: Vec<Array2<f32>>,
    weights: Array2<f32>,
    bit_depth: u8,
}

impl StackAccumulator {
    /// Accumulator for `channels` planes of `width` x `height`.
    pub fn new(channels: usize, width: usize, height: usize, bit_depth: u8) -> Result<Self> {
        let mut sums = Vec::new();
        try_reserve(&mut sums, channels, "stack channel list")?;
        for _ in 0..channels {
            sums.push(zeroed_plane(width, height)?);
        }
        Ok(Self {
            sums,
            weights: zeroed_plane(width, height)?,
            bit_depth,
        })
    }

    pub fn dim(&self) -> (usize, usize) {
        self.weights.dim()
    }

    pub fn channel_count(&self) -> usize {
        self.sums.len()
    }

    /// Warp the triangle `src` of `planes` (frame coordinates) onto the
    /// triangle `dst` (stacking coordinates) and add it to the sums.
    ///
    /// Pixels whose source position falls outside the frame are skipped.
    pub fn add_triangle(&mut self, planes: &[&Array2<f32>], src: [PointF; 3], dst: [PointF; 3]) {
        let area = orientation(dst[0], dst[1], dst[2]);
        if area.abs() < 1e-9 || planes.len() != self.sums.len() {
            return;
        }
        let (h, w) = self.weights.dim();
        let (src_h, src_w) = planes[0].dim();

        let min_x = dst.iter().map(|p| p.x).fold(f64::INFINITY, f64::min).floor().max(0.0) as usize;
        let min_y = dst.iter().map(|p| p.y).fold(f64::INFINITY, f64::min).floor().max(0.0) as usize;
        let max_x = dst.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max).ceil();
        let max_y = dst.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max).ceil();
        if max_x < 0.0 || max_y < 0.0 {
            return;
        }
        let max_x = (max_x as usize).min(w.saturating_sub(1));
        let max_y = (max_y as usize).min(h.saturating_sub(1));

        const EDGE_TOLERANCE: f64 = -1e-9;

        for y in min_y..=max_y {
            for x in min_x..=max_x {
                let p = PointF::new(x as f64, y as f64);
                let l0 = orientation(dst[1], dst[2], p) / area;
                let l1 = orientation(dst[2], dst[0], p) / area;
                let l2 = 1.0 - l0 - l1;
                if l0 < EDGE_TOLERANCE || l1 < EDGE_TOLERANCE || l2 < EDGE_TOLERANCE {
                    continue;
                }

                let sx = l0 * src[0].x + l1 * src[1].x + l2 * src[2].x;
                let sy = l0 * src[0].y + l1 * src[1].y + l2 * src[2].y;
                if sx < 0.0 || sy < 0.0 || sx > (src_w - 1) as f64 || sy > (src_h - 1) as f64 {
                    continue;
                }

                for (sum, plane) in self.sums.iter_mut().zip(planes) {
                    sum[[y, x]] += bilinear_sample(plane, sy, sx);
                }
                self.weights[[y, x]] += 1.0;
            }
        }
    }

    /// Current mean; pixels without contributions are filled from
    /// `fallback` when given, else left black.
    pub fn mean(&self, fallback: Option<&ImageData>) -> ImageData {
        let fallback_planes = fallback.map(|f| f.channels());
        let planes: Vec<Array2<f32>> = self
            .sums
            .iter()
            .enumerate()
            .map(|(ch, sum)| {
                let mut out = sum.clone();
                for ((pos, v), &wgt) in out.indexed_iter_mut().zip(self.weights.iter()) {
                    if wgt > 0.0 {
                        *v /= wgt;
                    } else {
                        *v = fallback_planes
                            .as_ref()
                            .and_then(|fp| fp.get(ch).or_else(|| fp.first()))
                            .and_then(|plane| plane.get(pos).copied())
                            .unwrap_or(0.0);
                    }
                }
                out
            })
            .collect();

        let mut planes = planes.into_iter();
        match (planes.next(), planes.next(), planes.next()) {
            (Some(red), Some(green), Some(blue)) => ImageData::Color(ColorFrame {
                red: Frame::new(red, self.bit_depth),
                green: Frame::new(green, self.bit_depth),
                blue: Frame::new(blue, self.bit_depth),
            }),
            (Some(mono), _, _) => ImageData::Mono(Frame::new(mono, self.bit_depth)),
            _ => ImageData::Mono(Frame::new(Array2::zeros(self.weights.dim()), self.bit_depth)),
        }
    }

    /// Number of contributions per pixel.
    pub fn weights(&self) -> &Array2<f32> {
        &self.weights
    }
}

fn zeroed_plane(width: usize, height: usize) -> Result<Array2<f32>> {
    let len = width
        .checked_mul(height)
        .ok_or_else(|| crate::error::SaturnError::OutOfMemory("stack plane size".into()))?;
    let mut buf: Vec<f32> = Vec::new();
    try_reserve(&mut buf, len, "stack plane")?;
    buf.resize(len, 0.0);
    Array2::from_shape_vec((height, width), buf)
        .map_err(|e| crate::error::SaturnError::InvalidParameters(e.to_string()))
}
