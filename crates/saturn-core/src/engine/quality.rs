use ndarray::s;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::error::{try_reserve, Result, SaturnError};
use crate::frame::{ImageData, Rect};
use crate::quality::area_quality;
use crate::sequence::ImageSequence;

use super::alignment::ImageAlignment;
use super::Step;

/// Quality estimation: scores every aligned frame over a grid of square
/// areas and assembles the best-fragments composite.
pub struct QualityEstimation {
    alignment: ImageAlignment,
    intersection: Rect,
    /// Areas in intersection coordinates.
    areas: Vec<Rect>,
    detail_scale: u32,
    frame_quality: Vec<f32>,
    best_area_quality: Vec<f64>,
    best_fragments: Option<ImageData>,
    best_frame: Option<(usize, f32)>,
    next: usize,
    last_aligned: Option<ImageData>,
}

impl QualityEstimation {
    pub fn new(alignment: ImageAlignment, area_size: u32, detail_scale: u32) -> Result<Self> {
        let intersection = alignment.intersection().ok_or_else(|| {
            SaturnError::InvalidParameters("image alignment has not completed".into())
        })?;
        if area_size == 0 {
            return Err(SaturnError::InvalidParameters("quality area size is 0".into()));
        }

        let areas = area_grid(intersection.width, intersection.height, area_size);
        debug!(areas = areas.len(), "Quality estimation areas");

        let frame_count = alignment.frame_count();
        let mut frame_quality = Vec::new();
        try_reserve(&mut frame_quality, frame_count, "frame qualities")?;
        let mut best_area_quality = Vec::new();
        try_reserve(&mut best_area_quality, areas.len(), "area qualities")?;
        best_area_quality.resize(areas.len(), f64::NEG_INFINITY);

        Ok(Self {
            alignment,
            intersection,
            areas,
            detail_scale,
            frame_quality,
            best_area_quality,
            best_fragments: None,
            best_frame: None,
            next: 0,
            last_aligned: None,
        })
    }

    /// Score the next active frame.
    pub fn step(&mut self, sequence: &mut ImageSequence) -> Result<Step> {
        let count = self.alignment.frame_count();
        if self.next >= count {
            return Ok(Step::LastStep);
        }

        let aligned = self.aligned_image(sequence, self.next)?;
        let lum = aligned.luminance();
        let detail_scale = self.detail_scale;
        let qualities: Vec<f64> = self
            .areas
            .par_iter()
            .map(|a| {
                let view = lum.data.slice(s![
                    a.y as usize..a.y as usize + a.height as usize,
                    a.x as usize..a.x as usize + a.width as usize
                ]);
                area_quality(&view, detail_scale)
            })
            .collect();

        let quality = if qualities.is_empty() {
            0.0
        } else {
            (qualities.iter().sum::<f64>() / qualities.len() as f64) as f32
        };
        self.frame_quality.push(quality);
        if self.best_frame.is_none_or(|(_, q)| quality > q) {
            self.best_frame = Some((self.next, quality));
        }
        self.update_best_fragments(&aligned, &qualities);
        debug!(frame = self.next, quality, "Frame quality");

        self.last_aligned = Some(aligned);
        self.next += 1;

        if self.next < count {
            Ok(Step::Continue)
        } else {
            info!(
                best_frame = self.best_frame_index(),
                frames = self.frame_quality.len(),
                "Quality estimation complete"
            );
            Ok(Step::LastStep)
        }
    }

    fn update_best_fragments(&mut self, aligned: &ImageData, qualities: &[f64]) {
        let composite = self.best_fragments.get_or_insert_with(|| aligned.clone());
        for ((area, &q), best) in self
            .areas
            .iter()
            .zip(qualities)
            .zip(self.best_area_quality.iter_mut())
        {
            if q > *best {
                *best = q;
                copy_area(aligned, composite, area);
            }
        }
    }

    /// Active frame `index` cropped to the intersection.
    pub fn aligned_image(&self, sequence: &mut ImageSequence, index: usize) -> Result<ImageData> {
        let rect = self
            .alignment
            .frame_intersection(index)
            .ok_or(SaturnError::FrameIndexOutOfRange {
                index,
                total: self.alignment.frame_count(),
            })?;
        Ok(sequence.image_at(index)?.crop(&rect))
    }

    pub fn is_complete(&self) -> bool {
        self.frame_quality.len() == self.alignment.frame_count()
    }

    pub fn alignment(&self) -> &ImageAlignment {
        &self.alignment
    }

    pub fn intersection(&self) -> Rect {
        self.intersection
    }

    /// Quality of each processed active frame, chronologically.
    pub fn frame_qualities(&self) -> &[f32] {
        &self.frame_quality
    }

    pub fn best_frame_index(&self) -> usize {
        self.best_frame.map(|(i, _)| i).unwrap_or(0)
    }

    /// Composite of the sharpest rendition of every area.
    pub fn best_fragments(&self) -> Option<&ImageData> {
        self.best_fragments.as_ref()
    }

    /// The last scored frame, aligned.
    pub fn last_aligned(&self) -> Option<&ImageData> {
        self.last_aligned.as_ref()
    }

    pub fn current_frame(&self) -> usize {
        self.next.saturating_sub(1)
    }
}

/// Tile `width` x `height` with squares of `size`; the last row and column
/// are clipped.
fn area_grid(width: u32, height: u32, size: u32) -> Vec<Rect> {
    let mut areas = Vec::new();
    let mut y = 0;
    while y < height {
        let mut x = 0;
        while x < width {
            areas.push(Rect::new(
                x as i32,
                y as i32,
                size.min(width - x),
                size.min(height - y),
            ));
            x += size;
        }
        y += size;
    }
    areas
}

/// Copy `area` of `src` into `dst`, converting `src` to the layout of `dst`
/// first when they differ.
fn copy_area(src: &ImageData, dst: &mut ImageData, area: &Rect) {
    let converted;
    let src = if src.is_color() == dst.is_color() {
        src
    } else {
        converted = src.clone().into_layout(dst.is_color());
        &converted
    };
    let (y0, x0) = (area.y as usize, area.x as usize);
    let (y1, x1) = (y0 + area.height as usize, x0 + area.width as usize);
    for (from, to) in src.channels().into_iter().zip(dst.channels_mut()) {
        to.slice_mut(s![y0..y1, x0..x1])
            .assign(&from.slice(s![y0..y1, x0..x1]));
    }
}
