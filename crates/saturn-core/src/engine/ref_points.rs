use ndarray::{s, Array2};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::consts::EPSILON;
use crate::error::{try_reserve, Result, SaturnError};
use crate::frame::{ImageData, Point, PointF, Rect};
use crate::job::{QualityCriterion, RefPtAutoPlacementParams};
use crate::quality::{box_blur, select_frames};
use crate::sequence::ImageSequence;
use crate::stack::Triangulation;

use super::block_match::find_match;
use super::quality::QualityEstimation;
use super::Step;

/// A point tracked by block matching, in intersection coordinates.
#[derive(Clone, Debug)]
pub struct RefPoint {
    pub position: Point,
    /// Envelope vertex: not tracked, identical in every frame.
    pub fixed: bool,
    /// Matched position per active frame; `None` where invalid.
    tracked: Vec<Option<PointF>>,
}

impl RefPoint {
    fn new(position: Point, fixed: bool, frame_count: usize) -> Result<Self> {
        let mut tracked = Vec::new();
        try_reserve(&mut tracked, frame_count, "reference point positions")?;
        Ok(Self {
            position,
            fixed,
            tracked,
        })
    }

    /// Position in active frame `index`, if valid there.
    pub fn position_in_frame(&self, index: usize) -> Option<PointF> {
        self.tracked.get(index).copied().flatten()
    }

    /// Mean of all valid tracked positions.
    fn mean_position(&self) -> PointF {
        if self.fixed {
            return self.position.to_f();
        }
        let valid: Vec<PointF> = self.tracked.iter().flatten().copied().collect();
        if valid.is_empty() {
            return self.position.to_f();
        }
        let n = valid.len() as f64;
        PointF::new(
            valid.iter().map(|p| p.x).sum::<f64>() / n,
            valid.iter().map(|p| p.y).sum::<f64>() / n,
        )
    }
}

/// Reference point alignment: tracks every reference point through the
/// selected frames and computes the final stacking positions.
pub struct RefPointAlignment {
    quality: QualityEstimation,
    selected: Vec<bool>,
    /// Reference points first, envelope vertices last.
    points: Vec<RefPoint>,
    reference_blocks: Vec<Option<Array2<f32>>>,
    triangulation: Triangulation,
    search_radius: u32,
    next: usize,
    /// Most recent selected frame, cropped to the intersection.
    last_aligned: Option<ImageData>,
    final_positions: Option<Vec<PointF>>,
}

impl RefPointAlignment {
    /// `manual_points` empty selects automatic placement with `auto`.
    pub fn new(
        quality: QualityEstimation,
        criterion: QualityCriterion,
        manual_points: &[Point],
        auto: &RefPtAutoPlacementParams,
        block_size: u32,
        search_radius: u32,
    ) -> Result<Self> {
        if !quality.is_complete() {
            return Err(SaturnError::InvalidParameters(
                "quality estimation has not completed".into(),
            ));
        }
        if block_size < 4 {
            return Err(SaturnError::InvalidParameters(format!(
                "reference point block size {block_size} is too small"
            )));
        }
        let reference = quality
            .best_fragments()
            .ok_or_else(|| SaturnError::InvalidParameters("no best-fragments image".into()))?
            .luminance()
            .data;

        let selected = select_frames(criterion, quality.frame_qualities());
        let frame_count = selected.len();
        let intersection = quality.intersection();

        let placed = if manual_points.is_empty() {
            let pts = auto_place(&reference, auto, block_size);
            info!(count = pts.len(), "Reference points placed automatically");
            pts
        } else {
            let (keep, dropped): (Vec<Point>, Vec<Point>) = manual_points
                .iter()
                .copied()
                .partition(|&p| block_fits(p, block_size, intersection.width, intersection.height));
            if !dropped.is_empty() {
                warn!(count = dropped.len(), "Reference points too close to the border dropped");
            }
            keep
        };

        let mut points = Vec::new();
        try_reserve(&mut points, placed.len() + 8, "reference points")?;
        for &p in &placed {
            points.push(RefPoint::new(p, false, frame_count)?);
        }
        for p in envelope(intersection) {
            if !placed.contains(&p) {
                points.push(RefPoint::new(p, true, frame_count)?);
            }
        }

        let reference_blocks = points
            .iter()
            .map(|p| (!p.fixed).then(|| cut_block(&reference, p.position, block_size)))
            .collect();

        let vertices: Vec<PointF> = points.iter().map(|p| p.position.to_f()).collect();
        let triangulation = Triangulation::build(&vertices)?;
        debug!(triangles = triangulation.triangles().len(), "Reference point triangulation");

        Ok(Self {
            quality,
            selected,
            points,
            reference_blocks,
            triangulation,
            search_radius,
            next: 0,
            last_aligned: None,
            final_positions: None,
        })
    }

    /// Track all points in the next active frame.
    pub fn step(&mut self, sequence: &mut ImageSequence) -> Result<Step> {
        let count = self.selected.len();
        if self.next >= count {
            return Ok(Step::LastStep);
        }
        let k = self.next;

        if self.selected[k] {
            let frame = sequence.image_at(k)?;
            let image = frame.luminance().data;
            let rect = self.quality.alignment().frame_intersection(k);
            let origin = rect.map(|r| Point::new(r.x, r.y)).unwrap_or_default();
            let radius = self.search_radius;

            let matches: Vec<Option<PointF>> = self
                .points
                .par_iter()
                .zip(self.reference_blocks.par_iter())
                .map(|(p, block)| match block {
                    None => Some(p.position.to_f()),
                    Some(block) => find_match(&block.view(), &image, p.position + origin, radius)
                        .map(|(c, _)| (c - origin).to_f()),
                })
                .collect();
            for (p, m) in self.points.iter_mut().zip(matches) {
                p.tracked.push(m);
            }
            self.last_aligned = rect.map(|r| frame.crop(&r));
        } else {
            for p in &mut self.points {
                p.tracked.push(p.fixed.then(|| p.position.to_f()));
            }
        }

        self.next += 1;
        if self.next < count {
            return Ok(Step::Continue);
        }

        self.final_positions = Some(self.points.iter().map(RefPoint::mean_position).collect());
        info!(
            points = self.points.len(),
            selected = self.selected_count(),
            "Reference point alignment complete"
        );
        Ok(Step::LastStep)
    }

    pub fn is_complete(&self) -> bool {
        self.final_positions.is_some()
    }

    pub fn quality(&self) -> &QualityEstimation {
        &self.quality
    }

    /// Frames chosen by the quality criterion, per active frame.
    pub fn selected_frames(&self) -> &[bool] {
        &self.selected
    }

    pub fn selected_count(&self) -> usize {
        self.selected.iter().filter(|&&s| s).count()
    }

    /// All triangulated points, envelope included.
    pub fn points(&self) -> &[RefPoint] {
        &self.points
    }

    /// Positions of the non-envelope points as placed.
    pub fn reference_points(&self) -> Vec<Point> {
        self.points
            .iter()
            .filter(|p| !p.fixed)
            .map(|p| p.position)
            .collect()
    }

    /// Non-envelope points in the last processed frame: position and
    /// validity. Invalid points report their placed position.
    pub fn current_positions(&self) -> Vec<(PointF, bool)> {
        let k = self.next.saturating_sub(1);
        self.points
            .iter()
            .filter(|p| !p.fixed)
            .map(|p| match p.position_in_frame(k) {
                Some(pos) => (pos, true),
                None => (p.position.to_f(), false),
            })
            .collect()
    }

    pub fn triangulation(&self) -> &Triangulation {
        &self.triangulation
    }

    /// Mean tracked positions; set after the last step.
    pub fn final_positions(&self) -> Option<&[PointF]> {
        self.final_positions.as_deref()
    }

    pub fn current_frame(&self) -> usize {
        self.next.saturating_sub(1)
    }

    /// The most recently tracked frame, cropped to the intersection.
    pub fn last_aligned(&self) -> Option<&ImageData> {
        self.last_aligned.as_ref()
    }
}

/// Place reference points on a grid over `image` where it is bright and
/// structured enough.
pub fn auto_place(
    image: &Array2<f32>,
    params: &RefPtAutoPlacementParams,
    block_size: u32,
) -> Vec<Point> {
    let (h, w) = image.dim();
    let spacing = params.spacing.max(1) as usize;

    let (min, max) = image
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let cutoff = min + (max - min) * params.brightness_threshold.clamp(0.0, 1.0);
    let blurred = box_blur(&image.view(), params.structure_scale.max(1));
    let half = (block_size / 2) as usize;

    let mut points = Vec::new();
    for y in (spacing / 2..h).step_by(spacing) {
        for x in (spacing / 2..w).step_by(spacing) {
            let p = Point::new(x as i32, y as i32);
            if !block_fits(p, block_size, w as u32, h as u32) || blurred[[y, x]] < cutoff {
                continue;
            }
            let (x0, y0) = (x - half, y - half);
            let b = block_size as usize;
            let block = blurred.slice(s![y0..y0 + b, x0..x0 + b]);
            let (lo, hi) = block
                .iter()
                .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
            if hi / lo.max(EPSILON) >= params.structure_threshold {
                points.push(p);
            }
        }
    }
    points
}

/// Whether a block of `block_size` centred on `p` lies inside
/// `width` x `height`.
fn block_fits(p: Point, block_size: u32, width: u32, height: u32) -> bool {
    let half = (block_size / 2) as i32;
    let (x0, y0) = (p.x - half, p.y - half);
    x0 >= 0
        && y0 >= 0
        && x0 + block_size as i32 <= width as i32
        && y0 + block_size as i32 <= height as i32
}

fn cut_block(image: &Array2<f32>, centre: Point, block_size: u32) -> Array2<f32> {
    let half = (block_size / 2) as i32;
    let (x0, y0) = ((centre.x - half) as usize, (centre.y - half) as usize);
    let b = block_size as usize;
    image.slice(s![y0..y0 + b, x0..x0 + b]).to_owned()
}

/// Corners and edge midpoints of the intersection, in its own coordinates.
fn envelope(intersection: Rect) -> Vec<Point> {
    let (w, h) = (intersection.width as i32 - 1, intersection.height as i32 - 1);
    let mut pts = vec![
        Point::new(0, 0),
        Point::new(w / 2, 0),
        Point::new(w, 0),
        Point::new(0, h / 2),
        Point::new(w, h / 2),
        Point::new(0, h),
        Point::new(w / 2, h),
        Point::new(w, h),
    ];
    pts.dedup();
    pts.sort_by_key(|p| (p.y, p.x));
    pts.dedup();
    pts
}
