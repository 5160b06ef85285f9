use ndarray::{s, Array2};
use tracing::{debug, info};

use crate::align::{centroid, PhaseCorrelator};
use crate::consts::{DEFAULT_CENTROID_THRESHOLD, MIN_CORRELATION_CONFIDENCE};
use crate::error::{try_reserve, Result, SaturnError};
use crate::frame::{ImageData, Point, PointF, Rect};
use crate::job::AlignmentMethod;
use crate::sequence::ImageSequence;

use super::Step;

/// An anchor followed through the sequence by phase correlation.
struct AnchorTracker {
    /// Reference window from the first frame; built on the first step.
    correlator: Option<PhaseCorrelator>,
    initial: Point,
    position: PointF,
    valid: bool,
}

/// Image alignment: measures each active frame's translation relative to
/// the first one and derives the area visible in all frames.
pub struct ImageAlignment {
    method: AlignmentMethod,
    anchors: Vec<AnchorTracker>,
    block_size: usize,
    first_centroid: Option<PointF>,
    current_centroid: Option<PointF>,
    /// Displacement of each processed frame's content relative to frame 0.
    offsets: Vec<Point>,
    frame_count: usize,
    frame_size: (u32, u32),
    intersection: Option<Rect>,
    next: usize,
    last_image: Option<ImageData>,
}

impl ImageAlignment {
    pub fn new(
        sequence: &ImageSequence,
        method: AlignmentMethod,
        anchors: &[Point],
        block_size: u32,
    ) -> Result<Self> {
        let frame_count = sequence.active_image_count();
        if frame_count == 0 {
            return Err(SaturnError::NoActiveImages);
        }
        if method == AlignmentMethod::Anchors && anchors.is_empty() {
            return Err(SaturnError::InvalidParameters(
                "anchor alignment needs at least one anchor".into(),
            ));
        }

        let mut offsets = Vec::new();
        try_reserve(&mut offsets, frame_count, "alignment offsets")?;

        let trackers = match method {
            AlignmentMethod::Anchors => anchors
                .iter()
                .map(|&a| AnchorTracker {
                    correlator: None,
                    initial: a,
                    position: a.to_f(),
                    valid: true,
                })
                .collect(),
            AlignmentMethod::Centroid => Vec::new(),
        };

        Ok(Self {
            method,
            anchors: trackers,
            block_size: block_size.max(8) as usize,
            first_centroid: None,
            current_centroid: None,
            offsets,
            frame_count,
            frame_size: sequence.dimensions()?,
            intersection: None,
            next: 0,
            last_image: None,
        })
    }

    /// Align the next active frame.
    pub fn step(&mut self, sequence: &mut ImageSequence) -> Result<Step> {
        if self.next >= self.frame_count {
            return Ok(Step::LastStep);
        }

        let image = sequence.image_at(self.next)?;
        let lum = image.luminance();
        let offset = match self.method {
            AlignmentMethod::Anchors => self.track_anchors(&lum.data)?,
            AlignmentMethod::Centroid => self.track_centroid(&lum.data),
        };
        debug!(frame = self.next, dx = offset.x, dy = offset.y, "Frame aligned");

        self.offsets.push(offset);
        self.last_image = Some(image);
        self.next += 1;

        if self.next < self.frame_count {
            return Ok(Step::Continue);
        }

        let intersection = self.compute_intersection()?;
        info!(
            x = intersection.x,
            y = intersection.y,
            width = intersection.width,
            height = intersection.height,
            "Images' intersection"
        );
        self.intersection = Some(intersection);
        Ok(Step::LastStep)
    }

    fn track_anchors(&mut self, image: &Array2<f32>) -> Result<Point> {
        let first = self.next == 0;
        let block = self.block_size;
        let mut displacements: Vec<(PointF, f64)> = Vec::new();

        for anchor in self.anchors.iter_mut().filter(|a| a.valid) {
            let centre = anchor.position.round();
            let Some(window) = cut_window(image, centre, block) else {
                anchor.valid = false;
                debug!(x = anchor.initial.x, y = anchor.initial.y, "Anchor left the frame");
                continue;
            };

            let confidence = match &anchor.correlator {
                None => {
                    anchor.correlator = Some(PhaseCorrelator::new(&window));
                    anchor.position = centre.to_f();
                    continue;
                }
                Some(correlator) => {
                    let corr = correlator.correlate(&window)?;
                    anchor.position = PointF::new(
                        centre.x as f64 + corr.displacement.dx,
                        centre.y as f64 + corr.displacement.dy,
                    );
                    corr.confidence
                }
            };
            let initial = anchor.initial.to_f();
            displacements.push((
                PointF::new(anchor.position.x - initial.x, anchor.position.y - initial.y),
                confidence,
            ));
        }

        if first {
            return if self.anchors.iter().any(|a| a.valid) {
                Ok(Point::default())
            } else {
                Err(SaturnError::AlignmentLost(
                    "no anchor fits inside the first frame".into(),
                ))
            };
        }

        if displacements.is_empty() {
            return Err(SaturnError::AlignmentLost(format!(
                "all anchors lost at frame {}",
                self.next
            )));
        }

        let trusted: Vec<PointF> = displacements
            .iter()
            .filter(|(_, c)| *c >= MIN_CORRELATION_CONFIDENCE)
            .map(|(d, _)| *d)
            .collect();
        let used: Vec<PointF> = if trusted.is_empty() {
            displacements.iter().map(|(d, _)| *d).collect()
        } else {
            trusted
        };
        let n = used.len() as f64;
        let mean = PointF::new(
            used.iter().map(|d| d.x).sum::<f64>() / n,
            used.iter().map(|d| d.y).sum::<f64>() / n,
        );
        Ok(mean.round())
    }

    fn track_centroid(&mut self, image: &Array2<f32>) -> Point {
        let c = centroid(image, DEFAULT_CENTROID_THRESHOLD);
        self.current_centroid = Some(c);
        let first = *self.first_centroid.get_or_insert(c);
        PointF::new(c.x - first.x, c.y - first.y).round()
    }

    /// Area of frame 0 that is visible in every frame.
    fn compute_intersection(&self) -> Result<Rect> {
        let (w, h) = (self.frame_size.0 as i32, self.frame_size.1 as i32);
        let x0 = self.offsets.iter().map(|o| -o.x).max().unwrap_or(0).max(0);
        let y0 = self.offsets.iter().map(|o| -o.y).max().unwrap_or(0).max(0);
        let x1 = self.offsets.iter().map(|o| w - o.x).min().unwrap_or(w).min(w);
        let y1 = self.offsets.iter().map(|o| h - o.y).min().unwrap_or(h).min(h);

        if x1 <= x0 || y1 <= y0 {
            return Err(SaturnError::AlignmentLost(
                "images' intersection is empty".into(),
            ));
        }
        Ok(Rect::new(x0, y0, (x1 - x0) as u32, (y1 - y0) as u32))
    }

    pub fn method(&self) -> AlignmentMethod {
        self.method
    }

    pub fn is_complete(&self) -> bool {
        self.intersection.is_some()
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn frame_size(&self) -> (u32, u32) {
        self.frame_size
    }

    /// Per-frame displacements relative to the first active frame.
    pub fn offsets(&self) -> &[Point] {
        &self.offsets
    }

    /// Intersection in first-frame coordinates; set after the last step.
    pub fn intersection(&self) -> Option<Rect> {
        self.intersection
    }

    /// Intersection rectangle in the coordinates of active frame `index`.
    pub fn frame_intersection(&self, index: usize) -> Option<Rect> {
        Some(self.intersection?.translated(*self.offsets.get(index)?))
    }

    /// Current anchor positions with their validity.
    pub fn anchors(&self) -> Vec<(PointF, bool)> {
        self.anchors.iter().map(|a| (a.position, a.valid)).collect()
    }

    pub fn centroid(&self) -> Option<PointF> {
        self.current_centroid
    }

    /// Index of the last processed active frame.
    pub fn current_frame(&self) -> usize {
        self.next.saturating_sub(1)
    }

    /// The last processed frame, as loaded.
    pub fn last_image(&self) -> Option<&ImageData> {
        self.last_image.as_ref()
    }
}

/// Square `block` x `block` window centred on `centre`, or `None` if it
/// would leave the image.
fn cut_window(image: &Array2<f32>, centre: Point, block: usize) -> Option<Array2<f32>> {
    let (h, w) = image.dim();
    let half = (block / 2) as i32;
    let (x0, y0) = (centre.x - half, centre.y - half);
    if x0 < 0 || y0 < 0 || x0 as usize + block > w || y0 as usize + block > h {
        return None;
    }
    let (x0, y0) = (x0 as usize, y0 as usize);
    Some(image.slice(s![y0..y0 + block, x0..x0 + block]).to_owned())
}
