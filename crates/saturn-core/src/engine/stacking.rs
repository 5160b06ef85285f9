use tracing::{debug, info};

use crate::error::{Result, SaturnError};
use crate::frame::{ImageData, PointF};
use crate::sequence::ImageSequence;
use crate::stack::{FlatField, StackAccumulator, Triangulation};

use super::ref_points::RefPointAlignment;
use super::Step;

/// Image stacking: warps each selected frame triangle by triangle onto the
/// final reference point positions and averages the result.
pub struct Stacking {
    ref_points: RefPointAlignment,
    flat_field: Option<FlatField>,
    accumulator: StackAccumulator,
    next: usize,
    /// Triangles added by the latest step.
    step_triangles: Vec<usize>,
    stacked: Option<ImageData>,
}

impl Stacking {
    pub fn new(ref_points: RefPointAlignment, flat_field: Option<FlatField>) -> Result<Self> {
        if !ref_points.is_complete() {
            return Err(SaturnError::InvalidParameters(
                "reference point alignment has not completed".into(),
            ));
        }
        let quality = ref_points.quality();
        let intersection = quality.intersection();
        let (channels, bit_depth) = quality
            .best_fragments()
            .map(|img| (img.channels().len(), img.bit_depth()))
            .unwrap_or((1, 16));

        let accumulator = StackAccumulator::new(
            channels,
            intersection.width as usize,
            intersection.height as usize,
            bit_depth,
        )?;
        debug!(
            width = intersection.width,
            height = intersection.height,
            channels,
            flat_field = flat_field.is_some(),
            "Stacking buffers allocated"
        );

        Ok(Self {
            ref_points,
            flat_field,
            accumulator,
            next: 0,
            step_triangles: Vec::new(),
            stacked: None,
        })
    }

    /// Add the next active frame, if selected, to the stack.
    pub fn step(&mut self, sequence: &mut ImageSequence) -> Result<Step> {
        let count = self.ref_points.selected_frames().len();
        if self.next >= count {
            return Ok(Step::LastStep);
        }
        let k = self.next;

        self.step_triangles.clear();
        if self.ref_points.selected_frames()[k] {
            self.add_frame(sequence, k)?;
        }

        self.next += 1;
        if self.next < count {
            return Ok(Step::Continue);
        }

        self.stacked = Some(self.partial_image());
        info!(frames = self.ref_points.selected_count(), "Stacking complete");
        Ok(Step::LastStep)
    }

    fn add_frame(&mut self, sequence: &mut ImageSequence, k: usize) -> Result<()> {
        let color = self.accumulator.channel_count() == 3;
        let mut image = sequence.image_at(k)?.into_layout(color);
        if let Some(flat) = &self.flat_field {
            flat.apply(&mut image);
        }
        let origin = self
            .ref_points
            .quality()
            .alignment()
            .frame_intersection(k)
            .map(|r| PointF::new(r.x as f64, r.y as f64))
            .unwrap_or_default();

        let points = self.ref_points.points();
        let Some(dst_positions) = self.ref_points.final_positions() else {
            return Ok(());
        };
        let planes = image.channels();

        for (t, tri) in self.ref_points.triangulation().triangles().iter().enumerate() {
            let src: Option<Vec<PointF>> = tri
                .v
                .iter()
                .map(|&i| {
                    points[i]
                        .position_in_frame(k)
                        .map(|p| PointF::new(p.x + origin.x, p.y + origin.y))
                })
                .collect();
            let Some(src) = src else {
                continue;
            };
            let dst = tri.v.map(|i| dst_positions[i]);
            self.accumulator
                .add_triangle(&planes, [src[0], src[1], src[2]], dst);
            self.step_triangles.push(t);
        }
        Ok(())
    }

    /// Running mean; uncovered pixels come from the best-fragments image.
    pub fn partial_image(&self) -> ImageData {
        self.accumulator
            .mean(self.ref_points.quality().best_fragments())
    }

    /// Final stack; set after the last step.
    pub fn image(&self) -> Option<&ImageData> {
        self.stacked.as_ref()
    }

    pub fn take_image(&mut self) -> Option<ImageData> {
        self.stacked.take()
    }

    pub fn ref_points(&self) -> &RefPointAlignment {
        &self.ref_points
    }

    pub fn triangulation(&self) -> &Triangulation {
        self.ref_points.triangulation()
    }

    /// Final reference point positions the frames are warped onto.
    pub fn final_positions(&self) -> &[PointF] {
        self.ref_points.final_positions().unwrap_or(&[])
    }

    /// Indices into [`Self::triangulation`] of the triangles stacked by
    /// the latest step; empty when that frame was not selected.
    pub fn current_step_triangles(&self) -> &[usize] {
        &self.step_triangles
    }

    pub fn current_frame(&self) -> usize {
        self.next.saturating_sub(1)
    }
}
