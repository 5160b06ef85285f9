//! Annotated preview frames rendered after each processing step.

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_cross_mut, draw_hollow_circle_mut, draw_line_segment_mut};

use crate::consts::{
    ANCHOR_MARKER_SIZE, MAX_ZOOM_FACTOR, MIN_ZOOM_FACTOR, REF_POINT_MARKER_RADIUS_INVALID,
    REF_POINT_MARKER_RADIUS_VALID,
};
use crate::engine::{ImageAlignment, QualityEstimation, RefPointAlignment, Stacking};
use crate::frame::PointF;

/// Resampling quality used when scaling visualization frames.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Interpolation {
    Fast,
    #[default]
    Good,
    Best,
}

impl Interpolation {
    fn filter(self) -> FilterType {
        match self {
            Self::Fast => FilterType::Nearest,
            Self::Good => FilterType::Triangle,
            Self::Best => FilterType::CatmullRom,
        }
    }
}

pub mod colors {
    use image::Rgba;

    pub const VALID: Rgba<u8> = Rgba([204, 38, 255, 255]);
    pub const INVALID: Rgba<u8> = Rgba([230, 77, 77, 255]);
    pub const TRIANGLES: Rgba<u8> = Rgba([153, 51, 179, 255]);
}

pub fn clamp_zoom(zoom: f64) -> f64 {
    if zoom.is_finite() {
        zoom.clamp(MIN_ZOOM_FACTOR, MAX_ZOOM_FACTOR)
    } else {
        1.0
    }
}

/// Scale `image` by `zoom`; unchanged at 1.0.
pub fn scale(image: RgbaImage, zoom: f64, interpolation: Interpolation) -> RgbaImage {
    let zoom = clamp_zoom(zoom);
    if (zoom - 1.0).abs() < 1e-6 {
        return image;
    }
    let w = ((image.width() as f64 * zoom).round() as u32).max(1);
    let h = ((image.height() as f64 * zoom).round() as u32).max(1);
    imageops::resize(&image, w, h, interpolation.filter())
}

fn px(p: PointF) -> (i32, i32) {
    (p.x.round() as i32, p.y.round() as i32)
}

fn draw_big_cross(image: &mut RgbaImage, at: PointF, color: Rgba<u8>) {
    let (x, y) = (at.x as f32, at.y as f32);
    let s = ANCHOR_MARKER_SIZE as f32;
    draw_line_segment_mut(image, (x - s, y), (x + s, y), color);
    draw_line_segment_mut(image, (x, y - s), (x, y + s), color);
}

/// Current frame with anchors (valid/invalid) or the centroid marked.
pub fn render_alignment(engine: &ImageAlignment) -> Option<RgbaImage> {
    let mut image = engine.last_image()?.to_rgba();
    for (pos, valid) in engine.anchors() {
        let color = if valid { colors::VALID } else { colors::INVALID };
        draw_big_cross(&mut image, pos, color);
    }
    if let Some(c) = engine.centroid() {
        draw_big_cross(&mut image, c, colors::VALID);
    }
    Some(image)
}

/// The frame just scored, cropped to the intersection.
pub fn render_quality(engine: &QualityEstimation) -> Option<RgbaImage> {
    engine.last_aligned().map(|img| img.to_rgba())
}

/// Frame just tracked, cropped to the intersection, with reference points
/// coloured by validity. Before the first selected frame the
/// best-fragments composite stands in.
pub fn render_ref_points(engine: &RefPointAlignment) -> Option<RgbaImage> {
    let background = engine
        .last_aligned()
        .or_else(|| engine.quality().best_fragments())?;
    let mut image = background.to_rgba();
    for (pos, valid) in engine.current_positions() {
        let (color, radius) = if valid {
            (colors::VALID, REF_POINT_MARKER_RADIUS_VALID)
        } else {
            (colors::INVALID, REF_POINT_MARKER_RADIUS_INVALID)
        };
        draw_hollow_circle_mut(&mut image, px(pos), radius, color);
        draw_cross_mut(&mut image, color, px(pos).0, px(pos).1);
    }
    Some(image)
}

/// Partial stack with the triangles added by the latest step outlined at
/// the final point positions.
pub fn render_stacking(engine: &Stacking) -> Option<RgbaImage> {
    let mut image = engine.partial_image().to_rgba();
    let positions = engine.final_positions();
    let triangles = engine.triangulation().triangles();
    for &t in engine.current_step_triangles() {
        let Some(tri) = triangles.get(t) else {
            continue;
        };
        let corners: Option<Vec<PointF>> =
            tri.v.iter().map(|&i| positions.get(i).copied()).collect();
        let Some(corners) = corners else {
            continue;
        };
        for (a, b) in [(0, 1), (1, 2), (2, 0)] {
            draw_line_segment_mut(
                &mut image,
                (corners[a].x as f32, corners[a].y as f32),
                (corners[b].x as f32, corners[b].y as f32),
                colors::TRIANGLES,
            );
        }
    }
    Some(image)
}
