use ndarray::{s, Array2};

use crate::frame::Point;
use crate::quality::laplacian::laplacian_variance;

/// Suggest an anchor position: the centre of the sharpest block whose mean
/// brightness reaches `brightness_threshold` of the image's dynamic range.
///
/// Blocks keep a margin of one block size from the image border so the
/// anchor can drift between frames. If no block is bright enough the
/// brightest block is used. Returns `None` when the image cannot hold a
/// block with its margin.
pub fn suggest_anchor_pos(
    image: &Array2<f32>,
    brightness_threshold: f32,
    block_size: u32,
) -> Option<Point> {
    let (h, w) = image.dim();
    let block = block_size.max(4) as usize;
    let half = block / 2;
    let margin = block;
    if w < 2 * margin + 1 || h < 2 * margin + 1 {
        return None;
    }

    let (min, max) = image
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let cutoff = min + (max - min) * brightness_threshold.clamp(0.0, 1.0);

    let step = (half / 2).max(1);
    let mut sharpest: Option<(Point, f64)> = None;
    let mut brightest: Option<(Point, f32)> = None;

    for cy in (margin..h - margin).step_by(step) {
        for cx in (margin..w - margin).step_by(step) {
            let view = image.slice(s![cy - half..cy - half + block, cx - half..cx - half + block]);
            let mean = view.mean().unwrap_or(0.0);
            let pos = Point::new(cx as i32, cy as i32);

            if brightest.is_none_or(|(_, m)| mean > m) {
                brightest = Some((pos, mean));
            }
            if mean >= cutoff {
                let score = laplacian_variance(&view);
                if sharpest.is_none_or(|(_, s)| score > s) {
                    sharpest = Some((pos, score));
                }
            }
        }
    }

    sharpest
        .map(|(p, _)| p)
        .or_else(|| brightest.map(|(p, _)| p))
}
