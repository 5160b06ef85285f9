use ndarray::{s, Array2, ArrayView2};

use crate::frame::Point;

/// Sum of squared differences between `reference` and the equally sized
/// block of `image` whose top-left corner is `(x0, y0)`.
fn ssd(reference: &ArrayView2<f32>, image: &Array2<f32>, x0: usize, y0: usize) -> f64 {
    let (bh, bw) = reference.dim();
    let block = image.slice(s![y0..y0 + bh, x0..x0 + bw]);
    reference
        .iter()
        .zip(block.iter())
        .map(|(&a, &b)| {
            let d = (a - b) as f64;
            d * d
        })
        .sum()
}

/// Find where `reference` best matches `image` around `centre`, trying
/// block centres within `search_radius` pixels in each direction.
///
/// Candidates whose block would leave the image are skipped. The search
/// runs on a step-2 grid first and is then refined around the best
/// candidate. Returns the matched centre and its SSD, or `None` if no
/// candidate fits.
pub fn find_match(
    reference: &ArrayView2<f32>,
    image: &Array2<f32>,
    centre: Point,
    search_radius: u32,
) -> Option<(Point, f64)> {
    let (bh, bw) = reference.dim();
    let (h, w) = image.dim();
    let (half_w, half_h) = ((bw / 2) as i32, (bh / 2) as i32);
    let radius = search_radius as i32;

    let evaluate = |c: Point| -> Option<f64> {
        let (x0, y0) = (c.x - half_w, c.y - half_h);
        if x0 < 0 || y0 < 0 || x0 as usize + bw > w || y0 as usize + bh > h {
            return None;
        }
        Some(ssd(reference, image, x0 as usize, y0 as usize))
    };

    let mut best: Option<(Point, f64)> = None;
    let consider = |c: Point, best: &mut Option<(Point, f64)>| {
        if let Some(score) = evaluate(c) {
            if best.is_none_or(|(_, s)| score < s) {
                *best = Some((c, score));
            }
        }
    };

    for dy in (-radius..=radius).step_by(2) {
        for dx in (-radius..=radius).step_by(2) {
            consider(centre + Point::new(dx, dy), &mut best);
        }
    }

    let (coarse, _) = best?;
    for dy in -1..=1 {
        for dx in -1..=1 {
            let c = coarse + Point::new(dx, dy);
            let offset = c - centre;
            if offset.x.abs() <= radius && offset.y.abs() <= radius {
                consider(c, &mut best);
            }
        }
    }

    best
}
