//! Bilinear demosaicing of raw color-filter-array captures.

use ndarray::Array2;

use crate::consts::{LUMINANCE_B, LUMINANCE_G, LUMINANCE_R};
use crate::frame::{CfaPattern, ColorFrame, Frame};

/// Demosaic a raw CFA mosaic into a `ColorFrame`.
pub fn debayer(raw: &Frame, pattern: CfaPattern) -> ColorFrame {
    let data = &raw.data;
    let bit_depth = raw.original_bit_depth;
    let (h, w) = data.dim();
    let (r_row, r_col) = red_position(pattern);

    let mut red = Array2::<f32>::zeros((h, w));
    let mut green = Array2::<f32>::zeros((h, w));
    let mut blue = Array2::<f32>::zeros((h, w));

    for row in 0..h {
        let ri = row as isize;
        let is_red_row = (row % 2) == r_row;
        for col in 0..w {
            let ci = col as isize;
            let is_red_col = (col % 2) == r_col;

            match (is_red_row, is_red_col) {
                (true, true) => {
                    red[[row, col]] = data[[row, col]];
                    green[[row, col]] = avg_cross(data, ri, ci);
                    blue[[row, col]] = avg_diagonal(data, ri, ci);
                }
                // Green on red row
                (true, false) => {
                    red[[row, col]] = avg_horizontal(data, ri, ci);
                    green[[row, col]] = data[[row, col]];
                    blue[[row, col]] = avg_vertical(data, ri, ci);
                }
                // Green on blue row
                (false, true) => {
                    red[[row, col]] = avg_vertical(data, ri, ci);
                    green[[row, col]] = data[[row, col]];
                    blue[[row, col]] = avg_horizontal(data, ri, ci);
                }
                (false, false) => {
                    red[[row, col]] = avg_diagonal(data, ri, ci);
                    green[[row, col]] = avg_cross(data, ri, ci);
                    blue[[row, col]] = data[[row, col]];
                }
            }
        }
    }

    ColorFrame {
        red: Frame::new(red, bit_depth),
        green: Frame::new(green, bit_depth),
        blue: Frame::new(blue, bit_depth),
    }
}

/// Compute luminance from a `ColorFrame` using ITU-R BT.601 weights.
pub fn luminance(color: &ColorFrame) -> Frame {
    let (h, w) = color.red.data.dim();
    let mut data = Array2::<f32>::zeros((h, w));

    for row in 0..h {
        for col in 0..w {
            data[[row, col]] = LUMINANCE_R * color.red.data[[row, col]]
                + LUMINANCE_G * color.green.data[[row, col]]
                + LUMINANCE_B * color.blue.data[[row, col]];
        }
    }

    Frame::new(data, color.red.original_bit_depth)
}

/// Returns `(row_parity, col_parity)` of the red pixel within the 2x2 cell.
fn red_position(pattern: CfaPattern) -> (usize, usize) {
    match pattern {
        CfaPattern::RGGB => (0, 0),
        CfaPattern::GRBG => (0, 1),
        CfaPattern::GBRG => (1, 0),
        CfaPattern::BGGR => (1, 1),
    }
}

/// Clamped indexing into the raw mosaic.
#[inline]
fn px(raw: &Array2<f32>, row: isize, col: isize) -> f32 {
    let (h, w) = raw.dim();
    let r = row.clamp(0, h as isize - 1) as usize;
    let c = col.clamp(0, w as isize - 1) as usize;
    raw[[r, c]]
}

/// Average of 4 cross (cardinal) neighbours.
#[inline]
fn avg_cross(raw: &Array2<f32>, r: isize, c: isize) -> f32 {
    (px(raw, r - 1, c) + px(raw, r + 1, c) + px(raw, r, c - 1) + px(raw, r, c + 1)) * 0.25
}

/// Average of 4 diagonal neighbours.
#[inline]
fn avg_diagonal(raw: &Array2<f32>, r: isize, c: isize) -> f32 {
    (px(raw, r - 1, c - 1)
        + px(raw, r - 1, c + 1)
        + px(raw, r + 1, c - 1)
        + px(raw, r + 1, c + 1))
        * 0.25
}

#[inline]
fn avg_horizontal(raw: &Array2<f32>, r: isize, c: isize) -> f32 {
    (px(raw, r, c - 1) + px(raw, r, c + 1)) * 0.5
}

#[inline]
fn avg_vertical(raw: &Array2<f32>, r: isize, c: isize) -> f32 {
    (px(raw, r - 1, c) + px(raw, r + 1, c)) * 0.5
}
