use image::{Rgba, RgbaImage};
use ndarray::{s, Array2};
use serde::{Deserialize, Serialize};

use crate::color::debayer::luminance;

/// A single grayscale image frame.
/// Pixel values are f32 in [0.0, 1.0].
#[derive(Clone, Debug)]
pub struct Frame {
    /// Pixel data, row-major, shape = (height, width)
    pub data: Array2<f32>,
    /// Original bit depth before conversion (8 or 16)
    pub original_bit_depth: u8,
}

impl Frame {
    pub fn new(data: Array2<f32>, bit_depth: u8) -> Self {
        Self {
            data,
            original_bit_depth: bit_depth,
        }
    }

    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    pub fn height(&self) -> usize {
        self.data.nrows()
    }
}

/// Color image composed of separate channel frames.
#[derive(Clone, Debug)]
pub struct ColorFrame {
    pub red: Frame,
    pub green: Frame,
    pub blue: Frame,
}

/// An image delivered by a sequence or produced by the pipeline.
#[derive(Clone, Debug)]
#[allow(clippy::large_enum_variant)]
pub enum ImageData {
    Mono(Frame),
    Color(ColorFrame),
}

impl ImageData {
    pub fn width(&self) -> usize {
        match self {
            Self::Mono(f) => f.width(),
            Self::Color(cf) => cf.red.width(),
        }
    }

    pub fn height(&self) -> usize {
        match self {
            Self::Mono(f) => f.height(),
            Self::Color(cf) => cf.red.height(),
        }
    }

    pub fn is_color(&self) -> bool {
        matches!(self, Self::Color(_))
    }

    /// Mono frame used by alignment and quality measurements.
    /// Color data is converted to luminance.
    pub fn luminance(&self) -> Frame {
        match self {
            Self::Mono(f) => f.clone(),
            Self::Color(cf) => luminance(cf),
        }
    }

    /// Convert to mono (luminance) or color (mono replicated into R, G
    /// and B). Already matching data is returned unchanged.
    pub fn into_layout(self, color: bool) -> ImageData {
        match (self, color) {
            (Self::Mono(f), true) => Self::Color(ColorFrame {
                red: f.clone(),
                green: f.clone(),
                blue: f,
            }),
            (Self::Color(cf), false) => Self::Mono(luminance(&cf)),
            (same, _) => same,
        }
    }

    /// Channel planes, one for mono, three (R, G, B) for color.
    pub fn channels(&self) -> Vec<&Array2<f32>> {
        match self {
            Self::Mono(f) => vec![&f.data],
            Self::Color(cf) => vec![&cf.red.data, &cf.green.data, &cf.blue.data],
        }
    }

    pub fn channels_mut(&mut self) -> Vec<&mut Array2<f32>> {
        match self {
            Self::Mono(f) => vec![&mut f.data],
            Self::Color(cf) => vec![&mut cf.red.data, &mut cf.green.data, &mut cf.blue.data],
        }
    }

    pub fn bit_depth(&self) -> u8 {
        match self {
            Self::Mono(f) => f.original_bit_depth,
            Self::Color(cf) => cf.red.original_bit_depth,
        }
    }

    /// Copy out `rect`, which must lie inside the image.
    pub fn crop(&self, rect: &Rect) -> ImageData {
        let crop_frame = |f: &Frame| {
            let (y0, x0) = (rect.y as usize, rect.x as usize);
            let view = f.data.slice(s![
                y0..y0 + rect.height as usize,
                x0..x0 + rect.width as usize
            ]);
            Frame::new(view.to_owned(), f.original_bit_depth)
        };
        match self {
            Self::Mono(f) => Self::Mono(crop_frame(f)),
            Self::Color(cf) => Self::Color(ColorFrame {
                red: crop_frame(&cf.red),
                green: crop_frame(&cf.green),
                blue: crop_frame(&cf.blue),
            }),
        }
    }

    /// 8-bit RGBA raster, alpha fully opaque.
    pub fn to_rgba(&self) -> RgbaImage {
        let (w, h) = (self.width() as u32, self.height() as u32);
        let to_u8 = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        match self {
            Self::Mono(f) => RgbaImage::from_fn(w, h, |x, y| {
                let v = to_u8(f.data[[y as usize, x as usize]]);
                Rgba([v, v, v, 255])
            }),
            Self::Color(cf) => RgbaImage::from_fn(w, h, |x, y| {
                let (r, c) = (y as usize, x as usize);
                Rgba([
                    to_u8(cf.red.data[[r, c]]),
                    to_u8(cf.green.data[[r, c]]),
                    to_u8(cf.blue.data[[r, c]]),
                    255,
                ])
            }),
        }
    }
}

/// Integer pixel position.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn to_f(self) -> PointF {
        PointF::new(self.x as f64, self.y as f64)
    }
}

impl std::ops::Add for Point {
    type Output = Point;
    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::Sub for Point {
    type Output = Point;
    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// Sub-pixel position.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PointF {
    pub x: f64,
    pub y: f64,
}

impl PointF {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn round(self) -> Point {
        Point::new(self.x.round() as i32, self.y.round() as i32)
    }
}

/// Axis-aligned rectangle; `x`/`y` is the top-left corner.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn translated(&self, by: Point) -> Rect {
        Rect::new(self.x + by.x, self.y + by.y, self.width, self.height)
    }
}

/// Alignment offset for a frame relative to a reference.
#[derive(Clone, Debug, Default)]
pub struct AlignmentOffset {
    pub dx: f64,
    pub dy: f64,
}

/// Color filter array layout of a raw sensor capture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::upper_case_acronyms)]
pub enum CfaPattern {
    RGGB,
    GRBG,
    GBRG,
    BGGR,
}

impl std::fmt::Display for CfaPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RGGB => write!(f, "RGGB"),
            Self::GRBG => write!(f, "GRBG"),
            Self::GBRG => write!(f, "GBRG"),
            Self::BGGR => write!(f, "BGGR"),
        }
    }
}
