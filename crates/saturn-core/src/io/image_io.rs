use std::path::Path;

use image::{DynamicImage, ImageBuffer, ImageFormat, Luma, Rgb};
use ndarray::Array2;

use crate::error::{Result, SaturnError};
use crate::frame::{ColorFrame, Frame, ImageData};
use crate::job::OutputFormat;

/// File extensions recognised as still images when listing a directory.
pub const IMAGE_EXTENSIONS: &[&str] = &["tif", "tiff", "png", "bmp", "jpg", "jpeg"];

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Load an image file. Grayscale sources become `Mono`, anything with color
/// channels becomes `Color`.
pub fn load_image(path: &Path) -> Result<ImageData> {
    let img = image::open(path)?;
    let bit_depth = if img.color().bytes_per_pixel() / img.color().channel_count() >= 2 {
        16
    } else {
        8
    };

    if img.color().has_color() {
        Ok(ImageData::Color(rgb_to_color_frame(&img, bit_depth)))
    } else {
        Ok(ImageData::Mono(luma_to_frame(&img, bit_depth)))
    }
}

/// Load a flat-field image as a mono frame.
pub fn load_flat_field(path: &Path) -> Result<Frame> {
    let img = image::open(path).map_err(|e| SaturnError::FlatField {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(luma_to_frame(&img, 16))
}

fn luma_to_frame(img: &DynamicImage, bit_depth: u8) -> Frame {
    let gray = img.to_luma16();
    let (w, h) = gray.dimensions();
    let mut data = Array2::<f32>::zeros((h as usize, w as usize));

    for (col, row, pixel) in gray.enumerate_pixels() {
        data[[row as usize, col as usize]] = pixel.0[0] as f32 / 65535.0;
    }

    Frame::new(data, bit_depth)
}

fn rgb_to_color_frame(img: &DynamicImage, bit_depth: u8) -> ColorFrame {
    let rgb = img.to_rgb16();
    let (w, h) = rgb.dimensions();
    let shape = (h as usize, w as usize);
    let mut red = Array2::<f32>::zeros(shape);
    let mut green = Array2::<f32>::zeros(shape);
    let mut blue = Array2::<f32>::zeros(shape);

    for (col, row, pixel) in rgb.enumerate_pixels() {
        let (r, c) = (row as usize, col as usize);
        red[[r, c]] = pixel.0[0] as f32 / 65535.0;
        green[[r, c]] = pixel.0[1] as f32 / 65535.0;
        blue[[r, c]] = pixel.0[2] as f32 / 65535.0;
    }

    ColorFrame {
        red: Frame::new(red, bit_depth),
        green: Frame::new(green, bit_depth),
        blue: Frame::new(blue, bit_depth),
    }
}

/// Save an image in the requested output format. The path's extension is
/// not consulted.
pub fn save_image(image: &ImageData, path: &Path, format: OutputFormat) -> Result<()> {
    match (image, format) {
        (ImageData::Mono(f), OutputFormat::Tiff16) => save_tiff(f, path),
        (ImageData::Mono(f), OutputFormat::Png8) => save_png(f, path),
        (ImageData::Color(cf), OutputFormat::Tiff16) => save_color_tiff(cf, path),
        (ImageData::Color(cf), OutputFormat::Png8) => save_color_png(cf, path),
    }
}

fn to_u16(v: f32) -> u16 {
    (v.clamp(0.0, 1.0) * 65535.0) as u16
}

fn to_u8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0) as u8
}

fn buffer_mismatch(w: usize, h: usize) -> SaturnError {
    SaturnError::InvalidDimensions {
        width: w as u32,
        height: h as u32,
    }
}

/// Save a frame as 16-bit grayscale TIFF.
fn save_tiff(frame: &Frame, path: &Path) -> Result<()> {
    let (h, w) = frame.data.dim();
    let pixels: Vec<u16> = frame.data.iter().map(|&v| to_u16(v)).collect();

    let img = ImageBuffer::<Luma<u16>, Vec<u16>>::from_raw(w as u32, h as u32, pixels)
        .ok_or_else(|| buffer_mismatch(w, h))?;
    img.save_with_format(path, ImageFormat::Tiff)?;
    Ok(())
}

/// Save a frame as 8-bit grayscale PNG.
fn save_png(frame: &Frame, path: &Path) -> Result<()> {
    let (h, w) = frame.data.dim();
    let pixels: Vec<u8> = frame.data.iter().map(|&v| to_u8(v)).collect();

    let img = ImageBuffer::<Luma<u8>, Vec<u8>>::from_raw(w as u32, h as u32, pixels)
        .ok_or_else(|| buffer_mismatch(w, h))?;
    img.save_with_format(path, ImageFormat::Png)?;
    Ok(())
}

/// Save a ColorFrame as 16-bit RGB TIFF.
fn save_color_tiff(color: &ColorFrame, path: &Path) -> Result<()> {
    let (h, w) = color.red.data.dim();
    let mut pixels: Vec<u16> = Vec::with_capacity(h * w * 3);
    for row in 0..h {
        for col in 0..w {
            pixels.push(to_u16(color.red.data[[row, col]]));
            pixels.push(to_u16(color.green.data[[row, col]]));
            pixels.push(to_u16(color.blue.data[[row, col]]));
        }
    }

    let img = ImageBuffer::<Rgb<u16>, Vec<u16>>::from_raw(w as u32, h as u32, pixels)
        .ok_or_else(|| buffer_mismatch(w, h))?;
    img.save_with_format(path, ImageFormat::Tiff)?;
    Ok(())
}

/// Save a ColorFrame as 8-bit RGB PNG.
fn save_color_png(color: &ColorFrame, path: &Path) -> Result<()> {
    let (h, w) = color.red.data.dim();
    let mut img = image::RgbImage::new(w as u32, h as u32);
    for row in 0..h {
        for col in 0..w {
            img.put_pixel(
                col as u32,
                row as u32,
                Rgb([
                    to_u8(color.red.data[[row, col]]),
                    to_u8(color.green.data[[row, col]]),
                    to_u8(color.blue.data[[row, col]]),
                ]),
            );
        }
    }

    img.save_with_format(path, ImageFormat::Png)?;
    Ok(())
}
