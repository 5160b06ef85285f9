use std::path::Path;

use ndarray::Array2;

use crate::consts::EPSILON;
use crate::error::{Result, SaturnError};
use crate::frame::{Frame, ImageData};
use crate::io::image_io::load_flat_field;

/// Flat-field correction normalised by the flat's mean.
#[derive(Clone, Debug)]
pub struct FlatField {
    normalized: Array2<f32>,
}

impl FlatField {
    /// Load a flat-field image; it must match the raw frame size.
    pub fn load(path: &Path, frame_size: (u32, u32)) -> Result<Self> {
        let frame = load_flat_field(path)?;
        Self::from_frame(&frame, frame_size).map_err(|e| SaturnError::FlatField {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    pub fn from_frame(frame: &Frame, frame_size: (u32, u32)) -> Result<Self> {
        let (w, h) = frame_size;
        if frame.width() != w as usize || frame.height() != h as usize {
            return Err(SaturnError::InvalidParameters(format!(
                "flat-field is {}x{}, frames are {}x{}",
                frame.width(),
                frame.height(),
                w,
                h
            )));
        }

        let mean = frame.data.mean().unwrap_or(0.0);
        if mean <= EPSILON {
            return Err(SaturnError::InvalidParameters(
                "flat-field mean is zero".into(),
            ));
        }

        Ok(Self {
            normalized: frame.data.mapv(|v| v / mean),
        })
    }

    /// Divide every channel of `image` by the normalised flat. Pixels where
    /// the flat is (near) zero are left unchanged.
    pub fn apply(&self, image: &mut ImageData) {
        let divide = |plane: &mut Array2<f32>| {
            plane.zip_mut_with(&self.normalized, |d, &f| {
                if f > EPSILON {
                    *d /= f;
                }
            });
        };
        match image {
            ImageData::Mono(f) => divide(&mut f.data),
            ImageData::Color(cf) => {
                divide(&mut cf.red.data);
                divide(&mut cf.green.data);
                divide(&mut cf.blue.data);
            }
        }
    }
}
