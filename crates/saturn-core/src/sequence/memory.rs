use crate::error::{Result, SaturnError};
use crate::frame::ImageData;

use super::{FrameSource, SequenceKind};

/// Frames held in memory; used for generated data and tests.
pub struct MemorySource {
    images: Vec<ImageData>,
}

impl MemorySource {
    pub fn new(images: Vec<ImageData>) -> Result<Self> {
        let first = images.first().ok_or(SaturnError::NoActiveImages)?;
        let (w, h) = (first.width(), first.height());
        if let Some(bad) = images.iter().find(|i| i.width() != w || i.height() != h) {
            return Err(SaturnError::InvalidDimensions {
                width: bad.width() as u32,
                height: bad.height() as u32,
            });
        }
        if images.iter().any(|i| i.is_color() != first.is_color()) {
            return Err(SaturnError::InvalidParameters(
                "frames mix grayscale and color layouts".into(),
            ));
        }
        Ok(Self { images })
    }
}

impl FrameSource for MemorySource {
    fn kind(&self) -> SequenceKind {
        SequenceKind::Memory
    }

    fn len(&self) -> usize {
        self.images.len()
    }

    fn dimensions(&self) -> Result<(u32, u32)> {
        let first = &self.images[0];
        Ok((first.width() as u32, first.height() as u32))
    }

    fn load(&mut self, index: usize) -> Result<ImageData> {
        self.images
            .get(index)
            .cloned()
            .ok_or(SaturnError::FrameIndexOutOfRange {
                index,
                total: self.images.len(),
            })
    }
}
