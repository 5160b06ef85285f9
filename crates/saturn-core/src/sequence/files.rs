use std::path::{Path, PathBuf};

use image::{ImageDecoder, ImageReader};
use tracing::debug;

use crate::error::{Result, SaturnError};
use crate::frame::ImageData;
use crate::io::image_io::{is_image_file, load_image};

use super::{FrameSource, SequenceKind};

/// A list of still image files, one frame each.
///
/// Every frame is delivered in the first file's layout: grayscale files in a
/// color list are replicated into three channels, color files in a
/// grayscale list are reduced to luminance.
pub struct FileListSource {
    paths: Vec<PathBuf>,
    dimensions: (u32, u32),
    color: bool,
}

impl FileListSource {
    pub fn new(paths: Vec<PathBuf>) -> Result<Self> {
        let first = paths.first().ok_or(SaturnError::NoActiveImages)?;
        let dimensions = image::image_dimensions(first)?;
        for path in &paths[1..] {
            let (width, height) = image::image_dimensions(path)?;
            if (width, height) != dimensions {
                return Err(SaturnError::InvalidDimensions { width, height });
            }
        }
        let color = ImageReader::open(first)?
            .with_guessed_format()?
            .into_decoder()?
            .color_type()
            .has_color();
        Ok(Self {
            paths,
            dimensions,
            color,
        })
    }

    /// All image files in `dir`, sorted by file name.
    pub fn from_directory(dir: &Path) -> Result<Self> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && is_image_file(p))
            .collect();
        paths.sort();
        Self::new(paths)
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Whether frames are delivered as color.
    pub fn is_color(&self) -> bool {
        self.color
    }
}

impl FrameSource for FileListSource {
    fn kind(&self) -> SequenceKind {
        SequenceKind::ImageFiles
    }

    fn len(&self) -> usize {
        self.paths.len()
    }

    fn dimensions(&self) -> Result<(u32, u32)> {
        Ok(self.dimensions)
    }

    fn load(&mut self, index: usize) -> Result<ImageData> {
        let path = self
            .paths
            .get(index)
            .ok_or(SaturnError::FrameIndexOutOfRange {
                index,
                total: self.paths.len(),
            })?;
        let image = load_image(path)?;
        if (image.width() as u32, image.height() as u32) != self.dimensions {
            return Err(SaturnError::InvalidDimensions {
                width: image.width() as u32,
                height: image.height() as u32,
            });
        }
        if image.is_color() != self.color {
            debug!(
                index,
                path = %path.display(),
                color = self.color,
                "Converting frame to sequence layout"
            );
        }
        Ok(image.into_layout(self.color))
    }
}
