use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::frame::{CfaPattern, ImageData};
use crate::io::ser::SerReader;

use super::{FrameSource, SequenceKind};

/// SER video source. The file mapping is dropped on `release` and reopened
/// lazily.
pub struct SerSource {
    path: PathBuf,
    reader: Option<SerReader>,
    frame_count: usize,
    width: u32,
    height: u32,
    cfa: Option<CfaPattern>,
}

impl SerSource {
    pub fn open(path: &Path) -> Result<Self> {
        let reader = SerReader::open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            frame_count: reader.frame_count(),
            width: reader.header.width,
            height: reader.header.height,
            cfa: reader.cfa_pattern(),
            reader: Some(reader),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn reader(&mut self) -> Result<&SerReader> {
        let reader = match self.reader.take() {
            Some(r) => r,
            None => SerReader::open(&self.path)?,
        };
        Ok(self.reader.insert(reader))
    }
}

impl FrameSource for SerSource {
    fn kind(&self) -> SequenceKind {
        SequenceKind::Video
    }

    fn len(&self) -> usize {
        self.frame_count
    }

    fn dimensions(&self) -> Result<(u32, u32)> {
        Ok((self.width, self.height))
    }

    fn load(&mut self, index: usize) -> Result<ImageData> {
        self.reader()?.read_frame(index)
    }

    fn native_cfa(&self) -> Option<CfaPattern> {
        self.cfa
    }

    fn release(&mut self) {
        self.reader = None;
    }
}
