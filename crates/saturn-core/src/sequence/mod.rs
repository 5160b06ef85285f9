//! Random-access frame sources with an active-frame cursor.

mod files;
mod memory;
mod ser;

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::color::debayer::debayer;
use crate::error::{Result, SaturnError};
use crate::frame::{CfaPattern, ImageData};

pub use files::FileListSource;
pub use memory::MemorySource;
pub use ser::SerSource;

/// What kind of container backs a sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SequenceKind {
    Video,
    ImageFiles,
    Memory,
}

impl std::fmt::Display for SequenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Video => write!(f, "video"),
            Self::ImageFiles => write!(f, "image files"),
            Self::Memory => write!(f, "in-memory"),
        }
    }
}

/// Backend delivering frames by index.
pub trait FrameSource: Send {
    fn kind(&self) -> SequenceKind;

    /// Total number of frames, active or not.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `(width, height)` shared by all frames.
    fn dimensions(&self) -> Result<(u32, u32)>;

    /// Decode frame `index`.
    fn load(&mut self, index: usize) -> Result<ImageData>;

    /// CFA layout declared by the container itself.
    fn native_cfa(&self) -> Option<CfaPattern> {
        None
    }

    /// Drop decode resources (file handles, mappings). The next `load`
    /// reacquires them.
    fn release(&mut self) {}
}

/// An image sequence: a frame source plus active-frame selection, a cursor
/// over the active frames and optional raw color reinterpretation.
///
/// All indices named `active_index` count active frames only.
pub struct ImageSequence {
    source: Box<dyn FrameSource>,
    active: Vec<bool>,
    /// Original indices of active frames.
    active_indices: Vec<usize>,
    cursor: usize,
    cfa_override: Option<CfaPattern>,
}

impl ImageSequence {
    pub fn new(source: Box<dyn FrameSource>) -> Self {
        let n = source.len();
        Self {
            source,
            active: vec![true; n],
            active_indices: (0..n).collect(),
            cursor: 0,
            cfa_override: None,
        }
    }

    /// Open a SER video.
    pub fn open_ser(path: &Path) -> Result<Self> {
        Ok(Self::new(Box::new(SerSource::open(path)?)))
    }

    /// Sequence over explicit image files, in the given order.
    pub fn from_files(paths: Vec<PathBuf>) -> Result<Self> {
        Ok(Self::new(Box::new(FileListSource::new(paths)?)))
    }

    /// Sequence over every image file in `dir`, sorted by name.
    pub fn from_directory(dir: &Path) -> Result<Self> {
        Ok(Self::new(Box::new(FileListSource::from_directory(dir)?)))
    }

    /// Sequence over frames already in memory.
    pub fn from_images(images: Vec<ImageData>) -> Result<Self> {
        Ok(Self::new(Box::new(MemorySource::new(images)?)))
    }

    /// Open `path` as a SER video or a directory of images.
    pub fn open(path: &Path) -> Result<Self> {
        if path.is_dir() {
            Self::from_directory(path)
        } else {
            Self::open_ser(path)
        }
    }

    pub fn kind(&self) -> SequenceKind {
        self.source.kind()
    }

    /// Total number of frames.
    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn dimensions(&self) -> Result<(u32, u32)> {
        self.source.dimensions()
    }

    pub fn active_image_count(&self) -> usize {
        self.active_indices.len()
    }

    pub fn active_flags(&self) -> &[bool] {
        &self.active
    }

    pub fn is_active(&self, index: usize) -> bool {
        self.active.get(index).copied().unwrap_or(false)
    }

    /// Replace the active-frame selection. Needs one flag per frame and at
    /// least one active frame. Resets the cursor.
    pub fn set_active_images(&mut self, flags: &[bool]) -> Result<()> {
        if flags.len() != self.len() {
            return Err(SaturnError::InvalidParameters(format!(
                "Expected {} active flags, got {}",
                self.len(),
                flags.len()
            )));
        }
        if !flags.iter().any(|&f| f) {
            return Err(SaturnError::NoActiveImages);
        }
        self.active = flags.to_vec();
        self.active_indices = flags
            .iter()
            .enumerate()
            .filter_map(|(i, &f)| f.then_some(i))
            .collect();
        self.cursor = 0;
        Ok(())
    }

    /// Activate every frame except those listed. Indices past the end are
    /// ignored.
    pub fn set_excluded_images(&mut self, excluded: &[usize]) -> Result<()> {
        let mut flags = vec![true; self.len()];
        for &index in excluded {
            match flags.get_mut(index) {
                Some(flag) => *flag = false,
                None => warn!(index, total = self.len(), "Excluded frame index out of range"),
            }
        }
        self.set_active_images(&flags)
    }

    /// Original frame index of the `active_index`-th active frame.
    pub fn original_index(&self, active_index: usize) -> Option<usize> {
        self.active_indices.get(active_index).copied()
    }

    pub fn seek_start(&mut self) {
        self.cursor = 0;
    }

    /// Advance to the next active frame. Returns `false` at the end.
    pub fn seek_next(&mut self) -> bool {
        if self.cursor + 1 < self.active_indices.len() {
            self.cursor += 1;
            true
        } else {
            false
        }
    }

    pub fn current_active_index(&self) -> usize {
        self.cursor
    }

    pub fn current_image(&mut self) -> Result<ImageData> {
        self.image_at(self.cursor)
    }

    /// Load the `active_index`-th active frame, demosaiced when a CFA
    /// pattern applies.
    pub fn image_at(&mut self, active_index: usize) -> Result<ImageData> {
        let index = self
            .original_index(active_index)
            .ok_or(SaturnError::FrameIndexOutOfRange {
                index: active_index,
                total: self.active_indices.len(),
            })?;
        let image = self.source.load(index)?;
        Ok(match (image, self.cfa_pattern()) {
            (ImageData::Mono(raw), Some(pattern)) => ImageData::Color(debayer(&raw, pattern)),
            (image, _) => image,
        })
    }

    /// Release decoding resources until the next access.
    pub fn deactivate(&mut self) {
        debug!(kind = %self.kind(), "Deactivating image sequence");
        self.source.release();
    }

    /// Treat mono frames as raw CFA mosaics of the given layout; `None`
    /// restores the container's own interpretation.
    pub fn reinterpret_as_cfa(&mut self, pattern: Option<CfaPattern>) {
        self.cfa_override = pattern;
    }

    /// Effective CFA pattern: the reinterpretation if set, else the
    /// container's native one.
    pub fn cfa_pattern(&self) -> Option<CfaPattern> {
        self.cfa_override.or_else(|| self.source.native_cfa())
    }
}

impl std::fmt::Debug for ImageSequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageSequence")
            .field("kind", &self.kind())
            .field("len", &self.len())
            .field("active", &self.active_image_count())
            .field("cursor", &self.cursor)
            .field("cfa", &self.cfa_pattern())
            .finish()
    }
}
