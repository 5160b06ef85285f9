use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SaturnError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid SER file: {0}")]
    InvalidSer(String),

    #[error("Invalid image dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("Frame index {index} out of range (total: {total})")]
    FrameIndexOutOfRange { index: usize, total: usize },

    #[error("Image format error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("Image sequence has no active images")]
    NoActiveImages,

    #[error("Image sequence is not available (in use by the worker or not loaded)")]
    SequenceUnavailable,

    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    #[error("Could not load flat-field {path}: {reason}")]
    FlatField { path: PathBuf, reason: String },

    #[error("Image alignment lost: {0}")]
    AlignmentLost(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Worker is already processing a job")]
    WorkerBusy,

    #[error("Processing thread panicked: {0}")]
    WorkerPanicked(String),
}

impl SaturnError {
    /// Classify the error for the worker's result code.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Io(_) => FailureKind::Io,
            Self::InvalidSer(_)
            | Self::InvalidDimensions { .. }
            | Self::FrameIndexOutOfRange { .. }
            | Self::ImageError(_)
            | Self::SequenceUnavailable => FailureKind::ImageLoad,
            Self::NoActiveImages => FailureKind::NoActiveImages,
            Self::OutOfMemory(_) => FailureKind::OutOfMemory,
            Self::FlatField { .. } => FailureKind::FlatField,
            Self::AlignmentLost(_) => FailureKind::AlignmentLost,
            Self::InvalidParameters(_) | Self::WorkerBusy => FailureKind::InvalidParameters,
            Self::WorkerPanicked(_) => FailureKind::Internal,
        }
    }
}

/// Coarse failure class surfaced to the controller through the worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    OutOfMemory,
    FlatField,
    ImageLoad,
    NoActiveImages,
    AlignmentLost,
    InvalidParameters,
    Io,
    Internal,
}

/// Reserve room for `additional` elements, reporting allocation failure as
/// [`SaturnError::OutOfMemory`] instead of aborting.
pub fn try_reserve<T>(vec: &mut Vec<T>, additional: usize, what: &str) -> Result<()> {
    vec.try_reserve_exact(additional)
        .map_err(|e| SaturnError::OutOfMemory(format!("{what}: {e}")))
}

pub type Result<T> = std::result::Result<T, SaturnError>;
