use std::sync::Arc;

use image::RgbaImage;

use crate::engine::QualityEstimation;
use crate::error::{FailureKind, SaturnError};
use crate::job::Job;
use crate::sequence::ImageSequence;

use super::visualization::Interpolation;

/// Processing phase, strictly in this order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    #[default]
    Idle,
    ImageAlignment,
    QualityEstimation,
    ReferencePointAlignment,
    ImageStacking,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::ImageAlignment => write!(f, "Image alignment"),
            Self::QualityEstimation => write!(f, "Quality estimation"),
            Self::ReferencePointAlignment => write!(f, "Reference point alignment"),
            Self::ImageStacking => write!(f, "Image stacking"),
        }
    }
}

/// Result of the most recent step, or of the whole run once finished.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum ResultCode {
    #[default]
    Success,
    /// The final phase completed.
    LastStep,
    /// Stopped by [`Worker::abort_processing`](super::Worker::abort_processing).
    Aborted,
    Failed {
        kind: FailureKind,
        message: String,
    },
}

impl ResultCode {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

impl From<&SaturnError> for ResultCode {
    fn from(e: &SaturnError) -> Self {
        Self::Failed {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

/// Engine and sequence parked while the processing thread waits for
/// reference points.
#[derive(Default)]
pub(crate) enum PhaseContext {
    #[default]
    Empty,
    AwaitingReferencePoints {
        sequence: ImageSequence,
        quality: QualityEstimation,
    },
}

/// Everything shared between the worker's owner and its processing
/// thread. Guarded by the worker's re-entrant lock.
pub(crate) struct WorkerState {
    pub(crate) phase: Phase,
    pub(crate) step: usize,
    pub(crate) last_result: ResultCode,
    pub(crate) running: bool,
    pub(crate) abort_requested: bool,
    pub(crate) waiting_for_ref_points: bool,
    pub(crate) visualization_enabled: bool,
    pub(crate) zoom_factor: f64,
    pub(crate) interpolation: Interpolation,
    pub(crate) visualization: Option<Arc<RgbaImage>>,
    pub(crate) job: Option<Job>,
    pub(crate) context: PhaseContext,
}

impl Default for WorkerState {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            step: 0,
            last_result: ResultCode::Success,
            running: false,
            abort_requested: false,
            waiting_for_ref_points: false,
            visualization_enabled: false,
            zoom_factor: 1.0,
            interpolation: Interpolation::default(),
            visualization: None,
            job: None,
            context: PhaseContext::Empty,
        }
    }
}

/// Copy of the worker's progress fields taken under one lock.
#[derive(Clone, Debug)]
pub struct WorkerSnapshot {
    pub phase: Phase,
    pub step: usize,
    pub last_result: ResultCode,
    pub running: bool,
    pub waiting_for_reference_points: bool,
    pub visualization: Option<Arc<RgbaImage>>,
}
