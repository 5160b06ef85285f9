//! Stepping phase engines.
//!
//! Each engine advances by one active frame per `step()` call and borrows
//! the image sequence only for the duration of that call. Engines are
//! chained by ownership: every phase is constructed from the completed
//! previous one.

pub mod alignment;
pub mod block_match;
pub mod quality;
pub mod ref_points;
pub mod stacking;

pub use alignment::ImageAlignment;
pub use quality::QualityEstimation;
pub use ref_points::{RefPoint, RefPointAlignment};
pub use stacking::Stacking;

/// Outcome of a successful engine step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    /// More frames remain.
    Continue,
    /// The phase is complete.
    LastStep,
}
