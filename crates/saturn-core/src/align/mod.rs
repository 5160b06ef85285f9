pub mod anchors;
pub mod centroid;
pub mod phase_correlation;

pub use anchors::suggest_anchor_pos;
pub use centroid::centroid;
pub use phase_correlation::{bilinear_sample, compute_offset_with_confidence, PhaseCorrelator};
