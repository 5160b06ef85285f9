pub mod criterion;
pub mod detail;
pub mod laplacian;

pub use criterion::select_frames;
pub use detail::{area_quality, box_blur};
