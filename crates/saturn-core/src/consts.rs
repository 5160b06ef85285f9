/// Minimum pixel count (h*w) to use row-level Rayon parallelism.
pub const PARALLEL_PIXEL_THRESHOLD: usize = 65_536;

/// Small epsilon to avoid division by zero in floating-point comparisons.
pub const EPSILON: f32 = 1e-10;

/// ITU-R BT.601 luminance coefficient for the red channel.
pub const LUMINANCE_R: f32 = 0.299;

/// ITU-R BT.601 luminance coefficient for the green channel.
pub const LUMINANCE_G: f32 = 0.587;

/// ITU-R BT.601 luminance coefficient for the blue channel.
pub const LUMINANCE_B: f32 = 0.114;

/// Side length (pixels) of the block tracked around each alignment anchor.
pub const ANCHOR_BLOCK_SIZE: u32 = 32;

/// Default intensity threshold for centroid alignment (fraction of max brightness).
pub const DEFAULT_CENTROID_THRESHOLD: f32 = 0.1;

/// Default minimum relative brightness for anchor and reference point placement.
pub const DEFAULT_PLACEMENT_BRIGHTNESS_THRESHOLD: f32 = 0.33;

/// Default spacing (pixels) between automatically placed reference points.
pub const DEFAULT_REF_POINT_SPACING: u32 = 40;

/// Default block size (pixels) for reference point block matching.
pub const DEFAULT_REF_POINT_BLOCK_SIZE: u32 = 32;

/// Default search radius (pixels) for reference point block matching.
pub const DEFAULT_REF_POINT_SEARCH_RADIUS: u32 = 20;

/// Default local contrast ratio required to place a reference point.
pub const DEFAULT_STRUCTURE_THRESHOLD: f32 = 1.2;

/// Default structure scale; 1 suits optimally sampled material.
pub const DEFAULT_STRUCTURE_SCALE: u32 = 1;

/// Default threshold for the percentage-best quality criterion.
pub const DEFAULT_QUALITY_THRESHOLD: u32 = 30;

/// Side length (pixels) of the square areas used for quality estimation.
pub const QUALITY_AREA_SIZE: u32 = 40;

/// Box blur radius used as the detail scale for quality estimation.
pub const QUALITY_DETAIL_SCALE: u32 = 3;

/// Radius of the marker drawn around a validly tracked reference point.
pub const REF_POINT_MARKER_RADIUS_VALID: i32 = 4;

/// Radius of the marker drawn around a reference point that lost tracking.
pub const REF_POINT_MARKER_RADIUS_INVALID: i32 = 2;

/// Half-length of the cross drawn at anchor positions.
pub const ANCHOR_MARKER_SIZE: i32 = 6;

/// Allowed zoom factor range for visualization frames.
pub const MIN_ZOOM_FACTOR: f64 = 0.05;
pub const MAX_ZOOM_FACTOR: f64 = 16.0;

/// Minimum phase-correlation peak-to-mean ratio for a trusted anchor match.
pub const MIN_CORRELATION_CONFIDENCE: f64 = 3.0;
