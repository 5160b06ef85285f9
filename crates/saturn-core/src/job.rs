use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::consts::*;
use crate::frame::{CfaPattern, ImageData, Point};
use crate::sequence::ImageSequence;

/// How frame-to-frame translation is measured during image alignment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignmentMethod {
    /// Track blocks around one or more anchor points.
    #[default]
    Anchors,
    /// Follow the intensity-weighted centroid (bright, compact objects).
    Centroid,
}

/// Rule selecting the frames used for reference point alignment and stacking.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityCriterion {
    /// Keep the given percentage of the best frames.
    PercentageBest(u32),
    /// Keep frames whose quality is at least the given percentage of the
    /// quality range above the worst frame.
    MinRelativeQuality(u32),
    /// Keep the given number of the best frames.
    NumberBest(u32),
}

impl Default for QualityCriterion {
    fn default() -> Self {
        Self::PercentageBest(DEFAULT_QUALITY_THRESHOLD)
    }
}

impl QualityCriterion {
    pub fn threshold(&self) -> u32 {
        match *self {
            Self::PercentageBest(v) | Self::MinRelativeQuality(v) | Self::NumberBest(v) => v,
        }
    }
}

/// Parameters for automatic reference point placement.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefPtAutoPlacementParams {
    /// Grid spacing in pixels.
    pub spacing: u32,
    /// Minimum brightness relative to the darkest/brightest pixel, in [0, 1].
    pub brightness_threshold: f32,
    /// Minimum local contrast ratio, >= 1.0.
    pub structure_threshold: f32,
    /// Blur radius applied before measuring contrast, >= 1.
    pub structure_scale: u32,
}

impl Default for RefPtAutoPlacementParams {
    fn default() -> Self {
        Self {
            spacing: DEFAULT_REF_POINT_SPACING,
            brightness_threshold: DEFAULT_PLACEMENT_BRIGHTNESS_THRESHOLD,
            structure_threshold: DEFAULT_STRUCTURE_THRESHOLD,
            structure_scale: DEFAULT_STRUCTURE_SCALE,
        }
    }
}

/// File format of saved stacks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Tiff16,
    Png8,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Tiff16 => "tif",
            Self::Png8 => "png",
        }
    }
}

/// Where a finished stack is saved automatically.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputSaveMode {
    /// Keep the stack in memory only.
    None,
    /// Next to the source video, or inside the image directory.
    #[default]
    SourcePath,
    /// Into the given directory.
    SpecifiedPath(PathBuf),
}

/// Every tunable parameter of a job. Loadable from partial TOML files.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobSettings {
    pub alignment_method: AlignmentMethod,
    pub automatic_anchor_placement: bool,
    pub anchor_block_size: u32,
    pub automatic_ref_points_placement: bool,
    pub ref_pt_auto_placement: RefPtAutoPlacementParams,
    pub ref_pt_block_size: u32,
    pub ref_pt_search_radius: u32,
    pub quality_criterion: QualityCriterion,
    pub quality_area_size: u32,
    pub quality_detail_scale: u32,
    /// Frame indices (in the whole sequence) left out of processing.
    pub excluded_frames: Vec<usize>,
    pub flat_field_file_name: Option<PathBuf>,
    pub cfa_pattern: Option<CfaPattern>,
    pub output_fmt: OutputFormat,
    pub output_save_mode: OutputSaveMode,
    pub export_quality_data: bool,
    /// List excluded frames in the quality CSV too, with an empty score.
    pub export_inactive_frames_quality: bool,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            alignment_method: AlignmentMethod::default(),
            automatic_anchor_placement: true,
            anchor_block_size: ANCHOR_BLOCK_SIZE,
            automatic_ref_points_placement: true,
            ref_pt_auto_placement: RefPtAutoPlacementParams::default(),
            ref_pt_block_size: DEFAULT_REF_POINT_BLOCK_SIZE,
            ref_pt_search_radius: DEFAULT_REF_POINT_SEARCH_RADIUS,
            quality_criterion: QualityCriterion::default(),
            quality_area_size: QUALITY_AREA_SIZE,
            quality_detail_scale: QUALITY_DETAIL_SCALE,
            excluded_frames: Vec::new(),
            flat_field_file_name: None,
            cfa_pattern: None,
            output_fmt: OutputFormat::default(),
            output_save_mode: OutputSaveMode::default(),
            export_quality_data: false,
            export_inactive_frames_quality: false,
        }
    }
}

/// Per-frame quality scores produced by quality estimation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QualityData {
    /// One score per active frame, in original order.
    pub frames_chrono: Vec<f32>,
    /// The same scores, non-increasing.
    pub frames_sorted: Vec<f32>,
}

impl QualityData {
    pub fn from_chrono(frames_chrono: Vec<f32>) -> Self {
        let mut frames_sorted = frames_chrono.clone();
        frames_sorted.sort_by(|a, b| b.total_cmp(a));
        Self {
            frames_chrono,
            frames_sorted,
        }
    }
}

/// One processing task: its source, configuration and results.
pub struct Job {
    /// Video file, image directory, or first file of an image list.
    pub source_path: PathBuf,
    /// Frame source. Taken by the worker while the job runs.
    pub image_sequence: Option<ImageSequence>,
    pub settings: JobSettings,
    /// Alignment anchors in first-frame coordinates.
    pub anchors: Vec<Point>,
    /// Reference points in intersection coordinates.
    pub ref_points: Vec<Point>,
    pub quality: QualityData,
    pub stacked_img: Option<ImageData>,
    pub best_fragments_img: Option<ImageData>,
    /// Set once quality scores are stored; cleared by the controller.
    pub quality_data_ready_notification: bool,
}

impl Job {
    pub fn new(source_path: impl Into<PathBuf>, sequence: ImageSequence, settings: JobSettings) -> Self {
        Self {
            source_path: source_path.into(),
            image_sequence: Some(sequence),
            settings,
            anchors: Vec::new(),
            ref_points: Vec::new(),
            quality: QualityData::default(),
            stacked_img: None,
            best_fragments_img: None,
            quality_data_ready_notification: false,
        }
    }

    /// Clear results from a previous run.
    pub fn reset_results(&mut self) {
        self.quality = QualityData::default();
        self.stacked_img = None;
        self.best_fragments_img = None;
        self.quality_data_ready_notification = false;
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("source_path", &self.source_path)
            .field("has_sequence", &self.image_sequence.is_some())
            .field("settings", &self.settings)
            .field("anchors", &self.anchors)
            .field("ref_points", &self.ref_points)
            .field("has_stack", &self.stacked_img.is_some())
            .finish()
    }
}
