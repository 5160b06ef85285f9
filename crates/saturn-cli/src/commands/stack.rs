use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};
use image::RgbaImage;
use indicatif::{ProgressBar, ProgressStyle};
use saturn_core::controller::{Controller, Interaction, JobId, JobState};
use saturn_core::frame::{CfaPattern, Point};
use saturn_core::job::{
    AlignmentMethod, Job, JobSettings, OutputFormat, OutputSaveMode, QualityCriterion,
    QualityData,
};
use saturn_core::sequence::ImageSequence;
use saturn_core::worker::Phase;
use tracing::warn;

use crate::summary::{print_job_results, print_settings_summary, JobReport};

#[derive(Clone, Copy, ValueEnum)]
pub enum AlignmentArg {
    Anchors,
    Centroid,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum CriterionArg {
    PercentageBest,
    MinRelativeQuality,
    NumberBest,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum CfaArg {
    Rggb,
    Grbg,
    Gbrg,
    Bggr,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum FormatArg {
    Tiff,
    Png,
}

#[derive(Args)]
pub struct StackArgs {
    /// SER videos or directories of images; each becomes one job
    pub inputs: Vec<PathBuf>,

    /// Image files forming one additional job (repeatable)
    #[arg(long = "frames")]
    pub frames: Vec<PathBuf>,

    /// Job settings TOML (see `saturn config`); flags below override it
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Image alignment method
    #[arg(long, value_enum)]
    pub alignment: Option<AlignmentArg>,

    /// Alignment anchor as x,y in first-frame pixels (repeatable)
    #[arg(long = "anchor", value_parser = parse_point)]
    pub anchors: Vec<Point>,

    /// Reference point as x,y in intersection pixels (repeatable);
    /// disables automatic placement
    #[arg(long = "ref-point", value_parser = parse_point)]
    pub ref_points: Vec<Point>,

    /// Frame selection criterion
    #[arg(long, value_enum)]
    pub criterion: Option<CriterionArg>,

    /// Leave out frames by index, e.g. 7 or 10-20 (repeatable)
    #[arg(long = "exclude", value_parser = parse_frame_range)]
    pub exclude: Vec<RangeInclusive<usize>>,

    /// Criterion threshold (percentage or frame count)
    #[arg(long)]
    pub threshold: Option<u32>,

    /// Flat-field image matching the raw frame size
    #[arg(long)]
    pub flat_field: Option<PathBuf>,

    /// Treat mono frames as raw colour mosaics with this layout
    #[arg(long, value_enum)]
    pub cfa: Option<CfaArg>,

    /// Directory for stacked images (default: next to each source)
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Output file format
    #[arg(long, value_enum)]
    pub format: Option<FormatArg>,

    /// Also write per-frame quality as CSV next to each stack
    #[arg(long)]
    pub export_quality: bool,

    /// List excluded frames in the quality CSV as well
    #[arg(long)]
    pub export_inactive: bool,

    /// Save visualization frames of every step to this directory
    #[arg(long)]
    pub visualize: Option<PathBuf>,

    /// Zoom factor for visualization frames
    #[arg(long, default_value = "1.0")]
    pub zoom: f64,
}

fn parse_point(s: &str) -> std::result::Result<Point, String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected x,y but got '{s}'"))?;
    let x = x.trim().parse().map_err(|e| format!("invalid x in '{s}': {e}"))?;
    let y = y.trim().parse().map_err(|e| format!("invalid y in '{s}': {e}"))?;
    Ok(Point::new(x, y))
}

fn parse_frame_range(s: &str) -> std::result::Result<RangeInclusive<usize>, String> {
    let parse = |v: &str| {
        v.trim()
            .parse::<usize>()
            .map_err(|e| format!("invalid frame index in '{s}': {e}"))
    };
    match s.split_once('-') {
        Some((first, last)) => {
            let (first, last) = (parse(first)?, parse(last)?);
            if first > last {
                return Err(format!("empty frame range '{s}'"));
            }
            Ok(first..=last)
        }
        None => {
            let index = parse(s)?;
            Ok(index..=index)
        }
    }
}

fn build_settings(args: &StackArgs) -> Result<JobSettings> {
    let mut settings = match &args.config {
        Some(path) => super::config::load(path)?,
        None => JobSettings::default(),
    };

    if let Some(alignment) = args.alignment {
        settings.alignment_method = match alignment {
            AlignmentArg::Anchors => AlignmentMethod::Anchors,
            AlignmentArg::Centroid => AlignmentMethod::Centroid,
        };
    }
    if !args.ref_points.is_empty() {
        settings.automatic_ref_points_placement = false;
    }
    if args.criterion.is_some() || args.threshold.is_some() {
        let threshold = args
            .threshold
            .unwrap_or_else(|| settings.quality_criterion.threshold());
        settings.quality_criterion = match args.criterion {
            Some(CriterionArg::PercentageBest) => QualityCriterion::PercentageBest(threshold),
            Some(CriterionArg::MinRelativeQuality) => {
                QualityCriterion::MinRelativeQuality(threshold)
            }
            Some(CriterionArg::NumberBest) => QualityCriterion::NumberBest(threshold),
            None => match settings.quality_criterion {
                QualityCriterion::PercentageBest(_) => QualityCriterion::PercentageBest(threshold),
                QualityCriterion::MinRelativeQuality(_) => {
                    QualityCriterion::MinRelativeQuality(threshold)
                }
                QualityCriterion::NumberBest(_) => QualityCriterion::NumberBest(threshold),
            },
        };
    }
    if let Some(ref flat) = args.flat_field {
        settings.flat_field_file_name = Some(flat.clone());
    }
    if let Some(cfa) = args.cfa {
        settings.cfa_pattern = Some(match cfa {
            CfaArg::Rggb => CfaPattern::RGGB,
            CfaArg::Grbg => CfaPattern::GRBG,
            CfaArg::Gbrg => CfaPattern::GBRG,
            CfaArg::Bggr => CfaPattern::BGGR,
        });
    }
    if let Some(ref dir) = args.output_dir {
        settings.output_save_mode = OutputSaveMode::SpecifiedPath(dir.clone());
    }
    if let Some(format) = args.format {
        settings.output_fmt = match format {
            FormatArg::Tiff => OutputFormat::Tiff16,
            FormatArg::Png => OutputFormat::Png8,
        };
    }
    if args.export_quality {
        settings.export_quality_data = true;
    }
    if args.export_inactive {
        settings.export_inactive_frames_quality = true;
    }
    for range in &args.exclude {
        settings.excluded_frames.extend(range.clone());
    }
    settings.excluded_frames.sort_unstable();
    settings.excluded_frames.dedup();
    Ok(settings)
}

/// Terminal side of the controller: progress bars, saved paths and
/// visualization frames. Point selection is not interactive here.
struct CliInteraction {
    style: ProgressStyle,
    frames: HashMap<JobId, usize>,
    bars: HashMap<JobId, ProgressBar>,
    phases: HashMap<JobId, Phase>,
    saved: HashMap<JobId, PathBuf>,
    best_quality: HashMap<JobId, f32>,
    visualize: Option<PathBuf>,
}

impl CliInteraction {
    fn new(visualize: Option<PathBuf>) -> Result<Self> {
        let style = ProgressStyle::default_bar()
            .template("{prefix:>12} {msg:28} [{bar:40}] {pos}/{len}")?
            .progress_chars("=> ");
        Ok(Self {
            style,
            frames: HashMap::new(),
            bars: HashMap::new(),
            phases: HashMap::new(),
            saved: HashMap::new(),
            best_quality: HashMap::new(),
            visualize,
        })
    }

    fn register(&mut self, id: JobId, frames: usize) {
        self.frames.insert(id, frames);
    }

    fn bar(&mut self, id: JobId) -> &ProgressBar {
        let len = self.frames.get(&id).copied().unwrap_or(0) as u64;
        let style = self.style.clone();
        self.bars.entry(id).or_insert_with(|| {
            let pb = ProgressBar::new(len);
            pb.set_style(style);
            pb.set_prefix(format!("job {id}"));
            pb
        })
    }
}

impl Interaction for CliInteraction {
    fn select_anchors(&mut self, id: JobId, _first_frame: &RgbaImage) -> Option<Vec<Point>> {
        warn!(id, "Manual anchor placement needs --anchor; skipping job");
        None
    }

    fn select_reference_points(&mut self, id: JobId, _best_frame: &RgbaImage) -> Option<Vec<Point>> {
        warn!(id, "No reference points given; placing them automatically");
        None
    }

    fn job_state_changed(&mut self, id: JobId, state: &JobState) {
        match state {
            JobState::Processing { phase, step } => {
                let changed = self.phases.insert(id, *phase) != Some(*phase);
                let pb = self.bar(id);
                if changed {
                    pb.set_message(phase.to_string());
                    pb.set_position(0);
                }
                pb.set_position(*step as u64);
            }
            JobState::Processed | JobState::Error(_) | JobState::Waiting => {
                if let Some(pb) = self.bars.remove(&id) {
                    pb.finish_with_message(state.to_string());
                }
            }
        }
    }

    fn quality_data_ready(&mut self, id: JobId, quality: &QualityData) {
        if let Some(&best) = quality.frames_sorted.first() {
            self.best_quality.insert(id, best);
        }
    }

    fn visualization_updated(&mut self, id: JobId, image: &RgbaImage) {
        let Some(dir) = &self.visualize else {
            return;
        };
        let phase = self.phases.get(&id).copied().unwrap_or_default();
        let step = self.bars.get(&id).map(|pb| pb.position()).unwrap_or(0);
        let name = format!("job{id}_{}_{step:05}.png", phase_slug(phase));
        if let Err(e) = image.save(dir.join(&name)) {
            warn!(error = %e, file = %name, "Could not save visualization frame");
        }
    }

    fn stack_saved(&mut self, id: JobId, path: &Path) {
        self.saved.insert(id, path.to_path_buf());
    }
}

fn phase_slug(phase: Phase) -> &'static str {
    match phase {
        Phase::Idle => "idle",
        Phase::ImageAlignment => "alignment",
        Phase::QualityEstimation => "quality",
        Phase::ReferencePointAlignment => "refpoints",
        Phase::ImageStacking => "stacking",
    }
}

fn add_job(
    controller: &mut Controller<CliInteraction>,
    source: &Path,
    sequence: ImageSequence,
    settings: &JobSettings,
    args: &StackArgs,
) -> JobId {
    let frames = sequence.active_image_count();
    let mut job = Job::new(source, sequence, settings.clone());
    job.anchors = args.anchors.clone();
    job.ref_points = args.ref_points.clone();
    let id = controller.add_job(job);
    controller.interaction_mut().register(id, frames);
    id
}

pub fn run(args: &StackArgs) -> Result<()> {
    let settings = build_settings(args)?;
    if let Some(ref dir) = args.visualize {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }

    let mut controller = Controller::new(CliInteraction::new(args.visualize.clone())?);
    if args.visualize.is_some() {
        controller.worker().set_visualization_enabled(true);
        controller.worker().set_zoom_factor(args.zoom);
    }

    let mut ids = Vec::new();
    for input in &args.inputs {
        let sequence = ImageSequence::open(input)
            .with_context(|| format!("Failed to open {}", input.display()))?;
        ids.push(add_job(&mut controller, input, sequence, &settings, args));
    }
    if let Some(first) = args.frames.first() {
        let sequence = ImageSequence::from_files(args.frames.clone())
            .context("Failed to open the image file list")?;
        ids.push(add_job(&mut controller, first, sequence, &settings, args));
    }
    if ids.is_empty() {
        bail!("No inputs given");
    }

    print_settings_summary(&settings, ids.len());

    controller.start_processing(&ids);
    controller.run_until_idle();

    let interaction = controller.interaction();
    let reports: Vec<JobReport> = controller
        .jobs()
        .map(|(id, entry)| JobReport {
            source: entry
                .job()
                .map(|job| job.source_path.clone())
                .unwrap_or_default(),
            state: entry.state().clone(),
            saved: interaction.saved.get(&id).cloned(),
            best_quality: interaction.best_quality.get(&id).copied(),
        })
        .collect();
    print_job_results(&reports);

    let failed = reports
        .iter()
        .filter(|r| r.state != JobState::Processed)
        .count();
    if failed > 0 {
        bail!("{failed} of {} job(s) did not complete", reports.len());
    }
    Ok(())
}
