use std::path::PathBuf;

use console::Style;
use saturn_core::controller::JobState;
use saturn_core::job::{AlignmentMethod, JobSettings, OutputSaveMode, QualityCriterion};

struct Styles {
    title: Style,
    header: Style,
    label: Style,
    value: Style,
    method: Style,
    disabled: Style,
    path: Style,
    ok: Style,
    error: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            header: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            method: Style::new().green(),
            disabled: Style::new().dim().yellow(),
            path: Style::new().underlined(),
            ok: Style::new().green().bold(),
            error: Style::new().red().bold(),
        }
    }
}

/// Outcome of one job for the final summary.
pub struct JobReport {
    pub source: PathBuf,
    pub state: JobState,
    pub saved: Option<PathBuf>,
    pub best_quality: Option<f32>,
}

fn criterion_text(criterion: &QualityCriterion) -> String {
    match criterion {
        QualityCriterion::PercentageBest(p) => format!("best {p}%"),
        QualityCriterion::MinRelativeQuality(p) => format!("quality >= {p}% of range"),
        QualityCriterion::NumberBest(n) => format!("best {n} frames"),
    }
}

pub fn print_settings_summary(settings: &JobSettings, job_count: usize) {
    let s = Styles::new();

    println!();
    println!("  {}", s.title.apply_to("Saturn Stacking"));
    println!("  {}", s.title.apply_to("\u{2550}".repeat(15)));
    println!();

    println!(
        "  {:<14}{}",
        s.label.apply_to("Jobs"),
        s.value.apply_to(job_count)
    );
    let output = match &settings.output_save_mode {
        OutputSaveMode::None => s.disabled.apply_to("not saved".to_string()),
        OutputSaveMode::SourcePath => s.path.apply_to("next to source".to_string()),
        OutputSaveMode::SpecifiedPath(dir) => s.path.apply_to(dir.display().to_string()),
    };
    println!("  {:<14}{}", s.label.apply_to("Output"), output);
    println!(
        "  {:<14}{}",
        s.label.apply_to("Format"),
        s.method.apply_to(settings.output_fmt.extension())
    );
    println!();

    println!("  {}", s.header.apply_to("Alignment"));
    let method = match settings.alignment_method {
        AlignmentMethod::Anchors if settings.automatic_anchor_placement => "anchors (auto)",
        AlignmentMethod::Anchors => "anchors",
        AlignmentMethod::Centroid => "centroid",
    };
    println!(
        "    {:<12}{}",
        s.label.apply_to("Method"),
        s.method.apply_to(method)
    );
    println!();

    println!("  {}", s.header.apply_to("Frame Selection"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Keep"),
        s.value.apply_to(criterion_text(&settings.quality_criterion))
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Area"),
        s.value.apply_to(format!("{} px", settings.quality_area_size))
    );
    if !settings.excluded_frames.is_empty() {
        println!(
            "    {:<12}{}",
            s.label.apply_to("Excluded"),
            s.disabled
                .apply_to(format!("{} frame(s)", settings.excluded_frames.len()))
        );
    }
    println!();

    println!("  {}", s.header.apply_to("Reference Points"));
    if settings.automatic_ref_points_placement {
        println!(
            "    {:<12}{}",
            s.label.apply_to("Placement"),
            s.method.apply_to(format!(
                "auto, every {} px",
                settings.ref_pt_auto_placement.spacing
            ))
        );
    } else {
        println!(
            "    {:<12}{}",
            s.label.apply_to("Placement"),
            s.method.apply_to("manual")
        );
    }
    println!(
        "    {:<12}{}",
        s.label.apply_to("Block"),
        s.value.apply_to(format!("{} px", settings.ref_pt_block_size))
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Search"),
        s.value.apply_to(format!("{} px", settings.ref_pt_search_radius))
    );
    println!();

    match &settings.flat_field_file_name {
        Some(path) => println!(
            "  {:<14}{}",
            s.header.apply_to("Flat-field"),
            s.path.apply_to(path.display())
        ),
        None => println!(
            "  {:<14}{}",
            s.header.apply_to("Flat-field"),
            s.disabled.apply_to("none")
        ),
    }
    println!();
}

pub fn print_job_results(reports: &[JobReport]) {
    let s = Styles::new();

    println!();
    println!("  {}", s.header.apply_to("Results"));
    for report in reports {
        let state = match &report.state {
            JobState::Processed => s.ok.apply_to(report.state.to_string()),
            JobState::Error(_) => s.error.apply_to(report.state.to_string()),
            _ => s.disabled.apply_to(report.state.to_string()),
        };
        println!("    {}  {}", s.path.apply_to(report.source.display()), state);
        if let Some(ref saved) = report.saved {
            println!(
                "      {:<10}{}",
                s.label.apply_to("Saved"),
                s.path.apply_to(saved.display())
            );
        }
        if let Some(best) = report.best_quality {
            println!(
                "      {:<10}{}",
                s.label.apply_to("Best"),
                s.value.apply_to(format!("{best:.4}"))
            );
        }
    }
    println!();
}
