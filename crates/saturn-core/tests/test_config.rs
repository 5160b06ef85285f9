use std::path::PathBuf;

use saturn_core::frame::CfaPattern;
use saturn_core::job::{
    AlignmentMethod, JobSettings, OutputFormat, OutputSaveMode, QualityCriterion,
};

#[test]
fn test_default_settings_roundtrip() {
    let settings = JobSettings::default();
    let text = toml::to_string_pretty(&settings).unwrap();
    let parsed: JobSettings = toml::from_str(&text).unwrap();
    assert_eq!(parsed, settings);
}

#[test]
fn test_custom_settings_roundtrip() {
    let mut settings = JobSettings {
        alignment_method: AlignmentMethod::Centroid,
        quality_criterion: QualityCriterion::MinRelativeQuality(60),
        cfa_pattern: Some(CfaPattern::GBRG),
        flat_field_file_name: Some(PathBuf::from("/data/flat.tif")),
        output_fmt: OutputFormat::Png8,
        output_save_mode: OutputSaveMode::SpecifiedPath(PathBuf::from("/data/out")),
        export_quality_data: true,
        excluded_frames: vec![0, 7, 8],
        export_inactive_frames_quality: true,
        ..JobSettings::default()
    };
    settings.ref_pt_auto_placement.spacing = 25;

    let text = toml::to_string_pretty(&settings).unwrap();
    let parsed: JobSettings = toml::from_str(&text).unwrap();
    assert_eq!(parsed, settings);
}

#[test]
fn test_partial_toml_uses_defaults() {
    let text = r#"
alignment_method = "centroid"
ref_pt_block_size = 24
quality_criterion = { number_best = 50 }
output_save_mode = "none"

[ref_pt_auto_placement]
structure_threshold = 1.5
"#;
    let settings: JobSettings = toml::from_str(text).unwrap();
    let defaults = JobSettings::default();

    assert_eq!(settings.alignment_method, AlignmentMethod::Centroid);
    assert_eq!(settings.ref_pt_block_size, 24);
    assert_eq!(settings.quality_criterion, QualityCriterion::NumberBest(50));
    assert_eq!(settings.output_save_mode, OutputSaveMode::None);
    assert_eq!(settings.ref_pt_auto_placement.structure_threshold, 1.5);
    assert_eq!(
        settings.ref_pt_auto_placement.spacing,
        defaults.ref_pt_auto_placement.spacing
    );
    assert_eq!(settings.anchor_block_size, defaults.anchor_block_size);
    assert_eq!(settings.cfa_pattern, None);
}

#[test]
fn test_empty_toml_is_default() {
    let settings: JobSettings = toml::from_str("").unwrap();
    assert_eq!(settings, JobSettings::default());
}

#[test]
fn test_unknown_variant_rejected() {
    assert!(toml::from_str::<JobSettings>(r#"alignment_method = "stars""#).is_err());
}

#[test]
fn test_criterion_threshold() {
    assert_eq!(QualityCriterion::PercentageBest(30).threshold(), 30);
    assert_eq!(QualityCriterion::NumberBest(7).threshold(), 7);
    assert_eq!(QualityCriterion::default(), QualityCriterion::PercentageBest(30));
}
