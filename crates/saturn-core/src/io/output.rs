use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::Result;
use crate::frame::ImageData;
use crate::job::{OutputFormat, OutputSaveMode};
use crate::sequence::SequenceKind;

use super::image_io::save_image;

/// Directory a job's results go to, or `None` when nothing is saved.
pub fn destination_dir(
    mode: &OutputSaveMode,
    source_path: &Path,
    kind: SequenceKind,
) -> Option<PathBuf> {
    match mode {
        OutputSaveMode::None => None,
        OutputSaveMode::SpecifiedPath(dir) => Some(dir.clone()),
        OutputSaveMode::SourcePath => match kind {
            SequenceKind::ImageFiles if source_path.is_dir() => Some(source_path.to_path_buf()),
            _ => Some(
                source_path
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_default(),
            ),
        },
    }
}

/// Base file name (no extension) of a job's stack.
pub fn stack_base_name(source_path: &Path, kind: SequenceKind) -> String {
    match kind {
        SequenceKind::ImageFiles => "stack".to_string(),
        SequenceKind::Video | SequenceKind::Memory => {
            let stem = source_path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "sequence".to_string());
            format!("{stem}_stacked")
        }
    }
}

/// First path `<dir>/<base><n>.<ext>` that does not exist yet, where `n` is
/// omitted for the first candidate and counts up from 1 afterwards.
pub fn unique_path(dir: &Path, base: &str, ext: &str) -> PathBuf {
    let mut counter = 0u32;
    loop {
        let name = if counter == 0 {
            format!("{base}.{ext}")
        } else {
            format!("{base}{counter}.{ext}")
        };
        let candidate = dir.join(name);
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

/// Path the stack of a job would be auto-saved to.
pub fn auto_save_path(
    mode: &OutputSaveMode,
    source_path: &Path,
    kind: SequenceKind,
    format: OutputFormat,
) -> Option<PathBuf> {
    let dir = destination_dir(mode, source_path, kind)?;
    Some(unique_path(
        &dir,
        &stack_base_name(source_path, kind),
        format.extension(),
    ))
}

/// Save `stack` under a fresh auto-save name; returns the written path.
pub fn auto_save_stack(
    stack: &ImageData,
    mode: &OutputSaveMode,
    source_path: &Path,
    kind: SequenceKind,
    format: OutputFormat,
) -> Result<Option<PathBuf>> {
    let Some(path) = auto_save_path(mode, source_path, kind, format) else {
        return Ok(None);
    };
    save_image(stack, &path, format)?;
    info!(path = %path.display(), "Saved stack");
    Ok(Some(path))
}

/// Write per-frame quality as CSV (`frame,quality`) in chronological
/// order. `frames_chrono` holds one score per active frame; rows are
/// numbered by position in the whole sequence. Inactive frames get a row
/// with an empty score when `include_inactive` is set.
pub fn export_quality_data(
    path: &Path,
    frames_chrono: &[f32],
    active: &[bool],
    include_inactive: bool,
) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    writeln!(out, "frame,quality")?;
    let mut scores = frames_chrono.iter();
    for (index, &is_active) in active.iter().enumerate() {
        if is_active {
            let Some(q) = scores.next() else {
                break;
            };
            writeln!(out, "{index},{q}")?;
        } else if include_inactive {
            writeln!(out, "{index},")?;
        }
    }
    out.flush()?;
    Ok(())
}

/// Quality CSV path matching a saved stack (`<stack stem>_quality.csv`).
pub fn quality_data_path(stack_path: &Path) -> PathBuf {
    let stem = stack_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    stack_path.with_file_name(format!("{stem}_quality.csv"))
}
