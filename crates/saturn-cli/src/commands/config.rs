use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use saturn_core::job::JobSettings;

#[derive(Args)]
pub struct ConfigArgs {
    /// Write settings to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Print or save the default job settings as TOML.
pub fn run(args: &ConfigArgs) -> Result<()> {
    let toml_str = toml::to_string_pretty(&JobSettings::default())?;

    if let Some(ref path) = args.output {
        std::fs::write(path, &toml_str)
            .with_context(|| format!("Failed to write settings to {}", path.display()))?;
        println!("Default settings saved to {}", path.display());
    } else {
        print!("{}", toml_str);
    }

    Ok(())
}

/// Load job settings from a TOML file; missing keys take their defaults.
pub fn load(path: &std::path::Path) -> Result<JobSettings> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings {}", path.display()))?;
    toml::from_str(&contents).with_context(|| format!("Invalid settings in {}", path.display()))
}
