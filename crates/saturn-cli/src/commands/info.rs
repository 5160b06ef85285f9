use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use saturn_core::io::ser::SerReader;
use saturn_core::sequence::{ImageSequence, SequenceKind};

#[derive(Args)]
pub struct InfoArgs {
    /// SER video or directory of images
    pub input: PathBuf,
}

pub fn run(args: &InfoArgs) -> Result<()> {
    let sequence = ImageSequence::open(&args.input)
        .with_context(|| format!("Failed to open {}", args.input.display()))?;
    let (width, height) = sequence.dimensions()?;

    println!("Source:      {}", args.input.display());
    println!("Kind:        {}", sequence.kind());
    println!("Frames:      {}", sequence.len());
    println!("Dimensions:  {}x{}", width, height);
    match sequence.cfa_pattern() {
        Some(pattern) => println!("CFA:         {}", pattern),
        None => println!("CFA:         none"),
    }

    if sequence.kind() == SequenceKind::Video {
        let reader = SerReader::open(&args.input)?;
        let header = &reader.header;
        println!("Bit depth:   {}", header.pixel_depth);
        println!("Color:       {:?}", header.color());
        for (label, value) in [
            ("Observer:   ", &header.observer),
            ("Instrument: ", &header.instrument),
            ("Telescope:  ", &header.telescope),
        ] {
            if !value.is_empty() {
                println!("{} {}", label, value);
            }
        }
        if let Some(frame_bytes) = header.frame_byte_size() {
            let total_mb = (frame_bytes * reader.frame_count()) as f64 / (1024.0 * 1024.0);
            println!("Data size:   {:.1} MB", total_mb);
        }
    }

    Ok(())
}
