use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use anyhow::Context;
use chrono::Local;
use station_datagen::{Generator, KeyOffsets};
use station_pipeline::config::{generation_config, ConfigError};
use station_pipeline::PipelineError;

use super::GenerationArgs;

/// Dry run: generate and link, then print instead of loading
pub fn run(generation: &GenerationArgs, json: bool, output: Option<&Path>) -> anyhow::Result<()> {
    let file = generation.load_file()?;
    let config = generation_config(&file, &generation.overrides(), Local::now().date_naive())
        .map_err(PipelineError::from)?;

    let generator = Generator::new(config)
        .map_err(ConfigError::from)
        .map_err(PipelineError::from)?;
    let seed = generator.resolve_seed();
    let dataset = generator
        .generate(seed, KeyOffsets::default())
        .map_err(PipelineError::from)?;

    let mut out: Box<dyn Write> = match output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Cannot create output file: {}", path.display()))?,
        )),
        None => Box::new(io::stdout().lock()),
    };

    if json || output.is_some() {
        serde_json::to_writer_pretty(&mut out, &dataset).context("Failed to encode dataset")?;
        writeln!(out)?;
    } else {
        writeln!(
            out,
            "Dataset for {} to {} (seed {})",
            dataset.window.start, dataset.window.end, seed
        )?;
        for (kind, count) in dataset.counts() {
            writeln!(out, "  {:<14} {:>8}", kind.as_str(), count)?;
        }
        writeln!(out, "  fingerprint:   {}", dataset.fingerprint()?)?;
    }
    out.flush()?;

    if let Some(path) = output {
        eprintln!("Wrote dataset (seed {}) to {}", seed, path.display());
    }
    Ok(())
}
