use chrono::Local;
use station_pipeline::{CancelFlag, ConfigOverrides, Pipeline, PipelineConfig, PipelineError};
use tracing::warn;

use super::GenerationArgs;

pub fn run(generation: &GenerationArgs, overrides: ConfigOverrides) -> anyhow::Result<()> {
    let file = generation.load_file()?;
    let today = Local::now().date_naive();

    // Invalid settings are rejected here, before any store is opened
    let config = PipelineConfig::resolve(file, overrides, today).map_err(PipelineError::from)?;

    let cancel = CancelFlag::new();
    let handler_flag = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!("Interrupt received, rolling back...");
        handler_flag.cancel();
    }) {
        warn!(error = %e, "could not install interrupt handler");
    }

    let pipeline = Pipeline::new(config).with_cancel(cancel).with_today(today);
    let (report, result) = pipeline.run();

    print!("{}", report.render());
    if let (Some(path), true) = (&pipeline.config().report, result.is_ok()) {
        println!("Report written to {}", path.display());
    }

    result?;
    Ok(())
}
