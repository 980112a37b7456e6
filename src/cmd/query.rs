//! Query command for inspecting a loaded database.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use station_pipeline::store::{OutputFormat, QueryResultFormatter};
use station_pipeline::Store;

use super::require_existing;

/// Run SQL against the analytics database
#[derive(Args, Debug)]
#[command(after_help = "Examples:
  station-pipeline query -d station.duckdb \"SELECT * FROM analytics.top_customers\"
  station-pipeline query -d station.duckdb \"SELECT * FROM analytics.top_fuel_revenue\" -f json
  station-pipeline query -d station.duckdb \"SELECT * FROM analytics.fct_orders\" -o orders.csv -f csv")]
pub struct QueryArgs {
    /// DuckDB database file
    #[arg(short, long, value_name = "PATH")]
    pub database: PathBuf,

    /// SQL query to execute
    #[arg(value_name = "QUERY")]
    pub query: String,

    /// Output format: table, json, jsonl, csv, tsv
    #[arg(short, long, default_value = "table")]
    pub format: String,

    /// Write output to file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Show query execution time
    #[arg(long)]
    pub timing: bool,
}

pub fn run(args: QueryArgs) -> Result<()> {
    let output_format: OutputFormat = args
        .format
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;

    require_existing(&args.database)?;
    let store = Store::open(Some(&args.database), None)?;
    let result = store.query(&args.query)?;

    if let Some(output_path) = args.output {
        let file = File::create(&output_path)
            .with_context(|| format!("Cannot create output file: {}", output_path.display()))?;
        let mut writer = BufWriter::new(file);
        QueryResultFormatter::write(&result, output_format, &mut writer)?;
        writer.flush()?;
        eprintln!(
            "Wrote {} rows to {}",
            result.row_count(),
            output_path.display()
        );
    } else {
        print!("{}", QueryResultFormatter::format(&result, output_format));
    }

    if args.timing {
        eprintln!("Query executed in {:.3}s", result.execution_time_secs);
    }

    Ok(())
}
