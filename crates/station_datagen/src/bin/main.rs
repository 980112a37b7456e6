//! CLI for generating a station dataset without loading it.
//!
//! Usage:
//!   gen-dataset --seed 42 --customers 50 --orders 200 > dataset.json
//!   gen-dataset --seed 42 --summary

use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::Context;
use chrono::NaiveDate;
use clap::Parser;
use station_datagen::{DateWindow, EntityCounts, GenerationConfig, Generator, KeyOffsets};

#[derive(Parser, Debug)]
#[command(name = "gen-dataset")]
#[command(about = "Generate a synthetic gas station dataset as JSON", long_about = None)]
struct Args {
    /// Random seed for reproducibility (random when omitted)
    #[arg(long)]
    seed: Option<u64>,

    #[arg(long, default_value = "150")]
    customers: usize,

    #[arg(long, default_value = "4")]
    fuel_types: usize,

    #[arg(long, default_value = "3")]
    stations: usize,

    #[arg(long, default_value = "14")]
    products: usize,

    #[arg(long, default_value = "16")]
    trailers: usize,

    #[arg(long, default_value = "1200")]
    orders: usize,

    /// First day of the order window (YYYY-MM-DD, default: start of last month)
    #[arg(long)]
    start: Option<NaiveDate>,

    /// Last day of the order window (YYYY-MM-DD, default: end of last month)
    #[arg(long)]
    end: Option<NaiveDate>,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Pretty-print the JSON
    #[arg(long)]
    pretty: bool,

    /// Print counts and fingerprint instead of the dataset
    #[arg(long)]
    summary: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_window = DateWindow::previous_month(chrono::Local::now().date_naive());
    let window = DateWindow::new(
        args.start.unwrap_or(default_window.start),
        args.end.unwrap_or(default_window.end),
    )?;

    let counts = EntityCounts {
        customers: args.customers,
        fuel_types: args.fuel_types,
        stations: args.stations,
        products: args.products,
        trailers: args.trailers,
        orders: args.orders,
    };

    let generator = Generator::new(GenerationConfig::new(counts, window, args.seed))?;
    let seed = generator.resolve_seed();
    let dataset = generator.generate(seed, KeyOffsets::default())?;

    let mut out: Box<dyn Write> = match args.output {
        Some(ref path) => Box::new(
            File::create(path).with_context(|| format!("Cannot create {}", path.display()))?,
        ),
        None => Box::new(io::stdout().lock()),
    };

    if args.summary {
        writeln!(out, "seed: {}", dataset.seed)?;
        for (kind, count) in dataset.counts() {
            writeln!(out, "{}: {}", kind, count)?;
        }
        writeln!(out, "fingerprint: {}", dataset.fingerprint()?)?;
    } else if args.pretty {
        serde_json::to_writer_pretty(&mut out, &dataset)?;
        writeln!(out)?;
    } else {
        serde_json::to_writer(&mut out, &dataset)?;
        writeln!(out)?;
    }

    if let Some(path) = args.output {
        eprintln!("Generated dataset (seed {}) to {}", seed, path.display());
    }

    Ok(())
}
