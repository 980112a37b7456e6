mod generate;
mod query;
mod run;
mod views;

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use std::io;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use station_pipeline::{ConfigOverrides, PipelineFile, RunMode};

#[derive(Parser)]
#[command(name = "station-pipeline")]
#[command(version)]
#[command(about = "Generate gas station transactions, load them into DuckDB and build the analytics views", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log line format
    #[arg(long, value_enum, default_value = "text", global = true)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Flags shared by every command that generates data
#[derive(Args, Debug, Clone, Default)]
pub struct GenerationArgs {
    /// YAML configuration file; flags override its values
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Random seed for reproducibility (random when omitted)
    #[arg(long)]
    pub seed: Option<u64>,

    #[arg(long, value_name = "N")]
    pub customers: Option<usize>,

    #[arg(long, value_name = "N")]
    pub fuel_types: Option<usize>,

    #[arg(long, value_name = "N")]
    pub stations: Option<usize>,

    /// Shop products, taken from the catalog in order
    #[arg(long, value_name = "N")]
    pub products: Option<usize>,

    #[arg(long, value_name = "N")]
    pub trailers: Option<usize>,

    #[arg(long, value_name = "N")]
    pub orders: Option<usize>,

    /// First day of the order window (YYYY-MM-DD, default: start of last month)
    #[arg(long, value_name = "DATE")]
    pub start: Option<NaiveDate>,

    /// Last day of the order window (YYYY-MM-DD, default: end of last month)
    #[arg(long, value_name = "DATE")]
    pub end: Option<NaiveDate>,
}

impl GenerationArgs {
    pub fn load_file(&self) -> anyhow::Result<PipelineFile> {
        match &self.config {
            Some(path) => Ok(PipelineFile::load(path)?),
            None => Ok(PipelineFile::default()),
        }
    }

    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            seed: self.seed,
            customers: self.customers,
            fuel_types: self.fuel_types,
            stations: self.stations,
            products: self.products,
            trailers: self.trailers,
            orders: self.orders,
            start: self.start,
            end: self.end,
            ..Default::default()
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate, load, rebuild views and signal the dashboard
    Run {
        #[command(flatten)]
        generation: GenerationArgs,

        /// replace (truncate and reload) or append; required here or in the config file
        #[arg(short, long, value_name = "MODE")]
        mode: Option<RunMode>,

        /// DuckDB database file (in-memory when omitted)
        #[arg(short, long, value_name = "PATH")]
        database: Option<PathBuf>,

        /// Directory of *.sql view definitions replacing the built-in ones
        #[arg(long, value_name = "DIR")]
        views_dir: Option<PathBuf>,

        /// Marker file rewritten after every successful run
        #[arg(long, value_name = "PATH")]
        refresh_marker: Option<PathBuf>,

        /// Export a monthly CSV snapshot of every table under this directory
        #[arg(long, value_name = "DIR")]
        snapshot_dir: Option<PathBuf>,

        /// Write a JSON execution report here (also on failure)
        #[arg(long, value_name = "PATH")]
        report: Option<PathBuf>,

        /// Show a progress bar while loading
        #[arg(short, long)]
        progress: bool,
    },

    /// Generate a dataset without opening a store
    Generate {
        #[command(flatten)]
        generation: GenerationArgs,

        /// Emit the dataset as JSON instead of a summary
        #[arg(long)]
        json: bool,

        /// Output file (default: stdout); implies --json
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Rebuild the analytics views in an existing database
    Views {
        /// DuckDB database file
        #[arg(short, long, value_name = "PATH")]
        database: PathBuf,

        /// Directory of *.sql view definitions replacing the built-in ones
        #[arg(long, value_name = "DIR")]
        views_dir: Option<PathBuf>,

        /// Only list the views currently defined
        #[arg(long)]
        list: bool,
    },

    /// Run a SQL query against a database
    Query(query::QueryArgs),

    /// Generate shell completions
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: Shell,
    },
}

pub fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run {
            generation,
            mode,
            database,
            views_dir,
            refresh_marker,
            snapshot_dir,
            report,
            progress,
        } => {
            let overrides = ConfigOverrides {
                mode,
                database,
                views_dir,
                refresh_marker,
                snapshot_dir,
                report,
                progress,
                ..generation.overrides()
            };
            run::run(&generation, overrides)
        }
        Commands::Generate {
            generation,
            json,
            output,
        } => generate::run(&generation, json, output.as_deref()),
        Commands::Views {
            database,
            views_dir,
            list,
        } => views::run(&database, views_dir.as_deref(), list),
        Commands::Query(args) => query::run(args),
        Commands::Completions { shell } => {
            generate(
                shell,
                &mut Cli::command(),
                "station-pipeline",
                &mut io::stdout(),
            );
            Ok(())
        }
    }
}

/// Refuse to silently create a database the command only reads from
fn require_existing(database: &Path) -> anyhow::Result<()> {
    if !database.exists() {
        anyhow::bail!("database does not exist: {}", database.display());
    }
    Ok(())
}
