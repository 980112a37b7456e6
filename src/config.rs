//! Pipeline configuration: YAML file layered under command-line overrides.
//!
//! The run mode is never defaulted. A run without `mode` in the file and
//! without `--mode` on the command line is rejected before any I/O.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use station_datagen::{DateWindow, EntityCounts, GenerationConfig, SkewPolicy};
use thiserror::Error;

/// How a run treats data already in the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Truncate the analytics tables, then load
    Replace,
    /// Add a new batch with keys above the existing ones
    Append,
}

impl std::str::FromStr for RunMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "replace" => Ok(RunMode::Replace),
            "append" => Ok(RunMode::Append),
            _ => Err(ConfigError::UnknownRunMode(s.to_string())),
        }
    }
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunMode::Replace => write!(f, "replace"),
            RunMode::Append => write!(f, "append"),
        }
    }
}

/// Invalid or incomplete pipeline configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Generation(#[from] station_datagen::ConfigError),

    #[error("run mode must be declared explicitly (replace or append)")]
    MissingRunMode,

    #[error("unknown run mode '{0}', expected replace or append")]
    UnknownRunMode(String),

    #[error("cannot read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml_ng::Error,
    },
}

/// Date window as written in a config file; either bound may be omitted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowSpec {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

/// On-disk YAML configuration. Every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineFile {
    pub mode: Option<RunMode>,
    pub seed: Option<u64>,
    pub counts: EntityCounts,
    pub window: WindowSpec,
    pub skew: SkewPolicy,
    /// DuckDB file; omitted means an in-memory store
    pub database: Option<PathBuf>,
    pub views_dir: Option<PathBuf>,
    pub refresh_marker: Option<PathBuf>,
    pub snapshot_dir: Option<PathBuf>,
    pub report: Option<PathBuf>,
    /// DuckDB memory limit (e.g. "1GB")
    pub memory_limit: Option<String>,
}

impl PipelineFile {
    /// Load configuration from a YAML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(yaml: &str) -> Result<Self, serde_yaml_ng::Error> {
        serde_yaml_ng::from_str(yaml)
    }
}

/// Values given on the command line; each one wins over the file
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub mode: Option<RunMode>,
    pub seed: Option<u64>,
    pub customers: Option<usize>,
    pub fuel_types: Option<usize>,
    pub stations: Option<usize>,
    pub products: Option<usize>,
    pub trailers: Option<usize>,
    pub orders: Option<usize>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub database: Option<PathBuf>,
    pub views_dir: Option<PathBuf>,
    pub refresh_marker: Option<PathBuf>,
    pub snapshot_dir: Option<PathBuf>,
    pub report: Option<PathBuf>,
    pub progress: bool,
}

/// Fully resolved and validated run configuration
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub mode: RunMode,
    pub generation: GenerationConfig,
    pub database: Option<PathBuf>,
    pub views_dir: Option<PathBuf>,
    pub refresh_marker: Option<PathBuf>,
    pub snapshot_dir: Option<PathBuf>,
    pub report: Option<PathBuf>,
    pub memory_limit: Option<String>,
    pub progress: bool,
}

impl PipelineConfig {
    /// Merge file and overrides, then validate.
    ///
    /// A missing window bound falls back to the calendar month before
    /// `today`.
    pub fn resolve(
        file: PipelineFile,
        overrides: ConfigOverrides,
        today: NaiveDate,
    ) -> Result<Self, ConfigError> {
        let generation = generation_config(&file, &overrides, today)?;
        let mode = overrides
            .mode
            .or(file.mode)
            .ok_or(ConfigError::MissingRunMode)?;

        Ok(Self {
            mode,
            generation,
            database: overrides.database.or(file.database),
            views_dir: overrides.views_dir.or(file.views_dir),
            refresh_marker: overrides.refresh_marker.or(file.refresh_marker),
            snapshot_dir: overrides.snapshot_dir.or(file.snapshot_dir),
            report: overrides.report.or(file.report),
            memory_limit: file.memory_limit,
            progress: overrides.progress,
        })
    }
}

/// Generation settings only; used by runs that never open a store
pub fn generation_config(
    file: &PipelineFile,
    overrides: &ConfigOverrides,
    today: NaiveDate,
) -> Result<GenerationConfig, ConfigError> {
    let counts = EntityCounts {
        customers: overrides.customers.unwrap_or(file.counts.customers),
        fuel_types: overrides.fuel_types.unwrap_or(file.counts.fuel_types),
        stations: overrides.stations.unwrap_or(file.counts.stations),
        products: overrides.products.unwrap_or(file.counts.products),
        trailers: overrides.trailers.unwrap_or(file.counts.trailers),
        orders: overrides.orders.unwrap_or(file.counts.orders),
    };

    let fallback = DateWindow::previous_month(today);
    let window = DateWindow {
        start: overrides.start.or(file.window.start).unwrap_or(fallback.start),
        end: overrides.end.or(file.window.end).unwrap_or(fallback.end),
    };

    let mut config = GenerationConfig::new(counts, window, overrides.seed.or(file.seed));
    config.skew = file.skew;
    config.validate()?;
    Ok(config)
}
