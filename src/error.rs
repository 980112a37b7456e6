//! Error taxonomy for the pipeline stages.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use station_datagen::{EmptyDimensionError, GenerateError};
use thiserror::Error;

use crate::config::ConfigError;

/// Failure while writing the dataset to the store.
///
/// Whatever the variant, the load transaction has been rolled back when this
/// is returned.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot open store at {path}: {source}")]
    Connection {
        path: String,
        #[source]
        source: duckdb::Error,
    },

    #[error("store is busy: another run holds {} (remove it if no run is active)", lock.display())]
    Busy { lock: PathBuf },

    #[error("cannot create run lock {}: {source}", lock.display())]
    Lock {
        lock: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("insert into {table} failed at row {row}: {source}")]
    Insert {
        table: String,
        row: usize,
        #[source]
        source: duckdb::Error,
    },

    #[error("append would reuse keys in {table}: batch starts at {first_key} but the store holds keys up to {existing_max}")]
    KeyOverlap {
        table: String,
        first_key: i64,
        existing_max: i64,
    },

    #[error("{count} rows in {table}.{column} reference missing {referenced} rows")]
    Orphaned {
        table: String,
        column: String,
        referenced: String,
        count: i64,
    },

    #[error("load cancelled; transaction rolled back")]
    Cancelled,

    #[error("{context}: {source}")]
    Engine {
        context: String,
        #[source]
        source: duckdb::Error,
    },
}

impl LoadError {
    pub(crate) fn engine(context: impl Into<String>) -> impl FnOnce(duckdb::Error) -> Self {
        let context = context.into();
        move |source| LoadError::Engine { context, source }
    }

    /// Constraint violations, as opposed to engine or lock failures
    pub fn is_constraint(&self) -> bool {
        matches!(
            self,
            LoadError::Insert { .. } | LoadError::KeyOverlap { .. } | LoadError::Orphaned { .. }
        )
    }
}

/// Failure while (re)building the derived views
#[derive(Debug, Error)]
pub enum ViewError {
    #[error("cannot read view definition {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid view directory pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("no view definitions found in {}", .0.display())]
    Empty(PathBuf),

    #[error("failed to create view {name}: {source}")]
    Create {
        name: String,
        #[source]
        source: duckdb::Error,
    },

    #[error("{context}: {source}")]
    Engine {
        context: String,
        #[source]
        source: duckdb::Error,
    },
}

/// Failure while signalling the visualization layer
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("cannot write refresh marker {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot encode refresh signal: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Validation,
    Generation,
    Linking,
    Loading,
    Views,
    Refresh,
    Snapshot,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Validation => "validation",
            Stage::Generation => "generation",
            Stage::Linking => "linking",
            Stage::Loading => "loading",
            Stage::Views => "views",
            Stage::Refresh => "refresh",
            Stage::Snapshot => "snapshot",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed run, tagged with the stage that failed
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{stage} stage failed: {source}")]
    Config {
        stage: Stage,
        #[source]
        source: ConfigError,
    },

    #[error("linking stage failed: {0}")]
    Linking(#[from] EmptyDimensionError),

    #[error("loading stage failed: {0}")]
    Load(#[from] LoadError),

    #[error("views stage failed: {0}")]
    Views(#[from] ViewError),

    #[error("refresh stage failed: {0}")]
    Refresh(#[from] RefreshError),
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Config { stage, .. } => *stage,
            PipelineError::Linking(_) => Stage::Linking,
            PipelineError::Load(_) => Stage::Loading,
            PipelineError::Views(_) => Stage::Views,
            PipelineError::Refresh(_) => Stage::Refresh,
        }
    }
}

impl From<ConfigError> for PipelineError {
    fn from(source: ConfigError) -> Self {
        PipelineError::Config {
            stage: Stage::Validation,
            source,
        }
    }
}

impl From<GenerateError> for PipelineError {
    fn from(err: GenerateError) -> Self {
        match err {
            GenerateError::Config(source) => PipelineError::Config {
                stage: Stage::Generation,
                source: ConfigError::Generation(source),
            },
            GenerateError::EmptyDimension(source) => PipelineError::Linking(source),
        }
    }
}
