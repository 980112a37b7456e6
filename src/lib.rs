//! Gas station analytics pipeline: synthesizes a linked dataset, loads it
//! into DuckDB under one transaction, rebuilds the reporting views and
//! signals the dashboard.

pub mod config;
pub mod error;
pub mod loader;
pub mod pipeline;
pub mod refresh;
pub mod report;
pub mod schema;
pub mod snapshot;
pub mod store;
pub mod views;

pub use config::{ConfigOverrides, PipelineConfig, PipelineFile, RunMode};
pub use error::{LoadError, PipelineError, RefreshError, Stage, ViewError};
pub use loader::{CancelFlag, CommitHook, LoadCoordinator, LoadSummary};
pub use pipeline::{Pipeline, RunSummary};
pub use refresh::{MarkerFileTrigger, NoopTrigger, RefreshSignal, RefreshTrigger};
pub use report::ExecutionReport;
pub use store::Store;
pub use views::ViewMaterializer;
