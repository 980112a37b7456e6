//! Refresh trigger: tells the visualization layer that fresh data is in.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::info;

use crate::config::RunMode;
use crate::error::RefreshError;

/// Payload of a completion signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshSignal {
    pub completed_at: DateTime<Utc>,
    pub mode: RunMode,
    pub seed: u64,
    /// Rows inserted per table by this run
    pub rows_written: BTreeMap<String, usize>,
    pub views: Vec<String>,
}

pub trait RefreshTrigger {
    fn notify(&self, signal: &RefreshSignal) -> Result<(), RefreshError>;
}

/// Used when no refresh target is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTrigger;

impl RefreshTrigger for NoopTrigger {
    fn notify(&self, _signal: &RefreshSignal) -> Result<(), RefreshError> {
        Ok(())
    }
}

/// Writes the signal as JSON to a marker file the dashboard watches.
///
/// The file is written to a temporary sibling and renamed into place, so a
/// watcher never sees a partial marker.
#[derive(Debug, Clone)]
pub struct MarkerFileTrigger {
    path: PathBuf,
}

impl MarkerFileTrigger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RefreshTrigger for MarkerFileTrigger {
    fn notify(&self, signal: &RefreshSignal) -> Result<(), RefreshError> {
        let io_err = |source: std::io::Error| RefreshError::Io {
            path: self.path.clone(),
            source,
        };

        let body = serde_json::to_vec_pretty(signal)?;
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };

        let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
        tmp.write_all(&body).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(&self.path).map_err(|e| io_err(e.error))?;

        info!(marker = %self.path.display(), "refresh marker written");
        Ok(())
    }
}

/// Marker trigger when a path is configured, no-op otherwise
pub fn trigger_for(marker: Option<&Path>) -> Box<dyn RefreshTrigger> {
    match marker {
        Some(path) => Box::new(MarkerFileTrigger::new(path)),
        None => Box::new(NoopTrigger),
    }
}
