//! Execution report: per-stage outcome and timing of one pipeline run.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::RunMode;
use crate::error::{PipelineError, Stage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Succeeded,
    Failed,
    /// A non-required stage failed; the run carried on
    Warning,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageResult {
    pub stage: Stage,
    pub status: StageStatus,
    pub duration_secs: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportedError {
    pub stage: Stage,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_secs: f64,
    pub success: bool,
    pub mode: RunMode,
    pub database: Option<PathBuf>,
    /// Effective seed; set once generation has started
    pub seed: Option<u64>,
    pub fingerprint: Option<String>,
    pub stages: Vec<StageResult>,
    pub row_counts: BTreeMap<String, i64>,
    pub views: Vec<String>,
    pub error: Option<ReportedError>,
    #[serde(skip)]
    clock: Option<Instant>,
}

impl ExecutionReport {
    pub fn start(mode: RunMode, database: Option<&Path>) -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            duration_secs: 0.0,
            success: false,
            mode,
            database: database.map(Path::to_path_buf),
            seed: None,
            fingerprint: None,
            stages: Vec::new(),
            row_counts: BTreeMap::new(),
            views: Vec::new(),
            error: None,
            clock: Some(Instant::now()),
        }
    }

    /// Run `f` as `stage`, recording its duration and outcome
    pub fn record<T, E: std::fmt::Display>(
        &mut self,
        stage: Stage,
        f: impl FnOnce() -> std::result::Result<T, E>,
    ) -> std::result::Result<T, E> {
        let start = Instant::now();
        let result = f();
        let (status, detail) = match &result {
            Ok(_) => (StageStatus::Succeeded, None),
            Err(e) => (StageStatus::Failed, Some(e.to_string())),
        };
        self.push(stage, status, start.elapsed().as_secs_f64(), detail);
        result
    }

    pub fn push(&mut self, stage: Stage, status: StageStatus, duration_secs: f64, detail: Option<String>) {
        self.stages.push(StageResult {
            stage,
            status,
            duration_secs,
            detail,
        });
    }

    pub fn stage(&self, stage: Stage) -> Option<&StageResult> {
        self.stages.iter().find(|s| s.stage == stage)
    }

    pub fn finish<T>(&mut self, result: &std::result::Result<T, PipelineError>) {
        self.finished_at = Some(Utc::now());
        self.duration_secs = self.clock.map_or(0.0, |c| c.elapsed().as_secs_f64());
        self.success = result.is_ok();
        self.error = result.as_ref().err().map(|e| ReportedError {
            stage: e.stage(),
            message: e.to_string(),
        });
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to encode execution report")?;
        fs::write(path, json + "\n")
            .with_context(|| format!("Failed to write execution report: {}", path.display()))
    }

    /// Human-readable summary for the terminal
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Pipeline run ({})", self.mode);
        if let Some(seed) = self.seed {
            let _ = writeln!(out, "  seed:        {}", seed);
        }
        if let Some(fp) = &self.fingerprint {
            let _ = writeln!(out, "  fingerprint: {}", fp);
        }
        for stage in &self.stages {
            let mark = match stage.status {
                StageStatus::Succeeded => "ok",
                StageStatus::Failed => "FAILED",
                StageStatus::Warning => "warning",
            };
            let _ = write!(out, "  {:<11} {:<8} {:>7.2}s", stage.stage.as_str(), mark, stage.duration_secs);
            if let Some(detail) = &stage.detail {
                let _ = write!(out, "  {}", detail);
            }
            out.push('\n');
        }
        for (table, rows) in &self.row_counts {
            let _ = writeln!(out, "  {:<14} {:>8} rows", table, rows);
        }
        let _ = writeln!(
            out,
            "{} in {:.2}s",
            if self.success { "Completed" } else { "Failed" },
            self.duration_secs
        );
        out
    }
}
