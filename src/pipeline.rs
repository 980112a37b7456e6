//! Pipeline orchestration: validation, generation, linking, loading, views,
//! refresh and snapshot, in that order.
//!
//! Every stage up to and including refresh is required; the first failure
//! stops the run. The snapshot is best-effort and only produces a warning.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;

use chrono::{NaiveDate, Utc};
use duckdb::Connection;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use station_datagen::{Dataset, Generator, KeyOffsets, StoredDimensions};
use tracing::{info, warn};

use crate::config::{ConfigError, PipelineConfig, RunMode};
use crate::error::{LoadError, PipelineError, Stage};
use crate::loader::{CancelFlag, CommitHook, LoadCoordinator, LoadSummary};
use crate::refresh::{trigger_for, RefreshSignal, RefreshTrigger};
use crate::report::{ExecutionReport, StageStatus};
use crate::schema::Schema;
use crate::snapshot::export_snapshot;
use crate::store::Store;
use crate::views::ViewMaterializer;

/// What a successful run produced
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub seed: u64,
    pub fingerprint: Option<String>,
    pub load: LoadSummary,
    pub views: Vec<String>,
    pub row_counts: BTreeMap<String, i64>,
    pub snapshot_dir: Option<PathBuf>,
}

pub struct Pipeline {
    config: PipelineConfig,
    cancel: CancelFlag,
    trigger: Box<dyn RefreshTrigger>,
    today: NaiveDate,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let trigger = trigger_for(config.refresh_marker.as_deref());
        Self {
            config,
            cancel: CancelFlag::new(),
            trigger,
            today: Utc::now().date_naive(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_trigger(mut self, trigger: Box<dyn RefreshTrigger>) -> Self {
        self.trigger = trigger;
        self
    }

    /// Date stamped on snapshot rows
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every stage and write the execution report, also on failure
    pub fn run(&self) -> (ExecutionReport, Result<RunSummary, PipelineError>) {
        let mut report = ExecutionReport::start(self.config.mode, self.config.database.as_deref());
        info!(mode = %self.config.mode, database = ?self.config.database, "pipeline started");

        let result = self.execute(&mut report);
        report.finish(&result);

        match &result {
            Ok(summary) => info!(seed = summary.seed, rows = summary.load.total_rows(), "pipeline finished"),
            Err(e) => warn!(stage = %e.stage(), error = %e, "pipeline failed"),
        }

        if let Some(path) = &self.config.report {
            if let Err(e) = report.write(path) {
                warn!(error = %e, "could not save execution report");
            }
        }

        (report, result)
    }

    fn execute(&self, report: &mut ExecutionReport) -> Result<RunSummary, PipelineError> {
        let generator = report.record(Stage::Validation, || {
            Generator::new(self.config.generation.clone())
                .map_err(ConfigError::from)
                .map_err(PipelineError::from)
        })?;
        let seed = generator.resolve_seed();
        report.seed = Some(seed);

        // Only opened once the configuration is known to be valid
        let opened = Instant::now();
        let (mut store, offsets, stored) = match self.open_store() {
            Ok(opened) => opened,
            Err(e) => {
                report.push(
                    Stage::Loading,
                    StageStatus::Failed,
                    opened.elapsed().as_secs_f64(),
                    Some(e.to_string()),
                );
                return Err(e.into());
            }
        };
        let open_secs = opened.elapsed().as_secs_f64();
        let generator = generator.with_stored(stored);

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let unlinked = report.record(Stage::Generation, || {
            generator
                .draft_with_rng(&mut rng, seed, offsets)
                .map_err(PipelineError::from)
        })?;
        let dataset: Dataset = report.record(Stage::Linking, || {
            unlinked
                .link(&generator.config().skew, &mut rng)
                .map_err(PipelineError::from)
        })?;
        report.fingerprint = dataset.fingerprint().ok();

        // An unreadable or empty view directory fails before any data is written
        let materializer = match ViewMaterializer::from_dir(self.config.views_dir.as_deref()) {
            Ok(m) => m,
            Err(e) => {
                let e = PipelineError::from(e);
                report.push(Stage::Views, StageStatus::Failed, 0.0, Some(e.to_string()));
                return Err(e);
            }
        };
        let view_stage = TimedViews::new(&materializer);
        let started = Instant::now();
        let loaded = LoadCoordinator::new(&mut store)
            .with_cancel(self.cancel.clone())
            .with_progress(self.config.progress)
            .with_hook(&view_stage)
            .load_and_notify(&dataset, self.config.mode);
        let views_secs = view_stage.elapsed.get();
        let load_secs = open_secs + started.elapsed().as_secs_f64() - views_secs;

        let load = match loaded {
            Ok(load) => {
                report.push(Stage::Loading, StageStatus::Succeeded, load_secs, None);
                report.push(Stage::Views, StageStatus::Succeeded, views_secs, None);
                load
            }
            Err(e @ PipelineError::Views(_)) => {
                report.push(Stage::Loading, StageStatus::Succeeded, load_secs, None);
                report.push(Stage::Views, StageStatus::Failed, views_secs, Some(e.to_string()));
                return Err(e);
            }
            Err(e) => {
                report.push(Stage::Loading, StageStatus::Failed, load_secs, Some(e.to_string()));
                return Err(e);
            }
        };
        let views = view_stage.names.into_inner();
        report.views = views.clone();

        let schema = Schema::analytics();
        let row_counts = store.row_counts(&schema)?;
        report.row_counts = row_counts.clone();

        let signal = RefreshSignal {
            completed_at: Utc::now(),
            mode: self.config.mode,
            seed,
            rows_written: load.rows_written.clone(),
            views: views.clone(),
        };
        report.record(Stage::Refresh, || {
            self.trigger.notify(&signal).map_err(PipelineError::from)
        })?;

        let mut snapshot_dir = None;
        if let Some(root) = &self.config.snapshot_dir {
            let started = Instant::now();
            match export_snapshot(&store, &schema, root, dataset.window.end, self.today) {
                Ok(snapshot) => {
                    report.push(Stage::Snapshot, StageStatus::Succeeded, started.elapsed().as_secs_f64(), None);
                    snapshot_dir = Some(snapshot.dir);
                }
                Err(e) => {
                    warn!(error = %format!("{:#}", e), "historical snapshot failed; continuing");
                    report.push(
                        Stage::Snapshot,
                        StageStatus::Warning,
                        started.elapsed().as_secs_f64(),
                        Some(format!("{:#}", e)),
                    );
                }
            }
        }

        Ok(RunSummary {
            seed,
            fingerprint: report.fingerprint.clone(),
            load,
            views,
            row_counts,
            snapshot_dir,
        })
    }
}

impl Pipeline {
    /// Take the run lock, open the store and read what an append builds on:
    /// the key offsets and the stored catalog and fleet rows
    fn open_store(&self) -> Result<(Store, KeyOffsets, StoredDimensions), LoadError> {
        let store = Store::open_for_run(
            self.config.database.as_deref(),
            self.config.memory_limit.as_deref(),
        )?;
        let (offsets, stored) = match self.config.mode {
            RunMode::Replace => (KeyOffsets::default(), StoredDimensions::default()),
            RunMode::Append => (store.key_offsets()?, store.stored_dimensions()?),
        };
        Ok((store, offsets, stored))
    }
}

/// Commit hook that materializes views and remembers how long it took
struct TimedViews<'a> {
    materializer: &'a ViewMaterializer,
    elapsed: Cell<f64>,
    names: RefCell<Vec<String>>,
}

impl<'a> TimedViews<'a> {
    fn new(materializer: &'a ViewMaterializer) -> Self {
        Self {
            materializer,
            elapsed: Cell::new(0.0),
            names: RefCell::new(Vec::new()),
        }
    }
}

impl CommitHook for TimedViews<'_> {
    fn name(&self) -> &str {
        self.materializer.name()
    }

    fn on_commit(&self, conn: &mut Connection, _summary: &LoadSummary) -> Result<(), PipelineError> {
        let started = Instant::now();
        let result = self.materializer.materialize(conn);
        self.elapsed.set(started.elapsed().as_secs_f64());
        *self.names.borrow_mut() = result?;
        Ok(())
    }
}
