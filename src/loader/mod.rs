//! Load coordinator: writes a generated dataset into the store under a
//! single transaction.
//!
//! Tables are written in the contract's dependency order (dimensions before
//! facts). Every exit path other than a successful commit drops the
//! `duckdb::Transaction`, which rolls the whole run back.

mod batch;

pub use batch::{encode_dataset, flush_batch, TableBatch};

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use duckdb::Connection;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use station_datagen::{Dataset, EntityKind};
use tracing::{debug, info};

use crate::config::RunMode;
use crate::error::{LoadError, PipelineError};
use crate::schema::{surrogate_key_column, Schema, SCHEMA_NAME};
use crate::store::{max_key, Store};

/// Cooperative cancellation shared with a signal handler
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Outcome of a committed load
#[derive(Debug, Clone, Serialize)]
pub struct LoadSummary {
    pub mode: RunMode,
    /// Rows inserted per table
    pub rows_written: BTreeMap<String, usize>,
    pub duration_secs: f64,
}

impl LoadSummary {
    pub fn total_rows(&self) -> usize {
        self.rows_written.values().sum()
    }
}

impl std::fmt::Display for LoadSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} rows loaded into {} tables ({}) in {:.2}s",
            self.total_rows(),
            self.rows_written.len(),
            self.mode,
            self.duration_secs
        )
    }
}

/// Work to run once a load has committed
pub trait CommitHook {
    fn name(&self) -> &str;

    fn on_commit(&self, conn: &mut Connection, summary: &LoadSummary) -> Result<(), PipelineError>;
}

impl<T: CommitHook + ?Sized> CommitHook for &T {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn on_commit(&self, conn: &mut Connection, summary: &LoadSummary) -> Result<(), PipelineError> {
        (**self).on_commit(conn, summary)
    }
}

pub struct LoadCoordinator<'s> {
    store: &'s mut Store,
    schema: Schema,
    cancel: CancelFlag,
    progress: bool,
    hooks: Vec<Box<dyn CommitHook + 's>>,
}

impl<'s> LoadCoordinator<'s> {
    pub fn new(store: &'s mut Store) -> Self {
        Self {
            store,
            schema: Schema::analytics(),
            cancel: CancelFlag::new(),
            progress: false,
            hooks: Vec::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_hook(mut self, hook: impl CommitHook + 's) -> Self {
        self.hooks.push(Box::new(hook));
        self
    }

    /// Write the dataset and commit; nothing persists on error
    pub fn load(&mut self, dataset: &Dataset, mode: RunMode) -> Result<LoadSummary, LoadError> {
        let start = Instant::now();
        let schema = &self.schema;
        let cancel = &self.cancel;

        let batches = encode_dataset(dataset);
        let total: usize = batches.iter().map(TableBatch::row_count).sum();
        let progress = self.progress.then(|| progress_bar(total as u64));

        let tx = self
            .store
            .connection_mut()
            .transaction()
            .map_err(LoadError::engine("failed to begin load transaction"))?;

        match mode {
            RunMode::Replace => reset_tables(&tx, schema)?,
            RunMode::Append => {
                crate::store::ensure_schema(&tx, schema)?;
                check_key_overlap(&tx, dataset)?;
            }
        }

        let mut rows_written = BTreeMap::new();
        for table in schema.tables_in_order() {
            let Some(batch) = batches.iter().find(|b| b.table == table.name) else {
                continue;
            };
            let inserted = flush_batch(&tx, table, batch, cancel, progress.as_ref())?;
            debug!(table = %table.name, rows = inserted, "flushed batch");
            rows_written.insert(table.name.clone(), inserted);
        }

        verify_references(&tx, schema)?;

        if cancel.is_cancelled() {
            return Err(LoadError::Cancelled);
        }
        tx.commit()
            .map_err(LoadError::engine("failed to commit load transaction"))?;

        if let Some(pb) = progress {
            pb.finish_and_clear();
        }

        let summary = LoadSummary {
            mode,
            rows_written,
            duration_secs: start.elapsed().as_secs_f64(),
        };
        info!(mode = %mode, rows = summary.total_rows(), "load committed");
        Ok(summary)
    }

    /// [`load`](Self::load), then run every commit hook in registration order
    pub fn load_and_notify(
        &mut self,
        dataset: &Dataset,
        mode: RunMode,
    ) -> Result<LoadSummary, PipelineError> {
        let summary = self.load(dataset, mode)?;
        for hook in &self.hooks {
            debug!(hook = hook.name(), "running commit hook");
            hook.on_commit(self.store.connection_mut(), &summary)?;
        }
        Ok(summary)
    }
}

fn progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} rows ({percent}%)",
    ) {
        pb.set_style(style.progress_chars("=>-"));
    }
    pb
}

/// Truncate semantics: drop and recreate every analytics table
fn reset_tables(conn: &Connection, schema: &Schema) -> Result<(), LoadError> {
    conn.execute_batch(&format!("CREATE SCHEMA IF NOT EXISTS {}", SCHEMA_NAME))
        .map_err(LoadError::engine("failed to create analytics schema"))?;

    let ordered = schema.tables_in_order();
    for table in ordered.iter().rev() {
        conn.execute_batch(&table.drop_sql())
            .map_err(LoadError::engine(format!("failed to drop {}", table.name)))?;
    }
    for table in &ordered {
        conn.execute_batch(&table.create_sql())
            .map_err(LoadError::engine(format!("failed to create {}", table.name)))?;
    }
    Ok(())
}

/// An appended batch must start above every stored surrogate key. Kinds the
/// batch adds no rows for are skipped.
fn check_key_overlap(conn: &Connection, dataset: &Dataset) -> Result<(), LoadError> {
    for kind in [
        EntityKind::Customer,
        EntityKind::FuelType,
        EntityKind::Station,
        EntityKind::Product,
        EntityKind::Trailer,
        EntityKind::Order,
    ] {
        let (Some((first_key, _)), Some((table, _))) =
            (dataset.key_range(kind), surrogate_key_column(kind))
        else {
            continue;
        };
        let existing_max = max_key(conn, kind)?;
        if first_key <= existing_max {
            return Err(LoadError::KeyOverlap {
                table: table.to_string(),
                first_key,
                existing_max,
            });
        }
    }
    Ok(())
}

fn verify_references(conn: &Connection, schema: &Schema) -> Result<(), LoadError> {
    for table in &schema.tables {
        for check in table.orphan_checks() {
            let count: i64 = conn
                .query_row(&check.sql, [], |row| row.get(0))
                .map_err(LoadError::engine(format!(
                    "failed to verify {}.{}",
                    check.table, check.column
                )))?;
            if count > 0 {
                return Err(LoadError::Orphaned {
                    table: check.table,
                    column: check.column,
                    referenced: check.referenced,
                    count,
                });
            }
        }
    }
    Ok(())
}
