//! Monthly CSV snapshot of the analytics tables.
//!
//! Each table lands in `<root>/<YYYY_MM>/<table>.csv` with an extra
//! `load_date` column. Existing files for the same month are overwritten.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use tracing::debug;

use crate::schema::Schema;
use crate::store::Store;

#[derive(Debug, Clone)]
pub struct SnapshotSummary {
    pub dir: PathBuf,
    pub files: Vec<PathBuf>,
}

/// `YYYY_MM` folder name for the month containing `period`
pub fn period_folder(period: NaiveDate) -> String {
    period.format("%Y_%m").to_string()
}

pub fn export_snapshot(
    store: &Store,
    schema: &Schema,
    root: &Path,
    period: NaiveDate,
    load_date: NaiveDate,
) -> Result<SnapshotSummary> {
    let dir = root.join(period_folder(period));
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create snapshot directory: {}", dir.display()))?;

    let mut files = Vec::with_capacity(schema.tables.len());
    for table in schema.tables_in_order() {
        let file = dir.join(format!("{}.csv", table.name));
        let sql = format!(
            "COPY (SELECT *, DATE '{}' AS load_date FROM {}) TO '{}' (HEADER, DELIMITER ',')",
            load_date.format("%Y-%m-%d"),
            table.qualified_name(),
            file.to_string_lossy().replace('\'', "''"),
        );
        store
            .connection()
            .execute_batch(&sql)
            .with_context(|| format!("Failed to export {} to {}", table.name, file.display()))?;
        debug!(table = %table.name, file = %file.display(), "exported snapshot");
        files.push(file);
    }

    Ok(SnapshotSummary { dir, files })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_period_folder() {
        assert_eq!(period_folder(NaiveDate::from_ymd_opt(2024, 6, 30).unwrap()), "2024_06");
    }

    #[test]
    fn test_export_writes_one_file_per_table() {
        let store = Store::open_in_memory().unwrap();
        let schema = Schema::analytics();
        store.ensure_schema(&schema).unwrap();
        store
            .connection()
            .execute_batch("INSERT INTO analytics.dim_station VALUES (1, 'Summit Dover', 'Dover');")
            .unwrap();

        let root = TempDir::new().unwrap();
        let summary = export_snapshot(
            &store,
            &schema,
            root.path(),
            NaiveDate::from_ymd_opt(2024, 6, 30).unwrap(),
            NaiveDate::from_ymd_opt(2024, 7, 1).unwrap(),
        )
        .unwrap();

        assert_eq!(summary.dir, root.path().join("2024_06"));
        assert_eq!(summary.files.len(), 7);

        let stations = fs::read_to_string(summary.dir.join("dim_station.csv")).unwrap();
        let mut lines = stations.lines();
        assert_eq!(lines.next(), Some("station_id,station_name,city,load_date"));
        assert_eq!(lines.next(), Some("1,Summit Dover,Dover,2024-07-01"));
    }

    #[test]
    fn test_missing_tables_fail() {
        let store = Store::open_in_memory().unwrap();
        let root = TempDir::new().unwrap();
        let today = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
        assert!(export_snapshot(&store, &Schema::analytics(), root.path(), today, today).is_err());
    }
}
