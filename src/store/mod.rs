//! Embedded DuckDB store holding the `analytics` schema.
//!
//! A store is either a database file or an in-memory database. File-backed
//! stores opened for a pipeline run are guarded by a [`RunLock`] so two runs
//! never write the same database at once.

mod lock;
mod output;

pub use lock::{lock_path, RunLock};
pub use output::{Cell, OutputFormat, QueryResultFormatter};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use duckdb::types::{TimeUnit, Type, ValueRef};
use duckdb::Connection;
use station_datagen::fake::catalog_item;
use station_datagen::{
    EntityKind, FuelType, KeyOffsets, Product, ProductCategory, Station, StoredDimensions, Trailer,
    TrailerStatus,
};

use crate::error::LoadError;
use crate::schema::{surrogate_key_column, Schema, SCHEMA_NAME};

/// Result of a query execution
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
    pub execution_time_secs: f64,
}

impl QueryResult {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Values of one column, rendered as text
    pub fn column_values(&self, name: &str) -> Option<Vec<String>> {
        let idx = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|row| row[idx].to_string()).collect())
    }
}

/// Handle on the analytics database
pub struct Store {
    conn: Connection,
    path: Option<PathBuf>,
    _lock: Option<RunLock>,
}

impl Store {
    /// Open a database file, or an in-memory database when `path` is `None`
    pub fn open(path: Option<&Path>, memory_limit: Option<&str>) -> Result<Self, LoadError> {
        let conn = match path {
            Some(p) => Connection::open(p).map_err(|source| LoadError::Connection {
                path: p.display().to_string(),
                source,
            })?,
            None => Connection::open_in_memory().map_err(|source| LoadError::Connection {
                path: ":memory:".to_string(),
                source,
            })?,
        };

        if let Some(limit) = memory_limit {
            conn.execute_batch(&format!("SET memory_limit = '{}'", limit.replace('\'', "''")))
                .map_err(LoadError::engine("failed to set memory limit"))?;
        }

        Ok(Self {
            conn,
            path: path.map(Path::to_path_buf),
            _lock: None,
        })
    }

    /// Open for a pipeline run, taking the run lock first.
    ///
    /// Fails with [`LoadError::Busy`] before the database is touched when
    /// another run holds the lock.
    pub fn open_for_run(path: Option<&Path>, memory_limit: Option<&str>) -> Result<Self, LoadError> {
        let lock = path.map(RunLock::acquire).transpose()?;
        let mut store = Self::open(path, memory_limit)?;
        store._lock = lock;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, LoadError> {
        Self::open(None, None)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// Create the analytics schema and any missing tables
    pub fn ensure_schema(&self, schema: &Schema) -> Result<(), LoadError> {
        ensure_schema(&self.conn, schema)
    }

    /// Highest surrogate key per entity; zero for empty or missing tables
    pub fn key_offsets(&self) -> Result<KeyOffsets, LoadError> {
        Ok(KeyOffsets {
            customers: max_key(&self.conn, EntityKind::Customer)?,
            fuel_types: max_key(&self.conn, EntityKind::FuelType)?,
            stations: max_key(&self.conn, EntityKind::Station)?,
            products: max_key(&self.conn, EntityKind::Product)?,
            trailers: max_key(&self.conn, EntityKind::Trailer)?,
            orders: max_key(&self.conn, EntityKind::Order)?,
        })
    }

    /// Fuel, station, product and trailer rows already loaded, in key order.
    ///
    /// Money is read back as integer cents. Missing tables give empty
    /// sequences.
    pub fn stored_dimensions(&self) -> Result<StoredDimensions, LoadError> {
        let mut stored = StoredDimensions::default();

        if table_exists(&self.conn, "dim_fuel")? {
            stored.fuel_types = self.read_rows(
                "SELECT fuel_id, fuel_type, CAST(ROUND(price_per_liter * 100) AS BIGINT) \
                 FROM analytics.dim_fuel ORDER BY fuel_id",
                |row| {
                    Ok(FuelType {
                        fuel_id: row.get(0)?,
                        label: row.get(1)?,
                        unit_cost_cents: row.get(2)?,
                    })
                },
            )?;
        }

        if table_exists(&self.conn, "dim_station")? {
            stored.stations = self.read_rows(
                "SELECT station_id, station_name, city FROM analytics.dim_station ORDER BY station_id",
                |row| {
                    Ok(Station {
                        station_id: row.get(0)?,
                        name: row.get(1)?,
                        city: row.get(2)?,
                    })
                },
            )?;
        }

        if table_exists(&self.conn, "dim_product")? {
            stored.products = self.read_rows(
                "SELECT product_id, product_type, CAST(ROUND(price * 100) AS BIGINT), stock \
                 FROM analytics.dim_product ORDER BY product_id",
                |row| {
                    let label: String = row.get(1)?;
                    let category = catalog_item(&label)
                        .map_or(ProductCategory::Convenience, |item| item.category);
                    Ok(Product {
                        product_id: row.get(0)?,
                        label,
                        category,
                        price_cents: row.get(2)?,
                        stock: row.get(3)?,
                    })
                },
            )?;
        }

        if table_exists(&self.conn, "dim_trailer")? {
            stored.trailers = self.read_rows(
                "SELECT trailer_id, registry_number, trailer_status, \
                 CAST(rental_start AS VARCHAR), CAST(rental_end AS VARCHAR) \
                 FROM analytics.dim_trailer ORDER BY trailer_id",
                |row| {
                    let status: String = row.get(2)?;
                    let status = status.parse::<TrailerStatus>().map_err(|e| {
                        duckdb::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e))
                    })?;
                    Ok(Trailer {
                        trailer_id: row.get(0)?,
                        registry_number: row.get(1)?,
                        status,
                        rental_start: read_date(row, 3)?,
                        rental_end: read_date(row, 4)?,
                    })
                },
            )?;
        }

        Ok(stored)
    }

    fn read_rows<T>(
        &self,
        sql: &str,
        map: impl FnMut(&duckdb::Row<'_>) -> duckdb::Result<T>,
    ) -> Result<Vec<T>, LoadError> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(LoadError::engine("failed to read stored dimensions"))?;
        let rows = stmt
            .query_map([], map)
            .map_err(LoadError::engine("failed to read stored dimensions"))?;
        rows.collect::<duckdb::Result<Vec<T>>>()
            .map_err(LoadError::engine("failed to read stored dimensions"))
    }

    /// Row count per contract table; missing tables count as zero
    pub fn row_counts(&self, schema: &Schema) -> Result<BTreeMap<String, i64>, LoadError> {
        let mut counts = BTreeMap::new();
        for table in &schema.tables {
            let count = if table_exists(&self.conn, &table.name)? {
                self.conn
                    .query_row(&format!("SELECT COUNT(*) FROM {}", table.qualified_name()), [], |row| {
                        row.get::<_, i64>(0)
                    })
                    .map_err(LoadError::engine(format!("failed to count {}", table.name)))?
            } else {
                0
            };
            counts.insert(table.name.clone(), count);
        }
        Ok(counts)
    }

    /// Names of the views currently defined in the analytics schema
    pub fn view_names(&self) -> Result<Vec<String>> {
        let result = self.query(&format!(
            "SELECT table_name FROM information_schema.tables \
             WHERE table_schema = '{}' AND table_type = 'VIEW' ORDER BY table_name",
            SCHEMA_NAME
        ))?;
        Ok(result.column_values("table_name").unwrap_or_default())
    }

    /// Execute a query and collect every row
    pub fn query(&self, sql: &str) -> Result<QueryResult> {
        let start = Instant::now();

        let mut stmt = self
            .conn
            .prepare(sql)
            .with_context(|| format!("Failed to prepare query: {}", sql))?;
        let mut rows_result = stmt
            .query([])
            .with_context(|| format!("Failed to execute query: {}", sql))?;

        let mut rows: Vec<Vec<Cell>> = Vec::new();
        while let Some(row) = rows_result.next()? {
            let width = row.as_ref().column_count();
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(match row.get_ref(i) {
                    Ok(value) => to_cell(value),
                    Err(_) => Cell::Text("ERROR".to_string()),
                });
            }
            rows.push(values);
        }
        drop(rows_result);

        let columns: Vec<String> = (0..stmt.column_count())
            .map(|i| {
                stmt.column_name(i)
                    .map(|s| s.to_string())
                    .unwrap_or_else(|_| format!("col{}", i))
            })
            .collect();

        Ok(QueryResult {
            columns,
            rows,
            execution_time_secs: start.elapsed().as_secs_f64(),
        })
    }
}

/// `CREATE SCHEMA` plus `CREATE TABLE IF NOT EXISTS` for every contract table
pub fn ensure_schema(conn: &Connection, schema: &Schema) -> Result<(), LoadError> {
    conn.execute_batch(&format!("CREATE SCHEMA IF NOT EXISTS {}", SCHEMA_NAME))
        .map_err(LoadError::engine("failed to create analytics schema"))?;
    for table in schema.tables_in_order() {
        conn.execute_batch(&table.create_sql())
            .map_err(LoadError::engine(format!("failed to create table {}", table.name)))?;
    }
    Ok(())
}

pub fn table_exists(conn: &Connection, table: &str) -> Result<bool, LoadError> {
    conn.query_row(
        "SELECT COUNT(*) FROM information_schema.tables WHERE table_schema = ? AND table_name = ?",
        [SCHEMA_NAME, table],
        |row| row.get::<_, i64>(0),
    )
    .map(|n| n > 0)
    .map_err(LoadError::engine(format!("failed to look up table {}", table)))
}

/// Highest stored surrogate key for `kind`, or zero
pub fn max_key(conn: &Connection, kind: EntityKind) -> Result<i64, LoadError> {
    let Some((table, column)) = surrogate_key_column(kind) else {
        return Ok(0);
    };
    if !table_exists(conn, table)? {
        return Ok(0);
    }
    conn.query_row(
        &format!(
            "SELECT COALESCE(MAX(\"{}\"), 0) FROM {}.{}",
            column, SCHEMA_NAME, table
        ),
        [],
        |row| row.get::<_, i64>(0),
    )
    .map_err(LoadError::engine(format!("failed to read max key of {}", table)))
}

/// Optional `yyyy-mm-dd` text column as a date
fn read_date(row: &duckdb::Row<'_>, idx: usize) -> duckdb::Result<Option<NaiveDate>> {
    let Some(text) = row.get::<_, Option<String>>(idx)? else {
        return Ok(None);
    };
    NaiveDate::parse_from_str(&text, "%Y-%m-%d")
        .map(Some)
        .map_err(|e| duckdb::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn to_cell(value: ValueRef<'_>) -> Cell {
    match value {
        ValueRef::Null => Cell::Null,
        ValueRef::Boolean(b) => Cell::Bool(b),
        ValueRef::TinyInt(n) => Cell::Int(n.into()),
        ValueRef::SmallInt(n) => Cell::Int(n.into()),
        ValueRef::Int(n) => Cell::Int(n.into()),
        ValueRef::BigInt(n) => Cell::Int(n),
        ValueRef::UTinyInt(n) => Cell::Int(n.into()),
        ValueRef::USmallInt(n) => Cell::Int(n.into()),
        ValueRef::UInt(n) => Cell::Int(n.into()),
        ValueRef::UBigInt(n) => i64::try_from(n).map_or_else(|_| Cell::Number(n.to_string()), Cell::Int),
        ValueRef::HugeInt(n) => i64::try_from(n).map_or_else(|_| Cell::Number(n.to_string()), Cell::Int),
        ValueRef::Float(f) => Cell::Float(f.into()),
        ValueRef::Double(f) => Cell::Float(f),
        ValueRef::Decimal(d) => Cell::Number(d.to_string()),
        ValueRef::Text(s) => Cell::Text(String::from_utf8_lossy(s).into_owned()),
        ValueRef::Blob(b) => Cell::Text(format!("<blob {} bytes>", b.len())),
        ValueRef::Timestamp(unit, ts) => {
            let micros = match unit {
                TimeUnit::Second => ts.saturating_mul(1_000_000),
                TimeUnit::Millisecond => ts.saturating_mul(1_000),
                TimeUnit::Microsecond => ts,
                TimeUnit::Nanosecond => ts / 1_000,
            };
            match chrono::DateTime::from_timestamp_micros(micros) {
                Some(dt) => Cell::Text(dt.format("%Y-%m-%d %H:%M:%S").to_string()),
                None => Cell::Int(ts),
            }
        }
        ValueRef::Date32(days) => {
            // Days since 1970-01-01; 719163 is that date's day number from CE
            match chrono::NaiveDate::from_num_days_from_ce_opt(719_163 + days) {
                Some(date) => Cell::Text(date.format("%Y-%m-%d").to_string()),
                None => Cell::Int(days.into()),
            }
        }
        other => Cell::Text(format!("{:?}", other)),
    }
}
