//! Row encoding and statement execution for one table.
//!
//! Each table's rows are bound positionally in the column order of the
//! contract. Money is bound as decimal text and cast by the engine so the
//! stored value is exactly the generated cents. Absent optional references
//! are bound as NULL.

use duckdb::types::Value;
use duckdb::{params_from_iter, Connection};
use indicatif::ProgressBar;
use station_datagen::{
    format_cents, CalendarDay, Customer, CustomerStatus, Dataset, FuelType, Order, Product, Station,
    Trailer,
};

use super::CancelFlag;
use crate::error::LoadError;
use crate::schema::Table;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Encoded rows for a single table
#[derive(Debug, Clone, PartialEq)]
pub struct TableBatch {
    pub table: &'static str,
    pub rows: Vec<Vec<Value>>,
}

impl TableBatch {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Encode every entity sequence of the dataset, one batch per table
pub fn encode_dataset(dataset: &Dataset) -> Vec<TableBatch> {
    vec![
        TableBatch {
            table: "dim_customer",
            rows: dataset.customers.iter().map(customer_row).collect(),
        },
        TableBatch {
            table: "dim_fuel",
            rows: dataset.fuel_types.iter().map(fuel_row).collect(),
        },
        TableBatch {
            table: "dim_station",
            rows: dataset.stations.iter().map(station_row).collect(),
        },
        TableBatch {
            table: "dim_product",
            rows: dataset.products.iter().map(product_row).collect(),
        },
        TableBatch {
            table: "dim_trailer",
            rows: dataset.trailers.iter().map(trailer_row).collect(),
        },
        TableBatch {
            table: "dim_date",
            rows: dataset.calendar.iter().map(date_row).collect(),
        },
        TableBatch {
            table: "fct_orders",
            rows: dataset.orders.iter().map(order_row).collect(),
        },
    ]
}

fn customer_row(c: &Customer) -> Vec<Value> {
    vec![
        Value::BigInt(c.customer_id),
        Value::Text(c.first_name.clone()),
        Value::Text(c.last_name.clone()),
        Value::Text(c.full_name()),
        Value::Text(c.status.as_str().to_string()),
        Value::Boolean(c.status == CustomerStatus::Active),
        Value::Text(c.join_date.format(DATE_FORMAT).to_string()),
    ]
}

fn fuel_row(f: &FuelType) -> Vec<Value> {
    vec![
        Value::BigInt(f.fuel_id),
        Value::Text(f.label.clone()),
        Value::Text(format_cents(f.unit_cost_cents)),
    ]
}

fn station_row(s: &Station) -> Vec<Value> {
    vec![
        Value::BigInt(s.station_id),
        Value::Text(s.name.clone()),
        Value::Text(s.city.clone()),
    ]
}

fn product_row(p: &Product) -> Vec<Value> {
    vec![
        Value::BigInt(p.product_id),
        Value::Text(p.label.clone()),
        Value::Text(p.category.as_str().to_string()),
        Value::Text(format_cents(p.price_cents)),
        Value::Int(p.stock as i32),
    ]
}

fn trailer_row(t: &Trailer) -> Vec<Value> {
    vec![
        Value::BigInt(t.trailer_id),
        Value::Text(t.registry_number.clone()),
        Value::Text(t.status.as_str().to_string()),
        Value::Boolean(t.is_available()),
        optional_date(t.rental_start),
        optional_date(t.rental_end),
    ]
}

fn optional_date(date: Option<chrono::NaiveDate>) -> Value {
    date.map_or(Value::Null, |d| Value::Text(d.format(DATE_FORMAT).to_string()))
}

fn optional_key(key: Option<i64>) -> Value {
    key.map_or(Value::Null, Value::BigInt)
}

fn date_row(d: &CalendarDay) -> Vec<Value> {
    use chrono::Datelike;

    vec![
        Value::Int(d.date_key()),
        Value::Text(d.date.format(DATE_FORMAT).to_string()),
        Value::Int(d.date.day() as i32),
        Value::Int(d.date.month() as i32),
        Value::Int(d.date.year()),
        Value::Int(d.quarter() as i32),
        Value::Int(d.day_of_week() as i32),
        Value::Text(d.day_name()),
        Value::Text(d.month_name()),
        Value::Boolean(d.is_weekend()),
    ]
}

fn order_row(o: &Order) -> Vec<Value> {
    vec![
        Value::BigInt(o.order_id),
        Value::Int(o.date_key()),
        Value::BigInt(o.customer_id),
        Value::BigInt(o.fuel_id),
        Value::BigInt(o.station_id),
        optional_key(o.product_id),
        optional_key(o.trailer_id),
        Value::Text(o.status.as_str().to_string()),
        Value::Text(o.ordered_at.format(TIMESTAMP_FORMAT).to_string()),
        Value::Int(o.quantity_liters as i32),
        Value::Text(format_cents(o.unit_cost_cents)),
        Value::Text(format_cents(o.total_cost_cents)),
        o.product_cost_cents
            .map_or(Value::Null, |cents| Value::Text(format_cents(cents))),
    ]
}

/// Insert one batch row by row.
///
/// Checks `cancel` before every row. Returns the number of rows actually
/// inserted, which is lower than the batch size when shared rows already
/// existed.
pub fn flush_batch(
    conn: &Connection,
    table: &Table,
    batch: &TableBatch,
    cancel: &CancelFlag,
    progress: Option<&ProgressBar>,
) -> Result<usize, LoadError> {
    let sql = table.insert_sql();
    let mut stmt = conn
        .prepare(&sql)
        .map_err(LoadError::engine(format!("failed to prepare insert into {}", table.name)))?;

    let mut inserted = 0;
    for (idx, row) in batch.rows.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(LoadError::Cancelled);
        }
        inserted += stmt
            .execute(params_from_iter(row.iter().cloned()))
            .map_err(|source| LoadError::Insert {
                table: table.name.clone(),
                row: idx + 1,
                source,
            })?;
        if let Some(pb) = progress {
            pb.inc(1);
        }
    }

    Ok(inserted)
}
