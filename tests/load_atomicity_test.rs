//! A load either commits every table or leaves the store exactly as it was.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::NaiveDate;
use station_datagen::{DateWindow, EntityCounts, GenerationConfig, Generator, KeyOffsets};
use station_pipeline::schema::Schema;
use station_pipeline::{LoadCoordinator, LoadError, RunMode, Store};
use tempfile::TempDir;

fn generator() -> Generator {
    let config = GenerationConfig::new(
        EntityCounts {
            customers: 20,
            fuel_types: 3,
            stations: 2,
            products: 5,
            trailers: 3,
            orders: 60,
        },
        DateWindow {
            start: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 5, 31).unwrap(),
        },
        Some(11),
    );
    Generator::new(config).unwrap()
}

fn counts(db: &Path) -> BTreeMap<String, i64> {
    Store::open(Some(db), None)
        .unwrap()
        .row_counts(&Schema::analytics())
        .unwrap()
}

#[test]
fn test_duplicate_key_on_nth_row_leaves_no_rows() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("station.duckdb");

    let mut data = generator().generate(11, KeyOffsets::default()).unwrap();
    data.orders[7].order_id = data.orders[3].order_id;

    let mut store = Store::open(Some(&db), None).unwrap();
    let err = LoadCoordinator::new(&mut store)
        .load(&data, RunMode::Replace)
        .unwrap_err();
    assert!(
        matches!(err, LoadError::Insert { ref table, row: 8, .. } if table == "fct_orders"),
        "unexpected error: {err}"
    );
    assert!(err.is_constraint());
    drop(store);

    // Dimensions were written before the failing fact row, yet nothing stays
    assert!(counts(&db).values().all(|&n| n == 0));
}

#[test]
fn test_failed_append_keeps_committed_data() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("station.duckdb");
    let mut store = Store::open(Some(&db), None).unwrap();

    let first = generator().generate(11, KeyOffsets::default()).unwrap();
    LoadCoordinator::new(&mut store)
        .load(&first, RunMode::Replace)
        .unwrap();
    let before = store.row_counts(&Schema::analytics()).unwrap();

    let mut second = generator().generate(12, store.key_offsets().unwrap()).unwrap();
    let last = second.orders.len() - 1;
    second.orders[last].order_id = second.orders[0].order_id;

    let err = LoadCoordinator::new(&mut store)
        .load(&second, RunMode::Append)
        .unwrap_err();
    assert!(matches!(err, LoadError::Insert { row: 60, .. }));
    assert_eq!(store.row_counts(&Schema::analytics()).unwrap(), before);
    drop(store);

    assert_eq!(counts(&db), before);
}

#[test]
fn test_append_without_offsets_is_refused() {
    let mut store = Store::open_in_memory().unwrap();
    let data = generator().generate(11, KeyOffsets::default()).unwrap();
    LoadCoordinator::new(&mut store)
        .load(&data, RunMode::Replace)
        .unwrap();

    let again = generator().generate(12, KeyOffsets::default()).unwrap();
    let err = LoadCoordinator::new(&mut store)
        .load(&again, RunMode::Append)
        .unwrap_err();
    assert!(matches!(err, LoadError::KeyOverlap { first_key: 1, existing_max: 20, .. }));
    assert_eq!(store.row_counts(&Schema::analytics()).unwrap()["fct_orders"], 60);
}

#[test]
fn test_replace_discards_previous_batches() {
    let mut store = Store::open_in_memory().unwrap();
    let first = generator().generate(11, KeyOffsets::default()).unwrap();
    LoadCoordinator::new(&mut store)
        .load(&first, RunMode::Replace)
        .unwrap();
    let offsets = store.key_offsets().unwrap();
    LoadCoordinator::new(&mut store)
        .load(&generator().generate(12, offsets).unwrap(), RunMode::Append)
        .unwrap();
    assert_eq!(store.row_counts(&Schema::analytics()).unwrap()["dim_customer"], 40);

    LoadCoordinator::new(&mut store)
        .load(&first, RunMode::Replace)
        .unwrap();
    let counts = store.row_counts(&Schema::analytics()).unwrap();
    assert_eq!(counts["dim_customer"], 20);
    assert_eq!(counts["fct_orders"], 60);
    assert_eq!(store.key_offsets().unwrap().customers, 20);
}
