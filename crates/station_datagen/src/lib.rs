//! Synthetic dataset generator for the gas station analytics pipeline.
//!
//! Produces deterministic, FK-consistent customers, fuel types, stations,
//! shop products, rental trailers, calendar days and orders. Loading is not
//! this crate's concern; it only builds the in-memory [`Dataset`], optionally
//! on top of [`StoredDimensions`] read back from a store.
//!
//! # Example
//!
//! ```rust
//! use chrono::NaiveDate;
//! use station_datagen::{DateWindow, EntityCounts, GenerationConfig, Generator, KeyOffsets};
//!
//! let window = DateWindow::new(
//!     NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
//!     NaiveDate::from_ymd_opt(2024, 6, 30).unwrap(),
//! )
//! .unwrap();
//! let config = GenerationConfig::new(EntityCounts::default(), window, Some(42));
//!
//! let generator = Generator::new(config).unwrap();
//! let dataset = generator.generate(42, KeyOffsets::default()).unwrap();
//! assert!(dataset.orders.iter().all(|o| window.contains(o.ordered_at)));
//! ```

pub mod config;
pub mod fake;
pub mod generator;
pub mod linker;
pub mod model;

pub use config::{ConfigError, DateWindow, EntityCounts, GenerationConfig, KeyOffsets, SkewPolicy};
pub use generator::{GenerateError, Generator, UnlinkedDataset};
pub use linker::{EmptyDimensionError, Linker, OrderDraft};
pub use model::{
    format_cents, CalendarDay, Customer, CustomerStatus, Dataset, EntityKind, FuelType, Order,
    OrderStatus, Product, ProductCategory, Station, StoredDimensions, Trailer, TrailerStatus,
    UnknownTrailerStatus,
};
