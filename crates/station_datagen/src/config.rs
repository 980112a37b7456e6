//! Generation parameters and their validation.
//!
//! Everything here is checked before any record is generated, so an invalid
//! configuration never reaches the store.

use chrono::{Datelike, Days, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fake::{FUEL_CATALOG, PRODUCT_CATALOG};
use crate::model::EntityKind;

/// Invalid generation parameters
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{entity} count must be a positive integer, got {count}")]
    NonPositiveCount { entity: EntityKind, count: usize },

    #[error("date window is inverted: start {start} is after end {end}")]
    InvertedWindow { start: NaiveDate, end: NaiveDate },

    #[error("requested {requested} fuel types but only {available} unique labels exist")]
    TooManyFuelTypes { requested: usize, available: usize },

    #[error("requested {requested} products but the catalog holds {available}")]
    TooManyProducts { requested: usize, available: usize },

    #[error("skew parameter {name} must be within (0, 1], got {value}")]
    InvalidSkew { name: &'static str, value: f64 },
}

/// Record counts per entity type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityCounts {
    pub customers: usize,
    pub fuel_types: usize,
    pub stations: usize,
    pub products: usize,
    pub trailers: usize,
    pub orders: usize,
}

impl Default for EntityCounts {
    fn default() -> Self {
        Self {
            customers: 150,
            fuel_types: 4,
            stations: 3,
            products: PRODUCT_CATALOG.len(),
            trailers: 16,
            orders: 1200,
        }
    }
}

/// Inclusive range of calendar days orders may fall on.
///
/// The last valid instant is 23:59:59 on `end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ConfigError> {
        let window = Self { start, end };
        window.validate()?;
        Ok(window)
    }

    /// The full calendar month before `today`
    pub fn previous_month(today: NaiveDate) -> Self {
        let first_of_this = today.with_day(1).unwrap_or(today);
        let end = first_of_this.pred_opt().unwrap_or(first_of_this);
        let start = end.with_day(1).unwrap_or(end);
        Self { start, end }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.start > self.end {
            return Err(ConfigError::InvertedWindow {
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }

    pub fn first_instant(&self) -> NaiveDateTime {
        self.start.and_time(NaiveTime::MIN)
    }

    pub fn last_instant(&self) -> NaiveDateTime {
        self.end.and_time(NaiveTime::MIN) + TimeDelta::seconds(86_399)
    }

    pub fn contains(&self, instant: NaiveDateTime) -> bool {
        instant >= self.first_instant() && instant <= self.last_instant()
    }

    /// Number of days in the window (inclusive)
    pub fn len_days(&self) -> usize {
        ((self.end - self.start).num_days() + 1).max(0) as usize
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }

    /// `start` moved back by `days`, saturating at the earliest date
    pub fn days_before_start(&self, days: u64) -> NaiveDate {
        self.start
            .checked_sub_days(Days::new(days))
            .unwrap_or(NaiveDate::MIN)
    }
}

/// Repeat-customer skew: `top_customer_fraction` of customers place
/// roughly `top_customer_share` of all orders.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkewPolicy {
    pub top_customer_fraction: f64,
    pub top_customer_share: f64,
}

impl Default for SkewPolicy {
    fn default() -> Self {
        Self {
            top_customer_fraction: 0.2,
            top_customer_share: 0.7,
        }
    }
}

impl SkewPolicy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("top_customer_fraction", self.top_customer_fraction),
            ("top_customer_share", self.top_customer_share),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ConfigError::InvalidSkew { name, value });
            }
        }
        Ok(())
    }
}

/// Highest surrogate key already used per entity.
///
/// New keys start at `offset + 1`. Replace runs use all zeros; append runs
/// read the offsets from the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyOffsets {
    pub customers: i64,
    pub fuel_types: i64,
    pub stations: i64,
    pub products: i64,
    pub trailers: i64,
    pub orders: i64,
}

/// Full input to the generator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub counts: EntityCounts,
    pub window: DateWindow,
    /// `None` draws a fresh seed per run
    pub seed: Option<u64>,
    pub skew: SkewPolicy,
}

impl GenerationConfig {
    pub fn new(counts: EntityCounts, window: DateWindow, seed: Option<u64>) -> Self {
        Self {
            counts,
            window,
            seed,
            skew: SkewPolicy::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (entity, count) in [
            (EntityKind::Customer, self.counts.customers),
            (EntityKind::FuelType, self.counts.fuel_types),
            (EntityKind::Station, self.counts.stations),
            (EntityKind::Product, self.counts.products),
            (EntityKind::Trailer, self.counts.trailers),
            (EntityKind::Order, self.counts.orders),
        ] {
            if count == 0 {
                return Err(ConfigError::NonPositiveCount { entity, count });
            }
        }

        if self.counts.fuel_types > FUEL_CATALOG.len() {
            return Err(ConfigError::TooManyFuelTypes {
                requested: self.counts.fuel_types,
                available: FUEL_CATALOG.len(),
            });
        }

        if self.counts.products > PRODUCT_CATALOG.len() {
            return Err(ConfigError::TooManyProducts {
                requested: self.counts.products,
                available: PRODUCT_CATALOG.len(),
            });
        }

        self.window.validate()?;
        self.skew.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn config() -> GenerationConfig {
        GenerationConfig::new(
            EntityCounts::default(),
            DateWindow {
                start: date(2024, 1, 1),
                end: date(2024, 6, 30),
            },
            Some(42),
        )
    }

    #[test]
    fn test_zero_customers_rejected() {
        let mut cfg = config();
        cfg.counts.customers = 0;
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::NonPositiveCount {
                entity: EntityKind::Customer,
                count: 0
            })
        );
    }

    #[test]
    fn test_inverted_window_rejected() {
        let err = DateWindow::new(date(2024, 2, 1), date(2024, 1, 31)).unwrap_err();
        assert!(matches!(err, ConfigError::InvertedWindow { .. }));
    }

    #[test]
    fn test_single_day_window_is_valid() {
        let window = DateWindow::new(date(2024, 3, 3), date(2024, 3, 3)).unwrap();
        assert_eq!(window.len_days(), 1);
        assert_eq!(window.days().count(), 1);
        assert!(window.contains(date(2024, 3, 3).and_hms_opt(23, 59, 59).unwrap()));
        assert!(!window.contains(date(2024, 3, 4).and_hms_opt(0, 0, 0).unwrap()));
    }

    #[test]
    fn test_too_many_fuel_types_rejected() {
        let mut cfg = config();
        cfg.counts.fuel_types = FUEL_CATALOG.len() + 1;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::TooManyFuelTypes { .. })
        ));
    }

    #[test]
    fn test_product_and_trailer_counts_checked() {
        let mut cfg = config();
        cfg.counts.trailers = 0;
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::NonPositiveCount {
                entity: EntityKind::Trailer,
                count: 0
            })
        );

        let mut cfg = config();
        cfg.counts.products = PRODUCT_CATALOG.len() + 1;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::TooManyProducts { .. })
        ));
    }

    #[test]
    fn test_skew_bounds() {
        let mut cfg = config();
        cfg.skew.top_customer_share = 0.0;
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidSkew { .. })));

        cfg.skew.top_customer_share = 1.0;
        cfg.skew.top_customer_fraction = 1.5;
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidSkew { .. })));
    }

    #[test]
    fn test_previous_month_window() {
        let window = DateWindow::previous_month(date(2024, 3, 15));
        assert_eq!(window.start, date(2024, 2, 1));
        assert_eq!(window.end, date(2024, 2, 29));

        let window = DateWindow::previous_month(date(2024, 1, 1));
        assert_eq!(window.start, date(2023, 12, 1));
        assert_eq!(window.end, date(2023, 12, 31));
    }
}
