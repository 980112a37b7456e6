//! Entity records produced by the generator.
//!
//! Dimension records (customers, fuel types, stations, products, trailers,
//! calendar days) are referenced by fact records (orders) through surrogate
//! keys. Money is held as integer cents so `total = quantity * unit cost` is
//! exact.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, NaiveDateTime, Weekday};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::DateWindow;

/// Kinds of entities a dataset holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Customer,
    FuelType,
    Station,
    Product,
    Trailer,
    CalendarDay,
    Order,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Customer => "customer",
            EntityKind::FuelType => "fuel_type",
            EntityKind::Station => "station",
            EntityKind::Product => "product",
            EntityKind::Trailer => "trailer",
            EntityKind::CalendarDay => "calendar_day",
            EntityKind::Order => "order",
        }
    }

    /// Dimension kinds are loaded before any fact kind
    pub fn is_dimension(&self) -> bool {
        !matches!(self, EntityKind::Order)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CustomerStatus {
    Active,
    Inactive,
    Blocked,
}

impl CustomerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CustomerStatus::Active => "active",
            CustomerStatus::Inactive => "inactive",
            CustomerStatus::Blocked => "blocked",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub customer_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub status: CustomerStatus,
    pub join_date: NaiveDate,
}

impl Customer {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuelType {
    pub fuel_id: i64,
    pub label: String,
    /// Price per litre in cents
    pub unit_cost_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Station {
    pub station_id: i64,
    pub name: String,
    pub city: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductCategory {
    Maintenance,
    Convenience,
}

impl ProductCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductCategory::Maintenance => "Car Maintenance",
            ProductCategory::Convenience => "Convenience Items",
        }
    }
}

/// A shop item that can be added to a fuel purchase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub product_id: i64,
    pub label: String,
    pub category: ProductCategory,
    pub price_cents: i64,
    /// Units on the shelf
    pub stock: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrailerStatus {
    Available,
    Rented,
    InService,
    Reserved,
}

impl TrailerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrailerStatus::Available => "available",
            TrailerStatus::Rented => "rented",
            TrailerStatus::InService => "in_service",
            TrailerStatus::Reserved => "reserved",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown trailer status '{0}'")]
pub struct UnknownTrailerStatus(pub String);

impl FromStr for TrailerStatus {
    type Err = UnknownTrailerStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(TrailerStatus::Available),
            "rented" => Ok(TrailerStatus::Rented),
            "in_service" => Ok(TrailerStatus::InService),
            "reserved" => Ok(TrailerStatus::Reserved),
            other => Err(UnknownTrailerStatus(other.to_string())),
        }
    }
}

/// A rental trailer.
///
/// Rented trailers carry a rental period inside the window; reserved ones a
/// period starting after it. Other statuses have no period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trailer {
    pub trailer_id: i64,
    pub registry_number: String,
    pub status: TrailerStatus,
    pub rental_start: Option<NaiveDate>,
    pub rental_end: Option<NaiveDate>,
}

impl Trailer {
    pub fn is_available(&self) -> bool {
        self.status == TrailerStatus::Available
    }
}

/// One day of the generation window (the date dimension).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarDay {
    pub date: NaiveDate,
}

impl CalendarDay {
    pub fn new(date: NaiveDate) -> Self {
        Self { date }
    }

    /// Natural key in `yyyymmdd` form
    pub fn date_key(&self) -> i32 {
        date_key(self.date)
    }

    pub fn quarter(&self) -> u32 {
        (self.date.month() - 1) / 3 + 1
    }

    /// Day of week with Monday = 0
    pub fn day_of_week(&self) -> u32 {
        self.date.weekday().num_days_from_monday()
    }

    pub fn day_name(&self) -> String {
        self.date.format("%A").to_string()
    }

    pub fn month_name(&self) -> String {
        self.date.format("%B").to_string()
    }

    pub fn is_weekend(&self) -> bool {
        matches!(self.date.weekday(), Weekday::Sat | Weekday::Sun)
    }
}

/// `yyyymmdd` key for a date
pub fn date_key(date: NaiveDate) -> i32 {
    date.year() * 10_000 + date.month() as i32 * 100 + date.day() as i32
}

/// A fuel purchase (the fact record).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: i64,
    pub customer_id: i64,
    pub fuel_id: i64,
    pub station_id: i64,
    /// Shop item bought with the fuel, if any
    pub product_id: Option<i64>,
    /// Price of that item at generation time
    pub product_cost_cents: Option<i64>,
    pub trailer_id: Option<i64>,
    pub ordered_at: NaiveDateTime,
    pub quantity_liters: i64,
    /// Unit cost of the referenced fuel at generation time
    pub unit_cost_cents: i64,
    /// Fuel cost only: quantity times unit cost
    pub total_cost_cents: i64,
    pub status: OrderStatus,
}

impl Order {
    pub fn date_key(&self) -> i32 {
        date_key(self.ordered_at.date())
    }
}

/// Render integer cents as a fixed two-decimal string (`645` -> `"6.45"`)
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

/// Everything one pipeline run generates, in generation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    /// Effective seed (drawn at random when none was configured)
    pub seed: u64,
    pub window: DateWindow,
    pub customers: Vec<Customer>,
    pub fuel_types: Vec<FuelType>,
    pub stations: Vec<Station>,
    pub products: Vec<Product>,
    pub trailers: Vec<Trailer>,
    pub calendar: Vec<CalendarDay>,
    pub orders: Vec<Order>,
}

impl Dataset {
    /// Record count per entity kind
    pub fn counts(&self) -> BTreeMap<EntityKind, usize> {
        BTreeMap::from([
            (EntityKind::Customer, self.customers.len()),
            (EntityKind::FuelType, self.fuel_types.len()),
            (EntityKind::Station, self.stations.len()),
            (EntityKind::Product, self.products.len()),
            (EntityKind::Trailer, self.trailers.len()),
            (EntityKind::CalendarDay, self.calendar.len()),
            (EntityKind::Order, self.orders.len()),
        ])
    }

    /// Lowest and highest surrogate key generated for a kind.
    ///
    /// Calendar days use natural keys and return `None`, as does any empty
    /// sequence.
    pub fn key_range(&self, kind: EntityKind) -> Option<(i64, i64)> {
        let keys: Vec<i64> = match kind {
            EntityKind::Customer => self.customers.iter().map(|c| c.customer_id).collect(),
            EntityKind::FuelType => self.fuel_types.iter().map(|f| f.fuel_id).collect(),
            EntityKind::Station => self.stations.iter().map(|s| s.station_id).collect(),
            EntityKind::Product => self.products.iter().map(|p| p.product_id).collect(),
            EntityKind::Trailer => self.trailers.iter().map(|t| t.trailer_id).collect(),
            EntityKind::Order => self.orders.iter().map(|o| o.order_id).collect(),
            EntityKind::CalendarDay => return None,
        };
        let min = keys.iter().copied().min()?;
        let max = keys.iter().copied().max()?;
        Some((min, max))
    }

    pub fn fuel_type(&self, fuel_id: i64) -> Option<&FuelType> {
        self.fuel_types.iter().find(|f| f.fuel_id == fuel_id)
    }

    pub fn product(&self, product_id: i64) -> Option<&Product> {
        self.products.iter().find(|p| p.product_id == product_id)
    }

    /// Canonical serialized form used for reproducibility checks
    pub fn to_json_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// SHA-256 over the canonical JSON, hex encoded
    pub fn fingerprint(&self) -> serde_json::Result<String> {
        let bytes = self.to_json_bytes()?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }
}

/// Catalog and fleet rows already in the store.
///
/// An appended batch links its orders against these rows and only generates
/// the fuel grades and products they lack, plus enough stations and trailers
/// to reach the configured counts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredDimensions {
    pub fuel_types: Vec<FuelType>,
    pub stations: Vec<Station>,
    pub products: Vec<Product>,
    pub trailers: Vec<Trailer>,
}

impl StoredDimensions {
    pub fn is_empty(&self) -> bool {
        self.fuel_types.is_empty()
            && self.stations.is_empty()
            && self.products.is_empty()
            && self.trailers.is_empty()
    }
}
