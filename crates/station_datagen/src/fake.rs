//! Fake data helpers.
//!
//! Names and cities come from the `fake` crate; everything is drawn from the
//! caller's RNG so output is deterministic for a given seed.

use fake::faker::address::en::CityName;
use fake::faker::name::en::{FirstName, LastName};
use fake::Fake;
use rand::Rng;

use crate::model::{CustomerStatus, OrderStatus, ProductCategory, TrailerStatus};

/// A fuel grade the station sells
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FuelGrade {
    pub label: &'static str,
    /// Price band per litre, in cents (inclusive)
    pub min_cents: i64,
    pub max_cents: i64,
    /// Relative share of purchases
    pub popularity: u32,
}

/// Fuel grades in catalog order; labels are unique.
pub const FUEL_CATALOG: &[FuelGrade] = &[
    FuelGrade {
        label: "PB95",
        min_cents: 645,
        max_cents: 685,
        popularity: 40,
    },
    FuelGrade {
        label: "diesel",
        min_cents: 645,
        max_cents: 705,
        popularity: 30,
    },
    FuelGrade {
        label: "PB98",
        min_cents: 685,
        max_cents: 745,
        popularity: 15,
    },
    FuelGrade {
        label: "LPG",
        min_cents: 285,
        max_cents: 325,
        popularity: 10,
    },
    FuelGrade {
        label: "diesel+",
        min_cents: 705,
        max_cents: 765,
        popularity: 3,
    },
    FuelGrade {
        label: "E85",
        min_cents: 520,
        max_cents: 580,
        popularity: 2,
    },
];

/// Look up a grade by label
pub fn fuel_grade(label: &str) -> Option<&'static FuelGrade> {
    FUEL_CATALOG.iter().find(|g| g.label == label)
}

/// A shop item the station stocks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogItem {
    pub label: &'static str,
    pub category: ProductCategory,
    /// Price band in cents (inclusive)
    pub min_cents: i64,
    pub max_cents: i64,
}

const fn maintenance(label: &'static str, min_cents: i64, max_cents: i64) -> CatalogItem {
    CatalogItem {
        label,
        category: ProductCategory::Maintenance,
        min_cents,
        max_cents,
    }
}

const fn convenience(label: &'static str) -> CatalogItem {
    CatalogItem {
        label,
        category: ProductCategory::Convenience,
        min_cents: 100,
        max_cents: 2000,
    }
}

/// Shop catalog in key order; labels are unique.
pub const PRODUCT_CATALOG: &[CatalogItem] = &[
    maintenance("engine oil", 3500, 15000),
    maintenance("windshield fluid", 800, 2500),
    maintenance("car bulb", 1500, 5000),
    convenience("polishing paste"),
    convenience("chewing gum"),
    convenience("instant coffee"),
    convenience("energy drink"),
    convenience("mineral water"),
    convenience("chips"),
    convenience("chocolate"),
    convenience("gift set"),
    convenience("lighter"),
    convenience("ice scraper"),
    convenience("washing sponge"),
];

pub fn catalog_item(label: &str) -> Option<&'static CatalogItem> {
    PRODUCT_CATALOG.iter().find(|i| i.label == label)
}

const STATION_BRANDS: &[&str] = &[
    "Northstar", "Bluefin", "Redwood", "Milestone", "Crossroads", "Harbor", "Summit", "Prairie",
];

const CUSTOMER_STATUSES: &[(CustomerStatus, u32)] = &[
    (CustomerStatus::Active, 70),
    (CustomerStatus::Inactive, 20),
    (CustomerStatus::Blocked, 10),
];

const ORDER_STATUSES: &[(OrderStatus, u32)] = &[
    (OrderStatus::Pending, 10),
    (OrderStatus::Completed, 80),
    (OrderStatus::Cancelled, 10),
];

const TRAILER_STATUSES: &[(TrailerStatus, u32)] = &[
    (TrailerStatus::Available, 50),
    (TrailerStatus::Rented, 30),
    (TrailerStatus::InService, 10),
    (TrailerStatus::Reserved, 10),
];

/// Relative traffic per hour of day; the station is quiet overnight.
pub const HOURLY_TRAFFIC: [u32; 24] = [
    1, 1, 1, 1, 1, 2, 5, 9, 10, 8, 7, 7, 8, 8, 7, 8, 10, 11, 9, 7, 5, 4, 2, 1,
];

/// Fake data generator borrowing the run RNG
pub struct FakeData<'r, R: Rng + ?Sized> {
    rng: &'r mut R,
}

impl<'r, R: Rng + ?Sized> FakeData<'r, R> {
    pub fn new(rng: &'r mut R) -> Self {
        Self { rng }
    }

    pub fn first_name(&mut self) -> String {
        FirstName().fake_with_rng(&mut *self.rng)
    }

    pub fn last_name(&mut self) -> String {
        LastName().fake_with_rng(&mut *self.rng)
    }

    pub fn city(&mut self) -> String {
        CityName().fake_with_rng(&mut *self.rng)
    }

    pub fn station_name(&mut self, city: &str) -> String {
        let brand = self.pick(STATION_BRANDS);
        format!("{} {}", brand, city)
    }

    pub fn customer_status(&mut self) -> CustomerStatus {
        self.weighted(CUSTOMER_STATUSES)
    }

    pub fn order_status(&mut self) -> OrderStatus {
        self.weighted(ORDER_STATUSES)
    }

    /// Litres per purchase
    pub fn quantity_liters(&mut self) -> i64 {
        self.rng.random_range(5..=80)
    }

    pub fn price_cents(&mut self, grade: &FuelGrade) -> i64 {
        self.rng.random_range(grade.min_cents..=grade.max_cents)
    }

    pub fn product_price_cents(&mut self, item: &CatalogItem) -> i64 {
        self.rng.random_range(item.min_cents..=item.max_cents)
    }

    /// Shelf stock for a product
    pub fn stock(&mut self) -> i64 {
        self.rng.random_range(10..=150)
    }

    pub fn trailer_status(&mut self) -> TrailerStatus {
        self.weighted(TRAILER_STATUSES)
    }

    /// Registration like `47 KRT 2831`
    pub fn registry_number(&mut self) -> String {
        let district: u32 = self.rng.random_range(10..=99);
        let letters: String = (0..3)
            .map(|_| char::from(self.rng.random_range(b'A'..=b'Z')))
            .collect();
        let serial: u32 = self.rng.random_range(1000..=9999);
        format!("{} {} {}", district, letters, serial)
    }

    pub fn int_range(&mut self, min: i64, max: i64) -> i64 {
        self.rng.random_range(min..=max)
    }

    /// Pick a random element from a non-empty slice
    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> &'a T {
        &items[self.rng.random_range(0..items.len())]
    }

    /// Pick from a small fixed table of `(item, weight)` pairs
    fn weighted<T: Copy>(&mut self, table: &[(T, u32)]) -> T {
        let total: u32 = table.iter().map(|(_, w)| w).sum();
        let mut roll = self.rng.random_range(0..total);
        for (item, weight) in table {
            if roll < *weight {
                return *item;
            }
            roll -= weight;
        }
        table[table.len() - 1].0
    }
}
