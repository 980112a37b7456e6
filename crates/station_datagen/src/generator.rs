//! Entity generator: builds dimension pools, order drafts and hands the
//! drafts to the linker.
//!
//! All randomness comes from one explicitly passed RNG, consumed in a fixed
//! order (customers, fuel types, stations, products, trailers, order drafts,
//! linking), so a seed and the stored dimensions fully determine the dataset.

use std::f64::consts::PI;

use chrono::{Datelike, Days, NaiveDate, NaiveTime, TimeDelta};
use rand::distr::weighted::{Error as WeightError, WeightedIndex};
use rand::distr::Distribution;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use thiserror::Error;
use tracing::debug;

use crate::config::{ConfigError, DateWindow, GenerationConfig, KeyOffsets, SkewPolicy};
use crate::fake::{FakeData, FUEL_CATALOG, HOURLY_TRAFFIC, PRODUCT_CATALOG};
use crate::linker::{EmptyDimensionError, Linker, OrderDraft, WeightedPool};
use crate::model::{
    CalendarDay, Customer, Dataset, EntityKind, FuelType, Product, Station, StoredDimensions,
    Trailer, TrailerStatus,
};

/// Customers joined at most this many days before the window opens
const MAX_TENURE_DAYS: i64 = 730;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GenerateError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    EmptyDimension(#[from] EmptyDimensionError),

    #[error("invalid hour-of-day traffic weights: {0}")]
    HourlyTraffic(#[source] WeightError),
}

/// Hands out sequential surrogate keys above an offset
#[derive(Debug, Clone, Copy)]
struct KeyAllocator {
    next: i64,
}

impl KeyAllocator {
    fn after(offset: i64) -> Self {
        Self { next: offset + 1 }
    }

    fn next_key(&mut self) -> i64 {
        let key = self.next;
        self.next += 1;
        key
    }
}

/// Relative order density for a day: a yearly season peaking around
/// midsummer, and busier weekends.
pub fn day_weight(date: NaiveDate) -> f64 {
    let season = 1.0 + 0.25 * (2.0 * PI * (date.ordinal() as f64 - 80.0) / 365.25).sin();
    let weekend = if date.weekday().num_days_from_monday() >= 5 {
        1.25
    } else {
        1.0
    };
    season * weekend
}

/// Generated dimensions plus order drafts awaiting the linker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnlinkedDataset {
    pub seed: u64,
    pub window: DateWindow,
    pub customers: Vec<Customer>,
    pub fuel_types: Vec<FuelType>,
    pub stations: Vec<Station>,
    pub products: Vec<Product>,
    pub trailers: Vec<Trailer>,
    pub calendar: Vec<CalendarDay>,
    pub drafts: Vec<OrderDraft>,
    /// Stored rows the drafts may reference; they are not part of the output
    pub reused: StoredDimensions,
}

impl UnlinkedDataset {
    /// Resolve every draft's foreign keys and produce the final dataset
    pub fn link<R: Rng + ?Sized>(
        self,
        skew: &SkewPolicy,
        rng: &mut R,
    ) -> Result<Dataset, EmptyDimensionError> {
        let fuel_types = chained(&self.reused.fuel_types, &self.fuel_types);
        let stations = chained(&self.reused.stations, &self.stations);
        let products = chained(&self.reused.products, &self.products);
        let trailers = chained(&self.reused.trailers, &self.trailers);

        let linker = Linker::new(
            &self.customers,
            &fuel_types,
            &stations,
            &products,
            &trailers,
            skew,
            rng,
        )?;
        let orders = linker.link(self.drafts, rng);

        debug!(
            seed = self.seed,
            customers = self.customers.len(),
            fuel_types = fuel_types.len(),
            stations = stations.len(),
            products = products.len(),
            trailers = trailers.len(),
            orders = orders.len(),
            "linked dataset"
        );

        Ok(Dataset {
            seed: self.seed,
            window: self.window,
            customers: self.customers,
            fuel_types: self.fuel_types,
            stations: self.stations,
            products: self.products,
            trailers: self.trailers,
            calendar: self.calendar,
            orders,
        })
    }
}

fn chained<T: Clone>(stored: &[T], generated: &[T]) -> Vec<T> {
    stored.iter().chain(generated).cloned().collect()
}

/// Main data generator
#[derive(Debug, Clone)]
pub struct Generator {
    config: GenerationConfig,
    stored: StoredDimensions,
}

impl Generator {
    /// Validates the configuration up front
    pub fn new(config: GenerationConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            stored: StoredDimensions::default(),
        })
    }

    /// Build on rows already in the store: catalog entries present there
    /// are reused, and stations and trailers are only topped up to the
    /// configured counts.
    pub fn with_stored(mut self, stored: StoredDimensions) -> Self {
        self.stored = stored;
        self
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    /// The configured seed, or a freshly drawn one
    pub fn resolve_seed(&self) -> u64 {
        self.config.seed.unwrap_or_else(rand::random)
    }

    /// Generate a dataset on a ChaCha8 stream seeded from `seed`
    pub fn generate(&self, seed: u64, offsets: KeyOffsets) -> Result<Dataset, GenerateError> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        self.generate_with_rng(&mut rng, seed, offsets)
    }

    /// Generate a dataset drawing from `rng`; `seed` is recorded as-is
    pub fn generate_with_rng<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        seed: u64,
        offsets: KeyOffsets,
    ) -> Result<Dataset, GenerateError> {
        let unlinked = self.draft_with_rng(rng, seed, offsets)?;
        Ok(unlinked.link(&self.config.skew, rng)?)
    }

    /// Dimension pools and order drafts, before any foreign key is assigned
    pub fn draft_with_rng<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        seed: u64,
        offsets: KeyOffsets,
    ) -> Result<UnlinkedDataset, GenerateError> {
        let window = self.config.window;

        let customers = self.generate_customers(rng, offsets.customers);
        let fuel_types = self.generate_fuel_types(rng, offsets.fuel_types);
        let stations = self.generate_stations(rng, offsets.stations);
        let products = self.generate_products(rng, offsets.products);
        let trailers = self.generate_trailers(rng, offsets.trailers);
        let calendar: Vec<CalendarDay> = window.days().map(CalendarDay::new).collect();

        let drafts = self.generate_order_drafts(rng, &window, offsets.orders)?;

        let reused = self.reused_dimensions();
        if !reused.is_empty() {
            debug!(
                fuel_types = reused.fuel_types.len(),
                stations = reused.stations.len(),
                products = reused.products.len(),
                trailers = reused.trailers.len(),
                "reusing stored dimension rows"
            );
        }

        Ok(UnlinkedDataset {
            seed,
            window,
            customers,
            fuel_types,
            stations,
            products,
            trailers,
            calendar,
            drafts,
            reused,
        })
    }

    /// Stored rows the new orders link against. Catalog rows are limited to
    /// the configured labels, first stored row per label.
    fn reused_dimensions(&self) -> StoredDimensions {
        let fuel_types = FUEL_CATALOG
            .iter()
            .take(self.config.counts.fuel_types)
            .filter_map(|grade| self.stored.fuel_types.iter().find(|f| f.label == grade.label))
            .cloned()
            .collect();
        let products = PRODUCT_CATALOG
            .iter()
            .take(self.config.counts.products)
            .filter_map(|item| self.stored.products.iter().find(|p| p.label == item.label))
            .cloned()
            .collect();

        StoredDimensions {
            fuel_types,
            stations: self.stored.stations.clone(),
            products,
            trailers: self.stored.trailers.clone(),
        }
    }

    fn generate_customers<R: Rng + ?Sized>(&self, rng: &mut R, offset: i64) -> Vec<Customer> {
        let mut keys = KeyAllocator::after(offset);
        let window = self.config.window;
        let mut fake = FakeData::new(rng);

        (0..self.config.counts.customers)
            .map(|_| {
                let first_name = fake.first_name();
                let last_name = fake.last_name();
                let status = fake.customer_status();
                let tenure = fake.int_range(0, MAX_TENURE_DAYS) as u64;
                Customer {
                    customer_id: keys.next_key(),
                    first_name,
                    last_name,
                    status,
                    join_date: window.days_before_start(tenure),
                }
            })
            .collect()
    }

    /// Configured grades the store does not hold yet
    fn generate_fuel_types<R: Rng + ?Sized>(&self, rng: &mut R, offset: i64) -> Vec<FuelType> {
        let mut keys = KeyAllocator::after(offset);
        let mut fake = FakeData::new(rng);

        FUEL_CATALOG
            .iter()
            .take(self.config.counts.fuel_types)
            .filter(|grade| !self.stored.fuel_types.iter().any(|f| f.label == grade.label))
            .map(|grade| FuelType {
                fuel_id: keys.next_key(),
                label: grade.label.to_string(),
                unit_cost_cents: fake.price_cents(grade),
            })
            .collect()
    }

    fn generate_stations<R: Rng + ?Sized>(&self, rng: &mut R, offset: i64) -> Vec<Station> {
        let mut keys = KeyAllocator::after(offset);
        let mut fake = FakeData::new(rng);
        let missing = self
            .config
            .counts
            .stations
            .saturating_sub(self.stored.stations.len());

        (0..missing)
            .map(|_| {
                let city = fake.city();
                let name = fake.station_name(&city);
                Station {
                    station_id: keys.next_key(),
                    name,
                    city,
                }
            })
            .collect()
    }

    /// Configured catalog items the store does not hold yet
    fn generate_products<R: Rng + ?Sized>(&self, rng: &mut R, offset: i64) -> Vec<Product> {
        let mut keys = KeyAllocator::after(offset);
        let mut fake = FakeData::new(rng);

        PRODUCT_CATALOG
            .iter()
            .take(self.config.counts.products)
            .filter(|item| !self.stored.products.iter().any(|p| p.label == item.label))
            .map(|item| {
                let price_cents = fake.product_price_cents(item);
                Product {
                    product_id: keys.next_key(),
                    label: item.label.to_string(),
                    category: item.category,
                    price_cents,
                    stock: fake.stock(),
                }
            })
            .collect()
    }

    fn generate_trailers<R: Rng + ?Sized>(&self, rng: &mut R, offset: i64) -> Vec<Trailer> {
        let mut keys = KeyAllocator::after(offset);
        let window = self.config.window;
        let last_day = window.len_days().saturating_sub(1) as i64;
        let mut fake = FakeData::new(rng);
        let missing = self
            .config
            .counts
            .trailers
            .saturating_sub(self.stored.trailers.len());

        (0..missing)
            .map(|_| {
                let registry_number = fake.registry_number();
                let status = fake.trailer_status();
                let (rental_start, rental_end) = match status {
                    TrailerStatus::Rented => {
                        let start = add_days(window.start, fake.int_range(0, last_day));
                        let end = add_days(start, fake.int_range(1, 21)).min(window.end);
                        (Some(start), Some(end))
                    }
                    TrailerStatus::Reserved => {
                        let start = add_days(window.end, fake.int_range(1, 30));
                        let end = add_days(start, fake.int_range(1, 14));
                        (Some(start), Some(end))
                    }
                    TrailerStatus::Available | TrailerStatus::InService => (None, None),
                };
                Trailer {
                    trailer_id: keys.next_key(),
                    registry_number,
                    status,
                    rental_start,
                    rental_end,
                }
            })
            .collect()
    }

    /// Order timestamps, quantities and statuses, in key order
    fn generate_order_drafts<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        window: &DateWindow,
        offset: i64,
    ) -> Result<Vec<OrderDraft>, GenerateError> {
        let days: Vec<NaiveDate> = window.days().collect();
        let weights: Vec<f64> = days.iter().map(|d| day_weight(*d)).collect();
        let day_pool = WeightedPool::new(EntityKind::CalendarDay, days, &weights)?;
        let hours = WeightedIndex::new(HOURLY_TRAFFIC).map_err(GenerateError::HourlyTraffic)?;

        let mut keys = KeyAllocator::after(offset);
        let mut drafts = Vec::with_capacity(self.config.counts.orders);

        for _ in 0..self.config.counts.orders {
            let day = day_pool.sample(rng);
            let hour = hours.sample(rng) as i64;
            let second_of_hour: i64 = rng.random_range(0..3600);
            let ordered_at =
                day.and_time(NaiveTime::MIN) + TimeDelta::seconds(hour * 3600 + second_of_hour);

            let mut fake = FakeData::new(rng);
            drafts.push(OrderDraft {
                order_id: keys.next_key(),
                ordered_at,
                quantity_liters: fake.quantity_liters(),
                status: fake.order_status(),
            });
        }

        Ok(drafts)
    }
}

/// `date` moved forward by `days`, saturating at the latest date
fn add_days(date: NaiveDate, days: i64) -> NaiveDate {
    date.checked_add_days(Days::new(days.max(0) as u64))
        .unwrap_or(NaiveDate::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EntityCounts;
    use chrono::Timelike;
    use std::collections::HashSet;

    fn config(seed: u64) -> GenerationConfig {
        GenerationConfig::new(
            EntityCounts {
                customers: 50,
                fuel_types: 3,
                stations: 2,
                products: 5,
                trailers: 4,
                orders: 200,
            },
            DateWindow {
                start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                end: NaiveDate::from_ymd_opt(2024, 6, 30).unwrap(),
            },
            Some(seed),
        )
    }

    #[test]
    fn test_generator_deterministic() {
        let gen = Generator::new(config(42)).unwrap();
        let a = gen.generate(42, KeyOffsets::default()).unwrap();
        let b = gen.generate(42, KeyOffsets::default()).unwrap();

        assert_eq!(a.to_json_bytes().unwrap(), b.to_json_bytes().unwrap());
        assert_eq!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
    }

    #[test]
    fn test_different_seeds_differ() {
        let gen = Generator::new(config(1)).unwrap();
        let a = gen.generate(1, KeyOffsets::default()).unwrap();
        let b = gen.generate(2, KeyOffsets::default()).unwrap();
        assert_ne!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
    }

    #[test]
    fn test_draft_then_link_matches_generate() {
        let gen = Generator::new(config(42)).unwrap();
        let whole = gen.generate(42, KeyOffsets::default()).unwrap();

        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let unlinked = gen.draft_with_rng(&mut rng, 42, KeyOffsets::default()).unwrap();
        assert_eq!(unlinked.drafts.len(), 200);
        let staged = unlinked.link(&gen.config().skew, &mut rng).unwrap();

        assert_eq!(whole, staged);
    }

    #[test]
    fn test_counts_match_config() {
        let gen = Generator::new(config(7)).unwrap();
        let data = gen.generate(7, KeyOffsets::default()).unwrap();

        assert_eq!(data.customers.len(), 50);
        assert_eq!(data.fuel_types.len(), 3);
        assert_eq!(data.stations.len(), 2);
        assert_eq!(data.products.len(), 5);
        assert_eq!(data.trailers.len(), 4);
        assert_eq!(data.orders.len(), 200);
        assert_eq!(data.calendar.len(), 182);
    }

    #[test]
    fn test_keys_are_sequential_from_offset() {
        let gen = Generator::new(config(7)).unwrap();
        let offsets = KeyOffsets {
            customers: 50,
            fuel_types: 3,
            stations: 2,
            products: 5,
            trailers: 4,
            orders: 200,
        };
        let data = gen.generate(7, offsets).unwrap();

        assert_eq!(data.key_range(EntityKind::Customer), Some((51, 100)));
        assert_eq!(data.key_range(EntityKind::FuelType), Some((4, 6)));
        assert_eq!(data.key_range(EntityKind::Trailer), Some((5, 8)));
        assert_eq!(data.key_range(EntityKind::Order), Some((201, 400)));
        assert!(data.orders.iter().all(|o| o.customer_id > 50));
    }

    #[test]
    fn test_fk_consistency() {
        let gen = Generator::new(config(99)).unwrap();
        let data = gen.generate(99, KeyOffsets::default()).unwrap();

        let customers: HashSet<i64> = data.customers.iter().map(|c| c.customer_id).collect();
        let fuels: HashSet<i64> = data.fuel_types.iter().map(|f| f.fuel_id).collect();
        let stations: HashSet<i64> = data.stations.iter().map(|s| s.station_id).collect();
        let products: HashSet<i64> = data.products.iter().map(|p| p.product_id).collect();
        let trailers: HashSet<i64> = data.trailers.iter().map(|t| t.trailer_id).collect();
        let days: HashSet<i32> = data.calendar.iter().map(|d| d.date_key()).collect();

        for order in &data.orders {
            assert!(customers.contains(&order.customer_id));
            assert!(fuels.contains(&order.fuel_id));
            assert!(stations.contains(&order.station_id));
            assert!(resolves(order.product_id, &products));
            assert!(resolves(order.trailer_id, &trailers));
            assert!(days.contains(&order.date_key()));
        }
    }

    /// Optional references either stay empty or resolve
    fn resolves(key: Option<i64>, keys: &HashSet<i64>) -> bool {
        match key {
            Some(k) => keys.contains(&k),
            None => true,
        }
    }

    #[test]
    fn test_optional_references_attach_to_a_share_of_orders() {
        let mut cfg = config(31);
        cfg.counts.orders = 3000;
        let data = Generator::new(cfg).unwrap().generate(31, KeyOffsets::default()).unwrap();

        let share = |n: usize| n as f64 / data.orders.len() as f64;
        let products = share(data.orders.iter().filter(|o| o.product_id.is_some()).count());
        let trailers = share(data.orders.iter().filter(|o| o.trailer_id.is_some()).count());
        assert!((0.60..0.70).contains(&products), "product share {products}");
        assert!((0.20..0.30).contains(&trailers), "trailer share {trailers}");

        for order in data.orders.iter().filter(|o| o.product_id.is_some()) {
            let product = data.product(order.product_id.unwrap()).unwrap();
            assert_eq!(order.product_cost_cents, Some(product.price_cents));
        }
    }

    #[test]
    fn test_trailer_rental_periods_follow_status() {
        let mut cfg = config(3);
        cfg.counts.trailers = 60;
        let data = Generator::new(cfg).unwrap().generate(3, KeyOffsets::default()).unwrap();
        let window = data.window;

        for trailer in &data.trailers {
            match trailer.status {
                TrailerStatus::Rented => {
                    let (start, end) = (trailer.rental_start.unwrap(), trailer.rental_end.unwrap());
                    assert!(start >= window.start && start <= window.end);
                    assert!(end >= start && end <= window.end);
                }
                TrailerStatus::Reserved => {
                    let (start, end) = (trailer.rental_start.unwrap(), trailer.rental_end.unwrap());
                    assert!(start > window.end);
                    assert!(end > start);
                }
                _ => assert!(trailer.rental_start.is_none() && trailer.rental_end.is_none()),
            }
        }
        assert!(data.trailers.iter().any(|t| t.is_available()));
    }

    #[test]
    fn test_stored_catalog_is_reused_not_regenerated() {
        let first = Generator::new(config(42)).unwrap().generate(42, KeyOffsets::default()).unwrap();
        let stored = StoredDimensions {
            fuel_types: first.fuel_types.clone(),
            stations: first.stations.clone(),
            products: first.products.clone(),
            trailers: first.trailers.clone(),
        };
        let offsets = KeyOffsets {
            customers: 50,
            fuel_types: 3,
            stations: 2,
            products: 5,
            trailers: 4,
            orders: 200,
        };

        let mut cfg = config(7);
        cfg.counts.fuel_types = 4;
        cfg.counts.stations = 3;
        let second = Generator::new(cfg)
            .unwrap()
            .with_stored(stored)
            .generate(7, offsets)
            .unwrap();

        // Only the grade and the station the store lacks are new
        let labels: Vec<&str> = second.fuel_types.iter().map(|f| f.label.as_str()).collect();
        assert_eq!(labels, vec!["LPG"]);
        assert_eq!(second.key_range(EntityKind::FuelType), Some((4, 4)));
        assert_eq!(second.key_range(EntityKind::Station), Some((3, 3)));
        assert!(second.products.is_empty());
        assert!(second.trailers.is_empty());
        assert_eq!(second.customers.len(), 50);

        for order in &second.orders {
            let fuel = first
                .fuel_types
                .iter()
                .chain(&second.fuel_types)
                .find(|f| f.fuel_id == order.fuel_id)
                .unwrap();
            assert_eq!(order.total_cost_cents, order.quantity_liters * fuel.unit_cost_cents);
            assert!(order.station_id <= 3);
            assert!(resolves(order.product_id, &(1..=5).collect()));
            assert!(resolves(order.trailer_id, &(1..=4).collect()));
        }
        assert!(second.orders.iter().any(|o| o.fuel_id <= 3));
    }

    #[test]
    fn test_hour_of_day_follows_traffic() {
        let mut cfg = config(19);
        cfg.counts.orders = 5000;
        let data = Generator::new(cfg).unwrap().generate(19, KeyOffsets::default()).unwrap();

        let mut per_hour = [0usize; 24];
        for order in &data.orders {
            per_hour[order.ordered_at.hour() as usize] += 1;
        }
        // Evening rush weighs 11 against 1 at 3am
        assert!(per_hour[17] > per_hour[3] * 4, "{per_hour:?}");
        assert!(per_hour.iter().all(|n| *n > 0));
    }

    #[test]
    fn test_orders_within_window_and_after_join() {
        let gen = Generator::new(config(5)).unwrap();
        let data = gen.generate(5, KeyOffsets::default()).unwrap();

        for order in &data.orders {
            assert!(data.window.contains(order.ordered_at), "{}", order.ordered_at);
            let customer = data
                .customers
                .iter()
                .find(|c| c.customer_id == order.customer_id)
                .unwrap();
            assert!(customer.join_date <= order.ordered_at.date());
        }
    }

    #[test]
    fn test_total_cost_matches_unit_cost() {
        let gen = Generator::new(config(13)).unwrap();
        let data = gen.generate(13, KeyOffsets::default()).unwrap();

        for order in &data.orders {
            let fuel = data.fuel_type(order.fuel_id).unwrap();
            assert_eq!(order.unit_cost_cents, fuel.unit_cost_cents);
            assert_eq!(order.total_cost_cents, order.quantity_liters * fuel.unit_cost_cents);
        }
    }

    #[test]
    fn test_names_non_empty_and_labels_unique() {
        let gen = Generator::new(config(21)).unwrap();
        let data = gen.generate(21, KeyOffsets::default()).unwrap();

        assert!(data
            .customers
            .iter()
            .all(|c| !c.first_name.is_empty() && !c.last_name.is_empty()));
        let labels: HashSet<&str> = data.fuel_types.iter().map(|f| f.label.as_str()).collect();
        assert_eq!(labels.len(), data.fuel_types.len());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut cfg = config(1);
        cfg.counts.orders = 0;
        assert!(matches!(
            Generator::new(cfg),
            Err(ConfigError::NonPositiveCount {
                entity: EntityKind::Order,
                ..
            })
        ));
    }

    #[test]
    fn test_summer_weekend_outweighs_winter_weekday() {
        // Saturday 2024-06-22 vs Wednesday 2024-01-10
        let summer = day_weight(NaiveDate::from_ymd_opt(2024, 6, 22).unwrap());
        let winter = day_weight(NaiveDate::from_ymd_opt(2024, 1, 10).unwrap());
        assert!(summer > winter);
    }
}
