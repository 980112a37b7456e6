//! Referential linker: resolves every order's foreign keys against the
//! generated dimension pools.
//!
//! Selection is weighted, not uniform. A configurable fraction of customers
//! carries most of the order volume and fuel grades follow catalog
//! popularity, which is what makes the "top customer" and "top fuel revenue"
//! views interesting. Shop products and rental trailers are optional and
//! attached to a fraction of orders only.

use chrono::NaiveDateTime;
use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::seq::SliceRandom;
use rand::Rng;
use thiserror::Error;

use crate::config::SkewPolicy;
use crate::fake::fuel_grade;
use crate::model::{Customer, EntityKind, FuelType, Order, OrderStatus, Product, Station, Trailer};

/// Smallest weight a pool member may carry; zero weights are bumped to this
const MIN_WEIGHT: f64 = 1e-9;

/// Share of orders that include a shop product
pub const PRODUCT_ATTACH_RATE: f64 = 0.65;

/// Share of orders that include a trailer rental
pub const TRAILER_ATTACH_RATE: f64 = 0.25;

/// A dimension pool has no members to reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot link orders: the {pool} pool is empty")]
pub struct EmptyDimensionError {
    pub pool: EntityKind,
}

/// A fact record before its foreign keys are assigned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderDraft {
    pub order_id: i64,
    pub ordered_at: NaiveDateTime,
    pub quantity_liters: i64,
    pub status: OrderStatus,
}

/// Items with sampling weights
pub struct WeightedPool<T> {
    items: Vec<T>,
    index: WeightedIndex<f64>,
}

impl<T: Copy> WeightedPool<T> {
    pub fn new(kind: EntityKind, items: Vec<T>, weights: &[f64]) -> Result<Self, EmptyDimensionError> {
        if items.is_empty() || weights.len() != items.len() {
            return Err(EmptyDimensionError { pool: kind });
        }

        let sanitized = weights.iter().map(|w| {
            if w.is_finite() {
                w.clamp(MIN_WEIGHT, 1e9)
            } else {
                1.0
            }
        });
        // Only an empty input can fail once weights are clamped
        let index = WeightedIndex::new(sanitized).map_err(|_| EmptyDimensionError { pool: kind })?;

        Ok(Self { items, index })
    }

    pub fn uniform(kind: EntityKind, items: Vec<T>) -> Result<Self, EmptyDimensionError> {
        let weights = vec![1.0; items.len()];
        Self::new(kind, items, &weights)
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> T {
        self.items[self.index.sample(rng)]
    }
}

/// Per-customer weights implementing the skew policy.
///
/// The heavy set is picked by shuffling, then every weight is jittered so
/// the heavy customers do not tie with each other.
pub fn customer_weights<R: Rng + ?Sized>(count: usize, skew: &SkewPolicy, rng: &mut R) -> Vec<f64> {
    if count == 0 {
        return Vec::new();
    }

    let heavy = ((count as f64 * skew.top_customer_fraction).ceil() as usize).clamp(1, count);
    let mut order: Vec<usize> = (0..count).collect();
    order.shuffle(rng);

    let (heavy_weight, light_weight) = if heavy == count {
        (1.0, 1.0)
    } else {
        (
            skew.top_customer_share / heavy as f64,
            (1.0 - skew.top_customer_share) / (count - heavy) as f64,
        )
    };

    let mut weights = vec![light_weight; count];
    for &idx in &order[..heavy] {
        weights[idx] = heavy_weight;
    }
    for w in weights.iter_mut() {
        *w *= rng.random_range(0.6..1.4);
    }
    weights
}

/// Assigns customer, fuel, station and the optional product and trailer keys
/// to order drafts
pub struct Linker<'a> {
    customers: WeightedPool<i64>,
    fuels: WeightedPool<&'a FuelType>,
    stations: WeightedPool<i64>,
    /// `None` when there are no products to attach
    products: Option<WeightedPool<&'a Product>>,
    trailers: Option<WeightedPool<i64>>,
}

impl<'a> Linker<'a> {
    /// Customer, fuel and station pools must be non-empty. Empty product or
    /// trailer pools only mean no order gets one.
    pub fn new<R: Rng + ?Sized>(
        customers: &[Customer],
        fuel_types: &'a [FuelType],
        stations: &[Station],
        products: &'a [Product],
        trailers: &[Trailer],
        skew: &SkewPolicy,
        rng: &mut R,
    ) -> Result<Self, EmptyDimensionError> {
        if customers.is_empty() {
            return Err(EmptyDimensionError {
                pool: EntityKind::Customer,
            });
        }
        if fuel_types.is_empty() {
            return Err(EmptyDimensionError {
                pool: EntityKind::FuelType,
            });
        }
        if stations.is_empty() {
            return Err(EmptyDimensionError {
                pool: EntityKind::Station,
            });
        }

        let weights = customer_weights(customers.len(), skew, rng);
        let customers = WeightedPool::new(
            EntityKind::Customer,
            customers.iter().map(|c| c.customer_id).collect(),
            &weights,
        )?;

        let fuel_weights: Vec<f64> = fuel_types
            .iter()
            .map(|f| fuel_grade(&f.label).map_or(1.0, |g| g.popularity as f64))
            .collect();
        let fuels = WeightedPool::new(EntityKind::FuelType, fuel_types.iter().collect(), &fuel_weights)?;

        let stations = WeightedPool::uniform(
            EntityKind::Station,
            stations.iter().map(|s| s.station_id).collect(),
        )?;

        let products = if products.is_empty() {
            None
        } else {
            Some(WeightedPool::uniform(EntityKind::Product, products.iter().collect())?)
        };
        let trailers = if trailers.is_empty() {
            None
        } else {
            Some(WeightedPool::uniform(
                EntityKind::Trailer,
                trailers.iter().map(|t| t.trailer_id).collect(),
            )?)
        };

        Ok(Self {
            customers,
            fuels,
            stations,
            products,
            trailers,
        })
    }

    /// Resolve every draft into an order, computing its total cost from the
    /// referenced fuel's unit cost
    pub fn link<R: Rng + ?Sized>(&self, drafts: Vec<OrderDraft>, rng: &mut R) -> Vec<Order> {
        drafts
            .into_iter()
            .map(|draft| {
                let customer_id = self.customers.sample(rng);
                let fuel = self.fuels.sample(rng);
                let station_id = self.stations.sample(rng);
                let product = match &self.products {
                    Some(pool) if rng.random_bool(PRODUCT_ATTACH_RATE) => Some(pool.sample(rng)),
                    _ => None,
                };
                let trailer_id = match &self.trailers {
                    Some(pool) if rng.random_bool(TRAILER_ATTACH_RATE) => Some(pool.sample(rng)),
                    _ => None,
                };
                Order {
                    order_id: draft.order_id,
                    customer_id,
                    fuel_id: fuel.fuel_id,
                    station_id,
                    product_id: product.map(|p| p.product_id),
                    product_cost_cents: product.map(|p| p.price_cents),
                    trailer_id,
                    ordered_at: draft.ordered_at,
                    quantity_liters: draft.quantity_liters,
                    unit_cost_cents: fuel.unit_cost_cents,
                    total_cost_cents: draft.quantity_liters * fuel.unit_cost_cents,
                    status: draft.status,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::collections::HashMap;

    fn customers(n: i64) -> Vec<Customer> {
        (1..=n)
            .map(|id| Customer {
                customer_id: id,
                first_name: "Ann".to_string(),
                last_name: "Lee".to_string(),
                status: crate::model::CustomerStatus::Active,
                join_date: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            })
            .collect()
    }

    fn fuels() -> Vec<FuelType> {
        vec![
            FuelType {
                fuel_id: 1,
                label: "PB95".to_string(),
                unit_cost_cents: 650,
            },
            FuelType {
                fuel_id: 2,
                label: "LPG".to_string(),
                unit_cost_cents: 300,
            },
        ]
    }

    fn stations() -> Vec<Station> {
        vec![Station {
            station_id: 1,
            name: "Northstar Springfield".to_string(),
            city: "Springfield".to_string(),
        }]
    }

    fn products() -> Vec<Product> {
        vec![
            Product {
                product_id: 1,
                label: "engine oil".to_string(),
                category: crate::model::ProductCategory::Maintenance,
                price_cents: 4200,
                stock: 30,
            },
            Product {
                product_id: 2,
                label: "chips".to_string(),
                category: crate::model::ProductCategory::Convenience,
                price_cents: 450,
                stock: 90,
            },
        ]
    }

    fn trailers() -> Vec<Trailer> {
        vec![Trailer {
            trailer_id: 5,
            registry_number: "47 KRT 2831".to_string(),
            status: crate::model::TrailerStatus::Available,
            rental_start: None,
            rental_end: None,
        }]
    }

    fn drafts(n: i64) -> Vec<OrderDraft> {
        let at = NaiveDate::from_ymd_opt(2024, 1, 5)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        (1..=n)
            .map(|id| OrderDraft {
                order_id: id,
                ordered_at: at,
                quantity_liters: 10 + id % 40,
                status: OrderStatus::Completed,
            })
            .collect()
    }

    #[test]
    fn test_empty_customer_pool_fails() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let err = Linker::new(&[], &fuels(), &stations(), &[], &[], &SkewPolicy::default(), &mut rng)
            .err()
            .unwrap();
        assert_eq!(err.pool, EntityKind::Customer);
    }

    #[test]
    fn test_empty_fuel_pool_fails() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let err = Linker::new(&customers(3), &[], &stations(), &[], &[], &SkewPolicy::default(), &mut rng)
            .err()
            .unwrap();
        assert_eq!(err.pool, EntityKind::FuelType);
        assert_eq!(err.to_string(), "cannot link orders: the fuel_type pool is empty");
    }

    #[test]
    fn test_links_resolve_and_cost_is_exact() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let customers = customers(20);
        let fuels = fuels();
        let stations = stations();
        let linker =
            Linker::new(&customers, &fuels, &stations, &[], &[], &SkewPolicy::default(), &mut rng)
                .unwrap();
        let orders = linker.link(drafts(300), &mut rng);

        assert_eq!(orders.len(), 300);
        for order in &orders {
            assert!(customers.iter().any(|c| c.customer_id == order.customer_id));
            let fuel = fuels.iter().find(|f| f.fuel_id == order.fuel_id).unwrap();
            assert_eq!(order.total_cost_cents, order.quantity_liters * fuel.unit_cost_cents);
            assert_eq!(order.station_id, 1);
            assert_eq!(order.product_id, None);
            assert_eq!(order.trailer_id, None);
        }
    }

    #[test]
    fn test_optional_references_attach_at_their_rates() {
        let mut rng = ChaCha8Rng::seed_from_u64(17);
        let customers = customers(10);
        let fuels = fuels();
        let stations = stations();
        let products = products();
        let trailers = trailers();
        let linker = Linker::new(
            &customers,
            &fuels,
            &stations,
            &products,
            &trailers,
            &SkewPolicy::default(),
            &mut rng,
        )
        .unwrap();
        let orders = linker.link(drafts(4000), &mut rng);

        let with_product = orders.iter().filter(|o| o.product_id.is_some()).count() as f64 / 4000.0;
        let with_trailer = orders.iter().filter(|o| o.trailer_id.is_some()).count() as f64 / 4000.0;
        assert!((with_product - PRODUCT_ATTACH_RATE).abs() < 0.04, "product share {with_product}");
        assert!((with_trailer - TRAILER_ATTACH_RATE).abs() < 0.04, "trailer share {with_trailer}");

        for order in &orders {
            match order.product_id {
                Some(id) => {
                    let product = products.iter().find(|p| p.product_id == id).unwrap();
                    assert_eq!(order.product_cost_cents, Some(product.price_cents));
                }
                None => assert_eq!(order.product_cost_cents, None),
            }
            assert!(matches!(order.trailer_id, None | Some(5)));
        }
    }

    #[test]
    fn test_skew_concentrates_orders() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let customers = customers(100);
        let fuels = fuels();
        let stations = stations();
        let linker =
            Linker::new(&customers, &fuels, &stations, &[], &[], &SkewPolicy::default(), &mut rng)
                .unwrap();
        let orders = linker.link(drafts(4000), &mut rng);

        let mut per_customer: HashMap<i64, usize> = HashMap::new();
        for order in &orders {
            *per_customer.entry(order.customer_id).or_default() += 1;
        }
        let mut counts: Vec<usize> = per_customer.into_values().collect();
        counts.sort_unstable_by(|a, b| b.cmp(a));
        let top: usize = counts.iter().take(20).sum();

        // 20% of customers would hold 20% of orders under a uniform pick
        assert!(top * 2 > orders.len(), "top share {} of {}", top, orders.len());
    }

    #[test]
    fn test_fuel_popularity_weighting() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let customers = customers(5);
        let fuels = fuels();
        let stations = stations();
        let linker =
            Linker::new(&customers, &fuels, &stations, &[], &[], &SkewPolicy::default(), &mut rng)
                .unwrap();
        let orders = linker.link(drafts(2000), &mut rng);
        let pb95 = orders.iter().filter(|o| o.fuel_id == 1).count();

        // PB95 popularity 40 vs LPG 10
        assert!(pb95 > 1400, "pb95 = {pb95}");
    }

    #[test]
    fn test_full_fraction_is_uniform_weighting() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let skew = SkewPolicy {
            top_customer_fraction: 1.0,
            top_customer_share: 0.9,
        };
        let weights = customer_weights(10, &skew, &mut rng);
        assert_eq!(weights.len(), 10);
        assert!(weights.iter().all(|w| *w >= 0.6 && *w < 1.4));
    }
}
