//! Lock-free price state management
//!
//! Uses DashMap keyed by feed source: each write is an atomic replace of the
//! whole observation, and writers for different sources never contend.

use dashmap::DashMap;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use pricewatch_core::{FeedSource, PriceObservation};

/// Latest observation for each source
#[derive(Debug)]
pub struct PriceState {
    prices: DashMap<FeedSource, PriceObservation>,

    /// Stats
    update_count: AtomicU64,
    last_update: RwLock<Option<Instant>>,
}

/// Both sides read together
#[derive(Debug, Clone, Default)]
pub struct PriceSnapshot {
    pub exchange: Option<PriceObservation>,
    pub pool: Option<PriceObservation>,
}

impl PriceState {
    pub fn new() -> Self {
        Self {
            prices: DashMap::new(),
            update_count: AtomicU64::new(0),
            last_update: RwLock::new(None),
        }
    }

    /// Record a new price for `source`, superseding the previous one
    pub fn set(&self, source: FeedSource, value: Decimal) -> PriceObservation {
        let observation = PriceObservation::new(source, value);
        self.insert(observation.clone());
        observation
    }

    /// Store a pre-built observation under its own source
    pub fn insert(&self, observation: PriceObservation) {
        self.prices.insert(observation.source, observation);
        self.update_count.fetch_add(1, Ordering::Relaxed);
        *self.last_update.write() = Some(Instant::now());
    }

    /// Latest observation, or `None` before the first update
    pub fn get(&self, source: FeedSource) -> Option<PriceObservation> {
        self.prices.get(&source).map(|r| r.value().clone())
    }

    pub fn snapshot(&self) -> PriceSnapshot {
        PriceSnapshot {
            exchange: self.get(FeedSource::Exchange),
            pool: self.get(FeedSource::Pool),
        }
    }

    /// Stats
    pub fn stats(&self) -> PriceStateStats {
        PriceStateStats {
            price_count: self.prices.len(),
            update_count: self.update_count.load(Ordering::Relaxed),
            last_update_age: self.last_update.read().map(|t| t.elapsed()),
        }
    }
}

impl Default for PriceState {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics about price state
#[derive(Debug, Clone)]
pub struct PriceStateStats {
    pub price_count: usize,
    pub update_count: u64,
    pub last_update_age: Option<Duration>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_before_first_update() {
        let state = PriceState::new();
        assert!(state.get(FeedSource::Exchange).is_none());
        assert!(state.get(FeedSource::Pool).is_none());
        assert!(state.stats().last_update_age.is_none());
    }

    #[test]
    fn test_set_replaces_previous() {
        let state = PriceState::new();
        state.set(FeedSource::Exchange, Decimal::new(650, 0));
        state.set(FeedSource::Exchange, Decimal::new(651, 0));
        state.set(FeedSource::Pool, Decimal::new(649, 0));

        let exchange = state.get(FeedSource::Exchange).unwrap();
        assert_eq!(exchange.value, Decimal::new(651, 0));
        assert_eq!(exchange.source, FeedSource::Exchange);
        assert_eq!(state.get(FeedSource::Pool).unwrap().value, Decimal::new(649, 0));

        let stats = state.stats();
        assert_eq!(stats.price_count, 2);
        assert_eq!(stats.update_count, 3);
    }

    #[test]
    fn test_concurrent_updates() {
        use std::sync::Arc;
        use std::thread;

        let state = Arc::new(PriceState::new());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let state = Arc::clone(&state);
                let source = if i % 2 == 0 { FeedSource::Exchange } else { FeedSource::Pool };
                thread::spawn(move || {
                    for j in 0..100 {
                        state.set(source, Decimal::new(i * 1000 + j, 0));
                        // Readers only ever see a complete observation
                        let seen = state.get(source).unwrap();
                        assert_eq!(seen.source, source);
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(state.stats().update_count, 400);
        assert_eq!(state.stats().price_count, 2);
    }
}
