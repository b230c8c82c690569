//! Divergence evaluation over the shared price state

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::time::Duration;
use tracing::{debug, info, warn};

use pricewatch_core::{ArbitrageSignal, DetectionConfig, Divergence, FeedSource, PriceObservation};
use pricewatch_feeds::{PriceSnapshot, PriceState};

/// Outcome of one evaluation where both prices were usable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detection {
    pub divergence: Divergence,
    pub signal: Option<ArbitrageSignal>,
}

/// Why an evaluation produced nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skip {
    /// The source has never reported
    MissingPrice(FeedSource),
    /// Older than the configured freshness window
    Stale { source: FeedSource, age: Duration },
    ZeroPoolPrice,
}

/// Compares the latest exchange and pool prices against a threshold
#[derive(Debug, Clone)]
pub struct ArbitrageDetector {
    threshold_pct: Decimal,
    max_price_age: Option<Duration>,
    pair_label: String,
}

impl ArbitrageDetector {
    pub fn new(threshold_pct: Decimal, pair_label: impl Into<String>) -> Self {
        Self {
            threshold_pct,
            max_price_age: None,
            pair_label: pair_label.into(),
        }
    }

    pub fn from_config(config: &DetectionConfig) -> Self {
        Self::new(config.threshold_pct, config.pair_label.clone())
            .with_max_price_age(config.max_price_age())
    }

    /// Skip comparisons involving an observation older than `max_age`
    pub fn with_max_price_age(mut self, max_age: Option<Duration>) -> Self {
        self.max_price_age = max_age;
        self
    }

    pub fn threshold_pct(&self) -> Decimal {
        self.threshold_pct
    }

    pub fn pair_label(&self) -> &str {
        &self.pair_label
    }

    /// Pure evaluation of a snapshot. No logging.
    pub fn evaluate(&self, snapshot: &PriceSnapshot, now: DateTime<Utc>) -> Result<Detection, Skip> {
        let exchange = snapshot
            .exchange
            .as_ref()
            .ok_or(Skip::MissingPrice(FeedSource::Exchange))?;
        let pool = snapshot
            .pool
            .as_ref()
            .ok_or(Skip::MissingPrice(FeedSource::Pool))?;

        if let Some(max_age) = self.max_price_age {
            self.check_age(exchange, max_age, now)?;
            self.check_age(pool, max_age, now)?;
        }

        let divergence = Divergence::compute(exchange.value, pool.value).ok_or(Skip::ZeroPoolPrice)?;

        Ok(Detection {
            divergence,
            signal: divergence.signal(self.threshold_pct),
        })
    }

    fn check_age(
        &self,
        observation: &PriceObservation,
        max_age: Duration,
        now: DateTime<Utc>,
    ) -> Result<(), Skip> {
        let age = observation.age(now);
        if age > max_age {
            return Err(Skip::Stale {
                source: observation.source,
                age,
            });
        }
        Ok(())
    }

    /// Evaluate the current state and log the report, plus the signal if
    /// the threshold is crossed
    pub fn check(&self, state: &PriceState) -> Option<Detection> {
        match self.evaluate(&state.snapshot(), Utc::now()) {
            Ok(detection) => {
                info!("[{}] {}", self.pair_label, detection.divergence.summary());
                if let Some(signal) = &detection.signal {
                    warn!("[{}] ARBITRAGE SIGNAL: {}", self.pair_label, signal);
                }
                Some(detection)
            }
            Err(Skip::MissingPrice(source)) => {
                debug!(feed = %source, "No price yet, skipping evaluation");
                None
            }
            Err(Skip::Stale { source, age }) => {
                debug!(feed = %source, "Price is {:?} old, skipping evaluation", age);
                None
            }
            Err(Skip::ZeroPoolPrice) => {
                warn!(feed = %FeedSource::Pool, "Pool price is zero, skipping evaluation");
                None
            }
        }
    }
}
