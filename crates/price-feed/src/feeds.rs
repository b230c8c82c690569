//! Feed adapter contract and the context shared by every adapter

use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, trace};

use pricewatch_core::{FeedEvent, FeedSource, PriceObservation};

use crate::health::HealthBoard;
use crate::state::PriceState;

/// Price update notification sent to the detector
#[derive(Debug, Clone)]
pub struct PriceUpdate {
    pub observation: PriceObservation,
}

impl PriceUpdate {
    pub fn source(&self) -> FeedSource {
        self.observation.source
    }
}

/// Process-wide running flag; `true` means shutdown was requested
pub type ShutdownSignal = watch::Receiver<bool>;

/// A data-ingestion path writing one source's price
#[async_trait::async_trait]
pub trait PriceFeed: Send + Sync {
    fn source(&self) -> FeedSource;

    fn name(&self) -> &'static str;

    /// Run until shutdown is requested. Transient failures are handled
    /// inside; this never returns an error.
    async fn run(&self, shutdown: ShutdownSignal);
}

/// Handles an adapter needs to publish prices and report liveness
#[derive(Debug, Clone)]
pub struct FeedContext {
    pub state: Arc<PriceState>,
    pub health: Arc<HealthBoard>,
    updates_tx: mpsc::Sender<PriceUpdate>,
}

impl FeedContext {
    pub fn new(
        state: Arc<PriceState>,
        health: Arc<HealthBoard>,
        updates_tx: mpsc::Sender<PriceUpdate>,
    ) -> Self {
        Self {
            state,
            health,
            updates_tx,
        }
    }

    /// Write the price to shared state, then notify the detector.
    /// A full queue drops the notification; the state is already current.
    pub fn publish(&self, source: FeedSource, value: Decimal) -> PriceObservation {
        let observation = self.state.set(source, value);

        match self.updates_tx.try_send(PriceUpdate {
            observation: observation.clone(),
        }) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!(feed = %source, "Update queue full, detector lagging");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                trace!(feed = %source, "Update queue closed");
            }
        }

        observation
    }

    pub fn mark(&self, source: FeedSource, event: FeedEvent) {
        self.health.apply(source, event);
    }
}

pub fn is_shutdown(shutdown: &ShutdownSignal) -> bool {
    *shutdown.borrow()
}

/// Sleep for `delay` unless shutdown arrives first. Returns `true` on shutdown.
pub async fn sleep_or_shutdown(delay: Duration, shutdown: &mut ShutdownSignal) -> bool {
    if is_shutdown(shutdown) {
        return true;
    }

    tokio::select! {
        _ = tokio::time::sleep(delay) => is_shutdown(shutdown),
        changed = shutdown.changed() => changed.is_err() || is_shutdown(shutdown),
    }
}
