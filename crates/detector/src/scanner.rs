//! Detector scheduling: on every price update, or on a fixed interval

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use pricewatch_core::{ArbitrageSignal, DetectionConfig, DetectionMode};
use pricewatch_feeds::feeds::is_shutdown;
use pricewatch_feeds::{PriceState, PriceUpdate, ShutdownSignal};

use crate::detector::{ArbitrageDetector, Detection};

/// Runs the detector against the shared price state
pub struct ArbitrageScanner {
    mode: DetectionMode,
    interval: Duration,
    detector: ArbitrageDetector,
    state: Arc<PriceState>,
    signal_tx: Option<mpsc::Sender<ArbitrageSignal>>,

    evaluations: AtomicU64,
    signals: AtomicU64,
    updates: AtomicU64,
}

impl ArbitrageScanner {
    pub fn new(config: &DetectionConfig, state: Arc<PriceState>) -> Self {
        Self {
            mode: config.mode,
            interval: config.interval(),
            detector: ArbitrageDetector::from_config(config),
            state,
            signal_tx: None,
            evaluations: AtomicU64::new(0),
            signals: AtomicU64::new(0),
            updates: AtomicU64::new(0),
        }
    }

    /// Forward every emitted signal to `tx`
    pub fn with_signal_sink(mut self, tx: mpsc::Sender<ArbitrageSignal>) -> Self {
        self.signal_tx = Some(tx);
        self
    }

    pub fn detector(&self) -> &ArbitrageDetector {
        &self.detector
    }

    /// Run until shutdown
    pub async fn run(&self, updates: mpsc::Receiver<PriceUpdate>, shutdown: ShutdownSignal) {
        info!(
            "Starting arbitrage scanner ({:?}, threshold {}%)",
            self.mode,
            self.detector.threshold_pct()
        );

        match self.mode {
            DetectionMode::EventDriven => self.run_event_driven(updates, shutdown).await,
            DetectionMode::Polling => self.run_polling(updates, shutdown).await,
        }

        info!("Scanner stopped");
    }

    async fn run_event_driven(
        &self,
        mut updates: mpsc::Receiver<PriceUpdate>,
        mut shutdown: ShutdownSignal,
    ) {
        loop {
            tokio::select! {
                update = updates.recv() => {
                    let Some(update) = update else {
                        debug!("Update channel closed");
                        break;
                    };
                    self.updates.fetch_add(1, Ordering::Relaxed);
                    trace!(feed = %update.source(), "Price update {}", update.observation.value);
                    self.evaluate_once();
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || is_shutdown(&shutdown) {
                        break;
                    }
                }
            }
        }
    }

    async fn run_polling(
        &self,
        mut updates: mpsc::Receiver<PriceUpdate>,
        mut shutdown: ShutdownSignal,
    ) {
        let mut interval = tokio::time::interval(self.interval);
        let mut updates_open = true;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.evaluate_once();
                }
                // Drained only; state already holds the value
                update = updates.recv(), if updates_open => {
                    match update {
                        Some(_) => {
                            self.updates.fetch_add(1, Ordering::Relaxed);
                        }
                        None => updates_open = false,
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || is_shutdown(&shutdown) {
                        break;
                    }
                }
            }
        }
    }

    /// One evaluation against the current state
    pub fn evaluate_once(&self) -> Option<Detection> {
        self.evaluations.fetch_add(1, Ordering::Relaxed);
        let detection = self.detector.check(&self.state)?;

        if let Some(signal) = detection.signal {
            self.signals.fetch_add(1, Ordering::Relaxed);
            if let Some(tx) = &self.signal_tx {
                if let Err(e) = tx.try_send(signal) {
                    warn!("Signal sink rejected signal: {}", e);
                }
            }
        }

        Some(detection)
    }

    pub fn stats(&self) -> ScannerStats {
        ScannerStats {
            evaluations: self.evaluations.load(Ordering::Relaxed),
            signals: self.signals.load(Ordering::Relaxed),
            updates: self.updates.load(Ordering::Relaxed),
        }
    }
}

/// Scanner statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScannerStats {
    pub evaluations: u64,
    pub signals: u64,
    pub updates: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pricewatch_core::{Direction, FeedSource};
    use pricewatch_feeds::{FeedContext, HealthBoard};
    use rust_decimal::Decimal;
    use tokio::sync::watch;

    struct Harness {
        ctx: FeedContext,
        scanner: Arc<ArbitrageScanner>,
        signals: mpsc::Receiver<ArbitrageSignal>,
        updates: Option<mpsc::Receiver<PriceUpdate>>,
    }

    fn harness(mode: DetectionMode) -> Harness {
        let state = Arc::new(PriceState::new());
        let (updates_tx, updates_rx) = mpsc::channel(64);
        let (signal_tx, signal_rx) = mpsc::channel(16);
        let ctx = FeedContext::new(Arc::clone(&state), Arc::new(HealthBoard::new()), updates_tx);

        let config = DetectionConfig {
            mode,
            ..DetectionConfig::default()
        };
        let scanner = Arc::new(ArbitrageScanner::new(&config, state).with_signal_sink(signal_tx));

        Harness {
            ctx,
            scanner,
            signals: signal_rx,
            updates: Some(updates_rx),
        }
    }

    #[test]
    fn test_evaluate_once_counts() {
        let h = harness(DetectionMode::EventDriven);

        assert!(h.scanner.evaluate_once().is_none());
        h.ctx.publish(FeedSource::Exchange, Decimal::new(650, 0));
        h.ctx.publish(FeedSource::Pool, Decimal::new(650, 0));
        assert!(h.scanner.evaluate_once().unwrap().signal.is_none());

        let stats = h.scanner.stats();
        assert_eq!(stats.evaluations, 2);
        assert_eq!(stats.signals, 0);
    }

    #[tokio::test]
    async fn test_event_driven_emits_signal() {
        let mut h = harness(DetectionMode::EventDriven);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let updates = h.updates.take().unwrap();
        let task = tokio::spawn({
            let scanner = Arc::clone(&h.scanner);
            async move { scanner.run(updates, shutdown_rx).await }
        });

        h.ctx.publish(FeedSource::Pool, Decimal::new(650, 0));
        h.ctx.publish(FeedSource::Exchange, Decimal::new(652, 0));

        let signal = tokio::time::timeout(Duration::from_secs(2), h.signals.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(signal.direction, Direction::BuyPoolSellExchange);
        assert_eq!(signal.to_string(), "Buy on pool, sell on exchange (+0.31%)");

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();

        let stats = h.scanner.stats();
        assert!(stats.updates >= 1);
        assert!(stats.signals >= 1);
        assert!(stats.evaluations >= stats.signals);
    }

    #[tokio::test]
    async fn test_polling_mode_evaluates_on_tick() {
        let mut h = harness(DetectionMode::Polling);
        h.ctx.publish(FeedSource::Exchange, Decimal::new(640, 0));
        h.ctx.publish(FeedSource::Pool, Decimal::new(650, 0));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let updates = h.updates.take().unwrap();
        let task = tokio::spawn({
            let scanner = Arc::clone(&h.scanner);
            async move { scanner.run(updates, shutdown_rx).await }
        });

        let signal = tokio::time::timeout(Duration::from_secs(3), h.signals.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(signal.direction, Direction::BuyExchangeSellPool);

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
        assert!(h.scanner.stats().evaluations >= 1);
    }
}
