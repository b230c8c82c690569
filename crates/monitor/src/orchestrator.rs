//! Process orchestration: feeds, supervisor sweeps and the scanner

use anyhow::Context;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use pricewatch_core::{ArbitrageSignal, ExchangeMode, MonitorConfig, PoolMode};
use pricewatch_detector::{ArbitrageScanner, ScannerStats};
use pricewatch_feeds::{
    ExchangeRestFeed, ExchangeStreamFeed, FeedContext, FeedSupervisor, HealthBoard,
    PoolEventFeed, PoolPollingFeed, PriceFeed, PriceState, PriceStateStats, PriceUpdate,
    RpcClient, SupervisorStats,
};

const UPDATE_QUEUE: usize = 1_024;

/// Counters collected when the monitor stops
#[derive(Debug, Clone)]
pub struct MonitorReport {
    pub supervisor: SupervisorStats,
    pub scanner: ScannerStats,
    pub prices: PriceStateStats,
}

/// Owns every component for one monitoring session
pub struct Monitor {
    config: MonitorConfig,
    state: Arc<PriceState>,
    health: Arc<HealthBoard>,
    updates_tx: mpsc::Sender<PriceUpdate>,
    updates_rx: mpsc::Receiver<PriceUpdate>,
    supervisor: FeedSupervisor,
    signal_tx: Option<mpsc::Sender<ArbitrageSignal>>,
}

impl Monitor {
    /// Components only; no feeds registered, no network access
    pub fn new(config: MonitorConfig) -> anyhow::Result<Self> {
        config.validate().context("Invalid configuration")?;

        let state = Arc::new(PriceState::new());
        let health = Arc::new(HealthBoard::new());
        let (updates_tx, updates_rx) = mpsc::channel(UPDATE_QUEUE);
        let supervisor = FeedSupervisor::new(config.supervisor.clone(), Arc::clone(&health));

        Ok(Self {
            config,
            state,
            health,
            updates_tx,
            updates_rx,
            supervisor,
            signal_tx: None,
        })
    }

    /// Verify the blockchain endpoint, then register the feeds selected by
    /// the configured modes. An unreachable RPC node is fatal here and only
    /// here.
    pub async fn connect(config: MonitorConfig) -> anyhow::Result<Self> {
        let mut monitor = Self::new(config)?;
        let chain = &monitor.config.chain;

        let rpc = RpcClient::new(chain.rpc_http_url.clone(), chain.request_timeout())?;
        let chain_id = rpc
            .chain_id()
            .await
            .with_context(|| format!("Cannot connect to blockchain RPC at {}", rpc.url()))?;
        info!("Connected to chain {} via {}", chain_id, rpc.url());

        let ctx = monitor.context();
        let exchange: Arc<dyn PriceFeed> = match monitor.config.exchange.mode {
            ExchangeMode::Stream => Arc::new(ExchangeStreamFeed::new(
                monitor.config.exchange.clone(),
                ctx.clone(),
            )),
            ExchangeMode::Rest => Arc::new(ExchangeRestFeed::new(
                monitor.config.exchange.clone(),
                ctx.clone(),
            )?),
        };
        let pool: Arc<dyn PriceFeed> = match monitor.config.chain.mode {
            PoolMode::Events => Arc::new(PoolEventFeed::new(monitor.config.chain.clone(), ctx)?),
            PoolMode::Polling => {
                Arc::new(PoolPollingFeed::new(monitor.config.chain.clone(), ctx)?)
            }
        };

        monitor.add_feed(exchange);
        monitor.add_feed(pool);
        Ok(monitor)
    }

    /// Handles for a feed adapter built outside the monitor
    pub fn context(&self) -> FeedContext {
        FeedContext::new(
            Arc::clone(&self.state),
            Arc::clone(&self.health),
            self.updates_tx.clone(),
        )
    }

    pub fn add_feed(&mut self, feed: Arc<dyn PriceFeed>) {
        self.supervisor.register(feed);
    }

    /// Forward every arbitrage signal to `tx` as well as logging it
    pub fn with_signal_sink(mut self, tx: mpsc::Sender<ArbitrageSignal>) -> Self {
        self.signal_tx = Some(tx);
        self
    }

    pub fn state(&self) -> Arc<PriceState> {
        Arc::clone(&self.state)
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Run until `shutdown` completes, then stop every worker
    pub async fn run<F>(self, shutdown: F) -> anyhow::Result<MonitorReport>
    where
        F: Future<Output = ()>,
    {
        let Monitor {
            config,
            state,
            updates_tx,
            updates_rx,
            supervisor,
            signal_tx,
            ..
        } = self;
        // Feeds hold their own senders
        drop(updates_tx);

        let supervisor = Arc::new(supervisor);
        let mut scanner = ArbitrageScanner::new(&config.detection, Arc::clone(&state));
        if let Some(tx) = signal_tx {
            scanner = scanner.with_signal_sink(tx);
        }
        let scanner = Arc::new(scanner);

        supervisor.start_all();

        let sweeps = tokio::spawn({
            let supervisor = Arc::clone(&supervisor);
            let shutdown = supervisor.subscribe_shutdown();
            async move { supervisor.run_sweeps(shutdown).await }
        });
        let scanning = tokio::spawn({
            let scanner = Arc::clone(&scanner);
            let shutdown = supervisor.subscribe_shutdown();
            async move { scanner.run(updates_rx, shutdown).await }
        });

        info!(
            "Monitoring {} divergence, threshold {}%",
            config.detection.pair_label, config.detection.threshold_pct
        );

        shutdown.await;
        warn!("Shutdown requested, stopping workers");

        supervisor.shutdown().await;
        let grace = config.supervisor.shutdown_grace();
        join_worker("sweeper", sweeps, grace).await;
        join_worker("scanner", scanning, grace).await;

        let report = MonitorReport {
            supervisor: supervisor.stats(),
            scanner: scanner.stats(),
            prices: state.stats(),
        };
        info!(
            "Stopped after {} price updates, {} evaluations, {} signals, {} feed restarts",
            report.prices.update_count,
            report.scanner.evaluations,
            report.scanner.signals,
            report.supervisor.restarts
        );

        Ok(report)
    }
}

async fn join_worker(name: &str, mut handle: JoinHandle<()>, grace: Duration) {
    match tokio::time::timeout(grace, &mut handle).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("{} task failed: {}", name, e),
        Err(_) => {
            warn!("{} did not stop in time, aborting", name);
            handle.abort();
        }
    }
}
