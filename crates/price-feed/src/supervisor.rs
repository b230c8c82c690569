//! Feed supervisor - spawns adapters, restarts stale ones, coordinates shutdown

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use pricewatch_core::{FeedEvent, FeedSource, SupervisorConfig};

use crate::feeds::{is_shutdown, PriceFeed, ShutdownSignal};
use crate::health::HealthBoard;

/// Owns one task per registered feed
pub struct FeedSupervisor {
    config: SupervisorConfig,
    health: Arc<HealthBoard>,
    feeds: Vec<Arc<dyn PriceFeed>>,
    tasks: Mutex<HashMap<FeedSource, JoinHandle<()>>>,
    shutdown_tx: watch::Sender<bool>,
    restarts: AtomicU64,
}

impl FeedSupervisor {
    pub fn new(config: SupervisorConfig, health: Arc<HealthBoard>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            config,
            health,
            feeds: Vec::new(),
            tasks: Mutex::new(HashMap::new()),
            shutdown_tx,
            restarts: AtomicU64::new(0),
        }
    }

    /// Add a feed. A later feed for the same source replaces the earlier one.
    pub fn register(&mut self, feed: Arc<dyn PriceFeed>) {
        let source = feed.source();
        self.feeds.retain(|f| f.source() != source);
        self.health.register(source);
        info!(feed = %source, "Registered {}", feed.name());
        self.feeds.push(feed);
    }

    pub fn health(&self) -> Arc<HealthBoard> {
        Arc::clone(&self.health)
    }

    /// Receiver for the process-wide shutdown flag
    pub fn subscribe_shutdown(&self) -> ShutdownSignal {
        self.shutdown_tx.subscribe()
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    fn feed(&self, source: FeedSource) -> Option<Arc<dyn PriceFeed>> {
        self.feeds.iter().find(|f| f.source() == source).cloned()
    }

    fn spawn(&self, feed: Arc<dyn PriceFeed>) -> JoinHandle<()> {
        let shutdown = self.shutdown_tx.subscribe();
        tokio::spawn(async move { feed.run(shutdown).await })
    }

    /// Spawn every registered feed
    pub fn start_all(&self) {
        let mut tasks = self.tasks.lock();
        for feed in &self.feeds {
            let source = feed.source();
            self.health.register(source);
            if let Some(previous) = tasks.insert(source, self.spawn(Arc::clone(feed))) {
                previous.abort();
            }
            info!(feed = %source, "Started {}", feed.name());
        }
    }

    /// Abort the feed's task, wait for it to finish, then spawn a fresh one
    /// with a reset health record. No-op once shutdown has begun.
    pub async fn restart(&self, source: FeedSource) -> bool {
        if self.is_shutting_down() {
            return false;
        }
        let Some(feed) = self.feed(source) else {
            warn!(feed = %source, "No feed registered, cannot restart");
            return false;
        };

        let previous = self.tasks.lock().remove(&source);
        if let Some(handle) = previous {
            handle.abort();
            if let Err(e) = handle.await {
                if e.is_panic() {
                    error!(feed = %source, "Feed task panicked: {}", e);
                }
            }
        }

        // Shutdown may have drained the task map while the old task was awaited
        let mut tasks = self.tasks.lock();
        if self.is_shutting_down() {
            return false;
        }
        self.health.reset(source);
        tasks.insert(source, self.spawn(feed));
        drop(tasks);

        self.restarts.fetch_add(1, Ordering::Relaxed);
        info!(feed = %source, "Feed restarted");
        true
    }

    /// Restart every feed that has gone quiet for too long or whose task has
    /// ended. Returns the restarted sources.
    pub async fn sweep(&self, now: Instant) -> Vec<FeedSource> {
        if self.is_shutting_down() {
            return Vec::new();
        }

        let stale_after = self.config.stale_after();
        let mut targets = self.health.stale_sources(now, stale_after);
        for source in &targets {
            self.health.apply(*source, FeedEvent::StaleTimeout);
            warn!(
                feed = %source,
                "No data for over {:?}, restarting",
                stale_after
            );
        }

        let finished: Vec<FeedSource> = self
            .tasks
            .lock()
            .iter()
            .filter(|(source, handle)| handle.is_finished() && !targets.contains(*source))
            .map(|(source, _)| *source)
            .collect();
        for source in finished {
            warn!(feed = %source, "Feed task ended unexpectedly, restarting");
            targets.push(source);
        }

        let mut restarted = Vec::with_capacity(targets.len());
        for source in targets {
            if self.restart(source).await {
                restarted.push(source);
            }
        }
        restarted
    }

    /// Periodic liveness sweep until shutdown
    pub async fn run_sweeps(&self, mut shutdown: ShutdownSignal) {
        let period = self.config.sweep_interval();
        let mut interval =
            tokio::time::interval_at(tokio::time::Instant::now() + period, period);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.sweep(Instant::now()).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || is_shutdown(&shutdown) {
                        break;
                    }
                }
            }
        }
    }

    /// Raise the shutdown flag without waiting
    pub fn request_shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Raise the shutdown flag and wait up to the grace period for every
    /// feed task; stragglers are aborted.
    pub async fn shutdown(&self) {
        self.request_shutdown();
        let deadline = tokio::time::Instant::now() + self.config.shutdown_grace();

        let tasks: Vec<(FeedSource, JoinHandle<()>)> = self.tasks.lock().drain().collect();
        for (source, mut handle) in tasks {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => info!(feed = %source, "Feed stopped"),
                Ok(Err(e)) => error!(feed = %source, "Feed task failed: {}", e),
                Err(_) => {
                    warn!(feed = %source, "Feed did not stop in time, aborting");
                    handle.abort();
                }
            }
        }
    }

    pub fn stats(&self) -> SupervisorStats {
        let tasks = self.tasks.lock();

        SupervisorStats {
            feed_count: self.feeds.len(),
            running: tasks.values().filter(|h| !h.is_finished()).count(),
            restarts: self.restarts.load(Ordering::Relaxed),
        }
    }
}

/// Supervisor statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorStats {
    pub feed_count: usize,
    pub running: usize,
    pub restarts: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct MockFeed {
        source: FeedSource,
        starts: Arc<AtomicUsize>,
        exit_immediately: bool,
    }

    #[async_trait::async_trait]
    impl PriceFeed for MockFeed {
        fn source(&self) -> FeedSource {
            self.source
        }

        fn name(&self) -> &'static str {
            "mock"
        }

        async fn run(&self, mut shutdown: ShutdownSignal) {
            self.starts.fetch_add(1, Ordering::SeqCst);
            if self.exit_immediately {
                return;
            }
            while !is_shutdown(&shutdown) {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
        }
    }

    fn mock(source: FeedSource, exit_immediately: bool) -> (Arc<MockFeed>, Arc<AtomicUsize>) {
        let starts = Arc::new(AtomicUsize::new(0));
        let feed = Arc::new(MockFeed {
            source,
            starts: Arc::clone(&starts),
            exit_immediately,
        });
        (feed, starts)
    }

    async fn wait_for(counter: &AtomicUsize, expected: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while counter.load(Ordering::SeqCst) < expected {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_only_stale_feed_is_restarted() {
        let health = Arc::new(HealthBoard::new());
        let mut supervisor = FeedSupervisor::new(SupervisorConfig::default(), Arc::clone(&health));

        let (exchange, exchange_starts) = mock(FeedSource::Exchange, false);
        let (pool, pool_starts) = mock(FeedSource::Pool, false);
        supervisor.register(exchange);
        supervisor.register(pool);
        supervisor.start_all();

        wait_for(&exchange_starts, 1).await;
        wait_for(&pool_starts, 1).await;

        let base = Instant::now();
        health.touch_at(FeedSource::Exchange, base);
        health.touch_at(FeedSource::Pool, base + Duration::from_secs(20));

        let restarted = supervisor.sweep(base + Duration::from_secs(31)).await;
        assert_eq!(restarted, vec![FeedSource::Exchange]);

        wait_for(&exchange_starts, 2).await;
        assert_eq!(pool_starts.load(Ordering::SeqCst), 1);

        let stats = supervisor.stats();
        assert_eq!(stats.feed_count, 2);
        assert_eq!(stats.running, 2);
        assert_eq!(stats.restarts, 1);

        supervisor.shutdown().await;
        assert_eq!(supervisor.stats().running, 0);
        assert!(supervisor.sweep(base + Duration::from_secs(600)).await.is_empty());
    }

    #[tokio::test]
    async fn test_finished_task_is_restarted() {
        let health = Arc::new(HealthBoard::new());
        let mut supervisor = FeedSupervisor::new(SupervisorConfig::default(), health);

        let (feed, starts) = mock(FeedSource::Pool, true);
        supervisor.register(feed);
        supervisor.start_all();
        wait_for(&starts, 1).await;

        // Let the task complete before sweeping
        tokio::time::sleep(Duration::from_millis(20)).await;
        let restarted = supervisor.sweep(Instant::now()).await;

        assert_eq!(restarted, vec![FeedSource::Pool]);
        wait_for(&starts, 2).await;
        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn test_restart_refused_after_shutdown() {
        let health = Arc::new(HealthBoard::new());
        let mut supervisor = FeedSupervisor::new(SupervisorConfig::default(), health);

        let (feed, starts) = mock(FeedSource::Exchange, false);
        supervisor.register(feed);
        supervisor.start_all();
        wait_for(&starts, 1).await;

        supervisor.shutdown().await;
        assert!(!supervisor.restart(FeedSource::Exchange).await);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(starts.load(Ordering::SeqCst), 1);
        let stats = supervisor.stats();
        assert_eq!(stats.running, 0);
        assert_eq!(stats.restarts, 0);
    }

    #[tokio::test]
    async fn test_shutdown_during_restart_spawns_nothing() {
        let health = Arc::new(HealthBoard::new());
        let mut supervisor = FeedSupervisor::new(SupervisorConfig::default(), health);

        let (feed, starts) = mock(FeedSource::Pool, false);
        supervisor.register(feed);
        supervisor.start_all();
        wait_for(&starts, 1).await;

        // Shutdown lands while restart is awaiting the aborted task
        let supervisor = Arc::new(supervisor);
        let restarting = tokio::spawn({
            let supervisor = Arc::clone(&supervisor);
            async move { supervisor.restart(FeedSource::Pool).await }
        });
        supervisor.shutdown().await;
        let restarted = restarting.await.unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        if restarted {
            // Restart won the race; the respawned task sees the flag and exits
            assert_eq!(starts.load(Ordering::SeqCst), 2);
        } else {
            assert_eq!(starts.load(Ordering::SeqCst), 1);
        }
        assert_eq!(supervisor.stats().running, 0);
    }

    #[tokio::test]
    async fn test_restart_unknown_source() {
        let supervisor =
            FeedSupervisor::new(SupervisorConfig::default(), Arc::new(HealthBoard::new()));
        assert!(!supervisor.restart(FeedSource::Exchange).await);
    }
}
