//! Per-feed liveness records

use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::debug;

use pricewatch_core::{ConnectionState, FeedEvent, FeedHealth, FeedSource};

/// Health of every feed. Each adapter writes only its own entry.
#[derive(Debug, Default)]
pub struct HealthBoard {
    feeds: DashMap<FeedSource, FeedHealth>,
}

impl HealthBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `source` as connecting, with a fresh timestamp
    pub fn register(&self, source: FeedSource) {
        self.feeds.insert(source, FeedHealth::new(Instant::now()));
    }

    /// Apply a state machine event. `Message` also refreshes the timestamp.
    pub fn apply(&self, source: FeedSource, event: FeedEvent) -> ConnectionState {
        let now = Instant::now();
        let mut entry = self
            .feeds
            .entry(source)
            .or_insert_with(|| FeedHealth::new(now));

        let previous = entry.state;
        entry.state = previous.on(event);
        if event == FeedEvent::Message {
            entry.last_message_at = now;
            entry.messages += 1;
        }

        if previous != entry.state {
            debug!(feed = %source, "{} -> {} on {:?}", previous, entry.state, event);
        }
        entry.state
    }

    /// Record an inbound frame
    pub fn touch(&self, source: FeedSource) {
        self.apply(source, FeedEvent::Message);
    }

    /// Record an inbound frame observed at a specific instant
    pub fn touch_at(&self, source: FeedSource, at: Instant) {
        let mut entry = self.feeds.entry(source).or_insert_with(|| FeedHealth::new(at));
        entry.last_message_at = at;
        entry.messages += 1;
        entry.state = entry.state.on(FeedEvent::Message);
    }

    /// Back to `Connecting` with a fresh timestamp, as after a restart
    pub fn reset(&self, source: FeedSource) {
        let now = Instant::now();
        let mut entry = self.feeds.entry(source).or_insert_with(|| FeedHealth::new(now));
        entry.last_message_at = now;
        entry.state = entry.state.on(FeedEvent::Connect);
    }

    pub fn get(&self, source: FeedSource) -> Option<FeedHealth> {
        self.feeds.get(&source).map(|r| *r.value())
    }

    pub fn state(&self, source: FeedSource) -> Option<ConnectionState> {
        self.get(source).map(|h| h.state)
    }

    /// Feeds silent for longer than `stale_after`, excluding closed ones
    pub fn stale_sources(&self, now: Instant, stale_after: Duration) -> Vec<FeedSource> {
        let mut stale: Vec<FeedSource> = self
            .feeds
            .iter()
            .filter(|e| e.value().state != ConnectionState::Closed)
            .filter(|e| e.value().is_stale(now, stale_after))
            .map(|e| *e.key())
            .collect();
        stale.sort_by_key(|s| s.name());
        stale
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_opens_and_touches() {
        let board = HealthBoard::new();
        board.register(FeedSource::Exchange);
        assert_eq!(board.state(FeedSource::Exchange), Some(ConnectionState::Connecting));

        board.touch(FeedSource::Exchange);
        let health = board.get(FeedSource::Exchange).unwrap();
        assert_eq!(health.state, ConnectionState::Open);
        assert_eq!(health.messages, 1);
    }

    #[test]
    fn test_stale_detection_is_per_feed() {
        let board = HealthBoard::new();
        let base = Instant::now();
        board.touch_at(FeedSource::Exchange, base);
        board.touch_at(FeedSource::Pool, base + Duration::from_secs(20));

        let now = base + Duration::from_secs(31);
        assert_eq!(
            board.stale_sources(now, Duration::from_secs(30)),
            vec![FeedSource::Exchange]
        );

        board.reset(FeedSource::Exchange);
        assert_eq!(board.state(FeedSource::Exchange), Some(ConnectionState::Connecting));
        assert!(board.stale_sources(Instant::now(), Duration::from_secs(30)).is_empty());
    }

    #[test]
    fn test_closed_feed_is_never_stale() {
        let board = HealthBoard::new();
        let base = Instant::now();
        board.touch_at(FeedSource::Pool, base);
        board.apply(FeedSource::Pool, FeedEvent::Shutdown);

        assert!(board
            .stale_sources(base + Duration::from_secs(60), Duration::from_secs(30))
            .is_empty());
    }
}
