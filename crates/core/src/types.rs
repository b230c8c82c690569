//! Core type definitions

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

/// The two independent price sources being compared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedSource {
    /// Centralized exchange ticker
    Exchange,
    /// On-chain liquidity pool
    Pool,
}

impl FeedSource {
    pub const ALL: [FeedSource; 2] = [FeedSource::Exchange, FeedSource::Pool];

    pub fn name(&self) -> &'static str {
        match self {
            FeedSource::Exchange => "exchange",
            FeedSource::Pool => "pool",
        }
    }
}

impl fmt::Display for FeedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A single price reading from one feed. Superseded, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceObservation {
    pub value: Decimal,
    pub source: FeedSource,
    pub observed_at: DateTime<Utc>,
}

impl PriceObservation {
    pub fn new(source: FeedSource, value: Decimal) -> Self {
        Self::at(source, value, Utc::now())
    }

    pub fn at(source: FeedSource, value: Decimal, observed_at: DateTime<Utc>) -> Self {
        Self {
            value,
            source,
            observed_at,
        }
    }

    /// Age relative to `now`; zero if `now` precedes the observation
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.observed_at).to_std().unwrap_or_default()
    }
}

/// Connection lifecycle of a feed adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connecting,
    Open,
    Reconnecting,
    Closed,
}

/// Triggers that move a feed between connection states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedEvent {
    /// A connection attempt (or poll cycle) is starting
    Connect,
    /// Transport established and subscribed
    Opened,
    /// Any inbound frame, keepalive or successful poll
    Message,
    /// Transport or RPC failure
    Error,
    /// Peer closed the connection
    Disconnected,
    /// Liveness supervisor found the feed silent
    StaleTimeout,
    /// Cooperative shutdown
    Shutdown,
}

impl ConnectionState {
    /// Pure transition function. `Closed` is terminal for everything
    /// except an explicit `Connect`.
    pub fn on(self, event: FeedEvent) -> ConnectionState {
        match (self, event) {
            (_, FeedEvent::Shutdown) => ConnectionState::Closed,
            (_, FeedEvent::Connect) => ConnectionState::Connecting,
            (ConnectionState::Closed, _) => ConnectionState::Closed,
            (_, FeedEvent::Opened | FeedEvent::Message) => ConnectionState::Open,
            (_, FeedEvent::Error | FeedEvent::Disconnected | FeedEvent::StaleTimeout) => {
                ConnectionState::Reconnecting
            }
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Per-feed liveness record
#[derive(Debug, Clone, Copy)]
pub struct FeedHealth {
    pub last_message_at: Instant,
    pub state: ConnectionState,
    pub messages: u64,
}

impl FeedHealth {
    pub fn new(now: Instant) -> Self {
        Self {
            last_message_at: now,
            state: ConnectionState::Connecting,
            messages: 0,
        }
    }

    pub fn silence(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_message_at)
    }

    pub fn is_stale(&self, now: Instant, stale_after: Duration) -> bool {
        self.silence(now) > stale_after
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_transitions() {
        use ConnectionState::*;

        assert_eq!(Connecting.on(FeedEvent::Opened), Open);
        assert_eq!(Connecting.on(FeedEvent::Message), Open);
        assert_eq!(Open.on(FeedEvent::Error), Reconnecting);
        assert_eq!(Open.on(FeedEvent::Disconnected), Reconnecting);
        assert_eq!(Open.on(FeedEvent::StaleTimeout), Reconnecting);
        assert_eq!(Reconnecting.on(FeedEvent::Connect), Connecting);
        assert_eq!(Open.on(FeedEvent::Shutdown), Closed);
        assert_eq!(Closed.on(FeedEvent::Message), Closed);
        assert_eq!(Closed.on(FeedEvent::Error), Closed);
        assert_eq!(Closed.on(FeedEvent::Connect), Connecting);
    }

    #[test]
    fn test_health_staleness() {
        let start = Instant::now();
        let health = FeedHealth::new(start);

        assert!(!health.is_stale(start + Duration::from_secs(30), Duration::from_secs(30)));
        assert!(health.is_stale(start + Duration::from_secs(31), Duration::from_secs(30)));
        // Clock readings before the last message never count as silence
        assert_eq!(health.silence(start), Duration::ZERO);
    }

    #[test]
    fn test_observation_age() {
        let at = Utc::now();
        let obs = PriceObservation::at(FeedSource::Pool, Decimal::new(650, 0), at);

        assert_eq!(obs.age(at + chrono::Duration::seconds(5)), Duration::from_secs(5));
        assert_eq!(obs.age(at - chrono::Duration::seconds(5)), Duration::ZERO);
    }
}
