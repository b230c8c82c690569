//! WebSocket connection helpers shared by the streaming adapters

use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use pricewatch_core::{KeepAliveConfig, PriceFeedError, PriceFeedResult};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Open a WebSocket connection, bounded by `timeout`
pub async fn connect(url: &str, timeout: Duration) -> PriceFeedResult<WsStream> {
    match tokio::time::timeout(timeout, connect_async(url)).await {
        Ok(Ok((stream, _response))) => Ok(stream),
        Ok(Err(e)) => Err(PriceFeedError::ConnectionFailed(e.to_string())),
        Err(_) => Err(PriceFeedError::Timeout),
    }
}

/// What to do on a keepalive tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepAliveAction {
    SendPing,
    Expired,
}

/// Client-side ping schedule. The connection is considered dead when nothing
/// at all has arrived for `ping_interval + ping_timeout`.
#[derive(Debug, Clone)]
pub struct KeepAlive {
    config: KeepAliveConfig,
    last_inbound: Instant,
}

impl KeepAlive {
    pub fn new(config: KeepAliveConfig, now: Instant) -> Self {
        Self {
            config,
            last_inbound: now,
        }
    }

    pub fn interval(&self) -> Duration {
        self.config.ping_interval
    }

    pub fn deadline(&self) -> Duration {
        self.config.ping_interval + self.config.ping_timeout
    }

    pub fn on_inbound(&mut self, now: Instant) {
        self.last_inbound = now;
    }

    pub fn on_tick(&self, now: Instant) -> KeepAliveAction {
        if now.saturating_duration_since(self.last_inbound) > self.deadline() {
            KeepAliveAction::Expired
        } else {
            KeepAliveAction::SendPing
        }
    }

    pub fn expired_error(&self) -> PriceFeedError {
        PriceFeedError::KeepaliveExpired(self.deadline())
    }
}

/// Interval whose first tick fires one period from now, not immediately
pub fn ping_timer(period: Duration) -> tokio::time::Interval {
    let mut timer = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    timer
}
