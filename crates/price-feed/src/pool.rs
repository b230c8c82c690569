//! On-chain pool price adapters: `Sync` log subscription and reserve polling

use alloy_primitives::{Address, B256};
use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, trace, warn};

use pricewatch_core::{
    abi, ChainConfig, FeedEvent, FeedSource, PairReserves, PoolOrientation, PriceFeedError,
    PriceFeedResult,
};

use crate::feeds::{is_shutdown, sleep_or_shutdown, FeedContext, PriceFeed, ShutdownSignal};
use crate::rpc::{PairContract, ReserveResolver, RpcClient};
use crate::ws::{self, KeepAlive, KeepAliveAction};

const SOURCE: FeedSource = FeedSource::Pool;

const LOGS_SUBSCRIPTION_ID: u64 = 1;
const HEADS_SUBSCRIPTION_ID: u64 = 2;

#[derive(Debug, Deserialize)]
struct Envelope {
    id: Option<u64>,
    result: Option<Value>,
    error: Option<Value>,
    params: Option<Notification>,
}

#[derive(Debug, Deserialize)]
struct Notification {
    subscription: String,
    result: Value,
}

#[derive(Debug, Deserialize)]
struct LogEntry {
    address: Address,
    topics: Vec<B256>,
    data: String,
    #[serde(default)]
    removed: bool,
}

/// A decoded frame from the node's subscription socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolFrame {
    /// Response to one of our `eth_subscribe` requests
    Ack { id: u64, subscription: Option<String> },
    /// `eth_subscribe` request refused by the node
    Rejected { id: Option<u64>, reason: String },
    /// `Sync` log for the watched pair
    Reserves(PairReserves),
    /// New block header, used only as a liveness signal
    Heartbeat,
    /// Anything else: other contracts, other events, reorged logs
    Ignored,
}

/// Classify a subscription frame. Only well-formed `Sync` logs from `pool`
/// yield reserves.
pub fn parse_frame(text: &str, pool: Address) -> PriceFeedResult<PoolFrame> {
    let envelope: Envelope = serde_json::from_str(text)
        .map_err(|e| PriceFeedError::InvalidMessage(format!("{e}: {text}")))?;

    if let Some(error) = envelope.error {
        return Ok(PoolFrame::Rejected {
            id: envelope.id,
            reason: error.to_string(),
        });
    }

    if let Some(notification) = envelope.params {
        let result = notification.result;

        if result.get("topics").is_some() {
            let log: LogEntry = serde_json::from_value(result)
                .map_err(|e| PriceFeedError::InvalidMessage(format!("log entry: {e}")))?;

            if log.removed || log.address != pool || log.topics.first() != Some(&abi::sync_topic()) {
                trace!(feed = %SOURCE, "Ignoring log on {}", notification.subscription);
                return Ok(PoolFrame::Ignored);
            }
            return Ok(PoolFrame::Reserves(PairReserves::decode_hex(&log.data)?));
        }

        if result.get("parentHash").is_some() {
            return Ok(PoolFrame::Heartbeat);
        }

        return Ok(PoolFrame::Ignored);
    }

    match envelope.id {
        Some(id) => Ok(PoolFrame::Ack {
            id,
            subscription: envelope.result.and_then(|v| v.as_str().map(str::to_string)),
        }),
        None => Ok(PoolFrame::Ignored),
    }
}

fn subscribe_logs(pool: Address) -> String {
    json!({
        "jsonrpc": "2.0",
        "id": LOGS_SUBSCRIPTION_ID,
        "method": "eth_subscribe",
        "params": ["logs", {
            "address": pool.to_string(),
            "topics": [abi::sync_topic().to_string()],
        }],
    })
    .to_string()
}

fn subscribe_new_heads() -> String {
    json!({
        "jsonrpc": "2.0",
        "id": HEADS_SUBSCRIPTION_ID,
        "method": "eth_subscribe",
        "params": ["newHeads"],
    })
    .to_string()
}

fn build_resolver(config: &ChainConfig) -> PriceFeedResult<ReserveResolver> {
    let rpc = RpcClient::new(config.rpc_http_url.clone(), config.request_timeout())?;
    Ok(ReserveResolver::new(
        PairContract::new(rpc, config.pool_address),
        config.base_token.clone(),
        config.quote_token.clone(),
    ))
}

/// Push-based pool adapter over a WebSocket RPC endpoint
pub struct PoolEventFeed {
    config: ChainConfig,
    resolver: ReserveResolver,
    ctx: FeedContext,
}

impl PoolEventFeed {
    pub fn new(config: ChainConfig, ctx: FeedContext) -> PriceFeedResult<Self> {
        let resolver = build_resolver(&config)?;
        Ok(Self::with_resolver(config, resolver, ctx))
    }

    pub fn with_resolver(config: ChainConfig, resolver: ReserveResolver, ctx: FeedContext) -> Self {
        Self {
            config,
            resolver,
            ctx,
        }
    }

    async fn connect_and_listen(&self, shutdown: &mut ShutdownSignal) -> PriceFeedResult<()> {
        // Token ordering must be known before the first log can be priced
        let orientation = self.resolver.orientation().await?;

        info!(feed = %SOURCE, "Connecting to {}", self.config.rpc_ws_url);
        let stream = ws::connect(&self.config.rpc_ws_url, self.config.connect_timeout()).await?;
        let (mut write, mut read) = stream.split();

        self.ctx.mark(SOURCE, FeedEvent::Opened);
        info!(feed = %SOURCE, "Connection established");

        write
            .send(Message::Text(subscribe_logs(self.config.pool_address)))
            .await
            .map_err(|e| PriceFeedError::SubscriptionFailed(e.to_string()))?;
        if self.config.subscribe_new_heads {
            write
                .send(Message::Text(subscribe_new_heads()))
                .await
                .map_err(|e| PriceFeedError::SubscriptionFailed(e.to_string()))?;
        }

        let mut keepalive = KeepAlive::new(self.config.keepalive(), Instant::now());
        let mut ping = ws::ping_timer(keepalive.interval());

        loop {
            tokio::select! {
                frame = read.next() => {
                    let Some(frame) = frame else {
                        return Err(PriceFeedError::Disconnected);
                    };
                    let frame = frame.map_err(|e| PriceFeedError::ConnectionFailed(e.to_string()))?;

                    keepalive.on_inbound(Instant::now());
                    self.ctx.health.touch(SOURCE);

                    match frame {
                        Message::Text(text) => match self.handle_text(&text, orientation) {
                            Err(e @ PriceFeedError::SubscriptionFailed(_)) => return Err(e),
                            Err(e) => warn!(feed = %SOURCE, "Message processing error: {}", e),
                            Ok(_) => {}
                        },
                        Message::Ping(data) => {
                            write
                                .send(Message::Pong(data))
                                .await
                                .map_err(|e| PriceFeedError::ConnectionFailed(e.to_string()))?;
                        }
                        Message::Close(reason) => {
                            info!(feed = %SOURCE, "Closed by server: {:?}", reason);
                            return Ok(());
                        }
                        Message::Pong(_) | Message::Binary(_) | Message::Frame(_) => {}
                    }
                }
                _ = ping.tick() => {
                    match keepalive.on_tick(Instant::now()) {
                        KeepAliveAction::Expired => return Err(keepalive.expired_error()),
                        KeepAliveAction::SendPing => {
                            write
                                .send(Message::Ping(Vec::new()))
                                .await
                                .map_err(|e| PriceFeedError::ConnectionFailed(e.to_string()))?;
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || is_shutdown(shutdown) {
                        if let Err(e) = write.send(Message::Close(None)).await {
                            debug!(feed = %SOURCE, "Close frame not sent: {}", e);
                        }
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Process one text frame, publishing a price for each `Sync` log.
    /// A refused log subscription is returned as `SubscriptionFailed`.
    pub fn handle_text(
        &self,
        text: &str,
        orientation: PoolOrientation,
    ) -> PriceFeedResult<Option<Decimal>> {
        match parse_frame(text, self.config.pool_address)? {
            PoolFrame::Reserves(reserves) => {
                let price = self.resolver.price_with(&reserves, orientation)?;
                self.ctx.publish(SOURCE, price);
                debug!(feed = %SOURCE, "New price: {}", price);
                Ok(Some(price))
            }
            PoolFrame::Ack { id, subscription } => {
                info!(feed = %SOURCE, "Subscription {} active: {:?}", id, subscription);
                Ok(None)
            }
            PoolFrame::Rejected { id, reason } => {
                if id == Some(HEADS_SUBSCRIPTION_ID) {
                    warn!(feed = %SOURCE, "newHeads subscription refused: {}", reason);
                    Ok(None)
                } else {
                    Err(PriceFeedError::SubscriptionFailed(reason))
                }
            }
            PoolFrame::Heartbeat => {
                trace!(feed = %SOURCE, "New block header");
                Ok(None)
            }
            PoolFrame::Ignored => Ok(None),
        }
    }
}

#[async_trait::async_trait]
impl PriceFeed for PoolEventFeed {
    fn source(&self) -> FeedSource {
        SOURCE
    }

    fn name(&self) -> &'static str {
        "pool-events"
    }

    async fn run(&self, mut shutdown: ShutdownSignal) {
        let delay = self.config.reconnect_delay();

        loop {
            if is_shutdown(&shutdown) {
                break;
            }

            self.ctx.mark(SOURCE, FeedEvent::Connect);
            match self.connect_and_listen(&mut shutdown).await {
                Ok(()) => info!(feed = %SOURCE, "Connection closed"),
                Err(e) => {
                    error!(feed = %SOURCE, "Connection error: {}", e);
                    self.ctx.mark(SOURCE, FeedEvent::Error);
                }
            }

            if is_shutdown(&shutdown) {
                break;
            }

            self.ctx.mark(SOURCE, FeedEvent::Disconnected);
            warn!(feed = %SOURCE, "Reconnecting in {:?}", delay);
            if sleep_or_shutdown(delay, &mut shutdown).await {
                break;
            }
        }

        self.ctx.mark(SOURCE, FeedEvent::Shutdown);
        info!(feed = %SOURCE, "Pool event listener stopped");
    }
}

/// Pull-based pool adapter calling `getReserves()` on an interval
pub struct PoolPollingFeed {
    config: ChainConfig,
    resolver: ReserveResolver,
    ctx: FeedContext,
}

impl PoolPollingFeed {
    pub fn new(config: ChainConfig, ctx: FeedContext) -> PriceFeedResult<Self> {
        let resolver = build_resolver(&config)?;
        Ok(Self::with_resolver(config, resolver, ctx))
    }

    pub fn with_resolver(config: ChainConfig, resolver: ReserveResolver, ctx: FeedContext) -> Self {
        Self {
            config,
            resolver,
            ctx,
        }
    }

    /// One poll: liveness check, then reserves
    pub async fn poll_once(&self) -> PriceFeedResult<Decimal> {
        if !self.resolver.contract().rpc().is_connected().await {
            return Err(PriceFeedError::ConnectionFailed(format!(
                "RPC node {} unreachable",
                self.resolver.contract().rpc().url()
            )));
        }

        let price = self.resolver.fetch_price().await?;
        self.ctx.health.touch(SOURCE);
        self.ctx.publish(SOURCE, price);
        Ok(price)
    }
}

#[async_trait::async_trait]
impl PriceFeed for PoolPollingFeed {
    fn source(&self) -> FeedSource {
        SOURCE
    }

    fn name(&self) -> &'static str {
        "pool-polling"
    }

    async fn run(&self, mut shutdown: ShutdownSignal) {
        let interval = self.config.poll_interval();
        info!(
            feed = %SOURCE,
            "Polling reserves of {} every {:?}",
            self.config.pool_address,
            interval
        );

        loop {
            if is_shutdown(&shutdown) {
                break;
            }

            match self.poll_once().await {
                Ok(price) => debug!(feed = %SOURCE, "New price: {}", price),
                Err(e) => {
                    warn!(feed = %SOURCE, "Reserve poll failed: {}", e);
                    self.ctx.mark(SOURCE, FeedEvent::Error);
                }
            }

            if sleep_or_shutdown(interval, &mut shutdown).await {
                break;
            }
        }

        self.ctx.mark(SOURCE, FeedEvent::Shutdown);
        info!(feed = %SOURCE, "Pool poller stopped");
    }
}
