//! Centralized exchange price adapters: streaming ticker and REST polling

use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, trace, warn};

use pricewatch_core::{ExchangeConfig, FeedEvent, FeedSource, PriceFeedError, PriceFeedResult};

use crate::feeds::{is_shutdown, sleep_or_shutdown, FeedContext, PriceFeed, ShutdownSignal};
use crate::ws::{self, KeepAlive, KeepAliveAction};

const SOURCE: FeedSource = FeedSource::Exchange;

/// Subscription request for the ticker stream
#[derive(Debug, Serialize)]
struct SubscribeRequest {
    method: &'static str,
    params: Vec<String>,
    id: u64,
}

/// Ticker frame; only the close price matters
#[derive(Debug, Deserialize)]
struct TickerFrame {
    #[serde(rename = "c")]
    close: Option<String>,
}

/// REST ticker response
#[derive(Debug, Deserialize)]
struct TickerPrice {
    price: String,
}

/// Extract the close price from a stream frame.
///
/// `Ok(None)` for well-formed frames without a price (subscription acks,
/// error notices); `Err` for anything that is not a JSON object or carries
/// an unparsable price.
pub fn parse_ticker(text: &str) -> PriceFeedResult<Option<Decimal>> {
    let frame: TickerFrame = serde_json::from_str(text)
        .map_err(|e| PriceFeedError::InvalidMessage(format!("{e}: {text}")))?;

    frame.close.as_deref().map(parse_decimal).transpose()
}

/// Extract the price from a REST ticker body, `{"price": "<decimal>"}`
pub fn parse_rest_price(body: &str) -> PriceFeedResult<Decimal> {
    let ticker: TickerPrice = serde_json::from_str(body)
        .map_err(|e| PriceFeedError::InvalidMessage(format!("{e}: {body}")))?;
    parse_decimal(&ticker.price)
}

fn parse_decimal(s: &str) -> PriceFeedResult<Decimal> {
    Decimal::from_str(s).map_err(|e| PriceFeedError::InvalidMessage(format!("price {s:?}: {e}")))
}

/// Streaming ticker adapter
pub struct ExchangeStreamFeed {
    config: ExchangeConfig,
    ctx: FeedContext,
}

impl ExchangeStreamFeed {
    pub fn new(config: ExchangeConfig, ctx: FeedContext) -> Self {
        Self { config, ctx }
    }

    async fn connect_and_listen(&self, shutdown: &mut ShutdownSignal) -> PriceFeedResult<()> {
        info!(feed = %SOURCE, "Connecting to {}", self.config.ws_url);

        let stream = ws::connect(&self.config.ws_url, self.config.connect_timeout()).await?;
        let (mut write, mut read) = stream.split();

        self.ctx.mark(SOURCE, FeedEvent::Opened);
        info!(feed = %SOURCE, "Connection established");

        let subscribe = SubscribeRequest {
            method: "SUBSCRIBE",
            params: vec![self.config.ticker_channel()],
            id: 1,
        };
        let subscribe = serde_json::to_string(&subscribe)
            .map_err(|e| PriceFeedError::SubscriptionFailed(e.to_string()))?;
        write
            .send(Message::Text(subscribe))
            .await
            .map_err(|e| PriceFeedError::SubscriptionFailed(e.to_string()))?;

        let mut keepalive = KeepAlive::new(self.config.keepalive(), Instant::now());
        let mut ping = ws::ping_timer(keepalive.interval());

        loop {
            tokio::select! {
                frame = read.next() => {
                    let Some(frame) = frame else {
                        return Err(PriceFeedError::Disconnected);
                    };
                    let frame = frame.map_err(|e| PriceFeedError::ConnectionFailed(e.to_string()))?;

                    // Every inbound frame counts as liveness, whatever it contains
                    keepalive.on_inbound(Instant::now());
                    self.ctx.health.touch(SOURCE);

                    match frame {
                        Message::Text(text) => {
                            self.handle_text(&text);
                        }
                        Message::Ping(data) => {
                            trace!(feed = %SOURCE, "Ping received");
                            write
                                .send(Message::Pong(data))
                                .await
                                .map_err(|e| PriceFeedError::ConnectionFailed(e.to_string()))?;
                        }
                        Message::Pong(_) => trace!(feed = %SOURCE, "Pong received"),
                        Message::Close(reason) => {
                            info!(feed = %SOURCE, "Closed by server: {:?}", reason);
                            return Ok(());
                        }
                        Message::Binary(_) | Message::Frame(_) => {}
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

    fn handle_text(&self, text: &str) -> Option<Decimal> {
        match parse_ticker(text) {
            Ok(Some(price)) => {
                self.ctx.publish(SOURCE, price);
                debug!(feed = %SOURCE, "New price: {}", price);
                Some(price)
            }
            Ok(None) => {
                debug!(feed = %SOURCE, "Non-price frame: {}", text);
                None
            }
            Err(e) => {
                warn!(feed = %SOURCE, "Message processing error: {}", e);
                None
            }
        }
    }
}

#[async_trait::async_trait]
impl PriceFeed for ExchangeStreamFeed {
    fn source(&self) -> FeedSource {
        SOURCE
    }

    fn name(&self) -> &'static str {
        "exchange-stream"
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
        info!(feed = %SOURCE, "Exchange stream stopped");
    }
}

/// REST polling adapter
pub struct ExchangeRestFeed {
    config: ExchangeConfig,
    ctx: FeedContext,
    client: reqwest::Client,
}

impl ExchangeRestFeed {
    pub fn new(config: ExchangeConfig, ctx: FeedContext) -> PriceFeedResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.connect_timeout())
            .build()
            .map_err(|e| PriceFeedError::Http(e.to_string()))?;

        Ok(Self { config, ctx, client })
    }

    pub async fn fetch_price(&self) -> PriceFeedResult<Decimal> {
        let body = self
            .client
            .get(&self.config.rest_url)
            .send()
            .await
            .map_err(|e| PriceFeedError::Http(e.to_string()))?
            .error_for_status()
            .map_err(|e| PriceFeedError::Http(e.to_string()))?
            .text()
            .await
            .map_err(|e| PriceFeedError::Http(e.to_string()))?;

        parse_rest_price(&body)
    }
}

#[async_trait::async_trait]
impl PriceFeed for ExchangeRestFeed {
    fn source(&self) -> FeedSource {
        SOURCE
    }

    fn name(&self) -> &'static str {
        "exchange-rest"
    }

    async fn run(&self, mut shutdown: ShutdownSignal) {
        let interval = self.config.poll_interval();
        info!(feed = %SOURCE, "Polling {} every {:?}", self.config.rest_url, interval);

        loop {
            if is_shutdown(&shutdown) {
                break;
            }

            match self.fetch_price().await {
                Ok(price) => {
                    self.ctx.health.touch(SOURCE);
                    self.ctx.publish(SOURCE, price);
                    debug!(feed = %SOURCE, "New price: {}", price);
                }
                Err(e) => {
                    warn!(feed = %SOURCE, "Price request failed: {}", e);
                    self.ctx.mark(SOURCE, FeedEvent::Error);
                }
            }

            if sleep_or_shutdown(interval, &mut shutdown).await {
                break;
            }
        }

        self.ctx.mark(SOURCE, FeedEvent::Shutdown);
        info!(feed = %SOURCE, "Exchange poller stopped");
    }
}
