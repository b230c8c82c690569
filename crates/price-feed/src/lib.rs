//! Price ingestion for the divergence monitor
//!
//! Features:
//! - Exchange ticker over WebSocket, or REST polling
//! - Pool reserves from `Sync` log subscriptions, or `getReserves()` polling
//! - Lock-free latest-price state shared with the detector
//! - Per-feed health records and a supervisor that restarts silent feeds

pub mod exchange;
pub mod feeds;
pub mod health;
pub mod pool;
pub mod rpc;
pub mod state;
pub mod supervisor;
pub mod ws;

#[cfg(test)]
pub(crate) mod testing;

pub use exchange::{ExchangeRestFeed, ExchangeStreamFeed};
pub use feeds::{FeedContext, PriceFeed, PriceUpdate, ShutdownSignal};
pub use health::HealthBoard;
pub use pool::{PoolEventFeed, PoolPollingFeed};
pub use rpc::{PairContract, ReserveResolver, RpcClient};
pub use state::{PriceSnapshot, PriceState, PriceStateStats};
pub use supervisor::{FeedSupervisor, SupervisorStats};
