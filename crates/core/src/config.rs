//! Configuration types

use alloy_primitives::Address;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::tokens::{bsc, Token};
use crate::{CoreError, CoreResult};

/// How the exchange price is obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeMode {
    /// Streaming ticker subscription
    Stream,
    /// Periodic REST ticker request
    Rest,
}

/// How the pool price is obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolMode {
    /// `eth_subscribe` to the pair's `Sync` logs
    Events,
    /// Periodic `getReserves()` call
    Polling,
}

/// When the detector runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMode {
    /// On every price update
    EventDriven,
    /// On a fixed interval
    Polling,
}

/// Exchange endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    pub mode: ExchangeMode,
    pub ws_url: String,
    pub rest_url: String,
    pub symbol: String,
    pub reconnect_delay_secs: u64,
    pub poll_interval_secs: u64,
    pub ping_interval_secs: u64,
    pub ping_timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            mode: ExchangeMode::Stream,
            ws_url: "wss://stream.binance.com:9443/ws/bnbusdt@ticker".to_string(),
            rest_url: "https://api.binance.com/api/v3/ticker/price?symbol=BNBUSDT".to_string(),
            symbol: "bnbusdt".to_string(),
            reconnect_delay_secs: 5,
            poll_interval_secs: 10,
            ping_interval_secs: 20,
            ping_timeout_secs: 10,
            connect_timeout_secs: 10,
        }
    }
}

impl ExchangeConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn keepalive(&self) -> KeepAliveConfig {
        KeepAliveConfig {
            ping_interval: Duration::from_secs(self.ping_interval_secs),
            ping_timeout: Duration::from_secs(self.ping_timeout_secs),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Ticker channel name, e.g. `bnbusdt@ticker`
    pub fn ticker_channel(&self) -> String {
        format!("{}@ticker", self.symbol.to_lowercase())
    }
}

/// Blockchain RPC and pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub mode: PoolMode,
    pub rpc_http_url: String,
    pub rpc_ws_url: String,
    pub pool_address: Address,
    pub base_token: Token,
    pub quote_token: Token,
    pub poll_interval_secs: u64,
    pub reconnect_delay_secs: u64,
    pub request_timeout_secs: u64,
    pub ping_interval_secs: u64,
    pub ping_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub subscribe_new_heads: bool,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            mode: PoolMode::Events,
            rpc_http_url: "https://bsc-dataseed.binance.org/".to_string(),
            rpc_ws_url: "wss://bsc.publicnode.com".to_string(),
            pool_address: bsc::PANCAKE_WBNB_USDT,
            base_token: bsc::wbnb(),
            quote_token: bsc::usdt(),
            poll_interval_secs: 10,
            reconnect_delay_secs: 5,
            request_timeout_secs: 10,
            ping_interval_secs: 20,
            ping_timeout_secs: 10,
            connect_timeout_secs: 10,
            subscribe_new_heads: true,
        }
    }
}

impl ChainConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn keepalive(&self) -> KeepAliveConfig {
        KeepAliveConfig {
            ping_interval: Duration::from_secs(self.ping_interval_secs),
            ping_timeout: Duration::from_secs(self.ping_timeout_secs),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// WebSocket keepalive timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepAliveConfig {
    pub ping_interval: Duration,
    pub ping_timeout: Duration,
}

/// Detection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub mode: DetectionMode,
    /// Minimum absolute divergence, in percent, that emits a signal
    pub threshold_pct: Decimal,
    /// Evaluation interval for polling mode
    pub interval_secs: u64,
    pub pair_label: String,
    /// Skip comparisons involving an older observation. Unset by default.
    pub max_price_age_secs: Option<u64>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            mode: DetectionMode::EventDriven,
            threshold_pct: Decimal::new(2, 1), // 0.2%
            interval_secs: 1,
            pair_label: "BNB".to_string(),
            max_price_age_secs: None,
        }
    }
}

impl DetectionConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn max_price_age(&self) -> Option<Duration> {
        self.max_price_age_secs.map(Duration::from_secs)
    }
}

/// Liveness supervision configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    pub sweep_interval_secs: u64,
    pub stale_after_secs: u64,
    pub shutdown_grace_secs: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 5,
            stale_after_secs: 30,
            shutdown_grace_secs: 5,
        }
    }
}

impl SupervisorConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// Complete monitor configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub exchange: ExchangeConfig,
    pub chain: ChainConfig,
    pub detection: DetectionConfig,
    pub supervisor: SupervisorConfig,
}

impl MonitorConfig {
    pub fn validate(&self) -> CoreResult<()> {
        let invalid = |msg: &str| Err(CoreError::InvalidConfig(msg.to_string()));

        match self.exchange.mode {
            ExchangeMode::Stream if self.exchange.ws_url.is_empty() => {
                return invalid("exchange.ws_url is required in stream mode")
            }
            ExchangeMode::Rest if self.exchange.rest_url.is_empty() => {
                return invalid("exchange.rest_url is required in rest mode")
            }
            ExchangeMode::Rest if self.exchange.poll_interval_secs == 0 => {
                return invalid("exchange.poll_interval_secs must be positive")
            }
            _ => {}
        }
        if self.exchange.reconnect_delay_secs == 0
            || self.exchange.ping_interval_secs == 0
            || self.exchange.ping_timeout_secs == 0
            || self.exchange.connect_timeout_secs == 0
        {
            return invalid("exchange connection intervals must be positive");
        }

        if self.chain.rpc_http_url.is_empty() {
            return invalid("chain.rpc_http_url is required");
        }
        match self.chain.mode {
            PoolMode::Events if self.chain.rpc_ws_url.is_empty() => {
                return invalid("chain.rpc_ws_url is required in events mode")
            }
            PoolMode::Polling if self.chain.poll_interval_secs == 0 => {
                return invalid("chain.poll_interval_secs must be positive")
            }
            _ => {}
        }
        if self.chain.reconnect_delay_secs == 0
            || self.chain.request_timeout_secs == 0
            || self.chain.ping_interval_secs == 0
            || self.chain.ping_timeout_secs == 0
            || self.chain.connect_timeout_secs == 0
        {
            return invalid("chain connection intervals must be positive");
        }

        if self.chain.base_token.address == self.chain.quote_token.address {
            return invalid("chain.base_token and chain.quote_token must differ");
        }
        if self.chain.base_token.decimals > 36 || self.chain.quote_token.decimals > 36 {
            return invalid("token decimals above 36 are not supported");
        }

        if self.detection.threshold_pct.is_sign_negative() {
            return invalid("detection.threshold_pct must not be negative");
        }
        if self.detection.mode == DetectionMode::Polling && self.detection.interval_secs == 0 {
            return invalid("detection.interval_secs must be positive");
        }

        if self.supervisor.sweep_interval_secs == 0 || self.supervisor.stale_after_secs == 0 {
            return invalid("supervisor intervals must be positive");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = MonitorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.exchange.reconnect_delay(), Duration::from_secs(5));
        assert_eq!(config.supervisor.stale_after(), Duration::from_secs(30));
        assert_eq!(config.detection.max_price_age(), None);
        assert_eq!(config.exchange.ticker_channel(), "bnbusdt@ticker");
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: MonitorConfig = serde_json::from_str(
            r#"{
                "detection": { "threshold_pct": "0.5", "mode": "polling" },
                "chain": { "mode": "polling" }
            }"#,
        )
        .unwrap();

        assert_eq!(config.detection.threshold_pct, Decimal::new(5, 1));
        assert_eq!(config.detection.mode, DetectionMode::Polling);
        assert_eq!(config.chain.mode, PoolMode::Polling);
        assert_eq!(config.chain.pool_address, bsc::PANCAKE_WBNB_USDT);
        assert_eq!(config.supervisor.sweep_interval_secs, 5);
    }

    #[test]
    fn test_validation_failures() {
        let mut config = MonitorConfig::default();
        config.chain.quote_token = config.chain.base_token.clone();
        assert!(matches!(config.validate(), Err(CoreError::InvalidConfig(_))));

        let mut config = MonitorConfig::default();
        config.detection.threshold_pct = Decimal::new(-1, 1);
        assert!(config.validate().is_err());

        let mut config = MonitorConfig::default();
        config.supervisor.stale_after_secs = 0;
        assert!(config.validate().is_err());

        let mut config = MonitorConfig::default();
        config.exchange.mode = ExchangeMode::Rest;
        config.exchange.rest_url.clear();
        assert!(config.validate().is_err());

        let zeroed: [fn(&mut MonitorConfig); 9] = [
            |c| c.exchange.reconnect_delay_secs = 0,
            |c| c.exchange.ping_interval_secs = 0,
            |c| c.exchange.ping_timeout_secs = 0,
            |c| c.exchange.connect_timeout_secs = 0,
            |c| c.chain.reconnect_delay_secs = 0,
            |c| c.chain.request_timeout_secs = 0,
            |c| c.chain.ping_interval_secs = 0,
            |c| c.chain.ping_timeout_secs = 0,
            |c| c.chain.connect_timeout_secs = 0,
        ];
        for zero in zeroed {
            let mut config = MonitorConfig::default();
            zero(&mut config);
            assert!(matches!(config.validate(), Err(CoreError::InvalidConfig(_))));
        }
    }
}
