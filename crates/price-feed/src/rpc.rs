//! Minimal JSON-RPC client and the pair contract calls built on it

use alloy_primitives::{hex, Address};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use pricewatch_core::{
    abi, decode_address_word, decode_hex, pair_price, PairReserves, PoolOrientation,
    PriceFeedError, PriceFeedResult, Token,
};

/// JSON-RPC response envelope
#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    result: Option<Value>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// HTTP JSON-RPC client
#[derive(Debug)]
pub struct RpcClient {
    client: Client,
    url: String,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> PriceFeedResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PriceFeedError::Http(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn request(&self, method: &str, params: Value) -> PriceFeedResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response: JsonRpcResponse = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| PriceFeedError::Http(e.to_string()))?
            .error_for_status()
            .map_err(|e| PriceFeedError::Http(e.to_string()))?
            .json()
            .await
            .map_err(|e| PriceFeedError::InvalidMessage(e.to_string()))?;

        into_result(method, response)
    }

    pub async fn chain_id(&self) -> PriceFeedResult<u64> {
        let value = self.request("eth_chainId", json!([])).await?;
        parse_quantity(&value)
    }

    /// Liveness check used before each poll
    pub async fn is_connected(&self) -> bool {
        match self.chain_id().await {
            Ok(_) => true,
            Err(e) => {
                debug!(feed = "pool", "RPC liveness check failed: {}", e);
                false
            }
        }
    }

    pub async fn eth_call(&self, to: Address, data: &[u8]) -> PriceFeedResult<Vec<u8>> {
        let params = json!([
            {
                "to": to.to_string(),
                "data": format!("0x{}", hex::encode(data)),
            },
            "latest"
        ]);

        let value = self.request("eth_call", params).await?;
        let encoded = value
            .as_str()
            .ok_or_else(|| PriceFeedError::InvalidMessage(format!("eth_call result: {value}")))?;

        Ok(decode_hex(encoded)?)
    }
}

fn into_result(method: &str, response: JsonRpcResponse) -> PriceFeedResult<Value> {
    if let Some(err) = response.error {
        return Err(PriceFeedError::Rpc(format!(
            "{method}: {} (code {})",
            err.message, err.code
        )));
    }

    response
        .result
        .ok_or_else(|| PriceFeedError::Rpc(format!("{method}: no result in response")))
}

/// Parse a hex quantity such as `"0x38"`
pub fn parse_quantity(value: &Value) -> PriceFeedResult<u64> {
    let s = value
        .as_str()
        .ok_or_else(|| PriceFeedError::InvalidMessage(format!("expected quantity, got {value}")))?;
    let digits = s.strip_prefix("0x").unwrap_or(s);

    u64::from_str_radix(digits, 16)
        .map_err(|e| PriceFeedError::InvalidMessage(format!("bad quantity {s}: {e}")))
}

/// Read-only calls on a constant-product pair
#[derive(Debug)]
pub struct PairContract {
    rpc: RpcClient,
    address: Address,
}

impl PairContract {
    pub fn new(rpc: RpcClient, address: Address) -> Self {
        Self { rpc, address }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn rpc(&self) -> &RpcClient {
        &self.rpc
    }

    pub async fn get_reserves(&self) -> PriceFeedResult<PairReserves> {
        let data = self.rpc.eth_call(self.address, &abi::get_reserves_calldata()).await?;
        Ok(PairReserves::decode(&data)?)
    }

    pub async fn token0(&self) -> PriceFeedResult<Address> {
        let data = self.rpc.eth_call(self.address, &abi::token0_calldata()).await?;
        Ok(decode_address_word(&data)?)
    }
}

/// Turns raw reserves into a base-asset price. The pair's token ordering is
/// queried once and cached.
#[derive(Debug)]
pub struct ReserveResolver {
    contract: PairContract,
    base: Token,
    quote: Token,
    orientation: OnceCell<PoolOrientation>,
}

impl ReserveResolver {
    pub fn new(contract: PairContract, base: Token, quote: Token) -> Self {
        Self {
            contract,
            base,
            quote,
            orientation: OnceCell::new(),
        }
    }

    /// Resolver whose ordering is already known; no `token0()` call is made
    pub fn with_orientation(
        contract: PairContract,
        base: Token,
        quote: Token,
        orientation: PoolOrientation,
    ) -> Self {
        Self {
            contract,
            base,
            quote,
            orientation: OnceCell::new_with(Some(orientation)),
        }
    }

    pub fn contract(&self) -> &PairContract {
        &self.contract
    }

    pub async fn orientation(&self) -> PriceFeedResult<PoolOrientation> {
        let orientation = self
            .orientation
            .get_or_try_init(|| async {
                let token0 = self.contract.token0().await?;
                let orientation =
                    PoolOrientation::resolve(token0, self.base.address, self.quote.address)?;
                info!(
                    feed = "pool",
                    "Pool {} token0 is {}, using {:?}",
                    self.contract.address(),
                    token0,
                    orientation
                );
                Ok::<_, PriceFeedError>(orientation)
            })
            .await?;

        Ok(*orientation)
    }

    /// Cached orientation, if it has been resolved
    pub fn cached_orientation(&self) -> Option<PoolOrientation> {
        self.orientation.get().copied()
    }

    pub fn price_with(
        &self,
        reserves: &PairReserves,
        orientation: PoolOrientation,
    ) -> PriceFeedResult<Decimal> {
        Ok(pair_price(reserves, orientation, &self.base, &self.quote)?)
    }

    pub async fn price(&self, reserves: &PairReserves) -> PriceFeedResult<Decimal> {
        let orientation = self.orientation().await?;
        self.price_with(reserves, orientation)
    }

    /// Synchronous `getReserves()` round trip and price
    pub async fn fetch_price(&self) -> PriceFeedResult<Decimal> {
        let reserves = self.contract.get_reserves().await?;
        self.price(&reserves).await
    }
}
