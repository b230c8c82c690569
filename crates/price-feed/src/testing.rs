//! Loopback JSON-RPC node answering `eth_chainId` and the pair's
//! `token0()`/`getReserves()` calls

use alloy_primitives::{hex, Address, U256};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use pricewatch_core::abi;

struct Pair {
    token0: Address,
    reserve0: U256,
    reserve1: U256,
    token0_calls: AtomicUsize,
    reserve_calls: AtomicUsize,
}

pub struct PairNode {
    url: String,
    pair: Arc<Pair>,
}

impl PairNode {
    pub async fn start(token0: Address, reserve0: U256, reserve1: U256) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let pair = Arc::new(Pair {
            token0,
            reserve0,
            reserve1,
            token0_calls: AtomicUsize::new(0),
            reserve_calls: AtomicUsize::new(0),
        });

        tokio::spawn({
            let pair = Arc::clone(&pair);
            async move {
                while let Ok((tcp, _)) = listener.accept().await {
                    tokio::spawn(serve(tcp, Arc::clone(&pair)));
                }
            }
        });

        Self { url, pair }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn token0_calls(&self) -> usize {
        self.pair.token0_calls.load(Ordering::SeqCst)
    }

    pub fn reserve_calls(&self) -> usize {
        self.pair.reserve_calls.load(Ordering::SeqCst)
    }
}

/// One request per connection; `connection: close` stops the client from
/// reusing it
async fn serve(mut tcp: TcpStream, pair: Arc<Pair>) {
    let Some(body) = read_body(&mut tcp).await else {
        return;
    };
    let request: Value = serde_json::from_slice(&body).unwrap();
    let reply = answer(&pair, &request).to_string();

    let response = format!(
        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
        reply.len(),
        reply
    );
    let _ = tcp.write_all(response.as_bytes()).await;
    let _ = tcp.shutdown().await;
}

async fn read_body(tcp: &mut TcpStream) -> Option<Vec<u8>> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
            let len = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            let start = end + 4;
            if buf.len() >= start + len {
                return Some(buf[start..start + len].to_vec());
            }
        }

        let n = tcp.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

fn answer(pair: &Pair, request: &Value) -> Value {
    let id = request["id"].clone();
    let result = match request["method"].as_str() {
        Some("eth_chainId") => json!("0x38"),
        Some("eth_call") => {
            let data = request["params"][0]["data"].as_str().unwrap_or_default();
            let token0_call = format!("0x{}", hex::encode(&abi::token0_calldata()));
            let reserves_call = format!("0x{}", hex::encode(&abi::get_reserves_calldata()));

            if data == token0_call {
                pair.token0_calls.fetch_add(1, Ordering::SeqCst);
                json!(format!("0x{}{}", "00".repeat(12), hex::encode(pair.token0.as_slice())))
            } else if data == reserves_call {
                pair.reserve_calls.fetch_add(1, Ordering::SeqCst);
                json!(format!(
                    "0x{}{}{}",
                    hex::encode(pair.reserve0.to_be_bytes::<32>()),
                    hex::encode(pair.reserve1.to_be_bytes::<32>()),
                    hex::encode(U256::ZERO.to_be_bytes::<32>())
                ))
            } else {
                return json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": { "code": -32000, "message": "execution reverted" }
                });
            }
        }
        _ => {
            return json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": { "code": -32601, "message": "method not found" }
            });
        }
    };

    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}
