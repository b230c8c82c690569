//! Divergence and arbitrage signal types

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of the implied trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    /// Exchange is priced higher: buy on the pool, sell on the exchange
    BuyPoolSellExchange,
    /// Pool is priced higher (or equal): buy on the exchange, sell on the pool
    BuyExchangeSellPool,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::BuyPoolSellExchange => f.write_str("Buy on pool, sell on exchange"),
            Direction::BuyExchangeSellPool => f.write_str("Buy on exchange, sell on pool"),
        }
    }
}

/// Signed divergence between the two current prices, relative to the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Divergence {
    pub exchange_price: Decimal,
    pub pool_price: Decimal,
    pub diff_pct: Decimal,
}

impl Divergence {
    /// `(exchange - pool) / pool * 100`; `None` when the pool price is zero
    pub fn compute(exchange_price: Decimal, pool_price: Decimal) -> Option<Self> {
        if pool_price.is_zero() {
            return None;
        }

        let diff_pct = (exchange_price - pool_price)
            .checked_div(pool_price)?
            .checked_mul(Decimal::ONE_HUNDRED)?;

        Some(Self {
            exchange_price,
            pool_price,
            diff_pct,
        })
    }

    pub fn direction(&self) -> Direction {
        if self.diff_pct > Decimal::ZERO {
            Direction::BuyPoolSellExchange
        } else {
            Direction::BuyExchangeSellPool
        }
    }

    /// Signal if `|diff_pct| >= threshold_pct`
    pub fn signal(&self, threshold_pct: Decimal) -> Option<ArbitrageSignal> {
        if self.diff_pct.abs() >= threshold_pct {
            Some(ArbitrageSignal {
                exchange_price: self.exchange_price,
                pool_price: self.pool_price,
                diff_pct: self.diff_pct,
                direction: self.direction(),
            })
        } else {
            None
        }
    }

    /// One-line report, e.g. `Exchange: 652.000 | Pool: 650.000 | Diff: 0.31%`
    pub fn summary(&self) -> String {
        format!(
            "Exchange: {:.3} | Pool: {:.3} | Diff: {:.2}%",
            self.exchange_price, self.pool_price, self.diff_pct
        )
    }
}

/// Emitted when divergence crosses the threshold. Ephemeral, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArbitrageSignal {
    pub exchange_price: Decimal,
    pub pool_price: Decimal,
    pub diff_pct: Decimal,
    pub direction: Direction,
}

impl fmt::Display for ArbitrageSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (+{:.2}%)", self.direction, self.diff_pct.abs())
    }
}
