//! Constant-product pool reserves and spot price derivation

use alloy_primitives::{hex, Address, U256};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{CoreError, CoreResult, Token};

/// Fractional digits carried through the fixed-point price division
pub const PRICE_SCALE: u32 = 18;

const WORD: usize = 32;

/// Raw reserves as stored by the pair (token0, token1 order)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairReserves {
    pub reserve0: U256,
    pub reserve1: U256,
}

impl PairReserves {
    pub fn new(reserve0: U256, reserve1: U256) -> Self {
        Self { reserve0, reserve1 }
    }

    /// Decode from ABI words: first word = reserve0, second = reserve1.
    /// Trailing words (e.g. `blockTimestampLast` from `getReserves`) are ignored.
    pub fn decode(data: &[u8]) -> CoreResult<Self> {
        if data.len() < 2 * WORD {
            return Err(CoreError::Decode(format!(
                "reserve payload too short: {} bytes",
                data.len()
            )));
        }

        Ok(Self {
            reserve0: U256::from_be_slice(&data[..WORD]),
            reserve1: U256::from_be_slice(&data[WORD..2 * WORD]),
        })
    }

    /// Decode a `0x`-prefixed hex payload (log `data` field or `eth_call` result)
    pub fn decode_hex(data: &str) -> CoreResult<Self> {
        Self::decode(&decode_hex(data)?)
    }
}

/// Decode an address returned in a single ABI word
pub fn decode_address_word(data: &[u8]) -> CoreResult<Address> {
    if data.len() < WORD {
        return Err(CoreError::Decode(format!(
            "address word too short: {} bytes",
            data.len()
        )));
    }
    Ok(Address::from_slice(&data[WORD - 20..WORD]))
}

pub fn decode_hex(data: &str) -> CoreResult<Vec<u8>> {
    let trimmed = data.strip_prefix("0x").unwrap_or(data);
    hex::decode(trimmed).map_err(|e| CoreError::Decode(format!("invalid hex: {e}")))
}

/// Which side of the pair holds the base asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolOrientation {
    BaseIsToken0,
    BaseIsToken1,
}

impl PoolOrientation {
    pub fn resolve(token0: Address, base: Address, quote: Address) -> CoreResult<Self> {
        if token0 == base {
            Ok(PoolOrientation::BaseIsToken0)
        } else if token0 == quote {
            Ok(PoolOrientation::BaseIsToken1)
        } else {
            Err(CoreError::PoolTokenMismatch { token0, base, quote })
        }
    }

    /// Returns `(base_reserve, quote_reserve)`
    pub fn split(&self, reserves: &PairReserves) -> (U256, U256) {
        match self {
            PoolOrientation::BaseIsToken0 => (reserves.reserve0, reserves.reserve1),
            PoolOrientation::BaseIsToken1 => (reserves.reserve1, reserves.reserve0),
        }
    }
}

/// Quote-per-base spot price from decimal-normalized reserves.
///
/// price = (quote / 10^quote_dec) / (base / 10^base_dec), evaluated in
/// 256-bit integers with `PRICE_SCALE` fractional digits.
pub fn spot_price(
    base_reserve: U256,
    base_decimals: u8,
    quote_reserve: U256,
    quote_decimals: u8,
) -> CoreResult<Decimal> {
    if base_reserve.is_zero() {
        return Err(CoreError::ZeroReserve);
    }

    let overflow = || CoreError::PriceOverflow(format!("{quote_reserve} / {base_reserve}"));

    let numerator = quote_reserve
        .checked_mul(pow10(base_decimals as u32 + PRICE_SCALE).ok_or_else(overflow)?)
        .ok_or_else(overflow)?;
    let denominator = base_reserve
        .checked_mul(pow10(quote_decimals as u32).ok_or_else(overflow)?)
        .ok_or_else(overflow)?;

    let scaled = numerator / denominator;
    let mantissa = u128::try_from(scaled)
        .ok()
        .and_then(|v| i128::try_from(v).ok())
        .ok_or_else(overflow)?;

    Decimal::try_from_i128_with_scale(mantissa, PRICE_SCALE)
        .map(|d| d.normalize())
        .map_err(|_| overflow())
}

/// Spot price of `base` in units of `quote` for a pair with the given orientation
pub fn pair_price(
    reserves: &PairReserves,
    orientation: PoolOrientation,
    base: &Token,
    quote: &Token,
) -> CoreResult<Decimal> {
    let (base_reserve, quote_reserve) = orientation.split(reserves);
    spot_price(base_reserve, base.decimals, quote_reserve, quote.decimals)
}

fn pow10(exp: u32) -> Option<U256> {
    U256::from(10u64).checked_pow(U256::from(exp))
}
