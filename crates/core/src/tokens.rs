//! Token definitions
//!
//! Decimals matter: reserves are raw integers scaled by each token's
//! decimals. On BSC both WBNB and USDT use 18 (unlike USDT on Ethereum).

use alloy_primitives::{address, Address};
use serde::{Deserialize, Serialize};

/// Token information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
}

impl Token {
    pub fn new(address: Address, symbol: &str, decimals: u8) -> Self {
        Self {
            address,
            symbol: symbol.to_string(),
            decimals,
        }
    }
}

/// Well-known BSC mainnet addresses
pub mod bsc {
    use super::*;

    pub const WBNB: Address = address!("bb4CdB9CBd36B01bD1cBaEBF2De08d9173bc095c");
    pub const USDT: Address = address!("55d398326f99059fF775485246999027B3197955");

    /// PancakeSwap v2 WBNB/USDT pair
    pub const PANCAKE_WBNB_USDT: Address = address!("16b9a82891338f9bA80E2D6970FddA79D1eb0daE");

    pub fn wbnb() -> Token {
        Token::new(WBNB, "WBNB", 18)
    }

    pub fn usdt() -> Token {
        Token::new(USDT, "USDT", 18)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bsc_tokens() {
        let wbnb = bsc::wbnb();
        assert_eq!(wbnb.decimals, 18);
        assert_eq!(
            wbnb.address,
            "0xbb4cdb9cbd36b01bd1cbaebf2de08d9173bc095c".parse::<Address>().unwrap()
        );
        assert_ne!(bsc::wbnb().address, bsc::usdt().address);
    }
}
