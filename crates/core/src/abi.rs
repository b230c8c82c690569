//! Pair contract ABI (the subset of the Uniswap V2 pair interface we use)

use alloy_primitives::B256;
use alloy_sol_types::{sol, SolCall, SolEvent};

sol! {
    interface IUniswapV2Pair {
        event Sync(uint112 reserve0, uint112 reserve1);

        function getReserves() external view returns (uint112 reserve0, uint112 reserve1, uint32 blockTimestampLast);

        function token0() external view returns (address);
    }
}

/// Topic hash of `Sync(uint112,uint112)`
pub fn sync_topic() -> B256 {
    IUniswapV2Pair::Sync::SIGNATURE_HASH
}

/// Calldata for `getReserves()`
pub fn get_reserves_calldata() -> Vec<u8> {
    IUniswapV2Pair::getReservesCall {}.abi_encode()
}

/// Calldata for `token0()`
pub fn token0_calldata() -> Vec<u8> {
    IUniswapV2Pair::token0Call {}.abi_encode()
}
