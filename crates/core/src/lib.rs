//! Core types and utilities for the exchange/pool price monitor
//!
//! This crate provides shared types used across all components:
//! - Feed sources, price observations and feed health
//! - Token and pool-reserve arithmetic
//! - Divergence and arbitrage signal types
//! - Configuration and errors

pub mod abi;
pub mod types;
pub mod tokens;
pub mod pools;
pub mod signals;
pub mod config;
pub mod errors;

pub use types::*;
pub use tokens::*;
pub use pools::*;
pub use signals::*;
pub use config::*;
pub use errors::*;
