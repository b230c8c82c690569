//! Exchange/pool divergence detection
//!
//! Features:
//! - Signed percentage divergence with direction classification
//! - Event-driven or fixed-interval evaluation
//! - Optional freshness gate on cached observations

pub mod detector;
pub mod scanner;

pub use detector::{ArbitrageDetector, Detection, Skip};
pub use scanner::{ArbitrageScanner, ScannerStats};
