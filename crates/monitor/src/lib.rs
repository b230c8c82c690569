//! Exchange/pool price divergence monitor
//!
//! Wires the price feeds, the liveness supervisor and the detector into a
//! single process with cooperative shutdown.

pub mod orchestrator;
pub mod settings;

pub use orchestrator::{Monitor, MonitorReport};
pub use settings::load_config;
