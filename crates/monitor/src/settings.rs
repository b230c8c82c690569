//! Layered configuration: defaults, optional TOML file, environment

use anyhow::Context;
use config::{Config, Environment, File};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::info;

use pricewatch_core::MonitorConfig;

/// Path of an explicit config file; a missing file is then an error
pub const CONFIG_PATH_ENV: &str = "PRICEWATCH_CONFIG";

/// Looked up in the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "pricewatch.toml";

const ENV_PREFIX: &str = "PRICEWATCH";
const ENV_SEPARATOR: &str = "__";

/// Load configuration from the process environment.
///
/// `PRICEWATCH__DETECTION__THRESHOLD_PCT=0.3` overrides
/// `detection.threshold_pct` from the file, which overrides the default.
pub fn load_config() -> anyhow::Result<MonitorConfig> {
    let (path, required) = match std::env::var(CONFIG_PATH_ENV) {
        Ok(path) => (PathBuf::from(path), true),
        Err(_) => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
    };

    load_layered(Some(&path), required, None)
}

/// Build the configuration from an optional file and either the process
/// environment or, when `env` is given, that map instead.
pub fn load_layered(
    file: Option<&Path>,
    required: bool,
    env: Option<HashMap<String, String>>,
) -> anyhow::Result<MonitorConfig> {
    let mut builder = Config::builder();

    if let Some(path) = file {
        if path.exists() {
            info!("Loading configuration from {}", path.display());
        }
        builder = builder.add_source(File::from(path).required(required));
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator(ENV_SEPARATOR)
            .separator(ENV_SEPARATOR)
            .try_parsing(true)
            .source(env),
    );

    let config: MonitorConfig = builder
        .build()
        .context("Failed to read configuration")?
        .try_deserialize()
        .context("Invalid configuration")?;

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pricewatch_core::{bsc, DetectionMode, ExchangeMode, PoolMode};
    use rust_decimal::Decimal;

    fn env(pairs: &[(&str, &str)]) -> Option<HashMap<String, String>> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    fn temp_file(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("{}-{}.toml", name, std::process::id()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_defaults_without_sources() {
        let config = load_layered(None, false, env(&[])).unwrap();

        assert_eq!(config.exchange.mode, ExchangeMode::Stream);
        assert_eq!(config.chain.mode, PoolMode::Events);
        assert_eq!(config.chain.pool_address, bsc::PANCAKE_WBNB_USDT);
        assert_eq!(config.detection.threshold_pct, Decimal::new(2, 1));
    }

    #[test]
    fn test_env_overrides() {
        let config = load_layered(
            None,
            false,
            env(&[
                ("PRICEWATCH__DETECTION__THRESHOLD_PCT", "0.3"),
                ("PRICEWATCH__DETECTION__MODE", "polling"),
                ("PRICEWATCH__CHAIN__MODE", "polling"),
                ("PRICEWATCH__SUPERVISOR__STALE_AFTER_SECS", "45"),
                ("UNRELATED", "1"),
            ]),
        )
        .unwrap();

        assert_eq!(config.detection.threshold_pct, Decimal::new(3, 1));
        assert_eq!(config.detection.mode, DetectionMode::Polling);
        assert_eq!(config.chain.mode, PoolMode::Polling);
        assert_eq!(config.supervisor.stale_after_secs, 45);
    }

    #[test]
    fn test_file_then_env_layering() {
        let path = temp_file(
            "pricewatch-layering",
            r#"
                [exchange]
                mode = "rest"
                poll_interval_secs = 3

                [detection]
                threshold_pct = 0.5
                pair_label = "WBNB"
            "#,
        );

        let config = load_layered(
            Some(&path),
            true,
            env(&[("PRICEWATCH__DETECTION__THRESHOLD_PCT", "0.25")]),
        )
        .unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.exchange.mode, ExchangeMode::Rest);
        assert_eq!(config.exchange.poll_interval_secs, 3);
        assert_eq!(config.detection.pair_label, "WBNB");
        assert_eq!(config.detection.threshold_pct, Decimal::new(25, 2));
    }

    #[test]
    fn test_missing_required_file() {
        let path = std::env::temp_dir().join("pricewatch-does-not-exist.toml");
        assert!(load_layered(Some(&path), true, env(&[])).is_err());
        assert!(load_layered(Some(&path), false, env(&[])).is_ok());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let result = load_layered(
            None,
            false,
            env(&[("PRICEWATCH__SUPERVISOR__STALE_AFTER_SECS", "0")]),
        );
        assert!(result.is_err());
    }
}
