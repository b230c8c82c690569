//! pricewatch - exchange vs on-chain pool divergence monitor
//!
//! Main entry point

use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use pricewatch::{load_config, Monitor};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    info!("Starting pricewatch v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config()?;
    info!(
        "Exchange: {:?} {} | Pool: {:?} {} ({}/{})",
        config.exchange.mode,
        config.exchange.symbol,
        config.chain.mode,
        config.chain.pool_address,
        config.chain.base_token.symbol,
        config.chain.quote_token.symbol
    );

    let monitor = match Monitor::connect(config).await {
        Ok(monitor) => monitor,
        Err(e) => {
            error!("Startup failed: {:#}", e);
            return Err(e);
        }
    };

    info!("Press Ctrl+C to shutdown");
    monitor.run(shutdown_signal()).await?;

    info!("Shutdown complete");
    Ok(())
}

/// Completes on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C");
        }
        _ = terminate => {
            warn!("Received termination signal");
        }
    }
}
