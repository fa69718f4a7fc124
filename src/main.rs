//! Tripwire Server
//!
//! Run with: cargo run
//!
//! Environment variables:
//! - TRIPWIRE_HOST: Bind address (default: 0.0.0.0)
//! - TRIPWIRE_PORT: Port number (default: 8080)
//! - TRIPWIRE_ALERTS_FILE: JSON array of alert records to load at startup
//! - TRIPWIRE_INTEGRATIONS_FILE: JSON array of integration records to load at startup
//! - RUST_LOG: Log level (default: tripwire=info,tower_http=info)
//!
//! Engine tunables (window size, retry policy, timeouts, app URL) are read
//! from the TRIPWIRE_* variables documented in `tripwire::config`.

use std::path::PathBuf;

use tripwire::api::{run_server, ServerConfig};
use tripwire::config::EngineConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tripwire=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let host = std::env::var("TRIPWIRE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("TRIPWIRE_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);
    let alerts_file = std::env::var("TRIPWIRE_ALERTS_FILE").ok().map(PathBuf::from);
    let integrations_file = std::env::var("TRIPWIRE_INTEGRATIONS_FILE")
        .ok()
        .map(PathBuf::from);

    let engine = EngineConfig::from_env()?;

    let config = ServerConfig {
        host,
        port,
        alerts_file,
        integrations_file,
        engine,
    };

    tracing::info!("Tripwire configuration:");
    tracing::info!("  Host: {}:{}", config.host, config.port);
    tracing::info!("  Window capacity: {} samples", config.engine.window_capacity);
    tracing::info!(
        "  Anomaly: {} samples, {} sigma",
        config.engine.evaluator.anomaly_min_samples,
        config.engine.evaluator.anomaly_sigma
    );
    tracing::info!(
        "  Delivery: {} retries, {:?} timeout",
        config.engine.retry.max_retries,
        config.engine.delivery_timeout
    );
    tracing::info!("  App URL: {}", config.engine.app_url);
    match (&config.alerts_file, &config.integrations_file) {
        (None, None) => tracing::info!("  Seed files: none (stores start empty)"),
        (alerts, integrations) => {
            if let Some(path) = alerts {
                tracing::info!("  Alerts: {}", path.display());
            }
            if let Some(path) = integrations {
                tracing::info!("  Integrations: {}", path.display());
            }
        }
    }

    run_server(config).await
}
