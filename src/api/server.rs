use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{
    dataset_window, drop_window, evaluate, health_check, list_datasets, stats, AppState,
};
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::notify::{LogEmailTransport, ReqwestHttpTransport};
use crate::storage::{
    AlertStore, CachedIntegrationStore, InMemoryAlertStore, InMemoryIntegrationStore,
    IntegrationStore,
};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// JSON array of alert records loaded at startup
    pub alerts_file: Option<PathBuf>,
    /// JSON array of integration records loaded at startup
    pub integrations_file: Option<PathBuf>,
    pub engine: EngineConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            alerts_file: None,
            integrations_file: None,
            engine: EngineConfig::default(),
        }
    }
}

/// Build the application router
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Scheduler entry point
        .route("/datasets/:dataset_id/samples", post(evaluate))
        // Windows
        .route("/datasets", get(list_datasets))
        .route(
            "/datasets/:dataset_id/window",
            get(dataset_window).delete(drop_window),
        )
        // Stats
        .route("/stats", get(stats))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Wire the engine with production transports and seed files
pub fn build_state(config: &ServerConfig) -> Result<Arc<AppState>, Box<dyn std::error::Error>> {
    let alerts = match &config.alerts_file {
        Some(path) => InMemoryAlertStore::from_json_file(path)?,
        None => InMemoryAlertStore::new(),
    };
    let integrations = match &config.integrations_file {
        Some(path) => InMemoryIntegrationStore::from_json_file(path)?,
        None => InMemoryIntegrationStore::new(),
    };
    tracing::info!(
        alerts = alerts.len(),
        integrations = integrations.len(),
        "Loaded seed records"
    );

    let alerts: Arc<dyn AlertStore> = Arc::new(alerts);
    let integrations: Arc<dyn IntegrationStore> = Arc::new(integrations);
    let integrations = Arc::new(CachedIntegrationStore::new(
        integrations,
        config.engine.integration_cache_ttl,
    ));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let engine = config.engine.build_engine(
        alerts,
        integrations.clone(),
        Arc::new(ReqwestHttpTransport::new()),
        Arc::new(LogEmailTransport),
        Arc::clone(&clock),
    );

    Ok(Arc::new(AppState {
        engine: Arc::new(engine),
        clock,
        integrations,
    }))
}

/// Run the HTTP server
pub async fn run_server(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let state = build_state(&config)?;
    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!("Starting Tripwire server on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Tripwire server stopped");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C signal handler");

    tracing::info!("Shutdown signal received");
}
