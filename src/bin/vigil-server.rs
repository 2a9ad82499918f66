//! Aggregator binary.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vigil::config::ServerConfig;
use vigil::db::Store;
use vigil::engine::DecisionEngine;
use vigil::maintenance::Maintenance;
use vigil::web::Server;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("vigil=info".parse()?),
        )
        .init();

    let config_path =
        std::env::var("VIGIL_SERVER_CONFIG").unwrap_or_else(|_| "server.yaml".to_string());
    let cfg = ServerConfig::load(&config_path)?;
    tracing::info!(config = %config_path, db = %cfg.db_path, "vigil-server starting");

    let store = Arc::new(Store::new(&cfg.db_path)?);
    store.seed_checks(&cfg.checks)?;
    tracing::info!(checks = cfg.checks.len(), "check seed applied");

    let engine = Arc::new(DecisionEngine::new(store.clone()));

    let maintenance = Maintenance::new(store.clone(), cfg.retention_days);
    maintenance.start();

    let server = Server::new(cfg, store, engine);
    server.start().await?;

    Ok(())
}
