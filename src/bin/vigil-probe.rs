//! Probe agent binary.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vigil::agent;
use vigil::config::ProbeConfig;

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
        std::env::var("VIGIL_PROBE_CONFIG").unwrap_or_else(|_| "probe.yaml".to_string());
    let cfg = ProbeConfig::load(&config_path)?;
    tracing::info!(probe_id = %cfg.probe_id, server = %cfg.server, "vigil-probe starting");

    agent::run(cfg).await?;

    Ok(())
}
