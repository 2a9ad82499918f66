//! Aggregator HTTP surface.

mod handlers;

pub use handlers::*;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::config::ServerConfig;
use crate::db::Store;
use crate::engine::DecisionEngine;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub store: Arc<Store>,
    pub engine: Arc<DecisionEngine>,
}

/// The aggregator's HTTP server.
pub struct Server {
    state: AppState,
}

impl Server {
    pub fn new(config: ServerConfig, store: Arc<Store>, engine: Arc<DecisionEngine>) -> Self {
        Self {
            state: AppState {
                config: Arc::new(config),
                store,
                engine,
            },
        }
    }

    /// Bind the configured address and serve until the process exits.
    pub async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = self.state.config.listen_addr.clone();
        let listener = tokio::net::TcpListener::bind(addr.as_str()).await?;
        tracing::info!("aggregator listening on {addr}");
        axum::serve(listener, build_router(self.state.clone())).await?;
        Ok(())
    }
}

/// Build the router with all routes. Public routes are open; probe routes sit
/// behind the shared-secret middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let probe_routes = Router::new()
        .route("/probes/register", post(handlers::handle_probe_register))
        .route("/probes/heartbeat", post(handlers::handle_heartbeat))
        .route("/probes/checks", get(handlers::handle_probe_checks))
        .route("/results", post(handlers::handle_result))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            handlers::require_secret,
        ));

    Router::new()
        .route("/status", get(handlers::handle_status))
        .route("/incidents", get(handlers::handle_incidents))
        .merge(probe_routes)
        .layer(cors)
        .with_state(state)
}
