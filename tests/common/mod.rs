//! Shared helpers for the integration tests.
//!
//! Each test gets a real store on a temp file and the full router; requests
//! go through `tower::ServiceExt::oneshot` so the whole ingest → decision →
//! notification path is exercised in-process.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tempfile::NamedTempFile;
use tower::ServiceExt;

use vigil::checker::CheckKind;
use vigil::config::ServerConfig;
use vigil::db::{CheckSpec, Store};
use vigil::engine::DecisionEngine;
use vigil::web::{build_router, AppState};
use vigil::SECRET_HEADER;

pub const SECRET: &str = "integration-secret";

pub struct TestApp {
    pub router: Router,
    pub store: Arc<Store>,
    _db: NamedTempFile,
}

/// Build an aggregator over a fresh temp database, seeded with `checks`.
pub fn spawn_app(checks: Vec<CheckSpec>) -> TestApp {
    let db = NamedTempFile::new().unwrap();
    let store = Arc::new(Store::new(db.path()).unwrap());
    store.seed_checks(&checks).unwrap();

    let config = ServerConfig {
        secret: SECRET.to_string(),
        checks,
        listen_addr: "127.0.0.1:0".to_string(),
        db_path: db.path().display().to_string(),
        retention_days: 30,
    };
    let engine = Arc::new(DecisionEngine::new(store.clone()));
    let state = AppState {
        config: Arc::new(config),
        store: store.clone(),
        engine,
    };

    TestApp {
        router: build_router(state),
        store,
        _db: db,
    }
}

pub fn http_check(id: &str, webhook: &str) -> CheckSpec {
    CheckSpec {
        id: id.to_string(),
        kind: CheckKind::Http,
        target: "https://example.com".to_string(),
        webhook: webhook.to_string(),
        interval_seconds: 30,
    }
}

pub async fn post_json(
    app: &TestApp,
    path: &str,
    secret: Option<&str>,
    body: &serde_json::Value,
) -> StatusCode {
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json");
    if let Some(secret) = secret {
        builder = builder.header(SECRET_HEADER, secret);
    }
    let request = builder
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap();
    app.router.clone().oneshot(request).await.unwrap().status()
}

pub async fn get_json(
    app: &TestApp,
    path: &str,
    secret: Option<&str>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method("GET").uri(path);
    if let Some(secret) = secret {
        builder = builder.header(SECRET_HEADER, secret);
    }
    let response = app
        .router
        .clone()
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    // Error responses carry plain text; map anything unparseable to null.
    let value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, value)
}

pub async fn register_probe(app: &TestApp, probe_id: &str) {
    let status = post_json(
        app,
        "/probes/register",
        Some(SECRET),
        &serde_json::json!({ "probe_id": probe_id, "version": "test" }),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

pub fn result_body(check_id: &str, probe_id: &str, up: bool) -> serde_json::Value {
    serde_json::json!({
        "check_id": check_id,
        "probe_id": probe_id,
        "type": "http",
        "target": "https://example.com",
        "up": up,
        "latency_ms": 12,
        "error": if up { "" } else { "unexpected status code: 503" },
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })
}

/// Ship one observation through the ingest endpoint.
pub async fn post_result(app: &TestApp, check_id: &str, probe_id: &str, up: bool) -> StatusCode {
    post_json(
        app,
        "/results",
        Some(SECRET),
        &result_body(check_id, probe_id, up),
    )
    .await
}

pub type Hooks = Arc<Mutex<Vec<serde_json::Value>>>;

/// A local webhook receiver recording every payload it is sent.
pub async fn webhook_receiver() -> (String, Hooks) {
    use axum::extract::State;
    use axum::routing::post;
    use axum::Json;

    let hooks: Hooks = Arc::new(Mutex::new(Vec::new()));
    let state = hooks.clone();
    let app = Router::new()
        .route(
            "/hook",
            post(
                |State(hooks): State<Hooks>, Json(payload): Json<serde_json::Value>| async move {
                    hooks.lock().unwrap().push(payload);
                    StatusCode::OK
                },
            ),
        )
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/hook"), hooks)
}
