//! HTTP request handlers.

use axum::{
    extract::{rejection::JsonRejection, Query, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::checker::CheckResult;
use crate::SECRET_HEADER;

/// A probe is shown online while its last heartbeat is this recent.
const ONLINE_WINDOW_SECS: i64 = 90;

const DEFAULT_INCIDENT_LIMIT: usize = 50;

// ============================================================================
// Middleware
// ============================================================================

/// Reject requests missing the correct shared-secret header.
pub async fn require_secret(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let presented = request
        .headers()
        .get(SECRET_HEADER)
        .and_then(|value| value.to_str().ok());
    if presented != Some(state.config.secret.as_str()) {
        return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
    }
    next.run(request).await
}

// ============================================================================
// Probe API
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub probe_id: String,
    #[serde(default)]
    pub version: String,
}

pub async fn handle_probe_register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(json) => json,
        Err(_) => return (StatusCode::BAD_REQUEST, "bad request").into_response(),
    };
    if req.probe_id.is_empty() {
        return (StatusCode::BAD_REQUEST, "missing probe_id").into_response();
    }

    match state.store.register_probe(&req.probe_id, &req.version) {
        Ok(()) => {
            tracing::info!(probe_id = %req.probe_id, version = %req.version, "registered probe");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => {
            tracing::error!(probe_id = %req.probe_id, error = %e, "failed to register probe");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct HeartbeatRequest {
    pub probe_id: String,
}

pub async fn handle_heartbeat(
    State(state): State<AppState>,
    payload: Result<Json<HeartbeatRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(json) => json,
        Err(_) => return (StatusCode::BAD_REQUEST, "bad request").into_response(),
    };
    if req.probe_id.is_empty() {
        return (StatusCode::BAD_REQUEST, "missing probe_id").into_response();
    }

    match state.store.touch_probe(&req.probe_id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            tracing::error!(probe_id = %req.probe_id, error = %e, "failed to update heartbeat");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// The full check list, served to probes for scheduling.
pub async fn handle_probe_checks(State(state): State<AppState>) -> Response {
    match state.store.list_checks() {
        Ok(checks) => Json(checks).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to list checks");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Ingest a check result: authenticate the probe, append to the log, then
/// hand the check to the decision engine. The engine never fails the ingest.
pub async fn handle_result(
    State(state): State<AppState>,
    payload: Result<Json<CheckResult>, JsonRejection>,
) -> Response {
    let Json(result) = match payload {
        Ok(json) => json,
        Err(rejection) => {
            tracing::warn!(error = %rejection, "ingest: malformed result body");
            return (StatusCode::BAD_REQUEST, "bad request").into_response();
        }
    };

    match state.store.is_probe_registered(&result.probe_id) {
        Ok(true) => {}
        Ok(false) => {
            tracing::warn!(probe_id = %result.probe_id, "ingest: rejected unregistered probe");
            return (StatusCode::FORBIDDEN, "probe not registered").into_response();
        }
        Err(e) => {
            tracing::error!(probe_id = %result.probe_id, error = %e, "ingest: registration lookup failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
        }
    }

    tracing::debug!(
        check_id = %result.check_id,
        probe_id = %result.probe_id,
        up = result.up,
        "ingest: received result"
    );

    if let Err(e) = state.store.save_result(&result) {
        tracing::error!(check_id = %result.check_id, error = %e, "ingest: failed to save result");
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }

    // An accepted result is as good as a heartbeat.
    if let Err(e) = state.store.touch_probe(&result.probe_id) {
        tracing::error!(probe_id = %result.probe_id, error = %e, "ingest: failed to refresh last_seen");
    }

    state.engine.evaluate(&result.check_id).await;

    StatusCode::NO_CONTENT.into_response()
}

// ============================================================================
// Public status surface
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct CheckStatusJson {
    pub check_id: String,
    pub target: String,
    /// "up" or "down".
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incident_since: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProbeStatusJson {
    pub probe_id: String,
    pub online: bool,
    pub last_seen_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub checks: Vec<CheckStatusJson>,
    pub probes: Vec<ProbeStatusJson>,
}

/// The public status page model: every check with at least one result, plus
/// every known probe and whether it is currently reporting.
pub async fn handle_status(State(state): State<AppState>) -> Response {
    let statuses = match state.store.check_statuses() {
        Ok(statuses) => statuses,
        Err(e) => {
            tracing::error!(error = %e, "status: failed to query check statuses");
            return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
        }
    };
    let probe_statuses = match state.store.all_probe_statuses() {
        Ok(statuses) => statuses,
        Err(e) => {
            tracing::error!(error = %e, "status: failed to query probe statuses");
            return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
        }
    };

    let now = Utc::now();
    let checks = statuses
        .into_iter()
        .map(|cs| {
            let down = !cs.up || cs.incident_since.is_some();
            CheckStatusJson {
                check_id: cs.check_id,
                target: cs.target,
                status: if down { "down" } else { "up" }.to_string(),
                incident_since: cs.incident_since,
            }
        })
        .collect();
    let probes = probe_statuses
        .into_iter()
        .map(|ps| ProbeStatusJson {
            probe_id: ps.probe_id,
            online: now - ps.last_seen_at < ChronoDuration::seconds(ONLINE_WINDOW_SECS),
            last_seen_at: ps.last_seen_at,
        })
        .collect();

    Json(StatusResponse { checks, probes }).into_response()
}

#[derive(Debug, Deserialize)]
pub struct IncidentsQuery {
    #[serde(default = "default_incident_limit")]
    pub limit: usize,
}

fn default_incident_limit() -> usize {
    DEFAULT_INCIDENT_LIMIT
}

/// Recent incident history, newest first.
pub async fn handle_incidents(
    State(state): State<AppState>,
    Query(query): Query<IncidentsQuery>,
) -> Response {
    match state.store.list_incidents(query.limit) {
        Ok(incidents) => Json(incidents).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to list incidents");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}
