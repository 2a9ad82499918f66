//! HTTP client for the aggregator's probe API.

use std::time::Duration;

use serde_json::json;

use super::AgentError;
use crate::checker::CheckResult;
use crate::config::ProbeConfig;
use crate::db::CheckSpec;
use crate::SECRET_HEADER;

/// Bound on every call to the aggregator.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Authenticated client for one probe talking to one aggregator.
pub struct AgentClient {
    http: reqwest::Client,
    base_url: String,
    secret: String,
    probe_id: String,
}

impl AgentClient {
    pub fn new(cfg: &ProbeConfig) -> Result<Self, AgentError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: cfg.server.trim_end_matches('/').to_string(),
            secret: cfg.secret.clone(),
            probe_id: cfg.probe_id.clone(),
        })
    }

    pub fn probe_id(&self) -> &str {
        &self.probe_id
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Announce this probe to the aggregator. Required before any result is
    /// accepted; the aggregator answers 204.
    pub async fn register(&self, version: &str) -> Result<(), AgentError> {
        let resp = self
            .http
            .post(self.url("/probes/register"))
            .header(SECRET_HEADER, &self.secret)
            .json(&json!({ "probe_id": self.probe_id, "version": version }))
            .send()
            .await?;
        expect_no_content(resp, "/probes/register")
    }

    /// Fetch the check list. Specs that fail to parse (an unknown type, a
    /// missing field) are logged and skipped rather than poisoning the list.
    pub async fn fetch_checks(&self) -> Result<Vec<CheckSpec>, AgentError> {
        let resp = self
            .http
            .get(self.url("/probes/checks"))
            .header(SECRET_HEADER, &self.secret)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(AgentError::UnexpectedStatus {
                endpoint: "/probes/checks".to_string(),
                status: resp.status().as_u16(),
            });
        }

        let raw: Vec<serde_json::Value> = resp.json().await?;
        let mut checks = Vec::with_capacity(raw.len());
        for value in raw {
            match serde_json::from_value::<CheckSpec>(value.clone()) {
                Ok(check) => checks.push(check),
                Err(e) => tracing::warn!(error = %e, spec = %value, "skipping unparseable check"),
            }
        }
        Ok(checks)
    }

    /// Ship one observation.
    pub async fn post_result(&self, result: &CheckResult) -> Result<(), AgentError> {
        let resp = self
            .http
            .post(self.url("/results"))
            .header(SECRET_HEADER, &self.secret)
            .json(result)
            .send()
            .await?;
        expect_no_content(resp, "/results")
    }

    pub async fn send_heartbeat(&self) -> Result<(), AgentError> {
        let resp = self
            .http
            .post(self.url("/probes/heartbeat"))
            .header(SECRET_HEADER, &self.secret)
            .json(&json!({ "probe_id": self.probe_id }))
            .send()
            .await?;
        expect_no_content(resp, "/probes/heartbeat")
    }
}

fn expect_no_content(resp: reqwest::Response, endpoint: &str) -> Result<(), AgentError> {
    if resp.status() == reqwest::StatusCode::NO_CONTENT {
        Ok(())
    } else {
        Err(AgentError::UnexpectedStatus {
            endpoint: endpoint.to_string(),
            status: resp.status().as_u16(),
        })
    }
}
