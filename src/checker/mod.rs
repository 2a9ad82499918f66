//! Liveness checkers.
//!
//! Each checker turns `(check_id, probe_id, target)` into a [`CheckResult`].
//! Checkers never fail: network errors, timeouts, and unexpected responses
//! all come back as a result with `up = false` and a human-readable error.

mod dns;
mod http;
mod tcp;

pub use dns::check_dns;
pub use http::check_http;
pub use tcp::check_tcp;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-attempt deadline shared by all checkers.
pub const CHECK_DEADLINE: Duration = Duration::from_secs(10);

/// The kind of liveness check to perform against a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckKind {
    Http,
    Tcp,
    Dns,
}

impl CheckKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckKind::Http => "http",
            CheckKind::Tcp => "tcp",
            CheckKind::Dns => "dns",
        }
    }
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http" => Ok(CheckKind::Http),
            "tcp" => Ok(CheckKind::Tcp),
            "dns" => Ok(CheckKind::Dns),
            other => Err(format!("unknown check type: {other}")),
        }
    }
}

/// A single observation shipped from a probe to the aggregator.
///
/// Immutable once written; `timestamp` is probe-assigned at call time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub check_id: String,
    pub probe_id: String,
    #[serde(rename = "type")]
    pub kind: CheckKind,
    pub target: String,
    pub up: bool,
    pub latency_ms: u64,
    /// Empty when `up` is true.
    #[serde(default)]
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

impl CheckResult {
    fn new(check_id: &str, probe_id: &str, kind: CheckKind, target: &str) -> Self {
        Self {
            check_id: check_id.to_string(),
            probe_id: probe_id.to_string(),
            kind,
            target: target.to_string(),
            up: false,
            latency_ms: 0,
            error: String::new(),
            timestamp: Utc::now(),
        }
    }
}

/// Run the checker matching `kind` and return its observation.
pub async fn run_check(kind: CheckKind, check_id: &str, probe_id: &str, target: &str) -> CheckResult {
    match kind {
        CheckKind::Http => check_http(check_id, probe_id, target).await,
        CheckKind::Tcp => check_tcp(check_id, probe_id, target).await,
        CheckKind::Dns => check_dns(check_id, probe_id, target).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_kind_round_trips_through_str() {
        for kind in [CheckKind::Http, CheckKind::Tcp, CheckKind::Dns] {
            assert_eq!(kind.as_str().parse::<CheckKind>().unwrap(), kind);
        }
        assert!("icmp".parse::<CheckKind>().is_err());
    }

    #[test]
    fn check_result_wire_format() {
        let result = CheckResult {
            check_id: "check-1".to_string(),
            probe_id: "probe-a".to_string(),
            kind: CheckKind::Http,
            target: "https://example.com".to_string(),
            up: true,
            latency_ms: 42,
            error: String::new(),
            timestamp: "2026-01-02T03:04:05Z".parse().unwrap(),
        };

        let json: serde_json::Value = serde_json::to_value(&result).unwrap();
        assert_eq!(json["type"], "http");
        assert_eq!(json["latency_ms"], 42);
        assert_eq!(json["timestamp"], "2026-01-02T03:04:05Z");

        let back: CheckResult = serde_json::from_value(json).unwrap();
        assert_eq!(back.kind, CheckKind::Http);
        assert!(back.up);
    }
}
