//! Store model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::checker::CheckKind;

/// A user-defined target and how to probe it.
///
/// Seeded from the server config at startup and served to probes verbatim;
/// the monitoring core never mutates it. The serde names double as the wire
/// format of `GET /probes/checks` and the YAML seed format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckSpec {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: CheckKind,
    /// Type-dependent: URL for http, `host:port` for tcp, hostname for dns.
    pub target: String,
    /// Notification URL; empty means no webhook.
    #[serde(default)]
    pub webhook: String,
    #[serde(rename = "interval", default = "default_interval_seconds")]
    pub interval_seconds: u32,
}

pub(crate) fn default_interval_seconds() -> u32 {
    30
}

impl CheckSpec {
    /// Validate the user-supplied fields.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.is_empty() {
            return Err("id is required".to_string());
        }
        if self.target.is_empty() {
            return Err("target is required".to_string());
        }
        if !(1..=86_400).contains(&self.interval_seconds) {
            return Err(format!(
                "interval must be between 1 and 86400 seconds, got {}",
                self.interval_seconds
            ));
        }
        Ok(())
    }
}

/// A registered probe.
#[derive(Debug, Clone)]
pub struct ProbeRecord {
    pub probe_id: String,
    pub version: String,
    pub registered_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

/// One row of the quorum ballot: a probe's most recent verdict for a check.
#[derive(Debug, Clone)]
pub struct BallotEntry {
    pub probe_id: String,
    pub up: bool,
}

/// A down-period for a single check. Open while `resolved_at` is `None`.
#[derive(Debug, Clone, Serialize)]
pub struct Incident {
    pub id: i64,
    pub check_id: String,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Current state of a check for the status read model.
#[derive(Debug, Clone)]
pub struct CheckStatus {
    pub check_id: String,
    pub target: String,
    /// Whether the newest result row reported up.
    pub up: bool,
    /// `started_at` of the open incident, if one exists.
    pub incident_since: Option<DateTime<Utc>>,
}

/// A probe's last_seen_at for staleness and status reporting.
#[derive(Debug, Clone)]
pub struct ProbeStatus {
    pub probe_id: String,
    pub last_seen_at: DateTime<Utc>,
}
