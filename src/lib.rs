//! Vigil — distributed uptime monitoring.
//!
//! A fleet of probe agents (`vigil-probe`) runs HTTP, TCP, and DNS checks
//! against user-defined targets and ships the observations to a central
//! aggregator (`vigil-server`). The aggregator persists every observation,
//! applies a quorum rule with a consecutive-failure filter, tracks incidents,
//! and fires a webhook notification when a check transitions to down.

pub mod agent;
pub mod alert;
pub mod checker;
pub mod config;
pub mod db;
pub mod engine;
pub mod maintenance;
pub mod quorum;
pub mod web;

/// Header probes use to present the shared secret to the aggregator.
pub const SECRET_HEADER: &str = "X-Wacht-Secret";

pub use checker::{CheckKind, CheckResult};
pub use config::{ProbeConfig, ServerConfig};
pub use db::Store;
pub use engine::DecisionEngine;
