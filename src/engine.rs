//! Decision engine.
//!
//! Invoked after every accepted result. Re-queries the quorum ballot, applies
//! the majority + consecutive-failure rule, and drives the check's incident
//! state, producing at most one transition per invocation. Evaluations for
//! the same check are serialized by a keyed lock; the store's open-incident
//! uniqueness is the backstop underneath it.
//!
//! The engine never fails an ingest: every storage error here is logged and
//! the evaluation is abandoned — the next result re-triggers it.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::alert::{self, AlertPayload, WEBHOOK_TIMEOUT};
use crate::db::Store;
use crate::quorum;

pub struct DecisionEngine {
    store: Arc<Store>,
    http: reqwest::Client,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl DecisionEngine {
    pub fn new(store: Arc<Store>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            store,
            http,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// One lock per check id; entries live as long as the engine.
    async fn lock_for(&self, check_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(check_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Re-evaluate a check's state from the latest-per-probe ballot.
    pub async fn evaluate(&self, check_id: &str) {
        let lock = self.lock_for(check_id).await;
        let _guard = lock.lock().await;

        let ballot = match self.store.latest_per_probe(check_id) {
            Ok(ballot) => ballot,
            Err(e) => {
                tracing::error!(check_id, error = %e, "decision: ballot query failed");
                return;
            }
        };
        if ballot.is_empty() {
            return;
        }

        if !quorum::majority_down(&ballot) {
            // Strict majority reports up: close any open incident.
            if let Err(e) = self.store.resolve_incident(check_id) {
                tracing::error!(check_id, error = %e, "decision: failed to resolve incident");
            }
            return;
        }

        // Majority vote passed. Every down voter must show two consecutive
        // down observations; a single fresh down vote (or a failed history
        // query) leaves the whole round inconclusive.
        for entry in ballot.iter().filter(|entry| !entry.up) {
            let history = match self.store.recent_for_probe(
                check_id,
                &entry.probe_id,
                quorum::CONSECUTIVE_DOWN_REQUIRED,
            ) {
                Ok(history) => history,
                Err(e) => {
                    tracing::error!(
                        check_id,
                        probe_id = %entry.probe_id,
                        error = %e,
                        "decision: history query failed"
                    );
                    return;
                }
            };
            if !quorum::all_consecutively_down(&history) {
                return;
            }
        }

        let probes_down = quorum::count_down(&ballot);
        let probes_total = ballot.len();
        tracing::warn!(
            check_id,
            probes_down,
            probes_total,
            "decision: majority down with consecutive failures"
        );

        let already_open = match self.store.open_incident(check_id) {
            Ok(already_open) => already_open,
            Err(e) => {
                tracing::error!(check_id, error = %e, "decision: failed to open incident");
                return;
            }
        };
        if already_open {
            return;
        }

        self.notify_down(check_id, probes_down, probes_total).await;
    }

    /// Fire the check's webhook for a freshly opened incident.
    async fn notify_down(&self, check_id: &str, probes_down: usize, probes_total: usize) {
        let check = match self.store.get_check(check_id) {
            Ok(Some(check)) => check,
            Ok(None) => return,
            Err(e) => {
                tracing::error!(check_id, error = %e, "decision: check lookup failed");
                return;
            }
        };
        if check.webhook.is_empty() {
            return;
        }

        let payload = AlertPayload {
            check_id: check_id.to_string(),
            target: check.target.clone(),
            status: "down".to_string(),
            probes_down,
            probes_total,
        };
        match alert::fire(&self.http, &check.webhook, &payload).await {
            Ok(()) => tracing::info!(check_id, url = %check.webhook, "alert: webhook fired"),
            Err(e) => tracing::error!(check_id, error = %e, "alert: webhook failed"),
        }
    }
}
