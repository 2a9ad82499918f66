//! Background maintenance loops on the aggregator.
//!
//! Two tasks: a stale-probe logger that warns when a probe goes quiet, and a
//! retention evictor that trims old rows out of the result log. Neither loop
//! ever touches incident state.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use tokio::sync::broadcast;

use crate::db::Store;

const STALE_CHECK_INTERVAL: Duration = Duration::from_secs(30);
const STALE_THRESHOLD_SECS: i64 = 120;

const EVICTION_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);
const DEFAULT_RETENTION_DAYS: u32 = 30;

/// Owner of the background maintenance tasks.
pub struct Maintenance {
    store: Arc<Store>,
    retention_days: u32,
    stop: broadcast::Sender<()>,
}

impl Maintenance {
    pub fn new(store: Arc<Store>, retention_days: u32) -> Self {
        let (stop, _) = broadcast::channel(1);
        Self {
            store,
            // Zero means "use the default", mirroring the config default.
            retention_days: if retention_days == 0 {
                DEFAULT_RETENTION_DAYS
            } else {
                retention_days
            },
            stop,
        }
    }

    /// Spawn the stale-probe logger and the retention evictor.
    pub fn start(&self) {
        {
            let store = self.store.clone();
            let mut stop = self.stop.subscribe();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(STALE_CHECK_INTERVAL);
                loop {
                    tokio::select! {
                        _ = stop.recv() => break,
                        _ = ticker.tick() => log_stale_probes(&store),
                    }
                }
            });
        }

        {
            let store = self.store.clone();
            let retention_days = self.retention_days;
            let mut stop = self.stop.subscribe();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(EVICTION_INTERVAL);
                loop {
                    tokio::select! {
                        _ = stop.recv() => break,
                        _ = ticker.tick() => evict_old_results(&store, retention_days),
                    }
                }
            });
        }
    }

    /// Stop both loops.
    pub fn stop(&self) {
        let _ = self.stop.send(());
    }
}

fn log_stale_probes(store: &Store) {
    let statuses = match store.all_probe_statuses() {
        Ok(statuses) => statuses,
        Err(e) => {
            tracing::error!(error = %e, "stale check: failed to query probes");
            return;
        }
    };

    let now = Utc::now();
    for probe in statuses {
        let silent_for = now - probe.last_seen_at;
        if silent_for > ChronoDuration::seconds(STALE_THRESHOLD_SECS) {
            tracing::warn!(
                probe_id = %probe.probe_id,
                silent_secs = silent_for.num_seconds(),
                "probe has gone quiet"
            );
        }
    }
}

fn evict_old_results(store: &Store, retention_days: u32) {
    let cutoff = Utc::now() - ChronoDuration::days(i64::from(retention_days));
    match store.evict_results_before(cutoff) {
        Ok(0) => {}
        Ok(deleted) => tracing::info!(deleted, retention_days, "evicted old results"),
        Err(e) => tracing::error!(error = %e, "eviction failed"),
    }
}
