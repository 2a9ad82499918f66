//! Probe agent.
//!
//! Registers with the aggregator, keeps a cached check list, runs one
//! scheduling loop per check at that check's own interval, and ships every
//! observation over the probe API. A heartbeat loop runs alongside so the
//! aggregator can tell a quiet probe from a dead one.
//!
//! Registration and the initial check fetch are fatal; after startup every
//! network error is logged and retried on the next tick.

mod client;

pub use client::AgentClient;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;

use crate::checker::run_check;
use crate::config::ProbeConfig;
use crate::db::CheckSpec;

/// Probe agent error types.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status} from {endpoint}")]
    UnexpectedStatus { endpoint: String, status: u16 },
}

/// Run the agent lifecycle. Returns only on a fatal startup error.
pub async fn run(cfg: ProbeConfig) -> Result<(), AgentError> {
    let client = Arc::new(AgentClient::new(&cfg)?);

    client.register(env!("CARGO_PKG_VERSION")).await?;
    tracing::info!(probe_id = %cfg.probe_id, server = %cfg.server, "registered with aggregator");

    let checks = client.fetch_checks().await?;
    tracing::info!(count = checks.len(), "fetched check list");

    {
        let client = client.clone();
        let interval = cfg.heartbeat_interval();
        tokio::spawn(async move { heartbeat_loop(client, interval).await });
    }

    let mut scheduler = CheckScheduler::new(client.clone());
    scheduler.sync(checks);

    // Periodic refresh keeps the cached list in step with dashboard edits.
    let mut refresh = tokio::time::interval(cfg.refresh_interval());
    refresh.set_missed_tick_behavior(MissedTickBehavior::Skip);
    refresh.tick().await; // the first tick completes immediately
    loop {
        refresh.tick().await;
        match client.fetch_checks().await {
            Ok(checks) => scheduler.sync(checks),
            Err(e) => tracing::warn!(error = %e, "check refresh failed, keeping cached list"),
        }
    }
}

async fn heartbeat_loop(client: Arc<AgentClient>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // Registration just proved liveness; skip the immediate first tick.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        match client.send_heartbeat().await {
            Ok(()) => tracing::debug!("heartbeat sent"),
            Err(e) => tracing::warn!(error = %e, "heartbeat failed"),
        }
    }
}

struct RunningCheck {
    spec: CheckSpec,
    stop: broadcast::Sender<()>,
}

/// Keeps one spawned loop per check and reconciles them against each freshly
/// fetched list: new checks start, removed checks stop, changed checks
/// restart with the new spec.
struct CheckScheduler {
    client: Arc<AgentClient>,
    running: HashMap<String, RunningCheck>,
}

impl CheckScheduler {
    fn new(client: Arc<AgentClient>) -> Self {
        Self {
            client,
            running: HashMap::new(),
        }
    }

    fn sync(&mut self, checks: Vec<CheckSpec>) {
        let fresh: HashMap<String, CheckSpec> = checks
            .into_iter()
            .map(|check| (check.id.clone(), check))
            .collect();

        let stale: Vec<String> = self
            .running
            .iter()
            .filter(|(id, running)| fresh.get(*id) != Some(&running.spec))
            .map(|(id, _)| id.clone())
            .collect();
        for id in stale {
            if let Some(running) = self.running.remove(&id) {
                let _ = running.stop.send(());
                tracing::info!(check_id = %id, "stopping check loop");
            }
        }

        for (id, spec) in fresh {
            if self.running.contains_key(&id) {
                continue;
            }
            let (stop_tx, stop_rx) = broadcast::channel(1);
            tracing::info!(
                check_id = %id,
                kind = %spec.kind,
                interval = spec.interval_seconds,
                "starting check loop"
            );
            tokio::spawn(run_check_loop(spec.clone(), self.client.clone(), stop_rx));
            self.running.insert(
                id,
                RunningCheck {
                    spec,
                    stop: stop_tx,
                },
            );
        }
    }
}

/// Execute one check on its interval until told to stop.
///
/// Results post sequentially from this loop, so a probe's observations for a
/// check always arrive in the order they were taken.
async fn run_check_loop(
    spec: CheckSpec,
    client: Arc<AgentClient>,
    mut stop: broadcast::Receiver<()>,
) {
    // Small random offset so the loops don't fire in lockstep.
    let jitter = rand::random::<u64>() % 1000;
    tokio::time::sleep(Duration::from_millis(jitter)).await;

    let mut ticker =
        tokio::time::interval(Duration::from_secs(u64::from(spec.interval_seconds.max(1))));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = stop.recv() => break,
            _ = ticker.tick() => {
                let result =
                    run_check(spec.kind, &spec.id, client.probe_id(), &spec.target).await;
                if let Err(e) = client.post_result(&result).await {
                    // One dropped observation is fine; the aggregator decides
                    // from whatever the fleet delivers.
                    tracing::warn!(check_id = %spec.id, error = %e, "failed to post result");
                }
            }
        }
    }
}
