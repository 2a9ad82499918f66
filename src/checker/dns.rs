//! DNS checker.

use std::time::Instant;

use tokio::net::lookup_host;
use tokio::time::timeout;

use super::{CheckKind, CheckResult, CHECK_DEADLINE};

/// Resolve the target hostname and report up if at least one A/AAAA address
/// comes back.
pub async fn check_dns(check_id: &str, probe_id: &str, target: &str) -> CheckResult {
    tracing::debug!(check_id, target, "running dns check");

    let mut result = CheckResult::new(check_id, probe_id, CheckKind::Dns, target);

    let start = Instant::now();
    let resolved = timeout(CHECK_DEADLINE, lookup_host((target, 0u16))).await;
    result.latency_ms = start.elapsed().as_millis() as u64;

    match resolved {
        Ok(Ok(addrs)) => {
            let count = addrs.count();
            if count > 0 {
                result.up = true;
                tracing::debug!(check_id, addrs = count, "dns check done");
            } else {
                result.error = "no addresses resolved".to_string();
                tracing::debug!(check_id, error = %result.error, "dns check failed");
            }
        }
        Ok(Err(e)) => {
            result.error = e.to_string();
            tracing::debug!(check_id, error = %result.error, "dns check failed");
        }
        Err(_) => {
            result.error = format!("resolution timed out after {}s", CHECK_DEADLINE.as_secs());
            tracing::debug!(check_id, error = %result.error, "dns check failed");
        }
    }

    result
}
