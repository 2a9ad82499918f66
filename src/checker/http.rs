//! HTTP checker.

use std::time::Instant;

use super::{CheckKind, CheckResult, CHECK_DEADLINE};

/// GET the target URL and report up for any 2xx/3xx status.
///
/// Redirects are followed; the status examined is the final one.
pub async fn check_http(check_id: &str, probe_id: &str, target: &str) -> CheckResult {
    tracing::debug!(check_id, target, "running http check");

    let mut result = CheckResult::new(check_id, probe_id, CheckKind::Http, target);

    let client = match reqwest::Client::builder().timeout(CHECK_DEADLINE).build() {
        Ok(c) => c,
        Err(e) => {
            result.error = e.to_string();
            return result;
        }
    };

    let start = Instant::now();
    let response = client.get(target).send().await;
    result.latency_ms = start.elapsed().as_millis() as u64;

    match response {
        Ok(resp) => {
            let status = resp.status().as_u16();
            result.up = (200..400).contains(&status);
            if !result.up {
                result.error = format!("unexpected status code: {status}");
            }
            tracing::debug!(check_id, status, up = result.up, "http check done");
        }
        Err(e) => {
            result.error = e.to_string();
            tracing::debug!(check_id, error = %result.error, "http check failed");
        }
    }

    result
}
