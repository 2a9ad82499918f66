//! TCP checker.

use std::time::Instant;

use tokio::net::TcpStream;
use tokio::time::timeout;

use super::{CheckKind, CheckResult, CHECK_DEADLINE};

/// Dial `host:port` and report up if the connection is established.
///
/// The stream is dropped immediately on success.
pub async fn check_tcp(check_id: &str, probe_id: &str, target: &str) -> CheckResult {
    tracing::debug!(check_id, target, "running tcp check");

    let mut result = CheckResult::new(check_id, probe_id, CheckKind::Tcp, target);

    let start = Instant::now();
    let dialed = timeout(CHECK_DEADLINE, TcpStream::connect(target)).await;
    result.latency_ms = start.elapsed().as_millis() as u64;

    match dialed {
        Ok(Ok(stream)) => {
            drop(stream);
            result.up = true;
            tracing::debug!(check_id, latency_ms = result.latency_ms, "tcp check done");
        }
        Ok(Err(e)) => {
            result.error = e.to_string();
            tracing::debug!(check_id, error = %result.error, "tcp check failed");
        }
        Err(_) => {
            result.error = format!("connect timed out after {}s", CHECK_DEADLINE.as_secs());
            tracing::debug!(check_id, error = %result.error, "tcp check failed");
        }
    }

    result
}
