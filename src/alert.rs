//! Webhook notifications.
//!
//! Delivery is one-shot and best-effort: a bounded POST on the transition
//! edge, no retry, no outbox. A missed delivery leaves the incident state
//! untouched.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Bound on the webhook POST, including connect time.
pub const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Webhook dispatch error types.
#[derive(Error, Debug)]
pub enum AlertError {
    #[error("webhook request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("webhook: unexpected status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },
}

/// JSON body sent to a check's webhook URL on a state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertPayload {
    pub check_id: String,
    pub target: String,
    /// "down" or "up"; only the down edge is dispatched.
    pub status: String,
    pub probes_down: usize,
    pub probes_total: usize,
}

/// POST the payload as JSON. Any 2xx is success; everything else is an error
/// the caller logs and forgets.
pub async fn fire(
    client: &reqwest::Client,
    url: &str,
    payload: &AlertPayload,
) -> Result<(), AlertError> {
    let resp = client
        .post(url)
        .json(payload)
        .timeout(WEBHOOK_TIMEOUT)
        .send()
        .await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(AlertError::UnexpectedStatus {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }
    Ok(())
}
