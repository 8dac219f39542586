use crate::foundation::{BridgeError, Result};
use log::{debug, warn};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Retries `op` with a fixed delay while it fails with a transport-class error.
///
/// Any other error is returned immediately. When the budget runs out the last transport
/// failure is wrapped into a single `SignerUnreachable`.
pub async fn retry_transport<F, Fut, T>(operation: &str, attempts: usize, delay: Duration, mut op: F) -> Result<T>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = attempts.max(1);
    let mut last_err: Option<BridgeError> = None;
    for attempt in 1..=attempts {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transport_class() => {
                debug!("transport failure operation={} attempt={}/{} error={}", operation, attempt, attempts, err);
                last_err = Some(err);
                if attempt < attempts {
                    sleep(delay).await;
                }
            }
            Err(err) => return Err(err),
        }
    }
    let details = last_err.map(|err| err.to_string()).unwrap_or_else(|| "retry exhausted".to_string());
    warn!("remote signer unreachable operation={} attempts={} last_error={}", operation, attempts, details);
    Err(BridgeError::SignerUnreachable { attempts, details })
}
