//! Confirmation watcher: polls signature status until a terminal condition.

use std::time::{Duration, Instant};

use serde_json::Value;
use solana_signature::Signature;
use tokio::time::sleep;

use super::{ConfirmationLevel, RpcEndpoint};

/// Terminal confirmation failure observed by the watcher.
#[derive(Debug, Clone, Eq, PartialEq)]
pub(crate) enum ConfirmFailure {
    /// Deadline elapsed with no status at the required level.
    Timeout {
        /// Total time waited.
        waited: Duration,
    },
    /// On-chain error payload observed at any level.
    Executed {
        /// Raw on-chain error payload.
        err: Value,
    },
}

/// Polls until the requested level is reached, an on-chain error is observed,
/// or the timeout elapses.
///
/// The status endpoint is polled once immediately, so an already-terminal
/// signature resolves without waiting a poll interval. Poll errors are logged
/// and retried until the deadline; the watcher never outlives its caller
/// since it owns no background task.
pub(crate) async fn await_confirmation(
    endpoint: &dyn RpcEndpoint,
    signature: &Signature,
    required_level: ConfirmationLevel,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<(), ConfirmFailure> {
    let started = Instant::now();
    loop {
        match endpoint.signature_status(signature).await {
            Ok(status) => {
                if let Some(err) = status.err {
                    return Err(ConfirmFailure::Executed { err });
                }
                if status.level >= required_level {
                    return Ok(());
                }
                tracing::debug!(
                    %signature,
                    observed = ?status.level,
                    required = ?required_level,
                    "confirmation pending"
                );
            }
            Err(error) => {
                tracing::debug!(%signature, %error, "status poll failed");
            }
        }

        let elapsed = started.elapsed();
        if elapsed >= timeout {
            return Err(ConfirmFailure::Timeout { waited: elapsed });
        }
        let wait = timeout.saturating_sub(elapsed).min(poll_interval);
        sleep(wait).await;
    }
}
