//! Background rebroadcast loop and the shared submission handle.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use solana_signature::Signature;
use tokio::{sync::Notify, time::sleep};

use super::{RpcEndpoint, SendConfig};

/// Tracks one in-flight submission.
///
/// The handle is the only state shared between the orchestrator and the
/// broadcast loop: the done flag transitions false to true exactly once, and
/// the notify wakes the loop so it observes the flip without waiting out a
/// full cadence interval.
#[derive(Debug)]
pub struct SubmissionHandle {
    /// Signature of the submitted transaction.
    signature: Signature,
    /// Instant the first broadcast was issued.
    started_at: Instant,
    /// Set once when the submission reaches a terminal state.
    done: AtomicBool,
    /// Wakes the broadcast loop when the flag flips.
    notify: Notify,
}

impl SubmissionHandle {
    /// Creates a handle for a freshly broadcast signature.
    #[must_use]
    pub fn new(signature: Signature) -> Self {
        Self {
            signature,
            started_at: Instant::now(),
            done: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Returns the tracked signature.
    #[must_use]
    pub const fn signature(&self) -> Signature {
        self.signature
    }

    /// Returns the elapsed time since first broadcast.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Returns true once the submission reached a terminal state.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Flips the done flag, returning true only on the first flip.
    pub fn mark_done(&self) -> bool {
        let first = !self.done.swap(true, Ordering::AcqRel);
        if first {
            self.notify.notify_waiters();
        }
        first
    }

    /// Completes once the done flag has flipped.
    pub async fn done_signal(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            let _ = notified.as_mut().enable();
            if self.is_done() {
                return;
            }
            notified.await;
        }
    }
}

/// Resubmits identical signed bytes on a fixed cadence until the handle is done.
///
/// The first resubmission happens one full interval after spawn; per-attempt
/// endpoint errors are logged and swallowed since the confirmation watcher is
/// the source of truth for the submission outcome.
pub(crate) async fn run_broadcast_loop(
    endpoint: Arc<dyn RpcEndpoint>,
    tx_bytes: Vec<u8>,
    send_config: SendConfig,
    interval: Duration,
    handle: Arc<SubmissionHandle>,
) {
    loop {
        tokio::select! {
            () = handle.done_signal() => break,
            () = sleep(interval) => {}
        }
        if handle.is_done() {
            break;
        }
        match endpoint.send_transaction(&tx_bytes, &send_config).await {
            Ok(_signature) => {
                tracing::debug!(signature = %handle.signature(), "rebroadcast transaction");
            }
            Err(error) => {
                tracing::debug!(
                    signature = %handle.signature(),
                    %error,
                    "rebroadcast attempt failed"
                );
            }
        }
    }
    tracing::debug!(
        signature = %handle.signature(),
        elapsed = ?handle.elapsed(),
        "broadcast loop stopped"
    );
}
