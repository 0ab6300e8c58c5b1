//! Failure diagnosis through simulation log extraction.

use serde_json::Value;

use super::{ConfirmationLevel, RpcEndpoint};

/// Tag prefix of program-emitted log lines.
const PROGRAM_LOG_PREFIX: &str = "Program log: ";

/// Strategy turning simulation log lines into an optional cause message.
///
/// The default is [`last_program_log`]; targets with a different log format
/// can swap the strategy without touching the submission state machine.
pub type LogExtractor = fn(&[String]) -> Option<String>;

/// Root cause extracted from a failed simulation.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Diagnosis {
    /// Human-readable cause.
    pub message: String,
    /// Raw simulation error payload when one was reported.
    pub err: Option<Value>,
}

/// Returns the payload of the last program-emitted log line.
///
/// Lines are scanned from last to first and the tag prefix is stripped.
#[must_use]
pub fn last_program_log(logs: &[String]) -> Option<String> {
    logs.iter()
        .rev()
        .find_map(|line| line.strip_prefix(PROGRAM_LOG_PREFIX).map(str::to_owned))
}

/// Simulates a failed transaction and extracts an actionable cause.
///
/// Returns `None` when the simulation itself fails or reports no error, in
/// which case the caller degrades to a generic message. Diagnosis never masks
/// the primary failure.
pub(crate) async fn diagnose(
    endpoint: &dyn RpcEndpoint,
    tx_bytes: &[u8],
    commitment: ConfirmationLevel,
    extract: LogExtractor,
) -> Option<Diagnosis> {
    let simulation = match endpoint.simulate_transaction(tx_bytes, commitment).await {
        Ok(simulation) => simulation,
        Err(error) => {
            tracing::warn!(%error, "simulation unavailable; reporting generic failure");
            return None;
        }
    };
    let err = simulation.err?;
    let message = extract(&simulation.logs).unwrap_or_else(|| err.to_string());
    Some(Diagnosis {
        message,
        err: Some(err),
    })
}
