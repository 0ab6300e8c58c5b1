//! Transaction submission: broadcast, confirmation, and failure diagnosis.

/// Background rebroadcast loop and submission handle.
mod broadcast;
/// Submission orchestrator.
mod client;
/// Confirmation watcher.
mod confirm;
/// Failure diagnosis through simulation logs.
mod diagnose;
/// JSON-RPC endpoint implementation.
mod rpc;
#[cfg(test)]
/// Submission pipeline unit tests.
mod tests;
/// Shared submission types, errors, and the endpoint capability trait.
mod types;

pub use broadcast::SubmissionHandle;
pub use client::TxSubmitClient;
pub use diagnose::{Diagnosis, LogExtractor, last_program_log};
pub use rpc::JsonRpcEndpoint;
pub use types::{
    ConfirmationLevel, EndpointError, LandConfig, RpcEndpoint, SendConfig, SignatureStatus,
    SignedTx, SimulationResult, SubmitError,
};
