//! Shared submission types, errors, and the endpoint capability trait.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use solana_signature::Signature;
use thiserror::Error;

use crate::sign::SigningError;

/// Durability level reported by the network for one transaction.
///
/// Levels are ordered: a status at a higher level satisfies any request for a
/// lower one.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd)]
pub enum ConfirmationLevel {
    /// Signature unknown to the queried node.
    NotFound,
    /// Executed by the queried node, not yet voted on by the cluster.
    Processed,
    /// Voted on by a supermajority of the cluster.
    Confirmed,
    /// Rooted and irreversible.
    Finalized,
}

impl ConfirmationLevel {
    /// Returns the commitment string used on the RPC wire.
    #[must_use]
    pub const fn commitment_str(self) -> &'static str {
        match self {
            Self::NotFound | Self::Processed => "processed",
            Self::Confirmed => "confirmed",
            Self::Finalized => "finalized",
        }
    }

    /// Parses a commitment string from the RPC wire.
    #[must_use]
    pub fn from_commitment_str(value: &str) -> Option<Self> {
        match value {
            "processed" => Some(Self::Processed),
            "confirmed" => Some(Self::Confirmed),
            "finalized" => Some(Self::Finalized),
            _ => None,
        }
    }
}

/// One status observation for a submitted signature.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SignatureStatus {
    /// Durability level at observation time.
    pub level: ConfirmationLevel,
    /// On-chain error payload when the transaction failed.
    pub err: Option<Value>,
}

impl SignatureStatus {
    /// Returns a status at a level with no error payload.
    #[must_use]
    pub const fn at(level: ConfirmationLevel) -> Self {
        Self { level, err: None }
    }
}

/// Outcome of a dry-run execution against the endpoint.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SimulationResult {
    /// On-chain error payload when simulated execution failed.
    pub err: Option<Value>,
    /// Log lines emitted during simulation.
    pub logs: Vec<String>,
}

/// Signed transaction payload variants accepted by submit APIs.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum SignedTx {
    /// Bincode-serialized `VersionedTransaction` bytes.
    VersionedTransactionBytes(Vec<u8>),
    /// Wire-format transaction bytes.
    WireTransactionBytes(Vec<u8>),
}

/// Tuning applied to every `sendTransaction` call.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SendConfig {
    /// Skip preflight simulation when true.
    pub skip_preflight: bool,
    /// Optional preflight commitment level.
    pub preflight_commitment: Option<ConfirmationLevel>,
}

impl Default for SendConfig {
    fn default() -> Self {
        Self {
            skip_preflight: true,
            preflight_commitment: None,
        }
    }
}

/// Tuning for the landing pipeline (broadcast plus confirmation).
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct LandConfig {
    /// Maximum wall-clock wait for confirmation.
    pub timeout: Duration,
    /// Durability level required before a submission counts as landed.
    pub required_level: ConfirmationLevel,
    /// Interval between rebroadcasts of the signed bytes.
    pub rebroadcast_interval: Duration,
    /// Interval between signature status polls.
    pub poll_interval: Duration,
    /// Maximum concurrent in-flight submissions in batch mode.
    pub max_in_flight: usize,
}

impl Default for LandConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            required_level: ConfirmationLevel::Confirmed,
            rebroadcast_interval: Duration::from_millis(2_000),
            poll_interval: Duration::from_millis(500),
            max_in_flight: 8,
        }
    }
}

impl LandConfig {
    /// Returns the default tuning for the pre-signed fast path.
    #[must_use]
    pub fn pre_signed() -> Self {
        Self {
            rebroadcast_interval: Duration::from_millis(500),
            ..Self::default()
        }
    }

    /// Returns a normalized config with bounded minimums.
    #[must_use]
    pub fn normalized(self) -> Self {
        Self {
            timeout: self.timeout,
            required_level: self.required_level,
            rebroadcast_interval: self.rebroadcast_interval.max(Duration::from_millis(10)),
            poll_interval: self.poll_interval.max(Duration::from_millis(10)),
            max_in_flight: self.max_in_flight.max(1),
        }
    }
}

/// Errors surfaced by endpoint capabilities.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum EndpointError {
    /// Invalid endpoint configuration.
    #[error("endpoint configuration invalid: {message}")]
    Config {
        /// Human-readable description.
        message: String,
    },
    /// Endpoint call failed.
    #[error("endpoint failure: {message}")]
    Failure {
        /// Human-readable description.
        message: String,
    },
}

/// Submission-level errors.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// Could not sign the transaction.
    #[error("failed to sign transaction: {source}")]
    Signing {
        /// Signing-layer failure.
        source: SigningError,
    },
    /// Could not fetch a recent blockhash before signing.
    #[error("failed to fetch recent blockhash: {source}")]
    Blockhash {
        /// Endpoint failure.
        source: EndpointError,
    },
    /// Signed bytes could not be decoded into a transaction.
    #[error("failed to decode signed transaction bytes: {source}")]
    DecodeSignedBytes {
        /// Bincode decode error.
        source: Box<bincode::ErrorKind>,
    },
    /// Initial send was rejected by the endpoint.
    #[error("initial send failed: {source}")]
    Send {
        /// Endpoint failure.
        source: EndpointError,
    },
    /// No status at the required level was observed within the timeout.
    ///
    /// The transaction may still land after this error is returned.
    #[error("no confirmation at requested level after {waited:?}: {message}")]
    ConfirmationTimeout {
        /// Total time waited before giving up.
        waited: Duration,
        /// Diagnosis from simulation, or a generic note when unavailable.
        message: String,
    },
    /// Transaction executed on-chain and failed.
    #[error("transaction failed on-chain: {message}")]
    Execution {
        /// Raw on-chain error payload.
        err: Value,
        /// Diagnosis from simulation, or the serialized payload when unavailable.
        message: String,
    },
    /// Internal synchronization failure.
    #[error("internal synchronization failure: {message}")]
    InternalSync {
        /// Synchronization error details.
        message: String,
    },
}

/// Network endpoint capability consumed by the submission pipeline.
#[async_trait]
pub trait RpcEndpoint: Send + Sync {
    /// Submits transaction bytes without waiting for durability, returning the signature.
    async fn send_transaction(
        &self,
        tx_bytes: &[u8],
        config: &SendConfig,
    ) -> Result<Signature, EndpointError>;

    /// Returns the current status observation for a signature.
    async fn signature_status(
        &self,
        signature: &Signature,
    ) -> Result<SignatureStatus, EndpointError>;

    /// Simulates transaction execution without committing it.
    async fn simulate_transaction(
        &self,
        tx_bytes: &[u8],
        commitment: ConfirmationLevel,
    ) -> Result<SimulationResult, EndpointError>;

    /// Returns the latest recent-blockhash bytes.
    async fn latest_blockhash(&self) -> Result<[u8; 32], EndpointError>;
}
