#![forbid(unsafe_code)]

//! Transaction landing engine for Solana-style endpoints.
//!
//! One call signs a transaction against a fresh blockhash, broadcasts it,
//! keeps it alive with a background rebroadcast loop, waits for confirmation
//! at a requested durability level, and diagnoses failures through
//! simulation logs.

/// Transaction skeleton builder helpers.
pub mod builder;
/// Signer coordination across local keys and wallet capabilities.
pub mod sign;
/// Submission pipeline: broadcast, confirmation, diagnosis.
pub mod submit;

pub use builder::{TxBuilder, UnsignedTx};
pub use sign::{PayerSigner, SignerSet, SigningError, WalletSigner};
pub use submit::{
    ConfirmationLevel, Diagnosis, EndpointError, JsonRpcEndpoint, LandConfig, LogExtractor,
    RpcEndpoint, SendConfig, SignatureStatus, SignedTx, SimulationResult, SubmissionHandle,
    SubmitError, TxSubmitClient, last_program_log,
};
