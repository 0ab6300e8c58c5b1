//! Submission orchestrator: sign, broadcast, confirm, diagnose.

use std::sync::Arc;

use solana_signature::Signature;
use solana_transaction::versioned::VersionedTransaction;
use tokio::sync::Semaphore;

use super::{
    LandConfig, RpcEndpoint, SendConfig, SignedTx, SubmitError,
    broadcast::{SubmissionHandle, run_broadcast_loop},
    confirm::{ConfirmFailure, await_confirmation},
    diagnose::{LogExtractor, diagnose, last_program_log},
};
use crate::{builder::TxBuilder, sign::SignerSet};

/// Transaction submission client that lands transactions end to end.
///
/// One call runs the full state machine: sign, initial send, background
/// rebroadcast, foreground confirmation wait, and failure diagnosis. The
/// rebroadcast task is always stopped and joined before a call returns, on
/// every exit path.
#[derive(Clone)]
pub struct TxSubmitClient {
    /// Network endpoint capability.
    endpoint: Arc<dyn RpcEndpoint>,
    /// Send tuning applied to the initial send and every rebroadcast.
    send_config: SendConfig,
    /// Landing tuning for freshly signed submissions.
    land_config: LandConfig,
    /// Landing tuning for the pre-signed fast path.
    pre_signed_config: LandConfig,
    /// Log-extraction strategy used by the failure diagnostician.
    log_extractor: LogExtractor,
}

impl TxSubmitClient {
    /// Creates a submission client with default tuning.
    #[must_use]
    pub fn new(endpoint: Arc<dyn RpcEndpoint>) -> Self {
        Self {
            endpoint,
            send_config: SendConfig::default(),
            land_config: LandConfig::default(),
            pre_signed_config: LandConfig::pre_signed(),
            log_extractor: last_program_log,
        }
    }

    /// Sets send tuning.
    #[must_use]
    pub fn with_send_config(mut self, config: SendConfig) -> Self {
        self.send_config = config;
        self
    }

    /// Sets landing tuning for freshly signed submissions.
    #[must_use]
    pub fn with_land_config(mut self, config: LandConfig) -> Self {
        self.land_config = config.normalized();
        self
    }

    /// Sets landing tuning for the pre-signed fast path.
    #[must_use]
    pub fn with_pre_signed_config(mut self, config: LandConfig) -> Self {
        self.pre_signed_config = config.normalized();
        self
    }

    /// Sets the log-extraction strategy used for failure diagnosis.
    #[must_use]
    pub fn with_log_extractor(mut self, extract: LogExtractor) -> Self {
        self.log_extractor = extract;
        self
    }

    /// Builds, signs, and lands one transaction.
    ///
    /// A recent blockhash is fetched immediately before signing; the signed
    /// bytes are broadcast once in the foreground, kept alive by the
    /// rebroadcast loop, and awaited at the configured durability level.
    ///
    /// # Errors
    ///
    /// Returns [`SubmitError`] when signing, the initial send, or
    /// confirmation fails. A [`SubmitError::ConfirmationTimeout`] does not
    /// prove the transaction will never land.
    pub async fn submit(
        &self,
        builder: TxBuilder,
        signers: &SignerSet,
    ) -> Result<Signature, SubmitError> {
        let tx = self.sign_one(builder, signers).await?;
        self.land(&tx, &self.land_config).await
    }

    /// Builds, signs, and lands a batch of independent transactions.
    ///
    /// Each slot runs its own submission state machine; one slot's failure
    /// does not cancel the others. In-flight submissions are bounded by
    /// [`LandConfig::max_in_flight`]. Results are index-aligned with the
    /// input.
    pub async fn submit_batch(
        &self,
        builders: Vec<TxBuilder>,
        signers: &SignerSet,
    ) -> Vec<Result<Signature, SubmitError>> {
        let blockhash = match self.endpoint.latest_blockhash().await {
            Ok(blockhash) => blockhash,
            Err(source) => {
                return builders
                    .iter()
                    .map(|_| {
                        Err(SubmitError::Blockhash {
                            source: source.clone(),
                        })
                    })
                    .collect();
            }
        };
        let unsigned = builders
            .into_iter()
            .map(|builder| builder.build_unsigned(blockhash))
            .collect();
        let signed = signers.sign_batch(unsigned).await;

        let semaphore = Arc::new(Semaphore::new(self.land_config.max_in_flight.max(1)));
        let mut handles = Vec::with_capacity(signed.len());
        for slot in signed {
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                handles.push(None);
                continue;
            };
            let client = self.clone();
            let handle = tokio::spawn(async move {
                let _permit = permit;
                match slot {
                    Ok(tx) => client.land(&tx, &client.land_config).await,
                    Err(source) => Err(SubmitError::Signing { source }),
                }
            });
            handles.push(Some(handle));
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            let Some(handle) = handle else {
                results.push(Err(SubmitError::InternalSync {
                    message: "batch semaphore closed unexpectedly".to_owned(),
                }));
                continue;
            };
            match handle.await {
                Ok(result) => results.push(result),
                Err(error) => results.push(Err(SubmitError::InternalSync {
                    message: error.to_string(),
                })),
            }
        }
        results
    }

    /// Lands externally signed transaction bytes on the fast path.
    ///
    /// # Errors
    ///
    /// Returns [`SubmitError`] when decoding, the initial send, or
    /// confirmation fails.
    pub async fn submit_pre_signed(&self, signed_tx: SignedTx) -> Result<Signature, SubmitError> {
        let tx_bytes = match signed_tx {
            SignedTx::VersionedTransactionBytes(bytes) => bytes,
            SignedTx::WireTransactionBytes(bytes) => bytes,
        };
        let _tx: VersionedTransaction = bincode::deserialize(&tx_bytes)
            .map_err(|source| SubmitError::DecodeSignedBytes { source })?;
        self.land_bytes(tx_bytes, &self.pre_signed_config).await
    }

    /// Fetches a fresh blockhash and signs one transaction.
    async fn sign_one(
        &self,
        builder: TxBuilder,
        signers: &SignerSet,
    ) -> Result<VersionedTransaction, SubmitError> {
        let blockhash = self
            .endpoint
            .latest_blockhash()
            .await
            .map_err(|source| SubmitError::Blockhash { source })?;
        signers
            .sign(builder.build_unsigned(blockhash))
            .await
            .map_err(|source| SubmitError::Signing { source })
    }

    /// Serializes and lands one signed transaction.
    async fn land(
        &self,
        tx: &VersionedTransaction,
        config: &LandConfig,
    ) -> Result<Signature, SubmitError> {
        let tx_bytes =
            bincode::serialize(tx).map_err(|source| SubmitError::DecodeSignedBytes { source })?;
        self.land_bytes(tx_bytes, config).await
    }

    /// Lands signed bytes: initial send, rebroadcast loop, confirmation wait,
    /// diagnosis on failure.
    async fn land_bytes(
        &self,
        tx_bytes: Vec<u8>,
        config: &LandConfig,
    ) -> Result<Signature, SubmitError> {
        let config = config.clone().normalized();
        let signature = self
            .endpoint
            .send_transaction(&tx_bytes, &self.send_config)
            .await
            .map_err(|source| SubmitError::Send { source })?;
        tracing::info!(%signature, "transaction broadcast");

        let handle = Arc::new(SubmissionHandle::new(signature));
        let loop_task = tokio::spawn(run_broadcast_loop(
            Arc::clone(&self.endpoint),
            tx_bytes.clone(),
            self.send_config.clone(),
            config.rebroadcast_interval,
            Arc::clone(&handle),
        ));
        let _stop_guard = StopOnDrop(Arc::clone(&handle));

        let outcome = await_confirmation(
            self.endpoint.as_ref(),
            &signature,
            config.required_level,
            config.timeout,
            config.poll_interval,
        )
        .await;

        let _ = handle.mark_done();
        if let Err(error) = loop_task.await {
            tracing::warn!(%signature, %error, "broadcast loop task failed");
        }

        match outcome {
            Ok(()) => {
                tracing::info!(
                    %signature,
                    elapsed = ?handle.elapsed(),
                    level = ?config.required_level,
                    "transaction confirmed"
                );
                Ok(signature)
            }
            Err(ConfirmFailure::Executed { err }) => {
                let diagnosis = diagnose(
                    self.endpoint.as_ref(),
                    &tx_bytes,
                    config.required_level,
                    self.log_extractor,
                )
                .await;
                let message = diagnosis
                    .map(|diagnosis| diagnosis.message)
                    .unwrap_or_else(|| err.to_string());
                tracing::warn!(%signature, %message, "transaction failed on-chain");
                Err(SubmitError::Execution { err, message })
            }
            Err(ConfirmFailure::Timeout { waited }) => {
                let diagnosis = diagnose(
                    self.endpoint.as_ref(),
                    &tx_bytes,
                    config.required_level,
                    self.log_extractor,
                )
                .await;
                let message = diagnosis.map(|diagnosis| diagnosis.message).unwrap_or_else(
                    || "no failure surfaced by simulation; transaction may still land".to_owned(),
                );
                tracing::warn!(%signature, ?waited, "confirmation timed out");
                Err(SubmitError::ConfirmationTimeout { waited, message })
            }
        }
    }
}

/// Stops the rebroadcast loop when the landing future is dropped mid-flight.
struct StopOnDrop(Arc<SubmissionHandle>);

impl Drop for StopOnDrop {
    fn drop(&mut self) {
        let _ = self.0.mark_done();
    }
}
