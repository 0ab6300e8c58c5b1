//! Signer coordination across local key material and external wallet capabilities.

use std::sync::Arc;

use async_trait::async_trait;
use solana_keypair::Keypair;
use solana_pubkey::Pubkey;
use solana_signature::Signature;
use solana_signer::{Signer, SignerError};
use solana_transaction::versioned::VersionedTransaction;
use thiserror::Error;

use crate::builder::UnsignedTx;

/// Signing-layer errors.
#[derive(Debug, Error)]
pub enum SigningError {
    /// A required local signer could not produce a signature.
    #[error("failed to sign transaction: {source}")]
    Signer {
        /// Underlying signer error.
        source: SignerError,
    },
    /// The wallet capability failed or rejected the request.
    #[error("wallet signing failed: {message}")]
    Wallet {
        /// Human-readable description.
        message: String,
    },
    /// An additional signer is not a required signer of the message.
    #[error("signer {signer} is not required by the transaction")]
    UnknownSigner {
        /// Offending signer identity.
        signer: Pubkey,
    },
}

/// External interactive wallet capability.
///
/// Implementations receive transactions that already carry any additional
/// local partial signatures and are responsible for attaching the payer
/// signature and returning the fully signed transaction.
#[async_trait]
pub trait WalletSigner: Send + Sync {
    /// Signs one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError::Wallet`] when the wallet rejects or fails the request.
    async fn sign_transaction(
        &self,
        tx: VersionedTransaction,
    ) -> Result<VersionedTransaction, SigningError>;

    /// Signs a batch of transactions in one approval flow.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError::Wallet`] when the wallet rejects or fails the request.
    async fn sign_all_transactions(
        &self,
        txs: Vec<VersionedTransaction>,
    ) -> Result<Vec<VersionedTransaction>, SigningError>;
}

/// Payer identity backing: local key material or an interactive wallet.
#[derive(Clone)]
pub enum PayerSigner {
    /// Locally held keypair signing synchronously.
    Local(Arc<Keypair>),
    /// External wallet approval flow.
    Wallet(Arc<dyn WalletSigner>),
}

/// Identities required to authorize a transaction.
///
/// The payer is always present and signs first; additional signers are local
/// keypairs applied in any order.
#[derive(Clone)]
pub struct SignerSet {
    /// Fee payer identity.
    payer: PayerSigner,
    /// Additional locally held signers.
    additional: Vec<Arc<Keypair>>,
}

impl SignerSet {
    /// Creates a signer set with a locally held payer keypair.
    #[must_use]
    pub fn local(payer: Arc<Keypair>) -> Self {
        Self {
            payer: PayerSigner::Local(payer),
            additional: Vec::new(),
        }
    }

    /// Creates a signer set with a wallet-backed payer.
    #[must_use]
    pub fn wallet(payer: Arc<dyn WalletSigner>) -> Self {
        Self {
            payer: PayerSigner::Wallet(payer),
            additional: Vec::new(),
        }
    }

    /// Appends additional local signers.
    #[must_use]
    pub fn with_additional(mut self, signers: Vec<Arc<Keypair>>) -> Self {
        self.additional.extend(signers);
        self
    }

    /// Returns the payer backing.
    #[must_use]
    pub const fn payer(&self) -> &PayerSigner {
        &self.payer
    }

    /// Signs one unsigned transaction.
    ///
    /// Local payers sign synchronously together with the additional signers.
    /// Wallet payers receive the transaction with additional partial
    /// signatures already applied and produce the final signed transaction.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError`] when any required signer cannot produce a signature.
    pub async fn sign(&self, unsigned: UnsignedTx) -> Result<VersionedTransaction, SigningError> {
        match &self.payer {
            PayerSigner::Local(payer) => self.sign_local(unsigned, payer),
            PayerSigner::Wallet(wallet) => {
                let prepared = self.apply_additional(unsigned)?;
                wallet.sign_transaction(prepared).await
            }
        }
    }

    /// Signs a batch of unsigned transactions, preserving input order.
    ///
    /// Local payers sign each slot independently; wallet payers approve the
    /// whole batch in one `sign_all_transactions` flow, so a wallet failure
    /// fails every slot that reached the wallet.
    pub async fn sign_batch(
        &self,
        unsigned: Vec<UnsignedTx>,
    ) -> Vec<Result<VersionedTransaction, SigningError>> {
        match &self.payer {
            PayerSigner::Local(payer) => unsigned
                .into_iter()
                .map(|tx| self.sign_local(tx, payer))
                .collect(),
            PayerSigner::Wallet(wallet) => self.sign_batch_wallet(unsigned, wallet.as_ref()).await,
        }
    }

    /// Signs with the local payer plus additional signers in one step.
    fn sign_local(
        &self,
        unsigned: UnsignedTx,
        payer: &Arc<Keypair>,
    ) -> Result<VersionedTransaction, SigningError> {
        let mut signers: Vec<&dyn Signer> =
            Vec::with_capacity(self.additional.len().saturating_add(1));
        signers.push(payer.as_ref());
        for signer in &self.additional {
            signers.push(signer.as_ref());
        }
        unsigned
            .sign(&signers)
            .map_err(|source| SigningError::Signer { source })
    }

    /// Runs the wallet batch flow over slots that prepared successfully.
    async fn sign_batch_wallet(
        &self,
        unsigned: Vec<UnsignedTx>,
        wallet: &dyn WalletSigner,
    ) -> Vec<Result<VersionedTransaction, SigningError>> {
        let mut slots: Vec<Result<VersionedTransaction, SigningError>> = unsigned
            .into_iter()
            .map(|tx| self.apply_additional(tx))
            .collect();

        let prepared: Vec<VersionedTransaction> = slots
            .iter()
            .filter_map(|slot| slot.as_ref().ok().cloned())
            .collect();
        if prepared.is_empty() {
            return slots;
        }

        match wallet.sign_all_transactions(prepared).await {
            Ok(signed) => {
                let mut signed = signed.into_iter();
                for slot in &mut slots {
                    if slot.is_ok() {
                        *slot = signed.next().ok_or_else(|| SigningError::Wallet {
                            message: "wallet returned fewer transactions than requested".to_owned(),
                        });
                    }
                }
            }
            Err(error) => {
                let message = error.to_string();
                for slot in &mut slots {
                    if slot.is_ok() {
                        *slot = Err(SigningError::Wallet {
                            message: message.clone(),
                        });
                    }
                }
            }
        }
        slots
    }

    /// Applies additional local signatures, leaving the payer slot unsigned.
    fn apply_additional(&self, unsigned: UnsignedTx) -> Result<VersionedTransaction, SigningError> {
        let message = unsigned.into_message();
        let num_required = usize::from(message.header().num_required_signatures);
        let serialized = message.serialize();
        let mut signatures = vec![Signature::default(); num_required];

        for signer in &self.additional {
            let position = message
                .static_account_keys()
                .iter()
                .take(num_required)
                .position(|key| *key == signer.pubkey())
                .ok_or(SigningError::UnknownSigner {
                    signer: signer.pubkey(),
                })?;
            let signature = signer
                .try_sign_message(&serialized)
                .map_err(|source| SigningError::Signer { source })?;
            if let Some(slot) = signatures.get_mut(position) {
                *slot = signature;
            }
        }

        Ok(VersionedTransaction {
            signatures,
            message,
        })
    }
}
