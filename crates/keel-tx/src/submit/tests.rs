//! Submission pipeline unit tests.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use async_trait::async_trait;
use serde_json::json;
use solana_keypair::Keypair;
use solana_pubkey::Pubkey;
use solana_signature::Signature;
use solana_signer::Signer;
use solana_system_interface::instruction as system_instruction;
use solana_transaction::versioned::VersionedTransaction;

use super::*;
use crate::{
    builder::TxBuilder,
    sign::{SignerSet, SigningError, WalletSigner},
};

/// Blockhash returned by every mock endpoint.
const TEST_BLOCKHASH: [u8; 32] = [7_u8; 32];

/// Scripted endpoint for submission pipeline tests.
struct MockEndpoint {
    /// Scripted status observations; the final entry repeats.
    statuses: Mutex<VecDeque<SignatureStatus>>,
    /// Bytes whose send calls are rejected.
    fail_bytes: Option<Vec<u8>>,
    /// Scripted simulation response; absent means simulation is unreachable.
    simulation: Option<SimulationResult>,
    /// Number of send calls.
    send_calls: Mutex<u64>,
    /// Number of status polls.
    status_calls: Mutex<u64>,
    /// Number of simulation calls.
    simulate_calls: Mutex<u64>,
}

impl MockEndpoint {
    /// Creates an endpoint scripted with status observations.
    fn with_statuses(statuses: Vec<SignatureStatus>) -> Self {
        Self {
            statuses: Mutex::new(statuses.into()),
            fail_bytes: None,
            simulation: None,
            send_calls: Mutex::new(0),
            status_calls: Mutex::new(0),
            simulate_calls: Mutex::new(0),
        }
    }

    /// Creates an endpoint that confirms every signature immediately.
    fn confirming() -> Self {
        Self::with_statuses(vec![SignatureStatus::at(ConfirmationLevel::Confirmed)])
    }

    /// Rejects send calls whose bytes equal the given blob.
    fn with_fail_bytes(mut self, bytes: Vec<u8>) -> Self {
        self.fail_bytes = Some(bytes);
        self
    }

    /// Scripts the simulation response.
    fn with_simulation(mut self, simulation: SimulationResult) -> Self {
        self.simulation = Some(simulation);
        self
    }

}

/// Reads a call counter.
fn count(counter: &Mutex<u64>) -> u64 {
    counter.lock().map(|calls| *calls).unwrap_or_default()
}

/// Increments a call counter.
fn bump(counter: &Mutex<u64>) {
    if let Ok(mut calls) = counter.lock() {
        *calls = calls.saturating_add(1);
    }
}

#[async_trait]
impl RpcEndpoint for MockEndpoint {
    async fn send_transaction(
        &self,
        tx_bytes: &[u8],
        _config: &SendConfig,
    ) -> Result<Signature, EndpointError> {
        bump(&self.send_calls);
        if self.fail_bytes.as_deref() == Some(tx_bytes) {
            return Err(EndpointError::Failure {
                message: "send rejected".to_owned(),
            });
        }
        let tx: VersionedTransaction =
            bincode::deserialize(tx_bytes).map_err(|error| EndpointError::Failure {
                message: error.to_string(),
            })?;
        Ok(tx.signatures.first().copied().unwrap_or_default())
    }

    async fn signature_status(
        &self,
        _signature: &Signature,
    ) -> Result<SignatureStatus, EndpointError> {
        bump(&self.status_calls);
        let mut statuses = self
            .statuses
            .lock()
            .map_err(|poisoned| EndpointError::Failure {
                message: poisoned.to_string(),
            })?;
        if statuses.len() > 1
            && let Some(status) = statuses.pop_front()
        {
            return Ok(status);
        }
        Ok(statuses
            .front()
            .cloned()
            .unwrap_or(SignatureStatus::at(ConfirmationLevel::Confirmed)))
    }

    async fn simulate_transaction(
        &self,
        _tx_bytes: &[u8],
        _commitment: ConfirmationLevel,
    ) -> Result<SimulationResult, EndpointError> {
        bump(&self.simulate_calls);
        self.simulation.clone().ok_or(EndpointError::Failure {
            message: "simulation unavailable".to_owned(),
        })
    }

    async fn latest_blockhash(&self) -> Result<[u8; 32], EndpointError> {
        Ok(TEST_BLOCKHASH)
    }
}

/// Wallet stub signing with a held keypair, counting approval flows.
struct MockWallet {
    /// Keypair backing the wallet identity.
    keypair: Keypair,
    /// Number of single-transaction approvals.
    sign_calls: Mutex<u64>,
    /// Number of batch approvals.
    sign_all_calls: Mutex<u64>,
}

impl MockWallet {
    /// Creates a wallet with a fresh keypair.
    fn new() -> Self {
        Self {
            keypair: Keypair::new(),
            sign_calls: Mutex::new(0),
            sign_all_calls: Mutex::new(0),
        }
    }

    /// Fills the wallet's signature slot in a partially signed transaction.
    fn countersign(&self, tx: VersionedTransaction) -> VersionedTransaction {
        let VersionedTransaction {
            mut signatures,
            message,
        } = tx;
        let position = message
            .static_account_keys()
            .iter()
            .position(|key| *key == self.keypair.pubkey());
        if let Some(position) = position
            && let Ok(signature) = self.keypair.try_sign_message(&message.serialize())
            && let Some(slot) = signatures.get_mut(position)
        {
            *slot = signature;
        }
        VersionedTransaction {
            signatures,
            message,
        }
    }
}

#[async_trait]
impl WalletSigner for MockWallet {
    async fn sign_transaction(
        &self,
        tx: VersionedTransaction,
    ) -> Result<VersionedTransaction, SigningError> {
        bump(&self.sign_calls);
        Ok(self.countersign(tx))
    }

    async fn sign_all_transactions(
        &self,
        txs: Vec<VersionedTransaction>,
    ) -> Result<Vec<VersionedTransaction>, SigningError> {
        bump(&self.sign_all_calls);
        Ok(txs.into_iter().map(|tx| self.countersign(tx)).collect())
    }
}

/// Tuning short enough for tests, long enough to avoid flakes.
fn fast_config() -> LandConfig {
    LandConfig {
        timeout: Duration::from_millis(500),
        required_level: ConfirmationLevel::Confirmed,
        rebroadcast_interval: Duration::from_millis(25),
        poll_interval: Duration::from_millis(10),
        max_in_flight: 4,
    }
}

/// Builds a transfer skeleton from payer to recipient.
fn transfer_builder(payer: Pubkey, recipient: Pubkey, lamports: u64) -> TxBuilder {
    TxBuilder::new(payer).add_instruction(system_instruction::transfer(
        &payer, &recipient, lamports,
    ))
}

/// Signs a transfer locally and returns its serialized bytes and signature.
fn signed_transfer_bytes(payer: &Keypair, recipient: Pubkey, lamports: u64) -> (Vec<u8>, Signature) {
    let tx_result = transfer_builder(payer.pubkey(), recipient, lamports)
        .build_unsigned(TEST_BLOCKHASH)
        .sign(&[payer]);

    assert!(tx_result.is_ok());
    let mut bytes = Vec::new();
    let mut signature = Signature::default();
    if let Ok(tx) = tx_result {
        let first = tx.signatures.first();
        assert!(first.is_some());
        if let Some(first) = first {
            signature = *first;
        }
        let encoded_result = bincode::serialize(&tx);
        assert!(encoded_result.is_ok());
        if let Ok(encoded) = encoded_result {
            bytes = encoded;
        }
    }
    (bytes, signature)
}

#[tokio::test]
async fn submit_confirms_and_returns_signature() {
    let endpoint = Arc::new(MockEndpoint::with_statuses(vec![
        SignatureStatus::at(ConfirmationLevel::Processed),
        SignatureStatus::at(ConfirmationLevel::Confirmed),
    ]));
    let client = TxSubmitClient::new(endpoint.clone()).with_land_config(fast_config());

    let payer = Arc::new(Keypair::new());
    let recipient = Pubkey::new_unique();
    let (_bytes, expected) = signed_transfer_bytes(&payer, recipient, 1);
    let signers = SignerSet::local(Arc::clone(&payer));

    let result = client
        .submit(transfer_builder(payer.pubkey(), recipient, 1), &signers)
        .await;

    assert!(result.is_ok());
    if let Ok(signature) = result {
        assert_eq!(signature, expected);
    }
    assert!(count(&endpoint.status_calls) >= 2);
}

#[tokio::test]
async fn timeout_fires_only_after_deadline() {
    let endpoint = Arc::new(MockEndpoint::with_statuses(vec![SignatureStatus::at(
        ConfirmationLevel::Processed,
    )]));
    let config = LandConfig {
        timeout: Duration::from_millis(150),
        ..fast_config()
    };
    let client = TxSubmitClient::new(endpoint.clone()).with_land_config(config);

    let payer = Arc::new(Keypair::new());
    let recipient = Pubkey::new_unique();
    let signers = SignerSet::local(Arc::clone(&payer));

    let started = Instant::now();
    let result = client
        .submit(transfer_builder(payer.pubkey(), recipient, 1), &signers)
        .await;

    assert!(started.elapsed() >= Duration::from_millis(150));
    assert!(matches!(
        &result,
        Err(SubmitError::ConfirmationTimeout { waited, .. })
            if *waited >= Duration::from_millis(150)
    ));
    if let Err(SubmitError::ConfirmationTimeout { message, .. }) = result {
        assert!(message.contains("may still land"));
    }
    assert_eq!(count(&endpoint.simulate_calls), 1);
}

#[tokio::test]
async fn execution_error_short_circuits_and_is_diagnosed() {
    let err = json!({ "InstructionError": [0, { "Custom": 1 }] });
    let endpoint = Arc::new(
        MockEndpoint::with_statuses(vec![SignatureStatus {
            level: ConfirmationLevel::Processed,
            err: Some(err.clone()),
        }])
        .with_simulation(SimulationResult {
            err: Some(err),
            logs: vec![
                "Program log: step1".to_owned(),
                "Program log: insufficient funds".to_owned(),
                "Program consumed 100 units".to_owned(),
            ],
        }),
    );
    let config = LandConfig {
        timeout: Duration::from_secs(5),
        ..fast_config()
    };
    let client = TxSubmitClient::new(endpoint.clone()).with_land_config(config);

    let payer = Arc::new(Keypair::new());
    let recipient = Pubkey::new_unique();
    let signers = SignerSet::local(Arc::clone(&payer));

    let started = Instant::now();
    let result = client
        .submit(transfer_builder(payer.pubkey(), recipient, 1), &signers)
        .await;

    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(matches!(
        result,
        Err(SubmitError::Execution { err: _, ref message }) if message == "insufficient funds"
    ));
}

#[tokio::test]
async fn diagnosis_falls_back_to_raw_payload() {
    let err = json!("AccountNotFound");
    let endpoint = Arc::new(
        MockEndpoint::with_statuses(vec![SignatureStatus {
            level: ConfirmationLevel::Processed,
            err: Some(err.clone()),
        }])
        .with_simulation(SimulationResult {
            err: Some(err),
            logs: vec!["Program consumed 100 units".to_owned()],
        }),
    );
    let client = TxSubmitClient::new(endpoint).with_land_config(fast_config());

    let payer = Arc::new(Keypair::new());
    let recipient = Pubkey::new_unique();
    let signers = SignerSet::local(Arc::clone(&payer));

    let result = client
        .submit(transfer_builder(payer.pubkey(), recipient, 1), &signers)
        .await;

    assert!(matches!(
        result,
        Err(SubmitError::Execution { err: _, ref message }) if message == "\"AccountNotFound\""
    ));
}

#[tokio::test]
async fn batch_isolates_failing_slot_and_stops_all_loops() {
    let payer = Arc::new(Keypair::new());
    let recipient = Pubkey::new_unique();
    let (failing_bytes, _signature) = signed_transfer_bytes(&payer, recipient, 2);
    let endpoint = Arc::new(MockEndpoint::confirming().with_fail_bytes(failing_bytes));
    let client = TxSubmitClient::new(endpoint.clone()).with_land_config(fast_config());

    let signers = SignerSet::local(Arc::clone(&payer));
    let builders = vec![
        transfer_builder(payer.pubkey(), recipient, 1),
        transfer_builder(payer.pubkey(), recipient, 2),
        transfer_builder(payer.pubkey(), recipient, 3),
    ];

    let results = client.submit_batch(builders, &signers).await;

    assert_eq!(results.len(), 3);
    assert!(results.first().is_some_and(Result::is_ok));
    assert!(matches!(
        results.get(1),
        Some(Err(SubmitError::Send { source: _ }))
    ));
    assert!(results.get(2).is_some_and(|slot| slot.is_ok()));

    let settled = count(&endpoint.send_calls);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(count(&endpoint.send_calls), settled);
}

#[tokio::test]
async fn no_rebroadcast_after_submit_returns() {
    let endpoint = Arc::new(MockEndpoint::confirming());
    let client = TxSubmitClient::new(endpoint.clone()).with_land_config(fast_config());

    let payer = Arc::new(Keypair::new());
    let recipient = Pubkey::new_unique();
    let signers = SignerSet::local(Arc::clone(&payer));

    let result = client
        .submit(transfer_builder(payer.pubkey(), recipient, 1), &signers)
        .await;
    assert!(result.is_ok());

    let settled = count(&endpoint.send_calls);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(count(&endpoint.send_calls), settled);
}

#[tokio::test]
async fn rebroadcast_repeats_until_confirmed() {
    let mut statuses = vec![SignatureStatus::at(ConfirmationLevel::Processed); 15];
    statuses.push(SignatureStatus::at(ConfirmationLevel::Confirmed));
    let endpoint = Arc::new(MockEndpoint::with_statuses(statuses));
    let config = LandConfig {
        rebroadcast_interval: Duration::from_millis(30),
        poll_interval: Duration::from_millis(10),
        timeout: Duration::from_secs(5),
        ..fast_config()
    };
    let client = TxSubmitClient::new(endpoint.clone()).with_land_config(config);

    let payer = Arc::new(Keypair::new());
    let recipient = Pubkey::new_unique();
    let signers = SignerSet::local(Arc::clone(&payer));

    let result = client
        .submit(transfer_builder(payer.pubkey(), recipient, 1), &signers)
        .await;

    assert!(result.is_ok());
    assert!(count(&endpoint.send_calls) >= 3);
}

#[tokio::test]
async fn pre_signed_lands_on_fast_path() {
    let endpoint = Arc::new(MockEndpoint::confirming());
    let client = TxSubmitClient::new(endpoint.clone());

    let payer = Keypair::new();
    let recipient = Pubkey::new_unique();
    let (bytes, expected) = signed_transfer_bytes(&payer, recipient, 1);

    let result = client
        .submit_pre_signed(SignedTx::VersionedTransactionBytes(bytes))
        .await;

    assert!(result.is_ok());
    if let Ok(signature) = result {
        assert_eq!(signature, expected);
    }
    assert_eq!(count(&endpoint.send_calls), 1);
}

#[tokio::test]
async fn pre_signed_rejects_undecodable_bytes() {
    let endpoint = Arc::new(MockEndpoint::confirming());
    let client = TxSubmitClient::new(endpoint.clone());

    let result = client
        .submit_pre_signed(SignedTx::WireTransactionBytes(vec![1_u8, 2, 3]))
        .await;

    assert!(matches!(
        result,
        Err(SubmitError::DecodeSignedBytes { source: _ })
    ));
    assert_eq!(count(&endpoint.send_calls), 0);
}

#[tokio::test]
async fn wallet_payer_delegates_signing() {
    let endpoint = Arc::new(MockEndpoint::confirming());
    let client = TxSubmitClient::new(endpoint).with_land_config(fast_config());

    let wallet = Arc::new(MockWallet::new());
    let payer = wallet.keypair.pubkey();
    let recipient = Pubkey::new_unique();
    let signers = SignerSet::wallet(Arc::clone(&wallet) as Arc<dyn WalletSigner>);

    let result = client
        .submit(transfer_builder(payer, recipient, 1), &signers)
        .await;

    assert!(result.is_ok());
    assert_eq!(count(&wallet.sign_calls), 1);
    assert_eq!(count(&wallet.sign_all_calls), 0);
}

#[tokio::test]
async fn wallet_batch_signs_in_one_approval_flow() {
    let endpoint = Arc::new(MockEndpoint::confirming());
    let client = TxSubmitClient::new(endpoint).with_land_config(fast_config());

    let wallet = Arc::new(MockWallet::new());
    let payer = wallet.keypair.pubkey();
    let recipient = Pubkey::new_unique();
    let signers = SignerSet::wallet(Arc::clone(&wallet) as Arc<dyn WalletSigner>);

    let results = client
        .submit_batch(
            vec![
                transfer_builder(payer, recipient, 1),
                transfer_builder(payer, recipient, 2),
            ],
            &signers,
        )
        .await;

    assert_eq!(results.len(), 2);
    assert!(results.iter().all(Result::is_ok));
    assert_eq!(count(&wallet.sign_all_calls), 1);
    assert_eq!(count(&wallet.sign_calls), 0);
}

#[tokio::test]
async fn initial_send_failure_surfaces_without_loop() {
    let payer = Arc::new(Keypair::new());
    let recipient = Pubkey::new_unique();
    let (bytes, _signature) = signed_transfer_bytes(&payer, recipient, 1);
    let endpoint = Arc::new(MockEndpoint::confirming().with_fail_bytes(bytes));
    let client = TxSubmitClient::new(endpoint.clone()).with_land_config(fast_config());

    let signers = SignerSet::local(Arc::clone(&payer));
    let result = client
        .submit(transfer_builder(payer.pubkey(), recipient, 1), &signers)
        .await;

    assert!(matches!(result, Err(SubmitError::Send { source: _ })));
    assert_eq!(count(&endpoint.send_calls), 1);
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(count(&endpoint.send_calls), 1);
    assert_eq!(count(&endpoint.status_calls), 0);
}
