//! JSON-RPC endpoint implementation.

use std::{str::FromStr, time::Duration};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64_STANDARD};
use serde::Deserialize;
use serde_json::Value;
use solana_hash::Hash;
use solana_signature::Signature;

use super::{
    ConfirmationLevel, EndpointError, RpcEndpoint, SendConfig, SignatureStatus, SimulationResult,
};

/// JSON-RPC endpoint speaking `sendTransaction`, `getSignatureStatuses`,
/// `simulateTransaction`, and `getLatestBlockhash`.
#[derive(Debug, Clone)]
pub struct JsonRpcEndpoint {
    /// HTTP client used for RPC calls.
    client: reqwest::Client,
    /// Target JSON-RPC endpoint URL.
    rpc_url: String,
}

impl JsonRpcEndpoint {
    /// Creates a JSON-RPC endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointError::Config`] when HTTP client creation fails.
    pub fn new(rpc_url: impl Into<String>) -> Result<Self, EndpointError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|error| EndpointError::Config {
                message: error.to_string(),
            })?;
        Ok(Self {
            client,
            rpc_url: rpc_url.into(),
        })
    }

    /// Posts one JSON-RPC call and returns the `result` payload.
    async fn call(&self, method: &'static str, params: Value) -> Result<Value, EndpointError> {
        let payload = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(&self.rpc_url)
            .json(&payload)
            .send()
            .await
            .map_err(|error| EndpointError::Failure {
                message: error.to_string(),
            })?;

        let response = response
            .error_for_status()
            .map_err(|error| EndpointError::Failure {
                message: error.to_string(),
            })?;

        let parsed: JsonRpcResponse =
            response
                .json()
                .await
                .map_err(|error| EndpointError::Failure {
                    message: error.to_string(),
                })?;

        if let Some(result) = parsed.result {
            return Ok(result);
        }
        if let Some(error) = parsed.error {
            return Err(EndpointError::Failure {
                message: format!("rpc error {}: {}", error.code, error.message),
            });
        }

        Err(EndpointError::Failure {
            message: "rpc returned neither result nor error".to_owned(),
        })
    }
}

/// JSON-RPC envelope.
#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    /// Result value for successful calls.
    result: Option<Value>,
    /// Error payload for failed calls.
    error: Option<JsonRpcError>,
}

/// JSON-RPC error object.
#[derive(Debug, Deserialize)]
struct JsonRpcError {
    /// JSON-RPC error code.
    code: i64,
    /// Human-readable message.
    message: String,
}

/// Context-wrapped RPC result value.
#[derive(Debug, Deserialize)]
struct RpcContextValue<T> {
    /// Inner value.
    value: T,
}

/// One `getSignatureStatuses` slot.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcSignatureStatus {
    /// On-chain error payload.
    err: Option<Value>,
    /// Commitment string for the observation.
    confirmation_status: Option<String>,
}

/// `simulateTransaction` result value.
#[derive(Debug, Deserialize)]
struct RpcSimulationValue {
    /// On-chain error payload.
    err: Option<Value>,
    /// Emitted log lines.
    logs: Option<Vec<String>>,
}

/// `getLatestBlockhash` result value.
#[derive(Debug, Deserialize)]
struct RpcBlockhashValue {
    /// Base58-encoded blockhash.
    blockhash: String,
}

/// Decodes a context-wrapped RPC value.
fn decode_value<T>(result: Value) -> Result<T, EndpointError>
where
    T: for<'de> Deserialize<'de>,
{
    let context: RpcContextValue<T> =
        serde_json::from_value(result).map_err(|error| EndpointError::Failure {
            message: format!("failed to decode rpc result: {error}"),
        })?;
    Ok(context.value)
}

#[async_trait]
impl RpcEndpoint for JsonRpcEndpoint {
    async fn send_transaction(
        &self,
        tx_bytes: &[u8],
        config: &SendConfig,
    ) -> Result<Signature, EndpointError> {
        let encoded_tx = BASE64_STANDARD.encode(tx_bytes);
        let mut rpc_config = serde_json::json!({
            "encoding": "base64",
            "skipPreflight": config.skip_preflight,
        });
        if let Some(commitment) = config.preflight_commitment
            && let Some(entries) = rpc_config.as_object_mut()
        {
            let _ = entries.insert(
                "preflightCommitment".to_owned(),
                Value::from(commitment.commitment_str()),
            );
        }

        let result = self
            .call(
                "sendTransaction",
                serde_json::json!([encoded_tx, rpc_config]),
            )
            .await?;
        let signature_str = result.as_str().ok_or_else(|| EndpointError::Failure {
            message: "sendTransaction returned a non-string result".to_owned(),
        })?;
        Signature::from_str(signature_str).map_err(|error| EndpointError::Failure {
            message: format!("failed to parse returned signature: {error}"),
        })
    }

    async fn signature_status(
        &self,
        signature: &Signature,
    ) -> Result<SignatureStatus, EndpointError> {
        let result = self
            .call(
                "getSignatureStatuses",
                serde_json::json!([
                    [signature.to_string()],
                    { "searchTransactionHistory": false }
                ]),
            )
            .await?;
        let statuses: Vec<Option<RpcSignatureStatus>> = decode_value(result)?;
        let Some(Some(status)) = statuses.into_iter().next() else {
            return Ok(SignatureStatus::at(ConfirmationLevel::NotFound));
        };

        let level = match status.confirmation_status.as_deref() {
            Some(commitment) => ConfirmationLevel::from_commitment_str(commitment).ok_or_else(
                || EndpointError::Failure {
                    message: format!("unrecognized confirmation status: {commitment}"),
                },
            )?,
            None => ConfirmationLevel::Processed,
        };
        Ok(SignatureStatus {
            level,
            err: status.err,
        })
    }

    async fn simulate_transaction(
        &self,
        tx_bytes: &[u8],
        commitment: ConfirmationLevel,
    ) -> Result<SimulationResult, EndpointError> {
        let encoded_tx = BASE64_STANDARD.encode(tx_bytes);
        let result = self
            .call(
                "simulateTransaction",
                serde_json::json!([
                    encoded_tx,
                    {
                        "encoding": "base64",
                        "commitment": commitment.commitment_str(),
                        "sigVerify": false,
                        "replaceRecentBlockhash": true,
                    }
                ]),
            )
            .await?;
        let value: RpcSimulationValue = decode_value(result)?;
        Ok(SimulationResult {
            err: value.err,
            logs: value.logs.unwrap_or_default(),
        })
    }

    async fn latest_blockhash(&self) -> Result<[u8; 32], EndpointError> {
        let result = self.call("getLatestBlockhash", serde_json::json!([])).await?;
        let value: RpcBlockhashValue = decode_value(result)?;
        let hash = Hash::from_str(&value.blockhash).map_err(|error| EndpointError::Failure {
            message: format!("failed to parse returned blockhash: {error}"),
        })?;
        Ok(hash.to_bytes())
    }
}
