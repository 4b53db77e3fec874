//! JSON-RPC Submission Client
//!
//! Thin JSON-RPC 2.0 client over HTTP for online-mode submission. The node
//! is authoritative in online mode: this client only ships signed intents
//! and reports the node's verdict.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

use crate::dispatch::{SubmissionChannel, SubmitReceipt};
use crate::error::PipelineError;
use crate::intent::TransactionIntent;

/// Timeout for RPC requests
const RPC_TIMEOUT: Duration = Duration::from_secs(30);

/// JSON-RPC request ID counter
static REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// JSON-RPC 2.0 request
#[derive(Debug, Serialize)]
struct JsonRpcRequest {
    jsonrpc: &'static str,
    method: String,
    params: Value,
    id: u64,
}

/// JSON-RPC 2.0 response
#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    #[allow(dead_code)]
    jsonrpc: String,
    result: Option<T>,
    error: Option<JsonRpcError>,
    #[allow(dead_code)]
    id: u64,
}

/// JSON-RPC error
#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
    #[allow(dead_code)]
    data: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct SubmitResult {
    tx_hash: String,
}

/// JSON-RPC client bound to one node endpoint.
pub struct RpcClient {
    client: reqwest::Client,
    endpoint: String,
}

impl RpcClient {
    pub fn new(endpoint: &str) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .timeout(RPC_TIMEOUT)
            .build()
            .map_err(|e| PipelineError::Storage(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, PipelineError> {
        let id = REQUEST_ID.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method: method.to_string(),
            params,
            id,
        };

        debug!(method, id, "rpc call");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PipelineError::SubmissionTimeout
                } else {
                    PipelineError::SubmissionRejected(format!("request failed: {e}"))
                }
            })?;

        if !response.status().is_success() {
            return Err(PipelineError::SubmissionRejected(format!(
                "HTTP error: {}",
                response.status()
            )));
        }

        let json_response: JsonRpcResponse<T> = response
            .json()
            .await
            .map_err(|e| PipelineError::SubmissionRejected(format!("invalid response: {e}")))?;

        if let Some(error) = json_response.error {
            return Err(PipelineError::SubmissionRejected(format!(
                "RPC error {}: {}",
                error.code, error.message
            )));
        }

        json_response.result.ok_or_else(|| {
            PipelineError::SubmissionRejected("missing result in RPC response".into())
        })
    }
}

impl SubmissionChannel for RpcClient {
    async fn submit(&self, intent: &TransactionIntent) -> Result<SubmitReceipt, PipelineError> {
        let intent_hex = intent.to_hex()?;
        let result: SubmitResult = self
            .call("intent_submit", json!({ "intent_hex": intent_hex }))
            .await?;
        Ok(SubmitReceipt {
            tx_hash: result.tx_hash,
        })
    }
}
