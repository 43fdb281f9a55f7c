use async_trait::async_trait;
use ethers::types::{Address, Bytes, H256, U64};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::{BackendError, Receipt, WalletBackend};
use crate::network::hex_chain_id;

// ── Configuration constants ───────────────────────────────────────────────────

/// Default timeout for a single wallet request. Authorization prompts wait on
/// the holder, so this is generous.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

// EIP-1193 provider error codes.
const USER_REJECTED: i64 = 4001;
const UNAUTHORIZED: i64 = 4100;
const DISCONNECTED: i64 = 4900;
const CHAIN_DISCONNECTED: i64 = 4901;
const UNRECOGNIZED_CHAIN: i64 = 4902;

// ── Types ─────────────────────────────────────────────────────────────────────

/// A wallet reachable over JSON-RPC, with optional authentication.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct WalletEndpoint {
    /// Human-readable label (e.g. "injected", "relay", "hosted").
    pub name: String,
    /// Full JSON-RPC URL.
    pub url: String,
    /// Optional authentication header name (e.g. "Authorization").
    #[serde(default)]
    pub auth_header: Option<String>,
    /// Optional authentication header value (e.g. "Bearer <token>").
    #[serde(default)]
    pub auth_value: Option<String>,
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

// The error variant goes first: an error response has no `result`, which an
// `Option` result type would otherwise happily accept as `None`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ResponseResult<T> {
    Error { error: RpcError },
    Success { result: T },
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

/// Either the request never got an answer, or the wallet answered with an
/// error object.
#[derive(Debug)]
enum RequestFailure {
    Transport(BackendError),
    Wallet { code: i64, message: String },
}

impl RequestFailure {
    fn into_backend_error(self) -> BackendError {
        match self {
            RequestFailure::Transport(e) => e,
            RequestFailure::Wallet { code, message } => match code {
                USER_REJECTED | UNAUTHORIZED => BackendError::Rejected(message),
                DISCONNECTED | CHAIN_DISCONNECTED => BackendError::Unavailable(message),
                _ => BackendError::Rpc(format!("code {code}: {message}")),
            },
        }
    }
}

/// EIP-1193 wallet spoken to as JSON-RPC over HTTP.
///
/// Signing happens wallet-side: `eth_sendTransaction` hands the call to the
/// wallet, which prompts the holder and broadcasts.
pub struct RpcWallet {
    endpoint: WalletEndpoint,
    client: Client,
    request_timeout: Duration,
    next_id: AtomicU64,
}

impl RpcWallet {
    pub fn new(endpoint: WalletEndpoint) -> Self {
        Self {
            endpoint,
            client: Client::new(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    async fn raw_request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, RequestFailure> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        tracing::debug!(wallet = %self.endpoint.name, method, "Sending wallet request");

        let mut req = self.client.post(&self.endpoint.url).json(&request);

        // Attach endpoint-specific auth header if configured.
        if let (Some(header), Some(value)) = (&self.endpoint.auth_header, &self.endpoint.auth_value) {
            req = req.header(header.as_str(), value.as_str());
        }

        let response = tokio::time::timeout(self.request_timeout, req.send())
            .await
            .map_err(|_| {
                RequestFailure::Transport(BackendError::Unavailable(format!("{method} timed out")))
            })?
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    RequestFailure::Transport(BackendError::Unavailable(e.to_string()))
                } else {
                    RequestFailure::Transport(BackendError::Rpc(format!("Network error: {e}")))
                }
            })?;

        if !response.status().is_success() {
            return Err(RequestFailure::Transport(BackendError::Rpc(format!(
                "HTTP {}",
                response.status().as_u16()
            ))));
        }

        let body: ResponseResult<T> = response.json().await.map_err(|e| {
            RequestFailure::Transport(BackendError::Rpc(format!("Failed to parse response: {e}")))
        })?;

        match body {
            ResponseResult::Success { result } => Ok(result),
            ResponseResult::Error { error } => {
                tracing::debug!(
                    wallet = %self.endpoint.name,
                    method,
                    code = error.code,
                    "Wallet returned an error: {}",
                    error.message
                );
                Err(RequestFailure::Wallet {
                    code: error.code,
                    message: error.message,
                })
            }
        }
    }

    async fn request<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, BackendError> {
        self.raw_request(method, params)
            .await
            .map_err(RequestFailure::into_backend_error)
    }
}

#[async_trait]
impl WalletBackend for RpcWallet {
    fn name(&self) -> &str {
        &self.endpoint.name
    }

    async fn request_accounts(&self) -> Result<Vec<Address>, BackendError> {
        self.request("eth_requestAccounts", json!([])).await
    }

    async fn chain_id(&self) -> Result<u64, BackendError> {
        let id: U64 = self.request("eth_chainId", json!([])).await?;
        Ok(id.as_u64())
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<(), BackendError> {
        let params = json!([{ "chainId": hex_chain_id(chain_id) }]);
        match self.raw_request::<Value>("wallet_switchEthereumChain", params).await {
            Ok(_) => Ok(()),
            Err(RequestFailure::Wallet { code: UNRECOGNIZED_CHAIN, .. }) => {
                Err(BackendError::UnrecognizedChain(chain_id))
            }
            Err(other) => Err(other.into_backend_error()),
        }
    }

    async fn send_transaction(
        &self,
        from: Address,
        to: Address,
        data: Bytes,
    ) -> Result<H256, BackendError> {
        let params = json!([{ "from": from, "to": to, "data": data }]);
        self.request("eth_sendTransaction", params).await
    }

    async fn transaction_receipt(&self, hash: H256) -> Result<Option<Receipt>, BackendError> {
        self.request("eth_getTransactionReceipt", json!([hash])).await
    }

    async fn transaction_known(&self, hash: H256) -> Result<bool, BackendError> {
        let tx: Option<Value> = self.request("eth_getTransactionByHash", json!([hash])).await?;
        Ok(tx.is_some())
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, BackendError> {
        self.request("eth_call", json!([{ "to": to, "data": data }, "latest"]))
            .await
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
