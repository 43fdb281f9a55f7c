//! Network provider adapter: a uniform request/sign surface over whichever
//! wallet backend the holder connected with.

use async_trait::async_trait;
use ethers::types::{Address, Bytes, H256, U64};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

pub mod connector;
pub mod rpc;

#[cfg(test)]
pub(crate) mod fake;

pub use connector::Connector;
pub use rpc::{RpcWallet, WalletEndpoint};

/// Errors raised by a single wallet backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The backend cannot be reached or has no account to offer.
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// The holder declined the request in the wallet (EIP-1193 code 4001).
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// The wallet does not know the requested chain (EIP-1193 code 4902).
    #[error("Unrecognized chain {0}")]
    UnrecognizedChain(u64),

    #[error("RPC error: {0}")]
    Rpc(String),
}

/// Terminal status of a submitted (or attempted) transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxOutcome {
    /// Included with success status.
    Mined,
    /// Included with failure status.
    Reverted,
    /// No longer known to the node (dropped or replaced).
    Dropped,
    /// Still pending when the wait deadline passed.
    TimedOut,
    /// The holder abandoned the wait.
    Cancelled,
    /// The holder declined to sign.
    Rejected,
    /// The wallet failed to submit it.
    NotSent,
}

impl fmt::Display for TxOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TxOutcome::Mined => "mined",
            TxOutcome::Reverted => "reverted",
            TxOutcome::Dropped => "dropped or replaced",
            TxOutcome::TimedOut => "timed out while pending",
            TxOutcome::Cancelled => "cancelled",
            TxOutcome::Rejected => "rejected in wallet",
            TxOutcome::NotSent => "not sent",
        };
        f.write_str(text)
    }
}

/// The subset of `eth_getTransactionReceipt` the client relies on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub transaction_hash: H256,
    #[serde(default)]
    pub status: Option<U64>,
    #[serde(default)]
    pub block_number: Option<U64>,
}

impl Receipt {
    /// Only an explicit `status == 1` counts as success.
    pub fn succeeded(&self) -> bool {
        self.status == Some(U64::one())
    }
}

/// Request surface every wallet backend must provide.
#[async_trait]
pub trait WalletBackend: Send + Sync {
    /// Label used in logs and the view (e.g. `"injected"`).
    fn name(&self) -> &str;

    /// Ask the holder to authorize the client; returns the exposed accounts.
    async fn request_accounts(&self) -> Result<Vec<Address>, BackendError>;

    async fn chain_id(&self) -> Result<u64, BackendError>;

    async fn switch_chain(&self, chain_id: u64) -> Result<(), BackendError>;

    /// Sign and broadcast a contract call from `from`; returns the tx hash.
    async fn send_transaction(
        &self,
        from: Address,
        to: Address,
        data: Bytes,
    ) -> Result<H256, BackendError>;

    /// `None` while the transaction is not yet mined.
    async fn transaction_receipt(&self, hash: H256) -> Result<Option<Receipt>, BackendError>;

    /// Whether the node still knows about the transaction at all.
    async fn transaction_known(&self, hash: H256) -> Result<bool, BackendError>;

    /// Read-only contract call.
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, BackendError>;
}

/// A live, authorized connection to one holder's wallet.
///
/// Owned by the controller and passed by reference into every operation
/// that needs it. Cloning shares the same backend.
#[derive(Clone)]
pub struct Session {
    backend: Arc<dyn WalletBackend>,
    account: Address,
    can_sign: bool,
}

impl Session {
    pub fn new(backend: Arc<dyn WalletBackend>, account: Address) -> Self {
        Self {
            backend,
            account,
            can_sign: true,
        }
    }

    /// A session that may read but never submit transactions.
    pub fn read_only(backend: Arc<dyn WalletBackend>, account: Address) -> Self {
        Self {
            backend,
            account,
            can_sign: false,
        }
    }

    pub fn backend(&self) -> &dyn WalletBackend {
        self.backend.as_ref()
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn account(&self) -> Address {
        self.account
    }

    pub fn can_sign(&self) -> bool {
        self.can_sign
    }

    /// Current chain of the wallet, read live on every call.
    pub async fn chain_id(&self) -> Result<u64, BackendError> {
        self.backend.chain_id().await
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("backend", &self.backend.name())
            .field("account", &self.account)
            .field("can_sign", &self.can_sign)
            .finish()
    }
}
