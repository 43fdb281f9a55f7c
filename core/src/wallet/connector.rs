use std::sync::Arc;

use super::{BackendError, Session, WalletBackend};
use crate::errors::FlowError;

/// Ordered list of wallet backends tried on connect.
///
/// The order matters: the first backend that yields an account wins.
pub struct Connector {
    backends: Vec<Arc<dyn WalletBackend>>,
}

impl Connector {
    pub fn new(backends: Vec<Arc<dyn WalletBackend>>) -> Self {
        Self { backends }
    }

    pub fn backend_names(&self) -> Vec<&str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Open a session on the first backend that can produce one.
    ///
    /// Unreachable backends and backends without accounts are skipped. A
    /// holder declining authorization ends the scan.
    pub async fn connect(&self) -> Result<Session, FlowError> {
        for backend in &self.backends {
            match backend.request_accounts().await {
                Ok(accounts) => match accounts.first() {
                    Some(account) => {
                        tracing::info!(
                            backend = %backend.name(),
                            account = ?account,
                            "Wallet connected"
                        );
                        return Ok(Session::new(Arc::clone(backend), *account));
                    }
                    None => {
                        tracing::debug!(backend = %backend.name(), "Backend exposed no accounts");
                    }
                },
                Err(BackendError::Rejected(reason)) => {
                    tracing::info!(
                        backend = %backend.name(),
                        reason = %reason,
                        "Holder declined wallet authorization"
                    );
                    return Err(FlowError::UserRejected);
                }
                Err(BackendError::Unavailable(reason)) => {
                    tracing::debug!(backend = %backend.name(), reason = %reason, "Backend unavailable");
                }
                Err(e) => {
                    tracing::warn!(backend = %backend.name(), error = %e, "Backend failed to connect");
                }
            }
        }

        tracing::warn!(
            tried = self.backends.len(),
            "No wallet backend produced a session"
        );
        Err(FlowError::NoWalletAvailable)
    }
}
