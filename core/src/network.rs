use serde::{Deserialize, Serialize};

use crate::errors::FlowError;
use crate::wallet::{BackendError, Session};

// ── Deployment networks ───────────────────────────────────────────────────────

/// A deployment target the client can be pointed at.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Network {
    /// Human-readable label for this network.
    pub name: String,
    /// EIP-155 chain identifier the wallet must report.
    pub chain_id: u64,
}

/// Chain id as the `0x`-prefixed hex string wallets expect in
/// `wallet_switchEthereumChain`.
pub fn hex_chain_id(chain_id: u64) -> String {
    format!("{chain_id:#x}")
}

/// Görli testnet, where the issuance contracts were first deployed.
pub fn goerli() -> Network {
    Network {
        name: "Goerli".to_string(),
        chain_id: 5,
    }
}

pub fn sepolia() -> Network {
    Network {
        name: "Sepolia".to_string(),
        chain_id: 11_155_111,
    }
}

pub fn mainnet() -> Network {
    Network {
        name: "Ethereum Mainnet".to_string(),
        chain_id: 1,
    }
}

/// Resolve a preset name to the corresponding `Network`.
///
/// Recognised names (case-insensitive):
/// - `"goerli"` / `"gorli"`
/// - `"sepolia"`
/// - `"mainnet"` / `"ethereum"`
pub fn resolve_preset(name: &str) -> Option<Network> {
    match name.to_lowercase().as_str() {
        "goerli" | "gorli" => Some(goerli()),
        "sepolia" => Some(sepolia()),
        "mainnet" | "ethereum" => Some(mainnet()),
        _ => None,
    }
}

// ── Network guard ─────────────────────────────────────────────────────────────

/// Make sure the session's wallet is on `expected_chain_id` before anything
/// touches a contract address.
///
/// On a mismatch the wallet is asked to switch, and the chain is read again
/// afterwards: only a wallet that actually reports the expected chain passes.
pub async fn assert_network(session: &Session, expected_chain_id: u64) -> Result<(), FlowError> {
    let current = session.chain_id().await.map_err(|e| {
        tracing::warn!(
            backend = %session.backend_name(),
            error = %e,
            "Could not read wallet chain id"
        );
        FlowError::WrongNetwork {
            expected: expected_chain_id,
            actual: None,
        }
    })?;

    if current == expected_chain_id {
        return Ok(());
    }

    tracing::info!(
        backend = %session.backend_name(),
        current,
        expected = expected_chain_id,
        "Wallet on wrong network, requesting switch to {}",
        hex_chain_id(expected_chain_id)
    );

    if let Err(e) = session.backend().switch_chain(expected_chain_id).await {
        match &e {
            BackendError::Rejected(_) => {
                tracing::info!(expected = expected_chain_id, "Network switch declined by holder")
            }
            _ => tracing::warn!(
                expected = expected_chain_id,
                error = %e,
                "Network switch failed"
            ),
        }
        return Err(FlowError::WrongNetwork {
            expected: expected_chain_id,
            actual: Some(current),
        });
    }

    match session.chain_id().await {
        Ok(id) if id == expected_chain_id => {
            tracing::info!(chain_id = id, "Wallet switched network");
            Ok(())
        }
        Ok(id) => Err(FlowError::WrongNetwork {
            expected: expected_chain_id,
            actual: Some(id),
        }),
        Err(_) => Err(FlowError::WrongNetwork {
            expected: expected_chain_id,
            actual: None,
        }),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
