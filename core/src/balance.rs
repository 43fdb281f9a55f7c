use ethers::types::Address;

use crate::amount::Amount;
use crate::contracts;
use crate::errors::FlowError;
use crate::network;
use crate::wallet::Session;

/// Read `holder`'s balance of `token`.
///
/// A pure read: no signature, no gas. Every failure on the way (network
/// guard, RPC, undecodable return data) comes back as `ReadFailed`.
pub async fn read_balance(
    session: &Session,
    expected_chain_id: u64,
    token: Address,
    holder: Address,
) -> Result<Amount, FlowError> {
    network::assert_network(session, expected_chain_id)
        .await
        .map_err(|e| FlowError::ReadFailed(e.to_string()))?;
    balance_of(session, token, holder).await
}

/// `read_balance` without the network guard, for callers that already ran
/// it for a batch of reads.
pub async fn balance_of(
    session: &Session,
    token: Address,
    holder: Address,
) -> Result<Amount, FlowError> {
    read_uint(session, token, contracts::balance_of(holder)).await
}

/// Total minted supply of `token`.
pub async fn read_total_supply(
    session: &Session,
    expected_chain_id: u64,
    token: Address,
) -> Result<Amount, FlowError> {
    network::assert_network(session, expected_chain_id)
        .await
        .map_err(|e| FlowError::ReadFailed(e.to_string()))?;
    total_supply_of(session, token).await
}

/// `read_total_supply` without the network guard.
pub async fn total_supply_of(session: &Session, token: Address) -> Result<Amount, FlowError> {
    read_uint(session, token, contracts::total_supply()).await
}

/// `decimals()` of an ERC-20. The caller is expected to have run the
/// network guard already.
pub async fn read_decimals(session: &Session, asset: Address) -> Result<u8, FlowError> {
    let raw = session
        .backend()
        .call(asset, contracts::decimals())
        .await
        .map_err(|e| FlowError::ReadFailed(e.to_string()))?;
    contracts::decode_decimals(&raw).map_err(|e| FlowError::ReadFailed(e.to_string()))
}

async fn read_uint(
    session: &Session,
    contract: Address,
    data: ethers::types::Bytes,
) -> Result<Amount, FlowError> {
    let raw = session
        .backend()
        .call(contract, data)
        .await
        .map_err(|e| FlowError::ReadFailed(e.to_string()))?;
    contracts::decode_uint(&raw)
        .map(Amount)
        .map_err(|e| FlowError::ReadFailed(e.to_string()))
}

/// Presentation-side adapter: a failed read is shown as zero and logged.
///
/// A zero coming out of here means "unknown or empty", never a verified
/// empty balance.
pub fn balance_or_zero(result: Result<Amount, FlowError>) -> Amount {
    match result {
        Ok(amount) => amount,
        Err(e) => {
            tracing::warn!(error = %e, "Balance read failed, displaying zero");
            Amount::zero()
        }
    }
}
