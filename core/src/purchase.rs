//! Two-step token purchase: approve the stable asset, then call the purchase
//! contract.

use ethers::types::{Address, Bytes, H256, U256};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use utoipa::ToSchema;

use crate::amount::Amount;
use crate::balance;
use crate::contracts::{self, ContractError};
use crate::errors::FlowError;
use crate::network;
use crate::wallet::{BackendError, Session, TxOutcome};

/// Consecutive "unknown" answers after which a never-seen transaction is
/// considered dropped.
const DROP_AFTER_UNKNOWN_POLLS: u32 = 3;

// ── Types ─────────────────────────────────────────────────────────────────────

/// Where a purchase currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseState {
    Idle,
    AwaitingApproval,
    Approved,
    AwaitingPurchase,
    Complete,
    Failed,
}

impl PurchaseState {
    /// States during which a second purchase must not start.
    pub fn in_flight(&self) -> bool {
        matches!(
            self,
            PurchaseState::AwaitingApproval | PurchaseState::Approved | PurchaseState::AwaitingPurchase
        )
    }
}

/// What to do with an allowance left behind by a failed purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllowancePolicy {
    /// Leave the approval in place; the next attempt overwrites it.
    #[default]
    Retain,
    /// Submit `approve(spender, 0)` once, best effort.
    RevokeOnFailure,
}

impl AllowancePolicy {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "retain" | "keep" => Some(Self::Retain),
            "revoke_on_failure" | "revoke" => Some(Self::RevokeOnFailure),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseSettings {
    /// Chain every call is guarded against.
    pub chain_id: u64,
    /// Stable asset the holder pays with.
    pub stable_address: Address,
    /// Issuance token; its contract also sells the token and spends the
    /// stable allowance.
    pub token_address: Address,
    pub stable_decimals: u8,
    /// Whole stable units charged per base unit purchased.
    pub unit_price: u64,
    pub purchase_signature: String,
    /// Upper bound on each receipt wait.
    pub tx_timeout: Duration,
    pub poll_interval: Duration,
    pub allowance_policy: AllowancePolicy,
}

/// Transactions of a completed purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurchaseReceipt {
    pub amount: Amount,
    #[serde(serialize_with = "serialize_decimal")]
    pub approval_amount: U256,
    pub approval_tx: H256,
    pub purchase_tx: H256,
}

fn serialize_decimal<S: serde::Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

/// Shared flag that aborts a pending receipt wait.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

// ── Flow ──────────────────────────────────────────────────────────────────────

pub struct PurchaseFlow {
    settings: PurchaseSettings,
}

impl PurchaseFlow {
    pub fn new(settings: PurchaseSettings) -> Result<Self, ContractError> {
        contracts::validate_purchase_signature(&settings.purchase_signature)?;
        Ok(Self { settings })
    }

    pub fn settings(&self) -> &PurchaseSettings {
        &self.settings
    }

    /// Stable-asset base units the purchase contract will pull for `amount`.
    pub fn approval_amount(&self, amount: Amount) -> Result<U256, FlowError> {
        amount.scale_to_stable(self.settings.unit_price, self.settings.stable_decimals)
    }

    /// Run one purchase to a terminal state.
    ///
    /// `observe` sees every state the flow enters, in order. Nothing is
    /// retried: any failure ends this invocation and the holder has to start
    /// a new one.
    pub async fn run<F>(
        &self,
        session: &Session,
        amount: Amount,
        cancel: &CancelFlag,
        mut observe: F,
    ) -> Result<PurchaseReceipt, FlowError>
    where
        F: FnMut(PurchaseState) + Send,
    {
        if amount.is_zero() {
            return Err(FlowError::InvalidAmount(
                "amount must be greater than zero".to_string(),
            ));
        }
        if !session.can_sign() {
            return Err(FlowError::NoSigner);
        }
        let approval_amount = self.approval_amount(amount)?;
        let purchase_data = contracts::purchase(&self.settings.purchase_signature, amount.as_u256())
            .map_err(|_| FlowError::PurchaseFailed(TxOutcome::NotSent))?;

        if let Err(e) = self.preflight(session).await {
            observe(PurchaseState::Failed);
            return Err(e);
        }

        let spender = self.settings.token_address;
        tracing::info!(
            holder = ?session.account(),
            amount = %amount,
            approval_amount = %approval_amount,
            "Starting purchase"
        );

        // Step 1: allowance for the purchase contract.
        observe(PurchaseState::AwaitingApproval);
        let approval = self
            .submit_and_wait(
                session,
                self.settings.stable_address,
                contracts::approve(spender, approval_amount),
                cancel,
            )
            .await;
        let approval_tx = match approval {
            Ok(hash) => hash,
            Err(outcome) => {
                tracing::warn!(outcome = %outcome, "Approval did not succeed");
                observe(PurchaseState::Failed);
                return Err(FlowError::ApprovalFailed(outcome));
            }
        };
        observe(PurchaseState::Approved);

        // Step 2: the purchase itself, with the unscaled token amount.
        observe(PurchaseState::AwaitingPurchase);
        let purchase = self
            .submit_and_wait(session, self.settings.token_address, purchase_data, cancel)
            .await;
        let purchase_tx = match purchase {
            Ok(hash) => hash,
            Err(outcome) => {
                tracing::warn!(
                    outcome = %outcome,
                    approval_tx = ?approval_tx,
                    "Purchase did not succeed after approval"
                );
                observe(PurchaseState::Failed);
                if self.settings.allowance_policy == AllowancePolicy::RevokeOnFailure {
                    self.revoke_allowance(session, spender, cancel).await;
                }
                return Err(FlowError::PurchaseFailed(outcome));
            }
        };

        tracing::info!(
            approval_tx = ?approval_tx,
            purchase_tx = ?purchase_tx,
            amount = %amount,
            "Purchase complete"
        );
        observe(PurchaseState::Complete);

        Ok(PurchaseReceipt {
            amount,
            approval_amount,
            approval_tx,
            purchase_tx,
        })
    }

    /// Checks that must pass before any transaction is submitted.
    async fn preflight(&self, session: &Session) -> Result<(), FlowError> {
        network::assert_network(session, self.settings.chain_id).await?;

        let on_chain = balance::read_decimals(session, self.settings.stable_address)
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "Could not verify stable asset decimals");
                e
            })?;
        if on_chain != self.settings.stable_decimals {
            return Err(FlowError::DecimalsMismatch {
                configured: self.settings.stable_decimals,
                on_chain,
            });
        }
        Ok(())
    }

    async fn submit_and_wait(
        &self,
        session: &Session,
        to: Address,
        data: Bytes,
        cancel: &CancelFlag,
    ) -> Result<H256, TxOutcome> {
        let hash = session
            .backend()
            .send_transaction(session.account(), to, data)
            .await
            .map_err(|e| match e {
                BackendError::Rejected(_) => TxOutcome::Rejected,
                other => {
                    tracing::warn!(error = %other, "Transaction submission failed");
                    TxOutcome::NotSent
                }
            })?;
        tracing::debug!(tx = ?hash, to = ?to, "Transaction submitted");

        match self.wait_for_receipt(session, hash, cancel).await {
            TxOutcome::Mined => Ok(hash),
            outcome => Err(outcome),
        }
    }

    /// Wait until `hash` is mined, disappears, times out, or is cancelled.
    pub async fn wait_for_receipt(
        &self,
        session: &Session,
        hash: H256,
        cancel: &CancelFlag,
    ) -> TxOutcome {
        let deadline = Instant::now() + self.settings.tx_timeout;
        let mut seen = false;
        let mut unknown_polls = 0u32;
        loop {
            if cancel.is_cancelled() {
                return TxOutcome::Cancelled;
            }

            match session.backend().transaction_receipt(hash).await {
                Ok(Some(receipt)) if receipt.succeeded() => return TxOutcome::Mined,
                Ok(Some(_)) => return TxOutcome::Reverted,
                Ok(None) => match session.backend().transaction_known(hash).await {
                    Ok(true) => {
                        seen = true;
                        unknown_polls = 0;
                    }
                    Ok(false) => {
                        // Freshly sent transactions may not have reached the
                        // node answering this poll yet.
                        unknown_polls += 1;
                        if seen || unknown_polls >= DROP_AFTER_UNKNOWN_POLLS {
                            return TxOutcome::Dropped;
                        }
                        tracing::debug!(tx = ?hash, polls = unknown_polls, "Transaction not yet visible");
                    }
                    Err(e) => tracing::warn!(tx = ?hash, error = %e, "Pending lookup failed"),
                },
                Err(e) => tracing::warn!(tx = ?hash, error = %e, "Receipt lookup failed"),
            }

            if Instant::now() >= deadline {
                return TxOutcome::TimedOut;
            }
            tokio::time::sleep(self.settings.poll_interval).await;
        }
    }

    /// Best effort. A cancelled purchase still submits the revocation but
    /// does not wait for it to be mined.
    async fn revoke_allowance(&self, session: &Session, spender: Address, cancel: &CancelFlag) {
        let data = contracts::approve(spender, U256::zero());
        let outcome = self
            .submit_and_wait(session, self.settings.stable_address, data, cancel)
            .await;
        match outcome {
            Ok(hash) => tracing::info!(tx = ?hash, "Unused allowance revoked"),
            Err(TxOutcome::Cancelled) => {
                tracing::info!("Allowance revocation submitted, receipt not awaited")
            }
            Err(outcome) => tracing::warn!(outcome = %outcome, "Allowance revocation did not succeed"),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
