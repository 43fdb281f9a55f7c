//! In-memory wallet + chain used by the unit tests.
//!
//! Models one stable asset and one issuance token whose contract is also the
//! purchase contract, with real allowance accounting so that a purchase
//! without a sufficient approval reverts.

use async_trait::async_trait;
use ethers::types::{Address, Bytes, H160, H256, U256, U64};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{BackendError, Receipt, Session, WalletBackend};
use crate::contracts::{self, DecodedCall, DEFAULT_PURCHASE_SIGNATURE};
use crate::purchase::{AllowancePolicy, PurchaseSettings};

pub const HOLDER: Address = H160([0x11; 20]);
pub const STABLE: Address = H160([0x5c; 20]);
pub const TOKEN: Address = H160([0xa7; 20]);

/// How the next transaction of a given kind ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    Succeed,
    Revert,
    Drop,
    /// Stays pending until `release_pending` is called.
    Hold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SwitchMode {
    Accept,
    Reject,
    Ignore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectMode {
    Accounts,
    NoAccounts,
    Unavailable,
    Reject,
}

#[derive(Debug, Clone)]
enum TxState {
    Pending { from: Address, to: Address, call: DecodedCall },
    Mined(bool),
    Dropped,
}

/// A transaction as the fake chain received it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentTx {
    pub from: Address,
    pub to: Address,
    pub call: DecodedCall,
}

struct FakeState {
    chain_id: u64,
    switch_mode: SwitchMode,
    connect_mode: ConnectMode,
    chain_id_fails: bool,
    calls_fail: bool,
    reject_signing: bool,
    stable_decimals: u8,
    unit_price: u64,
    stable_balances: HashMap<Address, U256>,
    token_balances: HashMap<Address, U256>,
    allowances: HashMap<(Address, Address), U256>,
    total_supply: U256,
    approve_script: Script,
    purchase_script: Script,
    switch_requests: Vec<u64>,
    sent: Vec<SentTx>,
    txs: HashMap<H256, TxState>,
    /// Lookups each new transaction stays invisible for.
    visibility_delay: u32,
    hidden: HashMap<H256, u32>,
    next_tx: u64,
}

/// Cheap to clone; clones share one chain.
#[derive(Clone)]
pub struct FakeChain {
    name: Arc<str>,
    state: Arc<Mutex<FakeState>>,
}

impl FakeChain {
    pub fn new(chain_id: u64) -> Self {
        Self::named("fake", chain_id)
    }

    pub fn named(name: &str, chain_id: u64) -> Self {
        let mut stable_balances = HashMap::new();
        stable_balances.insert(HOLDER, U256::exp10(15));
        Self {
            name: Arc::from(name),
            state: Arc::new(Mutex::new(FakeState {
                chain_id,
                switch_mode: SwitchMode::Accept,
                connect_mode: ConnectMode::Accounts,
                chain_id_fails: false,
                calls_fail: false,
                reject_signing: false,
                stable_decimals: 6,
                unit_price: 1,
                stable_balances,
                token_balances: HashMap::new(),
                allowances: HashMap::new(),
                total_supply: U256::from(10_000u64),
                approve_script: Script::Succeed,
                purchase_script: Script::Succeed,
                switch_requests: Vec::new(),
                sent: Vec::new(),
                txs: HashMap::new(),
                visibility_delay: 0,
                hidden: HashMap::new(),
                next_tx: 1,
            })),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub fn backend(&self) -> Arc<dyn WalletBackend> {
        Arc::new(self.clone())
    }

    pub fn session(&self) -> Session {
        Session::new(self.backend(), HOLDER)
    }

    // ── Scripting ─────────────────────────────────────────────────────────

    pub fn reject_switch(&self) {
        self.with(|s| s.switch_mode = SwitchMode::Reject);
    }

    pub fn ignore_switch(&self) {
        self.with(|s| s.switch_mode = SwitchMode::Ignore);
    }

    pub fn set_chain_id(&self, chain_id: u64) {
        self.with(|s| s.chain_id = chain_id);
    }

    pub fn fail_chain_id(&self) {
        self.with(|s| s.chain_id_fails = true);
    }

    pub fn fail_calls(&self) {
        self.with(|s| s.calls_fail = true);
    }

    pub fn unavailable(&self) {
        self.with(|s| s.connect_mode = ConnectMode::Unavailable);
    }

    pub fn no_accounts(&self) {
        self.with(|s| s.connect_mode = ConnectMode::NoAccounts);
    }

    pub fn reject_connect(&self) {
        self.with(|s| s.connect_mode = ConnectMode::Reject);
    }

    pub fn reject_signing(&self) {
        self.with(|s| s.reject_signing = true);
    }

    pub fn set_stable_decimals(&self, decimals: u8) {
        self.with(|s| s.stable_decimals = decimals);
    }

    pub fn set_unit_price(&self, price: u64) {
        self.with(|s| s.unit_price = price);
    }

    pub fn set_token_balance(&self, holder: Address, amount: U256) {
        self.with(|s| {
            s.token_balances.insert(holder, amount);
        });
    }

    pub fn script_approve(&self, script: Script) {
        self.with(|s| s.approve_script = script);
    }

    pub fn script_purchase(&self, script: Script) {
        self.with(|s| s.purchase_script = script);
    }

    /// New transactions answer "unknown" for the first `lookups` polls, as a
    /// load-balanced node that has not seen them yet would.
    pub fn delay_visibility(&self, lookups: u32) {
        self.with(|s| s.visibility_delay = lookups);
    }

    /// Forget every held transaction, as if it had been replaced.
    pub fn drop_pending(&self) {
        self.with(|s| {
            for tx in s.txs.values_mut() {
                if matches!(tx, TxState::Pending { .. }) {
                    *tx = TxState::Dropped;
                }
            }
        });
    }

    /// Mine every held transaction successfully.
    pub fn release_pending(&self) {
        self.with(|s| {
            let pending: Vec<H256> = s
                .txs
                .iter()
                .filter(|(_, tx)| matches!(tx, TxState::Pending { .. }))
                .map(|(hash, _)| *hash)
                .collect();
            for hash in pending {
                if let Some(TxState::Pending { from, to, call }) = s.txs.remove(&hash) {
                    let ok = s.execute(from, to, &call);
                    s.txs.insert(hash, TxState::Mined(ok));
                }
            }
        });
    }

    // ── Inspection ────────────────────────────────────────────────────────

    pub fn switch_requests(&self) -> Vec<u64> {
        self.with(|s| s.switch_requests.clone())
    }

    pub fn sent(&self) -> Vec<SentTx> {
        self.with(|s| s.sent.clone())
    }

    pub fn token_balance(&self, holder: Address) -> U256 {
        self.with(|s| s.token_balances.get(&holder).copied().unwrap_or_default())
    }

    pub fn stable_balance(&self, holder: Address) -> U256 {
        self.with(|s| s.stable_balances.get(&holder).copied().unwrap_or_default())
    }

    pub fn allowance(&self, owner: Address, spender: Address) -> U256 {
        self.with(|s| s.allowances.get(&(owner, spender)).copied().unwrap_or_default())
    }
}

impl FakeState {
    /// Apply a mined call; returns the receipt status.
    fn execute(&mut self, from: Address, to: Address, call: &DecodedCall) -> bool {
        match call {
            DecodedCall::Approve { spender, amount } if to == STABLE => {
                self.allowances.insert((from, *spender), *amount);
                true
            }
            DecodedCall::Purchase(amount) if to == TOKEN => {
                let cost = *amount
                    * U256::from(self.unit_price)
                    * U256::exp10(self.stable_decimals as usize);
                let allowed = self.allowances.get(&(from, TOKEN)).copied().unwrap_or_default();
                let funds = self.stable_balances.get(&from).copied().unwrap_or_default();
                if allowed < cost || funds < cost {
                    return false;
                }
                self.allowances.insert((from, TOKEN), allowed - cost);
                self.stable_balances.insert(from, funds - cost);
                let held = self.token_balances.get(&from).copied().unwrap_or_default();
                self.token_balances.insert(from, held + *amount);
                self.total_supply += *amount;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl WalletBackend for FakeChain {
    fn name(&self) -> &str {
        &self.name
    }

    async fn request_accounts(&self) -> Result<Vec<Address>, BackendError> {
        match self.with(|s| s.connect_mode) {
            ConnectMode::Accounts => Ok(vec![HOLDER]),
            ConnectMode::NoAccounts => Ok(Vec::new()),
            ConnectMode::Unavailable => Err(BackendError::Unavailable("not installed".into())),
            ConnectMode::Reject => Err(BackendError::Rejected("User rejected the request.".into())),
        }
    }

    async fn chain_id(&self) -> Result<u64, BackendError> {
        self.with(|s| {
            if s.chain_id_fails {
                Err(BackendError::Rpc("chain id unavailable".into()))
            } else {
                Ok(s.chain_id)
            }
        })
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<(), BackendError> {
        self.with(|s| {
            s.switch_requests.push(chain_id);
            match s.switch_mode {
                SwitchMode::Accept => {
                    s.chain_id = chain_id;
                    Ok(())
                }
                SwitchMode::Reject => Err(BackendError::Rejected("switch declined".into())),
                SwitchMode::Ignore => Ok(()),
            }
        })
    }

    async fn send_transaction(
        &self,
        from: Address,
        to: Address,
        data: Bytes,
    ) -> Result<H256, BackendError> {
        self.with(|s| {
            if s.reject_signing {
                return Err(BackendError::Rejected("User denied transaction signature.".into()));
            }
            let call = contracts::decode_call(&data, DEFAULT_PURCHASE_SIGNATURE);
            s.sent.push(SentTx {
                from,
                to,
                call: call.clone(),
            });
            let hash = H256::from_low_u64_be(s.next_tx);
            s.next_tx += 1;
            let script = match call {
                DecodedCall::Purchase(_) => s.purchase_script,
                _ => s.approve_script,
            };
            let state = match script {
                Script::Succeed => TxState::Mined(s.execute(from, to, &call)),
                Script::Revert => TxState::Mined(false),
                Script::Drop => TxState::Dropped,
                Script::Hold => TxState::Pending { from, to, call },
            };
            s.txs.insert(hash, state);
            if s.visibility_delay > 0 {
                s.hidden.insert(hash, s.visibility_delay);
            }
            Ok(hash)
        })
    }

    async fn transaction_receipt(&self, hash: H256) -> Result<Option<Receipt>, BackendError> {
        Ok(self.with(|s| match s.txs.get(&hash) {
            _ if s.hidden.get(&hash).copied().unwrap_or(0) > 0 => None,
            Some(TxState::Mined(ok)) => Some(Receipt {
                transaction_hash: hash,
                status: Some(if *ok { U64::one() } else { U64::zero() }),
                block_number: Some(U64::from(100)),
            }),
            _ => None,
        }))
    }

    async fn transaction_known(&self, hash: H256) -> Result<bool, BackendError> {
        Ok(self.with(|s| {
            if let Some(remaining) = s.hidden.get_mut(&hash) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return false;
                }
            }
            matches!(
                s.txs.get(&hash),
                Some(TxState::Pending { .. }) | Some(TxState::Mined(_))
            )
        }))
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, BackendError> {
        self.with(|s| {
            if s.calls_fail {
                return Err(BackendError::Rpc("execution reverted".into()));
            }
            let value = match (contracts::decode_call(&data, DEFAULT_PURCHASE_SIGNATURE), to) {
                (DecodedCall::BalanceOf(holder), t) if t == TOKEN => {
                    s.token_balances.get(&holder).copied().unwrap_or_default()
                }
                (DecodedCall::BalanceOf(holder), t) if t == STABLE => {
                    s.stable_balances.get(&holder).copied().unwrap_or_default()
                }
                (DecodedCall::Decimals, t) if t == STABLE => U256::from(s.stable_decimals),
                (DecodedCall::Decimals, t) if t == TOKEN => U256::from(18u8),
                (DecodedCall::TotalSupply, t) if t == TOKEN => s.total_supply,
                _ => return Ok(Bytes::default()),
            };
            Ok(ethers::abi::encode(&[ethers::abi::Token::Uint(value)]).into())
        })
    }
}

/// Purchase settings matching the fake chain on Goerli.
pub fn settings() -> PurchaseSettings {
    PurchaseSettings {
        chain_id: 5,
        stable_address: STABLE,
        token_address: TOKEN,
        stable_decimals: 6,
        unit_price: 1,
        purchase_signature: DEFAULT_PURCHASE_SIGNATURE.to_string(),
        tx_timeout: Duration::from_secs(2),
        poll_interval: Duration::from_millis(5),
        allowance_policy: AllowancePolicy::Retain,
    }
}
