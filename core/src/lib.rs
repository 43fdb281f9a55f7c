//! Wallet connection and token purchase client: connect an EVM wallet, keep
//! it on the expected network, read the holder's token balance and buy
//! tokens by approving a stable asset and then calling the purchase contract.

pub mod amount;
pub mod api;
pub mod balance;
pub mod config;
pub mod contracts;
pub mod controller;
pub mod errors;
pub mod network;
pub mod purchase;
pub mod wallet;

pub use amount::Amount;
pub use controller::{Controller, PurchaseTrigger, ViewState};
pub use errors::{AppError, FlowError, NoticeKind};
pub use purchase::{AllowancePolicy, PurchaseFlow, PurchaseSettings, PurchaseState};
pub use wallet::{Connector, RpcWallet, Session, WalletBackend, WalletEndpoint};
