use config::{Config, ConfigError, Environment, File};
use ethers::types::Address;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::contracts::{self, DEFAULT_PURCHASE_SIGNATURE};
use crate::network::{self, Network};
use crate::purchase::{AllowancePolicy, PurchaseSettings};
use crate::wallet::WalletEndpoint;

/// Optional file source, looked up in the working directory.
const CONFIG_FILE: &str = "issuance";

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid address for {field}: {value}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("Unknown network preset: {0}")]
    UnknownNetwork(String),

    #[error("Unknown allowance policy: {0}")]
    InvalidPolicy(String),

    #[error("Invalid purchase signature: {0}")]
    BadSignature(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server_port: u16,
    pub rust_log: String,

    /// Network preset name; ignored when `chain_id` is set.
    pub network: String,
    pub chain_id: Option<u64>,

    pub token_address: String,
    pub stable_address: String,
    pub stable_decimals: u8,
    /// Display precision of the issuance token.
    pub token_decimals: u8,
    pub unit_price: u64,
    pub purchase_signature: String,

    pub tx_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub rpc_timeout_secs: u64,
    pub allowance_policy: String,

    pub auto_connect: bool,
    pub swap_widget: bool,

    pub injected_wallet_url: Option<String>,
    pub relay_wallet_url: Option<String>,
    pub hosted_wallet_url: Option<String>,
    pub wallet_auth_header: Option<String>,
    pub wallet_auth_value: Option<String>,
}

/// Load configuration from `.env`, an optional `issuance.toml` and the
/// environment, in increasing priority.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();

    let builder = with_defaults(Config::builder())?
        .add_source(File::with_name(CONFIG_FILE).required(false))
        .add_source(Environment::default());

    builder.build()?.try_deserialize()
}

fn with_defaults(
    builder: config::ConfigBuilder<config::builder::DefaultState>,
) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
    builder
        .set_default("server_port", 8080)?
        .set_default("rust_log", "info")?
        .set_default("network", "goerli")?
        .set_default("stable_decimals", 6)?
        .set_default("token_decimals", 18)?
        .set_default("unit_price", 1)?
        .set_default("purchase_signature", DEFAULT_PURCHASE_SIGNATURE)?
        .set_default("tx_timeout_secs", 600)?
        .set_default("poll_interval_ms", 2000)?
        .set_default("rpc_timeout_secs", 120)?
        .set_default("allowance_policy", "retain")?
        .set_default("auto_connect", true)?
        .set_default("swap_widget", false)
}

fn parse_address(field: &'static str, value: &str) -> Result<Address, SettingsError> {
    value
        .trim()
        .parse::<Address>()
        .map_err(|_| SettingsError::InvalidAddress {
            field,
            value: value.to_string(),
        })
}

impl AppConfig {
    /// Target network: an explicit `chain_id` wins over the preset.
    pub fn network(&self) -> Result<Network, SettingsError> {
        match self.chain_id {
            Some(chain_id) => Ok(Network {
                name: "custom".to_string(),
                chain_id,
            }),
            None => network::resolve_preset(&self.network)
                .ok_or_else(|| SettingsError::UnknownNetwork(self.network.clone())),
        }
    }

    pub fn purchase_settings(&self) -> Result<PurchaseSettings, SettingsError> {
        let allowance_policy = AllowancePolicy::parse(&self.allowance_policy)
            .ok_or_else(|| SettingsError::InvalidPolicy(self.allowance_policy.clone()))?;
        contracts::validate_purchase_signature(&self.purchase_signature)
            .map_err(|_| SettingsError::BadSignature(self.purchase_signature.clone()))?;

        Ok(PurchaseSettings {
            chain_id: self.network()?.chain_id,
            stable_address: parse_address("stable_address", &self.stable_address)?,
            token_address: parse_address("token_address", &self.token_address)?,
            stable_decimals: self.stable_decimals,
            unit_price: self.unit_price,
            purchase_signature: self.purchase_signature.clone(),
            tx_timeout: Duration::from_secs(self.tx_timeout_secs),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            allowance_policy,
        })
    }

    /// Configured wallets in connect priority order: injected extension,
    /// mobile relay, hosted SDK.
    pub fn wallet_endpoints(&self) -> Vec<WalletEndpoint> {
        [
            ("injected", &self.injected_wallet_url),
            ("relay", &self.relay_wallet_url),
            ("hosted", &self.hosted_wallet_url),
        ]
        .into_iter()
        .filter_map(|(name, url)| {
            url.as_ref().map(|url| WalletEndpoint {
                name: name.to_string(),
                url: url.clone(),
                auth_header: self.wallet_auth_header.clone(),
                auth_value: self.wallet_auth_value.clone(),
            })
        })
        .collect()
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "0xa7a7a7a7a7a7a7a7a7a7a7a7a7a7a7a7a7a7a7a7";
    const STABLE: &str = "0x5c5c5c5c5c5c5c5c5c5c5c5c5c5c5c5c5c5c5c5c";

    fn build(overrides: &[(&str, &str)]) -> AppConfig {
        let mut builder = with_defaults(Config::builder())
            .unwrap()
            .set_override("token_address", TOKEN)
            .unwrap()
            .set_override("stable_address", STABLE)
            .unwrap();
        for (key, value) in overrides {
            builder = builder.set_override(*key, *value).unwrap();
        }
        builder.build().unwrap().try_deserialize().unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = build(&[]);
        assert_eq!(config.server_port, 8080);
        assert_eq!(config.rust_log, "info");
        assert_eq!(config.network().unwrap().chain_id, 5);
        assert!(config.auto_connect);
        assert!(!config.swap_widget);

        let settings = config.purchase_settings().unwrap();
        assert_eq!(settings.stable_decimals, 6);
        assert_eq!(settings.unit_price, 1);
        assert_eq!(settings.purchase_signature, "buyATTWithUSDC(uint256)");
        assert_eq!(settings.allowance_policy, AllowancePolicy::Retain);
        assert_eq!(settings.token_address, TOKEN.parse::<Address>().unwrap());
    }

    #[test]
    fn test_chain_id_overrides_preset() {
        let config = build(&[("network", "mainnet"), ("chain_id", "31337")]);
        let network = config.network().unwrap();
        assert_eq!(network.chain_id, 31337);
        assert_eq!(network.name, "custom");

        let sepolia = build(&[("network", "Sepolia")]);
        assert_eq!(sepolia.network().unwrap().chain_id, 11_155_111);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let config = build(&[("network", "ropsten")]);
        assert!(matches!(config.network(), Err(SettingsError::UnknownNetwork(_))));

        let config = build(&[("allowance_policy", "maybe")]);
        assert!(matches!(
            config.purchase_settings(),
            Err(SettingsError::InvalidPolicy(_))
        ));

        let config = build(&[("token_address", "0x1234")]);
        assert!(matches!(
            config.purchase_settings(),
            Err(SettingsError::InvalidAddress { field: "token_address", .. })
        ));

        let config = build(&[("purchase_signature", "buy()")]);
        assert!(matches!(
            config.purchase_settings(),
            Err(SettingsError::BadSignature(_))
        ));
    }

    #[test]
    fn test_wallet_endpoints_in_priority_order() {
        let config = build(&[
            ("hosted_wallet_url", "https://hosted.test/rpc"),
            ("injected_wallet_url", "http://127.0.0.1:8545"),
            ("wallet_auth_header", "Authorization"),
            ("wallet_auth_value", "Bearer abc"),
        ]);
        let endpoints = config.wallet_endpoints();
        let names: Vec<&str> = endpoints.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["injected", "hosted"]);
        assert_eq!(endpoints[1].auth_value.as_deref(), Some("Bearer abc"));
    }

    #[test]
    fn test_log_directives_override() {
        let config = build(&[("rust_log", "issuance_core=debug,tower_http=warn")]);
        assert_eq!(config.rust_log, "issuance_core=debug,tower_http=warn");
    }

    #[test]
    fn test_revoke_policy_and_timings() {
        let config = build(&[
            ("allowance_policy", "revoke_on_failure"),
            ("tx_timeout_secs", "30"),
            ("poll_interval_ms", "250"),
        ]);
        let settings = config.purchase_settings().unwrap();
        assert_eq!(settings.allowance_policy, AllowancePolicy::RevokeOnFailure);
        assert_eq!(settings.tx_timeout, Duration::from_secs(30));
        assert_eq!(settings.poll_interval, Duration::from_millis(250));
    }
}
