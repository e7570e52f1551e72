//! Application configuration loaded from environment variables.
//!
//! Optional: `SEPOLIA_RPC_URL`, `LOCALHOST_RPC_URL`, `PRIVATE_KEY`,
//!           `ETHERSCAN_API_KEY`, `COINMARKETCAP_API_KEY`,
//!           `VRF_SUBSCRIPTION_ID`, `ARTIFACTS_DIR`, `DEPLOYMENTS_DIR`,
//!           `GAS_REPORT_FILE`, `MAX_RETRIES`, `INITIAL_RETRY_DELAY_MS`
//!
//! Nothing is strictly required up front: live-network deployments fail
//! later, with a precise error, if `PRIVATE_KEY` or `VRF_SUBSCRIPTION_ID`
//! is missing.

use anyhow::{Context, Result};
use ethers::types::U256;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::networks::NetworkRegistry;

/// Default JSON-RPC endpoint of a persistent local node.
pub const DEFAULT_LOCALHOST_RPC_URL: &str = "http://127.0.0.1:8545";

/// Application configuration for a deployment run.
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Public-network JSON-RPC endpoint.
    pub sepolia_rpc_url: Option<String>,
    /// Persistent local node endpoint.
    pub localhost_rpc_url: String,
    /// Hex-encoded deployer key. Development chains fall back to local account #0.
    pub private_key: Option<String>,
    /// Block-explorer API key. Verification is skipped when absent.
    pub etherscan_api_key: Option<String>,
    /// Price feed key, only used to price the gas report.
    pub coinmarketcap_api_key: Option<String>,
    /// Pre-provisioned subscription for live networks.
    pub subscription_id: Option<U256>,
    /// Compiled contract artifacts (Hardhat `artifacts/` or Foundry `out/`).
    pub artifacts_dir: PathBuf,
    /// Root of the per-network deployment records.
    pub deployments_dir: PathBuf,
    pub gas_report_file: PathBuf,
    /// Maximum attempts for retryable post-deployment steps.
    pub max_retries: u32,
    /// Initial retry delay in milliseconds.
    pub initial_retry_delay_ms: u64,
}

impl AppConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(std::env::vars().collect())
    }

    /// Load configuration from an explicit variable map.
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self> {
        let get = |key: &str| {
            vars.get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let subscription_id = get("VRF_SUBSCRIPTION_ID")
            .map(|raw| {
                parse_uint(&raw).with_context(|| format!("invalid VRF_SUBSCRIPTION_ID: {raw}"))
            })
            .transpose()?;

        let expand = |raw: String| PathBuf::from(shellexpand::tilde(&raw).to_string());

        let max_retries = get("MAX_RETRIES")
            .and_then(|v| v.parse().ok())
            .unwrap_or(5);

        let initial_retry_delay_ms = get("INITIAL_RETRY_DELAY_MS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(500);

        Ok(Self {
            sepolia_rpc_url: get("SEPOLIA_RPC_URL"),
            localhost_rpc_url: get("LOCALHOST_RPC_URL")
                .unwrap_or_else(|| DEFAULT_LOCALHOST_RPC_URL.into()),
            private_key: get("PRIVATE_KEY"),
            etherscan_api_key: get("ETHERSCAN_API_KEY"),
            coinmarketcap_api_key: get("COINMARKETCAP_API_KEY"),
            subscription_id,
            artifacts_dir: expand(get("ARTIFACTS_DIR").unwrap_or_else(|| "artifacts".into())),
            deployments_dir: expand(
                get("DEPLOYMENTS_DIR").unwrap_or_else(|| "deployments".into()),
            ),
            gas_report_file: expand(
                get("GAS_REPORT_FILE").unwrap_or_else(|| "gas-report.txt".into()),
            ),
            max_retries,
            initial_retry_delay_ms,
        })
    }

    /// Build the network registry for this configuration.
    pub fn registry(&self) -> NetworkRegistry {
        NetworkRegistry::standard(&self.localhost_rpc_url, self.sepolia_rpc_url.clone())
    }

    /// Return the block-explorer URL for a given address on a chain.
    pub fn explorer_url(&self, chain_id: u64, address: &str) -> Option<String> {
        match chain_id {
            1 => Some(format!("https://etherscan.io/address/{address}")),
            crate::networks::SEPOLIA_CHAIN_ID => {
                Some(format!("https://sepolia.etherscan.io/address/{address}"))
            }
            _ => None,
        }
    }
}

/// Parse a decimal or `0x`-prefixed hex unsigned integer.
pub fn parse_uint(raw: &str) -> Result<U256> {
    let raw = raw.trim();
    let value = match raw.strip_prefix("0x") {
        Some(hex) => U256::from_str_radix(hex, 16)?,
        None => U256::from_dec_str(raw)?,
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_when_environment_is_empty() {
        let cfg = AppConfig::from_vars(HashMap::new()).unwrap();
        assert_eq!(cfg.localhost_rpc_url, DEFAULT_LOCALHOST_RPC_URL);
        assert!(cfg.private_key.is_none());
        assert!(cfg.etherscan_api_key.is_none());
        assert!(cfg.subscription_id.is_none());
        assert_eq!(cfg.artifacts_dir, PathBuf::from("artifacts"));
        assert_eq!(cfg.deployments_dir, PathBuf::from("deployments"));
        assert_eq!(cfg.gas_report_file, PathBuf::from("gas-report.txt"));
        assert_eq!(cfg.max_retries, 5);
        assert_eq!(cfg.initial_retry_delay_ms, 500);
    }

    #[test]
    fn blank_values_count_as_unset() {
        let cfg = AppConfig::from_vars(vars(&[("ETHERSCAN_API_KEY", "  ")])).unwrap();
        assert!(cfg.etherscan_api_key.is_none());
    }

    #[test]
    fn subscription_id_accepts_large_decimal_and_hex() {
        let cfg = AppConfig::from_vars(vars(&[(
            "VRF_SUBSCRIPTION_ID",
            "115792089237316195423570985008687907853269984665640564039457584007913129639935",
        )]))
        .unwrap();
        assert_eq!(cfg.subscription_id, Some(U256::MAX));

        let cfg = AppConfig::from_vars(vars(&[("VRF_SUBSCRIPTION_ID", "0x2a")])).unwrap();
        assert_eq!(cfg.subscription_id, Some(U256::from(42)));
    }

    #[test]
    fn invalid_subscription_id_is_rejected() {
        let err = AppConfig::from_vars(vars(&[("VRF_SUBSCRIPTION_ID", "twelve")])).unwrap_err();
        assert!(format!("{err:#}").contains("VRF_SUBSCRIPTION_ID"));
    }

    #[test]
    fn registry_uses_configured_endpoints() {
        let cfg = AppConfig::from_vars(vars(&[
            ("SEPOLIA_RPC_URL", "https://sepolia.example"),
            ("LOCALHOST_RPC_URL", "http://127.0.0.1:9545"),
        ]))
        .unwrap();
        let reg = cfg.registry();
        assert_eq!(
            reg.alias("localhost").unwrap().rpc_url.as_deref(),
            Some("http://127.0.0.1:9545")
        );
        assert_eq!(
            reg.alias("sepolia").unwrap().rpc_url.as_deref(),
            Some("https://sepolia.example")
        );
    }

    #[test]
    fn explorer_url_only_for_public_chains() {
        let cfg = AppConfig::from_vars(HashMap::new()).unwrap();
        assert!(cfg.explorer_url(31337, "0xabc").is_none());
        assert_eq!(
            cfg.explorer_url(11155111, "0xabc").as_deref(),
            Some("https://sepolia.etherscan.io/address/0xabc")
        );
    }
}
