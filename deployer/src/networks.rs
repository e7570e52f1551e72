//! Network configuration registry.
//!
//! Maps chain ids to the parameters the raffle is deployed with, and network
//! names (as passed on the command line) to chain ids. The registry is built
//! once at startup and handed to every component; nothing here is global.

use ethers::types::{Address, H256, U256};
use ethers::utils::parse_ether;
use std::collections::{BTreeMap, HashSet};

use crate::error::{DeployError, Result};

pub const HARDHAT_CHAIN_ID: u64 = 31337;
pub const SEPOLIA_CHAIN_ID: u64 = 11155111;

/// Confirmations awaited on development chains, where reorgs do not happen.
pub const DEVELOPMENT_CONFIRMATIONS: usize = 1;
/// Confirmations awaited on public networks.
pub const LIVE_CONFIRMATIONS: usize = 6;

const SEPOLIA_VRF_COORDINATOR: &str = "0x9DdfaCa8183c41ad55329BdeeD9F6A8d53168B1B";
const SEPOLIA_KEY_HASH: &str =
    "0x787d74caea10b2b357790d5b5247c2f63d1d91572a9846f780606e4d953677ae";

/// Deployment parameters for one chain.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkConfig {
    pub chain_id: u64,
    pub name: String,
    pub rpc_url: Option<String>,
    /// Live VRF coordinator. `None` on development chains, where the mock is used.
    pub vrf_coordinator: Option<Address>,
    /// Entry fee in wei.
    pub ticket_price: U256,
    /// Gas lane selecting the oracle key that fulfills requests.
    pub key_hash: H256,
    pub callback_gas_limit: u32,
    /// Round length in seconds.
    pub interval: u64,
}

/// A named network that can be selected with `--network`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkAlias {
    pub name: String,
    pub chain_id: u64,
    pub rpc_url: Option<String>,
    /// Spawn a throwaway node instead of connecting to `rpc_url`.
    pub transient: bool,
}

/// Immutable chain-id → [`NetworkConfig`] registry.
#[derive(Debug, Clone)]
pub struct NetworkRegistry {
    configs: BTreeMap<u64, NetworkConfig>,
    aliases: BTreeMap<String, NetworkAlias>,
    development_chains: HashSet<u64>,
}

impl NetworkRegistry {
    /// Build an empty registry with the given development chain ids.
    pub fn new(development_chains: impl IntoIterator<Item = u64>) -> Self {
        Self {
            configs: BTreeMap::new(),
            aliases: BTreeMap::new(),
            development_chains: development_chains.into_iter().collect(),
        }
    }

    /// The registry shipped with the project: `hardhat`, `localhost` and `sepolia`.
    pub fn standard(localhost_rpc_url: &str, sepolia_rpc_url: Option<String>) -> Self {
        let ticket_price = parse_ether("0.01").unwrap_or_default();

        Self::new([HARDHAT_CHAIN_ID])
            .with_network(NetworkConfig {
                chain_id: HARDHAT_CHAIN_ID,
                name: "hardhat".into(),
                rpc_url: None,
                vrf_coordinator: None,
                ticket_price,
                key_hash: H256::zero(),
                callback_gas_limit: 500_000,
                interval: 30,
            })
            .with_network(NetworkConfig {
                chain_id: SEPOLIA_CHAIN_ID,
                name: "sepolia".into(),
                rpc_url: sepolia_rpc_url.clone(),
                vrf_coordinator: SEPOLIA_VRF_COORDINATOR.parse().ok(),
                ticket_price,
                key_hash: SEPOLIA_KEY_HASH.parse().unwrap_or_default(),
                callback_gas_limit: 500_000,
                interval: 30,
            })
            .with_alias(NetworkAlias {
                name: "hardhat".into(),
                chain_id: HARDHAT_CHAIN_ID,
                rpc_url: None,
                transient: true,
            })
            .with_alias(NetworkAlias {
                name: "localhost".into(),
                chain_id: HARDHAT_CHAIN_ID,
                rpc_url: Some(localhost_rpc_url.to_string()),
                transient: false,
            })
            .with_alias(NetworkAlias {
                name: "sepolia".into(),
                chain_id: SEPOLIA_CHAIN_ID,
                rpc_url: sepolia_rpc_url,
                transient: false,
            })
    }

    pub fn with_network(mut self, config: NetworkConfig) -> Self {
        self.configs.insert(config.chain_id, config);
        self
    }

    pub fn with_alias(mut self, alias: NetworkAlias) -> Self {
        self.aliases.insert(alias.name.clone(), alias);
        self
    }

    /// Look up the configuration for the chain the node reported.
    ///
    /// A node that reports no chain id at all is a fatal configuration error,
    /// as is a chain id the registry does not know.
    pub fn get(&self, chain_id: Option<u64>) -> Result<&NetworkConfig> {
        let chain_id = chain_id.ok_or(DeployError::MissingChainId)?;
        self.configs
            .get(&chain_id)
            .ok_or(DeployError::UnknownChainId(chain_id))
    }

    /// Resolve a `--network` name.
    pub fn alias(&self, name: &str) -> Result<&NetworkAlias> {
        self.aliases.get(name).ok_or_else(|| {
            let known = self.aliases.keys().cloned().collect::<Vec<_>>().join(", ");
            DeployError::UnknownNetwork(name.to_string(), known)
        })
    }

    pub fn is_development(&self, chain_id: u64) -> bool {
        self.development_chains.contains(&chain_id)
    }

    /// Confirmations to await after each deployment transaction.
    pub fn confirmations(&self, chain_id: u64) -> usize {
        if self.is_development(chain_id) {
            DEVELOPMENT_CONFIRMATIONS
        } else {
            LIVE_CONFIRMATIONS
        }
    }

    pub fn aliases(&self) -> impl Iterator<Item = &NetworkAlias> {
        self.aliases.values()
    }

    pub fn networks(&self) -> impl Iterator<Item = &NetworkConfig> {
        self.configs.values()
    }
}
