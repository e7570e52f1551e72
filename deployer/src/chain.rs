//! Connection to the selected network and the transaction plumbing shared by
//! every deployment step.
//!
//! All transactions go out one at a time from a single signer and are awaited
//! to the configured number of confirmations before the next one is built, so
//! nonces never overlap.

use anyhow::{Context, Result, anyhow};
use ethers::abi::{Abi, Detokenize, Token};
use ethers::contract::{ContractCall, ContractError, ContractFactory};
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, BlockNumber, TransactionReceipt, U256, U64};
use ethers::utils::{Anvil, AnvilInstance};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::artifacts::ContractArtifact;
use crate::config::AppConfig;
use crate::error::DeployError;
use crate::networks::NetworkAlias;
use crate::revert::RaffleRevert;

/// Signing client every component talks to the chain through.
pub type Client = SignerMiddleware<Provider<Http>, LocalWallet>;

/// Account #0 of every Hardhat/Anvil development node.
const DEV_ACCOUNT_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

/// Receipt polling interval on local nodes, which mine instantly.
const DEV_POLL_INTERVAL: Duration = Duration::from_millis(100);
const LIVE_POLL_INTERVAL: Duration = Duration::from_secs(4);

/// An open connection to one network.
pub struct Connection {
    pub client: Arc<Client>,
    pub network: String,
    /// Chain id reported by the node, `None` if it reported none.
    pub chain_id: Option<u64>,
    /// Keeps a transient node alive for the lifetime of the connection.
    _node: Option<AnvilInstance>,
}

impl Connection {
    /// Connect to `alias`, spawning a throwaway node for transient networks.
    ///
    /// `is_development` decides whether the well-known local account may be
    /// used when `PRIVATE_KEY` is unset.
    pub async fn open(
        alias: &NetworkAlias,
        config: &AppConfig,
        is_development: bool,
    ) -> Result<Self> {
        let (endpoint, node) = if alias.transient {
            let builder = Anvil::new().chain_id(alias.chain_id);
            let node = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| builder.spawn()))
                .map_err(|e| {
                    let e = e
                        .downcast_ref::<String>()
                        .cloned()
                        .or_else(|| e.downcast_ref::<&str>().map(|s| s.to_string()))
                        .unwrap_or_default();
                    anyhow!("failed to spawn anvil: {e}")
                })?;
            info!(endpoint = %node.endpoint(), "Started transient development node");
            (node.endpoint(), Some(node))
        } else {
            let url = alias.rpc_url.clone().ok_or_else(|| {
                DeployError::MissingRpcUrl(alias.name.clone(), rpc_env_var(&alias.name))
            })?;
            (url, None)
        };

        let interval = if is_development {
            DEV_POLL_INTERVAL
        } else {
            LIVE_POLL_INTERVAL
        };
        let provider = Provider::<Http>::try_from(endpoint.as_str())
            .with_context(|| format!("invalid RPC URL for `{}`", alias.name))?
            .interval(interval);

        let reported = provider
            .get_chainid()
            .await
            .with_context(|| format!("failed to query chain id from `{}`", alias.name))?;
        let chain_id = reported_chain_id(reported);
        if chain_id.is_some_and(|id| id != alias.chain_id) {
            warn!(
                network = %alias.name,
                expected = alias.chain_id,
                reported = ?chain_id,
                "Node reports a different chain id than the network definition"
            );
        }

        let key = match (&config.private_key, is_development) {
            (Some(key), _) => key.clone(),
            (None, true) => DEV_ACCOUNT_KEY.to_string(),
            (None, false) => return Err(DeployError::MissingPrivateKey(alias.name.clone()).into()),
        };
        let wallet: LocalWallet = key
            .trim_start_matches("0x")
            .parse()
            .context("PRIVATE_KEY is not a valid secp256k1 key")?;
        let wallet = wallet.with_chain_id(chain_id.unwrap_or(alias.chain_id));

        info!(
            network = %alias.name,
            chain_id = ?chain_id,
            deployer = ?wallet.address(),
            "Connected"
        );

        Ok(Self {
            client: Arc::new(SignerMiddleware::new(provider, wallet)),
            network: alias.name.clone(),
            chain_id,
            _node: node,
        })
    }

    pub fn deployer(&self) -> Address {
        self.client.address()
    }
}

/// Chain id as reported by `eth_chainId`. Zero, and ids that do not fit a
/// `u64`, count as no chain id at all.
fn reported_chain_id(raw: U256) -> Option<u64> {
    u64::try_from(raw).ok().filter(|id| *id != 0)
}

/// Environment variable that supplies the RPC URL of a named network.
fn rpc_env_var(network: &str) -> &'static str {
    match network {
        "localhost" => "LOCALHOST_RPC_URL",
        _ => "SEPOLIA_RPC_URL",
    }
}

/// Deploy `artifact` with ABI-encoded constructor `args` and wait for
/// `confirmations` blocks.
pub async fn deploy_contract(
    client: Arc<Client>,
    artifact: &ContractArtifact,
    args: Vec<Token>,
    confirmations: usize,
) -> Result<(Address, TransactionReceipt)> {
    let factory = ContractFactory::new(artifact.abi.clone(), artifact.bytecode.clone(), client);
    let (contract, receipt) = factory
        .deploy_tokens(args)
        .with_context(|| format!("failed to encode `{}` deployment", artifact.name))?
        .confirmations(confirmations)
        .send_with_receipt()
        .await
        .with_context(|| format!("`{}` deployment failed", artifact.name))?;

    debug!(
        contract = %artifact.name,
        tx = ?receipt.transaction_hash,
        gas_used = ?receipt.gas_used,
        "Deployment mined"
    );
    Ok((contract.address(), receipt))
}

/// Send a contract call and wait for `confirmations` blocks.
///
/// Reverts that match a custom error declared in `errors` come back as
/// [`DeployError::Reverted`] so callers can match on the error name.
pub async fn send<D: Detokenize>(
    call: ContractCall<Client, D>,
    confirmations: usize,
    errors: &Abi,
) -> Result<TransactionReceipt> {
    let pending = match call.send().await {
        Ok(pending) => pending,
        Err(e) => return Err(classify(e, errors)),
    };
    let receipt = pending
        .confirmations(confirmations)
        .await?
        .ok_or(DeployError::TransactionDropped)?;

    if receipt.status == Some(U64::zero()) {
        anyhow::bail!(
            "transaction {:?} reverted without reason",
            receipt.transaction_hash
        );
    }
    Ok(receipt)
}

/// Turn a contract error into a typed revert when its data is recognised.
pub fn classify(err: ContractError<Client>, errors: &Abi) -> anyhow::Error {
    if let Some(revert) = err
        .as_revert()
        .and_then(|data| RaffleRevert::decode(errors, data))
    {
        return DeployError::Reverted(revert).into();
    }
    anyhow::Error::new(err)
}

/// Extract the typed revert from an error produced by [`send`], if any.
pub fn revert_of(err: &anyhow::Error) -> Option<&RaffleRevert> {
    match err.downcast_ref::<DeployError>() {
        Some(DeployError::Reverted(revert)) => Some(revert),
        _ => None,
    }
}

/// Does `address` hold contract code?
pub async fn has_code(client: &Client, address: Address) -> Result<bool> {
    let code = client.get_code(address, None).await?;
    Ok(!code.is_empty())
}

/// Advance the development node's clock by `seconds`.
pub async fn increase_time(client: &Client, seconds: u64) -> Result<()> {
    client
        .provider()
        .request::<_, serde_json::Value>("evm_increaseTime", [seconds])
        .await
        .context("evm_increaseTime failed")?;
    Ok(())
}

/// Mine one block on the development node.
pub async fn mine(client: &Client) -> Result<()> {
    client
        .provider()
        .request::<_, serde_json::Value>("evm_mine", ())
        .await
        .context("evm_mine failed")?;
    Ok(())
}

/// Timestamp of the latest block.
pub async fn latest_timestamp(client: &Client) -> Result<U256> {
    let block = client
        .get_block(BlockNumber::Latest)
        .await?
        .context("node returned no latest block")?;
    Ok(block.timestamp)
}
