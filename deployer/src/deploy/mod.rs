//! Deployment scripts and the context they run in.
//!
//! Scripts run in a fixed order: the mock coordinator first, then the raffle.
//! Each script carries tags; `--tags` selects the scripts whose tags overlap
//! the requested set, and no tags selects everything.

mod mocks;
mod raffle;

pub use mocks::{MockConstructorArgs, deploy_mocks};
pub use raffle::{
    RaffleDeployment, deploy_raffle, register_consumer, subscription_fund_amount,
    verification_request,
};

use anyhow::Result;
use ethers::types::{Address, TransactionReceipt};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use crate::artifacts::ContractArtifact;
use crate::chain::{Client, Connection};
use crate::config::AppConfig;
use crate::deployments::{DeploymentRecord, DeploymentStore};
use crate::gas::GasReport;
use crate::networks::{LIVE_CONFIRMATIONS, NetworkConfig, NetworkRegistry};
use crate::retry::RetryPolicy;

/// Selector for deployment scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Tag {
    All,
    Mocks,
    Raffle,
}

const MOCK_TAGS: &[Tag] = &[Tag::All, Tag::Mocks];
const RAFFLE_TAGS: &[Tag] = &[Tag::All, Tag::Raffle];

/// Whether a script tagged `script` runs for the `requested` tags.
pub fn selected(requested: &[Tag], script: &[Tag]) -> bool {
    requested.is_empty() || requested.iter().any(|tag| script.contains(tag))
}

/// Everything a deployment script needs.
pub struct DeployContext<'a> {
    pub config: &'a AppConfig,
    pub registry: &'a NetworkRegistry,
    pub client: Arc<Client>,
    /// Chain id reported by the node.
    pub chain_id: Option<u64>,
    pub store: &'a DeploymentStore,
    pub gas: &'a GasReport,
}

impl<'a> DeployContext<'a> {
    pub fn new(
        connection: &Connection,
        config: &'a AppConfig,
        registry: &'a NetworkRegistry,
        store: &'a DeploymentStore,
        gas: &'a GasReport,
    ) -> Self {
        Self {
            config,
            registry,
            client: connection.client.clone(),
            chain_id: connection.chain_id,
            store,
            gas,
        }
    }

    /// Parameters of the connected chain.
    pub fn network_config(&self) -> crate::error::Result<&'a NetworkConfig> {
        self.registry.get(self.chain_id)
    }

    /// Name the run was started with (`--network`), which may differ from
    /// the registry entry's name when aliases share a chain id.
    pub fn network_name(&self) -> &str {
        self.store.network()
    }

    pub fn is_development(&self) -> bool {
        self.chain_id
            .is_some_and(|id| self.registry.is_development(id))
    }

    pub fn confirmations(&self) -> usize {
        self.chain_id
            .map(|id| self.registry.confirmations(id))
            .unwrap_or(LIVE_CONFIRMATIONS)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.config.max_retries, self.config.initial_retry_delay_ms)
    }

    pub fn artifact(&self, name: &str) -> crate::error::Result<ContractArtifact> {
        ContractArtifact::load(&self.config.artifacts_dir, name)
    }

    /// Persist a deployment made by one of the scripts.
    fn save(
        &self,
        artifact: &ContractArtifact,
        address: Address,
        receipt: &TransactionReceipt,
        args: Vec<Value>,
    ) -> Result<()> {
        self.store.save(&DeploymentRecord {
            contract_name: artifact.name.clone(),
            address,
            args,
            abi: artifact.abi.clone(),
            transaction_hash: Some(receipt.transaction_hash),
            block_number: receipt.block_number.map(|n| n.as_u64()),
            confirmations: self.confirmations(),
        })
    }
}

/// What a run deployed.
#[derive(Debug, Default)]
pub struct DeploySummary {
    pub coordinator: Option<Address>,
    pub raffle: Option<RaffleDeployment>,
}

/// Run every script selected by `tags`, in order.
pub async fn run(ctx: &DeployContext<'_>, tags: &[Tag]) -> Result<DeploySummary> {
    let mut summary = DeploySummary::default();

    if selected(tags, MOCK_TAGS) {
        summary.coordinator = deploy_mocks(ctx).await?;
    }
    if selected(tags, RAFFLE_TAGS) {
        let deployment = deploy_raffle(ctx).await?;
        summary.coordinator = Some(deployment.vrf_coordinator);
        summary.raffle = Some(deployment);
    }

    info!(
        network = %ctx.network_name(),
        coordinator = ?summary.coordinator,
        raffle = ?summary.raffle.as_ref().map(|r| r.address),
        "Deployment run complete"
    );
    Ok(summary)
}

/// [`run`], then write the gas report.
///
/// A report that cannot be written is logged and never replaces the outcome
/// of the run.
pub async fn run_with_report(ctx: &DeployContext<'_>, tags: &[Tag]) -> Result<DeploySummary> {
    let result = run(ctx, tags).await;
    if !ctx.gas.is_empty() {
        if let Err(e) = ctx
            .gas
            .write(
                &ctx.config.gas_report_file,
                ctx.config.coinmarketcap_api_key.as_deref(),
            )
            .await
        {
            warn!(error = %format!("{e:#}"), "Gas report not written");
        }
    }
    result
}
