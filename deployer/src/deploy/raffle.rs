//! Raffle deployment: subscription provisioning, the deployment itself,
//! consumer registration on development chains, and verification on live ones.

use anyhow::{Context, Result};
use ethers::types::{Address, U256};
use ethers::utils::parse_ether;
use tracing::{info, warn};

use super::DeployContext;
use crate::artifacts::ContractArtifact;
use crate::chain;
use crate::coordinator::{COORDINATOR_MOCK, Coordinator};
use crate::error::DeployError;
use crate::raffle::{RAFFLE, RaffleConstructorArgs};
use crate::verify::{EtherscanVerifier, VerificationRequest, verify_best_effort};

/// LINK credited to subscriptions created on development chains.
pub fn subscription_fund_amount() -> U256 {
    parse_ether("30").unwrap_or_default()
}

/// Outcome of a raffle deployment.
#[derive(Debug, Clone)]
pub struct RaffleDeployment {
    pub address: Address,
    pub subscription_id: U256,
    pub vrf_coordinator: Address,
    pub args: RaffleConstructorArgs,
    /// `None` when verification was not attempted.
    pub verified: Option<bool>,
}

/// Deploy the raffle against the coordinator for the connected chain.
///
/// On development chains a fresh subscription is created on the mock,
/// funded, and the raffle registered as its consumer. On live networks the
/// pre-provisioned subscription is used and the contract is submitted for
/// source verification when an explorer key is configured.
///
/// A consumer-registration failure after the raffle is deployed is reported
/// as [`DeployError::PartialDeployment`]; the raffle stays deployed and
/// recorded, and `register-consumer` finishes the job.
pub async fn deploy_raffle(ctx: &DeployContext<'_>) -> Result<RaffleDeployment> {
    let network = ctx.network_config()?;
    let development = ctx.is_development();
    let confirmations = ctx.confirmations();
    let artifact = ctx.artifact(RAFFLE)?;

    let (vrf_coordinator, subscription_id, mock) = if development {
        let record = ctx.store.require(COORDINATOR_MOCK)?;
        let mock = Coordinator::new(record.address, record.abi, ctx.client.clone(), confirmations);
        let subscription_id = mock.create_subscription(ctx.gas).await?;
        mock.fund_subscription(subscription_id, subscription_fund_amount(), ctx.gas)
            .await?;
        (mock.address(), subscription_id, Some(mock))
    } else {
        let (coordinator, subscription_id) = live_subscription(ctx)?;
        (coordinator, subscription_id, None)
    };

    let args = RaffleConstructorArgs {
        subscription_id,
        vrf_coordinator,
        ticket_price: network.ticket_price,
        key_hash: network.key_hash,
        callback_gas_limit: network.callback_gas_limit,
        interval: network.interval,
    };
    args.validate(&artifact.abi)?;

    info!(
        network = %ctx.network_name(),
        coordinator = ?vrf_coordinator,
        subscription_id = %subscription_id,
        confirmations,
        "Deploying {RAFFLE}"
    );
    let (address, receipt) =
        chain::deploy_contract(ctx.client.clone(), &artifact, args.to_tokens(), confirmations)
            .await?;
    ctx.gas.record(RAFFLE, "deployment", &receipt);
    ctx.save(&artifact, address, &receipt, args.to_json())?;
    info!(address = ?address, tx = ?receipt.transaction_hash, "{RAFFLE} deployed");

    if let Some(mock) = &mock {
        mock.ensure_consumer(subscription_id, address, ctx.retry_policy(), ctx.gas)
            .await
            .map_err(|e| DeployError::PartialDeployment {
                raffle: address,
                subscription_id,
                source: e.into(),
            })?;
    }

    let verified = if development {
        None
    } else {
        if let Some(url) = ctx.config.explorer_url(network.chain_id, &format!("{address:?}")) {
            info!(url = %url, "Explorer");
        }
        verify_if_configured(ctx, network.chain_id, &artifact, address, &args).await
    };

    Ok(RaffleDeployment {
        address,
        subscription_id,
        vrf_coordinator,
        args,
        verified,
    })
}

/// Coordinator and pre-provisioned subscription for a live network.
fn live_subscription(ctx: &DeployContext<'_>) -> Result<(Address, U256), DeployError> {
    let network = ctx.network_config()?;
    let coordinator = network
        .vrf_coordinator
        .ok_or_else(|| DeployError::MissingCoordinator(ctx.network_name().to_string()))?;
    let subscription_id = ctx
        .config
        .subscription_id
        .ok_or_else(|| DeployError::MissingSubscriptionId(ctx.network_name().to_string()))?;
    Ok((coordinator, subscription_id))
}

/// Verify when an explorer key is configured; `None` when it is not.
async fn verify_if_configured(
    ctx: &DeployContext<'_>,
    chain_id: u64,
    artifact: &ContractArtifact,
    address: Address,
    args: &RaffleConstructorArgs,
) -> Option<bool> {
    let Some(key) = &ctx.config.etherscan_api_key else {
        info!("ETHERSCAN_API_KEY not set, skipping verification");
        return None;
    };
    Some(verify_deployed(key, chain_id, artifact, address, args).await)
}

async fn verify_deployed(
    api_key: &str,
    chain_id: u64,
    artifact: &ContractArtifact,
    address: Address,
    args: &RaffleConstructorArgs,
) -> bool {
    let prepared = verification_request(chain_id, artifact, address, args)
        .and_then(|request| Ok((EtherscanVerifier::new(api_key.to_string())?, request)));
    match prepared {
        Ok((verifier, request)) => verify_best_effort(&verifier, &request).await,
        Err(e) => {
            warn!(error = %format!("{e:#}"), "Cannot prepare verification; deployment is unaffected");
            false
        }
    }
}

/// Assemble the explorer submission for a deployed raffle.
pub fn verification_request(
    chain_id: u64,
    artifact: &ContractArtifact,
    address: Address,
    args: &RaffleConstructorArgs,
) -> Result<VerificationRequest> {
    let build_info = artifact
        .build_info()
        .context("source verification needs Hardhat build-info")?;
    Ok(VerificationRequest {
        chain_id,
        address,
        contract_name: artifact.fully_qualified_name(),
        compiler_version: build_info.compiler_version(),
        source: build_info.input,
        constructor_args: args.encoded(),
    })
}

/// Register the recorded raffle as a consumer of its subscription.
///
/// Completes a run that ended in [`DeployError::PartialDeployment`]. The
/// subscription defaults to the one the raffle was deployed with.
pub async fn register_consumer(
    ctx: &DeployContext<'_>,
    subscription_override: Option<U256>,
) -> Result<()> {
    ctx.network_config()?;
    if !ctx.is_development() {
        anyhow::bail!(
            "consumers on `{}` are managed by the subscription owner through the VRF coordinator",
            ctx.network_name()
        );
    }

    let raffle = ctx.store.require(RAFFLE)?;
    let args = RaffleConstructorArgs::from_json(&raffle.args)
        .with_context(|| format!("invalid {RAFFLE} deployment record"))?;
    let mock_record = ctx.store.require(COORDINATOR_MOCK)?;
    if mock_record.address != args.vrf_coordinator {
        warn!(
            recorded = ?mock_record.address,
            raffle_coordinator = ?args.vrf_coordinator,
            "Raffle was deployed against a different coordinator"
        );
    }

    let subscription_id = subscription_override.unwrap_or(args.subscription_id);
    let coordinator = Coordinator::new(
        args.vrf_coordinator,
        mock_record.abi,
        ctx.client.clone(),
        ctx.confirmations(),
    );
    coordinator
        .ensure_consumer(subscription_id, raffle.address, ctx.retry_policy(), ctx.gas)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deploy::testing;
    use crate::deployments::DeploymentStore;
    use crate::gas::GasReport;
    use crate::networks::{NetworkConfig, NetworkRegistry, SEPOLIA_CHAIN_ID};
    use ethers::types::H256;

    const LIVE_TEST_CHAIN: u64 = 4_242;

    /// Registry with one live chain and no coordinator configured for it.
    fn registry_without_coordinator() -> NetworkRegistry {
        NetworkRegistry::new([31337]).with_network(NetworkConfig {
            chain_id: LIVE_TEST_CHAIN,
            name: "registry-name".into(),
            rpc_url: None,
            vrf_coordinator: None,
            ticket_price: U256::exp10(16),
            key_hash: H256::zero(),
            callback_gas_limit: 500_000,
            interval: 30,
        })
    }

    #[tokio::test]
    async fn live_deploy_without_subscription_id_fails_before_sending() {
        let dir = tempfile::tempdir().unwrap();
        testing::write_raffle_artifact(dir.path());
        let config = testing::config(dir.path(), &[]);
        let registry = config.registry();
        let store = DeploymentStore::in_memory("sepolia");
        let gas = GasReport::new();
        let ctx = DeployContext {
            config: &config,
            registry: &registry,
            client: testing::offline_client(SEPOLIA_CHAIN_ID),
            chain_id: Some(SEPOLIA_CHAIN_ID),
            store: &store,
            gas: &gas,
        };

        let err = deploy_raffle(&ctx).await.unwrap_err();
        match err.downcast_ref::<DeployError>() {
            Some(DeployError::MissingSubscriptionId(network)) => assert_eq!(network, "sepolia"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(gas.is_empty());
        assert!(store.get(RAFFLE).unwrap().is_none());
    }

    #[tokio::test]
    async fn live_deploy_without_coordinator_names_selected_network() {
        let dir = tempfile::tempdir().unwrap();
        testing::write_raffle_artifact(dir.path());
        let config = testing::config(dir.path(), &[("VRF_SUBSCRIPTION_ID", "42")]);
        let registry = registry_without_coordinator();
        let store = DeploymentStore::in_memory("staging");
        let gas = GasReport::new();
        let ctx = DeployContext {
            config: &config,
            registry: &registry,
            client: testing::offline_client(LIVE_TEST_CHAIN),
            chain_id: Some(LIVE_TEST_CHAIN),
            store: &store,
            gas: &gas,
        };

        let err = deploy_raffle(&ctx).await.unwrap_err();
        match err.downcast_ref::<DeployError>() {
            Some(DeployError::MissingCoordinator(network)) => assert_eq!(network, "staging"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn live_network_uses_configured_coordinator_and_subscription() {
        let dir = tempfile::tempdir().unwrap();
        let config = testing::config(dir.path(), &[("VRF_SUBSCRIPTION_ID", "0x2a")]);
        let registry = config.registry();
        let store = DeploymentStore::in_memory("sepolia");
        let gas = GasReport::new();
        let ctx = DeployContext {
            config: &config,
            registry: &registry,
            client: testing::offline_client(SEPOLIA_CHAIN_ID),
            chain_id: Some(SEPOLIA_CHAIN_ID),
            store: &store,
            gas: &gas,
        };

        let (coordinator, subscription_id) = live_subscription(&ctx).unwrap();
        let expected: Address = "0x9DdfaCa8183c41ad55329BdeeD9F6A8d53168B1B".parse().unwrap();
        assert_eq!(coordinator, expected);
        assert_eq!(subscription_id, U256::from(42));
    }

    #[tokio::test]
    async fn verification_skipped_without_explorer_key() {
        let dir = tempfile::tempdir().unwrap();
        testing::write_raffle_artifact(dir.path());
        let config = testing::config(dir.path(), &[]);
        let registry = config.registry();
        let store = DeploymentStore::in_memory("sepolia");
        let gas = GasReport::new();
        let ctx = DeployContext {
            config: &config,
            registry: &registry,
            client: testing::offline_client(SEPOLIA_CHAIN_ID),
            chain_id: Some(SEPOLIA_CHAIN_ID),
            store: &store,
            gas: &gas,
        };
        let artifact = ctx.artifact(RAFFLE).unwrap();
        let args = RaffleConstructorArgs {
            subscription_id: U256::one(),
            vrf_coordinator: Address::repeat_byte(1),
            ticket_price: U256::exp10(16),
            key_hash: H256::zero(),
            callback_gas_limit: 500_000,
            interval: 30,
        };

        let verified =
            verify_if_configured(&ctx, SEPOLIA_CHAIN_ID, &artifact, Address::zero(), &args).await;
        assert_eq!(verified, None);
    }

    #[tokio::test]
    async fn verification_without_build_info_reports_unverified() {
        let dir = tempfile::tempdir().unwrap();
        testing::write_raffle_artifact(dir.path());
        let config = testing::config(dir.path(), &[("ETHERSCAN_API_KEY", "key")]);
        let registry = config.registry();
        let store = DeploymentStore::in_memory("sepolia");
        let gas = GasReport::new();
        let ctx = DeployContext {
            config: &config,
            registry: &registry,
            client: testing::offline_client(SEPOLIA_CHAIN_ID),
            chain_id: Some(SEPOLIA_CHAIN_ID),
            store: &store,
            gas: &gas,
        };
        let artifact = ctx.artifact(RAFFLE).unwrap();
        let args = RaffleConstructorArgs {
            subscription_id: U256::one(),
            vrf_coordinator: Address::repeat_byte(1),
            ticket_price: U256::exp10(16),
            key_hash: H256::zero(),
            callback_gas_limit: 500_000,
            interval: 30,
        };

        let verified =
            verify_if_configured(&ctx, SEPOLIA_CHAIN_ID, &artifact, Address::zero(), &args).await;
        assert_eq!(verified, Some(false));
    }

    #[test]
    fn development_subscriptions_get_thirty_link() {
        assert_eq!(subscription_fund_amount(), U256::exp10(18) * 30);
    }

    #[test]
    fn verification_request_requires_build_info() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Raffle.json");
        std::fs::write(
            &path,
            r#"{"contractName":"Raffle","sourceName":"contracts/Raffle.sol","abi":[],"bytecode":"0x6080"}"#,
        )
        .unwrap();
        let artifact = ContractArtifact::from_file(&path, RAFFLE).unwrap();
        let args = RaffleConstructorArgs {
            subscription_id: U256::one(),
            vrf_coordinator: Address::repeat_byte(1),
            ticket_price: U256::exp10(16),
            key_hash: Default::default(),
            callback_gas_limit: 500_000,
            interval: 30,
        };

        let err = verification_request(11155111, &artifact, Address::zero(), &args).unwrap_err();
        assert!(format!("{err:#}").contains("build-info"));
    }

    #[test]
    fn verification_request_uses_build_info() {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = dir.path().join("contracts/Raffle.sol");
        let build_info = dir.path().join("build-info");
        std::fs::create_dir_all(&artifacts).unwrap();
        std::fs::create_dir_all(&build_info).unwrap();
        std::fs::write(
            artifacts.join("Raffle.json"),
            r#"{"contractName":"Raffle","sourceName":"contracts/Raffle.sol","abi":[],"bytecode":"0x6080"}"#,
        )
        .unwrap();
        std::fs::write(
            artifacts.join("Raffle.dbg.json"),
            r#"{"_format":"hh-sol-dbg-1","buildInfo":"../../build-info/abc.json"}"#,
        )
        .unwrap();
        std::fs::write(
            build_info.join("abc.json"),
            r#"{"solcLongVersion":"0.8.28+commit.7893614a","input":{"language":"Solidity"}}"#,
        )
        .unwrap();

        let artifact = ContractArtifact::from_file(&artifacts.join("Raffle.json"), RAFFLE).unwrap();
        let args = RaffleConstructorArgs {
            subscription_id: U256::one(),
            vrf_coordinator: Address::repeat_byte(1),
            ticket_price: U256::exp10(16),
            key_hash: Default::default(),
            callback_gas_limit: 500_000,
            interval: 30,
        };
        let request = verification_request(11155111, &artifact, Address::zero(), &args).unwrap();
        assert_eq!(request.contract_name, "contracts/Raffle.sol:Raffle");
        assert_eq!(request.compiler_version, "v0.8.28+commit.7893614a");
        assert_eq!(request.constructor_args.len(), 6 * 32);
        assert_eq!(request.source["language"], "Solidity");
    }
}
