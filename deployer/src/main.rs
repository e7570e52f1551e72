//! Raffle deployer
//!
//! Command-line entry point:
//!
//! - **deploy**: run the tagged deployment scripts against a network.
//! - **register-consumer**: finish a run whose consumer registration failed.
//! - **verify**: submit the recorded raffle to the block explorer.
//! - **networks**: list the known networks and their parameters.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ethers::types::U256;
use ethers::utils::format_ether;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

use raffle_deployer::chain::Connection;
use raffle_deployer::config::{AppConfig, parse_uint};
use raffle_deployer::deploy::{self, DeployContext, Tag};
use raffle_deployer::deployments::DeploymentStore;
use raffle_deployer::error::DeployError;
use raffle_deployer::gas::GasReport;
use raffle_deployer::networks::NetworkRegistry;
use raffle_deployer::raffle::{RAFFLE, RaffleConstructorArgs};
use raffle_deployer::verify::EtherscanVerifier;

#[derive(Parser)]
#[command(name = "raffle-deployer", version, about = "Deploy the VRF-backed Raffle contract")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Deploy the mock coordinator (development only) and the raffle.
    Deploy {
        #[arg(long, default_value = "localhost")]
        network: String,
        /// Only run scripts carrying one of these tags.
        #[arg(long, value_enum, value_delimiter = ',')]
        tags: Vec<Tag>,
    },
    /// Register the recorded raffle as a consumer of its subscription.
    RegisterConsumer {
        #[arg(long, default_value = "localhost")]
        network: String,
        /// Subscription to register with instead of the recorded one.
        #[arg(long, value_parser = parse_subscription_id)]
        subscription_id: Option<U256>,
    },
    /// Verify the recorded raffle on the block explorer.
    Verify {
        #[arg(long, default_value = "sepolia")]
        network: String,
    },
    /// List known networks.
    Networks,
}

fn parse_subscription_id(raw: &str) -> Result<U256, String> {
    parse_uint(raw).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,ethers_providers=warn,hyper=warn,reqwest=warn")
        }))
        .with_target(true)
        .with_ansi(true)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env().context("invalid configuration")?;
    let registry = config.registry();

    execute(cli.command, &config, &registry).await
}

async fn execute(command: Command, config: &AppConfig, registry: &NetworkRegistry) -> Result<()> {
    match command {
        Command::Deploy { network, tags } => {
            let (connection, store) = open(&network, config, registry).await?;
            let gas = GasReport::new();
            let ctx = DeployContext::new(&connection, config, registry, &store, &gas);

            match deploy::run_with_report(&ctx, &tags).await {
                Ok(summary) => {
                    if let Some(raffle) = summary.raffle {
                        info!(
                            address = ?raffle.address,
                            subscription_id = %raffle.subscription_id,
                            ticket_price = %format_ether(raffle.args.ticket_price),
                            verified = ?raffle.verified,
                            "{RAFFLE} ready"
                        );
                    }
                    Ok(())
                }
                Err(e) => {
                    if let Some(DeployError::PartialDeployment { .. }) = e.downcast_ref::<DeployError>() {
                        error!(
                            "Finish the run with `raffle-deployer register-consumer --network {network}`"
                        );
                    }
                    Err(e)
                }
            }
        }
        Command::RegisterConsumer {
            network,
            subscription_id,
        } => {
            let (connection, store) = open(&network, config, registry).await?;
            let gas = GasReport::new();
            let ctx = DeployContext::new(&connection, config, registry, &store, &gas);
            deploy::register_consumer(&ctx, subscription_id).await
        }
        Command::Verify { network } => {
            let alias = registry.alias(&network)?;
            let api_key = config
                .etherscan_api_key
                .clone()
                .context("ETHERSCAN_API_KEY must be set to verify contracts")?;
            let store = DeploymentStore::on_disk(&config.deployments_dir, &alias.name);
            let record = store.require(RAFFLE)?;
            let args = RaffleConstructorArgs::from_json(&record.args)?;
            let artifact = raffle_deployer::artifacts::ContractArtifact::load(
                &config.artifacts_dir,
                RAFFLE,
            )?;

            let request =
                deploy::verification_request(alias.chain_id, &artifact, record.address, &args)?;
            EtherscanVerifier::new(api_key)?.verify(&request).await
        }
        Command::Networks => {
            for alias in registry.aliases() {
                let params = registry.get(Some(alias.chain_id)).ok();
                println!(
                    "{:<10} chain {:<9} {:<11} rpc {:<28} coordinator {}",
                    alias.name,
                    alias.chain_id,
                    if registry.is_development(alias.chain_id) {
                        "development"
                    } else {
                        "live"
                    },
                    alias
                        .rpc_url
                        .as_deref()
                        .unwrap_or(if alias.transient { "(transient)" } else { "(unset)" }),
                    params
                        .and_then(|p| p.vrf_coordinator)
                        .map(|a| format!("{a:?}"))
                        .unwrap_or_else(|| "mock".into()),
                );
            }
            Ok(())
        }
    }
}

/// Connect to `network` and open its deployment store.
async fn open(
    network: &str,
    config: &AppConfig,
    registry: &NetworkRegistry,
) -> Result<(Connection, DeploymentStore)> {
    let alias = registry.alias(network)?;
    let development = registry.is_development(alias.chain_id);
    let connection = Connection::open(alias, config, development).await?;

    let store = if alias.transient {
        DeploymentStore::in_memory(&alias.name)
    } else {
        DeploymentStore::on_disk(&config.deployments_dir, &alias.name)
    };
    Ok((connection, store))
}
