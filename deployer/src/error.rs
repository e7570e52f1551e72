//! Error taxonomy for deployment runs.
//!
//! Configuration errors are fatal and abort before anything is sent on-chain.
//! Partial-deployment errors carry enough context (raffle address and
//! subscription id) for an operator to finish the run with
//! `raffle-deployer register-consumer`.

use ethers::types::{Address, U256};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeployError {
    /// The connected node did not report a chain id.
    #[error("chain id not found: the selected network reported no chain id")]
    MissingChainId,

    #[error("no network configuration for chain id {0}")]
    UnknownChainId(u64),

    #[error("unknown network name `{0}` (expected one of: {1})")]
    UnknownNetwork(String, String),

    #[error("network `{0}` has no RPC URL configured (set {1})")]
    MissingRpcUrl(String, &'static str),

    #[error("PRIVATE_KEY must be set to deploy to live network `{0}`")]
    MissingPrivateKey(String),

    #[error("network `{0}` has no VRF coordinator address configured")]
    MissingCoordinator(String),

    #[error("VRF_SUBSCRIPTION_ID must be set to deploy to live network `{0}`")]
    MissingSubscriptionId(String),

    #[error("no `{contract}` deployment recorded for network `{network}`")]
    MissingDeployment { contract: String, network: String },

    #[error("artifact for `{contract}` not found under {dir}")]
    MissingArtifact { contract: String, dir: PathBuf },

    #[error("invalid artifact {path}: {reason}")]
    InvalidArtifact { path: PathBuf, reason: String },

    #[error("constructor argument mismatch for `{contract}`: {reason}")]
    ConstructorMismatch { contract: String, reason: String },

    /// The receipt did not contain the named event, or its field was missing.
    #[error("event `{event}` with field `{field}` not found in transaction logs")]
    EventNotFound { event: String, field: String },

    #[error("transaction dropped from mempool before confirmation")]
    TransactionDropped,

    /// The contract reverted with a named custom error.
    #[error("contract reverted: {0}")]
    Reverted(#[from] crate::revert::RaffleRevert),

    /// The raffle was deployed but could not be registered as a consumer.
    #[error(
        "raffle deployed at {raffle:?} but consumer registration for subscription {subscription_id} failed: {source}"
    )]
    PartialDeployment {
        raffle: Address,
        subscription_id: U256,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    #[error("verification failed: {0}")]
    Verification(String),
}

pub type Result<T, E = DeployError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_chain_id_names_the_key() {
        let msg = DeployError::MissingChainId.to_string();
        assert!(msg.contains("chain id"));
    }

    #[test]
    fn unknown_chain_id_carries_the_id() {
        let msg = DeployError::UnknownChainId(5).to_string();
        assert!(msg.contains('5'));
    }

    #[test]
    fn partial_deployment_keeps_source() {
        let err = DeployError::PartialDeployment {
            raffle: Address::repeat_byte(0x11),
            subscription_id: U256::from(7),
            source: anyhow::anyhow!("rpc timeout").into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("subscription 7"));
        assert!(msg.contains("rpc timeout"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
