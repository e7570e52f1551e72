//! Mock oracle deployment for development chains.

use anyhow::Result;
use ethers::abi::Token;
use ethers::types::{Address, U256};
use ethers::utils::parse_ether;
use tracing::{debug, info};

use super::DeployContext;
use crate::chain;
use crate::coordinator::COORDINATOR_MOCK;
use crate::error::DeployError;

/// Constructor arguments of `VRFCoordinatorV2Mock`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockConstructorArgs {
    /// Flat LINK fee charged per request.
    pub base_fee: U256,
    /// LINK paid per unit of callback gas.
    pub gas_price_link: U256,
}

impl Default for MockConstructorArgs {
    fn default() -> Self {
        Self {
            base_fee: parse_ether("0.25").unwrap_or_default(),
            gas_price_link: U256::from(1_000_000_000u64),
        }
    }
}

impl MockConstructorArgs {
    pub fn to_tokens(&self) -> Vec<Token> {
        vec![Token::Uint(self.base_fee), Token::Uint(self.gas_price_link)]
    }

    pub fn to_json(&self) -> Vec<serde_json::Value> {
        vec![
            self.base_fee.to_string().into(),
            self.gas_price_link.to_string().into(),
        ]
    }
}

/// Deploy the mock coordinator on development chains.
///
/// Returns `None` on live networks, where nothing is deployed. A mock already
/// recorded for this network is reused as long as its address still holds
/// code.
pub async fn deploy_mocks(ctx: &DeployContext<'_>) -> Result<Option<Address>> {
    let chain_id = ctx.chain_id.ok_or(DeployError::MissingChainId)?;
    if !ctx.registry.is_development(chain_id) {
        debug!(chain_id, "Live network, no mocks needed");
        return Ok(None);
    }

    if let Some(existing) = ctx.store.get(COORDINATOR_MOCK)? {
        if chain::has_code(&ctx.client, existing.address).await? {
            info!(address = ?existing.address, "Reusing deployed {COORDINATOR_MOCK}");
            return Ok(Some(existing.address));
        }
        debug!(address = ?existing.address, "Recorded mock has no code, redeploying");
    }

    info!(chain_id, "Development chain detected, deploying mocks");
    let artifact = ctx.artifact(COORDINATOR_MOCK)?;
    let args = MockConstructorArgs::default();

    let (address, receipt) = chain::deploy_contract(
        ctx.client.clone(),
        &artifact,
        args.to_tokens(),
        ctx.confirmations(),
    )
    .await?;
    ctx.gas.record(COORDINATOR_MOCK, "deployment", &receipt);
    ctx.save(&artifact, address, &receipt, args.to_json())?;

    info!(address = ?address, tx = ?receipt.transaction_hash, "Mocks deployed");
    Ok(Some(address))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_fees() {
        let args = MockConstructorArgs::default();
        assert_eq!(args.base_fee, U256::from(250_000_000_000_000_000u64));
        assert_eq!(args.gas_price_link, U256::exp10(9));
    }

    #[test]
    fn json_matches_token_order() {
        let args = MockConstructorArgs::default();
        let json = args.to_json();
        assert_eq!(json[0], "250000000000000000");
        assert_eq!(json[1], "1000000000");
        assert_eq!(args.to_tokens()[1], Token::Uint(U256::exp10(9)));
    }
}
