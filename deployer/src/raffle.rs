//! The deployed Raffle contract: constructor arguments and a typed client.
//!
//! The contract itself is an opaque remote service. Everything here goes
//! through its transaction and event interface.

use anyhow::{Context, Result};
use ethers::abi::{Abi, ParamType, Token};
use ethers::contract::Contract;
use ethers::types::{Address, Bytes, H256, TransactionReceipt, U256};
use std::sync::Arc;

use crate::chain::{self, Client};
use crate::config::parse_uint;
use crate::error::DeployError;
use crate::events;
use crate::revert::RaffleState;

pub const RAFFLE: &str = "Raffle";

/// Constructor arguments, in the order the contract declares them.
///
/// The ABI cannot tell a ticket price from an interval, so the order is fixed
/// here and checked against the artifact before anything is deployed.
#[derive(Debug, Clone, PartialEq)]
pub struct RaffleConstructorArgs {
    pub subscription_id: U256,
    pub vrf_coordinator: Address,
    pub ticket_price: U256,
    pub key_hash: H256,
    pub callback_gas_limit: u32,
    pub interval: u64,
}

impl RaffleConstructorArgs {
    pub fn to_tokens(&self) -> Vec<Token> {
        vec![
            Token::Uint(self.subscription_id),
            Token::Address(self.vrf_coordinator),
            Token::Uint(self.ticket_price),
            Token::FixedBytes(self.key_hash.as_bytes().to_vec()),
            Token::Uint(U256::from(self.callback_gas_limit)),
            Token::Uint(U256::from(self.interval)),
        ]
    }

    /// JSON form stored in the deployment record.
    pub fn to_json(&self) -> Vec<serde_json::Value> {
        vec![
            self.subscription_id.to_string().into(),
            format!("{:?}", self.vrf_coordinator).into(),
            self.ticket_price.to_string().into(),
            format!("{:?}", self.key_hash).into(),
            self.callback_gas_limit.to_string().into(),
            self.interval.to_string().into(),
        ]
    }

    /// Parse the JSON form back, e.g. from a deployment record.
    pub fn from_json(values: &[serde_json::Value]) -> Result<Self> {
        let field = |i: usize, name: &str| -> Result<String> {
            values
                .get(i)
                .and_then(|v| match v {
                    serde_json::Value::String(s) => Some(s.clone()),
                    serde_json::Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .with_context(|| format!("constructor argument {i} (`{name}`) missing"))
        };

        Ok(Self {
            subscription_id: parse_uint(&field(0, "subscriptionId")?)?,
            vrf_coordinator: field(1, "vrfCoordinator")?
                .parse()
                .context("invalid coordinator address")?,
            ticket_price: parse_uint(&field(2, "ticketPrice")?)?,
            key_hash: field(3, "keyHash")?.parse().context("invalid key hash")?,
            callback_gas_limit: field(4, "callbackGasLimit")?
                .parse()
                .context("invalid callback gas limit")?,
            interval: field(5, "interval")?.parse().context("invalid interval")?,
        })
    }

    /// ABI-encoded arguments, as block explorers expect them for verification.
    pub fn encoded(&self) -> Vec<u8> {
        ethers::abi::encode(&self.to_tokens())
    }

    /// Check the arguments against the constructor declared in `abi`: same
    /// arity, same type at each position, and every integer fits its width.
    pub fn validate(&self, abi: &Abi) -> Result<(), DeployError> {
        let mismatch = |reason: String| DeployError::ConstructorMismatch {
            contract: RAFFLE.to_string(),
            reason,
        };

        let params = abi
            .constructor
            .as_ref()
            .map(|c| c.inputs.as_slice())
            .unwrap_or_default();
        let tokens = self.to_tokens();
        if params.len() != tokens.len() {
            return Err(mismatch(format!(
                "contract expects {} arguments, deployer supplies {}",
                params.len(),
                tokens.len()
            )));
        }

        for (i, (param, token)) in params.iter().zip(&tokens).enumerate() {
            let fits = match (&param.kind, token) {
                (ParamType::Uint(bits), Token::Uint(v)) => v.bits() <= *bits,
                (ParamType::Address, Token::Address(_)) => true,
                (ParamType::FixedBytes(n), Token::FixedBytes(b)) => *n == b.len(),
                _ => false,
            };
            if !fits {
                return Err(mismatch(format!(
                    "argument {i} (`{}`: {}) does not accept {token:?}",
                    param.name, param.kind
                )));
            }
        }
        Ok(())
    }
}

/// Typed client for a deployed raffle.
pub struct RaffleClient {
    contract: Contract<Client>,
    abi: Abi,
    confirmations: usize,
}

impl RaffleClient {
    pub fn new(address: Address, abi: Abi, client: Arc<Client>, confirmations: usize) -> Self {
        Self {
            contract: Contract::new(address, abi.clone(), client),
            abi,
            confirmations,
        }
    }

    pub fn address(&self) -> Address {
        self.contract.address()
    }

    /// Same raffle, transactions signed by `client`.
    pub fn connect(&self, client: Arc<Client>) -> Self {
        Self::new(self.address(), self.abi.clone(), client, self.confirmations)
    }

    /// Buy a ticket. Reverts with `Raffle__NotEnoughValueEntered` below the price.
    pub async fn enter(&self, value: U256) -> Result<TransactionReceipt> {
        let call = self.contract.method::<_, ()>("enter", ())?.value(value);
        chain::send(call, self.confirmations, &self.abi).await
    }

    /// Returns whether upkeep is needed right now.
    pub async fn check_upkeep(&self) -> Result<bool> {
        let (needed, _perform_data) = self
            .contract
            .method::<_, (bool, Bytes)>("checkUpkeep", Bytes::new())?
            .call()
            .await?;
        Ok(needed)
    }

    /// Close the round and request randomness. Reverts with
    /// `Raffle__UpkeepNotNeeded(balance, players, state)` when not due.
    pub async fn perform_upkeep(&self) -> Result<TransactionReceipt> {
        let call = self.contract.method::<_, ()>("performUpkeep", Bytes::new())?;
        chain::send(call, self.confirmations, &self.abi).await
    }

    pub async fn ticket_price(&self) -> Result<U256> {
        Ok(self.contract.method::<_, U256>("getTicketPrice", ())?.call().await?)
    }

    pub async fn player(&self, index: u64) -> Result<Address> {
        Ok(self
            .contract
            .method::<_, Address>("getPlayer", U256::from(index))?
            .call()
            .await?)
    }

    pub async fn number_of_players(&self) -> Result<U256> {
        Ok(self.contract.method::<_, U256>("getNumberOfPlayers", ())?.call().await?)
    }

    /// Every player of the current round, in entry order.
    pub async fn players(&self) -> Result<Vec<Address>> {
        let count = self.number_of_players().await?.as_u64();
        let mut players = Vec::with_capacity(count as usize);
        for i in 0..count {
            players.push(self.player(i).await?);
        }
        Ok(players)
    }

    pub async fn raffle_state(&self) -> Result<RaffleState> {
        let raw = self
            .contract
            .method::<_, U256>("getRaffleState", ())?
            .call()
            .await?;
        RaffleState::from_uint(raw)
            .ok_or_else(|| anyhow::anyhow!("unknown raffle state {raw}"))
    }

    pub async fn recent_winner(&self) -> Result<Address> {
        Ok(self.contract.method::<_, Address>("getRecentWinner", ())?.call().await?)
    }

    pub async fn last_timestamp(&self) -> Result<U256> {
        Ok(self.contract.method::<_, U256>("getLastTimeStamp", ())?.call().await?)
    }

    pub async fn interval(&self) -> Result<U256> {
        Ok(self.contract.method::<_, U256>("getInterval", ())?.call().await?)
    }

    /// Players announced by `RaffleEnter` events in `receipt`.
    pub fn entered_players(&self, receipt: &TransactionReceipt) -> Result<Vec<Address>> {
        let logs = events::decode_all(&self.abi, "RaffleEnter", Some(self.address()), &receipt.logs)?;
        Ok(logs
            .into_iter()
            .filter_map(|log| {
                log.params
                    .into_iter()
                    .find(|p| p.name == "player")
                    .and_then(|p| p.value.into_address())
            })
            .collect())
    }

    /// Request id announced by `RequestedRaffleWinner` in `receipt`.
    pub fn requested_id(&self, receipt: &TransactionReceipt) -> Result<U256> {
        Ok(events::find_uint(
            &self.abi,
            "RequestedRaffleWinner",
            "requestId",
            Some(self.address()),
            &receipt.logs,
        )?)
    }

    /// Winner announced by `WinnerPicked` in `receipt`.
    pub fn picked_winner(&self, receipt: &TransactionReceipt) -> Result<Address> {
        Ok(events::find_address(
            &self.abi,
            "WinnerPicked",
            "winner",
            Some(self.address()),
            &receipt.logs,
        )?)
    }
}
