//! Decoding of Raffle custom-error reverts.
//!
//! Reverts are expected outcomes (an entry below the ticket price, upkeep
//! before the interval elapsed), so they are turned into a typed value the
//! caller can match on instead of an opaque RPC error string.

use ethers::abi::{Abi, Token, decode};
use ethers::utils::id;
use ethers::types::U256;
use std::fmt;
use thiserror::Error;

/// On-chain lifecycle of a raffle round, as the contract encodes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaffleState {
    Open,
    Calculating,
}

impl RaffleState {
    pub fn from_uint(value: U256) -> Option<Self> {
        if value > U256::from(u8::MAX) {
            return None;
        }
        match value.as_u64() {
            0 => Some(Self::Open),
            1 => Some(Self::Calculating),
            _ => None,
        }
    }
}

impl fmt::Display for RaffleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => f.write_str("OPEN"),
            Self::Calculating => f.write_str("CALCULATING"),
        }
    }
}

/// A named custom error raised by the raffle contract.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RaffleRevert {
    /// Entry value below the ticket price.
    #[error("Raffle__NotEnoughValueEntered")]
    NotEnoughValueEntered,
    #[error("Raffle__NotOpen")]
    NotOpen,
    #[error(
        "Raffle__UpkeepNotNeeded(balance: {balance}, players: {num_players}, state: {state})"
    )]
    UpkeepNotNeeded {
        balance: U256,
        num_players: U256,
        state: U256,
    },
    #[error("Raffle__TransferFailed")]
    TransferFailed,
    /// Declared in the ABI but not one this tool interprets.
    #[error("{name}")]
    Unknown { name: String, args: Vec<Token> },
}

impl RaffleRevert {
    /// Name of the Solidity error, e.g. `Raffle__NotOpen`.
    pub fn name(&self) -> String {
        match self {
            Self::NotEnoughValueEntered => "Raffle__NotEnoughValueEntered".into(),
            Self::NotOpen => "Raffle__NotOpen".into(),
            Self::UpkeepNotNeeded { .. } => "Raffle__UpkeepNotNeeded".into(),
            Self::TransferFailed => "Raffle__TransferFailed".into(),
            Self::Unknown { name, .. } => name.clone(),
        }
    }

    /// Decode ABI-encoded revert data (4-byte selector + arguments) against
    /// the custom errors declared in `abi`.
    pub fn decode(abi: &Abi, data: &[u8]) -> Option<Self> {
        if data.len() < 4 {
            return None;
        }
        let (selector, payload) = data.split_at(4);

        for error in abi.errors.values().flatten() {
            let kinds: Vec<_> = error.inputs.iter().map(|p| p.kind.clone()).collect();
            let signature = format!(
                "{}({})",
                error.name,
                kinds.iter().map(|k| k.to_string()).collect::<Vec<_>>().join(",")
            );
            if id(signature) != selector {
                continue;
            }
            let args = decode(&kinds, payload).ok()?;
            return Some(Self::from_parts(&error.name, args));
        }
        None
    }

    fn from_parts(name: &str, args: Vec<Token>) -> Self {
        // Older revisions of the contract used the ETH-specific name.
        match name {
            "Raffle__NotEnoughValueEntered" | "Raffle__NotEnoughETHEntered" => {
                Self::NotEnoughValueEntered
            }
            "Raffle__NotOpen" => Self::NotOpen,
            "Raffle__TransferFailed" => Self::TransferFailed,
            "Raffle__UpkeepNotNeeded" if args.len() == 3 => {
                let uint = |i: usize| args[i].clone().into_uint().unwrap_or_default();
                Self::UpkeepNotNeeded {
                    balance: uint(0),
                    num_players: uint(1),
                    state: uint(2),
                }
            }
            _ => Self::Unknown {
                name: name.to_string(),
                args,
            },
        }
    }
}
