//! Deployment orchestration for a VRF-backed raffle.
//!
//! Deploys a mock VRF coordinator on development chains, deploys the raffle
//! against the right coordinator and subscription for the connected chain,
//! registers it as a consumer, and verifies it on live networks.

pub mod artifacts;
pub mod chain;
pub mod config;
pub mod coordinator;
pub mod deploy;
pub mod deployments;
pub mod error;
pub mod events;
pub mod gas;
pub mod networks;
pub mod raffle;
pub mod retry;
pub mod revert;
pub mod verify;
pub mod vrf;
