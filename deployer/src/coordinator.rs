//! VRF coordinator subscription management.
//!
//! Wraps the coordinator's subscription entry points: creation, funding and
//! consumer registration. On development chains the coordinator is the
//! `VRFCoordinatorV2Mock`, which also exposes manual fulfillment.

use anyhow::{Context, Result};
use ethers::abi::Abi;
use ethers::contract::Contract;
use ethers::types::{Address, TransactionReceipt, U256};
use std::sync::Arc;
use tracing::{info, instrument};

use crate::chain::{self, Client};
use crate::events;
use crate::gas::GasReport;
use crate::retry::{self, RetryPolicy};

pub const COORDINATOR_MOCK: &str = "VRFCoordinatorV2Mock";

/// Handle to a deployed coordinator.
pub struct Coordinator {
    contract: Contract<Client>,
    abi: Abi,
    confirmations: usize,
}

impl Coordinator {
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

    /// Create a subscription and return the id the coordinator issued.
    ///
    /// The id is read from the `SubscriptionCreated` event's `subId` field.
    #[instrument(skip_all, fields(coordinator = ?self.address()))]
    pub async fn create_subscription(&self, gas: &GasReport) -> Result<U256> {
        let call = self.contract.method::<_, u64>("createSubscription", ())?;
        let receipt = chain::send(call, self.confirmations, &self.abi)
            .await
            .context("createSubscription failed")?;
        gas.record(COORDINATOR_MOCK, "createSubscription", &receipt);

        let sub_id = events::find_uint(
            &self.abi,
            "SubscriptionCreated",
            "subId",
            Some(self.address()),
            &receipt.logs,
        )?;
        info!(subscription_id = %sub_id, tx = ?receipt.transaction_hash, "Subscription created");
        Ok(sub_id)
    }

    /// Top up a subscription's balance.
    pub async fn fund_subscription(
        &self,
        subscription_id: U256,
        amount: U256,
        gas: &GasReport,
    ) -> Result<()> {
        let call = self
            .contract
            .method::<_, ()>("fundSubscription", (subscription_id, amount))?;
        let receipt = chain::send(call, self.confirmations, &self.abi)
            .await
            .context("fundSubscription failed")?;
        gas.record(COORDINATOR_MOCK, "fundSubscription", &receipt);
        info!(subscription_id = %subscription_id, amount = %amount, "Subscription funded");
        Ok(())
    }

    /// Whether `consumer` is already authorized on the subscription.
    pub async fn consumer_is_added(&self, subscription_id: U256, consumer: Address) -> Result<bool> {
        let added = self
            .contract
            .method::<_, bool>("consumerIsAdded", (subscription_id, consumer))?
            .call()
            .await?;
        Ok(added)
    }

    /// Authorize `consumer` to request randomness from the subscription.
    pub async fn add_consumer(
        &self,
        subscription_id: U256,
        consumer: Address,
        gas: &GasReport,
    ) -> Result<()> {
        let call = self
            .contract
            .method::<_, ()>("addConsumer", (subscription_id, consumer))?;
        let receipt = chain::send(call, self.confirmations, &self.abi)
            .await
            .context("addConsumer failed")?;
        gas.record(COORDINATOR_MOCK, "addConsumer", &receipt);
        Ok(())
    }

    /// Register `consumer` unless it already is, retrying transient failures.
    ///
    /// Safe to run any number of times: a consumer that is already registered
    /// is left alone.
    pub async fn ensure_consumer(
        &self,
        subscription_id: U256,
        consumer: Address,
        policy: RetryPolicy,
        gas: &GasReport,
    ) -> Result<()> {
        retry::with_retries(policy, "consumer registration", retry::is_transient, move || async move {
            if self.consumer_is_added(subscription_id, consumer).await? {
                info!(subscription_id = %subscription_id, consumer = ?consumer, "Consumer already registered");
                return Ok(());
            }
            self.add_consumer(subscription_id, consumer, gas).await?;
            info!(subscription_id = %subscription_id, consumer = ?consumer, "Consumer registered");
            Ok(())
        })
        .await
    }

    /// Mock only: fulfill `request_id` with words the mock derives itself.
    pub async fn fulfill_random_words(
        &self,
        request_id: U256,
        consumer: Address,
    ) -> Result<TransactionReceipt> {
        let call = self
            .contract
            .method::<_, ()>("fulfillRandomWords", (request_id, consumer))?;
        chain::send(call, self.confirmations, &self.abi).await
    }

    /// Mock only: fulfill `request_id` with caller-chosen `words`.
    pub async fn fulfill_random_words_with_override(
        &self,
        request_id: U256,
        consumer: Address,
        words: Vec<U256>,
    ) -> Result<TransactionReceipt> {
        let call = self.contract.method::<_, ()>(
            "fulfillRandomWordsWithOverride",
            (request_id, consumer, words),
        )?;
        chain::send(call, self.confirmations, &self.abi).await
    }

    /// Request id from the mock's `RandomWordsRequested` event in `receipt`.
    pub fn request_id_from(&self, receipt: &TransactionReceipt) -> Result<U256> {
        Ok(events::find_uint(
            &self.abi,
            "RandomWordsRequested",
            "requestId",
            Some(self.address()),
            &receipt.logs,
        )?)
    }
}
