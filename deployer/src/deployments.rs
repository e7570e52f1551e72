//! Per-network deployment records.
//!
//! Records live at `<root>/<network>/<ContractName>.json`, the layout later
//! runs and the test suite use to find already-deployed contracts. Transient
//! networks keep their records in memory only.

use anyhow::{Context, Result};
use ethers::abi::Abi;
use ethers::types::{Address, H256};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// One deployed contract.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    pub contract_name: String,
    pub address: Address,
    /// Constructor arguments as JSON values, in constructor order.
    pub args: Vec<serde_json::Value>,
    pub abi: Abi,
    pub transaction_hash: Option<H256>,
    pub block_number: Option<u64>,
    /// Confirmations awaited before the record was written.
    pub confirmations: usize,
}

/// Storage for [`DeploymentRecord`]s of one network.
pub struct DeploymentStore {
    network: String,
    dir: Option<PathBuf>,
    memory: Mutex<HashMap<String, DeploymentRecord>>,
}

impl DeploymentStore {
    /// File-backed store under `<root>/<network>/`.
    pub fn on_disk(root: impl Into<PathBuf>, network: &str) -> Self {
        Self {
            network: network.to_string(),
            dir: Some(root.into().join(network)),
            memory: Mutex::new(HashMap::new()),
        }
    }

    /// Store for a throwaway chain; nothing outlives the process.
    pub fn in_memory(network: &str) -> Self {
        Self {
            network: network.to_string(),
            dir: None,
            memory: Mutex::new(HashMap::new()),
        }
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn save(&self, record: &DeploymentRecord) -> Result<()> {
        if let Some(dir) = &self.dir {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
            let path = dir.join(format!("{}.json", record.contract_name));
            let json = serde_json::to_string_pretty(record)?;
            fs::write(&path, json)
                .with_context(|| format!("failed to write {}", path.display()))?;
            debug!(contract = %record.contract_name, path = %path.display(), "Deployment saved");
        }
        self.memory
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record.contract_name.clone(), record.clone());
        Ok(())
    }

    /// Look up a record by contract name, `Ok(None)` when nothing is recorded.
    pub fn get(&self, contract_name: &str) -> Result<Option<DeploymentRecord>> {
        if let Some(record) = self
            .memory
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(contract_name)
        {
            return Ok(Some(record.clone()));
        }

        let Some(dir) = &self.dir else {
            return Ok(None);
        };
        let path = dir.join(format!("{contract_name}.json"));
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let record = serde_json::from_str(&contents)
            .with_context(|| format!("invalid deployment record {}", path.display()))?;
        Ok(Some(record))
    }

    /// Like [`get`](Self::get) but missing records are an error.
    pub fn require(&self, contract_name: &str) -> Result<DeploymentRecord> {
        self.get(contract_name)?.ok_or_else(|| {
            crate::error::DeployError::MissingDeployment {
                contract: contract_name.to_string(),
                network: self.network.clone(),
            }
            .into()
        })
    }
}
