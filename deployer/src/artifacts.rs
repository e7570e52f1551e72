//! Compiled contract artifacts.
//!
//! Contracts are compiled outside this tool. Both Hardhat
//! (`artifacts/contracts/<File>.sol/<Name>.json`, `bytecode` as a hex string)
//! and Foundry (`out/<File>.sol/<Name>.json`, `bytecode.object`) layouts are
//! understood. Hardhat's `<Name>.dbg.json` points at the build-info file that
//! carries the exact compiler input, which is what source verification needs.

use ethers::abi::Abi;
use ethers::types::Bytes;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{DeployError, Result};

/// ABI and creation bytecode of one contract.
#[derive(Debug, Clone)]
pub struct ContractArtifact {
    pub name: String,
    /// Source file the contract was compiled from, e.g. `contracts/Raffle.sol`.
    pub source_name: Option<String>,
    pub abi: Abi,
    pub bytecode: Bytes,
    pub path: PathBuf,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawArtifact {
    contract_name: Option<String>,
    source_name: Option<String>,
    abi: Abi,
    bytecode: RawBytecode,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawBytecode {
    Hex(String),
    Object { object: String },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DebugFile {
    build_info: String,
}

/// Compiler input and version recorded by Hardhat for a compilation job.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfo {
    pub solc_long_version: String,
    pub input: serde_json::Value,
}

impl BuildInfo {
    /// Compiler version in the `v0.8.28+commit.7893614a` form explorers expect.
    pub fn compiler_version(&self) -> String {
        if self.solc_long_version.starts_with('v') {
            self.solc_long_version.clone()
        } else {
            format!("v{}", self.solc_long_version)
        }
    }
}

impl ContractArtifact {
    /// Find and load the artifact for `name` anywhere under `dir`.
    pub fn load(dir: &Path, name: &str) -> Result<Self> {
        let path = find_artifact(dir, name)?.ok_or_else(|| DeployError::MissingArtifact {
            contract: name.to_string(),
            dir: dir.to_path_buf(),
        })?;
        debug!(contract = name, path = %path.display(), "Loading artifact");
        Self::from_file(&path, name)
    }

    /// Parse an artifact file.
    pub fn from_file(path: &Path, name: &str) -> Result<Self> {
        let invalid = |reason: String| DeployError::InvalidArtifact {
            path: path.to_path_buf(),
            reason,
        };

        let contents = fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
        let raw: RawArtifact =
            serde_json::from_str(&contents).map_err(|e| invalid(e.to_string()))?;

        let hex = match raw.bytecode {
            RawBytecode::Hex(s) => s,
            RawBytecode::Object { object } => object,
        };
        let bytecode: Bytes = hex
            .parse()
            .map_err(|_| invalid("bytecode is not valid hex (unlinked libraries?)".into()))?;
        if bytecode.is_empty() {
            return Err(invalid("bytecode is empty (abstract contract or interface?)".into()));
        }

        Ok(Self {
            name: raw.contract_name.unwrap_or_else(|| name.to_string()),
            source_name: raw.source_name,
            abi: raw.abi,
            bytecode,
            path: path.to_path_buf(),
        })
    }

    /// `<source>:<name>`, or just the name when the source is unknown.
    pub fn fully_qualified_name(&self) -> String {
        match &self.source_name {
            Some(source) => format!("{source}:{}", self.name),
            None => self.name.clone(),
        }
    }

    /// Load the Hardhat build-info referenced by this artifact's `.dbg.json`.
    pub fn build_info(&self) -> Result<BuildInfo> {
        let dbg_path = self.path.with_file_name(format!("{}.dbg.json", self.name));
        let invalid = |reason: String| DeployError::InvalidArtifact {
            path: dbg_path.clone(),
            reason,
        };

        let dbg: DebugFile = fs::read_to_string(&dbg_path)
            .map_err(|e| invalid(e.to_string()))
            .and_then(|s| serde_json::from_str(&s).map_err(|e| invalid(e.to_string())))?;

        let base = dbg_path.parent().unwrap_or_else(|| Path::new("."));
        let info_path = base.join(&dbg.build_info);
        let contents = fs::read_to_string(&info_path).map_err(|e| invalid(e.to_string()))?;
        serde_json::from_str(&contents).map_err(|e| invalid(e.to_string()))
    }
}

/// Depth-first search for `<name>.json`, skipping build-info and debug files.
fn find_artifact(dir: &Path, name: &str) -> Result<Option<PathBuf>> {
    let target = format!("{name}.json");
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return Ok(None),
    };

    let mut subdirs = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            if path.file_name().is_some_and(|n| n == "build-info") {
                continue;
            }
            subdirs.push(path);
        } else if path.file_name().is_some_and(|n| n == target.as_str()) {
            return Ok(Some(path));
        }
    }

    subdirs.sort();
    for sub in subdirs {
        if let Some(found) = find_artifact(&sub, name)? {
            return Ok(Some(found));
        }
    }
    Ok(None)
}
