//! Source verification on Etherscan-compatible explorers.
//!
//! Submits the standard-JSON compiler input recorded in the Hardhat build-info
//! together with the ABI-encoded constructor arguments, then polls until the
//! explorer reports a verdict. Verification is never allowed to fail a
//! deployment: callers go through [`verify_best_effort`].

use anyhow::{Context, Result, anyhow};
use ethers::types::Address;
use ethers::utils::hex;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::DeployError;

/// Etherscan's multichain endpoint; the chain is selected with `chainid`.
const ETHERSCAN_API_URL: &str = "https://api.etherscan.io/v2/api";

/// HTTP request timeout for explorer calls.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_MAX_POLLS: u32 = 12;

/// Everything the explorer needs to verify one contract.
#[derive(Debug, Clone)]
pub struct VerificationRequest {
    pub chain_id: u64,
    pub address: Address,
    /// `<source path>:<contract name>`.
    pub contract_name: String,
    /// e.g. `v0.8.28+commit.7893614a`.
    pub compiler_version: String,
    /// Standard-JSON compiler input.
    pub source: serde_json::Value,
    /// ABI-encoded constructor arguments.
    pub constructor_args: Vec<u8>,
}

impl VerificationRequest {
    /// Form fields of the `verifysourcecode` call (API key excluded).
    pub fn form(&self) -> Vec<(&'static str, String)> {
        vec![
            ("module", "contract".into()),
            ("action", "verifysourcecode".into()),
            ("contractaddress", format!("{:?}", self.address)),
            ("sourceCode", self.source.to_string()),
            ("codeformat", "solidity-standard-json-input".into()),
            ("contractname", self.contract_name.clone()),
            ("compilerversion", self.compiler_version.clone()),
            // Misspelt in the Etherscan API itself.
            ("constructorArguements", hex::encode(&self.constructor_args)),
        ]
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    status: String,
    #[serde(default)]
    message: String,
    result: String,
}

/// Outcome of one status poll.
#[derive(Debug, PartialEq, Eq)]
enum Status {
    Pending,
    Verified,
    Failed(String),
}

/// What a `verifysourcecode` submission returned.
#[derive(Debug, PartialEq, Eq)]
enum Submission {
    Guid(String),
    AlreadyVerified,
}

fn interpret_submission(resp: &ApiResponse) -> Result<Submission, DeployError> {
    if resp.result.to_lowercase().contains("already verified") {
        return Ok(Submission::AlreadyVerified);
    }
    if resp.status == "1" {
        return Ok(Submission::Guid(resp.result.clone()));
    }
    Err(DeployError::Verification(format!(
        "{}: {}",
        resp.message, resp.result
    )))
}

fn interpret_status(resp: &ApiResponse) -> Status {
    let result = resp.result.to_lowercase();
    if result.contains("pending") || result.contains("in queue") {
        Status::Pending
    } else if result.contains("pass") || result.contains("already verified") {
        Status::Verified
    } else {
        Status::Failed(resp.result.clone())
    }
}

/// Etherscan API client for contract verification.
pub struct EtherscanVerifier {
    api_key: String,
    base_url: String,
    http: reqwest::Client,
    poll_interval: Duration,
    max_polls: u32,
}

impl EtherscanVerifier {
    pub fn new(api_key: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("failed to create HTTP client")?;
        Ok(Self {
            api_key,
            base_url: ETHERSCAN_API_URL.to_string(),
            http,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_polls: DEFAULT_MAX_POLLS,
        })
    }

    /// Submit `request` and wait for the explorer's verdict.
    pub async fn verify(&self, request: &VerificationRequest) -> Result<()> {
        info!(address = ?request.address, contract = %request.contract_name, "Verifying contract");

        let chain_id = request.chain_id.to_string();
        let mut form = request.form();
        form.push(("apikey", self.api_key.clone()));

        let resp: ApiResponse = self
            .http
            .post(&self.base_url)
            .query(&[("chainid", chain_id.as_str())])
            .form(&form)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let guid = match interpret_submission(&resp)? {
            Submission::AlreadyVerified => {
                info!(address = ?request.address, "Contract already verified");
                return Ok(());
            }
            Submission::Guid(guid) => guid,
        };
        debug!(guid = %guid, "Verification submitted");

        for _ in 0..self.max_polls {
            tokio::time::sleep(self.poll_interval).await;
            let resp: ApiResponse = self
                .http
                .get(&self.base_url)
                .query(&[
                    ("chainid", chain_id.as_str()),
                    ("module", "contract"),
                    ("action", "checkverifystatus"),
                    ("guid", guid.as_str()),
                    ("apikey", self.api_key.as_str()),
                ])
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;

            match interpret_status(&resp) {
                Status::Pending => continue,
                Status::Verified => {
                    info!(address = ?request.address, "Contract verified");
                    return Ok(());
                }
                Status::Failed(reason) => return Err(DeployError::Verification(reason).into()),
            }
        }

        Err(anyhow!(
            "verification still pending after {} polls (guid {guid})",
            self.max_polls
        ))
    }
}

/// Verify, logging instead of propagating any failure.
///
/// Returns whether the contract ended up verified.
pub async fn verify_best_effort(verifier: &EtherscanVerifier, request: &VerificationRequest) -> bool {
    match verifier.verify(request).await {
        Ok(()) => true,
        Err(e) => {
            warn!(
                address = ?request.address,
                error = %format!("{e:#}"),
                "Verification failed; deployment is unaffected"
            );
            false
        }
    }
}
