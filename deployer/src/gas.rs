//! Gas accounting for a deployment run.
//!
//! Every deployment and transaction the run sends is recorded with the gas it
//! used and the price it paid. The report is written as plain text at the end
//! of the run; it is priced in USD only when a CoinMarketCap key is configured.

use anyhow::{Context, Result};
use ethers::types::{TransactionReceipt, U256};
use ethers::utils::format_units;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{info, warn};

const COINMARKETCAP_QUOTE_URL: &str =
    "https://pro-api.coinmarketcap.com/v1/cryptocurrency/quotes/latest";

/// HTTP request timeout for the price lookup.
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Gas spent by one transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct GasEntry {
    pub contract: String,
    /// `deployment` or the called method name.
    pub method: String,
    pub gas_used: U256,
    /// Effective price in wei per gas.
    pub gas_price: U256,
}

impl GasEntry {
    pub fn cost_wei(&self) -> U256 {
        self.gas_used.saturating_mul(self.gas_price)
    }
}

/// Accumulates [`GasEntry`]s; shared by reference across deployment steps.
#[derive(Default)]
pub struct GasReport {
    entries: Mutex<Vec<GasEntry>>,
}

impl GasReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the gas a mined transaction used.
    pub fn record(&self, contract: &str, method: &str, receipt: &TransactionReceipt) {
        let entry = GasEntry {
            contract: contract.to_string(),
            method: method.to_string(),
            gas_used: receipt.gas_used.unwrap_or_default(),
            gas_price: receipt.effective_gas_price.unwrap_or_default(),
        };
        self.lock().push(entry);
    }

    pub fn entries(&self) -> Vec<GasEntry> {
        self.lock().clone()
    }

    /// Entries are only ever appended whole, so a poisoned lock still guards
    /// a consistent list.
    fn lock(&self) -> MutexGuard<'_, Vec<GasEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| {
            warn!("Gas report lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    pub fn total_gas(&self) -> U256 {
        self.entries()
            .iter()
            .fold(U256::zero(), |acc, e| acc.saturating_add(e.gas_used))
    }

    /// Render the report; `eth_usd` adds a USD column when known.
    pub fn render(&self, eth_usd: Option<f64>) -> String {
        let entries = self.entries();
        let mut out = String::new();

        let _ = writeln!(
            out,
            "{:<24} {:<22} {:>12} {:>14} {:>12}",
            "Contract", "Method", "Gas", "Cost (ETH)", "Cost (USD)"
        );
        let _ = writeln!(out, "{}", "-".repeat(88));

        let mut total_eth = 0.0;
        for entry in &entries {
            let eth = wei_to_eth(entry.cost_wei());
            total_eth += eth;
            let _ = writeln!(
                out,
                "{:<24} {:<22} {:>12} {:>14.6} {:>12}",
                entry.contract,
                entry.method,
                entry.gas_used,
                eth,
                usd(eth, eth_usd)
            );
        }

        let _ = writeln!(out, "{}", "-".repeat(88));
        let _ = writeln!(
            out,
            "{:<24} {:<22} {:>12} {:>14.6} {:>12}",
            "Total",
            "",
            self.total_gas(),
            total_eth,
            usd(total_eth, eth_usd)
        );
        out
    }

    /// Write the report to `path`, pricing it when an API key is available.
    pub async fn write(&self, path: &Path, coinmarketcap_api_key: Option<&str>) -> Result<()> {
        let eth_usd = match coinmarketcap_api_key {
            Some(key) => match fetch_eth_usd(key).await {
                Ok(price) => Some(price),
                Err(e) => {
                    warn!(error = %format!("{e:#}"), "ETH price lookup failed, writing unpriced gas report");
                    None
                }
            },
            None => None,
        };

        std::fs::write(path, self.render(eth_usd))
            .with_context(|| format!("failed to write gas report to {}", path.display()))?;
        info!(path = %path.display(), total_gas = %self.total_gas(), "Gas report written");
        Ok(())
    }
}

fn wei_to_eth(wei: U256) -> f64 {
    format_units(wei, "ether")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_default()
}

fn usd(eth: f64, eth_usd: Option<f64>) -> String {
    match eth_usd {
        Some(price) => format!("{:.2}", eth * price),
        None => "-".into(),
    }
}

/// Current ETH price in USD from CoinMarketCap.
async fn fetch_eth_usd(api_key: &str) -> Result<f64> {
    let client = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
    let body: serde_json::Value = client
        .get(COINMARKETCAP_QUOTE_URL)
        .query(&[("symbol", "ETH"), ("convert", "USD")])
        .header("X-CMC_PRO_API_KEY", api_key)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    parse_eth_usd(&body).context("unexpected CoinMarketCap response")
}

fn parse_eth_usd(body: &serde_json::Value) -> Option<f64> {
    body.pointer("/data/ETH/quote/USD/price")
        .or_else(|| body.pointer("/data/ETH/0/quote/USD/price"))
        .and_then(|p| p.as_f64())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::utils::parse_units;

    fn receipt(gas: u64, price_gwei: u64) -> TransactionReceipt {
        TransactionReceipt {
            gas_used: Some(U256::from(gas)),
            effective_gas_price: Some(parse_units(price_gwei, "gwei").unwrap().into()),
            ..Default::default()
        }
    }

    #[test]
    fn records_and_totals_entries() {
        let report = GasReport::new();
        assert!(report.is_empty());
        report.record("VRFCoordinatorV2Mock", "deployment", &receipt(1_000_000, 1));
        report.record("Raffle", "deployment", &receipt(500_000, 1));

        assert_eq!(report.entries().len(), 2);
        assert_eq!(report.total_gas(), U256::from(1_500_000));
        assert_eq!(report.entries()[1].cost_wei(), U256::from(500_000u64 * 1_000_000_000));
    }

    #[test]
    fn records_survive_a_poisoned_lock() {
        let report = GasReport::new();
        report.record("Raffle", "deployment", &receipt(100, 1));
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = report.entries.lock().unwrap();
            panic!("poison");
        }));
        assert!(report.entries.is_poisoned());

        report.record("Raffle", "enter", &receipt(200, 1));
        assert_eq!(report.entries().len(), 2);
        assert_eq!(report.total_gas(), U256::from(300));
    }

    #[test]
    fn render_without_price_leaves_usd_blank() {
        let report = GasReport::new();
        report.record("Raffle", "deployment", &receipt(1_000_000, 1));
        let text = report.render(None);
        assert!(text.contains("Raffle"));
        assert!(text.contains("0.001000"));
        assert!(text.lines().last().unwrap().trim_end().ends_with('-'));
    }

    #[test]
    fn render_with_price_adds_usd() {
        let report = GasReport::new();
        report.record("Raffle", "deployment", &receipt(1_000_000, 1));
        let text = report.render(Some(2000.0));
        assert!(text.contains("2.00"));
    }

    #[test]
    fn parses_quote_payloads() {
        let v1 = serde_json::json!({"data": {"ETH": {"quote": {"USD": {"price": 3100.5}}}}});
        assert_eq!(parse_eth_usd(&v1), Some(3100.5));
        let v2 = serde_json::json!({"data": {"ETH": [{"quote": {"USD": {"price": 42.0}}}]}});
        assert_eq!(parse_eth_usd(&v2), Some(42.0));
        assert_eq!(parse_eth_usd(&serde_json::json!({"status": {}})), None);
    }

    #[tokio::test]
    async fn writes_unpriced_report_without_api_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gas-report.txt");
        let report = GasReport::new();
        report.record("Raffle", "deployment", &receipt(21_000, 2));
        report.write(&path, None).await.unwrap();
        assert!(std::fs::read_to_string(path).unwrap().contains("Raffle"));
    }
}
