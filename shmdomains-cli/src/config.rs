//! Runtime configuration loaded from `config.toml`.
//!
//! Provides per-chain marketplace deployments with ordered RPC endpoint
//! lists (if the primary RPC fails, the next one is tried) and overrides for
//! the fetch and reconcile tuning.
//!
//! ```toml
//! probe_names = ["test", "alice"]
//!
//! [fetch]
//! ranges = [5000, 50000]
//! batch_size = 2000
//!
//! [deployments.8118]
//! marketplace = "0x..."
//! deployment_block = 1200000
//! rpcs = ["https://api.shardeum.org"]
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use alloy::primitives::Address;
use anyhow::{Context, Result};
use serde::Deserialize;
use shmdomains::{FetchOptions, RangeStrategy, ReconcileOptions};

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Names probed when no auction logs are found.
    #[serde(default)]
    pub probe_names: Option<Vec<String>>,
    /// Log fetching and reconciliation tuning.
    #[serde(default)]
    pub fetch: FetchConfig,
    /// Marketplace deployments, keyed by chain ID.
    #[serde(default)]
    pub deployments: HashMap<u64, Deployment>,
}

/// A marketplace deployment on one chain.
#[derive(Debug, Clone, Deserialize)]
pub struct Deployment {
    /// Marketplace contract address.
    pub marketplace: Address,
    /// Block at which the contract was deployed; log searches start here.
    #[serde(default)]
    pub deployment_block: u64,
    /// Ordered list of RPC URLs (best first).
    #[serde(default)]
    pub rpcs: Vec<String>,
}

/// Optional overrides for [`FetchOptions`] and [`ReconcileOptions`].
#[derive(Debug, Default, Deserialize)]
pub struct FetchConfig {
    /// Widths of the recent-block windows tried before full history.
    pub ranges: Option<Vec<u64>>,
    /// Initial `eth_getLogs` batch size in blocks.
    pub batch_size: Option<u64>,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: Option<u64>,
    /// Upper bound on candidates re-read per pass.
    pub max_candidates: Option<usize>,
    /// Contract reads in flight at once.
    pub concurrency: Option<usize>,
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// Returns [`Config::default`] if the file does not exist,
    /// allowing the binary to work without any config.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text =
            std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing {}", path.display()))
    }

    /// Parse configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid configuration.
    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// The deployment configured for `chain_id`, if any.
    #[must_use]
    pub fn deployment(&self, chain_id: u64) -> Option<&Deployment> {
        self.deployments.get(&chain_id)
    }

    /// Return the RPC URL list for a chain, falling back to the built-in
    /// default if the config has no entry for this chain.
    #[must_use]
    pub fn rpcs_for(&self, chain_id: u64, default_rpc: &str) -> Vec<String> {
        match self.deployments.get(&chain_id) {
            Some(d) if !d.rpcs.is_empty() => d.rpcs.clone(),
            _ => vec![default_rpc.to_owned()],
        }
    }

    /// Fetch options with the configured overrides applied.
    ///
    /// Configured ranges are always followed by a full-history step.
    #[must_use]
    pub fn fetch_options(&self) -> FetchOptions {
        let mut options = FetchOptions::default();
        if let Some(ranges) = &self.fetch.ranges {
            options.ladder = ranges
                .iter()
                .map(|&blocks| RangeStrategy::Recent { blocks })
                .chain([RangeStrategy::FullHistory])
                .collect();
        }
        if let Some(size) = self.fetch.batch_size {
            options.batch_size = size;
        }
        if let Some(secs) = self.fetch.request_timeout_secs {
            options.request_timeout = Duration::from_secs(secs);
        }
        options
    }

    /// Reconcile options for a deployment starting at `start_block`.
    #[must_use]
    pub fn reconcile_options(&self, start_block: Option<u64>) -> ReconcileOptions {
        let mut options = ReconcileOptions {
            start_block,
            ..ReconcileOptions::default()
        };
        if let Some(names) = &self.probe_names {
            options.probe_names.clone_from(names);
        }
        if let Some(max) = self.fetch.max_candidates {
            options.max_candidates = max;
        }
        if let Some(concurrency) = self.fetch.concurrency {
            options.concurrency = concurrency;
        }
        options
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::address;

    use super::*;

    const SAMPLE: &str = r#"
probe_names = ["alice"]

[fetch]
ranges = [1000]
batch_size = 500
request_timeout_secs = 5
max_candidates = 3

[deployments.8083]
marketplace = "0x00000000000000000000000000000000000000aa"
deployment_block = 42
rpcs = ["https://a.example", "https://b.example"]
"#;

    #[test]
    fn parses_deployments_and_overrides() {
        let config = Config::parse(SAMPLE).unwrap();

        let deployment = config.deployment(8083).unwrap();
        assert_eq!(
            deployment.marketplace,
            address!("00000000000000000000000000000000000000aa"),
            "address"
        );
        assert_eq!(deployment.deployment_block, 42, "deployment block");
        assert_eq!(config.rpcs_for(8083, "https://default").len(), 2, "configured rpcs");
        assert_eq!(config.rpcs_for(8118, "https://default"), ["https://default"], "fallback");

        let fetch = config.fetch_options();
        assert_eq!(
            fetch.ladder,
            [RangeStrategy::Recent { blocks: 1000 }, RangeStrategy::FullHistory],
            "ladder ends with full history"
        );
        assert_eq!(fetch.batch_size, 500, "batch size");
        assert_eq!(fetch.request_timeout, Duration::from_secs(5), "timeout");

        let reconcile = config.reconcile_options(Some(42));
        assert_eq!(reconcile.probe_names, ["alice"], "probe names");
        assert_eq!(reconcile.max_candidates, 3, "cap");
        assert_eq!(reconcile.start_block, Some(42), "start block");
    }

    #[test]
    fn missing_file_means_defaults() {
        let config = Config::load(Path::new("/nonexistent/shmdomains.toml")).unwrap();
        assert!(config.deployments.is_empty(), "no deployments");
        assert_eq!(config.fetch_options().ladder.len(), 3, "default ladder");
    }
}
