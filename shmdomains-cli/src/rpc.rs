//! Provider construction with ordered RPC fallback.

use std::time::Duration;

use alloy::primitives::Address;
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use anyhow::{Context, Result, anyhow, bail};
use shmdomains::DomainMarket;

/// Timeout for the liveness probe sent to each endpoint.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Connect to the first endpoint in `rpcs` that answers `eth_blockNumber`
/// and bind the marketplace at `marketplace`.
///
/// # Errors
///
/// Returns an error if `rpcs` is empty or no endpoint responds.
pub async fn connect(rpcs: &[String], marketplace: Address) -> Result<DomainMarket<DynProvider>> {
    let mut last_err = None;

    for (i, rpc_url) in rpcs.iter().enumerate() {
        match probe(rpc_url).await {
            Ok(provider) => {
                tracing::debug!(rpc = %rpc_url, "connected");
                return Ok(DomainMarket::new(provider, marketplace));
            }
            Err(e) => {
                if let Some(next) = rpcs.get(i + 1) {
                    tracing::warn!(rpc = %rpc_url, %next, error = %e, "RPC failed, falling back");
                } else {
                    tracing::error!(rpc = %rpc_url, error = %e, "last RPC failed");
                }
                last_err = Some(e);
            }
        }
    }

    match last_err {
        Some(e) => Err(e),
        None => bail!("no RPC endpoint configured"),
    }
}

async fn probe(rpc_url: &str) -> Result<DynProvider> {
    let provider = ProviderBuilder::new()
        .connect_http(
            rpc_url
                .parse()
                .with_context(|| format!("invalid RPC URL: {rpc_url}"))?,
        )
        .erased();
    let latest = tokio::time::timeout(PROBE_TIMEOUT, provider.get_block_number())
        .await
        .map_err(|_| anyhow!("eth_blockNumber timed out"))?
        .context("eth_blockNumber failed")?;
    tracing::debug!(rpc = rpc_url, latest, "endpoint alive");
    Ok(provider)
}
