//! Incremental sale-history archiving.
//!
//! For each chain the archiver:
//! 1. Reads the existing `sales.parquet` (if any) and the cursor to find
//!    where the previous run stopped.
//! 2. Fetches `DomainSold`, `AuctionEnded` and `OfferAccepted` logs from
//!    there to the chain tip in adaptive batches.
//! 3. Resolves them into sale records (domain names, block timestamps).
//! 4. Appends them to the archive, rewritten atomically, and moves the cursor.
//!
//! The data directory layout is:
//! ```text
//! <data_dir>/<chain_id>/
//!   ├── cursor.json
//!   └── sales.parquet
//! ```

use std::path::Path;

use anyhow::{Context, Result, bail};
use arrow_array::RecordBatch;
use shmdomains::{EventFetcher, EventName, MarketSource, Reconciler, aggregate};

use crate::config::{Config, Deployment};
use crate::cursor::Cursor;
use crate::{parquet, rpc};

/// Events that transfer a domain.
const SALE_EVENTS: [EventName; 3] = [
    EventName::DomainSold,
    EventName::AuctionEnded,
    EventName::OfferAccepted,
];

/// Archive one chain with automatic RPC fallback.
///
/// Tries each RPC in `rpcs` in order. On failure the next endpoint is
/// attempted; the cursor and the archive's own progress ensure no sale is
/// written twice.
///
/// # Errors
///
/// Returns an error only if *all* RPCs fail, or none is configured.
pub async fn archive_chain(
    chain_id: u64,
    deployment: &Deployment,
    config: &Config,
    data_dir: &Path,
    rpcs: &[String],
) -> Result<()> {
    let mut last_err = None;

    for (i, rpc_url) in rpcs.iter().enumerate() {
        match try_archive(chain_id, deployment, config, data_dir, rpc_url).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                if let Some(next) = rpcs.get(i + 1) {
                    tracing::warn!(chain_id, rpc = %rpc_url, %next, error = %e, "RPC failed, falling back");
                } else {
                    tracing::error!(chain_id, rpc = %rpc_url, error = %e, "last RPC failed");
                }
                last_err = Some(e);
            }
        }
    }

    match last_err {
        Some(e) => Err(e),
        None => bail!("chain {chain_id}: no RPC endpoint configured"),
    }
}

/// Attempt a full archive pass using a single RPC endpoint.
async fn try_archive(
    chain_id: u64,
    deployment: &Deployment,
    config: &Config,
    data_dir: &Path,
    rpc_url: &str,
) -> Result<()> {
    tracing::info!(chain_id, rpc = rpc_url, "connecting");
    let market = rpc::connect(&[rpc_url.to_owned()], deployment.marketplace).await?;
    let reconciler = Reconciler::new(market)
        .with_fetcher(EventFetcher::new(config.fetch_options()))
        .with_options(config.reconcile_options(Some(deployment.deployment_block)));

    let chain_dir = data_dir.join(chain_id.to_string());
    let written = archive_sales(&reconciler, &chain_dir, deployment.deployment_block).await?;
    tracing::info!(chain_id, new_sales = written, "archive updated");
    Ok(())
}

/// Append every sale since the last run to `<chain_dir>/sales.parquet`.
///
/// Resumes from whichever is furthest: the deployment block, the cursor, or
/// the highest block already in the archive. Returns the number of new sales.
///
/// Nothing is written and the cursor stays put unless every log batch,
/// transaction and block read of the run succeeded, so a failed run is
/// retried in full by the next one.
///
/// # Errors
///
/// Returns an error if the chain tip, a log batch, a transaction or a block
/// cannot be read, or if the archive or cursor cannot be written.
pub async fn archive_sales<S: MarketSource>(
    reconciler: &Reconciler<S>,
    chain_dir: &Path,
    deployment_block: u64,
) -> Result<usize> {
    std::fs::create_dir_all(chain_dir)
        .with_context(|| format!("creating {}", chain_dir.display()))?;
    let path = chain_dir.join("sales.parquet");
    let mut batches = parquet::read(&path)?;

    let tip = reconciler
        .source()
        .latest_block()
        .await
        .context("reading chain tip")?;
    let start = [
        Some(deployment_block),
        Cursor::load(chain_dir)?.map(|c| c.next_block()),
        parquet::max_block_number(&batches).map(|b| b + 1),
    ]
    .into_iter()
    .flatten()
    .max()
    .unwrap_or(deployment_block);

    if start > tip.number {
        tracing::info!(latest = tip.number, "already up to date");
        return Ok(0);
    }

    tracing::info!(from = start, to = tip.number, blocks = tip.number - start + 1, "archiving");

    let mut events = Vec::new();
    for event in SALE_EVENTS {
        let logs = reconciler
            .fetcher()
            .fetch_range(reconciler.source(), event, None, start, tip.number)
            .await
            .with_context(|| format!("fetching {event} logs"))?;
        events.extend(logs);
    }
    let events = aggregate::events(events);

    let mut sales = reconciler
        .try_resolve_sales(&events)
        .await
        .context("resolving sales")?;
    let skipped = events.len().saturating_sub(sales.len());
    if skipped > 0 {
        tracing::debug!(skipped, "events without a sale or a decodable name");
    }

    if !sales.is_empty() {
        sales.sort_by_key(|s| (s.block_number, s.tx_hash));
        batches.push(parquet::sales_to_batch(&sales)?);
        parquet::write(&path, &batches)?;

        let total: usize = batches.iter().map(RecordBatch::num_rows).sum();
        tracing::info!(new_sales = sales.len(), total_sales = total, "written");
    }

    Cursor::now(tip.number, tip.timestamp).save(chain_dir)?;
    tracing::info!(last_block = tip.number, "cursor updated");
    Ok(sales.len())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::time::Duration;

    use alloy::primitives::{Address, Bytes, TxHash, U256, keccak256};
    use alloy::sol_types::SolCall;
    use shmdomains::contracts::DomainMarketplace;
    use shmdomains::{
        AuctionState, BlockStamp, EventKind, EventLocation, EventQuery, FetchOptions, MarketError,
        MarketEvent, OfferState, SaleKind, SaleRecord,
    };

    use super::*;

    /// A chain whose only marketplace activity is fixed-price sales.
    #[derive(Debug, Default)]
    struct SalesChain {
        tip: u64,
        sales: Vec<MarketEvent>,
        inputs: HashMap<TxHash, Bytes>,
        missing_blocks: Vec<u64>,
        queried_from: Mutex<Vec<u64>>,
    }

    impl SalesChain {
        fn at(tip: u64) -> Self {
            Self {
                tip,
                ..Self::default()
            }
        }

        fn sell(&mut self, name: &str, block: u64) {
            let tx_hash = keccak256(format!("{name}:{block}"));
            let call = DomainMarketplace::buyDomainCall {
                name: name.to_owned(),
            };
            self.inputs.insert(tx_hash, call.abi_encode().into());
            self.sales.push(MarketEvent {
                name_hash: keccak256(name),
                location: EventLocation {
                    block_number: block,
                    log_index: 0,
                    tx_hash,
                },
                kind: EventKind::DomainSold {
                    seller: Address::repeat_byte(1),
                    buyer: Address::repeat_byte(2),
                    price: U256::from(block),
                },
            });
        }

        fn first_queried(&self) -> Option<u64> {
            self.queried_from.lock().unwrap().iter().copied().min()
        }
    }

    impl MarketSource for SalesChain {
        async fn latest_block(&self) -> shmdomains::Result<BlockStamp> {
            Ok(BlockStamp {
                number: self.tip,
                timestamp: self.tip * 10,
            })
        }

        async fn block_timestamp(&self, number: u64) -> shmdomains::Result<u64> {
            if self.missing_blocks.contains(&number) {
                return Err(MarketError::BlockNotFound(number));
            }
            Ok(number * 10)
        }

        async fn events(&self, query: &EventQuery) -> shmdomains::Result<Vec<MarketEvent>> {
            self.queried_from.lock().unwrap().push(query.from_block);
            Ok(self
                .sales
                .iter()
                .filter(|e| e.kind.name() == query.event)
                .filter(|e| (query.from_block..=query.to_block).contains(&e.location.block_number))
                .cloned()
                .collect())
        }

        async fn transaction_input(&self, tx_hash: TxHash) -> shmdomains::Result<Bytes> {
            self.inputs
                .get(&tx_hash)
                .cloned()
                .ok_or(MarketError::TransactionNotFound(tx_hash))
        }

        async fn auction(&self, _name: &str) -> shmdomains::Result<AuctionState> {
            Ok(AuctionState::default())
        }

        async fn offer(&self, _name: &str, _buyer: Address) -> shmdomains::Result<OfferState> {
            Ok(OfferState::default())
        }
    }

    fn reconciler(chain: SalesChain) -> Reconciler<SalesChain> {
        Reconciler::new(chain).with_fetcher(EventFetcher::new(FetchOptions {
            inter_batch_delay: Duration::ZERO,
            retry_delay: Duration::ZERO,
            ..FetchOptions::default()
        }))
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("shmdomains-archive-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    fn archived_rows(dir: &Path) -> usize {
        parquet::read(&dir.join("sales.parquet"))
            .unwrap()
            .iter()
            .map(RecordBatch::num_rows)
            .sum()
    }

    #[tokio::test]
    async fn first_run_then_resume_from_cursor() {
        let dir = scratch_dir("cursor");

        let mut chain = SalesChain::at(200);
        chain.sell("early", 50);
        chain.sell("alice", 150);
        let first = reconciler(chain);
        assert_eq!(archive_sales(&first, &dir, 100).await.unwrap(), 1, "after deployment only");
        assert_eq!(first.source().first_queried(), Some(100), "starts at deployment");
        assert_eq!(Cursor::load(&dir).unwrap().map(|c| c.last_block), Some(200), "cursor at tip");

        let mut chain = SalesChain::at(300);
        chain.sell("alice", 150);
        chain.sell("bob", 250);
        let second = reconciler(chain);
        assert_eq!(archive_sales(&second, &dir, 100).await.unwrap(), 1, "only the new sale");
        assert_eq!(second.source().first_queried(), Some(201), "resumes after cursor");
        assert_eq!(archived_rows(&dir), 2, "appended");
        assert_eq!(Cursor::load(&dir).unwrap().map(|c| c.last_block), Some(300), "cursor moved");

        assert_eq!(archive_sales(&second, &dir, 100).await.unwrap(), 0, "up to date");

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn resumes_from_archive_without_cursor() {
        let dir = scratch_dir("parquet");
        let existing = SaleRecord {
            domain: "old".into(),
            price: U256::from(1),
            seller: Address::repeat_byte(1),
            buyer: Address::repeat_byte(2),
            timestamp: 4_000,
            kind: SaleKind::Sale,
            tx_hash: TxHash::repeat_byte(9),
            block_number: 400,
        };
        let batch = parquet::sales_to_batch(&[existing]).unwrap();
        parquet::write(&dir.join("sales.parquet"), &[batch]).unwrap();

        let mut chain = SalesChain::at(500);
        chain.sell("before", 300);
        chain.sell("after", 450);
        let reconciler = reconciler(chain);

        assert_eq!(archive_sales(&reconciler, &dir, 0).await.unwrap(), 1, "one new sale");
        assert_eq!(reconciler.source().first_queried(), Some(401), "resumes after archive");
        assert_eq!(archived_rows(&dir), 2, "appended");

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn failed_reads_keep_the_cursor() {
        let dir = scratch_dir("failed");
        let mut chain = SalesChain::at(100);
        chain.sell("alice", 50);
        chain.missing_blocks.push(50);

        let result = archive_sales(&reconciler(chain), &dir, 0).await;

        assert!(result.is_err(), "block read failure surfaces");
        assert_eq!(Cursor::load(&dir).unwrap(), None, "cursor not advanced");
        assert_eq!(archived_rows(&dir), 0, "nothing written");

        let mut chain = SalesChain::at(100);
        chain.sell("alice", 50);
        let retry = archive_sales(&reconciler(chain), &dir, 0).await.unwrap();
        assert_eq!(retry, 1, "next run archives the sale");

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
