//! Event log retrieval over a widening ladder of block ranges.
//!
//! No indexer is available, so logs are pulled straight from the node. Recent
//! activity is far more likely to matter than old activity, so the cheapest
//! range is tried first:
//! 1. Resolve each [`RangeStrategy`] of the ladder against the chain tip.
//! 2. Query the range in adaptive `eth_getLogs` batches.
//! 3. Stop at the first range that yields events; a failed range is logged
//!    and the next, wider one is tried.
//!
//! An exhausted ladder yields an empty list. Callers must read empty as
//! "nothing found", never as "the query failed".

use std::time::Duration;

use alloy::primitives::B256;

use crate::error::{Result, with_timeout};
use crate::source::{EventQuery, MarketSource};
use crate::types::{EventName, MarketEvent};

/// One step of the range ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeStrategy {
    /// The last `blocks` blocks up to the chain tip.
    Recent {
        /// Width of the window.
        blocks: u64,
    },
    /// Everything from the starting block to the chain tip.
    FullHistory,
}

impl RangeStrategy {
    /// Inclusive `(from, to)` block range for this step.
    ///
    /// `from > to` means the step covers nothing.
    #[must_use]
    pub const fn resolve(self, start: u64, latest: u64) -> (u64, u64) {
        match self {
            Self::Recent { blocks } => {
                let from = latest.saturating_sub(blocks.saturating_sub(1));
                (if from > start { from } else { start }, latest)
            }
            Self::FullHistory => (start, latest),
        }
    }
}

/// Default ladder: last 5 000 blocks, last 50 000 blocks, full history.
pub const DEFAULT_LADDER: &[RangeStrategy] = &[
    RangeStrategy::Recent { blocks: 5_000 },
    RangeStrategy::Recent { blocks: 50_000 },
    RangeStrategy::FullHistory,
];

/// Tuning knobs for [`EventFetcher`].
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Ranges tried in order until one yields events.
    pub ladder: Vec<RangeStrategy>,
    /// Initial (and maximum) `eth_getLogs` batch size in blocks.
    pub batch_size: u64,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Pause between consecutive batches.
    pub inter_batch_delay: Duration,
    /// Pause after a failed batch before retrying smaller.
    pub retry_delay: Duration,
    /// Consecutive batch failures before a range is abandoned.
    pub max_consecutive_errors: u32,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            ladder: DEFAULT_LADDER.to_vec(),
            batch_size: Batcher::DEFAULT,
            request_timeout: Duration::from_secs(30),
            inter_batch_delay: Duration::from_millis(100),
            retry_delay: Duration::from_secs(2),
            max_consecutive_errors: 10,
        }
    }
}

/// Tracks `eth_getLogs` batch size with an adaptive ceiling.
///
/// On success the size doubles toward the ceiling; on error the ceiling
/// is permanently lowered so the RPC's actual limit is learned once.
#[derive(Debug)]
struct Batcher {
    size: u64,
    ceiling: u64,
}

impl Batcher {
    const DEFAULT: u64 = 5_000;
    const MIN: u64 = 10;

    fn new(size: u64) -> Self {
        let size = size.max(Self::MIN);
        Self {
            size,
            ceiling: size,
        }
    }

    /// Grow toward the learned ceiling after a successful request.
    fn grow(&mut self) {
        self.size = (self.size.saturating_mul(2)).min(self.ceiling);
    }

    /// Shrink and lower the ceiling after a failed request.
    /// Returns `false` when already at the minimum (caller should give up).
    fn shrink(&mut self) -> bool {
        if self.size <= Self::MIN {
            return false;
        }
        self.ceiling = (self.size / 2).max(Self::MIN);
        self.size = self.ceiling;
        true
    }
}

/// Progress is logged every N batches.
const PROGRESS_INTERVAL: u64 = 50;

/// Ranged log retrieval against a [`MarketSource`].
#[derive(Debug, Clone, Default)]
pub struct EventFetcher {
    options: FetchOptions,
}

impl EventFetcher {
    /// Create a fetcher with explicit options.
    #[must_use]
    pub const fn new(options: FetchOptions) -> Self {
        Self { options }
    }

    /// The options this fetcher runs with.
    #[must_use]
    pub const fn options(&self) -> &FetchOptions {
        &self.options
    }

    /// Walk the ladder until a range yields `event` logs.
    ///
    /// `start` is the lowest block worth searching (usually the contract
    /// deployment block); `latest` is the chain tip of the current pass.
    /// Never fails: an exhausted ladder returns an empty list.
    pub async fn fetch<S: MarketSource>(
        &self,
        source: &S,
        event: EventName,
        name_hash: Option<B256>,
        start: Option<u64>,
        latest: u64,
    ) -> Vec<MarketEvent> {
        self.fetch_window(source, event, name_hash, start, latest)
            .await
            .map(|(_, events)| events)
            .unwrap_or_default()
    }

    /// Like [`Self::fetch`], but also returns the inclusive `(from, to)`
    /// range the events were found in.
    ///
    /// Events that can only follow the returned ones (an `AuctionEnded`
    /// after its `AuctionCreated`) must be fetched over that same range with
    /// [`Self::fetch_range`]; their own ladder may settle on a narrower one.
    pub async fn fetch_window<S: MarketSource>(
        &self,
        source: &S,
        event: EventName,
        name_hash: Option<B256>,
        start: Option<u64>,
        latest: u64,
    ) -> Option<((u64, u64), Vec<MarketEvent>)> {
        let start = start.unwrap_or_default();
        let mut covered: Option<(u64, u64)> = None;

        for (step, strategy) in self.options.ladder.iter().enumerate() {
            let (from, to) = strategy.resolve(start, latest);
            if from > to {
                continue;
            }
            if covered.is_some_and(|(lo, hi)| lo <= from && to <= hi) {
                tracing::debug!(%event, step, from, to, "range already searched");
                continue;
            }

            match self.fetch_range(source, event, name_hash, from, to).await {
                Ok(events) if !events.is_empty() => {
                    tracing::debug!(%event, step, from, to, found = events.len(), "events found");
                    return Some(((from, to), events));
                }
                Ok(_) => {
                    tracing::debug!(%event, step, from, to, "no events, widening");
                    covered = Some((from, to));
                }
                Err(e) => {
                    tracing::warn!(%event, step, from, to, error = %e, "range query failed, widening");
                }
            }
        }

        tracing::debug!(%event, "range ladder exhausted");
        None
    }

    /// Fetch every `event` log in `[from, to]` using adaptive batches.
    ///
    /// # Errors
    ///
    /// Returns the last RPC error once the batch size cannot shrink any
    /// further or after too many consecutive failures.
    pub async fn fetch_range<S: MarketSource>(
        &self,
        source: &S,
        event: EventName,
        name_hash: Option<B256>,
        from: u64,
        to: u64,
    ) -> Result<Vec<MarketEvent>> {
        let mut events = Vec::new();
        let mut block = from;
        let mut batch = Batcher::new(self.options.batch_size);
        let mut count = 0u64;
        let mut errors = 0u32;

        while block <= to {
            let end = block.saturating_add(batch.size - 1).min(to);
            let query = EventQuery {
                event,
                from_block: block,
                to_block: end,
                name_hash,
            };

            match with_timeout(self.options.request_timeout, source.events(&query)).await {
                Ok(new) => {
                    errors = 0;
                    events.extend(new);
                    batch.grow();
                    count += 1;
                    if count.is_multiple_of(PROGRESS_INTERVAL) {
                        tracing::info!(%event, batch = count, block = end, to, "fetching");
                    }
                    if end == to {
                        break;
                    }
                    block = end + 1;
                    tokio::time::sleep(self.options.inter_batch_delay).await;
                }
                Err(e) => {
                    errors += 1;
                    if errors >= self.options.max_consecutive_errors || !batch.shrink() {
                        return Err(e);
                    }
                    tracing::warn!(%event, block, batch_size = batch.size, error = %e, "retrying");
                    tokio::time::sleep(self.options.retry_delay).await;
                }
            }
        }

        Ok(events)
    }
}
