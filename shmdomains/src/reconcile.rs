//! Reconstruction of live marketplace state from logs and contract reads.
//!
//! Logs only say what *happened*; they cannot express that an auction or
//! offer was later invalidated. Reconciliation therefore runs in two stages:
//!
//! 1. Set operations over logged events narrow the candidates (pure
//!    functions, see [`live_auction_hashes`] and [`open_offer_buyers`]).
//!    Closing events are fetched over the same block window the opening
//!    events were found in.
//! 2. Every candidate is re-read from the contract and kept only if the
//!    stored flag is set *and* its deadline lies after the latest block's
//!    timestamp. The flag alone is never trusted.
//!
//! Failures of individual candidates are logged and skipped.

use std::collections::{BTreeMap, BTreeSet, btree_map::Entry};
use std::time::Duration;

use alloy::primitives::{Address, B256, U256, keccak256};
use futures::stream::{self, StreamExt};

use crate::aggregate;
use crate::decoder::{recover_names, try_recover_names};
use crate::error::{Result, with_timeout};
use crate::fetcher::EventFetcher;
use crate::source::MarketSource;
use crate::types::{
    AuctionRecord, BidRecord, BlockStamp, EventKind, EventName, MarketEvent, OfferRecord,
    SaleKind, SaleRecord,
};

/// Names probed when no `AuctionCreated` log can be found at all.
pub const DEFAULT_PROBE_NAMES: &[&str] = &[
    "test", "alice", "bob", "shardeum", "shm", "crypto", "web3", "defi", "nft", "dao",
];

/// Upper bound on candidates re-read in one pass.
pub const DEFAULT_MAX_CANDIDATES: usize = 20;

/// Contract reads in flight at once.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Latest event per key.
pub fn latest_by<'a, K: Ord>(
    pairs: impl IntoIterator<Item = (K, &'a MarketEvent)>,
) -> BTreeMap<K, &'a MarketEvent> {
    let mut latest = BTreeMap::new();
    for (key, event) in pairs {
        match latest.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(event);
            }
            Entry::Occupied(mut slot) if slot.get().location < event.location => {
                slot.insert(event);
            }
            Entry::Occupied(_) => {}
        }
    }
    latest
}

/// Name hashes whose latest `AuctionCreated` is newer than any
/// `AuctionEnded`, mapped to that creation event.
#[must_use]
pub fn live_auction_hashes(events: &[MarketEvent]) -> BTreeMap<B256, &MarketEvent> {
    let created = latest_by(
        events
            .iter()
            .filter(|e| matches!(e.kind, EventKind::AuctionCreated { .. }))
            .map(|e| (e.name_hash, e)),
    );
    let ended = latest_by(
        events
            .iter()
            .filter(|e| matches!(e.kind, EventKind::AuctionEnded { .. }))
            .map(|e| (e.name_hash, e)),
    );

    created
        .into_iter()
        .filter(|(hash, made)| ended.get(hash).is_none_or(|end| end.location < made.location))
        .collect()
}

/// Buyers with an offer on `name_hash` that was not accepted or cancelled
/// afterwards, mapped to their latest `OfferMade` event.
///
/// This is the set difference made − (accepted ∪ cancelled) keyed by buyer,
/// where a newer offer re-opens a buyer that was previously closed.
#[must_use]
pub fn open_offer_buyers(events: &[MarketEvent], name_hash: B256) -> BTreeMap<Address, &MarketEvent> {
    let for_name = || events.iter().filter(move |e| e.name_hash == name_hash);
    let made = latest_by(for_name().filter_map(|e| match e.kind {
        EventKind::OfferMade { buyer, .. } => Some((buyer, e)),
        _ => None,
    }));
    let closed = latest_by(for_name().filter_map(|e| match e.kind {
        EventKind::OfferAccepted { buyer, .. } | EventKind::OfferCancelled { buyer } => {
            Some((buyer, e))
        }
        _ => None,
    }));

    made.into_iter()
        .filter(|(buyer, offer)| closed.get(buyer).is_none_or(|c| c.location < offer.location))
        .collect()
}

/// `(kind, seller, buyer, price)` if the event transferred a domain.
fn sale_terms(kind: &EventKind) -> Option<(SaleKind, Address, Address, U256)> {
    match *kind {
        EventKind::DomainSold {
            seller,
            buyer,
            price,
        } => Some((SaleKind::Sale, seller, buyer, price)),
        EventKind::AuctionEnded {
            winner,
            seller,
            amount,
        } if !winner.is_zero() => Some((SaleKind::Auction, seller, winner, amount)),
        EventKind::OfferAccepted {
            buyer,
            seller,
            amount,
        } => Some((SaleKind::Offer, seller, buyer, amount)),
        _ => None,
    }
}

/// Tuning for a [`Reconciler`].
#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    /// Lowest block worth searching, usually the contract deployment block.
    pub start_block: Option<u64>,
    /// Names probed when no auction logs are found.
    pub probe_names: Vec<String>,
    /// Upper bound on candidates re-read per pass.
    pub max_candidates: usize,
    /// Contract reads in flight at once.
    pub concurrency: usize,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            start_block: None,
            probe_names: DEFAULT_PROBE_NAMES.iter().map(|&n| n.to_owned()).collect(),
            max_candidates: DEFAULT_MAX_CANDIDATES,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

/// Rebuilds marketplace views from a [`MarketSource`].
///
/// Each call is an independent read pass pinned to the chain tip observed
/// at its start; nothing is cached between passes.
#[derive(Debug)]
pub struct Reconciler<S> {
    source: S,
    fetcher: EventFetcher,
    options: ReconcileOptions,
}

impl<S: MarketSource> Reconciler<S> {
    /// Reconciler with default fetch and reconcile options.
    #[must_use]
    pub fn new(source: S) -> Self {
        Self {
            source,
            fetcher: EventFetcher::default(),
            options: ReconcileOptions::default(),
        }
    }

    /// Replace the event fetcher.
    #[must_use]
    pub fn with_fetcher(mut self, fetcher: EventFetcher) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Replace the reconcile options.
    #[must_use]
    pub fn with_options(mut self, options: ReconcileOptions) -> Self {
        self.options = options;
        self
    }

    /// The underlying source.
    #[must_use]
    pub const fn source(&self) -> &S {
        &self.source
    }

    /// The event fetcher in use.
    #[must_use]
    pub const fn fetcher(&self) -> &EventFetcher {
        &self.fetcher
    }

    fn timeout(&self) -> Duration {
        self.fetcher.options().request_timeout
    }

    fn concurrency(&self) -> usize {
        self.options.concurrency.max(1)
    }

    /// Latest block, the reference point of a read pass.
    ///
    /// # Errors
    ///
    /// Returns an error if the block cannot be read in time.
    pub async fn latest_block(&self) -> Result<BlockStamp> {
        with_timeout(self.timeout(), self.source.latest_block()).await
    }

    async fn fetch(&self, event: EventName, name_hash: Option<B256>, latest: u64) -> Vec<MarketEvent> {
        self.fetcher
            .fetch(&self.source, event, name_hash, self.options.start_block, latest)
            .await
    }

    /// Closing `events` over exactly the window their opening events came
    /// from. `None` if any of them cannot be fetched: without them the set
    /// difference would keep closed candidates.
    async fn fetch_closing(
        &self,
        events: &[EventName],
        name_hash: Option<B256>,
        (from, to): (u64, u64),
    ) -> Option<Vec<MarketEvent>> {
        let mut closing = Vec::new();
        for &event in events {
            match self
                .fetcher
                .fetch_range(&self.source, event, name_hash, from, to)
                .await
            {
                Ok(found) => closing.extend(found),
                Err(e) => {
                    tracing::warn!(%event, from, to, error = %e, "closing events unavailable, skipping pass");
                    return None;
                }
            }
        }
        Some(closing)
    }

    /// Auctions that are live at the latest block, soonest end first.
    ///
    /// # Errors
    ///
    /// Returns an error only if the latest block cannot be read; log and
    /// per-domain failures shrink the result instead.
    pub async fn active_auctions(&self) -> Result<Vec<AuctionRecord>> {
        let now = self.latest_block().await?;
        Ok(self.active_auctions_at(now).await)
    }

    /// Auctions that are live at `now`, soonest end first.
    ///
    /// Logs are searched up to `now.number` and liveness is judged against
    /// `now.timestamp`.
    pub async fn active_auctions_at(&self, now: BlockStamp) -> Vec<AuctionRecord> {
        let found = self
            .fetcher
            .fetch_window(
                &self.source,
                EventName::AuctionCreated,
                None,
                self.options.start_block,
                now.number,
            )
            .await;

        let names: Vec<String> = match found {
            None => {
                tracing::info!(
                    probes = self.options.probe_names.len(),
                    "no auction logs found, probing known names"
                );
                self.options
                    .probe_names
                    .iter()
                    .take(self.options.max_candidates)
                    .cloned()
                    .collect()
            }
            Some((window, created)) => {
                let Some(ended) = self
                    .fetch_closing(&[EventName::AuctionEnded], None, window)
                    .await
                else {
                    return Vec::new();
                };
                let events = aggregate::events(created.into_iter().chain(ended));

                let mut live: Vec<&MarketEvent> = live_auction_hashes(&events).into_values().collect();
                live.sort_by(|a, b| b.location.cmp(&a.location));
                live.truncate(self.options.max_candidates);

                let picked: Vec<MarketEvent> = live.iter().map(|&e| e.clone()).collect();
                let recovered = recover_names(&self.source, &picked, self.concurrency(), self.timeout()).await;
                live.iter()
                    .filter_map(|e| recovered.get(&e.name_hash).cloned())
                    .collect()
            }
        };

        tracing::debug!(candidates = names.len(), block = now.number, "reading auctions");
        let timeout = self.timeout();
        let records = stream::iter(names)
            .map(|name| async move {
                match with_timeout(timeout, self.source.auction(&name)).await {
                    Ok(state) => Some(AuctionRecord::from_state(name, state)),
                    Err(e) => {
                        tracing::warn!(domain = %name, error = %e, "skipping auction");
                        None
                    }
                }
            })
            .buffer_unordered(self.concurrency())
            .collect::<Vec<_>>()
            .await;

        aggregate::auctions(
            records
                .into_iter()
                .flatten()
                .filter(|record| record.is_live(now.timestamp)),
        )
    }

    /// Live offers on `name`, highest amount first.
    ///
    /// # Errors
    ///
    /// Returns an error only if the latest block cannot be read.
    pub async fn active_offers(&self, name: &str) -> Result<Vec<OfferRecord>> {
        let now = self.latest_block().await?;
        Ok(self.active_offers_at(name, now).await)
    }

    /// Offers on `name` that are live at `now`, highest amount first.
    pub async fn active_offers_at(&self, name: &str, now: BlockStamp) -> Vec<OfferRecord> {
        let name_hash = keccak256(name.as_bytes());

        let Some((window, made)) = self
            .fetcher
            .fetch_window(
                &self.source,
                EventName::OfferMade,
                Some(name_hash),
                self.options.start_block,
                now.number,
            )
            .await
        else {
            return Vec::new();
        };
        let Some(closed) = self
            .fetch_closing(
                &[EventName::OfferAccepted, EventName::OfferCancelled],
                Some(name_hash),
                window,
            )
            .await
        else {
            return Vec::new();
        };
        let events = aggregate::events(made.into_iter().chain(closed));

        let buyers: BTreeSet<Address> = open_offer_buyers(&events, name_hash)
            .into_iter()
            .filter(|(_, made)| match made.kind {
                EventKind::OfferMade { expiry, .. } => expiry > now.timestamp,
                _ => false,
            })
            .map(|(buyer, _)| buyer)
            .collect();

        tracing::debug!(domain = name, candidates = buyers.len(), "reading offers");
        let timeout = self.timeout();
        let records = stream::iter(buyers)
            .map(|buyer| async move {
                match with_timeout(timeout, self.source.offer(name, buyer)).await {
                    Ok(state) => Some(OfferRecord::from_state(name, buyer, state)),
                    Err(e) => {
                        tracing::warn!(domain = name, %buyer, error = %e, "skipping offer");
                        None
                    }
                }
            })
            .buffer_unordered(self.concurrency())
            .collect::<Vec<_>>()
            .await;

        aggregate::offers(
            records
                .into_iter()
                .flatten()
                .filter(|record| record.is_live(now.timestamp)),
        )
    }

    /// Every logged bid on `name`, highest first.
    ///
    /// # Errors
    ///
    /// Returns an error only if the latest block cannot be read.
    pub async fn bid_history(&self, name: &str) -> Result<Vec<BidRecord>> {
        let now = self.latest_block().await?;
        let events = self
            .fetch(EventName::BidPlaced, Some(keccak256(name.as_bytes())), now.number)
            .await;

        Ok(aggregate::bids(events.into_iter().filter_map(|e| match e.kind {
            EventKind::BidPlaced { bidder, amount } => Some(BidRecord {
                domain_name: name.to_owned(),
                bidder,
                amount,
                location: e.location,
            }),
            _ => None,
        })))
    }

    /// Up to `limit` most recent sales of any kind, newest first.
    ///
    /// Sales whose name cannot be recovered do not count toward `limit`;
    /// older ones are resolved in their place.
    ///
    /// # Errors
    ///
    /// Returns an error only if the latest block cannot be read.
    pub async fn recent_sales(&self, limit: usize) -> Result<Vec<SaleRecord>> {
        let now = self.latest_block().await?;
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut events = Vec::new();
        for event in [
            EventName::DomainSold,
            EventName::AuctionEnded,
            EventName::OfferAccepted,
        ] {
            events.extend(self.fetch(event, None, now.number).await);
        }

        let mut events = sale_events(&aggregate::events(events));
        events.reverse();

        let mut sales = Vec::new();
        for page in events.chunks(limit) {
            sales.extend(self.resolve_sales(page).await);
            if sales.len() >= limit {
                break;
            }
        }

        let mut sales = aggregate::sales(sales);
        sales.truncate(limit);
        Ok(sales)
    }

    /// Timestamps of the blocks holding `events`, read concurrently.
    async fn block_times(&self, events: &[MarketEvent]) -> Vec<(u64, Result<u64>)> {
        let blocks: BTreeSet<u64> = events.iter().map(|e| e.location.block_number).collect();
        let timeout = self.timeout();
        stream::iter(blocks)
            .map(|number| async move {
                (
                    number,
                    with_timeout(timeout, self.source.block_timestamp(number)).await,
                )
            })
            .buffer_unordered(self.concurrency())
            .collect()
            .await
    }

    /// Turn sale-like events into [`SaleRecord`]s.
    ///
    /// Events whose name or block timestamp cannot be recovered are skipped;
    /// events that did not transfer a domain (for example an auction ended
    /// without bids) are ignored.
    pub async fn resolve_sales(&self, events: &[MarketEvent]) -> Vec<SaleRecord> {
        let events = sale_events(events);
        let names = recover_names(&self.source, &events, self.concurrency(), self.timeout()).await;
        let times: BTreeMap<u64, u64> = self
            .block_times(&events)
            .await
            .into_iter()
            .filter_map(|(number, timestamp)| match timestamp {
                Ok(timestamp) => Some((number, timestamp)),
                Err(e) => {
                    tracing::warn!(block = number, error = %e, "skipping block");
                    None
                }
            })
            .collect();

        build_sales(&events, &names, &times)
    }

    /// Strict [`Self::resolve_sales`] for callers that must not lose sales.
    ///
    /// Only events whose call data does not carry the logged name are
    /// skipped; any failed or timed-out read is returned as an error so the
    /// caller can retry the same blocks.
    ///
    /// # Errors
    ///
    /// Returns the first transaction or block read that fails.
    pub async fn try_resolve_sales(&self, events: &[MarketEvent]) -> Result<Vec<SaleRecord>> {
        let events = sale_events(events);
        let names = try_recover_names(&self.source, &events, self.concurrency(), self.timeout()).await?;
        let times = self
            .block_times(&events)
            .await
            .into_iter()
            .map(|(number, timestamp)| timestamp.map(|t| (number, t)))
            .collect::<Result<BTreeMap<u64, u64>>>()?;

        Ok(build_sales(&events, &names, &times))
    }
}

/// Events that transferred a domain.
fn sale_events(events: &[MarketEvent]) -> Vec<MarketEvent> {
    events
        .iter()
        .filter(|e| sale_terms(&e.kind).is_some())
        .cloned()
        .collect()
}

fn build_sales(
    events: &[MarketEvent],
    names: &BTreeMap<B256, String>,
    times: &BTreeMap<u64, u64>,
) -> Vec<SaleRecord> {
    aggregate::sales(events.iter().filter_map(|e| {
        let (kind, seller, buyer, price) = sale_terms(&e.kind)?;
        Some(SaleRecord {
            domain: names.get(&e.name_hash)?.clone(),
            price,
            seller,
            buyer,
            timestamp: *times.get(&e.location.block_number)?,
            kind,
            tx_hash: e.location.tx_hash,
            block_number: e.location.block_number,
        })
    }))
}
