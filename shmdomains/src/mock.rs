//! In-memory [`MarketSource`] for unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::{Address, Bytes, TxHash, U256, keccak256};
use alloy::sol_types::SolCall;

use crate::contracts::DomainMarketplace;
use crate::error::{MarketError, Result};
use crate::fetcher::FetchOptions;
use crate::source::{EventQuery, MarketSource};
use crate::types::{AuctionState, BlockStamp, EventKind, EventLocation, MarketEvent, OfferState};

/// Fetch options without delays, one query per range.
pub(crate) fn quick_options() -> FetchOptions {
    FetchOptions {
        batch_size: 1_000_000,
        request_timeout: Duration::from_secs(1),
        inter_batch_delay: Duration::ZERO,
        retry_delay: Duration::ZERO,
        ..FetchOptions::default()
    }
}

/// Call data that would have emitted `kind` for `name`.
pub(crate) fn call_for(name: &str, kind: &EventKind) -> Vec<u8> {
    let name = name.to_owned();
    match kind {
        EventKind::AuctionCreated { start_price, .. } => DomainMarketplace::createAuctionCall {
            name,
            startPrice: *start_price,
            duration: U256::from(3_600),
        }
        .abi_encode(),
        EventKind::BidPlaced { .. } => DomainMarketplace::placeBidCall { name }.abi_encode(),
        EventKind::AuctionEnded { .. } => DomainMarketplace::endAuctionCall { name }.abi_encode(),
        EventKind::OfferMade { .. } => DomainMarketplace::makeOfferCall {
            name,
            duration: U256::from(86_400),
        }
        .abi_encode(),
        EventKind::OfferAccepted { buyer, .. } => DomainMarketplace::acceptOfferCall {
            name,
            buyer: *buyer,
        }
        .abi_encode(),
        EventKind::OfferCancelled { .. } => DomainMarketplace::cancelOfferCall { name }.abi_encode(),
        EventKind::DomainSold { .. } => DomainMarketplace::buyDomainCall { name }.abi_encode(),
    }
}

#[derive(Debug, Default)]
pub(crate) struct MockSource {
    pub latest: BlockStamp,
    pub events: Vec<MarketEvent>,
    pub inputs: HashMap<TxHash, Bytes>,
    pub block_times: HashMap<u64, u64>,
    pub auctions: HashMap<String, AuctionState>,
    pub offers: HashMap<(String, Address), OfferState>,
    /// Every log is returned twice, as overlapping RPC pages would.
    pub duplicate_logs: bool,
    /// Each query also returns logs this many blocks before its range, as
    /// a node with overlapping pages would.
    pub overlap: u64,
    queries: Arc<Mutex<Vec<EventQuery>>>,
    failures: Arc<Mutex<usize>>,
    reads: Arc<Mutex<Vec<String>>>,
}

impl MockSource {
    pub(crate) fn at(number: u64, timestamp: u64) -> Self {
        Self {
            latest: BlockStamp { number, timestamp },
            ..Self::default()
        }
    }

    /// Record a log for `name` at `block`, with the triggering call data
    /// derived from the event unless `input` overrides it.
    pub(crate) fn log(
        &mut self,
        name: &str,
        block: u64,
        kind: EventKind,
        input: Option<Vec<u8>>,
    ) -> TxHash {
        let log_index = self.events.len() as u64;
        let tx_hash = keccak256(format!("{name}:{block}:{log_index}"));
        let input = input.unwrap_or_else(|| call_for(name, &kind));
        self.inputs.insert(tx_hash, input.into());
        self.block_times.entry(block).or_insert(block * 10);
        self.events.push(MarketEvent {
            name_hash: keccak256(name),
            location: EventLocation {
                block_number: block,
                log_index,
                tx_hash,
            },
            kind,
        });
        tx_hash
    }

    pub(crate) fn set_auction(&mut self, name: &str, state: AuctionState) {
        self.auctions.insert(name.to_owned(), state);
    }

    pub(crate) fn set_offer(&mut self, name: &str, buyer: Address, state: OfferState) {
        self.offers.insert((name.to_owned(), buyer), state);
    }

    pub(crate) fn fail_next_queries(&self, count: usize) {
        *self.failures.lock().unwrap() = count;
    }

    pub(crate) fn queries(&self) -> Vec<EventQuery> {
        self.queries.lock().unwrap().clone()
    }

    /// Names passed to `auction` reads, in call order.
    pub(crate) fn auction_reads(&self) -> Vec<String> {
        self.reads.lock().unwrap().clone()
    }
}

impl MarketSource for MockSource {
    async fn latest_block(&self) -> Result<BlockStamp> {
        Ok(self.latest)
    }

    async fn block_timestamp(&self, number: u64) -> Result<u64> {
        self.block_times
            .get(&number)
            .copied()
            .ok_or(MarketError::BlockNotFound(number))
    }

    async fn events(&self, query: &EventQuery) -> Result<Vec<MarketEvent>> {
        self.queries.lock().unwrap().push(*query);
        {
            let mut failures = self.failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(MarketError::Timeout(Duration::ZERO));
            }
        }

        let copies = if self.duplicate_logs { 2 } else { 1 };
        Ok(self
            .events
            .iter()
            .filter(|e| e.kind.name() == query.event)
            .filter(|e| {
                let from = query.from_block.saturating_sub(self.overlap);
                (from..=query.to_block).contains(&e.location.block_number)
            })
            .filter(|e| query.name_hash.is_none_or(|h| h == e.name_hash))
            .flat_map(|e| std::iter::repeat_n(e.clone(), copies))
            .collect())
    }

    async fn transaction_input(&self, tx_hash: TxHash) -> Result<Bytes> {
        self.inputs
            .get(&tx_hash)
            .cloned()
            .ok_or(MarketError::TransactionNotFound(tx_hash))
    }

    async fn auction(&self, name: &str) -> Result<AuctionState> {
        self.reads.lock().unwrap().push(name.to_owned());
        self.auctions
            .get(name)
            .copied()
            .ok_or(MarketError::Timeout(Duration::ZERO))
    }

    async fn offer(&self, name: &str, buyer: Address) -> Result<OfferState> {
        Ok(self
            .offers
            .get(&(name.to_owned(), buyer))
            .copied()
            .unwrap_or_default())
    }
}
