//! De-duplication and ordering of reconciled records for display.

use std::collections::{BTreeMap, btree_map::Entry};

use alloy::primitives::Address;

use crate::types::{AuctionRecord, BidRecord, EventLocation, MarketEvent, OfferRecord, SaleRecord};

/// Unique events by `(tx_hash, log_index)`, in chain order.
///
/// Overlapping range queries can return the same log more than once.
#[must_use]
pub fn events(events: impl IntoIterator<Item = MarketEvent>) -> Vec<MarketEvent> {
    let unique: BTreeMap<EventLocation, MarketEvent> = events
        .into_iter()
        .map(|event| (event.location, event))
        .collect();
    unique.into_values().collect()
}

/// Unique auctions by domain name, soonest end first.
#[must_use]
pub fn auctions(records: impl IntoIterator<Item = AuctionRecord>) -> Vec<AuctionRecord> {
    let mut unique: BTreeMap<String, AuctionRecord> = BTreeMap::new();
    for record in records {
        unique.entry(record.domain_name.clone()).or_insert(record);
    }
    let mut out: Vec<_> = unique.into_values().collect();
    out.sort_by(|a, b| {
        a.end_time
            .cmp(&b.end_time)
            .then_with(|| a.domain_name.cmp(&b.domain_name))
    });
    out
}

/// Unique offers by buyer (highest amount wins), highest amount first.
#[must_use]
pub fn offers(records: impl IntoIterator<Item = OfferRecord>) -> Vec<OfferRecord> {
    let mut unique: BTreeMap<Address, OfferRecord> = BTreeMap::new();
    for record in records {
        match unique.entry(record.buyer) {
            Entry::Vacant(slot) => {
                slot.insert(record);
            }
            Entry::Occupied(mut slot) if slot.get().amount < record.amount => {
                slot.insert(record);
            }
            Entry::Occupied(_) => {}
        }
    }
    let mut out: Vec<_> = unique.into_values().collect();
    out.sort_by(|a, b| b.amount.cmp(&a.amount).then_with(|| a.buyer.cmp(&b.buyer)));
    out
}

/// Unique bids by log location, highest amount first.
#[must_use]
pub fn bids(records: impl IntoIterator<Item = BidRecord>) -> Vec<BidRecord> {
    let unique: BTreeMap<EventLocation, BidRecord> = records
        .into_iter()
        .map(|record| (record.location, record))
        .collect();
    let mut out: Vec<_> = unique.into_values().collect();
    out.sort_by(|a, b| b.amount.cmp(&a.amount).then_with(|| a.location.cmp(&b.location)));
    out
}

/// Unique sales by `(tx_hash, domain, kind)`, newest first.
#[must_use]
pub fn sales(records: impl IntoIterator<Item = SaleRecord>) -> Vec<SaleRecord> {
    let mut unique = BTreeMap::new();
    for record in records {
        unique
            .entry((record.tx_hash, record.domain.clone(), record.kind))
            .or_insert(record);
    }
    let mut out: Vec<_> = unique.into_values().collect();
    out.sort_by(|a, b| {
        b.block_number
            .cmp(&a.block_number)
            .then_with(|| b.timestamp.cmp(&a.timestamp))
            .then_with(|| a.domain.cmp(&b.domain))
    });
    out
}
