//! The chain access seam used by the fetcher and the reconciler.
//!
//! [`MarketSource`] is the only way reconciliation code touches the chain.
//! [`crate::DomainMarket`] implements it over JSON-RPC; tests use an
//! in-memory implementation.

use alloy::primitives::{Address, B256, Bytes, TxHash};
use alloy::rpc::types::Log;
use alloy::sol_types::SolEvent;

use crate::contracts::DomainMarketplace;
use crate::error::{MarketError, Result};
use crate::types::{
    AuctionState, BlockStamp, EventKind, EventLocation, EventName, MarketEvent, OfferState,
};

/// A single `eth_getLogs` query against the marketplace contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventQuery {
    /// Which event to match (topic 0).
    pub event: EventName,
    /// First block, inclusive.
    pub from_block: u64,
    /// Last block, inclusive.
    pub to_block: u64,
    /// Restrict to one domain (topic 1).
    pub name_hash: Option<B256>,
}

/// Read access to the marketplace contract and the chain it lives on.
pub trait MarketSource: Send + Sync {
    /// Number and timestamp of the latest block.
    fn latest_block(&self) -> impl Future<Output = Result<BlockStamp>> + Send;

    /// Timestamp of a given block in Unix seconds.
    fn block_timestamp(&self, number: u64) -> impl Future<Output = Result<u64>> + Send;

    /// Decoded marketplace logs matching `query`, in chain order.
    fn events(&self, query: &EventQuery) -> impl Future<Output = Result<Vec<MarketEvent>>> + Send;

    /// Call data of a mined transaction.
    fn transaction_input(&self, tx_hash: TxHash) -> impl Future<Output = Result<Bytes>> + Send;

    /// Authoritative `auctions(name)` read.
    fn auction(&self, name: &str) -> impl Future<Output = Result<AuctionState>> + Send;

    /// Authoritative `offers(name, buyer)` read.
    fn offer(&self, name: &str, buyer: Address)
    -> impl Future<Output = Result<OfferState>> + Send;
}

/// Decode an RPC log into a [`MarketEvent`].
///
/// Returns `Ok(None)` for logs that carry no position (pending) or were
/// removed by a re-org.
///
/// # Errors
///
/// Returns an error if the log does not match any marketplace event.
pub fn decode_log(log: &Log) -> Result<Option<MarketEvent>> {
    let (Some(block_number), Some(log_index), Some(tx_hash)) =
        (log.block_number, log.log_index, log.transaction_hash)
    else {
        return Ok(None);
    };
    if log.removed {
        return Ok(None);
    }
    let location = EventLocation {
        block_number,
        log_index,
        tx_hash,
    };

    let topic0 = log.inner.data.topics().first().copied().unwrap_or_default();
    let event = EventName::from_signature_hash(topic0).ok_or(MarketError::UnknownEvent(topic0))?;
    let (name_hash, kind) = match event {
        EventName::AuctionCreated => {
            let ev = DomainMarketplace::AuctionCreated::decode_log(&log.inner)?.data;
            let kind = EventKind::AuctionCreated {
                seller: ev.seller,
                start_price: ev.startPrice,
                end_time: ev.endTime.saturating_to(),
            };
            (ev.domainName, kind)
        }
        EventName::BidPlaced => {
            let ev = DomainMarketplace::BidPlaced::decode_log(&log.inner)?.data;
            let kind = EventKind::BidPlaced {
                bidder: ev.bidder,
                amount: ev.amount,
            };
            (ev.domainName, kind)
        }
        EventName::AuctionEnded => {
            let ev = DomainMarketplace::AuctionEnded::decode_log(&log.inner)?.data;
            let kind = EventKind::AuctionEnded {
                winner: ev.winner,
                seller: ev.seller,
                amount: ev.amount,
            };
            (ev.domainName, kind)
        }
        EventName::OfferMade => {
            let ev = DomainMarketplace::OfferMade::decode_log(&log.inner)?.data;
            let kind = EventKind::OfferMade {
                buyer: ev.buyer,
                amount: ev.amount,
                expiry: ev.expiry.saturating_to(),
            };
            (ev.domainName, kind)
        }
        EventName::OfferAccepted => {
            let ev = DomainMarketplace::OfferAccepted::decode_log(&log.inner)?.data;
            let kind = EventKind::OfferAccepted {
                buyer: ev.buyer,
                seller: ev.seller,
                amount: ev.amount,
            };
            (ev.domainName, kind)
        }
        EventName::OfferCancelled => {
            let ev = DomainMarketplace::OfferCancelled::decode_log(&log.inner)?.data;
            (ev.domainName, EventKind::OfferCancelled { buyer: ev.buyer })
        }
        EventName::DomainSold => {
            let ev = DomainMarketplace::DomainSold::decode_log(&log.inner)?.data;
            let kind = EventKind::DomainSold {
                seller: ev.seller,
                buyer: ev.buyer,
                price: ev.price,
            };
            (ev.domainName, kind)
        }
    };

    Ok(Some(MarketEvent {
        name_hash,
        location,
        kind,
    }))
}

#[cfg(test)]
mod tests {
    use alloy::primitives::{U256, address, keccak256};

    use super::*;

    fn rpc_log(data: alloy::primitives::LogData, removed: bool) -> Log {
        Log {
            inner: alloy::primitives::Log {
                address: Address::ZERO,
                data,
            },
            block_hash: None,
            block_number: Some(100),
            block_timestamp: None,
            transaction_hash: Some(TxHash::repeat_byte(0xab)),
            transaction_index: Some(0),
            log_index: Some(3),
            removed,
        }
    }

    #[test]
    fn decodes_auction_created() {
        let seller = address!("00000000000000000000000000000000000000aa");
        let event = DomainMarketplace::AuctionCreated {
            domainName: keccak256("test"),
            seller,
            startPrice: U256::from(10),
            endTime: U256::from(4_600),
        };
        let decoded = decode_log(&rpc_log(event.encode_log_data(), false))
            .unwrap()
            .unwrap();

        assert_eq!(decoded.name_hash, keccak256("test"), "indexed name hash");
        assert_eq!(decoded.location.block_number, 100, "block");
        assert_eq!(decoded.location.log_index, 3, "log index");
        assert_eq!(
            decoded.kind,
            EventKind::AuctionCreated {
                seller,
                start_price: U256::from(10),
                end_time: 4_600,
            },
            "payload"
        );
    }

    #[test]
    fn removed_logs_are_dropped() {
        let event = DomainMarketplace::OfferCancelled {
            domainName: keccak256("alice"),
            buyer: Address::ZERO,
        };
        assert_eq!(
            decode_log(&rpc_log(event.encode_log_data(), true)).unwrap(),
            None,
            "re-orged log"
        );
    }

    #[test]
    fn foreign_logs_are_errors() {
        let data = alloy::primitives::LogData::new_unchecked(vec![B256::repeat_byte(1)], Bytes::new());
        assert!(decode_log(&rpc_log(data, false)).is_err(), "unknown topic");
    }
}
