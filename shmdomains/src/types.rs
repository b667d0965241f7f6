//! Core domain types for the marketplace reconciler.
//!
//! Two families live here: the *raw* values read from the chain (logged
//! [`MarketEvent`]s and the [`AuctionState`] / [`OfferState`] structs returned
//! by contract views) and the *reconciled* records surfaced to callers
//! ([`AuctionRecord`], [`OfferRecord`], [`BidRecord`], [`SaleRecord`]).

use std::time::Duration;

use alloy::primitives::{Address, B256, TxHash, U256};
use alloy::sol_types::SolEvent;
use serde::Serialize;

use crate::contracts::DomainMarketplace;

/// Number and timestamp of a block; the latest one is the reconciler's clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct BlockStamp {
    /// Block height.
    pub number: u64,
    /// Block timestamp in Unix seconds.
    pub timestamp: u64,
}

/// Position of a log in the chain.
///
/// The derived ordering is chronological: block first, then log index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventLocation {
    /// Block that included the log.
    pub block_number: u64,
    /// Index of the log within its block.
    pub log_index: u64,
    /// Transaction that emitted the log.
    pub tx_hash: TxHash,
}

/// Marketplace event names, used to build log queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventName {
    /// A domain was put up for auction.
    AuctionCreated,
    /// A bid was placed on an auction.
    BidPlaced,
    /// An auction was settled.
    AuctionEnded,
    /// A buyer offered to purchase a domain.
    OfferMade,
    /// The owner accepted an offer.
    OfferAccepted,
    /// The buyer withdrew an offer.
    OfferCancelled,
    /// A domain was bought at its fixed price.
    DomainSold,
}

impl EventName {
    /// Every marketplace event.
    pub const ALL: &[Self] = &[
        Self::AuctionCreated,
        Self::BidPlaced,
        Self::AuctionEnded,
        Self::OfferMade,
        Self::OfferAccepted,
        Self::OfferCancelled,
        Self::DomainSold,
    ];

    /// Look up an event by its topic-0 hash.
    #[must_use]
    pub fn from_signature_hash(topic0: B256) -> Option<Self> {
        Self::ALL
            .iter()
            .find(|e| e.signature_hash() == topic0)
            .copied()
    }

    /// Topic-0 hash identifying this event in logs.
    #[must_use]
    pub const fn signature_hash(self) -> B256 {
        match self {
            Self::AuctionCreated => DomainMarketplace::AuctionCreated::SIGNATURE_HASH,
            Self::BidPlaced => DomainMarketplace::BidPlaced::SIGNATURE_HASH,
            Self::AuctionEnded => DomainMarketplace::AuctionEnded::SIGNATURE_HASH,
            Self::OfferMade => DomainMarketplace::OfferMade::SIGNATURE_HASH,
            Self::OfferAccepted => DomainMarketplace::OfferAccepted::SIGNATURE_HASH,
            Self::OfferCancelled => DomainMarketplace::OfferCancelled::SIGNATURE_HASH,
            Self::DomainSold => DomainMarketplace::DomainSold::SIGNATURE_HASH,
        }
    }

    /// Solidity event name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AuctionCreated => "AuctionCreated",
            Self::BidPlaced => "BidPlaced",
            Self::AuctionEnded => "AuctionEnded",
            Self::OfferMade => "OfferMade",
            Self::OfferAccepted => "OfferAccepted",
            Self::OfferCancelled => "OfferCancelled",
            Self::DomainSold => "DomainSold",
        }
    }
}

impl std::fmt::Display for EventName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decoded non-indexed payload of a marketplace event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// See [`EventName::AuctionCreated`].
    AuctionCreated {
        /// Domain owner.
        seller: Address,
        /// Minimum opening bid in wei.
        start_price: U256,
        /// Auction end in Unix seconds.
        end_time: u64,
    },
    /// See [`EventName::BidPlaced`].
    BidPlaced {
        /// Bidder account.
        bidder: Address,
        /// Bid in wei.
        amount: U256,
    },
    /// See [`EventName::AuctionEnded`].
    AuctionEnded {
        /// Winning bidder, zero when the auction closed without bids.
        winner: Address,
        /// Domain owner at auction time.
        seller: Address,
        /// Winning bid in wei.
        amount: U256,
    },
    /// See [`EventName::OfferMade`].
    OfferMade {
        /// Offering account.
        buyer: Address,
        /// Escrowed amount in wei.
        amount: U256,
        /// Offer expiry in Unix seconds.
        expiry: u64,
    },
    /// See [`EventName::OfferAccepted`].
    OfferAccepted {
        /// Account whose offer was accepted.
        buyer: Address,
        /// Domain owner who accepted.
        seller: Address,
        /// Paid amount in wei.
        amount: U256,
    },
    /// See [`EventName::OfferCancelled`].
    OfferCancelled {
        /// Account that withdrew its offer.
        buyer: Address,
    },
    /// See [`EventName::DomainSold`].
    DomainSold {
        /// Previous owner.
        seller: Address,
        /// New owner.
        buyer: Address,
        /// Paid price in wei.
        price: U256,
    },
}

impl EventKind {
    /// The event name matching this payload.
    #[must_use]
    pub const fn name(&self) -> EventName {
        match self {
            Self::AuctionCreated { .. } => EventName::AuctionCreated,
            Self::BidPlaced { .. } => EventName::BidPlaced,
            Self::AuctionEnded { .. } => EventName::AuctionEnded,
            Self::OfferMade { .. } => EventName::OfferMade,
            Self::OfferAccepted { .. } => EventName::OfferAccepted,
            Self::OfferCancelled { .. } => EventName::OfferCancelled,
            Self::DomainSold { .. } => EventName::DomainSold,
        }
    }
}

/// A decoded marketplace log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketEvent {
    /// keccak-256 of the domain name (the indexed string topic).
    pub name_hash: B256,
    /// Where the log was emitted.
    pub location: EventLocation,
    /// Event payload.
    pub kind: EventKind,
}

/// Raw `auctions(name)` view result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AuctionState {
    /// Domain owner; zero if no auction was ever created.
    pub seller: Address,
    /// Minimum opening bid in wei.
    pub start_price: U256,
    /// Current highest bid in wei.
    pub current_bid: U256,
    /// Current highest bidder.
    pub highest_bidder: Address,
    /// Auction end in Unix seconds.
    pub end_time: u64,
    /// Contract-stored flag. Not trusted on its own, see [`AuctionRecord::is_live`].
    pub active: bool,
}

/// Raw `offers(name, buyer)` view result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OfferState {
    /// Escrowed amount in wei.
    pub amount: U256,
    /// Expiry in Unix seconds.
    pub expiry: u64,
    /// Contract-stored flag.
    pub active: bool,
}

/// A reconciled auction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuctionRecord {
    /// Plaintext domain name.
    pub domain_name: String,
    /// Domain owner.
    pub seller: Address,
    /// Minimum opening bid in wei.
    pub start_price: U256,
    /// Current highest bid in wei.
    pub current_bid: U256,
    /// Current highest bidder.
    pub highest_bidder: Address,
    /// Auction end in Unix seconds.
    pub end_time: u64,
    /// Contract-stored flag at read time.
    pub active: bool,
}

impl AuctionRecord {
    /// Build a record from an authoritative contract read.
    #[must_use]
    pub fn from_state(domain_name: impl Into<String>, state: AuctionState) -> Self {
        Self {
            domain_name: domain_name.into(),
            seller: state.seller,
            start_price: state.start_price,
            current_bid: state.current_bid,
            highest_bidder: state.highest_bidder,
            end_time: state.end_time,
            active: state.active,
        }
    }

    /// An auction is live only if the contract flag is set *and* its end
    /// time lies strictly after `now` (chain time).
    #[must_use]
    pub const fn is_live(&self, now: u64) -> bool {
        self.active && self.end_time > now
    }

    /// Time left until the auction ends, zero once expired.
    #[must_use]
    pub const fn time_remaining(&self, now: u64) -> Duration {
        Duration::from_secs(self.end_time.saturating_sub(now))
    }
}

/// A reconciled offer on a domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferRecord {
    /// Plaintext domain name.
    pub domain_name: String,
    /// Offering account.
    pub buyer: Address,
    /// Escrowed amount in wei.
    pub amount: U256,
    /// Expiry in Unix seconds.
    pub expiry: u64,
    /// Contract-stored flag at read time.
    pub active: bool,
}

impl OfferRecord {
    /// Build a record from an authoritative contract read.
    #[must_use]
    pub fn from_state(domain_name: impl Into<String>, buyer: Address, state: OfferState) -> Self {
        Self {
            domain_name: domain_name.into(),
            buyer,
            amount: state.amount,
            expiry: state.expiry,
            active: state.active,
        }
    }

    /// Same rule as [`AuctionRecord::is_live`], plus a non-zero amount.
    #[must_use]
    pub fn is_live(&self, now: u64) -> bool {
        self.active && self.expiry > now && !self.amount.is_zero()
    }
}

/// A bid observed on an auction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BidRecord {
    /// Plaintext domain name.
    pub domain_name: String,
    /// Bidder account.
    pub bidder: Address,
    /// Bid in wei.
    pub amount: U256,
    /// Where the bid was logged.
    pub location: EventLocation,
}

/// How a domain changed hands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SaleKind {
    /// Fixed-price purchase (`DomainSold`).
    Sale,
    /// Settled auction (`AuctionEnded` with a winner).
    Auction,
    /// Accepted offer (`OfferAccepted`).
    Offer,
}

impl SaleKind {
    /// Lowercase label used in output and archives.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sale => "sale",
            Self::Auction => "auction",
            Self::Offer => "offer",
        }
    }
}

/// A historical transfer of a domain. Immutable once read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleRecord {
    /// Plaintext domain name.
    pub domain: String,
    /// Paid amount in wei.
    pub price: U256,
    /// Previous owner.
    pub seller: Address,
    /// New owner.
    pub buyer: Address,
    /// Block timestamp in Unix seconds.
    pub timestamp: u64,
    /// How the domain was sold.
    pub kind: SaleKind,
    /// Settling transaction.
    pub tx_hash: TxHash,
    /// Block that included the settlement.
    pub block_number: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auction(end_time: u64, active: bool) -> AuctionRecord {
        AuctionRecord::from_state(
            "test",
            AuctionState {
                end_time,
                active,
                ..AuctionState::default()
            },
        )
    }

    #[test]
    fn auction_liveness_needs_flag_and_future_end() {
        assert!(auction(2_000, true).is_live(1_000), "flag set, ends later");
        assert!(!auction(2_000, false).is_live(1_000), "flag cleared");
        assert!(!auction(1_000, true).is_live(1_000), "ends exactly now");
        assert!(!auction(500, true).is_live(1_000), "already ended");
    }

    #[test]
    fn remaining_time_saturates() {
        assert_eq!(auction(4_600, true).time_remaining(1_000), Duration::from_secs(3_600), "remaining");
        assert_eq!(auction(500, true).time_remaining(1_000), Duration::ZERO, "expired");
    }

    #[test]
    fn zero_offers_are_not_live() {
        let offer = OfferRecord::from_state(
            "alice",
            Address::ZERO,
            OfferState {
                amount: U256::ZERO,
                expiry: 10,
                active: true,
            },
        );
        assert!(!offer.is_live(0), "zero amount");
    }

    #[test]
    fn locations_order_by_block_then_log_index() {
        let at = |block_number, log_index| EventLocation {
            block_number,
            log_index,
            tx_hash: TxHash::ZERO,
        };
        assert!(at(1, 9) < at(2, 0), "block dominates");
        assert!(at(2, 0) < at(2, 1), "log index breaks ties");
    }

    #[test]
    fn sale_records_serialize_camel_case() {
        let sale = SaleRecord {
            domain: "alice".into(),
            price: U256::from(5),
            seller: Address::ZERO,
            buyer: Address::ZERO,
            timestamp: 1,
            kind: SaleKind::Offer,
            tx_hash: TxHash::ZERO,
            block_number: 7,
        };
        let json = serde_json::to_value(&sale).unwrap();
        assert_eq!(json["kind"], "offer", "kind label");
        assert_eq!(json["blockNumber"], 7, "camelCase field");
    }
}
