//! Live state of the `.shm` domain marketplace, rebuilt from event logs.
//!
//! No indexer sits in front of the marketplace contract, so every view is
//! reconstructed on demand:
//!
//! - [`fetcher`] pulls logs over a widening ladder of block ranges.
//! - [`decoder`] recovers domain names hidden behind indexed-string hashes
//!   from the calling transaction.
//! - [`reconcile`] narrows candidates with set operations over events, then
//!   confirms each one with an authoritative contract read.
//! - [`aggregate`] de-duplicates and orders the records for display.
//!
//! ```no_run
//! use alloy::{primitives::address, providers::ProviderBuilder};
//! use shmdomains::{DomainMarket, Network, Reconciler};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let provider = ProviderBuilder::new().connect_http(Network::ShardeumMainnet.default_rpc().parse()?);
//! let market = DomainMarket::new(provider, address!("0000000000000000000000000000000000000001"));
//!
//! for auction in Reconciler::new(market).active_auctions().await? {
//!     println!("{} ends at {}", auction.domain_name, auction.end_time);
//! }
//! # Ok(())
//! # }
//! ```

pub mod aggregate;
pub mod contracts;
pub mod decoder;
mod error;
pub mod fetcher;
mod market;
#[cfg(test)]
mod mock;
pub mod networks;
pub mod reconcile;
pub mod source;
pub mod types;

pub use error::{MarketError, Result, TxFailure};
pub use fetcher::{EventFetcher, FetchOptions, RangeStrategy};
pub use market::DomainMarket;
pub use networks::Network;
pub use reconcile::{ReconcileOptions, Reconciler};
pub use source::{EventQuery, MarketSource};
pub use types::{
    AuctionRecord, AuctionState, BidRecord, BlockStamp, EventKind, EventLocation, EventName,
    MarketEvent, OfferRecord, OfferState, SaleKind, SaleRecord,
};
