//! JSON-RPC client for a deployed marketplace contract.

use alloy::consensus::Transaction as _;
use alloy::eips::BlockNumberOrTag;
use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy::providers::Provider;
use alloy::rpc::types::Filter;

use crate::contracts::DomainMarketplace::{self, DomainMarketplaceInstance};
use crate::error::{MarketError, Result, TxFailure};
use crate::source::{EventQuery, MarketSource, decode_log};
use crate::types::{AuctionState, BlockStamp, MarketEvent, OfferState};

/// A marketplace contract bound to a provider.
///
/// Read methods back [`MarketSource`]; write methods need a provider with a
/// wallet attached and return the hash of the mined transaction.
#[derive(Debug, Clone)]
pub struct DomainMarket<P> {
    contract: DomainMarketplaceInstance<P>,
}

fn tx_error(message: impl ToString) -> MarketError {
    MarketError::Transaction(TxFailure::classify(&message.to_string()))
}

impl<P: Provider> DomainMarket<P> {
    /// Bind the marketplace deployed at `address`.
    pub fn new(provider: P, address: Address) -> Self {
        Self {
            contract: DomainMarketplace::new(address, provider),
        }
    }

    /// Address of the marketplace contract.
    #[must_use]
    pub fn address(&self) -> Address {
        *self.contract.address()
    }

    /// The underlying provider.
    pub fn provider(&self) -> &P {
        self.contract.provider()
    }

    /// Put `name` up for auction for `duration_secs` seconds.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::Transaction`] with a readable reason if the
    /// transaction cannot be sent or is not mined.
    pub async fn create_auction(
        &self,
        name: &str,
        start_price: U256,
        duration_secs: u64,
    ) -> Result<TxHash> {
        self.contract
            .createAuction(name.to_owned(), start_price, U256::from(duration_secs))
            .send()
            .await
            .map_err(tx_error)?
            .watch()
            .await
            .map_err(tx_error)
    }

    /// Bid `amount` wei on the auction for `name`.
    ///
    /// # Errors
    ///
    /// See [`Self::create_auction`].
    pub async fn place_bid(&self, name: &str, amount: U256) -> Result<TxHash> {
        self.contract
            .placeBid(name.to_owned())
            .value(amount)
            .send()
            .await
            .map_err(tx_error)?
            .watch()
            .await
            .map_err(tx_error)
    }

    /// Settle the auction for `name`.
    ///
    /// # Errors
    ///
    /// See [`Self::create_auction`].
    pub async fn end_auction(&self, name: &str) -> Result<TxHash> {
        self.contract
            .endAuction(name.to_owned())
            .send()
            .await
            .map_err(tx_error)?
            .watch()
            .await
            .map_err(tx_error)
    }

    /// Offer `amount` wei for `name`, valid for `duration_secs` seconds.
    ///
    /// # Errors
    ///
    /// See [`Self::create_auction`].
    pub async fn make_offer(&self, name: &str, amount: U256, duration_secs: u64) -> Result<TxHash> {
        self.contract
            .makeOffer(name.to_owned(), U256::from(duration_secs))
            .value(amount)
            .send()
            .await
            .map_err(tx_error)?
            .watch()
            .await
            .map_err(tx_error)
    }

    /// Accept `buyer`'s offer on `name`.
    ///
    /// # Errors
    ///
    /// See [`Self::create_auction`].
    pub async fn accept_offer(&self, name: &str, buyer: Address) -> Result<TxHash> {
        self.contract
            .acceptOffer(name.to_owned(), buyer)
            .send()
            .await
            .map_err(tx_error)?
            .watch()
            .await
            .map_err(tx_error)
    }

    /// Withdraw the caller's offer on `name`.
    ///
    /// # Errors
    ///
    /// See [`Self::create_auction`].
    pub async fn cancel_offer(&self, name: &str) -> Result<TxHash> {
        self.contract
            .cancelOffer(name.to_owned())
            .send()
            .await
            .map_err(tx_error)?
            .watch()
            .await
            .map_err(tx_error)
    }

    /// Buy `name` at its fixed `price`.
    ///
    /// # Errors
    ///
    /// See [`Self::create_auction`].
    pub async fn buy_domain(&self, name: &str, price: U256) -> Result<TxHash> {
        self.contract
            .buyDomain(name.to_owned())
            .value(price)
            .send()
            .await
            .map_err(tx_error)?
            .watch()
            .await
            .map_err(tx_error)
    }
}

impl<P: Provider> MarketSource for DomainMarket<P> {
    async fn latest_block(&self) -> Result<BlockStamp> {
        let block = self
            .provider()
            .get_block_by_number(BlockNumberOrTag::Latest)
            .await?
            .ok_or(MarketError::NoLatestBlock)?;
        Ok(BlockStamp {
            number: block.header.number,
            timestamp: block.header.timestamp,
        })
    }

    async fn block_timestamp(&self, number: u64) -> Result<u64> {
        let block = self
            .provider()
            .get_block_by_number(BlockNumberOrTag::Number(number))
            .await?
            .ok_or(MarketError::BlockNotFound(number))?;
        Ok(block.header.timestamp)
    }

    async fn events(&self, query: &EventQuery) -> Result<Vec<MarketEvent>> {
        let mut filter = Filter::new()
            .address(self.address())
            .event_signature(query.event.signature_hash())
            .from_block(query.from_block)
            .to_block(query.to_block);
        if let Some(hash) = query.name_hash {
            filter = filter.topic1(hash);
        }

        let logs = self.provider().get_logs(&filter).await?;
        let mut events = Vec::with_capacity(logs.len());
        for log in &logs {
            match decode_log(log) {
                Ok(Some(event)) => events.push(event),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(tx = ?log.transaction_hash, error = %e, "skipping undecodable log");
                }
            }
        }
        Ok(events)
    }

    async fn transaction_input(&self, tx_hash: TxHash) -> Result<Bytes> {
        let tx = self
            .provider()
            .get_transaction_by_hash(tx_hash)
            .await?
            .ok_or(MarketError::TransactionNotFound(tx_hash))?;
        Ok(tx.input().clone())
    }

    async fn auction(&self, name: &str) -> Result<AuctionState> {
        let raw = self.contract.auctions(name.to_owned()).call().await?;
        Ok(AuctionState {
            seller: raw.seller,
            start_price: raw.startPrice,
            current_bid: raw.currentBid,
            highest_bidder: raw.highestBidder,
            end_time: raw.endTime.saturating_to(),
            active: raw.active,
        })
    }

    async fn offer(&self, name: &str, buyer: Address) -> Result<OfferState> {
        let raw = self.contract.offers(name.to_owned(), buyer).call().await?;
        Ok(OfferState {
            amount: raw.amount,
            expiry: raw.expiry.saturating_to(),
            active: raw.active,
        })
    }
}

#[cfg(test)]
mod tests {
    use alloy::providers::ProviderBuilder;
    use alloy::transports::mock::Asserter;

    use super::*;

    #[tokio::test]
    async fn missing_latest_block_has_its_own_error() {
        let asserter = Asserter::new();
        let provider = ProviderBuilder::new().connect_mocked_client(asserter.clone());
        let market = DomainMarket::new(provider, Address::ZERO);
        asserter.push_success(&serde_json::Value::Null);

        let err = market.latest_block().await.unwrap_err();
        assert!(matches!(err, MarketError::NoLatestBlock), "{err}");
        assert_eq!(err.to_string(), "node returned no latest block", "display");
    }
}
