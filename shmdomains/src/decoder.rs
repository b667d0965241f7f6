//! Recovery of plaintext domain names from hashed event topics.
//!
//! Indexed `string` parameters are stored in logs as their keccak-256 hash.
//! The name is recovered from the call data of the transaction that emitted
//! the log: every marketplace function takes the name as its first argument.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use alloy::primitives::{B256, TxHash, keccak256};
use alloy::sol_types::SolCall;
use futures::stream::{self, StreamExt};

use crate::contracts::DomainMarketplace;
use crate::error::{Result, with_timeout};
use crate::source::MarketSource;
use crate::types::MarketEvent;

fn name_from<C: SolCall>(input: &[u8], name: impl FnOnce(C) -> String) -> Option<String> {
    if input.get(..4)? != C::SELECTOR.as_slice() {
        return None;
    }
    C::abi_decode(input).ok().map(name)
}

/// Extract the domain name argument from marketplace call data.
///
/// Returns [`None`] when the selector is not a marketplace function or the
/// arguments do not decode (for example a call routed through a multisig).
#[must_use]
pub fn decode_domain_name(input: &[u8]) -> Option<String> {
    use DomainMarketplace as M;

    name_from::<M::createAuctionCall>(input, |c| c.name)
        .or_else(|| name_from::<M::placeBidCall>(input, |c| c.name))
        .or_else(|| name_from::<M::endAuctionCall>(input, |c| c.name))
        .or_else(|| name_from::<M::makeOfferCall>(input, |c| c.name))
        .or_else(|| name_from::<M::acceptOfferCall>(input, |c| c.name))
        .or_else(|| name_from::<M::cancelOfferCall>(input, |c| c.name))
        .or_else(|| name_from::<M::buyDomainCall>(input, |c| c.name))
}

/// Distinct transactions of `events`, with the name hashes each one logged.
fn transactions(events: &[MarketEvent]) -> BTreeMap<TxHash, BTreeSet<B256>> {
    let mut wanted: BTreeMap<TxHash, BTreeSet<B256>> = BTreeMap::new();
    for event in events {
        wanted
            .entry(event.location.tx_hash)
            .or_default()
            .insert(event.name_hash);
    }
    wanted
}

/// Fetch one transaction and decode the logged name from its call data.
///
/// `Ok(None)` means the call data does not carry any of `hashes`.
async fn lookup<S: MarketSource>(
    source: &S,
    tx_hash: TxHash,
    hashes: &BTreeSet<B256>,
    timeout: Duration,
) -> Result<Option<(B256, String)>> {
    let input = with_timeout(timeout, source.transaction_input(tx_hash)).await?;
    let found = decode_domain_name(&input)
        .map(|name| (keccak256(name.as_bytes()), name))
        .filter(|(hash, _)| hashes.contains(hash));
    if found.is_none() {
        tracing::debug!(%tx_hash, "call data does not carry the logged name");
    }
    Ok(found)
}

/// Recover the names behind the hashed topics of `events`.
///
/// Each distinct transaction is fetched once, with at most `concurrency`
/// requests in flight. A name is kept only if it hashes back to the topic
/// of an event from that transaction. Transactions that cannot be fetched or
/// decoded are skipped: the result may be partial, never an error.
pub async fn recover_names<S: MarketSource>(
    source: &S,
    events: &[MarketEvent],
    concurrency: usize,
    timeout: Duration,
) -> BTreeMap<B256, String> {
    let lookups = stream::iter(transactions(events))
        .map(|(tx_hash, hashes)| async move {
            match lookup(source, tx_hash, &hashes, timeout).await {
                Ok(found) => found,
                Err(e) => {
                    tracing::warn!(%tx_hash, error = %e, "skipping unreadable transaction");
                    None
                }
            }
        })
        .buffer_unordered(concurrency.max(1))
        .collect::<Vec<_>>()
        .await;

    lookups.into_iter().flatten().collect()
}

/// Strict [`recover_names`]: a transaction that cannot be fetched fails the
/// whole lookup. Call data that does not carry the logged name is still
/// skipped, since retrying cannot change it.
///
/// # Errors
///
/// Returns the first RPC error or timeout.
pub async fn try_recover_names<S: MarketSource>(
    source: &S,
    events: &[MarketEvent],
    concurrency: usize,
    timeout: Duration,
) -> Result<BTreeMap<B256, String>> {
    let lookups = stream::iter(transactions(events))
        .map(|(tx_hash, hashes)| async move { lookup(source, tx_hash, &hashes, timeout).await })
        .buffer_unordered(concurrency.max(1))
        .collect::<Vec<_>>()
        .await;

    let mut names = BTreeMap::new();
    for found in lookups {
        if let Some((hash, name)) = found? {
            names.insert(hash, name);
        }
    }
    Ok(names)
}
