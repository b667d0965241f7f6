#![allow(clippy::print_stdout)]
//! List live `.shm` auctions reconstructed from marketplace logs.
//!
//! Usage:
//!   MARKETPLACE=0x... cargo run --example `active_auctions`
//!
//! Connects to Shardeum mainnet via its public RPC endpoint.

use alloy::{primitives::utils::format_ether, providers::ProviderBuilder};
use shmdomains::{DomainMarket, Network, Reconciler};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let network = Network::ShardeumMainnet;
    let provider = ProviderBuilder::new().connect_http(network.default_rpc().parse()?);
    let market = DomainMarket::new(provider, std::env::var("MARKETPLACE")?.parse()?);

    let reconciler = Reconciler::new(market);
    let now = reconciler.latest_block().await?;
    let auctions = reconciler.active_auctions_at(now).await;
    println!("{} live auction(s) at block {}", auctions.len(), now.number);

    for auction in auctions {
        println!(
            "  {:<24} bid {} {} ends in {}s",
            auction.domain_name,
            format_ether(auction.current_bid),
            network.native_symbol(),
            auction.time_remaining(now.timestamp).as_secs(),
        );
    }

    Ok(())
}
