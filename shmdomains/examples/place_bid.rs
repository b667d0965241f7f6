#![allow(clippy::print_stdout)]
//! Bid on a `.shm` domain auction.
//!
//! Usage:
//!   PRIVATE_KEY=... MARKETPLACE=0x... cargo run --example `place_bid` -- alice 5
//!
//! **Requirements:** A funded wallet on Shardeum testnet.

use alloy::{
    network::EthereumWallet,
    primitives::utils::parse_ether,
    providers::ProviderBuilder,
    signers::local::PrivateKeySigner,
};
use shmdomains::{DomainMarket, Network, Reconciler};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let name = args.next().ok_or("missing domain name")?;
    let amount = parse_ether(&args.next().ok_or("missing amount in SHM")?)?;

    // Load signer from environment.
    let signer: PrivateKeySigner = std::env::var("PRIVATE_KEY")?.parse()?;
    let provider = ProviderBuilder::new()
        .wallet(EthereumWallet::from(signer))
        .connect_http(Network::ShardeumTestnet.default_rpc().parse()?);
    let market = DomainMarket::new(provider, std::env::var("MARKETPLACE")?.parse()?);

    match market.place_bid(&name, amount).await {
        Ok(tx) => println!("Bid placed in {tx}"),
        Err(e) => {
            println!("{e}");
            return Ok(());
        }
    }

    // Bids are visible to the next reconciliation pass.
    let bids = Reconciler::new(market).bid_history(&name).await?;
    if let Some(top) = bids.first() {
        println!("Highest bid on {name}: {} wei by {}", top.amount, top.bidder);
    }

    Ok(())
}
