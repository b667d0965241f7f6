#![allow(clippy::print_stdout)]
//! Show live offers on a single `.shm` domain.
//!
//! Usage:
//!   MARKETPLACE=0x... cargo run --example `domain_offers` -- alice

use alloy::{primitives::utils::format_ether, providers::ProviderBuilder};
use shmdomains::{DomainMarket, Network, Reconciler};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let name = std::env::args().nth(1).ok_or("missing domain name")?;
    let provider =
        ProviderBuilder::new().connect_http(Network::ShardeumMainnet.default_rpc().parse()?);
    let market = DomainMarket::new(provider, std::env::var("MARKETPLACE")?.parse()?);

    let offers = Reconciler::new(market).active_offers(&name).await?;
    if offers.is_empty() {
        println!("No live offers on {name}.");
        return Ok(());
    }

    for offer in offers {
        println!(
            "{} offers {} SHM (expires at {})",
            offer.buyer,
            format_ether(offer.amount),
            offer.expiry
        );
    }

    Ok(())
}
