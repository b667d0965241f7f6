//! `.shm` domain marketplace command line.
//!
//! Rebuilds live auctions, offers, bids and sales from on-chain logs, and
//! archives sale history as Parquet files.
//!
//! # Usage
//!
//! ```bash
//! # Live auctions on Shardeum mainnet (marketplace from config.toml)
//! shmdomains auctions
//!
//! # Live offers on one domain, as JSON, on testnet
//! shmdomains --chain 8083 offers alice --json
//!
//! # Ad-hoc contract and RPC endpoint
//! shmdomains --contract 0x... --rpc https://my-rpc.example.com sales --limit 50
//!
//! # Archive sale history of every configured deployment
//! shmdomains archive --data-dir ./data --all
//! ```

use std::path::{Path, PathBuf};

use alloy::primitives::{Address, U256, utils::format_ether};
use alloy::providers::DynProvider;
use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use shmdomains::{DomainMarket, EventFetcher, Network, Reconciler};
use shmdomains_cli::config::Config;
use shmdomains_cli::{archive, rpc};

/// `.shm` domain marketplace reconciler.
#[derive(Debug, Parser)]
#[command(name = "shmdomains", version, about)]
struct Cli {
    /// Configuration file with deployments and tuning.
    #[arg(long, global = true, default_value = "config.toml")]
    config: PathBuf,

    /// EIP-155 chain ID of the target network.
    #[arg(long, global = true, default_value_t = 8118)]
    chain: u64,

    /// Override the RPC endpoint for the target chain.
    #[arg(long, global = true)]
    rpc: Option<String>,

    /// Override the marketplace contract address.
    #[arg(long, global = true)]
    contract: Option<Address>,

    #[command(subcommand)]
    command: Command,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
enum Command {
    /// List live auctions, soonest end first.
    Auctions {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// List live offers on a domain, highest first.
    Offers {
        /// Domain name without suffix.
        domain: String,
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// List bids placed on a domain's auctions, highest first.
    Bids {
        /// Domain name without suffix.
        domain: String,
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// List the most recent sales.
    Sales {
        /// Maximum number of sales shown.
        #[arg(long, default_value_t = 20)]
        limit: usize,
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Append new sales to the Parquet archive.
    Archive {
        /// Output directory for chain data (e.g. `./data`).
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,

        /// Archive every configured deployment instead of `--chain` only.
        #[arg(long)]
        all: bool,
    },

    /// List known networks and configured deployments.
    Networks,
}

/// A resolved marketplace deployment to talk to.
#[derive(Debug)]
struct Target {
    chain_id: u64,
    marketplace: Address,
    start_block: u64,
    rpcs: Vec<String>,
    symbol: &'static str,
}

impl Target {
    fn resolve(cli: &Cli, config: &Config) -> Result<Self> {
        Self::for_chain(cli.chain, cli.rpc.as_deref(), cli.contract, config)
    }

    fn for_chain(
        chain_id: u64,
        rpc: Option<&str>,
        contract: Option<Address>,
        config: &Config,
    ) -> Result<Self> {
        let network = Network::from_chain_id(chain_id);
        let deployment = config.deployment(chain_id);

        let marketplace = contract
            .or_else(|| deployment.map(|d| d.marketplace))
            .with_context(|| {
                format!("no marketplace for chain {chain_id}: pass --contract or add [deployments.{chain_id}] to the config")
            })?;

        let rpcs = match (rpc, network) {
            (Some(rpc), _) => vec![rpc.to_owned()],
            (None, Some(network)) => config.rpcs_for(chain_id, network.default_rpc()),
            (None, None) => match deployment {
                Some(d) if !d.rpcs.is_empty() => d.rpcs.clone(),
                _ => bail!("unknown chain ID {chain_id}: pass --rpc"),
            },
        };

        Ok(Self {
            chain_id,
            marketplace,
            start_block: deployment.map_or(0, |d| d.deployment_block),
            rpcs,
            symbol: network.map_or("SHM", Network::native_symbol),
        })
    }

    async fn reconciler(&self, config: &Config) -> Result<Reconciler<DomainMarket<DynProvider>>> {
        let market = rpc::connect(&self.rpcs, self.marketplace).await?;
        Ok(Reconciler::new(market)
            .with_fetcher(EventFetcher::new(config.fetch_options()))
            .with_options(config.reconcile_options(Some(self.start_block))))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    match &cli.command {
        Command::Auctions { json } => cmd_auctions(&cli, &config, *json).await,
        Command::Offers { domain, json } => cmd_offers(&cli, &config, domain, *json).await,
        Command::Bids { domain, json } => cmd_bids(&cli, &config, domain, *json).await,
        Command::Sales { limit, json } => cmd_sales(&cli, &config, *limit, *json).await,
        Command::Archive { data_dir, all } => cmd_archive(&cli, &config, data_dir, *all).await,
        Command::Networks => {
            cmd_networks(&config);
            Ok(())
        }
    }
}

/// Print `value` as pretty JSON.
#[allow(clippy::print_stdout)]
fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// `3h 05m`, `12m 09s` or `42s`.
fn format_remaining(secs: u64) -> String {
    let (h, m, s) = (secs / 3_600, secs % 3_600 / 60, secs % 60);
    if h > 0 {
        format!("{h}h {m:02}m")
    } else if m > 0 {
        format!("{m}m {s:02}s")
    } else {
        format!("{s}s")
    }
}

fn amount(value: U256, symbol: &str) -> String {
    format!("{} {symbol}", format_ether(value))
}

/// Execute the `auctions` subcommand.
#[allow(clippy::print_stdout)]
async fn cmd_auctions(cli: &Cli, config: &Config, json: bool) -> Result<()> {
    let target = Target::resolve(cli, config)?;
    let reconciler = target.reconciler(config).await?;
    let now = reconciler.latest_block().await?;
    let auctions = reconciler.active_auctions_at(now).await;

    if json {
        return print_json(&auctions);
    }
    if auctions.is_empty() {
        println!("No live auctions (block {}).", now.number);
        return Ok(());
    }

    println!(
        "{:<24} {:>22} {:>22} {:<44} Ends in",
        "Domain", "Start", "Current bid", "Highest bidder"
    );
    println!("{}", "-".repeat(124));
    for a in &auctions {
        println!(
            "{:<24} {:>22} {:>22} {:<44} {}",
            a.domain_name,
            amount(a.start_price, target.symbol),
            amount(a.current_bid, target.symbol),
            a.highest_bidder,
            format_remaining(a.time_remaining(now.timestamp).as_secs()),
        );
    }
    Ok(())
}

/// Execute the `offers` subcommand.
#[allow(clippy::print_stdout)]
async fn cmd_offers(cli: &Cli, config: &Config, domain: &str, json: bool) -> Result<()> {
    let target = Target::resolve(cli, config)?;
    let reconciler = target.reconciler(config).await?;
    let now = reconciler.latest_block().await?;
    let offers = reconciler.active_offers_at(domain, now).await;

    if json {
        return print_json(&offers);
    }
    if offers.is_empty() {
        println!("No live offers on {domain}.");
        return Ok(());
    }

    println!("{:<44} {:>22} Expires in", "Buyer", "Amount");
    println!("{}", "-".repeat(80));
    for o in &offers {
        println!(
            "{:<44} {:>22} {}",
            o.buyer,
            amount(o.amount, target.symbol),
            format_remaining(o.expiry.saturating_sub(now.timestamp)),
        );
    }
    Ok(())
}

/// Execute the `bids` subcommand.
#[allow(clippy::print_stdout)]
async fn cmd_bids(cli: &Cli, config: &Config, domain: &str, json: bool) -> Result<()> {
    let target = Target::resolve(cli, config)?;
    let bids = target.reconciler(config).await?.bid_history(domain).await?;

    if json {
        return print_json(&bids);
    }
    if bids.is_empty() {
        println!("No bids on {domain}.");
        return Ok(());
    }

    println!("{:<44} {:>22} {:>12} Tx", "Bidder", "Amount", "Block");
    println!("{}", "-".repeat(150));
    for b in &bids {
        println!(
            "{:<44} {:>22} {:>12} {}",
            b.bidder,
            amount(b.amount, target.symbol),
            b.location.block_number,
            b.location.tx_hash,
        );
    }
    Ok(())
}

/// Execute the `sales` subcommand.
#[allow(clippy::print_stdout)]
async fn cmd_sales(cli: &Cli, config: &Config, limit: usize, json: bool) -> Result<()> {
    let target = Target::resolve(cli, config)?;
    let sales = target.reconciler(config).await?.recent_sales(limit).await?;

    if json {
        return print_json(&sales);
    }
    if sales.is_empty() {
        println!("No sales found.");
        return Ok(());
    }

    println!("{:<20} {:<24} {:<8} {:>22} Buyer", "Time (UTC)", "Domain", "Kind", "Price");
    println!("{}", "-".repeat(120));
    for s in &sales {
        let time = i64::try_from(s.timestamp)
            .ok()
            .and_then(|t| chrono::DateTime::from_timestamp(t, 0))
            .map_or_else(|| s.timestamp.to_string(), |t| t.format("%Y-%m-%d %H:%M:%S").to_string());
        println!(
            "{:<20} {:<24} {:<8} {:>22} {}",
            time,
            s.domain,
            s.kind.as_str(),
            amount(s.price, target.symbol),
            s.buyer,
        );
    }
    Ok(())
}

/// Execute the `archive` subcommand.
async fn cmd_archive(cli: &Cli, config: &Config, data_dir: &Path, all: bool) -> Result<()> {
    let targets: Vec<Target> = if all {
        let mut ids: Vec<u64> = config.deployments.keys().copied().collect();
        ids.sort_unstable();
        if ids.is_empty() {
            bail!("--all requires at least one [deployments.<chain_id>] entry");
        }
        ids.into_iter()
            .map(|chain| Target::for_chain(chain, None, None, config))
            .collect::<Result<_>>()?
    } else {
        vec![Target::resolve(cli, config)?]
    };

    tracing::info!(
        chains = targets.len(),
        data_dir = %data_dir.display(),
        "starting archive"
    );

    let mut success = 0u32;
    let mut failed = 0u32;

    for target in &targets {
        let chain_id = target.chain_id;
        let deployment = shmdomains_cli::config::Deployment {
            marketplace: target.marketplace,
            deployment_block: target.start_block,
            rpcs: target.rpcs.clone(),
        };
        match archive::archive_chain(chain_id, &deployment, config, data_dir, &target.rpcs).await {
            Ok(()) => {
                success += 1;
                tracing::info!(chain_id, "archive complete");
            }
            Err(e) => {
                failed += 1;
                tracing::error!(chain_id, error = %e, "archive failed");
            }
        }
    }

    tracing::info!(success, failed, "archive finished");

    if failed > 0 {
        bail!("{failed} chain(s) failed to archive");
    }

    Ok(())
}

/// Execute the `networks` subcommand.
#[allow(clippy::print_stdout)]
fn cmd_networks(config: &Config) {
    println!(
        "{:<10} {:<18} {:<6} {:<44} RPC",
        "Chain ID", "Name", "Type", "Marketplace"
    );
    println!("{}", "-".repeat(120));

    for network in Network::ALL {
        let chain_id = network.chain_id();
        let net_type = if network.is_testnet() { "test" } else { "main" };
        let marketplace = config
            .deployment(chain_id)
            .map_or_else(|| "-".to_owned(), |d| d.marketplace.to_string());
        println!(
            "{:<10} {:<18} {:<6} {:<44} {}",
            chain_id,
            format!("{network:?}"),
            net_type,
            marketplace,
            config.rpcs_for(chain_id, network.default_rpc()).join(", "),
        );
    }

    let mut custom: Vec<_> = config
        .deployments
        .iter()
        .filter(|(id, _)| Network::from_chain_id(**id).is_none())
        .collect();
    custom.sort_by_key(|(id, _)| **id);
    for (chain_id, d) in custom {
        println!(
            "{:<10} {:<18} {:<6} {:<44} {}",
            chain_id,
            "custom",
            "-",
            d.marketplace,
            d.rpcs.join(", "),
        );
    }
}
