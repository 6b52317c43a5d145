//! Pool Snapshot Tool
//!
//! Fetches a full snapshot of the configured Uniswap v4 pool at the latest
//! block and prints a summary: tick count, active liquidity, price and the
//! liquidity conservation check (sum of liquidity_net over all ticks).
//!
//! Usage:
//!   cargo run --bin pool-snapshot
//!   cargo run --bin pool-snapshot -- --env-file /path/to/.env --ticks
//!
//! Author: AI-Generated
//! Created: 2026-10-17

use alloy::providers::ProviderBuilder;
use anyhow::{bail, Context, Result};
use cexdex_arb::config::{load_config, load_config_from_file};
use cexdex_arb::pool::{OnchainSnapshotter, Pool, SnapshotSource};
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "pool-snapshot")]
struct Args {
    /// Env file to load instead of ./.env
    #[arg(long, env = "ENV_FILE")]
    env_file: Option<String>,

    /// Also print every initialized tick
    #[arg(long)]
    ticks: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = match &args.env_file {
        Some(path) => load_config_from_file(path)?,
        None => load_config()?,
    };

    let provider = ProviderBuilder::new().connect_http(config.rpc_url.parse().context("Invalid RPC_URL")?);
    let snapshotter = OnchainSnapshotter::new(Arc::new(provider), &config);

    info!("Fetching snapshot of pool {}...", config.pool_id);
    let snapshot = snapshotter.fetch_snapshot().await.context("Snapshot failed")?;

    let mut pool = Pool::new(config.base_decimals, config.quote_decimals);
    pool.load_snapshot(&snapshot);
    let net_sum = pool.net_liquidity_sum();

    println!("Pool       {}", config.pool_id);
    println!("Block      {}", snapshot.block_number);
    println!("Ticks      {}", pool.ticks().len());
    println!("Liquidity  {}", pool.liquidity());
    println!("Tick       {}", pool.current_tick());
    println!("sqrtPrice  {}", pool.sqrt_price_x96());
    println!(
        "Price      {:.6} {} per {}",
        pool.price(),
        config.quote_symbol,
        config.base_symbol
    );
    println!(
        "Net sum    {} ({})",
        net_sum,
        if net_sum == 0 { "conserved" } else { "NOT conserved" }
    );

    if args.ticks {
        println!();
        println!("{:>10} {:>40} {:>41}", "tick", "liquidity_gross", "liquidity_net");
        for (index, tick) in pool.ticks() {
            println!("{:>10} {:>40} {:>41}", index, tick.liquidity_gross, tick.liquidity_net);
        }
    }

    if net_sum != 0 {
        bail!("liquidity conservation violated: net sum {}", net_sum);
    }
    Ok(())
}
