//! CEX/DEX Arbitrage Engine
//!
//! Main entry point. Wires the two market feeds, the detector and the
//! executor into one process:
//! - Binance SBE best bid/ask websocket -> OrderBook (watch channel)
//! - Unichain flashblocks websocket -> Pool state machine -> BlockProcessed events
//! - Detection loop: newest block event -> detect() -> Executor::submit
//! - Record sink: one JSON execution record per accepted request
//!
//! Any core task ending (feed disconnect, snapshot failure, rate limit, halt)
//! stops the process with a non-zero status; the supervisor restarts it and
//! the pool is rebuilt from a fresh snapshot.
//!
//! Usage:
//!   cargo run --bin cexdex-arb
//!   cargo run --bin cexdex-arb -- --env-file /path/to/.env --live --json-logs
//!
//! Author: AI-Generated
//! Created: 2026-10-17

use alloy::providers::ProviderBuilder;
use anyhow::{Context, Result};
use cexdex_arb::arbitrage::{
    remediation_for, run_detection_loop, strategy_for, Executor, ExecutorContext, ExecutorSettings,
    OpportunityDetector,
};
use cexdex_arb::balances::BalanceBook;
use cexdex_arb::config::{load_config, load_config_from_file};
use cexdex_arb::feeds::{
    monitored_channel, run_flashblock_feed, run_orderbook_feed, run_ws_reader, FeedSettings, FlashblockFeed,
    OrderBookFeed, WsEndpoint,
};
use cexdex_arb::flashblocks::FlashblockBuffer;
use cexdex_arb::pool::{OnchainSnapshotter, SnapshotSource};
use cexdex_arb::types::ExecutionRecord;
use cexdex_arb::venues::{BinanceClient, CexVenue, DexVenue, UniswapV4Client};
use clap::Parser;
use futures::StreamExt;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook_tokio::Signals;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// Time given to an in-flight execution to emit its record on shutdown.
const SINK_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// CEX/DEX arbitrage engine (Binance x Uniswap v4 on Unichain)
#[derive(Parser)]
#[command(name = "cexdex-arb")]
struct Args {
    /// Submit real orders (overrides LIVE_TRADING=false)
    #[arg(long)]
    live: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Env file to load instead of ./.env
    #[arg(long, env = "ENV_FILE")]
    env_file: Option<String>,
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        fmt().json().with_env_filter(filter).init();
    } else {
        fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.json_logs);

    info!("===========================================");
    info!("   CEX/DEX Arbitrage Engine");
    info!("   Binance SBE x Uniswap v4 flashblocks");
    info!("===========================================");

    let mut config = match &args.env_file {
        Some(path) => load_config_from_file(path)?,
        None => load_config()?,
    };
    if args.live {
        config.live_trading = true;
    }
    if config.live_trading {
        warn!("🔴 LIVE TRADING ENABLED - real orders will be submitted");
    } else {
        info!("🟢 Dry run: every check runs, no legs are submitted");
    }

    // ── Venues ────────────────────────────────────────────────────────
    let cex: Arc<dyn CexVenue> = Arc::new(BinanceClient::new(&config).context("Failed to build Binance client")?);
    let dex: Arc<dyn DexVenue> = Arc::new(UniswapV4Client::new(&config).context("Failed to build Uniswap client")?);

    let balances = Arc::new(BalanceBook::new());
    balances
        .refresh(cex.as_ref(), dex.as_ref())
        .await
        .context("Initial balance refresh failed")?;

    // ── Executor ──────────────────────────────────────────────────────
    let flashblocks = Arc::new(FlashblockBuffer::new(config.flashblock_capacity));
    let (record_tx, mut record_rx) = mpsc::unbounded_channel::<ExecutionRecord>();

    let executor = Executor::new(ExecutorContext {
        cex: cex.clone(),
        dex: dex.clone(),
        strategy: strategy_for(config.execution_strategy),
        remediation: remediation_for(config.remediation),
        balances: balances.clone(),
        flashblocks: flashblocks.clone(),
        records: record_tx,
        settings: ExecutorSettings::from_config(&config)?,
    });

    // ── Feeds ─────────────────────────────────────────────────────────
    let (cex_frames_tx, cex_frames_rx) = monitored_channel::<Vec<u8>>("binance-sbe", config.queue_warn_depth);
    let (fb_frames_tx, fb_frames_rx) = monitored_channel::<Vec<u8>>("flashblocks", config.queue_warn_depth);

    let cex_endpoint = WsEndpoint {
        name: "binance",
        url: config.cex_ws_url.clone(),
        headers: vec![("X-MBX-APIKEY", config.cex_api_key.clone())],
    };
    let fb_endpoint = WsEndpoint {
        name: "flashblocks",
        url: config.flashblocks_ws_url.clone(),
        headers: Vec::new(),
    };

    let (book_feed, book_rx) = OrderBookFeed::new();

    let provider = ProviderBuilder::new().connect_http(config.rpc_url.parse().context("Invalid RPC_URL")?);
    let snapshots: Arc<dyn SnapshotSource> = Arc::new(OnchainSnapshotter::new(Arc::new(provider), &config));

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let fb_feed = FlashblockFeed::new(FeedSettings::from_config(&config), flashblocks.clone(), events_tx);

    let detector = OpportunityDetector::new(&config, book_rx, dex.clone())?;

    // ── Tasks ─────────────────────────────────────────────────────────
    let mut tasks: JoinSet<(&'static str, cexdex_arb::Result<()>)> = JoinSet::new();
    tasks.spawn(async move { ("binance-ws", run_ws_reader(cex_endpoint, cex_frames_tx).await) });
    tasks.spawn(async move { ("flashblocks-ws", run_ws_reader(fb_endpoint, fb_frames_tx).await) });
    tasks.spawn(async move { ("orderbook", run_orderbook_feed(book_feed, cex_frames_rx).await) });
    tasks.spawn(async move { ("pool", run_flashblock_feed(fb_feed, snapshots, fb_frames_rx).await) });
    tasks.spawn({
        let executor = executor.clone();
        async move { ("detector", run_detection_loop(detector, events_rx, executor).await) }
    });

    // Record sink ends when the executor (and its sender) is dropped.
    let sink = tokio::spawn(async move {
        while let Some(record) = record_rx.recv().await {
            match serde_json::to_string(&record) {
                Ok(json) => info!(target: "execution", "{}", json),
                Err(e) => error!("Failed to serialize execution record: {}", e),
            }
        }
    });

    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    let signals_handle = signals.handle();

    info!("🚀 Engine running ({} tasks)", tasks.len());

    let outcome = tokio::select! {
        Some(sig) = signals.next() => {
            info!("Received signal {}, shutting down", sig);
            Ok(())
        }
        Some(joined) = tasks.join_next() => match joined {
            Ok((name, Ok(()))) => Err(anyhow::anyhow!("task {} exited", name)),
            Ok((name, Err(e))) => Err(anyhow::Error::new(e).context(format!("task {} failed", name))),
            Err(e) => Err(anyhow::Error::new(e).context("task panicked")),
        },
    };

    signals_handle.close();
    tasks.shutdown().await;

    if executor.is_in_flight() {
        warn!("Shutting down with an execution in flight; check venue positions");
    }
    info!(
        "Dropped {} signals while busy{}",
        executor.dropped_count(),
        executor
            .halt_reason()
            .map(|r| format!(", halted: {}", r))
            .unwrap_or_default()
    );
    drop(executor);
    if tokio::time::timeout(SINK_DRAIN_TIMEOUT, sink).await.is_err() {
        warn!("Execution record sink did not drain in {:?}", SINK_DRAIN_TIMEOUT);
    }

    if let Err(e) = &outcome {
        error!("❌ {:#}", e);
    }
    outcome
}
