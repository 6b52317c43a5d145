//! Core Data Structures
//!
//! Shared types for the engine: trade sides, deployment selectors, the bot
//! configuration, detector outputs and the execution record.
//!
//! Author: AI-Generated
//! Created: 2026-10-17

use alloy::primitives::{Address, B256};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// ── Sides ─────────────────────────────────────────────────────────────

/// Direction of a leg, always from the perspective of the base asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Deployment selectors ──────────────────────────────────────────────

/// Venue environment, resolved once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
}

impl Network {
    pub fn default_cex_rest_url(self) -> &'static str {
        match self {
            Network::Mainnet => "https://api.binance.com",
            Network::Testnet => "https://testnet.binance.vision",
        }
    }

    pub fn default_cex_ws_base(self) -> &'static str {
        match self {
            Network::Mainnet => "wss://stream-sbe.binance.com:9443/ws",
            Network::Testnet => "wss://stream-sbe.testnet.binance.vision/ws",
        }
    }

    /// Unichain mainnet / Unichain Sepolia.
    pub fn default_chain_id(self) -> u64 {
        match self {
            Network::Mainnet => 130,
            Network::Testnet => 1301,
        }
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mainnet" => Ok(Network::Mainnet),
            "testnet" => Ok(Network::Testnet),
            other => Err(format!("unknown network '{}'", other)),
        }
    }
}

/// How the two legs are submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStrategyKind {
    /// CEX first, DEX only after a full fill.
    Sequential,
    /// Both legs at once, evaluated after both complete.
    Concurrent,
}

impl FromStr for ExecutionStrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequential" => Ok(ExecutionStrategyKind::Sequential),
            "concurrent" => Ok(ExecutionStrategyKind::Concurrent),
            other => Err(format!("unknown execution strategy '{}'", other)),
        }
    }
}

/// What to do when exactly one leg filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemediationPolicy {
    Halt,
    Unwind,
}

impl FromStr for RemediationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "halt" => Ok(RemediationPolicy::Halt),
            "unwind" => Ok(RemediationPolicy::Unwind),
            other => Err(format!("unknown remediation policy '{}'", other)),
        }
    }
}

// ── Configuration ─────────────────────────────────────────────────────

/// Main bot configuration, built once by `config::load_config`.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub network: Network,

    // Trading pair
    pub base_symbol: String,
    pub quote_symbol: String,
    pub cex_symbol: String,
    pub base_decimals: u32,
    pub quote_decimals: u32,

    // CEX (Binance)
    pub cex_rest_url: String,
    pub cex_ws_url: String,
    pub cex_api_key: String,
    pub cex_api_secret: String,
    /// Taker fee, parts per million.
    pub cex_fee_ppm: u32,

    // DEX (Uniswap v4 on Unichain)
    pub rpc_url: String,
    pub sequencer_rpc_url: String,
    pub flashblocks_ws_url: String,
    pub chain_id: u64,
    pub private_key: String,
    pub pool_manager: Address,
    pub state_view: Address,
    pub tick_bitmap_helper: Address,
    pub universal_router: Address,
    /// currency0; zero address for native ETH.
    pub base_token: Address,
    /// currency1.
    pub quote_token: Address,
    pub hooks: Address,
    pub pool_id: B256,
    /// Pool LP fee, parts per million.
    pub pool_fee_ppm: u32,
    pub tick_spacing: i32,

    // Trading parameters
    pub trade_size_base: Decimal,
    /// Minimum edge in the quote asset's smallest unit.
    pub min_edge: i128,
    /// Consecutive throttled quote cycles tolerated before detection stops.
    pub max_consecutive_throttles: u32,
    pub safety_buffer: Decimal,
    /// Native balance kept on the DEX wallet for gas.
    pub dex_gas_reserve: Decimal,
    pub slippage_ppm: u32,
    pub execution_strategy: ExecutionStrategyKind,
    pub remediation: RemediationPolicy,
    pub live_trading: bool,

    // Flashblock timing
    pub slot_count: u64,
    /// slot index -> latest acceptable millisecond within the second. Empty disables the check.
    pub slot_deadlines_ms: BTreeMap<u64, u32>,
    pub flashblock_capacity: usize,

    // Transaction submission
    pub gas_limit: u64,
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
    pub receipt_poll_interval_ms: u64,
    pub receipt_poll_attempts: u32,

    // Feeds
    pub queue_warn_depth: usize,
}

// ── Detection ─────────────────────────────────────────────────────────

/// Both venues' prices for the configured trade size, in the quote asset's
/// smallest unit. `*_bid` is what selling the size yields, `*_ask` what buying costs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NotionalValues {
    pub b_bid: i128,
    pub b_ask: i128,
    pub u_bid: i128,
    pub u_ask: i128,
}

/// A fee-adjusted discrepancy that clears the minimum edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Opportunity {
    pub cex_side: Side,
    pub dex_side: Side,
    pub edge: i128,
}

/// Detector output handed to the executor.
#[derive(Debug, Clone)]
pub struct TradeSignal {
    pub block_number: u64,
    pub slot_index: u64,
    pub opportunity: Opportunity,
    pub notional: NotionalValues,
    pub detected_at: DateTime<Utc>,
}

impl TradeSignal {
    /// Quote notional of the CEX leg (what we pay when buying, receive when selling).
    pub fn cex_notional(&self) -> i128 {
        match self.opportunity.cex_side {
            Side::Buy => self.notional.b_ask,
            Side::Sell => self.notional.b_bid,
        }
    }

    pub fn dex_notional(&self) -> i128 {
        match self.opportunity.dex_side {
            Side::Buy => self.notional.u_ask,
            Side::Sell => self.notional.u_bid,
        }
    }
}

// ── Execution record ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Completed,
    DryRun,
    /// Pre-checks failed, nothing submitted.
    Rejected,
    /// A leg failed with no resulting exposure.
    Aborted,
    PartialUnwound,
    PartialHalted,
    Unconfirmed,
}

/// One record per accepted execution request, consumed by the external sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub timestamp: DateTime<Utc>,
    pub status: ExecutionStatus,
    pub block_number: u64,
    pub slot_index: u64,
    pub cex_side: Side,
    pub dex_side: Side,
    pub edge: i128,
    pub notional: NotionalValues,
    pub base_qty: Decimal,
    pub cex_order_id: Option<String>,
    pub cex_filled_qty: Option<Decimal>,
    pub cex_avg_price: Option<Decimal>,
    pub dex_tx_hash: Option<String>,
    /// (block, flashblock index) the DEX leg landed in, when observed.
    pub dex_landed_slot: Option<(u64, u64)>,
    pub co_located_txs: usize,
    pub pnl: Option<Decimal>,
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

impl ExecutionRecord {
    pub fn new(signal: &TradeSignal, base_qty: Decimal, status: ExecutionStatus) -> Self {
        Self {
            timestamp: Utc::now(),
            status,
            block_number: signal.block_number,
            slot_index: signal.slot_index,
            cex_side: signal.opportunity.cex_side,
            dex_side: signal.opportunity.dex_side,
            edge: signal.opportunity.edge,
            notional: signal.notional,
            base_qty,
            cex_order_id: None,
            cex_filled_qty: None,
            cex_avg_price: None,
            dex_tx_hash: None,
            dex_landed_slot: None,
            co_located_txs: 0,
            pnl: None,
            error: None,
            elapsed_ms: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_opposite() {
        assert_eq!(Side::Buy.opposite(), Side::Sell);
        assert_eq!(Side::Sell.opposite(), Side::Buy);
        assert_eq!(Side::Sell.to_string(), "SELL");
    }

    #[test]
    fn test_selectors_parse() {
        assert_eq!("Mainnet".parse::<Network>().unwrap(), Network::Mainnet);
        assert_eq!(
            " concurrent ".parse::<ExecutionStrategyKind>().unwrap(),
            ExecutionStrategyKind::Concurrent
        );
        assert_eq!("halt".parse::<RemediationPolicy>().unwrap(), RemediationPolicy::Halt);
        assert!("bogus".parse::<RemediationPolicy>().is_err());
    }

    #[test]
    fn test_signal_notionals_follow_sides() {
        let signal = TradeSignal {
            block_number: 1,
            slot_index: 2,
            opportunity: Opportunity {
                cex_side: Side::Sell,
                dex_side: Side::Buy,
                edge: 60_000,
            },
            notional: NotionalValues {
                b_bid: 44_360_000,
                b_ask: 44_360_100,
                u_bid: 44_280_000,
                u_ask: 44_300_000,
            },
            detected_at: Utc::now(),
        };
        assert_eq!(signal.cex_notional(), 44_360_000);
        assert_eq!(signal.dex_notional(), 44_300_000);
    }
}
