//! Trading Venues
//!
//! Capability interfaces the executor drives, resolved once at startup:
//! - `CexVenue`: market orders and balances (Binance REST)
//! - `DexVenue`: quotes, swaps and balances (Uniswap v4 via Universal Router)
//!
//! Author: AI-Generated
//! Created: 2026-10-17

pub mod binance;
pub mod uniswap;

use crate::balances::VenueBalances;
use crate::error::Result;
use crate::feeds::payload::RawLog;
use crate::pool::state::PoolView;
use crate::types::Side;
use alloy::primitives::{TxHash, U256};
use async_trait::async_trait;
use rust_decimal::Decimal;

pub use binance::BinanceClient;
pub use uniswap::UniswapV4Client;

// ── CEX ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderStatus {
    Filled,
    PartiallyFilled,
    Expired,
    Rejected,
    Canceled,
    Other(String),
}

impl OrderStatus {
    pub fn parse(status: &str) -> Self {
        match status {
            "FILLED" => OrderStatus::Filled,
            "PARTIALLY_FILLED" => OrderStatus::PartiallyFilled,
            "EXPIRED" | "EXPIRED_IN_MATCH" => OrderStatus::Expired,
            "REJECTED" => OrderStatus::Rejected,
            "CANCELED" => OrderStatus::Canceled,
            other => OrderStatus::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fill {
    pub price: Decimal,
    pub qty: Decimal,
    pub commission: Decimal,
    pub commission_asset: String,
}

/// Result of one market order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FillReport {
    pub order_id: String,
    pub side: Side,
    pub status: OrderStatus,
    pub requested_qty: Decimal,
    pub executed_qty: Decimal,
    pub fills: Vec<Fill>,
}

impl FillReport {
    pub fn is_filled(&self) -> bool {
        self.status == OrderStatus::Filled
    }

    /// Quote notional traded: sum(price * qty).
    pub fn quote_notional(&self) -> Decimal {
        self.fills.iter().map(|f| f.price * f.qty).sum()
    }

    pub fn filled_qty(&self) -> Decimal {
        self.fills.iter().map(|f| f.qty).sum()
    }

    /// Volume-weighted average fill price.
    pub fn avg_price(&self) -> Option<Decimal> {
        let qty = self.filled_qty();
        (!qty.is_zero()).then(|| self.quote_notional() / qty)
    }
}

#[async_trait]
pub trait CexVenue: Send + Sync {
    fn name(&self) -> &'static str;

    async fn place_order(&self, side: Side, quantity: Decimal) -> Result<FillReport>;

    async fn get_balances(&self) -> Result<VenueBalances>;
}

// ── DEX ───────────────────────────────────────────────────────────────

/// Quote-asset amounts (smallest unit) for the configured base size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DexQuote {
    /// Received for selling the size.
    pub bid: U256,
    /// Paid for buying the size, fee included.
    pub ask: U256,
}

/// Swap request for the DEX leg.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DexOrder {
    pub side: Side,
    /// Exact base amount bought or sold.
    pub base_amount: U256,
    /// Minimum quote received when selling, maximum paid when buying.
    pub quote_limit: U256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DexReceipt {
    pub tx_hash: TxHash,
    pub success: bool,
    pub block_number: Option<u64>,
    pub gas_used: u128,
    pub effective_gas_price: u128,
    /// OP-stack L1 data fee in wei (zero elsewhere).
    pub l1_fee: u128,
    pub logs: Vec<RawLog>,
}

#[async_trait]
pub trait DexVenue: Send + Sync {
    fn name(&self) -> &'static str;

    async fn quote(&self, pool: &PoolView, base_amount: U256) -> Result<DexQuote>;

    async fn execute(&self, order: &DexOrder) -> Result<DexReceipt>;

    async fn get_balances(&self) -> Result<VenueBalances>;
}
