//! Opportunity Detector
//!
//! Compares the CEX book and the DEX pool for the configured trade size.
//! All four notionals are integers in the quote asset's smallest unit; the
//! decision itself never touches floating point.
//!
//! - buy CEX / sell DEX: `u_bid - ceil(b_ask * (1 + fee))`
//! - sell CEX / buy DEX: `floor(b_bid * (1 - fee)) - u_ask`
//!
//! DEX quotes already embed the pool fee. Directions are evaluated in that
//! order and the first whose edge strictly exceeds `min_edge` wins.
//!
//! Author: AI-Generated
//! Created: 2026-10-17

use crate::arbitrage::executor::{Dispatch, Executor};
use crate::error::{ArbError, Result};
use crate::feeds::flashblock::BlockProcessed;
use crate::feeds::orderbook::OrderBook;
use crate::pool::calculator::{pow10, u256_to_i128};
use crate::types::{BotConfig, NotionalValues, Opportunity, Side, TradeSignal};
use crate::venues::DexVenue;
use alloy::primitives::U256;
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

const PPM: i128 = 1_000_000;

/// Fee and threshold inputs to `detect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DetectorParams {
    pub cex_fee_ppm: u32,
    /// Quote-asset smallest units.
    pub min_edge: i128,
}

/// Cost of buying on the CEX including taker fee, rounded up.
pub fn ask_with_fee(b_ask: i128, fee_ppm: u32) -> Option<i128> {
    let gross = b_ask.checked_mul(PPM + fee_ppm as i128)?;
    Some(gross.checked_add(PPM - 1)?.div_euclid(PPM))
}

/// Proceeds of selling on the CEX net of taker fee, rounded down.
pub fn bid_with_fee(b_bid: i128, fee_ppm: u32) -> Option<i128> {
    Some(b_bid.checked_mul(PPM - fee_ppm as i128)?.div_euclid(PPM))
}

pub fn detect(notional: &NotionalValues, params: &DetectorParams) -> Option<Opportunity> {
    let buy_cex_edge = notional.u_bid - ask_with_fee(notional.b_ask, params.cex_fee_ppm)?;
    if buy_cex_edge > params.min_edge {
        return Some(Opportunity {
            cex_side: Side::Buy,
            dex_side: Side::Sell,
            edge: buy_cex_edge,
        });
    }

    let sell_cex_edge = bid_with_fee(notional.b_bid, params.cex_fee_ppm)? - notional.u_ask;
    if sell_cex_edge > params.min_edge {
        return Some(Opportunity {
            cex_side: Side::Sell,
            dex_side: Side::Buy,
            edge: sell_cex_edge,
        });
    }

    None
}

/// CEX `(b_bid, b_ask)` for `size` base units: bid rounded down, ask up.
pub fn cex_notionals(book: &OrderBook, size: Decimal, quote_decimals: u32) -> Option<(i128, i128)> {
    if !book.is_populated() {
        return None;
    }
    let unit = pow10(quote_decimals)?;
    let bid = book.bid_price.checked_mul(size)?.checked_mul(unit)?.floor();
    let ask = book.ask_price.checked_mul(size)?.checked_mul(unit)?.ceil();
    Some((bid.to_i128()?, ask.to_i128()?))
}

// ── Detector service ──────────────────────────────────────────────────

pub struct OpportunityDetector {
    params: DetectorParams,
    trade_size: Decimal,
    base_amount: U256,
    quote_decimals: u32,
    max_consecutive_throttles: u32,
    book: watch::Receiver<OrderBook>,
    dex: Arc<dyn DexVenue>,
}

impl OpportunityDetector {
    pub fn new(config: &BotConfig, book: watch::Receiver<OrderBook>, dex: Arc<dyn DexVenue>) -> anyhow::Result<Self> {
        Ok(Self {
            params: DetectorParams {
                cex_fee_ppm: config.cex_fee_ppm,
                min_edge: config.min_edge,
            },
            trade_size: config.trade_size_base,
            base_amount: U256::from(config.trade_size_raw()?),
            quote_decimals: config.quote_decimals,
            max_consecutive_throttles: config.max_consecutive_throttles,
            book,
            dex,
        })
    }

    /// Notionals at the current book and the pool state carried by `event`.
    pub async fn notionals(&self, event: &BlockProcessed) -> Result<Option<NotionalValues>> {
        let book = *self.book.borrow();
        let Some((b_bid, b_ask)) = cex_notionals(&book, self.trade_size, self.quote_decimals) else {
            debug!("#{}-{}: waiting for CEX book", event.block_number, event.index);
            return Ok(None);
        };

        let quote = self.dex.quote(&event.pool, self.base_amount).await?;
        let u_bid = u256_to_i128(quote.bid).ok_or_else(|| ArbError::Quote(format!("bid {} overflows", quote.bid)))?;
        let u_ask = u256_to_i128(quote.ask).ok_or_else(|| ArbError::Quote(format!("ask {} overflows", quote.ask)))?;

        Ok(Some(NotionalValues {
            b_bid,
            b_ask,
            u_bid,
            u_ask,
        }))
    }

    pub async fn evaluate(&self, event: &BlockProcessed) -> Result<Option<TradeSignal>> {
        let Some(notional) = self.notionals(event).await? else {
            return Ok(None);
        };

        let Some(opportunity) = detect(&notional, &self.params) else {
            debug!(
                "#{}-{}: B bid={} ask={} | U bid={} ask={} (p={:.4})",
                event.block_number,
                event.index,
                notional.b_bid,
                notional.b_ask,
                notional.u_bid,
                notional.u_ask,
                event.pool.price
            );
            return Ok(None);
        };

        info!(
            "🎯 #{}-{}: CEX {} / DEX {} edge {} (B {}/{} U {}/{})",
            event.block_number,
            event.index,
            opportunity.cex_side,
            opportunity.dex_side,
            opportunity.edge,
            notional.b_bid,
            notional.b_ask,
            notional.u_bid,
            notional.u_ask
        );

        Ok(Some(TradeSignal {
            block_number: event.block_number,
            slot_index: event.index,
            opportunity,
            notional,
            detected_at: Utc::now(),
        }))
    }
}

/// Consume block events, always acting on the newest one available.
///
/// A failed or throttled quote skips that cycle only. Throttling on
/// `max_consecutive_throttles` cycles in a row, a halted executor, or the
/// feed going away ends the loop with an error.
pub async fn run_detection_loop(
    detector: OpportunityDetector,
    mut events: mpsc::UnboundedReceiver<BlockProcessed>,
    executor: Executor,
) -> Result<()> {
    info!("🔎 Detection loop started");
    let mut skipped: u64 = 0;
    let mut throttled: u32 = 0;

    while let Some(mut event) = events.recv().await {
        while let Ok(newer) = events.try_recv() {
            event = newer;
            skipped += 1;
        }
        if skipped > 0 && skipped % 100 == 0 {
            debug!("Detection skipped {} stale block events so far", skipped);
        }

        if let Some(reason) = executor.halt_reason() {
            return Err(ArbError::Halted(reason));
        }

        let result = detector.evaluate(&event).await;
        throttled = match &result {
            Err(ArbError::RateLimit { .. }) => throttled + 1,
            _ => 0,
        };

        let signal = match result {
            Ok(Some(signal)) => signal,
            Ok(None) => continue,
            Err(e @ ArbError::RateLimit { .. }) if throttled < detector.max_consecutive_throttles => {
                warn!(
                    "#{}-{}: detection skipped ({}/{} throttled): {}",
                    event.block_number, event.index, throttled, detector.max_consecutive_throttles, e
                );
                continue;
            }
            Err(e) if e.is_fatal() => {
                error!("🛑 Detection stopped: {}", e);
                return Err(e);
            }
            Err(e) => {
                warn!("#{}-{}: detection skipped: {}", event.block_number, event.index, e);
                continue;
            }
        };

        if let Dispatch::Halted(reason) = executor.submit(signal) {
            return Err(ArbError::Halted(reason));
        }
    }

    Err(ArbError::venue("flashblocks", "block event channel closed"))
}
