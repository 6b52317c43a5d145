//! Leg Strategies
//!
//! How the two legs are submitted. Both strategies return a `LegOutcome`
//! holding every leg's final result, and the executor classifies it the same
//! way regardless of strategy.
//!
//! - Sequential: CEX first; the DEX leg only after a full CEX fill
//! - Concurrent: both at once, both awaited before anything is evaluated
//!
//! Author: AI-Generated
//! Created: 2026-10-17

use crate::error::{ArbError, Result};
use crate::types::{ExecutionStrategyKind, Side};
use crate::venues::{CexVenue, DexOrder, DexReceipt, DexVenue, FillReport};
use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegRequest {
    pub cex_side: Side,
    pub base_qty: Decimal,
    pub dex_order: DexOrder,
}

/// Final state of both legs. `dex: None` means the DEX leg was never submitted.
#[derive(Debug)]
pub struct LegOutcome {
    pub cex: Result<FillReport>,
    pub dex: Option<Result<DexReceipt>>,
}

#[async_trait]
pub trait LegStrategy: Send + Sync {
    fn kind(&self) -> ExecutionStrategyKind;

    async fn run(&self, cex: &dyn CexVenue, dex: &dyn DexVenue, request: &LegRequest) -> LegOutcome;
}

pub struct SequentialLegs;

#[async_trait]
impl LegStrategy for SequentialLegs {
    fn kind(&self) -> ExecutionStrategyKind {
        ExecutionStrategyKind::Sequential
    }

    async fn run(&self, cex: &dyn CexVenue, dex: &dyn DexVenue, request: &LegRequest) -> LegOutcome {
        let cex_result = cex.place_order(request.cex_side, request.base_qty).await;

        match &cex_result {
            Ok(fill) if fill.is_filled() => {}
            Ok(fill) => {
                warn!(
                    "CEX leg not filled ({:?}, executed {}), DEX leg not submitted",
                    fill.status, fill.executed_qty
                );
                return LegOutcome {
                    cex: cex_result,
                    dex: None,
                };
            }
            Err(e) => {
                warn!("CEX leg failed, DEX leg not submitted: {}", e);
                return LegOutcome {
                    cex: cex_result,
                    dex: None,
                };
            }
        }

        let dex_result = dex.execute(&request.dex_order).await;
        LegOutcome {
            cex: cex_result,
            dex: Some(dex_result),
        }
    }
}

pub struct ConcurrentLegs;

#[async_trait]
impl LegStrategy for ConcurrentLegs {
    fn kind(&self) -> ExecutionStrategyKind {
        ExecutionStrategyKind::Concurrent
    }

    async fn run(&self, cex: &dyn CexVenue, dex: &dyn DexVenue, request: &LegRequest) -> LegOutcome {
        let (cex_result, dex_result) = tokio::join!(
            cex.place_order(request.cex_side, request.base_qty),
            dex.execute(&request.dex_order)
        );
        info!(
            "Both legs returned: CEX {}, DEX {}",
            if cex_result.is_ok() { "ok" } else { "err" },
            if dex_result.is_ok() { "ok" } else { "err" }
        );
        LegOutcome {
            cex: cex_result,
            dex: Some(dex_result),
        }
    }
}

pub fn strategy_for(kind: ExecutionStrategyKind) -> Box<dyn LegStrategy> {
    match kind {
        ExecutionStrategyKind::Sequential => Box::new(SequentialLegs),
        ExecutionStrategyKind::Concurrent => Box::new(ConcurrentLegs),
    }
}

// ── Outcome classification ────────────────────────────────────────────

/// What the two legs left behind.
#[derive(Debug)]
pub enum LegVerdict {
    /// Both legs done, positions offset.
    Completed { fill: FillReport, receipt: DexReceipt },
    /// Nothing traded anywhere.
    NoExposure { reason: String },
    /// Net base position left open; positive means long base.
    Exposed { net_base: Decimal, reason: String },
    /// A leg may or may not have executed (lost CEX response, DEX tx with
    /// no receipt). Netting would guess, so nothing is remediated.
    Unconfirmed { reason: String },
}

fn signed(side: Side, qty: Decimal) -> Decimal {
    match side {
        Side::Buy => qty,
        Side::Sell => -qty,
    }
}

/// Net the executed quantities of both legs.
pub fn classify(outcome: LegOutcome, request: &LegRequest) -> LegVerdict {
    let (fill, cex_error) = match outcome.cex {
        Ok(fill) if fill.is_filled() => (Some(fill), None),
        Ok(fill) => {
            let message = format!("CEX order {:?}, executed {}", fill.status, fill.executed_qty);
            (Some(fill), Some(message))
        }
        Err(e @ ArbError::OutcomeUnknown { .. }) => return LegVerdict::Unconfirmed { reason: e.to_string() },
        Err(e) => (None, Some(e.to_string())),
    };
    let cex_qty = fill.as_ref().map(|f| f.executed_qty).unwrap_or(Decimal::ZERO);

    let (receipt, dex_error) = match outcome.dex {
        Some(Ok(receipt)) if receipt.success => (Some(receipt), None),
        Some(Ok(receipt)) => (None, Some(format!("DEX swap {} reverted", receipt.tx_hash))),
        Some(Err(e @ (ArbError::Unconfirmed(_) | ArbError::OutcomeUnknown { .. }))) => {
            return LegVerdict::Unconfirmed { reason: e.to_string() }
        }
        Some(Err(e)) => (None, Some(e.to_string())),
        None => (None, Some("DEX leg not submitted".to_string())),
    };
    let dex_qty = if receipt.is_some() { request.base_qty } else { Decimal::ZERO };

    let net_base = signed(request.cex_side, cex_qty) + signed(request.dex_order.side, dex_qty);
    let reason = [cex_error, dex_error]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join("; ");

    if !net_base.is_zero() {
        return LegVerdict::Exposed { net_base, reason };
    }
    match (fill, receipt) {
        (Some(fill), Some(receipt)) if reason.is_empty() => LegVerdict::Completed { fill, receipt },
        _ => LegVerdict::NoExposure { reason },
    }
}
