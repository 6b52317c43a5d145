//! Trade Executor
//!
//! Runs one two-leg execution at a time. A single `AtomicBool` gates entry:
//! signals arriving while an execution (or its balance refresh) is in flight
//! are dropped and counted, never queued.
//!
//! Per accepted signal:
//!   timing check -> balance check -> (dry run stops here) -> legs via the
//!   configured strategy -> classify -> remediation / PnL -> landed-slot
//!   lookup -> record -> balance refresh -> release
//!
//! Rate limits, unconfirmed DEX legs and unremediated exposure halt the
//! executor; every later signal is refused.
//!
//! Author: AI-Generated
//! Created: 2026-10-17

use crate::arbitrage::checks::{check_pre_trade, check_timing, PreTradeParams};
use crate::arbitrage::pnl::{calculate_pnl, PnlContext};
use crate::arbitrage::remediation::{Exposure, Remediation, RemediationOutcome};
use crate::arbitrage::strategy::{classify, LegRequest, LegStrategy, LegVerdict};
use crate::balances::BalanceBook;
use crate::error::ArbError;
use crate::flashblocks::FlashblockBuffer;
use crate::types::{BotConfig, ExecutionRecord, ExecutionStatus, Side, TradeSignal};
use crate::venues::{CexVenue, DexOrder, DexVenue};
use alloy::primitives::{Address, TxHash, U256};
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

const PPM: u64 = 1_000_000;
const NATIVE_DECIMALS: u32 = 18;

#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub trade_size_base: Decimal,
    pub base_amount: U256,
    pub pre_trade: PreTradeParams,
    pub slippage_ppm: u32,
    pub slot_deadlines_ms: BTreeMap<u64, u32>,
    /// New flashblocks to wait for the DEX tx to show up in.
    pub inclusion_wait_blocks: usize,
    pub live_trading: bool,
    pub pnl: PnlContext,
}

impl ExecutorSettings {
    pub fn from_config(config: &BotConfig) -> anyhow::Result<Self> {
        // Gas reserve only applies when the base asset is the native coin.
        let dex_gas_reserve = if config.base_token == Address::ZERO {
            config.dex_gas_reserve
        } else {
            Decimal::ZERO
        };

        Ok(Self {
            trade_size_base: config.trade_size_base,
            base_amount: U256::from(config.trade_size_raw()?),
            pre_trade: PreTradeParams {
                base_qty: config.trade_size_base,
                quote_decimals: config.quote_decimals,
                safety_buffer: config.safety_buffer,
                dex_gas_reserve,
            },
            slippage_ppm: config.slippage_ppm,
            slot_deadlines_ms: config.slot_deadlines_ms.clone(),
            inclusion_wait_blocks: config.flashblock_capacity * 2,
            live_trading: config.live_trading,
            pnl: PnlContext {
                base_symbol: config.base_symbol.clone(),
                quote_symbol: config.quote_symbol.clone(),
                quote_token: config.quote_token,
                quote_decimals: config.quote_decimals,
                native_decimals: NATIVE_DECIMALS,
            },
        })
    }
}

/// Everything an execution touches, built once at startup.
pub struct ExecutorContext {
    pub cex: Arc<dyn CexVenue>,
    pub dex: Arc<dyn DexVenue>,
    pub strategy: Box<dyn LegStrategy>,
    pub remediation: Box<dyn Remediation>,
    pub balances: Arc<BalanceBook>,
    pub flashblocks: Arc<FlashblockBuffer>,
    pub records: mpsc::UnboundedSender<ExecutionRecord>,
    pub settings: ExecutorSettings,
}

/// Result of `Executor::submit`.
#[derive(Debug)]
pub enum Dispatch {
    Started(JoinHandle<()>),
    Dropped,
    Halted(String),
}

struct Inner {
    ctx: ExecutorContext,
    in_flight: AtomicBool,
    dropped: AtomicU64,
    halt: OnceLock<String>,
}

/// Releases the in-flight flag when the execution task ends, however it ends.
struct InFlightGuard(Arc<Inner>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.in_flight.store(false, Ordering::Release);
    }
}

#[derive(Clone)]
pub struct Executor {
    inner: Arc<Inner>,
}

impl Executor {
    pub fn new(ctx: ExecutorContext) -> Self {
        info!(
            "⚙️  Executor: strategy {:?}, remediation {:?}, {}",
            ctx.strategy.kind(),
            ctx.remediation.policy(),
            if ctx.settings.live_trading { "LIVE" } else { "DRY RUN" }
        );
        Self {
            inner: Arc::new(Inner {
                ctx,
                in_flight: AtomicBool::new(false),
                dropped: AtomicU64::new(0),
                halt: OnceLock::new(),
            }),
        }
    }

    /// Claim the in-flight flag and spawn the execution, or drop the signal.
    pub fn submit(&self, signal: TradeSignal) -> Dispatch {
        if let Some(reason) = self.halt_reason() {
            return Dispatch::Halted(reason);
        }

        if self
            .inner
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            let dropped = self.inner.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(
                "⏭️  Execution in flight, dropping signal #{}-{} ({} dropped)",
                signal.block_number, signal.slot_index, dropped
            );
            return Dispatch::Dropped;
        }

        let guard = InFlightGuard(self.inner.clone());
        let inner = self.inner.clone();
        Dispatch::Started(tokio::spawn(async move {
            let _guard = guard;
            let record = inner.execute(&signal).await;
            let traded = !matches!(record.status, ExecutionStatus::Rejected | ExecutionStatus::DryRun);
            inner.emit(record);
            if traded {
                inner.refresh_balances().await;
            }
        }))
    }

    pub fn halt_reason(&self) -> Option<String> {
        self.inner.halt.get().cloned()
    }

    pub fn dropped_count(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    pub fn is_in_flight(&self) -> bool {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    pub async fn refresh_balances(&self) {
        self.inner.refresh_balances().await;
    }
}

impl Inner {
    fn halt(&self, reason: String) {
        error!("🛑 Executor halted: {}", reason);
        if self.halt.set(reason).is_err() {
            warn!("Executor already halted");
        }
    }

    fn emit(&self, record: ExecutionRecord) {
        if self.ctx.records.send(record).is_err() {
            warn!("Execution record sink closed");
        }
    }

    async fn refresh_balances(&self) {
        if let Err(e) = self
            .ctx
            .balances
            .refresh(self.ctx.cex.as_ref(), self.ctx.dex.as_ref())
            .await
        {
            warn!("Balance refresh failed: {}", e);
            if e.is_fatal() {
                self.halt(format!("balance refresh: {}", e));
            }
        }
    }

    fn dex_order(&self, signal: &TradeSignal) -> Result<DexOrder, ArbError> {
        let notional = u128::try_from(signal.dex_notional())
            .map_err(|_| ArbError::Quote(format!("negative DEX notional {}", signal.dex_notional())))?;
        let notional = U256::from(notional);
        let slippage = self.ctx.settings.slippage_ppm as u64;
        let side = signal.opportunity.dex_side;

        let quote_limit = match side {
            Side::Sell => notional * U256::from(PPM - slippage) / U256::from(PPM),
            Side::Buy => (notional * U256::from(PPM + slippage) + U256::from(PPM - 1)) / U256::from(PPM),
        };

        Ok(DexOrder {
            side,
            base_amount: self.ctx.settings.base_amount,
            quote_limit,
        })
    }

    async fn execute(&self, signal: &TradeSignal) -> ExecutionRecord {
        let started = Instant::now();
        let settings = &self.ctx.settings;
        let mut record = ExecutionRecord::new(signal, settings.trade_size_base, ExecutionStatus::Rejected);

        if let Err(e) = self.pre_checks(signal) {
            warn!("⛔ #{}-{} rejected: {}", signal.block_number, signal.slot_index, e);
            record.error = Some(e.to_string());
            record.elapsed_ms = started.elapsed().as_millis() as u64;
            return record;
        }

        let request = match self.dex_order(signal) {
            Ok(dex_order) => LegRequest {
                cex_side: signal.opportunity.cex_side,
                base_qty: settings.trade_size_base,
                dex_order,
            },
            Err(e) => {
                record.error = Some(e.to_string());
                record.elapsed_ms = started.elapsed().as_millis() as u64;
                return record;
            }
        };

        if !settings.live_trading {
            info!(
                "🧪 DRY RUN #{}-{}: CEX {} / DEX {} {} (limit {}), edge {}",
                signal.block_number,
                signal.slot_index,
                request.cex_side,
                request.dex_order.side,
                request.base_qty,
                request.dex_order.quote_limit,
                signal.opportunity.edge
            );
            record.status = ExecutionStatus::DryRun;
            record.elapsed_ms = started.elapsed().as_millis() as u64;
            return record;
        }

        info!(
            "🚀 Executing #{}-{}: CEX {} / DEX {} {} (edge {})",
            signal.block_number,
            signal.slot_index,
            request.cex_side,
            request.dex_order.side,
            request.base_qty,
            signal.opportunity.edge
        );

        let outcome = self
            .ctx
            .strategy
            .run(self.ctx.cex.as_ref(), self.ctx.dex.as_ref(), &request)
            .await;

        if let Ok(fill) = &outcome.cex {
            record.cex_order_id = Some(fill.order_id.clone());
            record.cex_filled_qty = Some(fill.executed_qty);
            record.cex_avg_price = fill.avg_price();
        }
        let dex_tx: Option<TxHash> = match &outcome.dex {
            Some(Ok(receipt)) => Some(receipt.tx_hash),
            Some(Err(ArbError::Unconfirmed(hash))) => hash.parse().ok(),
            _ => None,
        };
        record.dex_tx_hash = dex_tx.map(|h| h.to_string());

        let throttled = [outcome.cex.as_ref().err(), outcome.dex.as_ref().and_then(|d| d.as_ref().err())]
            .into_iter()
            .flatten()
            .find(|e| matches!(e, ArbError::RateLimit { .. }))
            .map(|e| e.to_string());

        match classify(outcome, &request) {
            LegVerdict::Completed { fill, receipt } => {
                record.status = ExecutionStatus::Completed;
                match calculate_pnl(&fill, &receipt, &settings.pnl) {
                    Ok(pnl) => {
                        record.pnl = Some(pnl);
                        if pnl.is_sign_negative() {
                            warn!("📉 Trade complete, PnL {} {}", pnl, settings.pnl.quote_symbol);
                        } else {
                            info!("💰 Trade complete, PnL {} {}", pnl, settings.pnl.quote_symbol);
                        }
                    }
                    Err(e) => {
                        warn!("Trade complete, PnL unavailable: {}", e);
                        record.error = Some(e.to_string());
                    }
                }
            }
            LegVerdict::NoExposure { reason } => {
                warn!("✖️  Execution aborted without exposure: {}", reason);
                record.status = ExecutionStatus::Aborted;
                record.error = Some(reason);
            }
            LegVerdict::Unconfirmed { reason } => {
                error!("❓ Leg outcome unknown, not remediating: {}", reason);
                record.status = ExecutionStatus::Unconfirmed;
                record.error = Some(reason.clone());
                self.halt(reason);
            }
            LegVerdict::Exposed { net_base, reason } => {
                let partial = ArbError::PartialFill(format!("net base {} open: {}", net_base, reason));
                error!("⚠️  {}", partial);
                let exposure = Exposure { net_base };
                match self.ctx.remediation.remediate(&exposure, self.ctx.cex.as_ref()).await {
                    RemediationOutcome::Unwound(fill) => {
                        record.status = ExecutionStatus::PartialUnwound;
                        record.error = Some(format!("{}; unwound via order {}", partial, fill.order_id));
                    }
                    RemediationOutcome::Halted(why) => {
                        record.status = ExecutionStatus::PartialHalted;
                        record.error = Some(format!("{}; {}", partial, why));
                        self.halt(partial.to_string());
                    }
                }
            }
        }

        if let Some(reason) = throttled {
            self.halt(reason);
        }

        if let Some(tx_hash) = dex_tx {
            self.resolve_landed_slot(&tx_hash, &mut record).await;
        }

        record.elapsed_ms = started.elapsed().as_millis() as u64;
        record
    }

    fn pre_checks(&self, signal: &TradeSignal) -> Result<(), ArbError> {
        let settings = &self.ctx.settings;
        check_timing(
            signal.slot_index,
            Utc::now().timestamp_subsec_millis(),
            &settings.slot_deadlines_ms,
        )?;
        check_pre_trade(&self.ctx.balances.snapshot(), signal, &settings.pre_trade)
    }

    async fn resolve_landed_slot(&self, tx_hash: &TxHash, record: &mut ExecutionRecord) {
        let waited = self
            .ctx
            .flashblocks
            .wait_for_inclusion(tx_hash, self.ctx.settings.inclusion_wait_blocks)
            .await;
        match waited {
            Some((block_number, index)) => {
                let co_located = self.ctx.flashblocks.get_tx_hashes(block_number, index).len();
                record.dex_landed_slot = Some((block_number, index));
                record.co_located_txs = co_located.saturating_sub(1);
                info!(
                    "📦 DEX tx {} landed in flashblock #{}-{} with {} other txs",
                    tx_hash, block_number, index, record.co_located_txs
                );
            }
            None => warn!("DEX tx {} not seen in recent flashblocks", tx_hash),
        }
    }
}
