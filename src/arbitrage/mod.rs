//! Arbitrage Module
//!
//! Opportunity detection on every processed flashblock, pre-trade checks,
//! two-leg execution with pluggable strategy and remediation, and realized PnL.
//!
//! Author: AI-Generated
//! Created: 2026-10-17

pub mod checks;
pub mod detector;
pub mod executor;
pub mod pnl;
pub mod remediation;
pub mod strategy;

pub use checks::{check_pre_trade, check_timing, PreTradeParams};
pub use detector::{detect, run_detection_loop, DetectorParams, OpportunityDetector};
pub use executor::{Dispatch, Executor, ExecutorContext, ExecutorSettings};
pub use pnl::{calculate_pnl, PnlContext};
pub use remediation::{remediation_for, Exposure, Remediation, RemediationOutcome};
pub use strategy::{strategy_for, LegOutcome, LegRequest, LegStrategy};
