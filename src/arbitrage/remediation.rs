//! Partial-Fill Remediation
//!
//! Invoked when the legs leave an open base position. Policy is chosen once
//! at startup:
//! - `HaltOnPartial`: leave the position, stop trading, alert
//! - `UnwindOnCex`:  flatten with a market order on the CEX; halt if that fails
//!
//! Author: AI-Generated
//! Created: 2026-10-17

use crate::types::{RemediationPolicy, Side};
use crate::venues::{CexVenue, FillReport};
use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::{error, info};

/// Open base position after execution; positive = long base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exposure {
    pub net_base: Decimal,
}

impl Exposure {
    /// CEX side that flattens the position.
    pub fn unwind_side(&self) -> Side {
        if self.net_base.is_sign_positive() {
            Side::Sell
        } else {
            Side::Buy
        }
    }

    pub fn quantity(&self) -> Decimal {
        self.net_base.abs()
    }
}

#[derive(Debug)]
pub enum RemediationOutcome {
    Unwound(FillReport),
    Halted(String),
}

#[async_trait]
pub trait Remediation: Send + Sync {
    fn policy(&self) -> RemediationPolicy;

    async fn remediate(&self, exposure: &Exposure, cex: &dyn CexVenue) -> RemediationOutcome;
}

pub struct HaltOnPartial;

#[async_trait]
impl Remediation for HaltOnPartial {
    fn policy(&self) -> RemediationPolicy {
        RemediationPolicy::Halt
    }

    async fn remediate(&self, exposure: &Exposure, _cex: &dyn CexVenue) -> RemediationOutcome {
        let reason = format!(
            "open base position {} left for operator (policy: halt)",
            exposure.net_base
        );
        error!("🛑 {}", reason);
        RemediationOutcome::Halted(reason)
    }
}

pub struct UnwindOnCex;

#[async_trait]
impl Remediation for UnwindOnCex {
    fn policy(&self) -> RemediationPolicy {
        RemediationPolicy::Unwind
    }

    async fn remediate(&self, exposure: &Exposure, cex: &dyn CexVenue) -> RemediationOutcome {
        let side = exposure.unwind_side();
        let qty = exposure.quantity();
        info!("↩️  Unwinding {} {} on {}", side, qty, cex.name());

        match cex.place_order(side, qty).await {
            Ok(fill) if fill.is_filled() => {
                info!("✅ Unwind filled at {:?}", fill.avg_price());
                RemediationOutcome::Unwound(fill)
            }
            Ok(fill) => {
                let reason = format!(
                    "unwind {} {} not filled ({:?}, executed {})",
                    side, qty, fill.status, fill.executed_qty
                );
                error!("🛑 {}", reason);
                RemediationOutcome::Halted(reason)
            }
            Err(e) => {
                let reason = format!("unwind {} {} failed: {}", side, qty, e);
                error!("🛑 {}", reason);
                RemediationOutcome::Halted(reason)
            }
        }
    }
}

pub fn remediation_for(policy: RemediationPolicy) -> Box<dyn Remediation> {
    match policy {
        RemediationPolicy::Halt => Box::new(HaltOnPartial),
        RemediationPolicy::Unwind => Box::new(UnwindOnCex),
    }
}
