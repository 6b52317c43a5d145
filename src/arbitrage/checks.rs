//! Pre-Trade Checks
//!
//! Both run before any leg is submitted:
//! - balances: each venue must hold what its side spends, times the safety buffer
//! - timing: the observed flashblock slot must still be inside its deadline
//!
//! Author: AI-Generated
//! Created: 2026-10-17

use crate::balances::Balances;
use crate::error::{ArbError, Result};
use crate::types::{Side, TradeSignal};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Sizing inputs for `check_pre_trade`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreTradeParams {
    pub base_qty: Decimal,
    pub quote_decimals: u32,
    pub safety_buffer: Decimal,
    /// Native balance kept on the DEX wallet for gas, on top of the base size.
    pub dex_gas_reserve: Decimal,
}

fn notional_to_decimal(notional: i128, decimals: u32) -> Result<Decimal> {
    Decimal::try_from_i128_with_scale(notional, decimals)
        .map_err(|e| ArbError::Quote(format!("notional {} not representable: {}", notional, e)))
}

fn require(label: &str, required: Decimal, available: Decimal) -> Result<()> {
    if available < required {
        return Err(ArbError::insufficient(label, required, available));
    }
    Ok(())
}

/// Fails with `InsufficientBalance` naming the first venue/asset short.
pub fn check_pre_trade(balances: &Balances, signal: &TradeSignal, params: &PreTradeParams) -> Result<()> {
    let buffer = params.safety_buffer;
    let base_required = params.base_qty * buffer;

    match signal.opportunity.cex_side {
        Side::Buy => {
            let cost = notional_to_decimal(signal.cex_notional(), params.quote_decimals)?;
            require("CEX quote", cost * buffer, balances.cex.quote)?;
        }
        Side::Sell => require("CEX base", base_required, balances.cex.base)?,
    }

    match signal.opportunity.dex_side {
        Side::Buy => {
            let cost = notional_to_decimal(signal.dex_notional(), params.quote_decimals)?;
            require("DEX quote", cost * buffer, balances.dex.quote)?;
            require("DEX gas", params.dex_gas_reserve, balances.dex.base)?;
        }
        Side::Sell => require("DEX base", base_required + params.dex_gas_reserve, balances.dex.base)?,
    }

    Ok(())
}

/// Reject slot 0 (no slot assigned yet) and anything past the slot's
/// millisecond deadline. An empty table disables the check.
pub fn check_timing(slot_index: u64, ms_of_second: u32, deadlines: &BTreeMap<u64, u32>) -> Result<()> {
    if deadlines.is_empty() {
        return Ok(());
    }
    let deadline = deadlines.get(&slot_index).copied();
    match deadline {
        Some(limit) if slot_index != 0 && ms_of_second <= limit => Ok(()),
        _ => Err(ArbError::TimingDeadlineExceeded {
            slot_index,
            ms_of_second,
            deadline_ms: deadline,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balances::VenueBalances;
    use crate::types::{NotionalValues, Opportunity};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn signal(cex_side: Side) -> TradeSignal {
        TradeSignal {
            block_number: 1,
            slot_index: 2,
            opportunity: Opportunity {
                cex_side,
                dex_side: cex_side.opposite(),
                edge: 1,
            },
            notional: NotionalValues {
                b_bid: 41_000_000,
                b_ask: 41_000_100,
                u_bid: 41_500_000,
                u_ask: 41_600_000,
            },
            detected_at: Utc::now(),
        }
    }

    fn params(buffer: Decimal) -> PreTradeParams {
        PreTradeParams {
            base_qty: dec!(0.01),
            quote_decimals: 6,
            safety_buffer: buffer,
            dex_gas_reserve: dec!(0.000001),
        }
    }

    fn balances(cex: (Decimal, Decimal), dex: (Decimal, Decimal)) -> Balances {
        Balances {
            cex: VenueBalances {
                base: cex.0,
                quote: cex.1,
            },
            dex: VenueBalances {
                base: dex.0,
                quote: dex.1,
            },
            refreshed_at: None,
        }
    }

    #[test]
    fn test_sufficient_balances() {
        let b = balances((dec!(1), dec!(200)), (dec!(8), dec!(150)));
        check_pre_trade(&b, &signal(Side::Buy), &params(dec!(1.01))).unwrap();
        check_pre_trade(&b, &signal(Side::Sell), &params(dec!(1.01))).unwrap();
    }

    #[test]
    fn test_cex_quote_insufficient_for_buy() {
        let b = balances((dec!(0.1), dec!(30)), (dec!(0.8), dec!(150)));
        let err = check_pre_trade(&b, &signal(Side::Buy), &params(dec!(1.01))).unwrap_err();
        assert!(matches!(err, ArbError::InsufficientBalance(_)));
        assert!(err.to_string().contains("CEX quote"), "{}", err);
    }

    #[test]
    fn test_dex_base_insufficient_for_sell() {
        let b = balances((dec!(1), dec!(200)), (dec!(0.001), dec!(150)));
        let err = check_pre_trade(&b, &signal(Side::Buy), &params(dec!(1.01))).unwrap_err();
        assert!(err.to_string().contains("DEX base"), "{}", err);
    }

    #[test]
    fn test_buffer_applies_to_quote() {
        // 41.0001 * 1.1 = 45.10011 on the CEX; 41.6 * 1.1 = 45.76 on the DEX.
        let b = balances((dec!(2), dec!(45.1)), (dec!(7), dec!(110)));
        assert!(check_pre_trade(&b, &signal(Side::Buy), &params(dec!(1.1))).is_err());
        let b = balances((dec!(2), dec!(45.11)), (dec!(7), dec!(110)));
        check_pre_trade(&b, &signal(Side::Buy), &params(dec!(1.1))).unwrap();
    }

    #[test]
    fn test_dex_buy_needs_gas() {
        let b = balances((dec!(1), dec!(200)), (dec!(0), dec!(150)));
        let err = check_pre_trade(&b, &signal(Side::Sell), &params(dec!(1.01))).unwrap_err();
        assert!(err.to_string().contains("DEX gas"), "{}", err);
    }

    #[test]
    fn test_timing() {
        let table: BTreeMap<u64, u32> = [(1, 80), (2, 350), (3, 570), (4, 950)].into_iter().collect();
        check_timing(2, 350, &table).unwrap();
        check_timing(4, 10, &table).unwrap();
        assert!(matches!(
            check_timing(2, 351, &table),
            Err(ArbError::TimingDeadlineExceeded {
                deadline_ms: Some(350),
                ..
            })
        ));
        assert!(check_timing(0, 0, &table).is_err(), "slot 0 always rejected");
        assert!(check_timing(7, 0, &table).is_err(), "unknown slot rejected");
        check_timing(0, 999, &BTreeMap::new()).unwrap();
    }
}
