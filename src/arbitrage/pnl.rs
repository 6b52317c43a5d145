//! Realized PnL
//!
//! PnL = proceeds - cost - (CEX commission + DEX gas), all in the quote asset.
//! CEX SELL: proceeds = CEX notional, cost = DEX transfer. CEX BUY: reversed.
//! Gas (gas used * effective price + L1 fee) is converted from the native
//! asset at the CEX fill VWAP. The result is truncated toward zero at the quote
//! asset's decimals.
//!
//! Author: AI-Generated
//! Created: 2026-10-17

use crate::contracts::IERC20;
use crate::error::{ArbError, Result};
use crate::pool::calculator::raw_to_decimal;
use crate::types::Side;
use crate::venues::{DexReceipt, FillReport};
use alloy::primitives::{Address, U256};
use alloy::sol_types::SolEvent;
use rust_decimal::{Decimal, RoundingStrategy};

/// Asset identities needed to price the two legs.
#[derive(Debug, Clone)]
pub struct PnlContext {
    pub base_symbol: String,
    pub quote_symbol: String,
    pub quote_token: Address,
    pub quote_decimals: u32,
    pub native_decimals: u32,
}

/// Quote amount moved by the first Transfer log of the quote token.
pub fn transferred_quote(receipt: &DexReceipt, quote_token: Address, decimals: u32) -> Result<Decimal> {
    let log = receipt
        .logs
        .iter()
        .find(|log| log.address == quote_token && log.topics.first() == Some(&IERC20::Transfer::SIGNATURE_HASH))
        .ok_or_else(|| ArbError::Accounting(format!("no quote Transfer log in {}", receipt.tx_hash)))?;

    let transfer = IERC20::Transfer::decode_raw_log(log.topics.iter().copied(), &log.data)
        .map_err(|e| ArbError::Accounting(format!("bad Transfer log in {}: {}", receipt.tx_hash, e)))?;

    raw_to_decimal(transfer.value, decimals)
        .ok_or_else(|| ArbError::Accounting(format!("transfer amount {} out of range", transfer.value)))
}

/// Native-asset cost of the DEX transaction, L1 data fee included.
pub fn gas_cost_native(receipt: &DexReceipt, native_decimals: u32) -> Result<Decimal> {
    let wei = receipt
        .gas_used
        .checked_mul(receipt.effective_gas_price)
        .and_then(|fee| fee.checked_add(receipt.l1_fee))
        .ok_or_else(|| ArbError::Accounting("gas cost overflows".to_string()))?;
    raw_to_decimal(U256::from(wei), native_decimals)
        .ok_or_else(|| ArbError::Accounting(format!("gas cost {} wei out of range", wei)))
}

pub fn calculate_pnl(fill: &FillReport, receipt: &DexReceipt, ctx: &PnlContext) -> Result<Decimal> {
    let vwap = fill
        .avg_price()
        .ok_or_else(|| ArbError::Accounting(format!("CEX order {} has no fills", fill.order_id)))?;
    let cex_notional = fill.quote_notional();

    let mut commission = Decimal::ZERO;
    for f in &fill.fills {
        if f.commission_asset == ctx.quote_symbol {
            commission += f.commission;
        } else if f.commission_asset == ctx.base_symbol {
            commission += f.commission * vwap;
        } else if !f.commission.is_zero() {
            return Err(ArbError::Accounting(format!(
                "commission in unsupported asset {}",
                f.commission_asset
            )));
        }
    }

    let dex_quote = transferred_quote(receipt, ctx.quote_token, ctx.quote_decimals)?;
    let gas_quote = gas_cost_native(receipt, ctx.native_decimals)? * vwap;

    let (proceeds, cost) = match fill.side {
        Side::Sell => (cex_notional, dex_quote),
        Side::Buy => (dex_quote, cex_notional),
    };

    let pnl = proceeds - cost - commission - gas_quote;
    Ok(pnl.round_dp_with_strategy(ctx.quote_decimals, RoundingStrategy::ToZero))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feeds::payload::RawLog;
    use crate::venues::{Fill, OrderStatus};
    use alloy::primitives::{Bytes, TxHash, B256};
    use rust_decimal_macros::dec;

    fn usdc() -> Address {
        Address::repeat_byte(0x15)
    }

    fn ctx() -> PnlContext {
        PnlContext {
            base_symbol: "ETH".into(),
            quote_symbol: "USDC".into(),
            quote_token: usdc(),
            quote_decimals: 6,
            native_decimals: 18,
        }
    }

    fn fill_report(side: Side, price: Decimal, commission: Decimal, asset: &str) -> FillReport {
        FillReport {
            order_id: "42".into(),
            side,
            status: OrderStatus::Filled,
            requested_qty: dec!(0.002),
            executed_qty: dec!(0.002),
            fills: vec![Fill {
                price,
                qty: dec!(0.002),
                commission,
                commission_asset: asset.into(),
            }],
        }
    }

    fn transfer_log(token: Address, amount: u64) -> RawLog {
        RawLog {
            address: token,
            topics: vec![
                IERC20::Transfer::SIGNATURE_HASH,
                B256::left_padding_from(Address::repeat_byte(0xaa).as_slice()),
                B256::left_padding_from(Address::repeat_byte(0xbb).as_slice()),
            ],
            data: Bytes::from(U256::from(amount).to_be_bytes::<32>().to_vec()),
        }
    }

    fn receipt(logs: Vec<RawLog>) -> DexReceipt {
        DexReceipt {
            tx_hash: TxHash::with_last_byte(7),
            success: true,
            block_number: Some(1),
            gas_used: 100_000,
            effective_gas_price: 100_000,
            l1_fee: 0,
            logs,
        }
    }

    #[test]
    fn test_pnl_cex_buy_dex_sell() {
        // 8.149764 - 8.15752 - 0.0000019*4078.76 - 1e-8*4078.76 = -0.0155464316
        let fill = fill_report(Side::Buy, dec!(4078.76), dec!(0.0000019), "ETH");
        let receipt = receipt(vec![transfer_log(usdc(), 0x7c5b04)]);
        assert_eq!(calculate_pnl(&fill, &receipt, &ctx()).unwrap(), dec!(-0.015546));
    }

    #[test]
    fn test_pnl_cex_sell_dex_buy() {
        // 8.4 - 8.149764 - 0.50 - 1e-8*4200
        let fill = fill_report(Side::Sell, dec!(4200), dec!(0.50), "USDC");
        let receipt = receipt(vec![transfer_log(usdc(), 0x7c5b04)]);
        assert_eq!(calculate_pnl(&fill, &receipt, &ctx()).unwrap(), dec!(-0.249806));
    }

    #[test]
    fn test_positive_pnl_truncates_down() {
        // 8.2 - 8.149764 - 0.0000041 (gas 1e-9 ETH at 4100) = 0.0502319 -> 0.050231
        let fill = fill_report(Side::Sell, dec!(4100), Decimal::ZERO, "USDC");
        let mut r = receipt(vec![transfer_log(usdc(), 0x7c5b04)]);
        r.gas_used = 10_000;
        let pnl = calculate_pnl(&fill, &r, &ctx()).unwrap();
        assert_eq!(pnl, dec!(0.050231));
    }

    #[test]
    fn test_l1_fee_is_counted() {
        let mut r = receipt(vec![]);
        r.l1_fee = 1_000_000_000_000;
        assert_eq!(gas_cost_native(&r, 18).unwrap(), dec!(0.00000101));
    }

    #[test]
    fn test_transfer_from_other_token_ignored() {
        let r = receipt(vec![transfer_log(Address::repeat_byte(0x99), 5), transfer_log(usdc(), 7)]);
        assert_eq!(transferred_quote(&r, usdc(), 6).unwrap(), dec!(0.000007));
    }

    #[test]
    fn test_missing_transfer_is_accounting_error() {
        let fill = fill_report(Side::Buy, dec!(4000), Decimal::ZERO, "USDC");
        let err = calculate_pnl(&fill, &receipt(vec![]), &ctx()).unwrap_err();
        assert!(matches!(err, ArbError::Accounting(_)));
    }

    #[test]
    fn test_unknown_commission_asset() {
        let fill = fill_report(Side::Buy, dec!(4000), dec!(0.01), "BNB");
        let receipt = receipt(vec![transfer_log(usdc(), 0x7c5b04)]);
        assert!(matches!(
            calculate_pnl(&fill, &receipt, &ctx()),
            Err(ArbError::Accounting(msg)) if msg.contains("BNB")
        ));
    }
}
