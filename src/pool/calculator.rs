//! Price Calculator
//!
//! Q64.96 sqrt-price math for the tracked Uniswap v4 pool: human-readable
//! price, within-tick swap quotes, tick-bitmap word helpers and unit
//! conversions between raw token amounts and decimals.
//!
//! Quotes mirror Uniswap SqrtPriceMath rounding (input rounded up, output
//! rounded down) and stay inside the active tick: sizes this engine trades are
//! orders of magnitude below the liquidity of one tick.
//!
//! Author: AI-Generated
//! Created: 2026-10-17

use crate::pool::state::PoolView;
use alloy::primitives::U256;
use rust_decimal::Decimal;

/// 2^96
pub const Q96: U256 = U256::from_limbs([0, 1 << 32, 0, 0]);

pub const MIN_TICK: i32 = -887272;
pub const MAX_TICK: i32 = 887272;

const FEE_DENOMINATOR: u64 = 1_000_000;

// ── Price ─────────────────────────────────────────────────────────────

/// Lossy U256 -> f64 (display/diagnostics only).
pub fn u256_to_f64(value: U256) -> f64 {
    value
        .as_limbs()
        .iter()
        .enumerate()
        .map(|(i, limb)| *limb as f64 * 2f64.powi(64 * i as i32))
        .sum()
}

/// price = (sqrtPriceX96 / 2^96)^2 * 10^(decimals0 - decimals1)
pub fn sqrt_price_to_price(sqrt_price_x96: U256, decimals0: u32, decimals1: u32) -> f64 {
    let ratio = u256_to_f64(sqrt_price_x96) / 2f64.powi(96);
    ratio * ratio * 10f64.powi(decimals0 as i32 - decimals1 as i32)
}

// ── SqrtPriceMath ─────────────────────────────────────────────────────

fn div_rounding_up(numerator: U256, denominator: U256) -> Option<U256> {
    if denominator.is_zero() {
        return None;
    }
    let quotient = numerator / denominator;
    if (numerator % denominator).is_zero() {
        Some(quotient)
    } else {
        quotient.checked_add(U256::from(1))
    }
}

/// getNextSqrtPriceFromAmount0RoundingUp
///
/// Adding token0 moves the price down, removing it moves the price up.
///
/// Primary formula:
///   add:    ceil(numerator1 * sqrtP / (numerator1 + amount * sqrtP))
///   remove: ceil(numerator1 * sqrtP / (numerator1 - amount * sqrtP))
///   where numerator1 = liquidity << 96
///
/// Fallback when numerator1 * sqrtP overflows:
///   ceil(numerator1 / (numerator1 / sqrtP +- amount))
pub fn next_sqrt_price_from_amount0(
    sqrt_price_x96: U256,
    liquidity: u128,
    amount: U256,
    add: bool,
) -> Option<U256> {
    if amount.is_zero() {
        return Some(sqrt_price_x96);
    }
    if sqrt_price_x96.is_zero() || liquidity == 0 {
        return None;
    }

    let numerator1: U256 = U256::from(liquidity) << 96;

    if let (Some(product), Some(full_num)) = (
        amount.checked_mul(sqrt_price_x96),
        numerator1.checked_mul(sqrt_price_x96),
    ) {
        let denominator = if add {
            numerator1.checked_add(product)
        } else {
            numerator1.checked_sub(product)
        };
        if let Some(denominator) = denominator.filter(|d| !d.is_zero()) {
            return div_rounding_up(full_num, denominator).filter(|r| !r.is_zero());
        }
        if !add {
            // Removing at least all virtual token0 reserves.
            return None;
        }
    }

    let quotient = numerator1 / sqrt_price_x96;
    let denominator = if add {
        quotient.checked_add(amount)?
    } else {
        quotient.checked_sub(amount)?
    };
    div_rounding_up(numerator1, denominator).filter(|r| !r.is_zero())
}

/// getAmount1Delta: liquidity * |sqrtB - sqrtA| / 2^96
pub fn amount1_delta(sqrt_a: U256, sqrt_b: U256, liquidity: u128, round_up: bool) -> Option<U256> {
    let (lower, upper) = if sqrt_a <= sqrt_b {
        (sqrt_a, sqrt_b)
    } else {
        (sqrt_b, sqrt_a)
    };
    let product = U256::from(liquidity).checked_mul(upper - lower)?;
    if round_up {
        div_rounding_up(product, Q96)
    } else {
        Some(product / Q96)
    }
}

// ── Quotes (token0 = base, token1 = quote) ────────────────────────────

/// Token1 received for selling exactly `amount_in` token0, pool fee
/// deducted from the input.
pub fn quote_exact_input_token0(pool: &PoolView, amount_in: U256, fee_ppm: u32) -> Option<U256> {
    if pool.liquidity == 0 || pool.sqrt_price_x96.is_zero() {
        return None;
    }
    let fee_keep = U256::from(FEE_DENOMINATOR - fee_ppm as u64);
    let amount_after_fee = amount_in.checked_mul(fee_keep)? / U256::from(FEE_DENOMINATOR);
    let next = next_sqrt_price_from_amount0(pool.sqrt_price_x96, pool.liquidity, amount_after_fee, true)?;
    amount1_delta(next, pool.sqrt_price_x96, pool.liquidity, false)
}

/// Token1 paid for buying exactly `amount_out` token0, grossed up by the
/// pool fee and rounded up.
pub fn quote_exact_output_token0(pool: &PoolView, amount_out: U256, fee_ppm: u32) -> Option<U256> {
    if pool.liquidity == 0 || pool.sqrt_price_x96.is_zero() {
        return None;
    }
    let next = next_sqrt_price_from_amount0(pool.sqrt_price_x96, pool.liquidity, amount_out, false)?;
    let amount_in_net = amount1_delta(pool.sqrt_price_x96, next, pool.liquidity, true)?;
    let fee_keep = U256::from(FEE_DENOMINATOR - fee_ppm as u64);
    div_rounding_up(amount_in_net.checked_mul(U256::from(FEE_DENOMINATOR))?, fee_keep)
}

// ── Tick bitmap ───────────────────────────────────────────────────────

/// floor(tick / spacing)
pub fn compress_tick(tick: i32, tick_spacing: i32) -> i32 {
    tick.div_euclid(tick_spacing)
}

/// Bitmap word holding `tick`.
pub fn tick_to_word(tick: i32, tick_spacing: i32) -> i16 {
    (compress_tick(tick, tick_spacing) >> 8) as i16
}

/// Word range covering MIN_TICK..=MAX_TICK.
pub fn word_range(tick_spacing: i32) -> (i16, i16) {
    (
        tick_to_word(MIN_TICK, tick_spacing),
        tick_to_word(MAX_TICK, tick_spacing),
    )
}

/// Initialized ticks encoded by one bitmap word.
pub fn ticks_in_word(word: i16, bitmap: U256, tick_spacing: i32) -> Vec<i32> {
    (0..256usize)
        .filter(|bit| bitmap.bit(*bit))
        .map(|bit| ((word as i32) * 256 + bit as i32) * tick_spacing)
        .collect()
}

// ── Unit conversion ───────────────────────────────────────────────────

/// Decimal amount -> smallest units, truncating extra precision.
pub fn decimal_to_raw(value: Decimal, decimals: u32) -> Option<u128> {
    if value.is_sign_negative() {
        return None;
    }
    let mantissa = u128::try_from(value.mantissa()).ok()?;
    let scale = value.scale();
    if decimals >= scale {
        mantissa.checked_mul(10u128.checked_pow(decimals - scale)?)
    } else {
        Some(mantissa / 10u128.checked_pow(scale - decimals)?)
    }
}

/// 10^decimals as a Decimal (decimals <= 28).
pub fn pow10(decimals: u32) -> Option<Decimal> {
    let value = 10i128.checked_pow(decimals)?;
    Decimal::try_from_i128_with_scale(value, 0).ok()
}

/// Smallest units -> Decimal, exact.
pub fn raw_to_decimal(raw: U256, decimals: u32) -> Option<Decimal> {
    let raw = i128::try_from(u256_to_u128(raw)?).ok()?;
    Decimal::try_from_i128_with_scale(raw, decimals).ok()
}

pub fn u256_to_u128(value: U256) -> Option<u128> {
    if value > U256::from(u128::MAX) {
        None
    } else {
        Some(value.to::<u128>())
    }
}

pub fn u256_to_i128(value: U256) -> Option<i128> {
    u256_to_u128(value).and_then(|v| i128::try_from(v).ok())
}
