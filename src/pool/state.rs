//! Pool State
//!
//! In-memory Uniswap v4 pool: Q64.96 price, active liquidity, current tick and
//! the initialized tick map. Owned by the flashblock feed task (single writer);
//! everyone else sees immutable `PoolView` copies carried on block events.
//!
//! Author: AI-Generated
//! Created: 2026-10-17

use crate::error::{ArbError, Result};
use crate::pool::calculator::sqrt_price_to_price;
use crate::pool::snapshot::PoolSnapshot;
use alloy::primitives::U256;
use std::collections::BTreeMap;
use tracing::debug;

/// Liquidity bookkeeping for one initialized tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Tick {
    pub liquidity_gross: u128,
    pub liquidity_net: i128,
}

/// Immutable copy of the price fields after a processed flashblock.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PoolView {
    pub sqrt_price_x96: U256,
    pub liquidity: u128,
    pub tick: i32,
    /// token1 per token0, decimals applied (display only).
    pub price: f64,
    pub block_number: u64,
    pub index: u64,
}

#[derive(Debug, Clone)]
pub struct Pool {
    sqrt_price_x96: U256,
    liquidity: u128,
    tick: i32,
    price: f64,
    ticks: BTreeMap<i32, Tick>,
    decimals0: u32,
    decimals1: u32,
}

impl Pool {
    pub fn new(decimals0: u32, decimals1: u32) -> Self {
        Self {
            sqrt_price_x96: U256::ZERO,
            liquidity: 0,
            tick: 0,
            price: 0.0,
            ticks: BTreeMap::new(),
            decimals0,
            decimals1,
        }
    }

    /// Drop everything; used when resyncing.
    pub fn reset(&mut self) {
        self.sqrt_price_x96 = U256::ZERO;
        self.liquidity = 0;
        self.tick = 0;
        self.price = 0.0;
        self.ticks.clear();
    }

    /// Replace state with a snapshot taken at one block height.
    pub fn load_snapshot(&mut self, snapshot: &PoolSnapshot) {
        self.reset();
        for (index, tick) in &snapshot.ticks {
            if tick.liquidity_gross > 0 {
                self.ticks.insert(*index, *tick);
            }
        }
        self.set_price(snapshot.sqrt_price_x96, snapshot.liquidity, snapshot.tick);
    }

    /// Swap event: overwrite price, active liquidity and tick.
    pub fn apply_swap(&mut self, sqrt_price_x96: U256, liquidity: u128, tick: i32) {
        self.set_price(sqrt_price_x96, liquidity, tick);
    }

    /// ModifyLiquidity event. Both ends take `|delta|` into gross and the
    /// signed delta into net (added at the lower tick, subtracted at the
    /// upper). Validated in full before anything is written, so a rejected
    /// update leaves the tick map untouched.
    pub fn apply_modify_liquidity(&mut self, tick_lower: i32, tick_upper: i32, delta: i128) -> Result<()> {
        if delta == 0 {
            return Ok(());
        }
        if tick_lower >= tick_upper {
            return Err(ArbError::Divergence(format!(
                "modify liquidity with tick_lower {} >= tick_upper {}",
                tick_lower, tick_upper
            )));
        }

        let lower = self.updated_tick(tick_lower, delta.unsigned_abs(), delta)?;
        let upper = self.updated_tick(tick_upper, delta.unsigned_abs(), delta.checked_neg().ok_or_else(|| {
            ArbError::Divergence(format!("liquidity delta {} not negatable", delta))
        })?)?;

        self.store_tick(tick_lower, lower);
        self.store_tick(tick_upper, upper);

        debug!(
            "ModifyLiquidity [{}, {}] delta {} -> {} initialized ticks",
            tick_lower,
            tick_upper,
            delta,
            self.ticks.len()
        );
        Ok(())
    }

    fn updated_tick(&self, index: i32, gross_delta: u128, net_delta: i128) -> Result<Tick> {
        let current = self.ticks.get(&index).copied().unwrap_or_default();
        let gross = current.liquidity_gross.checked_add(gross_delta).ok_or_else(|| {
            ArbError::Divergence(format!(
                "tick {} gross {} overflows adding {}",
                index, current.liquidity_gross, gross_delta
            ))
        })?;
        let net = current.liquidity_net.checked_add(net_delta).ok_or_else(|| {
            ArbError::Divergence(format!("tick {} net overflow", index))
        })?;
        Ok(Tick {
            liquidity_gross: gross,
            liquidity_net: net,
        })
    }

    fn store_tick(&mut self, index: i32, tick: Tick) {
        if tick.liquidity_gross == 0 {
            self.ticks.remove(&index);
        } else {
            self.ticks.insert(index, tick);
        }
    }

    fn set_price(&mut self, sqrt_price_x96: U256, liquidity: u128, tick: i32) {
        self.sqrt_price_x96 = sqrt_price_x96;
        self.liquidity = liquidity;
        self.tick = tick;
        self.price = sqrt_price_to_price(sqrt_price_x96, self.decimals0, self.decimals1);
    }

    /// Sum of liquidity_net over every tick; zero for a consistent pool.
    pub fn net_liquidity_sum(&self) -> i128 {
        self.ticks.values().map(|t| t.liquidity_net).sum()
    }

    pub fn ticks(&self) -> &BTreeMap<i32, Tick> {
        &self.ticks
    }

    pub fn sqrt_price_x96(&self) -> U256 {
        self.sqrt_price_x96
    }

    pub fn liquidity(&self) -> u128 {
        self.liquidity
    }

    pub fn current_tick(&self) -> i32 {
        self.tick
    }

    pub fn price(&self) -> f64 {
        self.price
    }

    pub fn view(&self, block_number: u64, index: u64) -> PoolView {
        PoolView {
            sqrt_price_x96: self.sqrt_price_x96,
            liquidity: self.liquidity,
            tick: self.tick,
            price: self.price,
            block_number,
            index,
        }
    }
}
