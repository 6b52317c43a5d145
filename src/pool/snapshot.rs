//! Pool Snapshot Acquisition
//!
//! Reads the full tick map of the tracked v4 pool at one consistent block
//! height: initialized bitmap words across the whole tick range, tick records
//! for every set bit, plus slot0 and active liquidity from StateView.
//!
//! All reads are pinned to the block number fetched first, so the snapshot
//! and the flashblock replay queue agree on where history was cut.
//!
//! Author: AI-Generated
//! Created: 2026-10-17

use crate::contracts::{IStateView, ITickBitmapHelper};
use crate::error::{ArbError, Result};
use crate::pool::calculator::{ticks_in_word, word_range};
use crate::pool::state::Tick;
use crate::types::BotConfig;
use alloy::eips::BlockId;
use alloy::primitives::aliases::I24;
use alloy::primitives::{Address, B256, U256};
use alloy::providers::Provider;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// Tick records per getTicks call.
const TICK_BATCH_SIZE: usize = 500;

/// Pool state at `block_number`.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolSnapshot {
    pub block_number: u64,
    pub sqrt_price_x96: U256,
    pub tick: i32,
    pub liquidity: u128,
    pub ticks: Vec<(i32, Tick)>,
}

/// Anything that can produce a consistent pool snapshot.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch_snapshot(&self) -> Result<PoolSnapshot>;
}

/// Snapshot over RPC via the tick-bitmap helper and StateView contracts.
pub struct OnchainSnapshotter<P> {
    provider: Arc<P>,
    tick_bitmap_helper: Address,
    state_view: Address,
    pool_id: B256,
    tick_spacing: i32,
}

impl<P: Provider + 'static> OnchainSnapshotter<P> {
    pub fn new(provider: Arc<P>, config: &BotConfig) -> Self {
        Self {
            provider,
            tick_bitmap_helper: config.tick_bitmap_helper,
            state_view: config.state_view,
            pool_id: config.pool_id,
            tick_spacing: config.tick_spacing,
        }
    }

    async fn initialized_ticks(&self, block: BlockId) -> Result<Vec<i32>> {
        let helper = ITickBitmapHelper::new(self.tick_bitmap_helper, self.provider.clone());
        let (min_word, max_word) = word_range(self.tick_spacing);

        let words = helper
            .getTickBitmapsRange(self.pool_id, min_word, max_word)
            .block(block)
            .call()
            .await
            .map_err(|e| ArbError::Snapshot(format!("getTickBitmapsRange: {}", e)))?;

        let ticks: Vec<i32> = words
            .iter()
            .flat_map(|w| ticks_in_word(w.index, w.bitmap, self.tick_spacing))
            .collect();

        debug!(
            "Snapshot bitmap: {} words in [{}, {}], {} initialized ticks",
            words.len(),
            min_word,
            max_word,
            ticks.len()
        );
        Ok(ticks)
    }

    async fn tick_records(&self, block: BlockId, indices: &[i32]) -> Result<Vec<(i32, Tick)>> {
        let helper = ITickBitmapHelper::new(self.tick_bitmap_helper, self.provider.clone());
        let mut records = Vec::with_capacity(indices.len());

        for chunk in indices.chunks(TICK_BATCH_SIZE) {
            let request: Vec<I24> = chunk
                .iter()
                .map(|t| I24::try_from(*t))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| ArbError::Snapshot(format!("tick out of int24 range: {}", e)))?;

            let infos = helper
                .getTicks(self.pool_id, request)
                .block(block)
                .call()
                .await
                .map_err(|e| ArbError::Snapshot(format!("getTicks: {}", e)))?;

            for info in infos {
                let index = i32::try_from(info.index)
                    .map_err(|e| ArbError::Snapshot(format!("tick index: {}", e)))?;
                records.push((
                    index,
                    Tick {
                        liquidity_gross: info.liquidityGross,
                        liquidity_net: info.liquidityNet,
                    },
                ));
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl<P: Provider + 'static> SnapshotSource for OnchainSnapshotter<P> {
    async fn fetch_snapshot(&self) -> Result<PoolSnapshot> {
        let block_number = self
            .provider
            .get_block_number()
            .await
            .map_err(|e| ArbError::Snapshot(format!("get_block_number: {}", e)))?;
        let block = BlockId::number(block_number);

        let state_view = IStateView::new(self.state_view, self.provider.clone());
        let slot0_call = state_view.getSlot0(self.pool_id).block(block);
        let liquidity_call = state_view.getLiquidity(self.pool_id).block(block);
        let (slot0, liquidity, indices) = tokio::join!(
            slot0_call.call(),
            liquidity_call.call(),
            self.initialized_ticks(block)
        );

        let slot0 = slot0.map_err(|e| ArbError::Snapshot(format!("getSlot0: {}", e)))?;
        let liquidity = liquidity.map_err(|e| ArbError::Snapshot(format!("getLiquidity: {}", e)))?;
        let ticks = self.tick_records(block, &indices?).await?;

        let tick = i32::try_from(slot0.tick)
            .map_err(|e| ArbError::Snapshot(format!("slot0 tick: {}", e)))?;

        info!(
            "📸 Snapshot at block {}: {} ticks, liquidity {}, tick {}",
            block_number,
            ticks.len(),
            liquidity,
            tick
        );

        Ok(PoolSnapshot {
            block_number,
            sqrt_price_x96: U256::from(slot0.sqrtPriceX96),
            tick,
            liquidity,
            ticks,
        })
    }
}
