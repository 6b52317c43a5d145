//! Flashblock Pool Feed
//!
//! Rebuilds the tracked Uniswap v4 pool from the flashblocks stream.
//!
//! State machine:
//!   Uninitialized -> Buffering -> Synced -> Resyncing -> Buffering ...
//!
//! - Every payload first passes the sequence check: a non-zero index must be
//!   previous+1 in the same block (and below the slot count); index 0 must
//!   open block previous+1. A mismatch forces a resync.
//! - Buffering: payloads queue for replay; the pool is not touched.
//! - Snapshot: tick map + slot0 at one block; replay applies queued payloads
//!   with block_number strictly greater than the snapshot block, in order.
//! - Synced: successful receipts' PoolManager logs for our pool id are
//!   applied (Swap, ModifyLiquidity). Donate and any inconsistency resync.
//!
//! After each processed payload the feed registers the flashblock's tx hashes
//! and emits `BlockProcessed` on a channel for the detector.
//!
//! The core is synchronous (`on_payload`, `apply_snapshot` return the action
//! to take); `run_flashblock_feed` drives it from the frame queue and runs
//! snapshot fetches concurrently.
//!
//! Author: AI-Generated
//! Created: 2026-10-17

use crate::contracts::IPoolManager;
use crate::error::{ArbError, Result};
use crate::feeds::payload::{decode_frame, FlashblockPayload, RawLog};
use crate::feeds::queue::QueueReceiver;
use crate::flashblocks::FlashblockBuffer;
use crate::pool::snapshot::{PoolSnapshot, SnapshotSource};
use crate::pool::state::{Pool, PoolView};
use crate::types::BotConfig;
use alloy::primitives::{Address, B256, U256};
use alloy::sol_types::SolEvent;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Emitted after every flashblock applied to a synced pool.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockProcessed {
    pub block_number: u64,
    pub index: u64,
    pub pool: PoolView,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Uninitialized,
    /// Waiting for snapshot `generation`.
    Buffering { generation: u64 },
    Synced { snapshot_block: u64 },
    /// Transitional: state discarded, snapshot about to be requested.
    Resyncing,
}

/// What the driver must do after feeding the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedAction {
    Continue,
    RequestSnapshot { generation: u64 },
}

#[derive(Debug, Clone)]
pub struct FeedSettings {
    pub pool_manager: Address,
    pub pool_id: B256,
    pub slot_count: u64,
    pub decimals0: u32,
    pub decimals1: u32,
}

impl FeedSettings {
    pub fn from_config(config: &BotConfig) -> Self {
        Self {
            pool_manager: config.pool_manager,
            pool_id: config.pool_id,
            slot_count: config.slot_count,
            decimals0: config.base_decimals,
            decimals1: config.quote_decimals,
        }
    }
}

pub struct FlashblockFeed {
    settings: FeedSettings,
    pool: Pool,
    state: SyncState,
    replay: Vec<FlashblockPayload>,
    /// (block_number, index) of the last payload seen.
    last: Option<(u64, u64)>,
    generation: u64,
    resyncs: u64,
    flashblocks: Arc<FlashblockBuffer>,
    events: mpsc::UnboundedSender<BlockProcessed>,
}

impl FlashblockFeed {
    pub fn new(
        settings: FeedSettings,
        flashblocks: Arc<FlashblockBuffer>,
        events: mpsc::UnboundedSender<BlockProcessed>,
    ) -> Self {
        let pool = Pool::new(settings.decimals0, settings.decimals1);
        Self {
            settings,
            pool,
            state: SyncState::Uninitialized,
            replay: Vec::new(),
            last: None,
            generation: 0,
            resyncs: 0,
            flashblocks,
            events,
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn resync_count(&self) -> u64 {
        self.resyncs
    }

    pub fn replay_len(&self) -> usize {
        self.replay.len()
    }

    /// Request the initial snapshot.
    pub fn start(&mut self) -> FeedAction {
        self.request_snapshot()
    }

    fn request_snapshot(&mut self) -> FeedAction {
        self.generation += 1;
        self.state = SyncState::Buffering {
            generation: self.generation,
        };
        FeedAction::RequestSnapshot {
            generation: self.generation,
        }
    }

    /// Discard pool state and queued payloads, then ask for a fresh snapshot.
    fn resync(&mut self, reason: &ArbError) -> FeedAction {
        self.state = SyncState::Resyncing;
        self.resyncs += 1;
        warn!("🔄 Resync #{}: {}", self.resyncs, reason);
        self.pool.reset();
        self.replay.clear();
        self.request_snapshot()
    }

    /// Sequence check. Tracking always moves to the current payload, so a
    /// single skipped slot yields a single gap.
    fn check_sequence(&mut self, block_number: u64, index: u64) -> Result<()> {
        let previous = self.last.replace((block_number, index));
        let Some((last_block, last_index)) = previous else {
            return Ok(());
        };

        let (expected_block, expected_index) = if index == 0 {
            (last_block + 1, 0)
        } else {
            (last_block, last_index + 1)
        };

        if block_number == expected_block && index == expected_index && index < self.settings.slot_count {
            Ok(())
        } else {
            Err(ArbError::SequenceGap {
                expected_block,
                expected_index,
                block: block_number,
                index,
            })
        }
    }

    /// Feed one decoded payload.
    pub fn on_payload(&mut self, payload: FlashblockPayload) -> FeedAction {
        if let Err(gap) = self.check_sequence(payload.block_number(), payload.index) {
            let action = self.resync(&gap);
            self.replay.push(payload);
            return action;
        }

        match self.state {
            SyncState::Synced { .. } => match self.process_block(&payload) {
                Ok(()) => FeedAction::Continue,
                Err(e) => {
                    let action = self.resync(&e);
                    self.replay.push(payload);
                    action
                }
            },
            SyncState::Uninitialized | SyncState::Buffering { .. } | SyncState::Resyncing => {
                self.replay.push(payload);
                FeedAction::Continue
            }
        }
    }

    /// Install a snapshot and replay everything newer than it.
    pub fn apply_snapshot(&mut self, generation: u64, snapshot: PoolSnapshot) -> FeedAction {
        match self.state {
            SyncState::Buffering { generation: wanted } if wanted == generation => {}
            _ => {
                debug!(
                    "Ignoring stale snapshot generation {} (current {}, state {:?})",
                    generation, self.generation, self.state
                );
                return FeedAction::Continue;
            }
        }

        self.pool.load_snapshot(&snapshot);
        let net = self.pool.net_liquidity_sum();
        if net != 0 {
            warn!(
                "Snapshot at block {} violates liquidity conservation (sum net = {})",
                snapshot.block_number, net
            );
        }

        self.state = SyncState::Synced {
            snapshot_block: snapshot.block_number,
        };

        let queued = std::mem::take(&mut self.replay);
        let total = queued.len();
        let mut replayed = 0usize;
        let mut pending = queued.into_iter();

        while let Some(payload) = pending.next() {
            if payload.block_number() <= snapshot.block_number {
                continue;
            }
            if let Err(e) = self.process_block(&payload) {
                let action = self.resync(&e);
                self.replay.push(payload);
                self.replay.extend(pending);
                return action;
            }
            replayed += 1;
        }

        info!(
            "✅ Pool synced at block {}: {} ticks, price {:.4}, replayed {}/{} buffered flashblocks",
            snapshot.block_number,
            self.pool.ticks().len(),
            self.pool.price(),
            replayed,
            total
        );
        FeedAction::Continue
    }

    fn process_block(&mut self, payload: &FlashblockPayload) -> Result<()> {
        let block_number = payload.block_number();
        let mut tx_hashes = Vec::with_capacity(payload.metadata.receipts.len());

        // Reverted transactions neither touch the pool nor count as co-located.
        for receipt in payload.metadata.receipts.iter().filter(|r| r.success) {
            tx_hashes.push(receipt.tx_hash);
            for log in &receipt.logs {
                self.apply_log(log)?;
            }
        }

        if !tx_hashes.is_empty() {
            self.flashblocks.add_block(block_number, payload.index, tx_hashes);
        }

        let event = BlockProcessed {
            block_number,
            index: payload.index,
            pool: self.pool.view(block_number, payload.index),
        };
        if self.events.send(event).is_err() {
            debug!("BlockProcessed receiver dropped");
        }
        Ok(())
    }

    /// Apply one log. Malformed events are skipped; divergence is returned.
    fn apply_log(&mut self, log: &RawLog) -> Result<()> {
        if log.address != self.settings.pool_manager {
            return Ok(());
        }
        let (Some(topic0), Some(pool_id)) = (log.topics.first(), log.topics.get(1)) else {
            return Ok(());
        };
        if *pool_id != self.settings.pool_id {
            return Ok(());
        }

        match *topic0 {
            IPoolManager::Swap::SIGNATURE_HASH => {
                let swap = match IPoolManager::Swap::decode_raw_log(log.topics.iter().copied(), &log.data) {
                    Ok(event) => event,
                    Err(e) => {
                        warn!("Skipping malformed Swap log: {}", e);
                        return Ok(());
                    }
                };
                let tick = match i32::try_from(swap.tick) {
                    Ok(tick) => tick,
                    Err(e) => {
                        warn!("Skipping Swap with bad tick: {}", e);
                        return Ok(());
                    }
                };
                self.pool
                    .apply_swap(U256::from(swap.sqrtPriceX96), swap.liquidity, tick);
                debug!(
                    "Swap: amount0 {} amount1 {} tick {} liquidity {}",
                    swap.amount0, swap.amount1, tick, swap.liquidity
                );
            }
            IPoolManager::ModifyLiquidity::SIGNATURE_HASH => {
                let modify =
                    match IPoolManager::ModifyLiquidity::decode_raw_log(log.topics.iter().copied(), &log.data) {
                        Ok(event) => event,
                        Err(e) => {
                            warn!("Skipping malformed ModifyLiquidity log: {}", e);
                            return Ok(());
                        }
                    };
                let (Ok(lower), Ok(upper)) = (i32::try_from(modify.tickLower), i32::try_from(modify.tickUpper))
                else {
                    warn!("Skipping ModifyLiquidity with bad ticks");
                    return Ok(());
                };
                let delta = i128::try_from(modify.liquidityDelta).map_err(|_| {
                    ArbError::Divergence(format!(
                        "liquidity delta {} exceeds int128",
                        modify.liquidityDelta
                    ))
                })?;
                self.pool.apply_modify_liquidity(lower, upper, delta)?;
            }
            IPoolManager::Donate::SIGNATURE_HASH => {
                return Err(ArbError::Divergence("Donate event on tracked pool".into()));
            }
            _ => {}
        }
        Ok(())
    }
}

/// Drive the feed from raw frames until the stream closes or a snapshot fails.
pub async fn run_flashblock_feed(
    mut feed: FlashblockFeed,
    snapshots: Arc<dyn SnapshotSource>,
    mut frames: QueueReceiver<Vec<u8>>,
) -> Result<()> {
    let (snapshot_tx, mut snapshot_rx) = mpsc::unbounded_channel::<(u64, Result<PoolSnapshot>)>();
    let mut action = feed.start();
    info!("⚡ Flashblock feed started");

    loop {
        if let FeedAction::RequestSnapshot { generation } = action {
            info!("📸 Requesting pool snapshot (generation {})", generation);
            let source = snapshots.clone();
            let tx = snapshot_tx.clone();
            tokio::spawn(async move {
                let result = source.fetch_snapshot().await;
                let _ = tx.send((generation, result));
            });
        }

        action = tokio::select! {
            frame = frames.recv() => match frame {
                Some(frame) => match decode_frame(&frame) {
                    Ok(payload) => feed.on_payload(payload),
                    Err(e) => {
                        warn!("Dropping flashblock frame: {}", e);
                        FeedAction::Continue
                    }
                },
                None => {
                    return Err(ArbError::venue("flashblocks", "flashblock stream closed"));
                }
            },
            Some((generation, result)) = snapshot_rx.recv() => match result {
                Ok(snapshot) => feed.apply_snapshot(generation, snapshot),
                Err(e) if generation == feed.generation() => return Err(e),
                Err(e) => {
                    debug!("Stale snapshot generation {} failed: {}", generation, e);
                    FeedAction::Continue
                }
            },
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feeds::payload::{FlashblockMetadata, FlashblockReceipt};
    use crate::feeds::queue::monitored_channel;
    use crate::pool::calculator::Q96;
    use crate::pool::state::Tick;
    use alloy::primitives::aliases::{I24, U160, U24};
    use alloy::primitives::{I256, TxHash};
    use async_trait::async_trait;
    use std::time::Duration;

    const POOL_MANAGER: Address = Address::repeat_byte(0x11);
    const POOL_ID: B256 = B256::repeat_byte(0x42);

    fn settings() -> FeedSettings {
        FeedSettings {
            pool_manager: POOL_MANAGER,
            pool_id: POOL_ID,
            slot_count: 5,
            decimals0: 18,
            decimals1: 18,
        }
    }

    fn feed() -> (FlashblockFeed, mpsc::UnboundedReceiver<BlockProcessed>, Arc<FlashblockBuffer>) {
        let buffer = Arc::new(FlashblockBuffer::new(20));
        let (tx, rx) = mpsc::unbounded_channel();
        (FlashblockFeed::new(settings(), buffer.clone(), tx), rx, buffer)
    }

    fn raw(event_data: alloy::primitives::LogData) -> RawLog {
        RawLog {
            address: POOL_MANAGER,
            topics: event_data.topics().to_vec(),
            data: event_data.data,
        }
    }

    fn swap_log(sqrt_price: U256, liquidity: u128, tick: i32) -> RawLog {
        raw(IPoolManager::Swap {
            id: POOL_ID,
            sender: Address::repeat_byte(0x99),
            amount0: -1_000,
            amount1: 4_000,
            sqrtPriceX96: U160::from(sqrt_price),
            liquidity,
            tick: I24::try_from(tick).unwrap(),
            fee: U24::from_limbs([500]),
        }
        .encode_log_data())
    }

    fn modify_log(lower: i32, upper: i32, delta: i128) -> RawLog {
        raw(IPoolManager::ModifyLiquidity {
            id: POOL_ID,
            sender: Address::repeat_byte(0x99),
            tickLower: I24::try_from(lower).unwrap(),
            tickUpper: I24::try_from(upper).unwrap(),
            liquidityDelta: I256::try_from(delta).unwrap(),
            salt: B256::ZERO,
        }
        .encode_log_data())
    }

    fn donate_log() -> RawLog {
        raw(IPoolManager::Donate {
            id: POOL_ID,
            sender: Address::repeat_byte(0x99),
            amount0: U256::from(1u64),
            amount1: U256::from(1u64),
        }
        .encode_log_data())
    }

    fn payload(block_number: u64, index: u64, logs: Vec<RawLog>) -> FlashblockPayload {
        FlashblockPayload {
            index,
            metadata: FlashblockMetadata {
                block_number,
                receipts: vec![FlashblockReceipt {
                    tx_hash: TxHash::left_padding_from(&(block_number * 100 + index).to_be_bytes()),
                    success: true,
                    logs,
                }],
            },
        }
    }

    fn snapshot(block_number: u64) -> PoolSnapshot {
        PoolSnapshot {
            block_number,
            sqrt_price_x96: Q96,
            tick: 0,
            liquidity: 1_000,
            ticks: vec![
                (-100, Tick { liquidity_gross: 1_000, liquidity_net: 1_000 }),
                (100, Tick { liquidity_gross: 1_000, liquidity_net: -1_000 }),
            ],
        }
    }

    fn synced_feed(at_block: u64) -> (FlashblockFeed, mpsc::UnboundedReceiver<BlockProcessed>, Arc<FlashblockBuffer>) {
        let (mut feed, rx, buffer) = feed();
        assert_eq!(feed.start(), FeedAction::RequestSnapshot { generation: 1 });
        feed.apply_snapshot(1, snapshot(at_block));
        assert!(matches!(feed.state(), SyncState::Synced { .. }));
        (feed, rx, buffer)
    }

    #[test]
    fn test_gap_at_index_four_triggers_single_resync() {
        let (mut feed, _rx, _buffer) = synced_feed(99);
        let actions: Vec<FeedAction> = [0u64, 1, 2, 4]
            .iter()
            .map(|&i| feed.on_payload(payload(100, i, vec![])))
            .collect();

        let requests: Vec<usize> = actions
            .iter()
            .enumerate()
            .filter(|(_, a)| matches!(a, FeedAction::RequestSnapshot { .. }))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(requests, vec![3], "exactly one resync, at the slot-4 payload");
        assert_eq!(feed.resync_count(), 1);
        assert_eq!(feed.state(), SyncState::Buffering { generation: 2 });
        assert_eq!(feed.replay_len(), 1, "the gapped payload is buffered for replay");

        // Stream continues normally after the gap.
        assert_eq!(feed.on_payload(payload(101, 0, vec![])), FeedAction::Continue);
    }

    #[test]
    fn test_block_boundary_rules() {
        let (mut feed, _rx, _buffer) = synced_feed(99);
        assert_eq!(feed.on_payload(payload(100, 0, vec![])), FeedAction::Continue);
        assert_eq!(feed.on_payload(payload(100, 1, vec![])), FeedAction::Continue);
        // Early block end: index 0 of the next block is fine.
        assert_eq!(feed.on_payload(payload(101, 0, vec![])), FeedAction::Continue);
        // Skipping a whole block is a gap.
        assert!(matches!(
            feed.on_payload(payload(103, 0, vec![])),
            FeedAction::RequestSnapshot { .. }
        ));
    }

    #[test]
    fn test_index_beyond_slot_count_is_gap() {
        let (mut feed, _rx, _buffer) = synced_feed(99);
        for i in 0..5 {
            assert_eq!(feed.on_payload(payload(100, i, vec![])), FeedAction::Continue);
        }
        assert!(matches!(
            feed.on_payload(payload(100, 5, vec![])),
            FeedAction::RequestSnapshot { .. }
        ));
    }

    #[test]
    fn test_swap_applied_and_block_processed_emitted() {
        let (mut feed, mut rx, buffer) = synced_feed(99);
        let sqrt = Q96 * U256::from(2u64);
        feed.on_payload(payload(100, 0, vec![]));
        let fb = payload(100, 1, vec![swap_log(sqrt, 5_000, 13_863)]);
        let tx_hash = fb.metadata.receipts[0].tx_hash;
        assert_eq!(feed.on_payload(fb), FeedAction::Continue);

        assert_eq!(feed.pool().sqrt_price_x96(), sqrt);
        assert_eq!(feed.pool().liquidity(), 5_000);
        assert_eq!(feed.pool().current_tick(), 13_863);
        assert!((feed.pool().price() - 4.0).abs() < 1e-9);

        let _first = rx.try_recv().unwrap();
        let event = rx.try_recv().unwrap();
        assert_eq!((event.block_number, event.index), (100, 1));
        assert_eq!(event.pool.liquidity, 5_000);
        assert_eq!(buffer.lookup(&tx_hash), Some((100, 1)));
    }

    #[test]
    fn test_foreign_logs_ignored() {
        let (mut feed, _rx, _buffer) = synced_feed(99);
        let mut other_pool = swap_log(Q96 * U256::from(3u64), 1, 1);
        other_pool.topics[1] = B256::repeat_byte(0x01);
        let mut other_address = swap_log(Q96 * U256::from(3u64), 1, 1);
        other_address.address = Address::repeat_byte(0x22);

        feed.on_payload(payload(100, 0, vec![other_pool, other_address]));
        assert_eq!(feed.pool().sqrt_price_x96(), Q96, "untouched");
    }

    #[test]
    fn test_failed_receipt_logs_not_applied() {
        let (mut feed, _rx, buffer) = synced_feed(99);
        let mut fb = payload(100, 0, vec![swap_log(Q96 * U256::from(3u64), 1, 1)]);
        fb.metadata.receipts[0].success = false;
        let tx_hash = fb.metadata.receipts[0].tx_hash;
        feed.on_payload(fb);
        assert_eq!(feed.pool().sqrt_price_x96(), Q96);
        assert_eq!(buffer.lookup(&tx_hash), None, "reverted tx not registered");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_only_successful_receipts_registered() {
        let (mut feed, _rx, buffer) = synced_feed(99);
        let mut fb = payload(100, 0, vec![]);
        let ok = fb.metadata.receipts[0].tx_hash;
        let reverted = TxHash::repeat_byte(0xee);
        let also_ok = TxHash::repeat_byte(0xef);
        fb.metadata.receipts.push(FlashblockReceipt {
            tx_hash: reverted,
            success: false,
            logs: vec![],
        });
        fb.metadata.receipts.push(FlashblockReceipt {
            tx_hash: also_ok,
            success: true,
            logs: vec![],
        });
        feed.on_payload(fb);

        assert_eq!(buffer.get_tx_hashes(100, 0), vec![ok, also_ok]);
        assert_eq!(buffer.lookup(&reverted), None);
        assert_eq!(buffer.lookup(&also_ok), Some((100, 0)));
    }

    #[test]
    fn test_modify_liquidity_applied() {
        let (mut feed, _rx, _buffer) = synced_feed(99);
        feed.on_payload(payload(100, 0, vec![modify_log(-100, 200, 500)]));
        let ticks = feed.pool().ticks();
        assert_eq!(ticks[&-100], Tick { liquidity_gross: 1_500, liquidity_net: 1_500 });
        assert_eq!(ticks[&200], Tick { liquidity_gross: 500, liquidity_net: -500 });
        assert_eq!(feed.pool().net_liquidity_sum(), 0);
    }

    #[test]
    fn test_malformed_event_skipped_without_resync() {
        let (mut feed, _rx, _buffer) = synced_feed(99);
        let mut broken = swap_log(Q96, 1, 1);
        broken.data = alloy::primitives::Bytes::from(vec![0u8; 7]);
        assert_eq!(feed.on_payload(payload(100, 0, vec![broken])), FeedAction::Continue);
        assert_eq!(feed.resync_count(), 0);
        assert!(matches!(feed.state(), SyncState::Synced { .. }));
    }

    #[test]
    fn test_donate_triggers_resync() {
        let (mut feed, _rx, _buffer) = synced_feed(99);
        let action = feed.on_payload(payload(100, 0, vec![donate_log()]));
        assert_eq!(action, FeedAction::RequestSnapshot { generation: 2 });
        assert!(feed.pool().ticks().is_empty(), "state discarded");
    }

    #[test]
    fn test_divergence_triggers_resync() {
        let (mut feed, _rx, _buffer) = synced_feed(99);
        let action = feed.on_payload(payload(100, 0, vec![modify_log(600, 500, 1)]));
        assert!(matches!(action, FeedAction::RequestSnapshot { .. }));
        assert_eq!(feed.resync_count(), 1);
    }

    #[test]
    fn test_buffer_then_replay_newer_blocks_only() {
        let (mut feed, mut rx, _buffer) = feed();
        feed.start();
        let sqrt_old = Q96 * U256::from(3u64);
        let sqrt_new = Q96 * U256::from(2u64);

        feed.on_payload(payload(100, 0, vec![swap_log(sqrt_old, 1, 1)]));
        feed.on_payload(payload(101, 0, vec![swap_log(sqrt_new, 7, 2)]));
        assert_eq!(feed.replay_len(), 2);
        assert!(feed.pool().sqrt_price_x96().is_zero(), "no mutation while buffering");
        assert!(rx.try_recv().is_err(), "no signals before sync");

        feed.apply_snapshot(1, snapshot(100));
        assert_eq!(feed.state(), SyncState::Synced { snapshot_block: 100 });
        assert_eq!(feed.pool().sqrt_price_x96(), sqrt_new, "block 100 skipped, 101 replayed");
        assert_eq!(feed.pool().liquidity(), 7);
        assert_eq!(rx.try_recv().unwrap().block_number, 101);
        assert!(rx.try_recv().is_err());
        assert_eq!(feed.replay_len(), 0);
    }

    #[test]
    fn test_stale_snapshot_ignored() {
        let (mut feed, _rx, _buffer) = synced_feed(99);
        feed.on_payload(payload(100, 0, vec![]));
        feed.on_payload(payload(100, 3, vec![])); // gap -> generation 2

        assert_eq!(feed.apply_snapshot(1, snapshot(100)), FeedAction::Continue);
        assert_eq!(feed.state(), SyncState::Buffering { generation: 2 });

        feed.apply_snapshot(2, snapshot(100));
        assert!(matches!(feed.state(), SyncState::Synced { .. }));
    }

    #[test]
    fn test_divergence_during_replay_keeps_newer_payloads() {
        let (mut feed, _rx, _buffer) = feed();
        feed.start();
        feed.on_payload(payload(101, 0, vec![donate_log()]));
        feed.on_payload(payload(101, 1, vec![]));

        let action = feed.apply_snapshot(1, snapshot(100));
        assert_eq!(action, FeedAction::RequestSnapshot { generation: 2 });
        assert_eq!(feed.replay_len(), 2, "divergent and later payloads re-buffered");
    }

    struct MockSnapshots {
        result: std::sync::Mutex<Option<Result<PoolSnapshot>>>,
    }

    #[async_trait]
    impl SnapshotSource for MockSnapshots {
        async fn fetch_snapshot(&self) -> Result<PoolSnapshot> {
            self.result
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Err(ArbError::Snapshot("exhausted".into())))
        }
    }

    fn json_frame(block_number: u64, index: u64) -> Vec<u8> {
        format!(
            r#"{{"index":{},"metadata":{{"block_number":{},"receipts":{{}}}}}}"#,
            index, block_number
        )
        .into_bytes()
    }

    #[tokio::test]
    async fn test_run_feed_syncs_and_emits() {
        let buffer = Arc::new(FlashblockBuffer::new(20));
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let feed = FlashblockFeed::new(settings(), buffer, events_tx);
        let source = Arc::new(MockSnapshots {
            result: std::sync::Mutex::new(Some(Ok(snapshot(99)))),
        });
        let (frames_tx, frames_rx) = monitored_channel("flashblocks", 100);

        let task = tokio::spawn(run_flashblock_feed(feed, source, frames_rx));
        tokio::time::sleep(Duration::from_millis(20)).await;
        frames_tx.send(json_frame(100, 0)).unwrap();
        frames_tx.send(json_frame(100, 1)).unwrap();

        let first = tokio::time::timeout(Duration::from_secs(1), events_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!((first.block_number, first.index), (100, 0));
        assert_eq!(first.pool.liquidity, 1_000);

        drop(frames_tx);
        let result = tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
        assert!(matches!(result, Err(ArbError::Venue { .. })), "closed stream ends the feed");
    }

    #[tokio::test]
    async fn test_run_feed_propagates_snapshot_failure() {
        let buffer = Arc::new(FlashblockBuffer::new(20));
        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let feed = FlashblockFeed::new(settings(), buffer, events_tx);
        let source = Arc::new(MockSnapshots {
            result: std::sync::Mutex::new(Some(Err(ArbError::Snapshot("rpc down".into())))),
        });
        let (_frames_tx, frames_rx) = monitored_channel::<Vec<u8>>("flashblocks", 100);

        let result = tokio::time::timeout(
            Duration::from_secs(1),
            run_flashblock_feed(feed, source, frames_rx),
        )
        .await
        .unwrap();
        assert!(matches!(result, Err(ArbError::Snapshot(_))));
    }
}
