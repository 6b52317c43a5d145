//! Flashblock Buffer
//!
//! Fixed-capacity ring of recently processed flashblocks with a companion
//! index from transaction hash to (block_number, flashblock index). Used to
//! report which slot a submitted DEX transaction landed in and which other
//! transactions shared it.
//!
//! A hash is discoverable only while its flashblock is among the most recent
//! `capacity` entries; inclusion polling is bounded accordingly.
//!
//! Author: AI-Generated
//! Created: 2026-10-17

use alloy::primitives::TxHash;
use std::collections::{HashMap, VecDeque};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::watch;
use tracing::debug;

pub const DEFAULT_CAPACITY: usize = 20;

/// One processed flashblock. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flashblock {
    pub block_number: u64,
    pub index: u64,
    pub tx_hashes: Vec<TxHash>,
}

#[derive(Debug, Default)]
struct Inner {
    blocks: VecDeque<Flashblock>,
    by_tx: HashMap<TxHash, (u64, u64)>,
}

#[derive(Debug)]
pub struct FlashblockBuffer {
    capacity: usize,
    inner: RwLock<Inner>,
    /// Bumped on every add_block; waiters watch it.
    added: watch::Sender<u64>,
}

impl FlashblockBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (added, _) = watch::channel(0);
        Self {
            capacity,
            inner: RwLock::new(Inner {
                blocks: VecDeque::with_capacity(capacity),
                by_tx: HashMap::new(),
            }),
            added,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.read().blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a flashblock, evicting the oldest when full, then wake waiters.
    pub fn add_block(&self, block_number: u64, index: u64, tx_hashes: Vec<TxHash>) {
        {
            let mut inner = self.write();
            if inner.blocks.len() >= self.capacity {
                if let Some(evicted) = inner.blocks.pop_front() {
                    let slot = (evicted.block_number, evicted.index);
                    for hash in &evicted.tx_hashes {
                        // Only drop index entries still pointing at the evicted slot.
                        if inner.by_tx.get(hash) == Some(&slot) {
                            inner.by_tx.remove(hash);
                        }
                    }
                    debug!("Evicted flashblock {}:{}", slot.0, slot.1);
                }
            }
            for hash in &tx_hashes {
                inner.by_tx.insert(*hash, (block_number, index));
            }
            inner.blocks.push_back(Flashblock {
                block_number,
                index,
                tx_hashes,
            });
        }
        self.added.send_modify(|n| *n = n.wrapping_add(1));
    }

    pub fn lookup(&self, tx_hash: &TxHash) -> Option<(u64, u64)> {
        self.read().by_tx.get(tx_hash).copied()
    }

    /// Every hash that landed in the same flashblock.
    pub fn get_tx_hashes(&self, block_number: u64, index: u64) -> Vec<TxHash> {
        self.read()
            .blocks
            .iter()
            .rev()
            .find(|fb| fb.block_number == block_number && fb.index == index)
            .map(|fb| fb.tx_hashes.clone())
            .unwrap_or_default()
    }

    /// Suspend until the next `add_block`.
    pub async fn wait_for_new_block(&self) {
        let mut rx = self.added.subscribe();
        // The sender lives as long as self, so changed() cannot fail here.
        let _ = rx.changed().await;
    }

    /// Poll for `tx_hash` across at most `max_blocks` newly added flashblocks.
    pub async fn wait_for_inclusion(&self, tx_hash: &TxHash, max_blocks: usize) -> Option<(u64, u64)> {
        // Subscribe before the first lookup so an add in between is not missed.
        let mut rx = self.added.subscribe();
        for _ in 0..max_blocks {
            if let Some(slot) = self.lookup(tx_hash) {
                return Some(slot);
            }
            if rx.changed().await.is_err() {
                break;
            }
        }
        self.lookup(tx_hash)
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for FlashblockBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn hash(n: u64) -> TxHash {
        TxHash::left_padding_from(&n.to_be_bytes())
    }

    #[test]
    fn test_lookup_and_colocated_hashes() {
        let buffer = FlashblockBuffer::new(4);
        buffer.add_block(100, 1, vec![hash(1), hash(2)]);
        buffer.add_block(100, 2, vec![hash(3)]);

        assert_eq!(buffer.lookup(&hash(2)), Some((100, 1)));
        assert_eq!(buffer.lookup(&hash(3)), Some((100, 2)));
        assert_eq!(buffer.lookup(&hash(9)), None);
        assert_eq!(buffer.get_tx_hashes(100, 1), vec![hash(1), hash(2)]);
        assert!(buffer.get_tx_hashes(99, 0).is_empty());
    }

    #[test]
    fn test_eviction_after_capacity_plus_one() {
        let capacity = 20;
        let buffer = FlashblockBuffer::new(capacity);
        for i in 0..=capacity as u64 {
            buffer.add_block(1000 + i / 5, i % 5, vec![hash(i * 10), hash(i * 10 + 1)]);
        }

        assert_eq!(buffer.len(), capacity);
        assert_eq!(buffer.lookup(&hash(0)), None, "evicted block's hashes are gone");
        assert_eq!(buffer.lookup(&hash(1)), None);
        for i in 1..=capacity as u64 {
            assert_eq!(
                buffer.lookup(&hash(i * 10)),
                Some((1000 + i / 5, i % 5)),
                "block {} should remain lookupable",
                i
            );
        }
    }

    #[test]
    fn test_eviction_keeps_reindexed_hash() {
        let buffer = FlashblockBuffer::new(2);
        buffer.add_block(1, 0, vec![hash(7)]);
        buffer.add_block(1, 1, vec![hash(7)]);
        buffer.add_block(1, 2, vec![hash(8)]);
        // The first slot was evicted but hash 7 was re-indexed to slot 1.
        assert_eq!(buffer.lookup(&hash(7)), Some((1, 1)));
    }

    #[tokio::test]
    async fn test_wait_for_new_block_wakes_on_add() {
        let buffer = Arc::new(FlashblockBuffer::new(4));
        let waiter = {
            let buffer = buffer.clone();
            tokio::spawn(async move { buffer.wait_for_new_block().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished(), "must block until a flashblock arrives");

        buffer.add_block(5, 1, vec![hash(1)]);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_for_inclusion() {
        let buffer = Arc::new(FlashblockBuffer::new(4));
        let target = hash(42);

        let poller = {
            let buffer = buffer.clone();
            tokio::spawn(async move { buffer.wait_for_inclusion(&target, 8).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        buffer.add_block(9, 1, vec![hash(1)]);
        buffer.add_block(9, 2, vec![target]);

        let found = tokio::time::timeout(Duration::from_secs(1), poller)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found, Some((9, 2)));
    }

    #[tokio::test]
    async fn test_wait_for_inclusion_gives_up() {
        let buffer = Arc::new(FlashblockBuffer::new(4));
        let poller = {
            let buffer = buffer.clone();
            tokio::spawn(async move { buffer.wait_for_inclusion(&hash(42), 2).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        buffer.add_block(1, 1, vec![hash(1)]);
        tokio::time::sleep(Duration::from_millis(10)).await;
        buffer.add_block(1, 2, vec![hash(2)]);

        let found = tokio::time::timeout(Duration::from_secs(1), poller)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found, None);
    }
}
