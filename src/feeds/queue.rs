//! Monitored Frame Queue
//!
//! Unbounded mpsc channel between a transport and its decode task, with a
//! shared depth counter. Crossing the warning depth logs once per excursion
//! so a slow decoder is visible without ever blocking the transport.
//!
//! Author: AI-Generated
//! Created: 2026-10-17

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Debug)]
struct QueueStats {
    name: &'static str,
    depth: AtomicUsize,
    warn_depth: usize,
    over_threshold: AtomicBool,
}

pub struct QueueSender<T> {
    tx: mpsc::UnboundedSender<T>,
    stats: Arc<QueueStats>,
}

pub struct QueueReceiver<T> {
    rx: mpsc::UnboundedReceiver<T>,
    stats: Arc<QueueStats>,
}

pub fn monitored_channel<T>(name: &'static str, warn_depth: usize) -> (QueueSender<T>, QueueReceiver<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let stats = Arc::new(QueueStats {
        name,
        depth: AtomicUsize::new(0),
        warn_depth: warn_depth.max(1),
        over_threshold: AtomicBool::new(false),
    });
    (
        QueueSender {
            tx,
            stats: stats.clone(),
        },
        QueueReceiver { rx, stats },
    )
}

impl<T> Clone for QueueSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            stats: self.stats.clone(),
        }
    }
}

impl<T> QueueSender<T> {
    /// Enqueue without blocking. Fails only once the receiver is gone.
    pub fn send(&self, item: T) -> Result<(), mpsc::error::SendError<T>> {
        self.tx.send(item)?;
        let depth = self.stats.depth.fetch_add(1, Ordering::Relaxed) + 1;
        if depth >= self.stats.warn_depth && !self.stats.over_threshold.swap(true, Ordering::Relaxed) {
            warn!(
                "⚠️  {} queue backlog at {} frames (warn depth {})",
                self.stats.name, depth, self.stats.warn_depth
            );
        }
        Ok(())
    }

    pub fn depth(&self) -> usize {
        self.stats.depth.load(Ordering::Relaxed)
    }
}

impl<T> QueueReceiver<T> {
    pub async fn recv(&mut self) -> Option<T> {
        let item = self.rx.recv().await?;
        let depth = self
            .stats
            .depth
            .fetch_sub(1, Ordering::Relaxed)
            .saturating_sub(1);
        if depth < self.stats.warn_depth / 2 && self.stats.over_threshold.swap(false, Ordering::Relaxed) {
            info!("{} queue drained to {} frames", self.stats.name, depth);
        }
        Some(item)
    }

    pub fn depth(&self) -> usize {
        self.stats.depth.load(Ordering::Relaxed)
    }
}
