//! Pool Module
//!
//! Local replica of the tracked Uniswap v4 pool: tick store and event
//! application, Q64.96 quote math, and consistent on-chain snapshots.
//!
//! Author: AI-Generated
//! Created: 2026-10-17

pub mod calculator;
pub mod snapshot;
pub mod state;

pub use snapshot::{OnchainSnapshotter, PoolSnapshot, SnapshotSource};
pub use state::{Pool, PoolView, Tick};
