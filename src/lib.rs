//! CEX/DEX Arbitrage Engine Library
//!
//! Binance best bid/ask (SBE) against a Uniswap v4 pool tracked from Unichain
//! flashblocks. Detection, execution and accounting are exposed for the
//! engine binary and the operator tools.
//!
//! Author: AI-Generated
//! Created: 2026-10-17

pub mod arbitrage;
pub mod balances;
pub mod config;
pub mod contracts;
pub mod error;
pub mod feeds;
pub mod flashblocks;
pub mod pool;
pub mod types;
pub mod venues;

// Re-export commonly used types
pub use config::{load_config, load_config_from_file};
pub use error::{ArbError, Result};
pub use flashblocks::FlashblockBuffer;
pub use types::{BotConfig, ExecutionRecord, ExecutionStatus, Side, TradeSignal};
