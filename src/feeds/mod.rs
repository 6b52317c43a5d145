//! Market Data Feeds
//!
//! Transport -> queue -> decoder -> state store, one task per venue:
//! - `orderbook`: Binance SBE best bid/ask into the OrderBook
//! - `flashblock`: Unichain flashblocks into the Uniswap v4 Pool
//!
//! Author: AI-Generated
//! Created: 2026-10-17

pub mod flashblock;
pub mod orderbook;
pub mod payload;
pub mod queue;
pub mod ws;

pub use flashblock::{run_flashblock_feed, BlockProcessed, FeedAction, FeedSettings, FlashblockFeed, SyncState};
pub use orderbook::{decode_best_bid_ask, run_orderbook_feed, OrderBook, OrderBookFeed};
pub use payload::{decode_frame, FlashblockPayload, RawLog};
pub use queue::{monitored_channel, QueueReceiver, QueueSender};
pub use ws::{run_ws_reader, WsEndpoint};
