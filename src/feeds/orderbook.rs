//! CEX Order Book Feed
//!
//! Decodes Binance SBE `BestBidAskStreamEvent` frames into the engine's
//! single OrderBook and publishes it through a `watch` channel, so readers
//! always see a whole book from one message.
//!
//! Frame layout (little endian):
//!   [0..8)    SBE message header (ignored)
//!   [8..16)   event time, i64 (ignored)
//!   [16..24)  book update id, i64 (ignored)
//!   [24]      price exponent, i8
//!   [25]      quantity exponent, i8
//!   [26..34)  bid price mantissa, i64
//!   [34..42)  bid qty mantissa, i64
//!   [42..50)  ask price mantissa, i64
//!   [50..58)  ask qty mantissa, i64
//!
//! Author: AI-Generated
//! Created: 2026-10-17

use crate::error::{ArbError, Result};
use crate::feeds::queue::QueueReceiver;
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub const SBE_HEADER_LEN: usize = 8;
pub const BEST_BID_ASK_BODY_LEN: usize = 50;
pub const MIN_FRAME_LEN: usize = SBE_HEADER_LEN + BEST_BID_ASK_BODY_LEN;

/// Latest best bid/ask. Zero everywhere until the first message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct OrderBook {
    pub bid_price: Decimal,
    pub ask_price: Decimal,
    pub bid_qty: Decimal,
    pub ask_qty: Decimal,
}

impl OrderBook {
    pub fn is_populated(&self) -> bool {
        self.bid_price > Decimal::ZERO && self.ask_price > Decimal::ZERO
    }

    pub fn mid(&self) -> Option<Decimal> {
        self.is_populated()
            .then(|| (self.bid_price + self.ask_price) / Decimal::TWO)
    }
}

fn read_i64(buf: &[u8], offset: usize) -> i64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[offset..offset + 8]);
    i64::from_le_bytes(bytes)
}

/// mantissa * 10^exponent
fn scaled(mantissa: i64, exponent: i8) -> Result<Decimal> {
    let overflow = || ArbError::Decode(format!("mantissa {} exponent {} out of range", mantissa, exponent));
    if exponent <= 0 {
        Decimal::try_from_i128_with_scale(mantissa as i128, exponent.unsigned_abs() as u32)
            .map_err(|_| overflow())
    } else {
        let factor = 10i128.checked_pow(exponent as u32).ok_or_else(overflow)?;
        let value = (mantissa as i128).checked_mul(factor).ok_or_else(overflow)?;
        Decimal::try_from_i128_with_scale(value, 0).map_err(|_| overflow())
    }
}

/// Decode one best-bid/ask frame. Pure: no state, no allocation.
pub fn decode_best_bid_ask(frame: &[u8]) -> Result<OrderBook> {
    if frame.len() < MIN_FRAME_LEN {
        return Err(ArbError::Decode(format!(
            "best bid/ask frame is {} bytes, need {}",
            frame.len(),
            MIN_FRAME_LEN
        )));
    }

    let body = &frame[SBE_HEADER_LEN..];
    let price_exponent = body[16] as i8;
    let qty_exponent = body[17] as i8;

    Ok(OrderBook {
        bid_price: scaled(read_i64(body, 18), price_exponent)?,
        bid_qty: scaled(read_i64(body, 26), qty_exponent)?,
        ask_price: scaled(read_i64(body, 34), price_exponent)?,
        ask_qty: scaled(read_i64(body, 42), qty_exponent)?,
    })
}

/// Single writer of the OrderBook.
pub struct OrderBookFeed {
    book: watch::Sender<OrderBook>,
    decoded: u64,
    dropped: u64,
}

impl OrderBookFeed {
    pub fn new() -> (Self, watch::Receiver<OrderBook>) {
        let (book, rx) = watch::channel(OrderBook::default());
        (
            Self {
                book,
                decoded: 0,
                dropped: 0,
            },
            rx,
        )
    }

    pub fn subscribe(&self) -> watch::Receiver<OrderBook> {
        self.book.subscribe()
    }

    /// Decode and publish one frame. Bad frames are dropped, never fatal.
    pub fn on_frame(&mut self, frame: &[u8]) -> Option<OrderBook> {
        match decode_best_bid_ask(frame).and_then(|book| {
            if book.is_populated() && book.bid_price > book.ask_price {
                Err(ArbError::Decode(format!(
                    "crossed book: bid {} > ask {}",
                    book.bid_price, book.ask_price
                )))
            } else {
                Ok(book)
            }
        }) {
            Ok(book) => {
                self.decoded += 1;
                self.book.send_replace(book);
                Some(book)
            }
            Err(e) => {
                self.dropped += 1;
                warn!("Dropping CEX frame: {}", e);
                None
            }
        }
    }

    pub fn stats(&self) -> (u64, u64) {
        (self.decoded, self.dropped)
    }
}

/// Drain raw frames into the OrderBook until the transport closes.
pub async fn run_orderbook_feed(mut feed: OrderBookFeed, mut frames: QueueReceiver<Vec<u8>>) -> Result<()> {
    info!("📖 CEX order book feed started");
    while let Some(frame) = frames.recv().await {
        if let Some(book) = feed.on_frame(&frame) {
            debug!(
                "Book: {} x {} / {} x {}",
                book.bid_price, book.bid_qty, book.ask_price, book.ask_qty
            );
        }
    }
    let (decoded, dropped) = feed.stats();
    warn!(
        "CEX frame queue closed after {} frames ({} dropped)",
        decoded, dropped
    );
    Err(ArbError::venue("binance", "order book stream closed"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn frame(price_exp: i8, qty_exp: i8, bid: i64, bid_qty: i64, ask: i64, ask_qty: i64) -> Vec<u8> {
        let mut buf = vec![0u8; SBE_HEADER_LEN];
        buf.extend_from_slice(&1_700_000_000_000_000i64.to_le_bytes());
        buf.extend_from_slice(&42i64.to_le_bytes());
        buf.push(price_exp as u8);
        buf.push(qty_exp as u8);
        for v in [bid, bid_qty, ask, ask_qty] {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        buf
    }

    #[test]
    fn test_decode_frame() {
        let book = decode_best_bid_ask(&frame(-2, -4, 443_600, 12_345, 443_601, 500)).unwrap();
        assert_eq!(book.bid_price, dec!(4436.00));
        assert_eq!(book.ask_price, dec!(4436.01));
        assert_eq!(book.bid_qty, dec!(1.2345));
        assert_eq!(book.ask_qty, dec!(0.05));
    }

    #[test]
    fn test_decode_positive_exponent() {
        let book = decode_best_bid_ask(&frame(2, 0, 44, 1, 45, 2)).unwrap();
        assert_eq!(book.bid_price, dec!(4400));
        assert_eq!(book.ask_qty, dec!(2));
    }

    #[test]
    fn test_short_frame_is_decode_error() {
        let mut buf = frame(-2, -4, 1, 1, 2, 1);
        buf.truncate(MIN_FRAME_LEN - 1);
        assert!(matches!(decode_best_bid_ask(&buf), Err(ArbError::Decode(_))));
        assert!(matches!(decode_best_bid_ask(&[]), Err(ArbError::Decode(_))));
    }

    #[test]
    fn test_trailing_bytes_ignored() {
        let mut buf = frame(-2, -4, 100, 1, 101, 1);
        buf.extend_from_slice(&[0xff; 16]);
        assert_eq!(decode_best_bid_ask(&buf).unwrap().ask_price, dec!(1.01));
    }

    #[test]
    fn test_feed_publishes_and_drops() {
        let (mut feed, rx) = OrderBookFeed::new();
        assert!(!rx.borrow().is_populated());

        assert!(feed.on_frame(&frame(-2, -4, 443_600, 1, 443_601, 1)).is_some());
        assert_eq!(rx.borrow().bid_price, dec!(4436.00));

        // Undersized and crossed frames leave the last good book in place.
        assert!(feed.on_frame(&[0u8; 10]).is_none());
        assert!(feed.on_frame(&frame(-2, -4, 443_700, 1, 443_601, 1)).is_none());
        assert_eq!(rx.borrow().bid_price, dec!(4436.00));
        assert_eq!(feed.stats(), (1, 2));
    }

    #[test]
    fn test_mid() {
        let book = OrderBook {
            bid_price: dec!(100),
            ask_price: dec!(101),
            bid_qty: dec!(1),
            ask_qty: dec!(1),
        };
        assert_eq!(book.mid(), Some(dec!(100.5)));
        assert_eq!(OrderBook::default().mid(), None);
    }

    proptest! {
        #[test]
        fn prop_decode_deterministic_and_ordered(
            exp in -8i8..=0,
            bid in 0i64..1_000_000_000,
            spread in 0i64..1_000_000,
            bid_qty in 0i64..1_000_000_000,
            ask_qty in 0i64..1_000_000_000,
        ) {
            let buf = frame(exp, exp, bid, bid_qty, bid + spread, ask_qty);
            let first = decode_best_bid_ask(&buf).unwrap();
            let second = decode_best_bid_ask(&buf).unwrap();
            prop_assert_eq!(first, second);
            prop_assert!(first.bid_price <= first.ask_price);
        }
    }
}
