//! Venue Balances
//!
//! Free balances of the base and quote asset on both venues. Written by the
//! refresh after each execution (and at startup), read by pre-trade checks.
//!
//! Author: AI-Generated
//! Created: 2026-10-17

use crate::error::Result;
use crate::venues::{CexVenue, DexVenue};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::watch;
use tracing::info;

/// Free amounts on one venue, in human units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct VenueBalances {
    pub base: Decimal,
    pub quote: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Balances {
    pub cex: VenueBalances,
    pub dex: VenueBalances,
    pub refreshed_at: Option<DateTime<Utc>>,
}

/// Shared balance store; readers always see one complete refresh.
#[derive(Debug)]
pub struct BalanceBook {
    current: watch::Sender<Balances>,
}

impl BalanceBook {
    pub fn new() -> Self {
        let (current, _) = watch::channel(Balances::default());
        Self { current }
    }

    pub fn snapshot(&self) -> Balances {
        *self.current.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Balances> {
        self.current.subscribe()
    }

    pub fn set(&self, balances: Balances) {
        self.current.send_replace(balances);
    }

    /// Query both venues concurrently and publish the result.
    pub async fn refresh(&self, cex: &dyn CexVenue, dex: &dyn DexVenue) -> Result<Balances> {
        let (cex_balances, dex_balances) = tokio::try_join!(cex.get_balances(), dex.get_balances())?;
        let balances = Balances {
            cex: cex_balances,
            dex: dex_balances,
            refreshed_at: Some(Utc::now()),
        };
        self.set(balances);
        info!(
            "💼 Balances: {} base={} quote={} | {} base={} quote={}",
            cex.name(),
            balances.cex.base,
            balances.cex.quote,
            dex.name(),
            balances.dex.base,
            balances.dex.quote
        );
        Ok(balances)
    }
}

impl Default for BalanceBook {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ArbError;
    use crate::pool::state::PoolView;
    use crate::types::Side;
    use crate::venues::{DexOrder, DexQuote, DexReceipt, FillReport};
    use alloy::primitives::U256;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    struct FixedCex(Option<VenueBalances>);

    #[async_trait]
    impl CexVenue for FixedCex {
        fn name(&self) -> &'static str {
            "cex"
        }

        async fn place_order(&self, _side: Side, _quantity: Decimal) -> Result<FillReport> {
            Err(ArbError::venue("cex", "not used"))
        }

        async fn get_balances(&self) -> Result<VenueBalances> {
            self.0.ok_or(ArbError::RateLimit {
                venue: "cex",
                status: 429,
            })
        }
    }

    struct FixedDex(VenueBalances);

    #[async_trait]
    impl DexVenue for FixedDex {
        fn name(&self) -> &'static str {
            "dex"
        }

        async fn quote(&self, _pool: &PoolView, _base_amount: U256) -> Result<DexQuote> {
            Err(ArbError::Quote("not used".into()))
        }

        async fn execute(&self, _order: &DexOrder) -> Result<DexReceipt> {
            Err(ArbError::venue("dex", "not used"))
        }

        async fn get_balances(&self) -> Result<VenueBalances> {
            Ok(self.0)
        }
    }

    #[tokio::test]
    async fn test_refresh_publishes_both_venues() {
        let book = BalanceBook::new();
        let mut rx = book.subscribe();
        let cex = FixedCex(Some(VenueBalances {
            base: dec!(0.5),
            quote: dec!(2000),
        }));
        let dex = FixedDex(VenueBalances {
            base: dec!(1.25),
            quote: dec!(300),
        });

        let refreshed = book.refresh(&cex, &dex).await.unwrap();
        assert!(rx.has_changed().unwrap());
        let seen = *rx.borrow_and_update();
        assert_eq!(seen, refreshed);
        assert_eq!(book.snapshot().cex.quote, dec!(2000));
        assert_eq!(book.snapshot().dex.base, dec!(1.25));
        assert!(book.snapshot().refreshed_at.is_some());
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous() {
        let book = BalanceBook::new();
        let before = Balances {
            cex: VenueBalances {
                base: dec!(1),
                quote: dec!(1),
            },
            ..Balances::default()
        };
        book.set(before);

        let dex = FixedDex(VenueBalances::default());
        let err = book.refresh(&FixedCex(None), &dex).await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(book.snapshot(), before);
    }
}
