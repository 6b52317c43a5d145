//! Error Taxonomy
//!
//! Purpose:
//!     Typed errors for the feed, detection and execution paths. Local recovery
//!     is limited to single-message decode/event failures; everything else is
//!     surfaced to the operator path.
//!
//! Author: AI-Generated
//! Created: 2026-10-17

use rust_decimal::Decimal;
use thiserror::Error;

pub type Result<T, E = ArbError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ArbError {
    /// Malformed or undersized frame/event. Drop the single message and continue.
    #[error("decode error: {0}")]
    Decode(String),

    /// Block/slot discontinuity in the flashblock stream.
    #[error("sequence gap: expected block {expected_block} index {expected_index}, got block {block} index {index}")]
    SequenceGap {
        expected_block: u64,
        expected_index: u64,
        block: u64,
        index: u64,
    },

    /// Pool state no longer consistent with the events applied to it.
    #[error("pool state divergence: {0}")]
    Divergence(String),

    /// Snapshot fetch failed. Not retried internally.
    #[error("snapshot failed: {0}")]
    Snapshot(String),

    /// Quote could not be produced for this detection cycle.
    #[error("quote failed: {0}")]
    Quote(String),

    /// Venue throttled us (HTTP 418/429).
    #[error("rate limited by {venue} (HTTP {status})")]
    RateLimit { venue: &'static str, status: u16 },

    #[error("insufficient balance: {0}")]
    InsufficientBalance(String),

    /// One leg of a two-leg execution did not complete.
    #[error("partial fill: {0}")]
    PartialFill(String),

    #[error("timing deadline exceeded: slot {slot_index} at {ms_of_second}ms (deadline {deadline_ms:?})")]
    TimingDeadlineExceeded {
        slot_index: u64,
        ms_of_second: u32,
        deadline_ms: Option<u32>,
    },

    /// Receipt wait gave up. The transaction may still land.
    #[error("transaction {0} unconfirmed")]
    Unconfirmed(String),

    /// The request may have reached the venue but its result was lost
    /// (timeout, dropped connection, 5xx). Treat the order as possibly filled.
    #[error("{venue} order outcome unknown: {message}")]
    OutcomeUnknown { venue: &'static str, message: String },

    /// Non-throttle venue failure (rejected order, RPC error, reverted tx).
    #[error("{venue} error: {message}")]
    Venue { venue: &'static str, message: String },

    #[error("accounting error: {0}")]
    Accounting(String),

    #[error("executor halted: {0}")]
    Halted(String),
}

impl ArbError {
    pub fn venue(venue: &'static str, message: impl Into<String>) -> Self {
        ArbError::Venue {
            venue,
            message: message.into(),
        }
    }

    pub fn outcome_unknown(venue: &'static str, message: impl Into<String>) -> Self {
        ArbError::OutcomeUnknown {
            venue,
            message: message.into(),
        }
    }

    pub fn insufficient(label: &str, required: Decimal, available: Decimal) -> Self {
        ArbError::InsufficientBalance(format!(
            "{}: required {}, available {}",
            label, required, available
        ))
    }

    /// Errors that must reach the operator rather than be retried next cycle.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ArbError::RateLimit { .. }
                | ArbError::Snapshot(_)
                | ArbError::Halted(_)
                | ArbError::PartialFill(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_fatal_classification() {
        assert!(ArbError::RateLimit { venue: "binance", status: 429 }.is_fatal());
        assert!(ArbError::Snapshot("rpc down".into()).is_fatal());
        assert!(!ArbError::Decode("short".into()).is_fatal());
        assert!(!ArbError::Quote("no liquidity".into()).is_fatal());
        // Handled by the executor as an unconfirmed leg, not by callers.
        assert!(!ArbError::outcome_unknown("binance", "timed out").is_fatal());
        assert!(!ArbError::insufficient("CEX USDC", dec!(10), dec!(1)).is_fatal());
    }

    #[test]
    fn test_insufficient_message() {
        let err = ArbError::insufficient("CEX USDC", dec!(44.80), dec!(12.5));
        assert_eq!(
            err.to_string(),
            "insufficient balance: CEX USDC: required 44.80, available 12.5"
        );
    }
}
