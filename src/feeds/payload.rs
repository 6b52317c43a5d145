//! Flashblock Payload Decoding
//!
//! Wire types for the flashblocks websocket. Frames are brotli-compressed
//! JSON (plain JSON is accepted as-is):
//!
//! ```text
//! { "index": 1,
//!   "metadata": { "block_number": 123,
//!                 "receipts": { "<tx hash>": { "<TxType>": { "status": "0x1",
//!                                                            "logs": [ {address, topics, data} ] } } } } }
//! ```
//!
//! Receipt order is preserved as sent; it is the order logs are applied in.
//!
//! Author: AI-Generated
//! Created: 2026-10-17

use crate::error::{ArbError, Result};
use alloy::primitives::{Address, Bytes, TxHash, B256, U64};
use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;

/// Event log as carried by flashblock receipts and RPC receipts.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashblockReceipt {
    pub tx_hash: TxHash,
    pub success: bool,
    pub logs: Vec<RawLog>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FlashblockMetadata {
    #[serde(deserialize_with = "u64_or_hex")]
    pub block_number: u64,
    #[serde(default, deserialize_with = "ordered_receipts")]
    pub receipts: Vec<FlashblockReceipt>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FlashblockPayload {
    pub index: u64,
    pub metadata: FlashblockMetadata,
}

impl FlashblockPayload {
    pub fn block_number(&self) -> u64 {
        self.metadata.block_number
    }
}

#[derive(Deserialize)]
struct ReceiptBody {
    status: U64,
    #[serde(default)]
    logs: Vec<RawLog>,
}

fn ordered_receipts<'de, D>(deserializer: D) -> std::result::Result<Vec<FlashblockReceipt>, D::Error>
where
    D: Deserializer<'de>,
{
    struct ReceiptsVisitor;

    impl<'de> Visitor<'de> for ReceiptsVisitor {
        type Value = Vec<FlashblockReceipt>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a map of tx hash to typed receipt")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Self::Value, A::Error> {
            let mut receipts = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((tx_hash, typed)) = map.next_entry::<TxHash, BTreeMap<String, ReceiptBody>>()? {
                // One entry keyed by tx type (Legacy, Eip1559, Deposit, ...).
                let body = typed
                    .into_values()
                    .next()
                    .ok_or_else(|| de::Error::custom(format!("receipt {} has no body", tx_hash)))?;
                receipts.push(FlashblockReceipt {
                    tx_hash,
                    success: body.status == U64::from(1),
                    logs: body.logs,
                });
            }
            Ok(receipts)
        }
    }

    deserializer.deserialize_map(ReceiptsVisitor)
}

fn u64_or_hex<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrHex {
        Number(u64),
        Hex(U64),
    }

    Ok(match NumberOrHex::deserialize(deserializer)? {
        NumberOrHex::Number(n) => n,
        NumberOrHex::Hex(h) => h.to::<u64>(),
    })
}

/// Decompress (when needed) and parse one websocket frame.
pub fn decode_frame(frame: &[u8]) -> Result<FlashblockPayload> {
    let is_plain_json = frame
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|b| *b == b'{');

    if is_plain_json {
        return serde_json::from_slice(frame)
            .map_err(|e| ArbError::Decode(format!("flashblock json: {}", e)));
    }

    let mut json = Vec::with_capacity(frame.len() * 4);
    brotli::BrotliDecompress(&mut &frame[..], &mut json)
        .map_err(|e| ArbError::Decode(format!("flashblock brotli: {}", e)))?;
    serde_json::from_slice(&json).map_err(|e| ArbError::Decode(format!("flashblock json: {}", e)))
}
