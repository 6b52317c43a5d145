//! Uniswap v4 Client
//!
//! DEX leg through the Universal Router:
//! `execute(V4_SWAP, [actions = SWAP_EXACT_*_SINGLE | SETTLE_ALL | TAKE_ALL])`.
//! Transactions are signed locally and sent to the sequencer RPC; receipts are
//! polled with a raw `eth_getTransactionReceipt` so the OP-stack `l1Fee` field
//! survives.
//!
//! Quotes are local: integer math against the latest pool view.
//!
//! Author: AI-Generated
//! Created: 2026-10-17

use crate::balances::VenueBalances;
use crate::contracts::{
    actions, ExactInputSingleParams, ExactOutputSingleParams, IUniversalRouter, PoolKey, IERC20, V4_SWAP,
};
use crate::error::{ArbError, Result};
use crate::feeds::payload::RawLog;
use crate::pool::calculator::{quote_exact_input_token0, quote_exact_output_token0, raw_to_decimal, u256_to_u128};
use crate::pool::state::PoolView;
use crate::types::{BotConfig, Side};
use crate::venues::{DexOrder, DexQuote, DexReceipt, DexVenue};
use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, Bytes, TxHash, U128, U256, U64};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use alloy::sol_types::{SolCall, SolValue};
use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

const VENUE: &str = "uniswap-v4";
const SWAP_DEADLINE_SECS: u64 = 60;

/// Receipt as returned by OP-stack nodes.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: TxHash,
    status: Option<U64>,
    block_number: Option<U64>,
    gas_used: U128,
    effective_gas_price: Option<U128>,
    l1_fee: Option<U128>,
    #[serde(default)]
    logs: Vec<RawLog>,
}

impl From<RpcReceipt> for DexReceipt {
    fn from(r: RpcReceipt) -> Self {
        DexReceipt {
            tx_hash: r.transaction_hash,
            success: r.status == Some(U64::from(1)),
            block_number: r.block_number.map(|n| n.to::<u64>()),
            gas_used: r.gas_used.to::<u128>(),
            effective_gas_price: r.effective_gas_price.map(|p| p.to::<u128>()).unwrap_or(0),
            l1_fee: r.l1_fee.map(|f| f.to::<u128>()).unwrap_or(0),
            logs: r.logs,
        }
    }
}

pub struct UniswapV4Client {
    /// Reads: balances, receipts.
    provider: DynProvider,
    /// Signing provider pointed at the sequencer.
    sequencer: DynProvider,
    wallet: Address,
    pool_key: PoolKey,
    router: Address,
    pool_fee_ppm: u32,
    base_decimals: u32,
    quote_decimals: u32,
    chain_id: u64,
    gas_limit: u64,
    max_fee_per_gas: u128,
    max_priority_fee_per_gas: u128,
    poll_interval: Duration,
    poll_attempts: u32,
}

impl UniswapV4Client {
    pub fn new(config: &BotConfig) -> anyhow::Result<Self> {
        let signer: PrivateKeySigner = config.private_key.parse().context("Invalid PRIVATE_KEY")?;
        let wallet = signer.address();

        let provider = ProviderBuilder::new()
            .connect_http(config.rpc_url.parse().context("Invalid RPC_URL")?)
            .erased();
        let sequencer = ProviderBuilder::new()
            .wallet(signer)
            .connect_http(config.sequencer_rpc_url.parse().context("Invalid SEQUENCER_RPC_URL")?)
            .erased();

        info!("🦄 Uniswap v4 client: wallet {}, router {}", wallet, config.universal_router);

        Ok(Self {
            provider,
            sequencer,
            wallet,
            pool_key: config.pool_key()?,
            router: config.universal_router,
            pool_fee_ppm: config.pool_fee_ppm,
            base_decimals: config.base_decimals,
            quote_decimals: config.quote_decimals,
            chain_id: config.chain_id,
            gas_limit: config.gas_limit,
            max_fee_per_gas: config.max_fee_per_gas,
            max_priority_fee_per_gas: config.max_priority_fee_per_gas,
            poll_interval: Duration::from_millis(config.receipt_poll_interval_ms),
            poll_attempts: config.receipt_poll_attempts,
        })
    }

    pub fn wallet(&self) -> Address {
        self.wallet
    }

    async fn wait_for_receipt(&self, tx_hash: TxHash) -> Result<DexReceipt> {
        for attempt in 1..=self.poll_attempts {
            // The tx is already broadcast, so a failed query is not a failed swap.
            let receipt: std::result::Result<Option<RpcReceipt>, _> = self
                .provider
                .raw_request("eth_getTransactionReceipt".into(), (tx_hash,))
                .await;

            match receipt {
                Ok(Some(receipt)) => {
                    debug!("Receipt for {} after {} polls", tx_hash, attempt);
                    return Ok(receipt.into());
                }
                Ok(None) => {}
                Err(e) => warn!("Receipt query for {} failed (poll {}): {}", tx_hash, attempt, e),
            }
            tokio::time::sleep(self.poll_interval).await;
        }
        warn!("⏳ No receipt for {} after {} polls", tx_hash, self.poll_attempts);
        Err(ArbError::Unconfirmed(tx_hash.to_string()))
    }

    async fn token_balance(&self, token: Address) -> Result<U256> {
        if token == Address::ZERO {
            return self
                .provider
                .get_balance(self.wallet)
                .await
                .map_err(|e| ArbError::venue(VENUE, format!("native balance: {}", e)));
        }
        IERC20::new(token, self.provider.clone())
            .balanceOf(self.wallet)
            .call()
            .await
            .map_err(|e| ArbError::venue(VENUE, format!("balanceOf {}: {}", token, e)))
    }
}

/// Universal Router `(commands, inputs)` for a single-pool v4 swap.
/// Selling exact base in (token0 -> token1) or buying exact base out
/// (token1 -> token0).
pub fn encode_v4_swap(pool_key: &PoolKey, order: &DexOrder) -> Result<(Bytes, Vec<Bytes>)> {
    let base = u256_to_u128(order.base_amount)
        .ok_or_else(|| ArbError::venue(VENUE, format!("base amount {} exceeds uint128", order.base_amount)))?;
    let limit = u256_to_u128(order.quote_limit)
        .ok_or_else(|| ArbError::venue(VENUE, format!("quote limit {} exceeds uint128", order.quote_limit)))?;

    let (swap_action, swap_params, settle, take) = match order.side {
        Side::Sell => (
            actions::SWAP_EXACT_IN_SINGLE,
            ExactInputSingleParams {
                poolKey: pool_key.clone(),
                zeroForOne: true,
                amountIn: base,
                amountOutMinimum: limit,
                hookData: Bytes::new(),
            }
            .abi_encode(),
            (pool_key.currency0, U256::from(base)),
            (pool_key.currency1, U256::from(limit)),
        ),
        Side::Buy => (
            actions::SWAP_EXACT_OUT_SINGLE,
            ExactOutputSingleParams {
                poolKey: pool_key.clone(),
                zeroForOne: false,
                amountOut: base,
                amountInMaximum: limit,
                hookData: Bytes::new(),
            }
            .abi_encode(),
            (pool_key.currency1, U256::from(limit)),
            (pool_key.currency0, U256::from(base)),
        ),
    };

    let action_bytes = Bytes::from(vec![swap_action, actions::SETTLE_ALL, actions::TAKE_ALL]);
    let params = vec![
        Bytes::from(swap_params),
        Bytes::from(settle.abi_encode_params()),
        Bytes::from(take.abi_encode_params()),
    ];
    let input = (action_bytes, params).abi_encode_params();

    Ok((Bytes::from(vec![V4_SWAP]), vec![Bytes::from(input)]))
}

/// Native value attached to the router call: only when paying in native ETH.
pub fn swap_value(pool_key: &PoolKey, order: &DexOrder) -> U256 {
    let paid_currency = match order.side {
        Side::Sell => pool_key.currency0,
        Side::Buy => pool_key.currency1,
    };
    if paid_currency != Address::ZERO {
        return U256::ZERO;
    }
    match order.side {
        Side::Sell => order.base_amount,
        Side::Buy => order.quote_limit,
    }
}

#[async_trait]
impl DexVenue for UniswapV4Client {
    fn name(&self) -> &'static str {
        VENUE
    }

    async fn quote(&self, pool: &PoolView, base_amount: U256) -> Result<DexQuote> {
        let bid = quote_exact_input_token0(pool, base_amount, self.pool_fee_ppm).ok_or_else(|| {
            ArbError::Quote(format!(
                "exact-in {} at block {} idx {} (liquidity {})",
                base_amount, pool.block_number, pool.index, pool.liquidity
            ))
        })?;
        let ask = quote_exact_output_token0(pool, base_amount, self.pool_fee_ppm).ok_or_else(|| {
            ArbError::Quote(format!(
                "exact-out {} at block {} idx {} (liquidity {})",
                base_amount, pool.block_number, pool.index, pool.liquidity
            ))
        })?;
        Ok(DexQuote { bid, ask })
    }

    async fn execute(&self, order: &DexOrder) -> Result<DexReceipt> {
        let (commands, inputs) = encode_v4_swap(&self.pool_key, order)?;
        let deadline = U256::from(Utc::now().timestamp().max(0) as u64 + SWAP_DEADLINE_SECS);
        let calldata = IUniversalRouter::executeCall {
            commands,
            inputs,
            deadline,
        }
        .abi_encode();

        let tx = TransactionRequest::default()
            .with_from(self.wallet)
            .with_to(self.router)
            .with_input(calldata)
            .with_value(swap_value(&self.pool_key, order))
            .with_chain_id(self.chain_id)
            .with_gas_limit(self.gas_limit)
            .with_max_fee_per_gas(self.max_fee_per_gas)
            .with_max_priority_fee_per_gas(self.max_priority_fee_per_gas);

        let pending = self
            .sequencer
            .send_transaction(tx)
            .await
            .map_err(|e| ArbError::venue(VENUE, format!("swap submission failed: {}", e)))?;
        let tx_hash = *pending.tx_hash();
        info!(
            "📤 DEX {} {} base (limit {}) sent: {}",
            order.side, order.base_amount, order.quote_limit, tx_hash
        );

        let receipt = self.wait_for_receipt(tx_hash).await?;
        if !receipt.success {
            warn!("❌ DEX swap {} reverted in block {:?}", tx_hash, receipt.block_number);
        }
        Ok(receipt)
    }

    async fn get_balances(&self) -> Result<VenueBalances> {
        let (base_raw, quote_raw) = tokio::try_join!(
            self.token_balance(self.pool_key.currency0),
            self.token_balance(self.pool_key.currency1)
        )?;
        let base = raw_to_decimal(base_raw, self.base_decimals)
            .ok_or_else(|| ArbError::venue(VENUE, format!("base balance {} out of range", base_raw)))?;
        let quote = raw_to_decimal(quote_raw, self.quote_decimals)
            .ok_or_else(|| ArbError::venue(VENUE, format!("quote balance {} out of range", quote_raw)))?;
        Ok(VenueBalances { base, quote })
    }
}
