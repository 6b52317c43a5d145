//! Configuration management
//! Load settings from .env file
//!
//! Required variables fail startup with the variable name; everything else
//! falls back to mainnet defaults for the ETH/USDC Uniswap v4 pool on Unichain.
//!
//! Author: AI-Generated
//! Created: 2026-10-17

use crate::contracts::PoolKey;
use alloy::primitives::aliases::{I24, U24};
use alloy::primitives::{Address, B256};
use anyhow::{anyhow, bail, Context, Result};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;
use tracing::info;

// Re-export BotConfig for external access
pub use crate::types::BotConfig;
use crate::types::{ExecutionStrategyKind, Network, RemediationPolicy};

/// Minimum safety buffer applied to pre-trade balance checks (1%).
pub const MIN_SAFETY_BUFFER: Decimal = Decimal::from_parts(101, 0, 0, false, 2);

const DEFAULT_SLOT_DEADLINES: &str = "1:80,2:350,3:570,4:950";

pub fn load_config() -> Result<BotConfig> {
    dotenv::dotenv().ok();
    load_config_from_env()
}

/// Same as `load_config` but reads an explicit env file first.
pub fn load_config_from_file(path: &str) -> Result<BotConfig> {
    dotenv::from_filename(path).with_context(|| format!("Failed to read env file {}", path))?;
    load_config_from_env()
}

fn load_config_from_env() -> Result<BotConfig> {
    let network: Network = parse_env_or("NETWORK", Network::Mainnet)?;

    let base_symbol = env_or("BASE_SYMBOL", "ETH");
    let quote_symbol = env_or("QUOTE_SYMBOL", "USDC");
    let cex_symbol = env_or("CEX_SYMBOL", &format!("{}{}", base_symbol, quote_symbol));

    let cex_ws_url = std::env::var("CEX_WS_URL").unwrap_or_else(|_| {
        format!(
            "{}/{}@bestBidAsk",
            network.default_cex_ws_base(),
            cex_symbol.to_lowercase()
        )
    });

    let base_token: Address = parse_env_or("BASE_TOKEN", Address::ZERO)?;
    let quote_token: Address = parse_env_required("QUOTE_TOKEN")?;
    let hooks: Address = parse_env_or("POOL_HOOKS", Address::ZERO)?;
    let pool_fee_ppm: u32 = parse_env_or("POOL_FEE_PPM", 500)?;
    let tick_spacing: i32 = parse_env_or("TICK_SPACING", 10)?;

    let derived_pool_id = derive_pool_id(base_token, quote_token, pool_fee_ppm, tick_spacing, hooks)?;
    let pool_id = match std::env::var("POOL_ID") {
        Ok(raw) => {
            let configured = B256::from_str(raw.trim())
                .map_err(|e| anyhow!("Invalid POOL_ID {}: {}", raw, e))?;
            if configured != derived_pool_id {
                bail!(
                    "POOL_ID {} does not match pool key (derived {})",
                    configured,
                    derived_pool_id
                );
            }
            configured
        }
        Err(_) => derived_pool_id,
    };

    let rpc_url = env_required("RPC_URL")?;

    let config = BotConfig {
        network,
        base_symbol,
        quote_symbol,
        cex_symbol,
        base_decimals: parse_env_or("BASE_DECIMALS", 18)?,
        quote_decimals: parse_env_or("QUOTE_DECIMALS", 6)?,

        cex_rest_url: env_or("CEX_REST_URL", network.default_cex_rest_url()),
        cex_ws_url,
        cex_api_key: env_required("BINANCE_API_KEY")?,
        cex_api_secret: env_required("BINANCE_API_SECRET")?,
        cex_fee_ppm: parse_env_or("CEX_FEE_PPM", 1000)?,

        sequencer_rpc_url: env_or("SEQUENCER_RPC_URL", &rpc_url),
        rpc_url,
        flashblocks_ws_url: env_required("FLASHBLOCKS_WS_URL")?,
        chain_id: parse_env_or("CHAIN_ID", network.default_chain_id())?,
        private_key: env_required("PRIVATE_KEY")?,
        pool_manager: parse_env_required("POOL_MANAGER")?,
        state_view: parse_env_required("STATE_VIEW")?,
        tick_bitmap_helper: parse_env_required("TICK_BITMAP_HELPER")?,
        universal_router: parse_env_required("UNIVERSAL_ROUTER")?,
        base_token,
        quote_token,
        hooks,
        pool_id,
        pool_fee_ppm,
        tick_spacing,

        trade_size_base: parse_env_or("TRADE_SIZE_BASE", Decimal::new(2, 3))?,
        min_edge: parse_env_or("MIN_EDGE", 0i128)?,
        max_consecutive_throttles: parse_env_or("MAX_CONSECUTIVE_THROTTLES", 3)?,
        safety_buffer: parse_env_or("SAFETY_BUFFER", MIN_SAFETY_BUFFER)?,
        dex_gas_reserve: parse_env_or("DEX_GAS_RESERVE", Decimal::new(1, 4))?,
        slippage_ppm: parse_env_or("SLIPPAGE_PPM", 5000)?,
        execution_strategy: parse_env_or("EXECUTION_STRATEGY", ExecutionStrategyKind::Sequential)?,
        remediation: parse_env_or("REMEDIATION", RemediationPolicy::Halt)?,
        live_trading: parse_env_or("LIVE_TRADING", false)?,

        slot_count: parse_env_or("FLASHBLOCK_SLOT_COUNT", 5)?,
        slot_deadlines_ms: parse_slot_deadlines(&env_or("SLOT_DEADLINES_MS", DEFAULT_SLOT_DEADLINES))?,
        flashblock_capacity: parse_env_or("FLASHBLOCK_CAPACITY", 20)?,

        gas_limit: parse_env_or("GAS_LIMIT", 200_000)?,
        max_fee_per_gas: parse_env_or("MAX_FEE_PER_GAS", 1_000_000_000)?,
        max_priority_fee_per_gas: parse_env_or("MAX_PRIORITY_FEE_PER_GAS", 1_000_000)?,
        receipt_poll_interval_ms: parse_env_or("RECEIPT_POLL_INTERVAL_MS", 100)?,
        receipt_poll_attempts: parse_env_or("RECEIPT_POLL_ATTEMPTS", 50)?,

        queue_warn_depth: parse_env_or("QUEUE_WARN_DEPTH", 1000)?,
    };

    config.validate()?;

    info!(
        "Config loaded: {} on {:?}, pool {}, size {} {}, strategy {:?}, live={}",
        config.cex_symbol,
        config.network,
        config.pool_id,
        config.trade_size_base,
        config.base_symbol,
        config.execution_strategy,
        config.live_trading
    );

    Ok(config)
}

impl BotConfig {
    pub fn validate(&self) -> Result<()> {
        if self.safety_buffer < MIN_SAFETY_BUFFER {
            bail!(
                "SAFETY_BUFFER must be at least {} (got {})",
                MIN_SAFETY_BUFFER,
                self.safety_buffer
            );
        }
        if self.cex_fee_ppm >= 1_000_000 || self.pool_fee_ppm >= 1_000_000 || self.slippage_ppm >= 1_000_000 {
            bail!("fee and slippage rates are parts per million and must be below 1000000");
        }
        if self.trade_size_base <= Decimal::ZERO {
            bail!("TRADE_SIZE_BASE must be positive");
        }
        if self.min_edge < 0 {
            bail!("MIN_EDGE must not be negative");
        }
        if self.max_consecutive_throttles == 0 {
            bail!("MAX_CONSECUTIVE_THROTTLES must be positive");
        }
        if self.flashblock_capacity == 0 {
            bail!("FLASHBLOCK_CAPACITY must be positive");
        }
        if self.slot_count == 0 {
            bail!("FLASHBLOCK_SLOT_COUNT must be positive");
        }
        if let Some((&slot, _)) = self
            .slot_deadlines_ms
            .iter()
            .find(|(slot, ms)| **slot == 0 || **slot >= self.slot_count || **ms >= 1000)
        {
            bail!(
                "SLOT_DEADLINES_MS entry for slot {} is outside 1..{} or not within a second",
                slot,
                self.slot_count
            );
        }
        if self.tick_spacing <= 0 {
            bail!("TICK_SPACING must be positive");
        }
        Ok(())
    }

    /// Trade size in the base asset's smallest unit.
    pub fn trade_size_raw(&self) -> Result<u128> {
        crate::pool::calculator::decimal_to_raw(self.trade_size_base, self.base_decimals)
            .ok_or_else(|| anyhow!("TRADE_SIZE_BASE {} not representable", self.trade_size_base))
    }

    pub fn pool_key(&self) -> Result<PoolKey> {
        pool_key(
            self.base_token,
            self.quote_token,
            self.pool_fee_ppm,
            self.tick_spacing,
            self.hooks,
        )
    }
}

/// Parse `"1:80,2:350"` into slot index -> millisecond deadline.
pub fn parse_slot_deadlines(raw: &str) -> Result<BTreeMap<u64, u32>> {
    let mut table = BTreeMap::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (slot, ms) = entry
            .split_once(':')
            .ok_or_else(|| anyhow!("Invalid slot deadline '{}', expected <slot>:<ms>", entry))?;
        let slot: u64 = slot
            .trim()
            .parse()
            .with_context(|| format!("Invalid slot index in '{}'", entry))?;
        let ms: u32 = ms
            .trim()
            .parse()
            .with_context(|| format!("Invalid deadline in '{}'", entry))?;
        if table.insert(slot, ms).is_some() {
            bail!("Duplicate slot {} in SLOT_DEADLINES_MS", slot);
        }
    }
    Ok(table)
}

fn pool_key(
    currency0: Address,
    currency1: Address,
    fee_ppm: u32,
    tick_spacing: i32,
    hooks: Address,
) -> Result<PoolKey> {
    if currency0 >= currency1 {
        bail!("pool currencies must be sorted (currency0 < currency1)");
    }
    if fee_ppm >= 1_000_000 {
        bail!("POOL_FEE_PPM {} must be below 1000000", fee_ppm);
    }
    Ok(PoolKey {
        currency0,
        currency1,
        // Uint<24, 1> has no From<u32>; range checked above.
        fee: U24::from_limbs([fee_ppm as u64]),
        tickSpacing: I24::try_from(tick_spacing)
            .map_err(|e| anyhow!("TICK_SPACING {} out of range: {}", tick_spacing, e))?,
        hooks,
    })
}

fn derive_pool_id(
    currency0: Address,
    currency1: Address,
    fee_ppm: u32,
    tick_spacing: i32,
    hooks: Address,
) -> Result<B256> {
    Ok(pool_key(currency0, currency1, fee_ppm, tick_spacing, hooks)?.pool_id())
}

// ── env helpers ───────────────────────────────────────────────────────

fn env_required(name: &str) -> Result<String> {
    std::env::var(name).with_context(|| format!("{} not set", name))
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_env_required<T>(name: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    let raw = env_required(name)?;
    raw.trim()
        .parse()
        .map_err(|e| anyhow!("Invalid {} '{}': {}", name, raw, e))
}

fn parse_env_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("Invalid {} '{}': {}", name, raw, e)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    /// A valid config for unit tests; no environment involved.
    pub(crate) fn test_config() -> BotConfig {
        BotConfig {
            network: Network::Testnet,
            base_symbol: "ETH".into(),
            quote_symbol: "USDC".into(),
            cex_symbol: "ETHUSDC".into(),
            base_decimals: 18,
            quote_decimals: 6,
            cex_rest_url: "http://localhost".into(),
            cex_ws_url: "ws://localhost".into(),
            cex_api_key: "key".into(),
            cex_api_secret: "secret".into(),
            cex_fee_ppm: 0,
            rpc_url: "http://localhost:8545".into(),
            sequencer_rpc_url: "http://localhost:8545".into(),
            flashblocks_ws_url: "ws://localhost".into(),
            chain_id: 1301,
            private_key: String::new(),
            pool_manager: Address::repeat_byte(0x11),
            state_view: Address::repeat_byte(0x12),
            tick_bitmap_helper: Address::repeat_byte(0x13),
            universal_router: Address::repeat_byte(0x14),
            base_token: Address::ZERO,
            quote_token: Address::repeat_byte(0x15),
            hooks: Address::ZERO,
            pool_id: B256::repeat_byte(0x42),
            pool_fee_ppm: 500,
            tick_spacing: 10,
            trade_size_base: dec!(0.002),
            min_edge: 0,
            max_consecutive_throttles: 3,
            safety_buffer: dec!(1.01),
            dex_gas_reserve: dec!(0.0001),
            slippage_ppm: 5000,
            execution_strategy: ExecutionStrategyKind::Sequential,
            remediation: RemediationPolicy::Halt,
            live_trading: false,
            slot_count: 5,
            slot_deadlines_ms: parse_slot_deadlines(DEFAULT_SLOT_DEADLINES).unwrap(),
            flashblock_capacity: 20,
            gas_limit: 200_000,
            max_fee_per_gas: 1_000_000_000,
            max_priority_fee_per_gas: 1_000_000,
            receipt_poll_interval_ms: 1,
            receipt_poll_attempts: 3,
            queue_warn_depth: 100,
        }
    }

    #[test]
    fn test_parse_slot_deadlines() {
        let table = parse_slot_deadlines("1:80, 2:350,3:570,4:950").unwrap();
        assert_eq!(table.len(), 4);
        assert_eq!(table[&2], 350);
        assert!(parse_slot_deadlines("").unwrap().is_empty());
        assert!(parse_slot_deadlines("1=80").is_err());
        assert!(parse_slot_deadlines("1:80,1:90").is_err());
    }

    #[test]
    fn test_validate_rejects_small_buffer() {
        let mut config = test_config();
        assert!(config.validate().is_ok());
        config.safety_buffer = dec!(1.005);
        assert!(config.validate().is_err(), "buffer below 1% must be rejected");
    }

    #[test]
    fn test_validate_rejects_deadline_outside_slot_range() {
        let mut config = test_config();
        config.slot_deadlines_ms.insert(5, 990);
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.slot_deadlines_ms.insert(0, 10);
        assert!(config.validate().is_err(), "slot 0 never trades");
    }

    #[test]
    fn test_min_safety_buffer_constant() {
        assert_eq!(MIN_SAFETY_BUFFER, dec!(1.01));
    }

    #[test]
    fn test_pool_key_requires_sorted_currencies() {
        let config = test_config();
        assert!(config.pool_key().is_ok());
        assert!(pool_key(Address::repeat_byte(9), Address::ZERO, 500, 10, Address::ZERO).is_err());
    }

    #[test]
    fn test_trade_size_raw() {
        let config = test_config();
        assert_eq!(config.trade_size_raw().unwrap(), 2_000_000_000_000_000);
    }
}
