//! Centralized Contract Definitions
//!
//! Solidity interfaces and events for the Uniswap v4 pool the engine tracks,
//! defined using alloy's `sol!` macro.
//!
//! Interfaces annotated with `#[sol(rpc)]` generate contract instance types
//! that can make RPC calls via any alloy Provider. Events are decoded from raw
//! flashblock logs with `SolEvent::decode_raw_log`.
//!
//! Author: AI-Generated
//! Created: 2026-10-17

use alloy::primitives::{keccak256, B256};
use alloy::sol;
use alloy::sol_types::SolValue;

// ── ERC20 ─────────────────────────────────────────────────────────────

sol! {
    #[sol(rpc)]
    interface IERC20 {
        function balanceOf(address account) external view returns (uint256);
        function decimals() external view returns (uint8);

        event Transfer(address indexed from, address indexed to, uint256 value);
    }
}

// ── Uniswap v4 PoolManager events ─────────────────────────────────────

sol! {
    interface IPoolManager {
        event Swap(
            bytes32 indexed id,
            address indexed sender,
            int128 amount0,
            int128 amount1,
            uint160 sqrtPriceX96,
            uint128 liquidity,
            int24 tick,
            uint24 fee
        );

        event ModifyLiquidity(
            bytes32 indexed id,
            address indexed sender,
            int24 tickLower,
            int24 tickUpper,
            int256 liquidityDelta,
            bytes32 salt
        );

        event Donate(
            bytes32 indexed id,
            address indexed sender,
            uint256 amount0,
            uint256 amount1
        );
    }
}

// ── Uniswap v4 pool key + Universal Router swap params ────────────────

sol! {
    #[derive(Debug, PartialEq, Eq)]
    struct PoolKey {
        address currency0;
        address currency1;
        uint24 fee;
        int24 tickSpacing;
        address hooks;
    }

    struct ExactInputSingleParams {
        PoolKey poolKey;
        bool zeroForOne;
        uint128 amountIn;
        uint128 amountOutMinimum;
        bytes hookData;
    }

    struct ExactOutputSingleParams {
        PoolKey poolKey;
        bool zeroForOne;
        uint128 amountOut;
        uint128 amountInMaximum;
        bytes hookData;
    }

    interface IUniversalRouter {
        function execute(bytes calldata commands, bytes[] calldata inputs, uint256 deadline) external payable;
    }
}

impl PoolKey {
    /// PoolId = keccak256(abi.encode(key)).
    pub fn pool_id(&self) -> B256 {
        keccak256(self.abi_encode())
    }
}

// ── Uniswap v4 StateView (slot0 / liquidity reads) ────────────────────

sol! {
    #[sol(rpc)]
    interface IStateView {
        function getSlot0(bytes32 poolId) external view returns (
            uint160 sqrtPriceX96,
            int24 tick,
            uint24 protocolFee,
            uint24 lpFee
        );
        function getLiquidity(bytes32 poolId) external view returns (uint128 liquidity);
    }
}

// ── Tick bitmap helper (batched snapshot reads) ───────────────────────

sol! {
    #[sol(rpc)]
    interface ITickBitmapHelper {
        struct TickBitmapWord {
            int16 index;
            uint256 bitmap;
        }

        struct TickInfo {
            int24 index;
            uint128 liquidityGross;
            int128 liquidityNet;
            uint256 feeGrowthOutside0X128;
            uint256 feeGrowthOutside1X128;
        }

        function getTickBitmapsRange(bytes32 poolId, int16 minWord, int16 maxWord)
            external view returns (TickBitmapWord[] memory);

        function getTicks(bytes32 poolId, int24[] calldata ticks)
            external view returns (TickInfo[] memory);
    }
}

// ── Universal Router encoding constants ───────────────────────────────

/// Universal Router command byte for a v4 swap.
pub const V4_SWAP: u8 = 0x10;

/// v4 router action bytes.
pub mod actions {
    pub const SWAP_EXACT_IN_SINGLE: u8 = 0x06;
    pub const SWAP_EXACT_OUT_SINGLE: u8 = 0x08;
    pub const SETTLE_ALL: u8 = 0x0c;
    pub const TAKE_ALL: u8 = 0x0f;
}
