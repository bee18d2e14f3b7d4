//! Contract interfaces used by the RPC adapter and the event decoder

use alloy_primitives::{address, Address};
use alloy_sol_types::sol;

// ============================================
// MULTICALL3 INTERFACE
// ============================================

sol! {
    /// Multicall3 - deployed at same address on all EVM chains
    interface IMulticall3 {
        struct Call3 {
            address target;
            bool allowFailure;
            bytes callData;
        }

        struct Result {
            bool success;
            bytes returnData;
        }

        function aggregate3(Call3[] calldata calls)
            external payable returns (Result[] memory returnData);
    }
}

// ============================================
// LIQUIDITY STAKING INTERFACE
// ============================================

sol! {
    #[derive(Debug, PartialEq, Eq)]
    interface ILiquidityStaking {
        event Staked(address indexed stakerAddress, uint256 amount, uint256 stakeTime);
        event Unstaked(address indexed unstakedAddress, uint256 ethAmount, uint256 rewardAmount, uint256 unstakeTime);
        event Claimed(address indexed claimedAddress, uint256 amount, uint256 claimedTime);
        event APYUpdated(uint256 curApy, uint256 totalStaked, uint256 timeStamp);

        function getPoolInfo() external view returns (
            uint256 currentTvl,
            uint256 currentApy,
            uint256 rewardRate,
            uint256 contractBalance
        );
        function previewApy(uint256 hypotheticalTvl) external view returns (uint256);
    }
}

/// Multicall3 address (same on all EVM chains, including Anvil forks)
pub const MULTICALL3: Address = address!("cA11bde05977b3631167028862bE2a173976CA11");
