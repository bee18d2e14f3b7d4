//! Reward Calculator
//!
//! Off-chain replica of the staking contract's reward formula:
//!
//! ```text
//! rate       = PRECISION * apy / (100 * SECONDS_PER_YEAR)   (floor)
//! reward_wei = amount_wei * duration_secs * rate / PRECISION (floor)
//! reward     = reward_wei / PRECISION                        (token units)
//! ```
//!
//! `reward_wei` is bit-for-bit what the contract pays out.

use alloy_primitives::U256;
use serde::Serialize;

use super::{format, mul, mul_div, parse_eth, PRECISION, SECONDS_PER_DAY, SECONDS_PER_YEAR};
use crate::error::ArithmeticError;

/// A preset staking duration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurationOption {
    pub label: &'static str,
    pub days: u64,
}

pub const DURATION_OPTIONS: [DurationOption; 5] = [
    DurationOption { label: "1 day", days: 1 },
    DurationOption { label: "7 days", days: 7 },
    DurationOption { label: "30 days", days: 30 },
    DurationOption { label: "90 days", days: 90 },
    DurationOption { label: "1 year", days: 365 },
];

// ============================================
// REWARD VALUE
// ============================================

/// Result of a reward calculation, held in reward-token wei
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize)]
pub struct Reward {
    wei: U256,
}

impl Reward {
    pub const ZERO: Reward = Reward { wei: U256::ZERO };

    pub fn from_wei(wei: U256) -> Self {
        Self { wei }
    }

    /// Exact contract result (first floor division)
    pub fn wei(&self) -> U256 {
        self.wei
    }

    /// Whole reward tokens (second floor division by PRECISION)
    pub fn whole_tokens(&self) -> U256 {
        self.wei / PRECISION
    }

    pub fn is_zero(&self) -> bool {
        self.wei.is_zero()
    }

    /// Lossy value for charts and labels only
    pub fn to_f64(&self) -> f64 {
        format::to_eth_f64(self.wei)
    }
}

impl std::fmt::Display for Reward {
    /// Exact decimal value, trailing zeros trimmed
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", format::exact_units(self.wei))
    }
}

// ============================================
// CALCULATOR
// ============================================

/// Per-second reward rate for an APY percent, scaled by PRECISION
pub fn rate_per_second(apy_percent: u64) -> Result<U256, ArithmeticError> {
    mul_div(
        PRECISION,
        U256::from(apy_percent),
        U256::from(100u64) * U256::from(SECONDS_PER_YEAR),
    )
}

/// Reward for a wei-scale stake
pub fn reward_for_wei(
    amount_wei: U256,
    apy_percent: u64,
    duration_days: u64,
) -> Result<Reward, ArithmeticError> {
    if amount_wei.is_zero() || apy_percent == 0 || duration_days == 0 {
        return Ok(Reward::ZERO);
    }

    let rate = rate_per_second(apy_percent)?;
    let duration_secs = mul(U256::from(duration_days), U256::from(SECONDS_PER_DAY))?;
    let stake_time = mul(amount_wei, duration_secs)?;

    Ok(Reward::from_wei(mul_div(stake_time, rate, PRECISION)?))
}

/// Reward for a decimal ETH amount ("10", "0.25")
pub fn calculate_reward(
    amount_eth: &str,
    apy_percent: u64,
    duration_days: u64,
) -> Result<Reward, ArithmeticError> {
    let amount_wei = parse_eth(amount_eth)?;
    reward_for_wei(amount_wei, apy_percent, duration_days)
}

// ============================================
// REWARD TABLE
// ============================================

/// Rewards over the standard horizons for one stake at one APY
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RewardTable {
    pub daily: Reward,
    pub weekly: Reward,
    pub monthly: Reward,
    pub yearly: Reward,
}

impl RewardTable {
    pub fn for_stake(amount_wei: U256, apy_percent: u64) -> Result<Self, ArithmeticError> {
        Ok(Self {
            daily: reward_for_wei(amount_wei, apy_percent, 1)?,
            weekly: reward_for_wei(amount_wei, apy_percent, 7)?,
            monthly: reward_for_wei(amount_wei, apy_percent, 30)?,
            yearly: reward_for_wei(amount_wei, apy_percent, 365)?,
        })
    }
}
