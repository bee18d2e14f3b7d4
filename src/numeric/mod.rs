//! Numeric Domain - Fixed-Point Wei Arithmetic
//!
//! All monetary and rate values are `U256` scaled by `PRECISION = 10^18`.
//! Division always truncates (floor), matching the staking contract.
//! `mul_div` widens to 512 bits so `(a * b) / c` never loses precision
//! in the intermediate product.
//!
//! Floating point appears only in `format` (presentation boundary).

pub mod format;
pub mod reward;

use alloy_primitives::{utils::parse_ether, U256, U512};

use crate::error::ArithmeticError;

pub use reward::{calculate_reward, Reward, RewardTable, DURATION_OPTIONS};

// ============================================
// CONSTANTS
// ============================================

/// Wei-scale precision (1 ETH = 10^18 wei)
pub const PRECISION: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// Seconds in a (non-leap) year, as used by the contract
pub const SECONDS_PER_YEAR: u64 = 365 * 24 * 60 * 60;

/// Seconds in a day
pub const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

// ============================================
// PRIMITIVES
// ============================================

/// Scale a whole-unit integer to wei (`x * 10^18`)
pub fn scale(x: u64) -> U256 {
    U256::from(x) * PRECISION
}

pub fn add(a: U256, b: U256) -> Result<U256, ArithmeticError> {
    a.checked_add(b).ok_or(ArithmeticError::Overflow("add"))
}

pub fn mul(a: U256, b: U256) -> Result<U256, ArithmeticError> {
    a.checked_mul(b).ok_or(ArithmeticError::Overflow("mul"))
}

/// Floor division
pub fn div(a: U256, b: U256) -> Result<U256, ArithmeticError> {
    if b.is_zero() {
        return Err(ArithmeticError::DivisionByZero);
    }
    Ok(a / b)
}

/// `floor(a * b / c)` with a 512-bit intermediate product
pub fn mul_div(a: U256, b: U256, c: U256) -> Result<U256, ArithmeticError> {
    if c.is_zero() {
        return Err(ArithmeticError::DivisionByZero);
    }
    let product = widen(a) * widen(b);
    narrow(product / widen(c)).ok_or(ArithmeticError::Overflow("mul_div"))
}

fn widen(x: U256) -> U512 {
    let l = x.as_limbs();
    U512::from_limbs([l[0], l[1], l[2], l[3], 0, 0, 0, 0])
}

fn narrow(x: U512) -> Option<U256> {
    let l = x.as_limbs();
    if l[4..].iter().any(|&limb| limb != 0) {
        return None;
    }
    Some(U256::from_limbs([l[0], l[1], l[2], l[3]]))
}

// ============================================
// DECIMAL INPUT
// ============================================

/// Parse a decimal ETH amount ("1.5") into wei without going through floats
pub fn parse_eth(input: &str) -> Result<U256, ArithmeticError> {
    let trimmed = input.trim();
    if trimmed.starts_with('-') {
        return Err(ArithmeticError::Negative(trimmed.to_string()));
    }
    if trimmed.is_empty() {
        return Ok(U256::ZERO);
    }
    parse_ether(trimmed).map_err(|e| ArithmeticError::InvalidDecimal {
        input: trimmed.to_string(),
        reason: e.to_string(),
    })
}
