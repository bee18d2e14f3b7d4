//! Error Taxonomy
//!
//! Every failure in the core resolves to one of these values:
//! - `TransportError`: a chain read or subscription failed
//! - `ArithmeticError`: invalid numeric input to a calculation
//! - `UnsupportedNetworkError`: no known deployment for a chain id
//! - `PartialResultWarning`: not an error, attached to best-effort output

use serde::Serialize;
use thiserror::Error;

// ============================================
// TRANSPORT
// ============================================

/// A chain read/subscribe call failed (network or RPC issue)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{op} failed: {message}")]
pub struct TransportError {
    /// Name of the capability that failed (e.g. "getLogs", "getPoolInfo")
    pub op: &'static str,
    pub message: String,
}

impl TransportError {
    pub fn new(op: &'static str, message: impl Into<String>) -> Self {
        Self {
            op,
            message: message.into(),
        }
    }
}

// ============================================
// ARITHMETIC
// ============================================

/// Invalid numeric input; fatal to the single calculation that raised it
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArithmeticError {
    #[error("division by zero")]
    DivisionByZero,

    #[error("arithmetic overflow in {0}")]
    Overflow(&'static str),

    #[error("negative amount not allowed: {0}")]
    Negative(String),

    #[error("invalid decimal amount '{input}': {reason}")]
    InvalidDecimal { input: String, reason: String },
}

// ============================================
// NETWORK
// ============================================

/// No staking contract is known for the active chain id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unsupported network: no staking contract deployed on chain {chain_id}")]
pub struct UnsupportedNetworkError {
    pub chain_id: u64,
}

// ============================================
// PARTIAL RESULTS
// ============================================

/// A batched read returned incomplete data. Missing items were replaced
/// with a default value; callers decide whether the result is usable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartialResultWarning {
    /// Indices (in request order) of the items that have no result
    pub missing: Vec<usize>,
    /// Set when the entire batch failed
    pub cause: Option<String>,
}

impl PartialResultWarning {
    pub fn is_total_failure(&self) -> bool {
        self.cause.is_some()
    }
}

impl std::fmt::Display for PartialResultWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "batch failed ({}), {} items defaulted", cause, self.missing.len()),
            None => write!(f, "{} items missing from batch: {:?}", self.missing.len(), self.missing),
        }
    }
}

// ============================================
// UMBRELLA
// ============================================

/// Any error the core can return
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Arithmetic(#[from] ArithmeticError),

    #[error(transparent)]
    UnsupportedNetwork(#[from] UnsupportedNetworkError),
}
