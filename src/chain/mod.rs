//! Chain Capabilities
//!
//! The core never talks to an RPC node directly. It consumes the
//! `StakingChain` capability trait:
//! - bounded log range queries (backfill)
//! - push subscriptions delivering into an `EventSink` (live)
//! - `getPoolInfo()` and batched `previewApy()` view calls
//!
//! `RpcChain` implements it over alloy; tests use an in-memory mock.

pub mod abi;
mod rpc;

#[cfg(test)]
pub(crate) mod mock;

use alloy_primitives::{Address, LogData, B256, U256};
use alloy_sol_types::SolEvent;
use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::TransportError;
use abi::ILiquidityStaking;

pub use rpc::{RpcChain, DEFAULT_LOG_CHUNK_SIZE};

// ============================================
// EVENT KINDS
// ============================================

/// Contract events the core watches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum EventKind {
    Staked,
    Unstaked,
    Claimed,
    ApyUpdated,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::Staked,
        EventKind::Unstaked,
        EventKind::Claimed,
        EventKind::ApyUpdated,
    ];

    /// topic0 of the event
    pub fn signature_hash(&self) -> B256 {
        match self {
            EventKind::Staked => ILiquidityStaking::Staked::SIGNATURE_HASH,
            EventKind::Unstaked => ILiquidityStaking::Unstaked::SIGNATURE_HASH,
            EventKind::Claimed => ILiquidityStaking::Claimed::SIGNATURE_HASH,
            EventKind::ApyUpdated => ILiquidityStaking::APYUpdated::SIGNATURE_HASH,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::Staked => write!(f, "Staked"),
            EventKind::Unstaked => write!(f, "Unstaked"),
            EventKind::Claimed => write!(f, "Claimed"),
            EventKind::ApyUpdated => write!(f, "APYUpdated"),
        }
    }
}

// ============================================
// RAW LOGS
// ============================================

/// A log entry as delivered by the chain, not yet decoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLog {
    pub block_number: u64,
    pub log_index: u64,
    /// Block timestamp when the node provides it
    pub block_timestamp: Option<u64>,
    pub kind: EventKind,
    pub data: LogData,
}

/// Where live deliveries are enqueued. Sending never blocks.
pub type EventSink = mpsc::UnboundedSender<RawLog>;

/// Pool-level scalars as returned by `getPoolInfo()`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PoolScalars {
    pub tvl: U256,
    pub apy: U256,
    pub reward_rate: U256,
    pub reward_pool_balance: U256,
}

// ============================================
// SUBSCRIPTION HANDLE
// ============================================

/// Live subscription handle. Dropping it unsubscribes.
pub struct Subscription {
    kind: EventKind,
    on_close: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(kind: EventKind, on_close: impl FnOnce() + Send + 'static) -> Self {
        Self {
            kind,
            on_close: Some(Box::new(on_close)),
        }
    }

    /// Subscription backed by a polling task; closing aborts the task
    pub fn from_task(kind: EventKind, task: tokio::task::JoinHandle<()>) -> Self {
        Self::new(kind, move || task.abort())
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn unsubscribe(self) {
        drop(self)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(close) = self.on_close.take() {
            close();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("kind", &self.kind).finish()
    }
}

// ============================================
// CAPABILITY TRAIT
// ============================================

#[async_trait]
pub trait StakingChain: Send + Sync + 'static {
    /// Latest block number known to the node
    async fn latest_block(&self) -> Result<u64, TransportError>;

    /// All logs of `kind` emitted by `contract` in `[from_block, to_block]`
    async fn query_events(
        &self,
        contract: Address,
        kind: EventKind,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawLog>, TransportError>;

    /// Deliver every new log of `kind` into `sink`. `since_block` is the
    /// first block the subscriber has not seen; implementations may
    /// redeliver older logs.
    async fn subscribe_events(
        &self,
        contract: Address,
        kind: EventKind,
        since_block: u64,
        sink: EventSink,
    ) -> Result<Subscription, TransportError>;

    /// `getPoolInfo()`; `None` when the contract returned no data
    async fn read_pool_scalars(&self, contract: Address) -> Result<Option<PoolScalars>, TransportError>;

    /// `previewApy(tvl)` for each input, in order; `None` for failed items
    async fn preview_apy_batch(
        &self,
        contract: Address,
        tvls: &[U256],
    ) -> Result<Vec<Option<U256>>, TransportError>;
}
