//! Domain events decoded from raw contract logs

use alloy_primitives::{Address, U256};
use alloy_sol_types::SolEvent;
use serde::Serialize;

use crate::chain::abi::ILiquidityStaking;
use crate::chain::{EventKind, RawLog};

/// Unique position of a log for one contract: `(block_number, log_index)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EventKey {
    pub block_number: u64,
    pub log_index: u64,
}

impl std::fmt::Display for EventKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}:{}", self.block_number, self.log_index)
    }
}

/// Variant-specific data; amounts are wei-scale
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    Staked { staker: Address, amount: U256 },
    Unstaked { staker: Address, amount: U256, reward: U256 },
    Claimed { claimer: Address, amount: U256 },
    ApyUpdated { apy_percent: U256, total_staked: U256 },
}

/// An immutable, decoded staking event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DomainEvent {
    pub block_number: u64,
    pub log_index: u64,
    /// Seconds since epoch, as emitted by the contract
    pub timestamp: u64,
    pub payload: EventPayload,
}

impl DomainEvent {
    pub fn key(&self) -> EventKey {
        EventKey {
            block_number: self.block_number,
            log_index: self.log_index,
        }
    }

    pub fn kind(&self) -> EventKind {
        match self.payload {
            EventPayload::Staked { .. } => EventKind::Staked,
            EventPayload::Unstaked { .. } => EventKind::Unstaked,
            EventPayload::Claimed { .. } => EventKind::Claimed,
            EventPayload::ApyUpdated { .. } => EventKind::ApyUpdated,
        }
    }

    /// Decode a raw log according to its kind
    pub fn decode(raw: &RawLog) -> Result<Self, alloy_sol_types::Error> {
        let (payload, emitted_at) = match raw.kind {
            EventKind::Staked => {
                let e = ILiquidityStaking::Staked::decode_log_data(&raw.data)?;
                (
                    EventPayload::Staked { staker: e.stakerAddress, amount: e.amount },
                    e.stakeTime,
                )
            }
            EventKind::Unstaked => {
                let e = ILiquidityStaking::Unstaked::decode_log_data(&raw.data)?;
                (
                    EventPayload::Unstaked {
                        staker: e.unstakedAddress,
                        amount: e.ethAmount,
                        reward: e.rewardAmount,
                    },
                    e.unstakeTime,
                )
            }
            EventKind::Claimed => {
                let e = ILiquidityStaking::Claimed::decode_log_data(&raw.data)?;
                (
                    EventPayload::Claimed { claimer: e.claimedAddress, amount: e.amount },
                    e.claimedTime,
                )
            }
            EventKind::ApyUpdated => {
                let e = ILiquidityStaking::APYUpdated::decode_log_data(&raw.data)?;
                (
                    EventPayload::ApyUpdated { apy_percent: e.curApy, total_staked: e.totalStaked },
                    e.timeStamp,
                )
            }
        };

        // Contract time is authoritative; fall back to the block header
        let timestamp = match emitted_at.saturating_to::<u64>() {
            0 => raw.block_timestamp.unwrap_or(0),
            ts => ts,
        };

        Ok(Self {
            block_number: raw.block_number,
            log_index: raw.log_index,
            timestamp,
            payload,
        })
    }
}
