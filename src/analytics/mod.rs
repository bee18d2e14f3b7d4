//! Time-Series Aggregation
//!
//! Pure transforms over an event window snapshot. Every pass recomputes
//! all series from scratch; nothing is cached between calls.
//!
//! Series:
//! - TVL/APY: one point per `ApyUpdated`, labelled by block
//! - Volume: staked vs unstaked per time bucket, first-seen bucket order
//! - Rewards: per-claim amount plus exact running total

use alloy_primitives::U256;
use serde::Serialize;
use std::collections::HashMap;

use crate::ingest::{DomainEvent, EventPayload};
use crate::numeric::format::{fmt_timestamp, truncated_units};

/// Default bucket label (UTC wall clock, second resolution)
pub const DEFAULT_BUCKET_FORMAT: &str = "%H:%M:%S";

/// Decimal places kept in cumulative reward labels
const CUMULATIVE_DECIMALS: usize = 4;

// ============================================
// SERIES TYPES
// ============================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TvlPoint {
    /// `#<block_number>`
    pub label: String,
    pub block_number: u64,
    pub tvl: U256,
    pub apy_percent: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VolumePoint {
    pub bucket: String,
    pub staked: U256,
    pub unstaked: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RewardPoint {
    pub label: String,
    pub block_number: u64,
    pub amount: U256,
    /// Exact running sum in wei
    pub cumulative: U256,
    /// `cumulative` truncated to 4 decimals
    pub cumulative_display: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Aggregates {
    pub tvl_apy: Vec<TvlPoint>,
    pub volume: Vec<VolumePoint>,
    pub rewards: Vec<RewardPoint>,
}

/// One row of the APY update feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApyUpdate {
    pub block_number: u64,
    pub timestamp: u64,
    pub apy_percent: U256,
    pub total_staked: U256,
}

// ============================================
// AGGREGATOR
// ============================================

#[derive(Debug, Clone)]
pub struct TimeSeriesAggregator {
    bucket_format: String,
}

impl Default for TimeSeriesAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_BUCKET_FORMAT)
    }
}

impl TimeSeriesAggregator {
    pub fn new(bucket_format: impl Into<String>) -> Self {
        Self {
            bucket_format: bucket_format.into(),
        }
    }

    pub fn bucket_label(&self, timestamp: u64) -> String {
        fmt_timestamp(timestamp, &self.bucket_format)
    }

    /// Build all series. `events` is expected ascending by key
    /// (as published by the ingestor).
    pub fn aggregate(&self, events: &[DomainEvent]) -> Aggregates {
        Aggregates {
            tvl_apy: self.tvl_apy_series(events),
            volume: self.volume_series(events),
            rewards: self.reward_series(events),
        }
    }

    pub fn tvl_apy_series(&self, events: &[DomainEvent]) -> Vec<TvlPoint> {
        events
            .iter()
            .filter_map(|event| match event.payload {
                EventPayload::ApyUpdated { apy_percent, total_staked } => Some(TvlPoint {
                    label: format!("#{}", event.block_number),
                    block_number: event.block_number,
                    tvl: total_staked,
                    apy_percent,
                }),
                _ => None,
            })
            .collect()
    }

    pub fn volume_series(&self, events: &[DomainEvent]) -> Vec<VolumePoint> {
        let mut points: Vec<VolumePoint> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for event in events {
            let (staked, unstaked) = match event.payload {
                EventPayload::Staked { amount, .. } => (amount, U256::ZERO),
                EventPayload::Unstaked { amount, .. } => (U256::ZERO, amount),
                _ => continue,
            };

            let bucket = self.bucket_label(event.timestamp);
            let slot = *index.entry(bucket.clone()).or_insert_with(|| {
                points.push(VolumePoint {
                    bucket,
                    staked: U256::ZERO,
                    unstaked: U256::ZERO,
                });
                points.len() - 1
            });

            let point = &mut points[slot];
            point.staked = point.staked.saturating_add(staked);
            point.unstaked = point.unstaked.saturating_add(unstaked);
        }

        points
    }

    pub fn reward_series(&self, events: &[DomainEvent]) -> Vec<RewardPoint> {
        let mut cumulative = U256::ZERO;

        events
            .iter()
            .filter_map(|event| match event.payload {
                EventPayload::Claimed { amount, .. } => {
                    cumulative = cumulative.saturating_add(amount);
                    Some(RewardPoint {
                        label: self.bucket_label(event.timestamp),
                        block_number: event.block_number,
                        amount,
                        cumulative,
                        cumulative_display: truncated_units(cumulative, CUMULATIVE_DECIMALS),
                    })
                }
                _ => None,
            })
            .collect()
    }
}

/// Most recent `limit` APY updates, newest first
pub fn recent_apy_updates(events: &[DomainEvent], limit: usize) -> Vec<ApyUpdate> {
    events
        .iter()
        .rev()
        .filter_map(|event| match event.payload {
            EventPayload::ApyUpdated { apy_percent, total_staked } => Some(ApyUpdate {
                block_number: event.block_number,
                timestamp: event.timestamp,
                apy_percent,
                total_staked,
            }),
            _ => None,
        })
        .take(limit)
        .collect()
}
