//! In-memory `StakingChain` for tests

use alloy_primitives::{Address, U256};
use alloy_sol_types::SolEvent;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::abi::ILiquidityStaking;
use super::{EventKind, EventSink, PoolScalars, RawLog, StakingChain, Subscription};
use crate::error::TransportError;
use crate::numeric::PRECISION;

#[derive(Default)]
struct MockState {
    latest_block: u64,
    history: Vec<RawLog>,
    failing_backfills: HashSet<EventKind>,
    backfill_delay: Option<Duration>,
    sinks: Vec<(EventKind, EventSink)>,
    pool: Option<PoolScalars>,
    pool_failure: Option<String>,
    preview: Option<Result<Vec<Option<U256>>, String>>,
    queries: Vec<(EventKind, u64, u64)>,
}

#[derive(Default, Clone)]
pub struct MockChain {
    state: Arc<Mutex<MockState>>,
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history(self, logs: Vec<RawLog>) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.latest_block = logs.iter().map(|l| l.block_number).max().unwrap_or(0);
            state.history = logs;
        }
        self
    }

    pub fn failing_backfill(self, kind: EventKind) -> Self {
        self.state.lock().unwrap().failing_backfills.insert(kind);
        self
    }

    pub fn with_backfill_delay(self, delay: Duration) -> Self {
        self.state.lock().unwrap().backfill_delay = Some(delay);
        self
    }

    pub fn with_pool(self, pool: Option<PoolScalars>) -> Self {
        self.state.lock().unwrap().pool = pool;
        self
    }

    pub fn with_pool_failure(self, message: &str) -> Self {
        self.state.lock().unwrap().pool_failure = Some(message.to_string());
        self
    }

    pub fn with_preview(self, result: Result<Vec<Option<U256>>, String>) -> Self {
        self.state.lock().unwrap().preview = Some(result);
        self
    }

    pub fn set_pool(&self, pool: Option<PoolScalars>) {
        self.state.lock().unwrap().pool = pool;
    }

    /// Push a live log to every open sink of its kind; returns deliveries
    pub fn deliver(&self, log: RawLog) -> usize {
        let state = self.state.lock().unwrap();
        state
            .sinks
            .iter()
            .filter(|(kind, sink)| *kind == log.kind && !sink.is_closed())
            .filter(|(_, sink)| sink.send(log.clone()).is_ok())
            .count()
    }

    pub fn active_subscriptions(&self) -> usize {
        self.opened.load(Ordering::SeqCst) - self.closed.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> Vec<(EventKind, u64, u64)> {
        self.state.lock().unwrap().queries.clone()
    }
}

#[async_trait]
impl StakingChain for MockChain {
    async fn latest_block(&self) -> Result<u64, TransportError> {
        Ok(self.state.lock().unwrap().latest_block)
    }

    async fn query_events(
        &self,
        _contract: Address,
        kind: EventKind,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawLog>, TransportError> {
        let delay = self.state.lock().unwrap().backfill_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        state.queries.push((kind, from_block, to_block));
        if state.failing_backfills.contains(&kind) {
            return Err(TransportError::new("getLogs", "mock backfill failure"));
        }
        Ok(state
            .history
            .iter()
            .filter(|l| l.kind == kind && l.block_number >= from_block && l.block_number <= to_block)
            .cloned()
            .collect())
    }

    async fn subscribe_events(
        &self,
        _contract: Address,
        kind: EventKind,
        _since_block: u64,
        sink: EventSink,
    ) -> Result<Subscription, TransportError> {
        self.state.lock().unwrap().sinks.push((kind, sink));
        self.opened.fetch_add(1, Ordering::SeqCst);
        let closed = self.closed.clone();
        Ok(Subscription::new(kind, move || {
            closed.fetch_add(1, Ordering::SeqCst);
        }))
    }

    async fn read_pool_scalars(&self, _contract: Address) -> Result<Option<PoolScalars>, TransportError> {
        let state = self.state.lock().unwrap();
        if let Some(message) = &state.pool_failure {
            return Err(TransportError::new("getPoolInfo", message.clone()));
        }
        Ok(state.pool)
    }

    async fn preview_apy_batch(
        &self,
        _contract: Address,
        tvls: &[U256],
    ) -> Result<Vec<Option<U256>>, TransportError> {
        let state = self.state.lock().unwrap();
        match &state.preview {
            Some(Ok(apys)) => Ok(apys.clone()),
            Some(Err(message)) => Err(TransportError::new("aggregate3", message.clone())),
            // Default curve: APY falls as TVL grows
            None => Ok(tvls
                .iter()
                .map(|tvl| {
                    let eth = (*tvl / PRECISION).saturating_to::<u64>();
                    Some(U256::from(100u64.saturating_sub(eth / 5).max(10)))
                })
                .collect()),
        }
    }
}

// ============================================
// LOG BUILDERS
// ============================================

pub fn eth(n: u64) -> U256 {
    U256::from(n) * PRECISION
}

pub fn staker() -> Address {
    Address::repeat_byte(0xAA)
}

pub fn staked_log(block: u64, index: u64, amount: U256, ts: u64) -> RawLog {
    let event = ILiquidityStaking::Staked {
        stakerAddress: staker(),
        amount,
        stakeTime: U256::from(ts),
    };
    raw(EventKind::Staked, block, index, event.encode_log_data())
}

pub fn unstaked_log(block: u64, index: u64, amount: U256, reward: U256, ts: u64) -> RawLog {
    let event = ILiquidityStaking::Unstaked {
        unstakedAddress: staker(),
        ethAmount: amount,
        rewardAmount: reward,
        unstakeTime: U256::from(ts),
    };
    raw(EventKind::Unstaked, block, index, event.encode_log_data())
}

pub fn claimed_log(block: u64, index: u64, amount: U256, ts: u64) -> RawLog {
    let event = ILiquidityStaking::Claimed {
        claimedAddress: staker(),
        amount,
        claimedTime: U256::from(ts),
    };
    raw(EventKind::Claimed, block, index, event.encode_log_data())
}

pub fn apy_log(block: u64, index: u64, apy: u64, tvl: U256, ts: u64) -> RawLog {
    let event = ILiquidityStaking::APYUpdated {
        curApy: U256::from(apy),
        totalStaked: tvl,
        timeStamp: U256::from(ts),
    };
    raw(EventKind::ApyUpdated, block, index, event.encode_log_data())
}

fn raw(kind: EventKind, block_number: u64, log_index: u64, data: alloy_primitives::LogData) -> RawLog {
    RawLog {
        block_number,
        log_index,
        block_timestamp: None,
        kind,
        data,
    }
}
