//! Pool Snapshot Poller
//!
//! Re-reads `getPoolInfo()` on a fixed interval and on demand. Each
//! successful read replaces the snapshot wholesale; no history is kept.

use alloy_primitives::{Address, U256};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::chain::{PoolScalars, StakingChain};
use crate::error::{ArithmeticError, TransportError};
use crate::numeric::{mul, mul_div, scale, PRECISION, SECONDS_PER_DAY, SECONDS_PER_YEAR};

// ============================================
// SNAPSHOT
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ApyStatus {
    /// Nothing staked
    Empty,
    /// Below 20%
    AtMinimum,
    Healthy,
    /// Above 80%
    High,
}

impl std::fmt::Display for ApyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApyStatus::Empty => write!(f, "Empty Pool"),
            ApyStatus::AtMinimum => write!(f, "At Minimum"),
            ApyStatus::Healthy => write!(f, "Healthy"),
            ApyStatus::High => write!(f, "High Yield"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PoolSnapshot {
    pub tvl: U256,
    /// Percent
    pub apy: U256,
    /// Reward wei per second per staked ETH
    pub reward_rate_per_second: U256,
    pub reward_pool_balance: U256,
}

impl From<PoolScalars> for PoolSnapshot {
    fn from(scalars: PoolScalars) -> Self {
        Self {
            tvl: scalars.tvl,
            apy: scalars.apy,
            reward_rate_per_second: scalars.reward_rate,
            reward_pool_balance: scalars.reward_pool_balance,
        }
    }
}

impl PoolSnapshot {
    pub fn zeroed() -> Self {
        Self::default()
    }

    /// Reward wei earned by 1 ETH in one day
    pub fn daily_reward_per_eth(&self) -> Result<U256, ArithmeticError> {
        mul(self.reward_rate_per_second, U256::from(SECONDS_PER_DAY))
    }

    /// Reward wei paid to the whole pool over one year at the current rate
    pub fn yearly_payout(&self) -> Result<U256, ArithmeticError> {
        let per_eth_year = mul(self.reward_rate_per_second, U256::from(SECONDS_PER_YEAR))?;
        mul_div(self.tvl, per_eth_year, PRECISION)
    }

    /// TVL as a percent of `target_eth`, capped at 100
    pub fn utilization_pct(&self, target_eth: u64) -> u64 {
        if target_eth == 0 {
            return 0;
        }
        mul_div(self.tvl, U256::from(100u64), scale(target_eth))
            .map(|pct| pct.min(U256::from(100u64)).saturating_to::<u64>())
            .unwrap_or(100)
    }

    pub fn apy_status(&self) -> ApyStatus {
        if self.tvl.is_zero() {
            ApyStatus::Empty
        } else if self.apy < U256::from(20u64) {
            ApyStatus::AtMinimum
        } else if self.apy > U256::from(80u64) {
            ApyStatus::High
        } else {
            ApyStatus::Healthy
        }
    }
}

// ============================================
// POLLER
// ============================================

pub struct PoolSnapshotPoller<C: StakingChain> {
    chain: Arc<C>,
    contract: Address,
}

impl<C: StakingChain> PoolSnapshotPoller<C> {
    pub fn new(chain: Arc<C>, contract: Address) -> Self {
        Self { chain, contract }
    }

    /// Single read. "No data yet" is a zeroed snapshot; transport
    /// failures are returned as-is.
    pub async fn poll(&self) -> Result<PoolSnapshot, TransportError> {
        match self.chain.read_pool_scalars(self.contract).await? {
            Some(scalars) => Ok(scalars.into()),
            None => {
                debug!("getPoolInfo returned no data for {:?}, using zeroed snapshot", self.contract);
                Ok(PoolSnapshot::zeroed())
            }
        }
    }

    /// Poll every `interval` (first read immediately) until the handle is
    /// dropped or shut down
    pub fn spawn(self, interval: Duration) -> PollerHandle {
        let (tx, rx) = watch::channel(PollState::default());
        let refresh = Arc::new(Notify::new());
        let trigger = refresh.clone();

        info!("Pool poller started ({:?} interval)", interval);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = trigger.notified() => debug!("Pool refresh requested"),
                }

                let result = self.poll().await;
                tx.send_modify(|state| {
                    state.polls += 1;
                    match result {
                        Ok(snapshot) => {
                            state.snapshot = snapshot;
                            state.last_error = None;
                        }
                        Err(e) => {
                            warn!("Pool poll failed: {}", e);
                            state.last_error = Some(e);
                        }
                    }
                });
            }
        });

        PollerHandle { state: rx, refresh, task }
    }
}

/// Published by the background poller
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollState {
    /// Last successful read (zeroed until the first one)
    pub snapshot: PoolSnapshot,
    /// Error of the most recent attempt, cleared on success
    pub last_error: Option<TransportError>,
    /// Attempts so far
    pub polls: u64,
}

pub struct PollerHandle {
    state: watch::Receiver<PollState>,
    refresh: Arc<Notify>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    pub fn snapshot(&self) -> PoolSnapshot {
        self.state.borrow().snapshot
    }

    pub fn state(&self) -> PollState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PollState> {
        self.state.clone()
    }

    /// Poll now instead of waiting for the next tick
    pub fn refresh(&self) {
        self.refresh.notify_one();
    }

    pub fn shutdown(self) {
        // Drop aborts the task
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::{eth, MockChain};
    use crate::numeric::reward::rate_per_second;
    use tokio_test::{assert_err, assert_ok};

    fn scalars(tvl: U256, apy: u64) -> PoolScalars {
        PoolScalars {
            tvl,
            apy: U256::from(apy),
            reward_rate: rate_per_second(apy).unwrap(),
            reward_pool_balance: eth(1_000),
        }
    }

    fn poller(mock: MockChain) -> PoolSnapshotPoller<MockChain> {
        PoolSnapshotPoller::new(Arc::new(mock), Address::repeat_byte(1))
    }

    async fn wait_for_polls(rx: &mut watch::Receiver<PollState>, polls: u64) -> PollState {
        let state = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| s.polls >= polls))
            .await
            .expect("timed out waiting for poll")
            .expect("poller stopped");
        state.clone()
    }

    #[tokio::test]
    async fn test_poll_reads_scalars() {
        let snapshot = assert_ok!(poller(MockChain::new().with_pool(Some(scalars(eth(10), 50)))).poll().await);
        assert_eq!(snapshot.tvl, eth(10));
        assert_eq!(snapshot.apy, U256::from(50));
        assert_eq!(snapshot.reward_pool_balance, eth(1_000));
    }

    #[tokio::test]
    async fn test_no_data_is_zeroed() {
        let snapshot = assert_ok!(poller(MockChain::new()).poll().await);
        assert_eq!(snapshot, PoolSnapshot::zeroed());
    }

    #[tokio::test]
    async fn test_transport_failure_is_not_zeroed() {
        let err = assert_err!(poller(MockChain::new().with_pool_failure("connection refused")).poll().await);
        assert_eq!(err.op, "getPoolInfo");
    }

    #[tokio::test]
    async fn test_background_refresh() {
        let mock = MockChain::new().with_pool(Some(scalars(eth(10), 50)));
        let handle = poller(mock.clone()).spawn(Duration::from_secs(3_600));
        let mut rx = handle.subscribe();

        let state = wait_for_polls(&mut rx, 1).await;
        assert_eq!(state.snapshot.tvl, eth(10));

        mock.set_pool(Some(scalars(eth(20), 40)));
        handle.refresh();
        let state = wait_for_polls(&mut rx, 2).await;
        assert_eq!(state.snapshot.tvl, eth(20));
        assert_eq!(handle.snapshot().apy, U256::from(40));
    }

    #[tokio::test]
    async fn test_failed_poll_keeps_last_snapshot() {
        let mock = MockChain::new().with_pool_failure("timeout");
        let handle = poller(mock).spawn(Duration::from_secs(3_600));
        let mut rx = handle.subscribe();

        let state = wait_for_polls(&mut rx, 1).await;
        assert_eq!(state.snapshot, PoolSnapshot::zeroed());
        assert_eq!(state.last_error.map(|e| e.op), Some("getPoolInfo"));
    }

    #[test]
    fn test_derived_metrics() {
        let snapshot = PoolSnapshot::from(scalars(eth(50), 20));

        // 6_341_958_396 wei/s * 86_400
        assert_eq!(assert_ok!(snapshot.daily_reward_per_eth()), U256::from(547_945_205_414_400u64));
        // 50 ETH at 20% is ~10 tokens a year (rate truncation dust)
        let yearly = assert_ok!(snapshot.yearly_payout());
        assert_eq!(yearly, U256::from(9_999_999_998_812_800_000u128));
        assert_eq!(snapshot.utilization_pct(100), 50);
        assert_eq!(snapshot.utilization_pct(10), 100);
        assert_eq!(snapshot.utilization_pct(0), 0);
    }

    #[test]
    fn test_apy_status() {
        let status = |tvl: U256, apy: u64| PoolSnapshot { tvl, apy: U256::from(apy), ..PoolSnapshot::zeroed() }.apy_status();
        assert_eq!(status(U256::ZERO, 90), ApyStatus::Empty);
        assert_eq!(status(eth(1), 10), ApyStatus::AtMinimum);
        assert_eq!(status(eth(1), 20), ApyStatus::Healthy);
        assert_eq!(status(eth(1), 80), ApyStatus::Healthy);
        assert_eq!(status(eth(1), 81), ApyStatus::High);
    }
}
