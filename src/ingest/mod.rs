//! Event Ingestor
//!
//! One session per watched `(contract, chain id)` pair:
//!
//! ```text
//! Idle -> Backfilling -> Live
//! ```
//!
//! - Backfilling: one bounded log query per event kind, merged by key
//! - Live: one subscription per kind, all feeding a single unbounded queue
//! - Every append goes through the session task (sorted insert + dedup + evict)
//!
//! Readers never touch the window. They get `IngestState` snapshots from a
//! `watch` channel.

pub mod event;
pub mod window;

use alloy_primitives::Address;
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::chain::{EventKind, RawLog, StakingChain};
use crate::config::Config;
use crate::error::TransportError;

pub use event::{DomainEvent, EventKey, EventPayload};
pub use window::{AppendOutcome, EventWindow};

// ============================================
// TYPES
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IngestPhase {
    Idle,
    Backfilling,
    Live,
}

/// The pair a session is bound to. `chain_id` labels the session; the
/// transport is the handle's chain, so a different network goes through
/// `IngestorHandle::watch_on`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WatchTarget {
    pub contract: Address,
    pub chain_id: u64,
}

#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Maximum events retained in the window
    pub capacity: usize,
    pub kinds: Vec<EventKind>,
    /// First block included in the backfill
    pub from_block: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            capacity: 50,
            kinds: EventKind::ALL.to_vec(),
            from_block: 0,
        }
    }
}

impl IngestConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            capacity: config.event_window_capacity,
            kinds: EventKind::ALL.to_vec(),
            from_block: config.from_block,
        }
    }
}

/// Recovered failures; the session keeps running after each of them
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestWarning {
    BackfillFailed { kind: EventKind, error: TransportError },
    SubscribeFailed { kind: EventKind, error: TransportError },
    Undecodable { kind: EventKind, key: EventKey, reason: String },
}

impl std::fmt::Display for IngestWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestWarning::BackfillFailed { kind, error } => write!(f, "{} backfill failed: {}", kind, error),
            IngestWarning::SubscribeFailed { kind, error } => write!(f, "{} subscription failed: {}", kind, error),
            IngestWarning::Undecodable { kind, key, reason } => {
                write!(f, "undecodable {} log at {}: {}", kind, key, reason)
            }
        }
    }
}

/// Published view of a session
#[derive(Debug, Clone)]
pub struct IngestState {
    pub target: Option<WatchTarget>,
    pub phase: IngestPhase,
    /// Ascending by key
    pub events: Arc<[DomainEvent]>,
    pub warnings: Vec<IngestWarning>,
}

impl IngestState {
    fn idle(target: Option<WatchTarget>) -> Self {
        Self {
            target,
            phase: IngestPhase::Idle,
            events: Arc::from(Vec::new()),
            warnings: Vec::new(),
        }
    }

    /// Key of the newest event in the window
    pub fn latest_key(&self) -> Option<EventKey> {
        self.events.last().map(DomainEvent::key)
    }

    /// Stake, unstake and claim events newer than `seen`; these change the
    /// pool scalars
    pub fn pool_changes_after(&self, seen: Option<EventKey>) -> usize {
        self.events
            .iter()
            .filter(|e| Some(e.key()) > seen && e.kind() != EventKind::ApyUpdated)
            .count()
    }
}

// ============================================
// HANDLE
// ============================================

pub struct IngestorHandle<C: StakingChain> {
    chain: Arc<C>,
    config: IngestConfig,
    state: Arc<watch::Sender<IngestState>>,
    session: Option<JoinHandle<()>>,
}

impl<C: StakingChain> IngestorHandle<C> {
    pub fn new(chain: Arc<C>, config: IngestConfig) -> Self {
        let (state, _) = watch::channel(IngestState::idle(None));
        Self {
            chain,
            config,
            state: Arc::new(state),
            session: None,
        }
    }

    /// Start watching `target`, replacing any running session.
    ///
    /// The previous session is aborted and awaited before the window is
    /// reset, so nothing from the old pair reaches the new window.
    pub async fn watch(&mut self, target: WatchTarget) {
        self.stop().await;

        self.state.send_replace(IngestState::idle(Some(target)));
        info!(
            "Watching {:?} on chain {} (capacity {}, from block {})",
            target.contract, target.chain_id, self.config.capacity, self.config.from_block
        );

        let session = Session {
            chain: self.chain.clone(),
            target,
            config: self.config.clone(),
            window: EventWindow::new(self.config.capacity),
            warnings: Vec::new(),
            state: self.state.clone(),
        };
        self.session = Some(tokio::spawn(session.run()));
    }

    /// Start watching `target` through another chain handle (a different
    /// network or RPC endpoint). The old session is stopped before the
    /// chain is replaced.
    pub async fn watch_on(&mut self, chain: Arc<C>, target: WatchTarget) {
        self.stop().await;
        self.chain = chain;
        self.watch(target).await;
    }

    /// Cancel the running session, if any. Its subscriptions close as the
    /// task is dropped.
    pub async fn stop(&mut self) {
        if let Some(task) = self.session.take() {
            task.abort();
            // Cancelled (or already finished); either way the task is gone
            let _ = task.await;
            debug!("Previous ingest session stopped");
        }
    }

    /// Current window snapshot, ascending by key
    pub fn window(&self) -> Arc<[DomainEvent]> {
        self.state.borrow().events.clone()
    }

    pub fn phase(&self) -> IngestPhase {
        self.state.borrow().phase
    }

    pub fn warnings(&self) -> Vec<IngestWarning> {
        self.state.borrow().warnings.clone()
    }

    pub fn state(&self) -> IngestState {
        self.state.borrow().clone()
    }

    /// Receiver notified on every published change
    pub fn subscribe(&self) -> watch::Receiver<IngestState> {
        self.state.subscribe()
    }
}

impl<C: StakingChain> Drop for IngestorHandle<C> {
    fn drop(&mut self) {
        if let Some(task) = self.session.take() {
            task.abort();
        }
    }
}

// ============================================
// SESSION TASK
// ============================================

struct Session<C: StakingChain> {
    chain: Arc<C>,
    target: WatchTarget,
    config: IngestConfig,
    window: EventWindow,
    warnings: Vec<IngestWarning>,
    state: Arc<watch::Sender<IngestState>>,
}

impl<C: StakingChain> Session<C> {
    async fn run(mut self) {
        self.set_phase(IngestPhase::Backfilling);
        let next_block = self.backfill().await;

        let (sink, mut deliveries) = mpsc::unbounded_channel::<RawLog>();
        let mut subscriptions = Vec::with_capacity(self.config.kinds.len());

        for kind in self.config.kinds.clone() {
            match self
                .chain
                .subscribe_events(self.target.contract, kind, next_block, sink.clone())
                .await
            {
                Ok(subscription) => subscriptions.push(subscription),
                Err(error) => {
                    warn!("Subscribing to {} failed: {}", kind, error);
                    self.warnings.push(IngestWarning::SubscribeFailed { kind, error });
                }
            }
        }
        drop(sink);
        self.publish();

        self.set_phase(IngestPhase::Live);
        info!(
            "Live with {} subscriptions, {} events in window",
            subscriptions.len(),
            self.window.len()
        );

        while let Some(raw) = deliveries.recv().await {
            if self.ingest(raw) {
                self.publish();
            }
        }

        debug!("All subscriptions closed for {:?}", self.target.contract);
    }

    /// Query every watched kind up to the latest block; returns the first
    /// block the live subscriptions should start from
    async fn backfill(&mut self) -> u64 {
        let from_block = self.config.from_block;

        let latest = match self.chain.latest_block().await {
            Ok(latest) => latest,
            Err(error) => {
                warn!("Backfill skipped, latest block unavailable: {}", error);
                for kind in self.config.kinds.clone() {
                    self.warnings.push(IngestWarning::BackfillFailed { kind, error: error.clone() });
                }
                self.publish();
                return from_block;
            }
        };

        if latest < from_block {
            debug!("Nothing to backfill: latest block {} < from block {}", latest, from_block);
            return from_block;
        }

        let contract = self.target.contract;
        let chain = &self.chain;
        let queries = self
            .config
            .kinds
            .iter()
            .map(|kind| async move { (*kind, chain.query_events(contract, *kind, from_block, latest).await) });
        let results = join_all(queries).await;

        let mut logs = Vec::new();
        for (kind, result) in results {
            match result {
                Ok(batch) => {
                    debug!("Backfilled {} {} logs", batch.len(), kind);
                    logs.extend(batch);
                }
                Err(error) => {
                    warn!("{} backfill failed: {}", kind, error);
                    self.warnings.push(IngestWarning::BackfillFailed { kind, error });
                }
            }
        }

        logs.sort_by_key(|log| (log.block_number, log.log_index));
        let total = logs.len();
        let added = logs.into_iter().filter(|raw| self.ingest(raw.clone())).count();

        info!(
            "Backfill complete: {} logs in blocks {}..={}, {} added",
            total, from_block, latest, added
        );
        self.publish();

        latest.saturating_add(1)
    }

    /// Decode and append one log; true when the window changed
    fn ingest(&mut self, raw: RawLog) -> bool {
        let key = EventKey {
            block_number: raw.block_number,
            log_index: raw.log_index,
        };

        let event = match DomainEvent::decode(&raw) {
            Ok(event) => event,
            Err(e) => {
                warn!("Skipping undecodable {} log at {}: {}", raw.kind, key, e);
                self.warnings.push(IngestWarning::Undecodable {
                    kind: raw.kind,
                    key,
                    reason: e.to_string(),
                });
                self.publish();
                return false;
            }
        };

        match self.window.append(event) {
            AppendOutcome::Inserted { evicted } => {
                debug!("{} {} appended (evicted {})", raw.kind, key, evicted);
                true
            }
            AppendOutcome::Duplicate => {
                debug!("{} {} already in window", raw.kind, key);
                false
            }
        }
    }

    fn set_phase(&self, phase: IngestPhase) {
        debug!("Ingest phase -> {:?}", phase);
        self.state.send_modify(|state| state.phase = phase);
    }

    fn publish(&self) {
        let events: Arc<[DomainEvent]> = Arc::from(self.window.to_vec());
        let warnings = self.warnings.clone();
        self.state.send_modify(|state| {
            state.events = events;
            state.warnings = warnings;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::{apy_log, eth, staked_log, unstaked_log, MockChain};
    use alloy_primitives::U256;
    use std::time::Duration;

    fn target(byte: u8) -> WatchTarget {
        WatchTarget {
            contract: Address::repeat_byte(byte),
            chain_id: 31337,
        }
    }

    fn config(capacity: usize) -> IngestConfig {
        IngestConfig {
            capacity,
            ..IngestConfig::default()
        }
    }

    async fn wait_until(
        rx: &mut watch::Receiver<IngestState>,
        pred: impl FnMut(&IngestState) -> bool,
    ) -> IngestState {
        let state = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(pred))
            .await
            .expect("timed out waiting for ingest state")
            .expect("ingest state sender dropped");
        state.clone()
    }

    fn keys(events: &[DomainEvent]) -> Vec<(u64, u64)> {
        events.iter().map(|e| (e.block_number, e.log_index)).collect()
    }

    #[tokio::test]
    async fn test_backfill_then_live_sorted() {
        let mock = MockChain::new().with_history(vec![
            apy_log(11, 0, 50, eth(1), 101),
            staked_log(10, 0, eth(1), 100),
        ]);
        let mut ingestor = IngestorHandle::new(Arc::new(mock.clone()), config(50));
        let mut rx = ingestor.subscribe();

        ingestor.watch(target(1)).await;
        let state = wait_until(&mut rx, |s| s.phase == IngestPhase::Live).await;
        assert_eq!(keys(&state.events), vec![(10, 0), (11, 0)]);
        assert!(state.warnings.is_empty());

        // Live delivery older than the newest backfilled event
        mock.deliver(unstaked_log(12, 0, eth(1), U256::ZERO, 102));
        mock.deliver(staked_log(10, 3, eth(2), 100));
        let state = wait_until(&mut rx, |s| s.events.len() == 4).await;
        assert_eq!(keys(&state.events), vec![(10, 0), (10, 3), (11, 0), (12, 0)]);
    }

    #[tokio::test]
    async fn test_duplicates_across_backfill_and_live() {
        let mock = MockChain::new().with_history(vec![staked_log(10, 0, eth(1), 100)]);
        let mut ingestor = IngestorHandle::new(Arc::new(mock.clone()), config(50));
        let mut rx = ingestor.subscribe();

        ingestor.watch(target(1)).await;
        wait_until(&mut rx, |s| s.phase == IngestPhase::Live).await;

        mock.deliver(staked_log(10, 0, eth(1), 100));
        mock.deliver(staked_log(10, 0, eth(1), 100));
        mock.deliver(staked_log(13, 0, eth(1), 130));
        let state = wait_until(&mut rx, |s| s.events.iter().any(|e| e.block_number == 13)).await;

        assert_eq!(keys(&state.events), vec![(10, 0), (13, 0)]);
    }

    #[tokio::test]
    async fn test_live_subscriptions_start_after_backfill() {
        let mock = MockChain::new().with_history(vec![staked_log(42, 0, eth(1), 100)]);
        let mut ingestor = IngestorHandle::new(Arc::new(mock.clone()), IngestConfig {
            from_block: 7,
            ..config(50)
        });
        let mut rx = ingestor.subscribe();

        ingestor.watch(target(1)).await;
        wait_until(&mut rx, |s| s.phase == IngestPhase::Live).await;

        let queries = mock.queries();
        assert_eq!(queries.len(), EventKind::ALL.len());
        assert!(queries.iter().all(|(_, from, to)| *from == 7 && *to == 42));
        assert_eq!(mock.active_subscriptions(), EventKind::ALL.len());
    }

    #[tokio::test]
    async fn test_backfill_failure_still_goes_live() {
        let mock = MockChain::new()
            .with_history(vec![
                staked_log(10, 0, eth(1), 100),
                apy_log(11, 0, 50, eth(1), 101),
            ])
            .failing_backfill(EventKind::Staked);
        let mut ingestor = IngestorHandle::new(Arc::new(mock.clone()), config(50));
        let mut rx = ingestor.subscribe();

        ingestor.watch(target(1)).await;
        let state = wait_until(&mut rx, |s| s.phase == IngestPhase::Live).await;

        // Other kinds are kept
        assert_eq!(keys(&state.events), vec![(11, 0)]);
        assert_eq!(state.warnings.len(), 1);
        assert!(matches!(
            &state.warnings[0],
            IngestWarning::BackfillFailed { kind: EventKind::Staked, .. }
        ));

        mock.deliver(staked_log(12, 0, eth(1), 120));
        let state = wait_until(&mut rx, |s| s.events.len() == 2).await;
        assert_eq!(keys(&state.events), vec![(11, 0), (12, 0)]);
    }

    #[tokio::test]
    async fn test_undecodable_log_is_skipped() {
        let mock = MockChain::new();
        let mut ingestor = IngestorHandle::new(Arc::new(mock.clone()), config(50));
        let mut rx = ingestor.subscribe();

        ingestor.watch(target(1)).await;
        wait_until(&mut rx, |s| s.phase == IngestPhase::Live).await;

        let mut bad = staked_log(5, 0, eth(1), 50);
        bad.kind = EventKind::Claimed;
        mock.deliver(bad);
        let state = wait_until(&mut rx, |s| !s.warnings.is_empty()).await;

        assert!(state.events.is_empty());
        assert!(matches!(
            &state.warnings[0],
            IngestWarning::Undecodable { kind: EventKind::Claimed, key, .. }
                if *key == EventKey { block_number: 5, log_index: 0 }
        ));
    }

    #[tokio::test]
    async fn test_capacity_keeps_most_recent() {
        let mock = MockChain::new();
        let mut ingestor = IngestorHandle::new(Arc::new(mock.clone()), config(3));
        let mut rx = ingestor.subscribe();

        ingestor.watch(target(1)).await;
        wait_until(&mut rx, |s| s.phase == IngestPhase::Live).await;

        for block in [4, 1, 6, 2, 5, 3, 7] {
            mock.deliver(staked_log(block, 0, eth(1), block * 10));
        }
        let state = wait_until(&mut rx, |s| s.events.iter().any(|e| e.block_number == 7)).await;

        assert_eq!(keys(&state.events), vec![(5, 0), (6, 0), (7, 0)]);
    }

    #[tokio::test]
    async fn test_switching_target_resets_session() {
        let mock = MockChain::new()
            .with_history(vec![staked_log(10, 0, eth(1), 100)]);
        let mut ingestor = IngestorHandle::new(Arc::new(mock.clone()), config(50));
        let mut rx = ingestor.subscribe();

        ingestor.watch(target(1)).await;
        let state = wait_until(&mut rx, |s| s.phase == IngestPhase::Live).await;
        assert_eq!(state.events.len(), 1);
        assert_eq!(mock.active_subscriptions(), 4);

        ingestor.watch(target(2)).await;

        // Fresh session, empty window, old subscriptions closed
        let state = ingestor.state();
        assert_eq!(state.target, Some(target(2)));
        assert!(state.events.is_empty());
        assert_eq!(mock.active_subscriptions(), 0);

        wait_until(&mut rx, |s| s.phase == IngestPhase::Live).await;
        assert_eq!(mock.active_subscriptions(), 4);
        // Only the new session's Staked sink is still open
        assert_eq!(mock.deliver(staked_log(20, 0, eth(1), 200)), 1);
    }

    #[tokio::test]
    async fn test_switch_during_backfill_drops_inflight_results() {
        let mock = MockChain::new()
            .with_history(vec![staked_log(10, 0, eth(1), 100)])
            .with_backfill_delay(Duration::from_millis(200));
        let mut ingestor = IngestorHandle::new(Arc::new(mock.clone()), config(50));
        let mut rx = ingestor.subscribe();

        ingestor.watch(target(1)).await;
        wait_until(&mut rx, |s| s.phase == IngestPhase::Backfilling).await;

        ingestor.watch(target(2)).await;
        let state = ingestor.state();
        assert_eq!(state.target, Some(target(2)));
        assert!(state.events.is_empty());

        let state = wait_until(&mut rx, |s| s.phase == IngestPhase::Live).await;
        assert_eq!(state.target, Some(target(2)));
        assert_eq!(keys(&state.events), vec![(10, 0)]);
        assert_eq!(mock.active_subscriptions(), 4);
    }

    #[tokio::test]
    async fn test_switching_chain_uses_new_transport() {
        let anvil = MockChain::new().with_history(vec![staked_log(10, 0, eth(1), 100)]);
        let other = MockChain::new().with_history(vec![apy_log(99, 1, 40, eth(5), 900)]);
        let mut ingestor = IngestorHandle::new(Arc::new(anvil.clone()), config(50));
        let mut rx = ingestor.subscribe();

        ingestor.watch(target(1)).await;
        wait_until(&mut rx, |s| s.phase == IngestPhase::Live).await;

        let sepolia = WatchTarget { chain_id: 11155111, ..target(1) };
        ingestor.watch_on(Arc::new(other.clone()), sepolia).await;
        assert_eq!(anvil.active_subscriptions(), 0);

        let state = wait_until(&mut rx, |s| s.phase == IngestPhase::Live).await;
        assert_eq!(state.target, Some(sepolia));
        assert_eq!(keys(&state.events), vec![(99, 1)]);
        assert_eq!(other.active_subscriptions(), 4);
        assert_eq!(anvil.queries().len(), EventKind::ALL.len());
    }

    #[tokio::test]
    async fn test_pool_changes_after_latest_seen() {
        let mock = MockChain::new().with_history(vec![staked_log(10, 0, eth(1), 100)]);
        let mut ingestor = IngestorHandle::new(Arc::new(mock.clone()), config(50));
        let mut rx = ingestor.subscribe();

        ingestor.watch(target(1)).await;
        let state = wait_until(&mut rx, |s| s.phase == IngestPhase::Live).await;
        let seen = state.latest_key();
        assert_eq!(seen, Some(EventKey { block_number: 10, log_index: 0 }));
        assert_eq!(state.pool_changes_after(None), 1);
        assert_eq!(state.pool_changes_after(seen), 0);

        mock.deliver(apy_log(11, 0, 45, eth(1), 110));
        let state = wait_until(&mut rx, |s| s.events.len() == 2).await;
        assert_eq!(state.pool_changes_after(seen), 0);

        mock.deliver(unstaked_log(12, 0, eth(1), U256::ZERO, 120));
        let state = wait_until(&mut rx, |s| s.events.len() == 3).await;
        assert_eq!(state.pool_changes_after(seen), 1);
    }

    #[tokio::test]
    async fn test_stop_closes_subscriptions() {
        let mock = MockChain::new();
        let mut ingestor = IngestorHandle::new(Arc::new(mock.clone()), config(50));
        let mut rx = ingestor.subscribe();

        ingestor.watch(target(1)).await;
        wait_until(&mut rx, |s| s.phase == IngestPhase::Live).await;
        ingestor.stop().await;

        assert_eq!(mock.active_subscriptions(), 0);
        assert_eq!(mock.deliver(staked_log(1, 0, eth(1), 10)), 0);
    }
}
