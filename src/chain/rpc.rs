//! Alloy-backed `StakingChain`
//!
//! - Backfill: `eth_getLogs` in fixed-size block chunks
//! - Live: polling subscription (one task per event kind)
//! - View calls: `eth_call`; previews batched through Multicall3, or issued
//!   one by one when the node has no Multicall3 deployed

use alloy_network::Ethereum;
use alloy_primitives::{Address, Bytes, U256};
use alloy_provider::{Provider, ProviderBuilder};
use alloy_rpc_types::{BlockNumberOrTag, Filter, Log, TransactionRequest};
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use futures::future::join_all;
use std::time::Duration;
use tracing::{debug, trace, warn};

use super::abi::{ILiquidityStaking, IMulticall3, MULTICALL3};
use super::{EventKind, EventSink, PoolScalars, RawLog, StakingChain, Subscription};
use crate::config::Config;
use crate::error::TransportError;

/// Chunk size for log queries to avoid provider range limits
pub const DEFAULT_LOG_CHUNK_SIZE: u64 = 5_000;

#[derive(Debug, Clone)]
pub struct RpcChain {
    rpc_url: String,
    log_chunk_size: u64,
    live_poll_interval: Duration,
}

impl RpcChain {
    pub fn new(rpc_url: String) -> Self {
        Self {
            rpc_url,
            log_chunk_size: DEFAULT_LOG_CHUNK_SIZE,
            live_poll_interval: Duration::from_millis(2_000),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            rpc_url: config.rpc_url.clone(),
            log_chunk_size: config.log_chunk_size.max(1),
            live_poll_interval: Duration::from_millis(config.live_poll_interval_ms.max(1)),
        }
    }

    fn provider(&self) -> Result<impl Provider<Ethereum>, TransportError> {
        let url = self.rpc_url.parse().map_err(|_| {
            TransportError::new("connect", format!("invalid RPC URL '{}'", self.rpc_url))
        })?;
        Ok(ProviderBuilder::new().connect_http(url))
    }

    async fn call_contract(&self, op: &'static str, to: Address, calldata: Vec<u8>) -> Result<Bytes, TransportError> {
        let provider = self.provider()?;

        let tx = TransactionRequest::default()
            .to(to)
            .input(calldata.into());

        provider
            .call(tx)
            .await
            .map_err(rpc_error(op))
    }

    /// Execute a Multicall3 batch; `None` when no Multicall3 is deployed
    /// (e.g. a fresh local Anvil node)
    async fn execute_multicall(
        &self,
        calls: Vec<IMulticall3::Call3>,
    ) -> Result<Option<Vec<IMulticall3::Result>>, TransportError> {
        if calls.is_empty() {
            return Ok(Some(Vec::new()));
        }

        let calldata = IMulticall3::aggregate3Call { calls }.abi_encode();
        let result = self.call_contract("aggregate3", MULTICALL3, calldata).await?;

        if result.is_empty() {
            return Ok(None);
        }

        IMulticall3::aggregate3Call::abi_decode_returns(&result)
            .map(Some)
            .map_err(|e| TransportError::new("aggregate3", format!("failed to decode multicall result: {}", e)))
    }

    /// One `previewApy` call per TVL, concurrently
    async fn preview_apy_each(&self, contract: Address, tvls: &[U256]) -> Result<Vec<Option<U256>>, TransportError> {
        let calls = tvls.iter().map(|tvl| {
            let calldata = ILiquidityStaking::previewApyCall { hypotheticalTvl: *tvl }.abi_encode();
            self.call_contract("previewApy", contract, calldata)
        });
        let results = join_all(calls).await;

        // Every call failing means the node is unreachable, not a partial result
        if let Some(Err(e)) = results.first() {
            if results.iter().all(|r| r.is_err()) {
                return Err(e.clone());
            }
        }

        Ok(results
            .into_iter()
            .map(|r| {
                r.ok()
                    .and_then(|bytes| ILiquidityStaking::previewApyCall::abi_decode_returns(&bytes).ok())
            })
            .collect())
    }

    fn to_raw_log(kind: EventKind, log: Log) -> Option<RawLog> {
        // Pending logs carry no position yet
        let (Some(block_number), Some(log_index)) = (log.block_number, log.log_index) else {
            trace!("Skipping pending {} log", kind);
            return None;
        };
        Some(RawLog {
            block_number,
            log_index,
            block_timestamp: log.block_timestamp,
            kind,
            data: log.inner.data,
        })
    }
}

/// Inclusive `(from, to)` block spans of at most `size` blocks covering
/// `from..=to`. Empty when `from > to`.
fn chunk_ranges(from: u64, to: u64, size: u64) -> impl Iterator<Item = (u64, u64)> {
    let span = size.max(1) - 1;
    let mut next = (from <= to).then_some(from);

    std::iter::from_fn(move || {
        let start = next?;
        let end = start.saturating_add(span).min(to);
        next = if end < to { Some(end + 1) } else { None };
        Some((start, end))
    })
}

/// Wrap a provider failure with the capability that raised it
fn rpc_error(op: &'static str) -> impl FnOnce(alloy_transport::TransportError) -> TransportError {
    move |e| TransportError::new(op, e.to_string())
}

#[async_trait]
impl StakingChain for RpcChain {
    async fn latest_block(&self) -> Result<u64, TransportError> {
        self.provider()?
            .get_block_number()
            .await
            .map_err(rpc_error("blockNumber"))
    }

    async fn query_events(
        &self,
        contract: Address,
        kind: EventKind,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawLog>, TransportError> {
        let provider = self.provider()?;
        let filter = Filter::new()
            .address(contract)
            .event_signature(kind.signature_hash());

        let mut all_logs = Vec::new();

        for (current_from, current_to) in chunk_ranges(from_block, to_block, self.log_chunk_size) {
            let chunk_filter = filter
                .clone()
                .from_block(BlockNumberOrTag::Number(current_from))
                .to_block(BlockNumberOrTag::Number(current_to));

            let logs = provider
                .get_logs(&chunk_filter)
                .await
                .map_err(rpc_error("getLogs"))?;

            trace!("{} logs: {} in blocks {}..={}", kind, logs.len(), current_from, current_to);
            all_logs.extend(logs.into_iter().filter_map(|log| Self::to_raw_log(kind, log)));
        }

        debug!("Fetched {} {} logs in blocks {}..={}", all_logs.len(), kind, from_block, to_block);
        Ok(all_logs)
    }

    async fn subscribe_events(
        &self,
        contract: Address,
        kind: EventKind,
        since_block: u64,
        sink: EventSink,
    ) -> Result<Subscription, TransportError> {
        // Fail fast on a bad URL instead of inside the polling task
        self.provider()?;

        let chain = self.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(chain.live_poll_interval);
            let mut next_block = since_block;

            loop {
                ticker.tick().await;

                let latest = match chain.latest_block().await {
                    Ok(latest) => latest,
                    Err(e) => {
                        warn!("Live {} poll failed: {}", kind, e);
                        continue;
                    }
                };
                if latest < next_block {
                    continue;
                }

                match chain.query_events(contract, kind, next_block, latest).await {
                    Ok(logs) => {
                        for log in logs {
                            if sink.send(log).is_err() {
                                debug!("{} subscriber gone, stopping poller", kind);
                                return;
                            }
                        }
                        next_block = latest + 1;
                    }
                    Err(e) => warn!("Live {} poll failed: {}", kind, e),
                }
            }
        });

        Ok(Subscription::from_task(kind, task))
    }

    async fn read_pool_scalars(&self, contract: Address) -> Result<Option<PoolScalars>, TransportError> {
        let calldata = ILiquidityStaking::getPoolInfoCall {}.abi_encode();
        let result = self.call_contract("getPoolInfo", contract, calldata).await?;

        // No code at the address yet
        if result.is_empty() {
            return Ok(None);
        }

        let info = ILiquidityStaking::getPoolInfoCall::abi_decode_returns(&result)
            .map_err(|e| TransportError::new("getPoolInfo", format!("failed to decode pool info: {}", e)))?;

        Ok(Some(PoolScalars {
            tvl: info.currentTvl,
            apy: info.currentApy,
            reward_rate: info.rewardRate,
            reward_pool_balance: info.contractBalance,
        }))
    }

    async fn preview_apy_batch(
        &self,
        contract: Address,
        tvls: &[U256],
    ) -> Result<Vec<Option<U256>>, TransportError> {
        let calls: Vec<IMulticall3::Call3> = tvls
            .iter()
            .map(|tvl| IMulticall3::Call3 {
                target: contract,
                allowFailure: true,
                callData: ILiquidityStaking::previewApyCall { hypotheticalTvl: *tvl }
                    .abi_encode()
                    .into(),
            })
            .collect();

        let Some(results) = self.execute_multicall(calls).await? else {
            debug!("Multicall3 not deployed, previewing {} TVLs individually", tvls.len());
            return self.preview_apy_each(contract, tvls).await;
        };

        let mut apys: Vec<Option<U256>> = results
            .iter()
            .map(|r| {
                if !r.success {
                    return None;
                }
                ILiquidityStaking::previewApyCall::abi_decode_returns(&r.returnData).ok()
            })
            .collect();
        apys.resize(tvls.len(), None);

        Ok(apys)
    }
}
