//! Stake preview: pool impact of a hypothetical deposit

use alloy_primitives::U256;
use serde::Serialize;
use tracing::debug;

use super::curve::ApyCurveSimulator;
use crate::chain::StakingChain;
use crate::error::CoreError;
use crate::numeric::{add, RewardTable};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StakePreview {
    pub amount_wei: U256,
    pub current_tvl: U256,
    /// `current_tvl + amount_wei`
    pub hypothetical_tvl: U256,
    pub apy_now: U256,
    pub apy_after: U256,
    /// `previewApy` had no result; `apy_after` is the current APY
    pub apy_after_is_fallback: bool,
    /// `apy_after - apy_now` in percentage points
    pub apy_delta: i128,
    /// Rewards for `amount_wei` at `apy_after`
    pub rewards: RewardTable,
}

impl<C: StakingChain> ApyCurveSimulator<C> {
    /// Preview staking `amount_wei` on top of the current pool state.
    /// Transport failures are returned, not defaulted.
    pub async fn preview_stake(
        &self,
        amount_wei: U256,
        current_tvl: U256,
        current_apy: U256,
    ) -> Result<StakePreview, CoreError> {
        let hypothetical_tvl = add(current_tvl, amount_wei)?;

        let results = self
            .chain
            .preview_apy_batch(self.contract, &[hypothetical_tvl])
            .await?;

        let (apy_after, apy_after_is_fallback) = match results.first().copied().flatten() {
            Some(apy) => (apy, false),
            None => (current_apy, true),
        };

        let apy_delta = i128::from(apy_after.saturating_to::<u64>())
            - i128::from(current_apy.saturating_to::<u64>());
        let rewards = RewardTable::for_stake(amount_wei, apy_after.saturating_to::<u64>())?;

        debug!(
            "Stake preview: tvl {} -> {}, apy {} -> {} ({:+})",
            current_tvl, hypothetical_tvl, current_apy, apy_after, apy_delta
        );

        Ok(StakePreview {
            amount_wei,
            current_tvl,
            hypothetical_tvl,
            apy_now: current_apy,
            apy_after,
            apy_after_is_fallback,
            apy_delta,
            rewards,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::{eth, MockChain};
    use crate::error::TransportError;
    use crate::numeric::reward::reward_for_wei;
    use alloy_primitives::Address;
    use std::sync::Arc;

    fn simulator(mock: MockChain) -> ApyCurveSimulator<MockChain> {
        ApyCurveSimulator::new(Arc::new(mock), Address::repeat_byte(1))
    }

    #[tokio::test]
    async fn test_preview_lowers_apy() {
        // Mock curve: 100 - tvl/5
        let preview = simulator(MockChain::new())
            .preview_stake(eth(50), eth(50), U256::from(90))
            .await
            .unwrap();

        assert_eq!(preview.hypothetical_tvl, eth(100));
        assert_eq!(preview.apy_after, U256::from(80));
        assert!(!preview.apy_after_is_fallback);
        assert_eq!(preview.apy_delta, -10);
        assert_eq!(preview.rewards.yearly, reward_for_wei(eth(50), 80, 365).unwrap());
    }

    #[tokio::test]
    async fn test_missing_preview_falls_back_to_current() {
        let mock = MockChain::new().with_preview(Ok(vec![None]));
        let preview = simulator(mock)
            .preview_stake(eth(1), eth(10), U256::from(42))
            .await
            .unwrap();

        assert_eq!(preview.apy_after, U256::from(42));
        assert!(preview.apy_after_is_fallback);
        assert_eq!(preview.apy_delta, 0);
    }

    #[tokio::test]
    async fn test_transport_failure_is_returned() {
        let mock = MockChain::new().with_preview(Err("timeout".to_string()));
        let err = simulator(mock)
            .preview_stake(eth(1), eth(10), U256::from(42))
            .await
            .unwrap_err();

        assert_eq!(err, CoreError::Transport(TransportError::new("aggregate3", "timeout")));
    }

    #[tokio::test]
    async fn test_overflowing_amount_is_arithmetic_error() {
        let err = simulator(MockChain::new())
            .preview_stake(U256::MAX, eth(1), U256::from(10))
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::Arithmetic(_)));
    }
}
