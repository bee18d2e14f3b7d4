//! APY curve over hypothetical TVL values
//!
//! One batched `previewApy` read per simulation, no retries. Missing items
//! default to 0% and are reported through `PartialResultWarning`.

use alloy_primitives::{Address, U256};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::chain::StakingChain;
use crate::config::Config;
use crate::error::PartialResultWarning;
use crate::numeric::scale;

/// Probe TVLs in ETH
pub const DEFAULT_PROBES_ETH: [u64; 10] = [5, 10, 25, 50, 75, 100, 150, 200, 300, 500];

/// Max distance (percent of the probe) for the "current" marker
pub const DEFAULT_TOLERANCE_PCT: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurvePoint {
    pub hypothetical_tvl_wei: U256,
    pub apy_percent: U256,
    pub is_current: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApyCurve {
    /// Probe order
    pub points: Vec<CurvePoint>,
    pub warning: Option<PartialResultWarning>,
}

impl ApyCurve {
    pub fn current(&self) -> Option<&CurvePoint> {
        self.points.iter().find(|p| p.is_current)
    }
}

pub struct ApyCurveSimulator<C: StakingChain> {
    pub(crate) chain: Arc<C>,
    pub(crate) contract: Address,
    probes: Vec<U256>,
    tolerance_pct: u64,
}

impl<C: StakingChain> ApyCurveSimulator<C> {
    pub fn new(chain: Arc<C>, contract: Address) -> Self {
        Self {
            chain,
            contract,
            probes: DEFAULT_PROBES_ETH.iter().map(|eth| scale(*eth)).collect(),
            tolerance_pct: DEFAULT_TOLERANCE_PCT,
        }
    }

    pub fn from_config(chain: Arc<C>, contract: Address, config: &Config) -> Self {
        Self::new(chain, contract)
            .with_probes_eth(&config.curve_probes_eth)
            .with_tolerance_pct(config.current_tvl_tolerance_pct)
    }

    pub fn with_probes_eth(mut self, probes_eth: &[u64]) -> Self {
        self.probes = probes_eth.iter().map(|eth| scale(*eth)).collect();
        self
    }

    pub fn with_tolerance_pct(mut self, tolerance_pct: u64) -> Self {
        self.tolerance_pct = tolerance_pct;
        self
    }

    pub fn probes(&self) -> &[U256] {
        &self.probes
    }

    /// Simulate the APY curve around `current_tvl`
    pub async fn simulate(&self, current_tvl: U256) -> ApyCurve {
        let current = current_index(&self.probes, current_tvl, self.tolerance_pct);

        let (apys, warning) = match self.chain.preview_apy_batch(self.contract, &self.probes).await {
            Ok(results) => {
                let apys: Vec<Option<U256>> = (0..self.probes.len())
                    .map(|i| results.get(i).copied().flatten())
                    .collect();
                let missing: Vec<usize> = apys
                    .iter()
                    .enumerate()
                    .filter(|(_, apy)| apy.is_none())
                    .map(|(i, _)| i)
                    .collect();

                let warning = if missing.is_empty() {
                    None
                } else {
                    warn!("previewApy missing for {} of {} probes", missing.len(), self.probes.len());
                    Some(PartialResultWarning { missing, cause: None })
                };
                (apys, warning)
            }
            Err(e) => {
                warn!("APY curve batch failed: {}", e);
                let warning = PartialResultWarning {
                    missing: (0..self.probes.len()).collect(),
                    cause: Some(e.to_string()),
                };
                (vec![None; self.probes.len()], Some(warning))
            }
        };

        let points = self
            .probes
            .iter()
            .zip(apys)
            .enumerate()
            .map(|(i, (tvl, apy))| CurvePoint {
                hypothetical_tvl_wei: *tvl,
                apy_percent: apy.unwrap_or(U256::ZERO),
                is_current: current == Some(i),
            })
            .collect();

        debug!("APY curve: {} points, current index {:?}", self.probes.len(), current);
        ApyCurve { points, warning }
    }
}

/// First probe (in order) with `|probe - tvl| < probe * tolerance_pct / 100`
pub fn current_index(probes: &[U256], tvl: U256, tolerance_pct: u64) -> Option<usize> {
    let tolerance = U256::from(tolerance_pct);
    let hundred = U256::from(100u64);

    probes.iter().position(|probe| {
        let distance = if *probe > tvl { *probe - tvl } else { tvl - *probe };
        distance.saturating_mul(hundred) < probe.saturating_mul(tolerance)
    })
}
