//! APY Curve Simulator
//!
//! Read-only "what if" queries against the staking contract:
//! - `simulate`: APY at a fixed set of hypothetical TVL values
//! - `preview_stake`: APY and rewards after a single hypothetical deposit

pub mod curve;
pub mod preview;

pub use curve::{current_index, ApyCurve, ApyCurveSimulator, CurvePoint, DEFAULT_PROBES_ETH, DEFAULT_TOLERANCE_PCT};
pub use preview::StakePreview;
