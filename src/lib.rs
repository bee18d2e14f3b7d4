//! stake-lens: analytics core for a liquidity-staking pool
//!
//! Components:
//! - `numeric`: fixed-point wei arithmetic and the reward calculator
//! - `ingest`: backfill + live event ingestion into a bounded window
//! - `analytics`: time-series derived from the event window
//! - `simulator`: APY curve and stake preview via `previewApy`
//! - `poller`: periodic pool snapshot reads
//!
//! Everything that touches the chain goes through `chain::StakingChain`.

pub mod analytics;
pub mod chain;
pub mod config;
pub mod error;
pub mod ingest;
pub mod numeric;
pub mod poller;
pub mod simulator;

pub use config::{Config, Deployment};
pub use error::{ArithmeticError, CoreError, PartialResultWarning, TransportError, UnsupportedNetworkError};
