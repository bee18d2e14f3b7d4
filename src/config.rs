//! Configuration for stake-lens
//!
//! Loaded from environment variables (with `.env` support) or a TOML file.
//! The active deployment (staking contract + chain id) is resolved here and
//! handed to each component at construction.

use alloy_primitives::{address, Address};
use chrono::format::{Item, StrftimeItems};
use eyre::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::chain::DEFAULT_LOG_CHUNK_SIZE;
use crate::error::UnsupportedNetworkError;
use crate::simulator::{DEFAULT_PROBES_ETH, DEFAULT_TOLERANCE_PCT};

// ============================================
// DEPLOYMENTS
// ============================================

pub const ANVIL_CHAIN_ID: u64 = 31337;
pub const SEPOLIA_CHAIN_ID: u64 = 11155111;

/// A staking contract deployment on one network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Deployment {
    pub chain_id: u64,
    pub network: &'static str,
    pub staking: Address,
    pub reward_token: Address,
}

/// Known deployment for `chain_id`
pub fn deployment_for(chain_id: u64) -> Result<Deployment, UnsupportedNetworkError> {
    match chain_id {
        ANVIL_CHAIN_ID => Ok(Deployment {
            chain_id,
            network: "Anvil",
            staking: address!("e7f1725E7734CE288F8367e1Bb143E90bb3F0512"),
            reward_token: address!("5FbDB2315678afecb367f032d93F642f64180aa3"),
        }),
        // Sepolia: not deployed yet
        _ => Err(UnsupportedNetworkError { chain_id }),
    }
}

pub fn network_name(chain_id: u64) -> &'static str {
    match chain_id {
        ANVIL_CHAIN_ID => "Anvil",
        SEPOLIA_CHAIN_ID => "Sepolia",
        _ => "Unknown",
    }
}

// ============================================
// MAIN CONFIGURATION
// ============================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    // ========== Network Settings ==========
    /// JSON-RPC endpoint
    pub rpc_url: String,

    /// Chain ID (31337 = local Anvil)
    pub chain_id: u64,

    /// Staking contract override; otherwise taken from the deployment table
    pub staking_address: Option<Address>,

    // ========== Ingestion ==========
    /// First block included in the backfill
    pub from_block: u64,

    /// Block span of a single `eth_getLogs` request
    pub log_chunk_size: u64,

    /// Events kept in the window (oldest evicted first)
    pub event_window_capacity: usize,

    /// Rows in the APY update feed
    pub apy_feed_limit: usize,

    // ========== Polling ==========
    pub poll_interval_secs: u64,

    /// Interval of the live log poller
    pub live_poll_interval_ms: u64,

    // ========== Simulation ==========
    /// Probe TVLs of the APY curve, in ETH
    pub curve_probes_eth: Vec<u64>,

    /// Max distance (% of the probe) for the "current" curve marker
    pub current_tvl_tolerance_pct: u64,

    /// Pool utilization is reported against this TVL
    pub target_tvl_eth: u64,

    // ========== Presentation ==========
    /// chrono format of volume/reward buckets (UTC)
    pub bucket_format: String,
}

impl Config {
    /// Load configuration from environment variables and .env file
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        Ok(Self {
            // Network
            rpc_url: env::var("RPC_URL").unwrap_or(defaults.rpc_url),
            chain_id: env::var("CHAIN_ID")
                .unwrap_or_else(|_| ANVIL_CHAIN_ID.to_string())
                .parse()
                .unwrap_or(ANVIL_CHAIN_ID),
            staking_address: env::var("STAKING_ADDRESS")
                .ok()
                .and_then(|s| Address::from_str(s.trim()).ok()),

            // Ingestion
            from_block: env::var("FROM_BLOCK")
                .unwrap_or_else(|_| "0".to_string())
                .parse()
                .unwrap_or(0),
            log_chunk_size: env::var("LOG_CHUNK_SIZE")
                .unwrap_or_else(|_| DEFAULT_LOG_CHUNK_SIZE.to_string())
                .parse()
                .unwrap_or(DEFAULT_LOG_CHUNK_SIZE),
            event_window_capacity: env::var("EVENT_WINDOW_CAPACITY")
                .unwrap_or_else(|_| "50".to_string())
                .parse()
                .unwrap_or(50),
            apy_feed_limit: env::var("APY_FEED_LIMIT")
                .unwrap_or_else(|_| "50".to_string())
                .parse()
                .unwrap_or(50),

            // Polling
            poll_interval_secs: env::var("POLL_INTERVAL_SECS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .unwrap_or(5),
            live_poll_interval_ms: env::var("LIVE_POLL_INTERVAL_MS")
                .unwrap_or_else(|_| "2000".to_string())
                .parse()
                .unwrap_or(2_000),

            // Simulation
            curve_probes_eth: env::var("CURVE_PROBES_ETH")
                .map(|s| Self::parse_probes(&s))
                .unwrap_or(defaults.curve_probes_eth),
            current_tvl_tolerance_pct: env::var("CURRENT_TVL_TOLERANCE_PCT")
                .unwrap_or_else(|_| DEFAULT_TOLERANCE_PCT.to_string())
                .parse()
                .unwrap_or(DEFAULT_TOLERANCE_PCT),
            target_tvl_eth: env::var("TARGET_TVL_ETH")
                .unwrap_or_else(|_| "100".to_string())
                .parse()
                .unwrap_or(100),

            // Presentation
            bucket_format: env::var("BUCKET_FORMAT").unwrap_or(defaults.bucket_format),
        })
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Comma-separated ETH values; unparsable entries are skipped
    fn parse_probes(raw: &str) -> Vec<u64> {
        raw.split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect()
    }

    /// Deployment for the configured chain, honouring `staking_address`
    pub fn deployment(&self) -> Result<Deployment, UnsupportedNetworkError> {
        match self.staking_address {
            Some(staking) => Ok(Deployment {
                chain_id: self.chain_id,
                network: network_name(self.chain_id),
                staking,
                reward_token: deployment_for(self.chain_id)
                    .map(|d| d.reward_token)
                    .unwrap_or(Address::ZERO),
            }),
            None => deployment_for(self.chain_id),
        }
    }

    /// Validate configuration before starting any component
    pub fn validate(&self) -> Result<()> {
        if self.rpc_url.trim().is_empty() {
            return Err(eyre::eyre!("Invalid RPC_URL - please set a JSON-RPC endpoint"));
        }

        if self.event_window_capacity == 0 {
            return Err(eyre::eyre!("EVENT_WINDOW_CAPACITY must be at least 1"));
        }
        if self.log_chunk_size == 0 {
            return Err(eyre::eyre!("LOG_CHUNK_SIZE must be at least 1"));
        }
        if self.poll_interval_secs == 0 || self.live_poll_interval_ms == 0 {
            return Err(eyre::eyre!("Poll intervals must be non-zero"));
        }

        if self.curve_probes_eth.is_empty() {
            return Err(eyre::eyre!("CURVE_PROBES_ETH must contain at least one value"));
        }
        if self.current_tvl_tolerance_pct > 100 {
            return Err(eyre::eyre!(
                "CURRENT_TVL_TOLERANCE_PCT must be <= 100 (currently {})",
                self.current_tvl_tolerance_pct
            ));
        }

        if self.bucket_format.is_empty()
            || StrftimeItems::new(&self.bucket_format).any(|item| matches!(item, Item::Error))
        {
            return Err(eyre::eyre!(
                "BUCKET_FORMAT '{}' is not a valid chrono format string",
                self.bucket_format
            ));
        }

        Ok(())
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        let staking = match self.deployment() {
            Ok(d) => format!("{:?}", d.staking),
            Err(_) => "✗ Not deployed".to_string(),
        };

        println!("╔════════════════════════════════════════════════════════════╗");
        println!("║               STAKE LENS - CONFIGURATION                   ║");
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ Network:           {:^40} ║", format!("{} ({})", network_name(self.chain_id), self.chain_id));
        println!("║ Staking:           {:^40} ║",
            if self.staking_address.is_some() { "✓ Override" } else { "Deployment table" }
        );
        println!("║ {:^58} ║", staking);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ INGESTION                                                  ║");
        println!("║ • From Block:      {:^40} ║", self.from_block);
        println!("║ • Log Chunk:       {:^40} ║", self.log_chunk_size);
        println!("║ • Window Size:     {:^40} ║", self.event_window_capacity);
        println!("║ • Live Poll:       {:>37} ms ║", self.live_poll_interval_ms);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ POOL & SIMULATION                                          ║");
        println!("║ • Poll Interval:   {:>38} s ║", self.poll_interval_secs);
        println!("║ • Curve Probes:    {:^40} ║", self.curve_probes_eth.len());
        println!("║ • Marker Window:   {:>38}% ║", self.current_tvl_tolerance_pct);
        println!("║ • Target TVL:      {:>36} ETH ║", self.target_tvl_eth);
        println!("╚════════════════════════════════════════════════════════════╝");
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:8545".to_string(),
            chain_id: ANVIL_CHAIN_ID,
            staking_address: None,
            from_block: 0,
            log_chunk_size: DEFAULT_LOG_CHUNK_SIZE,
            event_window_capacity: 50,
            apy_feed_limit: 50,
            poll_interval_secs: 5,
            live_poll_interval_ms: 2_000,
            curve_probes_eth: DEFAULT_PROBES_ETH.to_vec(),
            current_tvl_tolerance_pct: DEFAULT_TOLERANCE_PCT,
            target_tvl_eth: 100,
            bucket_format: "%H:%M:%S".to_string(),
        }
    }
}

// ============================================
// TESTS
// ============================================
