//! Presentation formatters
//!
//! The only place where wei values become floats or rounded strings.

use alloy_primitives::{utils::format_ether, Address, U256};
use chrono::DateTime;
use std::fmt::Write;

use super::reward::Reward;

/// Lossy ETH value (same as parsing the formatted ether string)
pub fn to_eth_f64(wei: U256) -> f64 {
    format_ether(wei).parse().unwrap_or(0.0)
}

/// Exact decimal representation with trailing zeros removed
pub fn exact_units(wei: U256) -> String {
    let full = format_ether(wei);
    if !full.contains('.') {
        return full;
    }
    full.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Decimal representation truncated (not rounded) to `decimals` places
pub fn truncated_units(wei: U256, decimals: usize) -> String {
    let full = format_ether(wei);
    match full.split_once('.') {
        Some((int, frac)) if decimals > 0 => {
            let end = decimals.min(frac.len());
            format!("{}.{}", int, &frac[..end])
        }
        Some((int, _)) => int.to_string(),
        None => full,
    }
}

/// ETH with `decimals` places, rounded for display
pub fn fmt_eth(wei: U256, decimals: usize) -> String {
    format!("{:.*}", decimals, to_eth_f64(wei))
}

/// TVL label: "0.00", "<0.01" or two decimals
pub fn fmt_tvl(wei: U256) -> String {
    let eth = to_eth_f64(wei);
    if eth == 0.0 {
        return "0.00".to_string();
    }
    if eth < 0.01 {
        return "<0.01".to_string();
    }
    format!("{:.2}", eth)
}

/// Token amount with K/M suffix and two decimals below 1K
pub fn fmt_tokens(wei: U256) -> String {
    let n = to_eth_f64(wei);
    if n >= 1_000_000.0 {
        return format!("{:.2}M", n / 1_000_000.0);
    }
    if n >= 1_000.0 {
        return format!("{:.1}K", n / 1_000.0);
    }
    format!("{:.2}", n)
}

/// Balance with K/M suffix, no decimals below 1K
pub fn fmt_balance(wei: U256) -> String {
    let n = to_eth_f64(wei);
    if n >= 1_000_000.0 {
        return format!("{:.1}M", n / 1_000_000.0);
    }
    if n >= 1_000.0 {
        return format!("{:.1}K", n / 1_000.0);
    }
    format!("{:.0}", n)
}

pub fn fmt_reward(reward: &Reward) -> String {
    let n = reward.to_f64();
    if n == 0.0 {
        return "0".to_string();
    }
    if n < 0.0001 {
        return "<0.0001".to_string();
    }
    if n < 1.0 {
        return format!("{:.4}", n);
    }
    format!("{:.2}", n)
}

/// `0x1234···abcd`
pub fn short_address(addr: &Address) -> String {
    let s = format!("{:?}", addr);
    format!("{}···{}", &s[..6], &s[s.len() - 4..])
}

/// Format a unix timestamp (UTC) with a chrono format string. Falls back to
/// the raw seconds when the timestamp is out of range or `pattern` is invalid.
pub fn fmt_timestamp(ts: u64, pattern: &str) -> String {
    let Some(dt) = i64::try_from(ts).ok().and_then(|secs| DateTime::from_timestamp(secs, 0)) else {
        return ts.to_string();
    };

    let mut out = String::new();
    if write!(out, "{}", dt.format(pattern)).is_ok() {
        out
    } else {
        ts.to_string()
    }
}

/// `HH:MM:SS` (UTC)
pub fn fmt_time(ts: u64) -> String {
    fmt_timestamp(ts, "%H:%M:%S")
}
