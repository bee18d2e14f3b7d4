//! stake-lens - Liquidity Staking Dashboard
//!
//! Run with: cargo run -- watch
//!
//! Subcommands:
//! - watch: live event window, pool snapshot and series until Ctrl-C
//! - pool / curve: one-shot reads
//! - preview / reward: what-if calculators

use alloy_primitives::U256;
use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stake_lens::analytics::{recent_apy_updates, TimeSeriesAggregator};
use stake_lens::chain::RpcChain;
use stake_lens::config::{network_name, Config, Deployment};
use stake_lens::ingest::{IngestConfig, IngestPhase, IngestState, IngestorHandle, WatchTarget};
use stake_lens::numeric::format::{fmt_balance, fmt_eth, fmt_reward, fmt_time, fmt_tokens, fmt_tvl, short_address};
use stake_lens::numeric::{parse_eth, reward::reward_for_wei, RewardTable, DURATION_OPTIONS};
use stake_lens::poller::{PollState, PoolSnapshot, PoolSnapshotPoller};
use stake_lens::simulator::ApyCurveSimulator;

// ============================================
// CLI
// ============================================

#[derive(Parser)]
#[command(
    name = "stake-lens",
    version,
    about = "Event analytics and reward simulation for a liquidity-staking pool"
)]
struct Cli {
    /// TOML config file (defaults to environment / .env)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print one-shot results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest events and print the dashboard until Ctrl-C
    Watch,
    /// Read the pool snapshot once
    Pool,
    /// Print the APY curve around the current TVL
    Curve,
    /// Preview the pool impact of a stake
    Preview {
        /// Stake amount in ETH
        #[arg(long)]
        amount: String,
        /// Staking duration in days
        #[arg(long, default_value_t = 365)]
        days: u64,
    },
    /// Offline reward calculator
    Reward {
        /// Stake amount in ETH
        #[arg(long)]
        amount: String,
        /// APY percent
        #[arg(long)]
        apy: u64,
        /// Staking duration in days
        #[arg(long, default_value_t = 365)]
        days: u64,
    },
}

fn print_banner() {
    println!();
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!(
        "{}",
        style(" 📈 STAKE LENS - Liquidity Staking Dashboard").cyan().bold()
    );
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!();
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("stake_lens=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    // The calculator needs no chain access
    if let Commands::Reward { amount, apy, days } = &cli.command {
        return run_reward(amount, *apy, *days);
    }

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        error!("Please check your .env file");
        return Err(e);
    }

    let deployment = config.deployment()?;
    let chain = Arc::new(RpcChain::from_config(&config));

    match cli.command {
        Commands::Watch => {
            print_banner();
            config.print_summary();
            println!();
            run_watch(&config, deployment, chain).await
        }
        Commands::Pool => run_pool(&config, deployment, chain, cli.json).await,
        Commands::Curve => run_curve(&config, deployment, chain, cli.json).await,
        Commands::Preview { amount, days } => {
            run_preview(&config, deployment, chain, &amount, days, cli.json).await
        }
        Commands::Reward { .. } => Ok(()),
    }
}

// ============================================
// WATCH
// ============================================

async fn run_watch(config: &Config, deployment: Deployment, chain: Arc<RpcChain>) -> Result<()> {
    let target = WatchTarget {
        contract: deployment.staking,
        chain_id: deployment.chain_id,
    };

    let mut ingestor = IngestorHandle::new(chain.clone(), IngestConfig::from_config(config));
    let mut updates = ingestor.subscribe();

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?);
    spinner.set_message(format!(
        "Backfilling events from block {} on {}...",
        config.from_block, deployment.network
    ));
    spinner.enable_steady_tick(Duration::from_millis(120));

    ingestor.watch(target).await;
    updates.wait_for(|s| s.phase == IngestPhase::Live).await?;

    let state = ingestor.state();
    spinner.finish_with_message(format!(
        "{} Backfill complete: {} events in window",
        style("✓").green(),
        state.events.len()
    ));
    for warning in &state.warnings {
        warn!("{}", warning);
    }

    let poller = PoolSnapshotPoller::new(chain.clone(), deployment.staking)
        .spawn(Duration::from_secs(config.poll_interval_secs));
    let aggregator = TimeSeriesAggregator::new(config.bucket_format.clone());

    info!("Watching {} on {} - press Ctrl-C to exit", short_address(&deployment.staking), deployment.network);

    let mut seen = state.latest_key();
    let mut ticker = tokio::time::interval(Duration::from_secs(config.poll_interval_secs));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!();
                info!("Shutting down...");
                break;
            }
            Ok(()) = updates.changed() => {
                let state = updates.borrow_and_update().clone();
                // Stakes, unstakes and claims move the pool scalars
                if state.pool_changes_after(seen) > 0 {
                    debug!("Pool-changing events arrived, refreshing snapshot");
                    poller.refresh();
                }
                seen = seen.max(state.latest_key());
            }
            _ = ticker.tick() => {
                print_dashboard(config, &aggregator, &ingestor.state(), &poller.state());
            }
        }
    }

    ingestor.stop().await;
    poller.shutdown();
    Ok(())
}

fn print_dashboard(config: &Config, aggregator: &TimeSeriesAggregator, ingest: &IngestState, poll: &PollState) {
    println!();
    println!("{}", style("═══ POOL ═══").blue().bold());
    print_pool(&poll.snapshot, config.target_tvl_eth);
    if let Some(e) = &poll.last_error {
        println!("   {} last poll failed: {}", style("⚠").yellow(), e);
    }

    let aggregates = aggregator.aggregate(&ingest.events);

    println!();
    println!(
        "{} ({} events, {:?})",
        style("═══ ACTIVITY ═══").magenta().bold(),
        ingest.events.len(),
        ingest.phase
    );

    println!("   Volume (staked / unstaked ETH):");
    for point in aggregates.volume.iter().rev().take(5) {
        println!(
            "     {}  +{} / -{}",
            point.bucket,
            fmt_eth(point.staked, 4),
            fmt_eth(point.unstaked, 4)
        );
    }

    println!("   TVL / APY:");
    for point in aggregates.tvl_apy.iter().rev().take(5) {
        println!("     {:>8}  {} ETH @ {}%", point.label, fmt_tvl(point.tvl), point.apy_percent);
    }

    if let Some(last) = aggregates.rewards.last() {
        println!(
            "   Rewards claimed: {} claims, {} REW cumulative",
            aggregates.rewards.len(),
            last.cumulative_display
        );
    }

    let feed = recent_apy_updates(&ingest.events, config.apy_feed_limit);
    if !feed.is_empty() {
        println!("   Recent APY updates:");
        for update in feed.iter().take(5) {
            println!(
                "     {}  {}%  (TVL {} ETH, block {})",
                fmt_time(update.timestamp),
                update.apy_percent,
                fmt_tvl(update.total_staked),
                update.block_number
            );
        }
    }

    for warning in &ingest.warnings {
        println!("   {} {}", style("⚠").yellow(), warning);
    }
}

fn print_pool(snapshot: &PoolSnapshot, target_tvl_eth: u64) {
    println!("   TVL:            {} ETH", fmt_tvl(snapshot.tvl));
    println!("   APY:            {}% ({})", snapshot.apy, snapshot.apy_status());
    println!("   Reward pool:    {} REW", fmt_balance(snapshot.reward_pool_balance));
    if let Ok(daily) = snapshot.daily_reward_per_eth() {
        println!("   Per ETH / day:  {} REW", fmt_tokens(daily));
    }
    if let Ok(yearly) = snapshot.yearly_payout() {
        println!("   Yearly payout:  {} REW", fmt_tokens(yearly));
    }
    println!(
        "   Utilization:    {}% of {} ETH target",
        snapshot.utilization_pct(target_tvl_eth),
        target_tvl_eth
    );
}

// ============================================
// ONE-SHOT COMMANDS
// ============================================

async fn run_pool(config: &Config, deployment: Deployment, chain: Arc<RpcChain>, json: bool) -> Result<()> {
    let snapshot = PoolSnapshotPoller::new(chain, deployment.staking).poll().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    println!(
        "{} {} on {} ({})",
        style("Pool").blue().bold(),
        short_address(&deployment.staking),
        network_name(deployment.chain_id),
        deployment.chain_id
    );
    print_pool(&snapshot, config.target_tvl_eth);
    Ok(())
}

async fn run_curve(config: &Config, deployment: Deployment, chain: Arc<RpcChain>, json: bool) -> Result<()> {
    let snapshot = PoolSnapshotPoller::new(chain.clone(), deployment.staking).poll().await?;
    let simulator = ApyCurveSimulator::from_config(chain, deployment.staking, config);
    let curve = simulator.simulate(snapshot.tvl).await;
    if json {
        println!("{}", serde_json::to_string_pretty(&curve)?);
        return Ok(());
    }

    println!(
        "{} (current TVL {} ETH)",
        style("APY curve").blue().bold(),
        fmt_tvl(snapshot.tvl)
    );
    for point in &curve.points {
        let marker = if point.is_current { style("◀ current").green().to_string() } else { String::new() };
        println!(
            "   {:>8} ETH  {:>4}%  {}",
            fmt_eth(point.hypothetical_tvl_wei, 0),
            point.apy_percent,
            marker
        );
    }
    if let Some(warning) = &curve.warning {
        println!("{} {}", style("⚠").yellow(), warning);
    }
    Ok(())
}

async fn run_preview(
    config: &Config,
    deployment: Deployment,
    chain: Arc<RpcChain>,
    amount: &str,
    days: u64,
    json: bool,
) -> Result<()> {
    let amount_wei = parse_eth(amount)?;
    let snapshot = PoolSnapshotPoller::new(chain.clone(), deployment.staking).poll().await?;
    let simulator = ApyCurveSimulator::from_config(chain, deployment.staking, config);
    let preview = simulator
        .preview_stake(amount_wei, snapshot.tvl, snapshot.apy)
        .await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&preview)?);
        return Ok(());
    }

    println!("{}", style("Stake preview").blue().bold());
    println!("   Amount:         {} ETH", fmt_eth(amount_wei, 4));
    println!(
        "   TVL:            {} -> {} ETH",
        fmt_tvl(preview.current_tvl),
        fmt_tvl(preview.hypothetical_tvl)
    );
    println!(
        "   APY:            {}% -> {}% ({:+}){}",
        preview.apy_now,
        preview.apy_after,
        preview.apy_delta,
        if preview.apy_after_is_fallback { " (preview unavailable)" } else { "" }
    );

    let apy_after = preview.apy_after.saturating_to::<u64>();
    let reward = reward_for_wei(amount_wei, apy_after, days)?;
    println!("   Reward ({} days): {} REW", days, fmt_reward(&reward));
    print_reward_table(&preview.rewards);
    Ok(())
}

fn run_reward(amount: &str, apy: u64, days: u64) -> Result<()> {
    let amount_wei = parse_eth(amount)?;
    let reward = reward_for_wei(amount_wei, apy, days)?;

    println!("{}", style("Reward calculator").blue().bold());
    println!("   {} ETH @ {}% for {} days", fmt_eth(amount_wei, 4), apy, days);
    println!("   Reward:  {} REW ({} exact)", fmt_reward(&reward), reward);
    println!("   Whole:   {} REW", reward.whole_tokens());

    println!("   Presets:");
    for option in DURATION_OPTIONS {
        let reward = reward_for_wei(amount_wei, apy, option.days)?;
        println!("     {:<8} {} REW", option.label, fmt_reward(&reward));
    }
    if reward.wei() > U256::ZERO {
        print_reward_table(&RewardTable::for_stake(amount_wei, apy)?);
    }
    Ok(())
}

fn print_reward_table(table: &RewardTable) {
    println!("   Daily:   {} REW", fmt_reward(&table.daily));
    println!("   Weekly:  {} REW", fmt_reward(&table.weekly));
    println!("   Monthly: {} REW", fmt_reward(&table.monthly));
    println!("   Yearly:  {} REW", fmt_reward(&table.yearly));
}
