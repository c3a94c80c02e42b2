//! Binary options simulation node.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! restores the engine from disk (or bootstraps a fresh one), serves the
//! dashboard and runs the keeper on a timer with graceful shutdown.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use binary_options::config;
use binary_options::dashboard::{self, DashboardState};
use binary_options::engine::keeper::{Keeper, KeeperReport};
use binary_options::engine::Engine;
use binary_options::feeds;
use binary_options::storage;

const BANNER: &str = r#"
  ___ ___ _  _   _   _____   __
 | _ )_ _| \| | /_\ | _ \ \ / /
 | _ \| || .` |/ _ \|   /\ V /
 |___/___|_|\_/_/ \_\_|_\ |_|
        O P T I O N S
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());
    let cfg = config::AppConfig::load(&config_path)?;

    init_logging();

    println!("{BANNER}");
    info!(
        market = %cfg.market.name,
        timeframes = cfg.timeframes.len(),
        block_time_secs = cfg.chain.block_time_secs,
        keeper_interval_secs = cfg.keeper.interval_secs,
        "Binary options node starting up"
    );

    // -- Restore or create engine ----------------------------------------

    let state_file = cfg.storage.state_file.as_str();
    let engine = match storage::load_engine(Some(state_file))? {
        Some(e) => {
            info!(block = e.block_number(), ticks = e.ticks, "Resumed from saved state");
            e
        }
        None => {
            let e = Engine::from_config(&cfg)?;
            info!(block = e.block_number(), "Fresh start");
            e
        }
    };
    let engine = Arc::new(RwLock::new(engine));
    let dashboard_state = Arc::new(DashboardState::new(engine.clone()));

    if cfg.dashboard.enabled {
        dashboard::spawn_dashboard(dashboard_state.clone(), cfg.dashboard.port).await?;
    }

    let keeper = Keeper::new(feeds::build_source(&cfg)?, cfg.market.operator);
    info!(source = keeper.source_name(), "Keeper ready");

    // -- Main loop -------------------------------------------------------

    let blocks_per_tick = (cfg.keeper.interval_secs / cfg.chain.block_time_secs.max(1)).max(1);
    let mut interval = tokio::time::interval(Duration::from_secs(cfg.keeper.interval_secs));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        interval_secs = cfg.keeper.interval_secs,
        blocks_per_tick,
        "Entering main loop. Press Ctrl+C to stop."
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match tick(&keeper, &engine, blocks_per_tick).await {
                    Ok(report) => {
                        log_report(&report);
                        dashboard_state.record_report(report).await;
                    }
                    Err(e) => warn!(error = %format!("{e:#}"), "Keeper tick failed, continuing"),
                }
                if let Err(e) = storage::save_engine(&*engine.read().await, Some(state_file)) {
                    error!(error = %e, "Failed to save state");
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    let engine = engine.read().await;
    storage::save_engine(&engine, Some(state_file))?;
    info!(
        block = engine.block_number(),
        ticks = engine.ticks,
        vault_balance = engine.vault.underlying_balance(&engine.token),
        "Binary options node shut down cleanly."
    );

    Ok(())
}

/// Advance the chain, then plan and apply one keeper step. The price is
/// sampled without holding the engine lock.
async fn tick(keeper: &Keeper, engine: &RwLock<Engine>, blocks: u64) -> Result<KeeperReport> {
    let plan = {
        let mut e = engine.write().await;
        e.mine(blocks);
        keeper.plan(&e)
    };
    let price = keeper.fetch_price(&plan).await?;
    let mut e = engine.write().await;
    keeper.apply(&mut e, &plan, price)
}

fn log_report(report: &KeeperReport) {
    if report.is_noop() {
        return;
    }
    for exec in &report.execution.executions {
        info!(
            timeframe_id = exec.timeframe_id,
            closed = ?exec.closed_epoch,
            locked = exec.locked_epoch,
            started = exec.started_epoch,
            price = exec.price,
            late_by_blocks = exec.late_by_blocks,
            "Round executed"
        );
    }
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("binary_options=info"));

    let json_logging = std::env::var("BINARY_OPTIONS_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
