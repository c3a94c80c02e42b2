//! Operator loop.
//!
//! Each tick: start genesis for configured timeframes that have none, lock
//! genesis rounds whose lock block has passed, then execute every due
//! timeframe with a single fresh price. A tick with nothing due does not
//! touch the price source.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use super::Engine;
use crate::feeds::PriceSource;
use crate::market::{ExecutionPrices, ExecutionReport, GenesisStep};
use crate::types::{Address, BlockNumber, Price, TimeframeId};

/// Work due at the current block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KeeperPlan {
    pub block: BlockNumber,
    pub paused: bool,
    pub genesis_starts: Vec<TimeframeId>,
    pub genesis_locks: Vec<TimeframeId>,
    pub executable: Vec<TimeframeId>,
}

impl KeeperPlan {
    pub fn is_empty(&self) -> bool {
        self.genesis_starts.is_empty() && self.genesis_locks.is_empty() && self.executable.is_empty()
    }

    pub fn needs_price(&self) -> bool {
        !self.genesis_locks.is_empty() || !self.executable.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct KeeperReport {
    pub at: DateTime<Utc>,
    pub block: BlockNumber,
    pub price: Option<Price>,
    pub genesis_started: Vec<TimeframeId>,
    pub genesis_locked: Vec<TimeframeId>,
    pub execution: ExecutionReport,
}

impl KeeperReport {
    pub fn is_noop(&self) -> bool {
        self.genesis_started.is_empty() && self.genesis_locked.is_empty() && self.execution.is_empty()
    }
}

pub struct Keeper {
    source: Box<dyn PriceSource>,
    operator: Address,
}

impl Keeper {
    pub fn new(source: Box<dyn PriceSource>, operator: Address) -> Self {
        Self { source, operator }
    }

    pub fn source_name(&self) -> &'static str {
        self.source.name()
    }

    /// Inspect the engine without mutating it.
    pub fn plan(&self, engine: &Engine) -> KeeperPlan {
        let block = engine.block_number();
        let market = &engine.market;
        if market.is_paused() {
            return KeeperPlan { block, paused: true, ..KeeperPlan::default() };
        }

        let mut plan = KeeperPlan { block, ..KeeperPlan::default() };
        for tf in market.timeframes() {
            match market.pending_genesis(tf.id) {
                Some(GenesisStep::Start) => plan.genesis_starts.push(tf.id),
                Some(GenesisStep::Lock) => {
                    let epoch = market.current_epoch(tf.id);
                    if market.round(tf.id, epoch).is_some_and(|r| block >= r.lock_block) {
                        plan.genesis_locks.push(tf.id);
                    }
                }
                None => {}
            }
        }
        plan.executable = engine.executable_timeframes();
        plan
    }

    /// One price sample, only when the plan needs it.
    pub async fn fetch_price(&self, plan: &KeeperPlan) -> Result<Option<Price>> {
        if !plan.needs_price() {
            return Ok(None);
        }
        let price = self
            .source
            .latest_price()
            .await
            .with_context(|| format!("Price source {} failed", self.source.name()))?;
        debug!(source = self.source.name(), price, "Keeper price sampled");
        Ok(Some(price))
    }

    /// Carry out `plan`. Steps run in order against a staged copy of the
    /// engine, which replaces `engine` only if every step succeeds.
    pub fn apply(&self, engine: &mut Engine, plan: &KeeperPlan, price: Option<Price>) -> Result<KeeperReport> {
        let mut staged = engine.clone();
        let report = self.apply_steps(&mut staged, plan, price)?;
        *engine = staged;

        if !report.is_noop() {
            info!(
                block = report.block,
                price = ?report.price,
                started = ?report.genesis_started,
                locked = ?report.genesis_locked,
                executed = report.execution.executions.len(),
                "Keeper tick applied"
            );
        }
        Ok(report)
    }

    fn apply_steps(&self, engine: &mut Engine, plan: &KeeperPlan, price: Option<Price>) -> Result<KeeperReport> {
        engine.ticks += 1;
        let mut report = KeeperReport {
            at: Utc::now(),
            block: engine.block_number(),
            price,
            genesis_started: Vec::new(),
            genesis_locked: Vec::new(),
            execution: ExecutionReport::default(),
        };

        for &tf in &plan.genesis_starts {
            engine
                .genesis_start_round(self.operator, tf)
                .with_context(|| format!("Genesis start failed for timeframe {tf}"))?;
            report.genesis_started.push(tf);
        }

        if !plan.needs_price() {
            return Ok(report);
        }
        let price = price.context("Keeper plan needs a price but none was sampled")?;

        for &tf in &plan.genesis_locks {
            engine
                .genesis_lock_round(self.operator, tf, price)
                .with_context(|| format!("Genesis lock failed for timeframe {tf}"))?;
            report.genesis_locked.push(tf);
        }

        if !plan.executable.is_empty() {
            report.execution = engine
                .execute_round(self.operator, &plan.executable, ExecutionPrices::Uniform(price))
                .with_context(|| format!("Round execution failed for timeframes {:?}", plan.executable))?;
        }
        Ok(report)
    }

    /// Plan, sample and apply in one step.
    pub async fn run_once(&self, engine: &mut Engine) -> Result<KeeperReport> {
        let plan = self.plan(engine);
        let price = self.fetch_price(&plan).await?;
        self.apply(engine, &plan, price)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
