//! Timeframe descriptors and per-timeframe scheduling state.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::types::{BlockNumber, Epoch, MarketError, MarketResult, TimeframeId};

/// Static round cadence. Changing it only affects rounds created afterwards,
/// because every round stores its own block boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeframe {
    pub id: TimeframeId,
    pub interval_seconds: u64,
    /// Round length in blocks.
    pub interval_blocks: BlockNumber,
    /// Grace window after `lock_block` before an execution counts as late.
    pub buffer_blocks: BlockNumber,
}

impl Timeframe {
    pub fn validate(&self) -> MarketResult<()> {
        if self.interval_blocks == 0 {
            return Err(MarketError::InvalidTimeframe(format!(
                "timeframe {} has zero interval_blocks",
                self.id
            )));
        }
        Ok(())
    }
}

/// Validate a batch passed to `set_timeframes`: each entry well formed and ids unique.
pub fn validate_batch(timeframes: &[Timeframe]) -> MarketResult<()> {
    let mut seen = BTreeSet::new();
    for tf in timeframes {
        tf.validate()?;
        if !seen.insert(tf.id) {
            return Err(MarketError::InvalidTimeframe(format!("duplicate timeframe id {}", tf.id)));
        }
    }
    Ok(())
}

/// Where a timeframe is in its lifecycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    /// Active (bidding) epoch. Zero until genesis start.
    pub current_epoch: Epoch,
    pub genesis_started: bool,
    pub genesis_locked: bool,
}

impl Schedule {
    pub fn is_running(&self) -> bool {
        self.genesis_started && self.genesis_locked
    }
}
