//! Block clock.
//!
//! Every sequencing decision reads the block height from here at call time.
//! Timestamps advance by `block_time_secs` per block.

use serde::{Deserialize, Serialize};

use crate::types::{BlockNumber, Timestamp};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chain {
    block_number: BlockNumber,
    timestamp: Timestamp,
    block_time_secs: u64,
}

impl Chain {
    /// Chain at block 0 with the given genesis timestamp.
    pub fn new(genesis_timestamp: Timestamp, block_time_secs: u64) -> Self {
        Self {
            block_number: 0,
            timestamp: genesis_timestamp,
            block_time_secs: block_time_secs.max(1),
        }
    }

    pub fn block_number(&self) -> BlockNumber {
        self.block_number
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn block_time_secs(&self) -> u64 {
        self.block_time_secs
    }

    /// Produce `blocks` empty blocks.
    pub fn mine(&mut self, blocks: u64) {
        self.block_number = self.block_number.saturating_add(blocks);
        self.timestamp = self
            .timestamp
            .saturating_add(blocks.saturating_mul(self.block_time_secs));
    }

    /// Mine up to `target`. A no-op when already at or past it.
    pub fn advance_to(&mut self, target: BlockNumber) {
        if target > self.block_number {
            self.mine(target - self.block_number);
        }
    }
}
