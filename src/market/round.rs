//! Per-epoch round state.

use serde::{Deserialize, Serialize};

use crate::math;
use crate::types::{Amount, BlockNumber, Direction, Epoch, MarketResult, Price, RoundId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundPhase {
    Bidding,
    Locked,
    Closed,
}

/// How a closed round resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Winner(Direction),
    Draw,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round {
    pub epoch: Epoch,
    pub start_block: BlockNumber,
    pub lock_block: BlockNumber,
    pub close_block: BlockNumber,
    /// Round length fixed when the round opened.
    pub interval_blocks: BlockNumber,
    pub lock_price: Option<Price>,
    pub close_price: Option<Price>,
    pub lock_oracle_round_id: Option<RoundId>,
    pub close_oracle_round_id: Option<RoundId>,
    /// Set once the close price has been written.
    pub oracle_called: bool,
    pub total_bull_amount: Amount,
    pub total_bear_amount: Amount,
    /// Vault funds still earmarked for this round's positions.
    #[serde(default)]
    pub liability: Amount,
}

impl Round {
    /// Open a round for bidding at `now`.
    pub fn start(epoch: Epoch, now: BlockNumber, interval_blocks: BlockNumber) -> Self {
        let lock_block = now.saturating_add(interval_blocks);
        Self {
            epoch,
            start_block: now,
            lock_block,
            close_block: lock_block.saturating_add(interval_blocks),
            interval_blocks,
            lock_price: None,
            close_price: None,
            lock_oracle_round_id: None,
            close_oracle_round_id: None,
            oracle_called: false,
            total_bull_amount: 0,
            total_bear_amount: 0,
            liability: 0,
        }
    }

    /// Freeze the round at `price`. The close is rescheduled one of this
    /// round's intervals from now.
    pub fn lock(&mut self, now: BlockNumber, price: Price, oracle_round_id: RoundId) {
        self.lock_price = Some(price);
        self.lock_oracle_round_id = Some(oracle_round_id);
        self.close_block = now.saturating_add(self.interval_blocks);
    }

    pub fn close(&mut self, price: Price, oracle_round_id: RoundId) {
        self.close_price = Some(price);
        self.close_oracle_round_id = Some(oracle_round_id);
        self.oracle_called = true;
    }

    pub fn phase(&self) -> RoundPhase {
        if self.oracle_called {
            RoundPhase::Closed
        } else if self.lock_price.is_some() {
            RoundPhase::Locked
        } else {
            RoundPhase::Bidding
        }
    }

    pub fn total_amount(&self) -> Amount {
        self.total_bull_amount.saturating_add(self.total_bear_amount)
    }

    pub fn has_bets(&self) -> bool {
        self.total_bull_amount > 0 || self.total_bear_amount > 0
    }

    /// Locked or bidding round that still holds stakes.
    pub fn awaiting_close(&self) -> bool {
        self.has_bets() && !self.oracle_called
    }

    pub fn pool(&self, direction: Direction) -> Amount {
        match direction {
            Direction::Bull => self.total_bull_amount,
            Direction::Bear => self.total_bear_amount,
        }
    }

    /// Totals after adding a stake, without applying it.
    pub fn with_bet(&self, direction: Direction, amount: Amount) -> MarketResult<(Amount, Amount)> {
        match direction {
            Direction::Bull => Ok((math::add(self.total_bull_amount, amount)?, self.total_bear_amount)),
            Direction::Bear => Ok((self.total_bull_amount, math::add(self.total_bear_amount, amount)?)),
        }
    }

    pub fn outcome(&self) -> Option<Outcome> {
        if !self.oracle_called {
            return None;
        }
        let (lock, close) = (self.lock_price?, self.close_price?);
        Some(if close > lock {
            Outcome::Winner(Direction::Bull)
        } else if close < lock {
            Outcome::Winner(Direction::Bear)
        } else {
            Outcome::Draw
        })
    }
}
