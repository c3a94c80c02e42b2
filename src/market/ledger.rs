//! Bet ledger.
//!
//! One position per `(timeframe, epoch, user)`, plus an append-only list of
//! the epochs each user has bet on so claims can be located without an
//! external index.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{Address, Amount, Direction, Epoch, MarketError, MarketResult, TimeframeId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub amount: Amount,
    pub direction: Direction,
    pub claimed: bool,
}

type EpochBook = BTreeMap<Epoch, BTreeMap<Address, Position>>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    positions: BTreeMap<TimeframeId, EpochBook>,
    user_rounds: BTreeMap<TimeframeId, BTreeMap<Address, Vec<Epoch>>>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, timeframe_id: TimeframeId, epoch: Epoch, user: Address) -> Option<&Position> {
        self.positions
            .get(&timeframe_id)
            .and_then(|book| book.get(&epoch))
            .and_then(|users| users.get(&user))
    }

    pub fn contains(&self, timeframe_id: TimeframeId, epoch: Epoch, user: Address) -> bool {
        self.get(timeframe_id, epoch, user).is_some()
    }

    pub fn record(
        &mut self,
        timeframe_id: TimeframeId,
        epoch: Epoch,
        user: Address,
        amount: Amount,
        direction: Direction,
    ) -> MarketResult<()> {
        if self.contains(timeframe_id, epoch, user) {
            return Err(MarketError::DuplicatePosition(epoch));
        }
        self.positions
            .entry(timeframe_id)
            .or_default()
            .entry(epoch)
            .or_default()
            .insert(user, Position { amount, direction, claimed: false });
        self.user_rounds
            .entry(timeframe_id)
            .or_default()
            .entry(user)
            .or_default()
            .push(epoch);
        Ok(())
    }

    /// Flip the claimed flag. Fails if the position is missing or already claimed.
    pub fn mark_claimed(&mut self, timeframe_id: TimeframeId, epoch: Epoch, user: Address) -> MarketResult<()> {
        let position = self
            .positions
            .get_mut(&timeframe_id)
            .and_then(|book| book.get_mut(&epoch))
            .and_then(|users| users.get_mut(&user))
            .ok_or(MarketError::NotClaimable(epoch))?;
        if position.claimed {
            return Err(MarketError::AlreadyClaimed(epoch));
        }
        position.claimed = true;
        Ok(())
    }

    /// Epochs `user` bet on in `timeframe_id`, oldest first.
    pub fn user_rounds(&self, timeframe_id: TimeframeId, user: Address) -> &[Epoch] {
        self.user_rounds
            .get(&timeframe_id)
            .and_then(|m| m.get(&user))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn user_round(&self, timeframe_id: TimeframeId, user: Address, slot: usize) -> Option<Epoch> {
        self.user_rounds(timeframe_id, user).get(slot).copied()
    }

    /// Every position in one round.
    pub fn round_positions(&self, timeframe_id: TimeframeId, epoch: Epoch) -> impl Iterator<Item = (&Address, &Position)> {
        self.positions
            .get(&timeframe_id)
            .and_then(|book| book.get(&epoch))
            .into_iter()
            .flat_map(|users| users.iter())
    }
}
