//! Append-only price feed keyed by round id.
//!
//! Round ids and timestamps must both increase strictly. Ids are dense
//! from 0, so rounds are stored in a `Vec` indexed by id.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info};

use crate::types::{Address, MarketError, MarketResult, Price, RoundId, Timestamp};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleRound {
    pub writer: Address,
    pub timestamp: Timestamp,
    pub price: Price,
}

/// Result of `latest_round_data`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundData {
    pub round_id: RoundId,
    pub timestamp: Timestamp,
    pub price: Price,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Oracle {
    admin: Address,
    writers: BTreeSet<Address>,
    rounds: Vec<OracleRound>,
}

impl Oracle {
    pub fn new(admin: Address) -> Self {
        Self {
            admin,
            writers: BTreeSet::new(),
            rounds: Vec::new(),
        }
    }

    pub fn admin(&self) -> Address {
        self.admin
    }

    pub fn set_writer(&mut self, caller: Address, writer: Address, enabled: bool) -> MarketResult<()> {
        if caller != self.admin {
            return Err(MarketError::Unauthorized("oracle admin"));
        }
        if writer.is_zero() {
            return Err(MarketError::ZeroAddress);
        }
        if enabled {
            self.writers.insert(writer);
        } else {
            self.writers.remove(&writer);
        }
        info!(writer = %writer, enabled, "Oracle writer updated");
        Ok(())
    }

    pub fn is_writer(&self, account: Address) -> bool {
        self.writers.contains(&account)
    }

    /// Id the next write must use.
    pub fn next_round_id(&self) -> RoundId {
        self.rounds.len() as RoundId
    }

    pub fn latest_timestamp(&self) -> Option<Timestamp> {
        self.rounds.last().map(|r| r.timestamp)
    }

    pub fn write_price(
        &mut self,
        caller: Address,
        round_id: RoundId,
        timestamp: Timestamp,
        price: Price,
    ) -> MarketResult<()> {
        self.ensure_writer(caller)?;
        check_sequence(self.next_round_id(), self.latest_timestamp(), round_id, timestamp)?;
        self.rounds.push(OracleRound { writer: caller, timestamp, price });
        debug!(round_id, timestamp, price, "Oracle price written");
        Ok(())
    }

    /// Write several consecutive rounds. Either all of them are stored or none.
    pub fn write_batch_prices(
        &mut self,
        caller: Address,
        round_ids: &[RoundId],
        timestamps: &[Timestamp],
        prices: &[Price],
    ) -> MarketResult<()> {
        self.ensure_writer(caller)?;
        if round_ids.len() != timestamps.len() || round_ids.len() != prices.len() {
            return Err(MarketError::InvalidArrayLength);
        }

        let mut expected = self.next_round_id();
        let mut previous = self.latest_timestamp();
        for (&round_id, &timestamp) in round_ids.iter().zip(timestamps) {
            check_sequence(expected, previous, round_id, timestamp)?;
            expected += 1;
            previous = Some(timestamp);
        }

        for (&timestamp, &price) in timestamps.iter().zip(prices) {
            self.rounds.push(OracleRound { writer: caller, timestamp, price });
        }
        debug!(count = round_ids.len(), "Oracle batch written");
        Ok(())
    }

    pub fn get_round_data(&self, round_id: RoundId) -> MarketResult<&OracleRound> {
        usize::try_from(round_id)
            .ok()
            .and_then(|i| self.rounds.get(i))
            .ok_or(MarketError::NotFound(round_id))
    }

    pub fn latest_round_data(&self) -> MarketResult<RoundData> {
        let round = self.rounds.last().ok_or(MarketError::NoData)?;
        Ok(RoundData {
            round_id: self.next_round_id() - 1,
            timestamp: round.timestamp,
            price: round.price,
        })
    }

    fn ensure_writer(&self, caller: Address) -> MarketResult<()> {
        if !self.is_writer(caller) {
            return Err(MarketError::Unauthorized("oracle writer"));
        }
        Ok(())
    }
}

fn check_sequence(
    expected: RoundId,
    previous: Option<Timestamp>,
    round_id: RoundId,
    timestamp: Timestamp,
) -> MarketResult<()> {
    let in_order = round_id == expected && previous.map_or(true, |p| timestamp > p);
    if !in_order {
        return Err(MarketError::InvalidSequence { round_id, timestamp });
    }
    Ok(())
}
