//! Payout policy for closed rounds.

use serde::{Deserialize, Serialize};

use super::ledger::Position;
use super::round::{Outcome, Round};
use crate::math;
use crate::types::{Amount, MarketError, MarketResult};

/// How a winning stake is valued.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutModel {
    /// Winners split the whole round pool pro rata: `amount * total / winning_pool`.
    #[default]
    Parimutuel,
    /// House-backed even odds: winners receive `2 * amount` from the vault.
    FixedOdds,
}

/// What happens when the close price equals the lock price.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TiePolicy {
    /// Both sides reclaim their principal, no fee.
    #[default]
    Refund,
    /// Nobody can claim; stakes stay in the vault.
    HouseWins,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub gross: Amount,
    pub fee: Amount,
    pub net: Amount,
    pub refund: bool,
}

/// Most the vault can owe on a round with these pools, whatever the outcome.
pub fn exposure(bull: Amount, bear: Amount, model: PayoutModel) -> MarketResult<Amount> {
    match model {
        PayoutModel::Parimutuel => math::add(bull, bear),
        PayoutModel::FixedOdds => {
            let side = bull.max(bear);
            math::add(side, side)
        }
    }
}

/// Whether a position on a closed round pays anything. Ignores the claimed flag.
pub fn is_eligible(round: &Round, position: &Position, tie_policy: TiePolicy) -> bool {
    match round.outcome() {
        Some(Outcome::Winner(side)) => position.direction == side,
        Some(Outcome::Draw) => tie_policy == TiePolicy::Refund,
        None => false,
    }
}

pub fn settle(
    round: &Round,
    position: &Position,
    model: PayoutModel,
    tie_policy: TiePolicy,
    fee_bps: u16,
) -> MarketResult<Settlement> {
    if !is_eligible(round, position, tie_policy) {
        return Err(MarketError::NotClaimable(round.epoch));
    }

    if round.outcome() == Some(Outcome::Draw) {
        return Ok(Settlement {
            gross: position.amount,
            fee: 0,
            net: position.amount,
            refund: true,
        });
    }

    let gross = match model {
        PayoutModel::Parimutuel => {
            let total = math::add(round.total_bull_amount, round.total_bear_amount)?;
            math::mul_div(position.amount, total, round.pool(position.direction))?
        }
        PayoutModel::FixedOdds => math::add(position.amount, position.amount)?,
    };
    let fee = math::apply_bps(gross, fee_bps)?;
    Ok(Settlement {
        gross,
        fee,
        net: math::sub(gross, fee)?,
        refund: false,
    })
}
