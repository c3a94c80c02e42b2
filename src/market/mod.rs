//! Round engine.
//!
//! Each timeframe runs an independent sequence of rounds:
//! `Uninitialized -> Bidding(1) -> Locked(1) / Bidding(2) -> ...`. One
//! oracle sample closes round N-1, locks round N and opens round N+1.
//! Stakes are sent straight to the vault, which holds each round's
//! worst-case payout in reserve. Closing a round releases whatever its
//! winners cannot claim, and claims are paid out of the rest.
//!
//! Every public operation validates everything first, then updates the
//! round tables and ledger, and only then moves tokens.

pub mod ledger;
pub mod round;
pub mod settlement;
pub mod timeframe;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

use crate::chain::Chain;
use crate::math;
use crate::oracle::Oracle;
use crate::token::UnderlyingToken;
use crate::types::{
    Address, Amount, BlockNumber, Direction, Epoch, MarketError, MarketResult, Price, RoundId,
    TimeframeId, Timestamp,
};
use crate::vault::Vault;
use ledger::{Ledger, Position};
use round::Round;
use settlement::{PayoutModel, Settlement, TiePolicy};
use timeframe::{Schedule, Timeframe};

// ---------------------------------------------------------------------------
// Settings and reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketSettings {
    pub name: String,
    /// Smallest accepted stake, in base units.
    pub min_bet: Amount,
    /// Protocol fee on winnings, in basis points.
    pub fee_bps: u16,
    pub treasury: Address,
    pub payout_model: PayoutModel,
    pub tie_policy: TiePolicy,
}

/// Price input for `execute_round`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionPrices {
    /// One sample shared by every listed timeframe.
    Uniform(Price),
    /// One sample per listed timeframe, in the same order.
    PerTimeframe(Vec<Price>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeframeExecution {
    pub timeframe_id: TimeframeId,
    pub closed_epoch: Option<Epoch>,
    pub locked_epoch: Epoch,
    pub started_epoch: Epoch,
    pub oracle_round_id: RoundId,
    pub price: Price,
    /// Blocks past the locked round's `lock_block`.
    pub late_by_blocks: BlockNumber,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub executions: Vec<TimeframeExecution>,
}

impl ExecutionReport {
    pub fn is_empty(&self) -> bool {
        self.executions.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BetReceipt {
    pub timeframe_id: TimeframeId,
    pub epoch: Epoch,
    pub direction: Direction,
    pub amount: Amount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimReceipt {
    pub timeframe_id: TimeframeId,
    pub epoch: Epoch,
    pub settlement: Settlement,
}

// ---------------------------------------------------------------------------
// Market
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryMarket {
    address: Address,
    owner: Address,
    operator: Address,
    vault: Address,
    settings: MarketSettings,
    paused: bool,
    timeframes: BTreeMap<TimeframeId, Timeframe>,
    schedules: BTreeMap<TimeframeId, Schedule>,
    rounds: BTreeMap<TimeframeId, BTreeMap<Epoch, Round>>,
    ledger: Ledger,
}

impl BinaryMarket {
    pub fn new(
        address: Address,
        owner: Address,
        operator: Address,
        vault: Address,
        settings: MarketSettings,
    ) -> MarketResult<Self> {
        if [address, owner, operator, vault, settings.treasury].iter().any(Address::is_zero) {
            return Err(MarketError::ZeroAddress);
        }
        Ok(Self {
            address,
            owner,
            operator,
            vault,
            settings,
            paused: false,
            timeframes: BTreeMap::new(),
            schedules: BTreeMap::new(),
            rounds: BTreeMap::new(),
            ledger: Ledger::new(),
        })
    }

    // -----------------------------------------------------------------------
    // Administration
    // -----------------------------------------------------------------------

    /// Insert or replace timeframes. Rounds already started keep the
    /// interval they opened with; the new one applies from the next round.
    pub fn set_timeframes(&mut self, caller: Address, timeframes: Vec<Timeframe>) -> MarketResult<()> {
        if caller != self.owner {
            return Err(MarketError::Unauthorized("market owner"));
        }
        timeframe::validate_batch(&timeframes)?;
        for tf in timeframes {
            info!(
                timeframe_id = tf.id,
                interval_blocks = tf.interval_blocks,
                buffer_blocks = tf.buffer_blocks,
                "Timeframe configured"
            );
            self.schedules.entry(tf.id).or_default();
            self.timeframes.insert(tf.id, tf);
        }
        Ok(())
    }

    /// Halts betting and execution. Claims stay open.
    pub fn set_pause(&mut self, caller: Address, paused: bool) -> MarketResult<()> {
        if caller != self.owner && caller != self.operator {
            return Err(MarketError::Unauthorized("market owner or operator"));
        }
        self.paused = paused;
        info!(market = %self.settings.name, paused, "Market pause changed");
        Ok(())
    }

    pub fn set_operator(&mut self, caller: Address, operator: Address) -> MarketResult<()> {
        if caller != self.owner {
            return Err(MarketError::Unauthorized("market owner"));
        }
        if operator.is_zero() {
            return Err(MarketError::ZeroAddress);
        }
        self.operator = operator;
        info!(operator = %operator, "Market operator changed");
        Ok(())
    }

    pub fn set_min_bet(&mut self, caller: Address, min_bet: Amount) -> MarketResult<()> {
        if caller != self.owner {
            return Err(MarketError::Unauthorized("market owner"));
        }
        self.settings.min_bet = min_bet;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Genesis
    // -----------------------------------------------------------------------

    pub fn genesis_start_round(&mut self, caller: Address, chain: &Chain, timeframe_id: TimeframeId) -> MarketResult<Epoch> {
        self.ensure_operator(caller)?;
        self.ensure_not_paused()?;
        let tf = self.timeframe(timeframe_id)?.clone();
        if self.schedule(timeframe_id).genesis_started {
            return Err(MarketError::AlreadyStarted(timeframe_id));
        }

        let now = chain.block_number();
        let round = Round::start(1, now, tf.interval_blocks);
        let lock_block = round.lock_block;
        self.rounds.entry(timeframe_id).or_default().insert(1, round);
        let schedule = self.schedules.entry(timeframe_id).or_default();
        schedule.genesis_started = true;
        schedule.current_epoch = 1;

        info!(timeframe_id, block = now, lock_block, "Genesis round started");
        Ok(1)
    }

    /// Lock epoch 1 at `price` and open epoch 2.
    pub fn genesis_lock_round(
        &mut self,
        caller: Address,
        chain: &Chain,
        oracle: &mut Oracle,
        timeframe_id: TimeframeId,
        price: Price,
    ) -> MarketResult<Epoch> {
        self.ensure_operator(caller)?;
        self.ensure_not_paused()?;
        let tf = self.timeframe(timeframe_id)?.clone();
        let schedule = self.schedule(timeframe_id);
        if !schedule.genesis_started {
            return Err(MarketError::NotGenesisStarted(timeframe_id));
        }
        if schedule.genesis_locked {
            return Err(MarketError::AlreadyStarted(timeframe_id));
        }
        let now = chain.block_number();
        let lock_block = self.active_round(timeframe_id)?.lock_block;
        if now < lock_block {
            return Err(MarketError::TooEarly { current: now, required: lock_block });
        }

        let oracle_round_id = self.write_oracle(chain, oracle, &[price])?;

        let rounds = self.rounds.entry(timeframe_id).or_default();
        if let Some(genesis) = rounds.get_mut(&1) {
            genesis.lock(now, price, oracle_round_id);
        }
        rounds.insert(2, Round::start(2, now, tf.interval_blocks));
        let schedule = self.schedules.entry(timeframe_id).or_default();
        schedule.genesis_locked = true;
        schedule.current_epoch = 2;

        info!(timeframe_id, block = now, price, oracle_round_id, "Genesis round locked");
        Ok(2)
    }

    // -----------------------------------------------------------------------
    // Execution
    // -----------------------------------------------------------------------

    /// Advance every listed timeframe by one epoch. An empty list is a no-op.
    pub fn execute_round(
        &mut self,
        caller: Address,
        chain: &Chain,
        oracle: &mut Oracle,
        vault: &mut Vault,
        timeframe_ids: &[TimeframeId],
        prices: ExecutionPrices,
    ) -> MarketResult<ExecutionReport> {
        self.ensure_operator(caller)?;
        self.ensure_not_paused()?;
        if timeframe_ids.is_empty() {
            return Ok(ExecutionReport::default());
        }
        let unique: BTreeSet<_> = timeframe_ids.iter().collect();
        if unique.len() != timeframe_ids.len() {
            return Err(MarketError::InvalidTimeframe("duplicate timeframe in execution".to_string()));
        }
        let samples: Vec<Price> = match &prices {
            ExecutionPrices::Uniform(price) => vec![*price],
            ExecutionPrices::PerTimeframe(list) => {
                if list.len() != timeframe_ids.len() {
                    return Err(MarketError::InvalidArrayLength);
                }
                list.clone()
            }
        };

        let now = chain.block_number();
        for &timeframe_id in timeframe_ids {
            self.timeframe(timeframe_id)?;
            if !self.schedule(timeframe_id).is_running() {
                return Err(MarketError::NotGenesisStarted(timeframe_id));
            }
            let lock_block = self.active_round(timeframe_id)?.lock_block;
            if now < lock_block {
                return Err(MarketError::TooEarly { current: now, required: lock_block });
            }
        }

        let first_round_id = self.write_oracle(chain, oracle, &samples)?;

        let mut report = ExecutionReport::default();
        for (i, &timeframe_id) in timeframe_ids.iter().enumerate() {
            let (oracle_round_id, price) = if samples.len() == 1 {
                (first_round_id, samples[0])
            } else {
                (first_round_id + i as RoundId, samples[i])
            };
            let execution = self.advance(vault, timeframe_id, now, price, oracle_round_id)?;
            report.executions.push(execution);
        }
        Ok(report)
    }

    /// Close N-1, lock N, start N+1. Inputs are already validated.
    fn advance(
        &mut self,
        vault: &mut Vault,
        timeframe_id: TimeframeId,
        now: BlockNumber,
        price: Price,
        oracle_round_id: RoundId,
    ) -> MarketResult<TimeframeExecution> {
        let tf = self.timeframe(timeframe_id)?.clone();
        let current = self.schedule(timeframe_id).current_epoch;

        let mut closed_epoch = None;
        let mut released = 0;
        let closing = self
            .round(timeframe_id, current - 1)
            .filter(|r| !r.oracle_called)
            .cloned();
        if let Some(mut previous) = closing {
            previous.close(price, oracle_round_id);
            let owed = self.settled_liability(timeframe_id, &previous)?;
            released = math::sub(previous.liability, owed)?;
            previous.liability = owed;
            closed_epoch = Some(previous.epoch);
            self.rounds.entry(timeframe_id).or_default().insert(previous.epoch, previous);
        }
        vault.release(self.address, released)?;

        let rounds = self.rounds.entry(timeframe_id).or_default();
        let mut late_by_blocks = 0;
        if let Some(active) = rounds.get_mut(&current) {
            late_by_blocks = now.saturating_sub(active.lock_block);
            active.lock(now, price, oracle_round_id);
        }
        let next = current + 1;
        rounds.insert(next, Round::start(next, now, tf.interval_blocks));
        self.schedules.entry(timeframe_id).or_default().current_epoch = next;

        if late_by_blocks > tf.buffer_blocks {
            warn!(
                timeframe_id,
                epoch = current,
                late_by_blocks,
                buffer_blocks = tf.buffer_blocks,
                "Late execution"
            );
        }
        info!(
            timeframe_id,
            closed = ?closed_epoch,
            locked = current,
            started = next,
            price,
            oracle_round_id,
            released,
            "Round executed"
        );

        Ok(TimeframeExecution {
            timeframe_id,
            closed_epoch,
            locked_epoch: current,
            started_epoch: next,
            oracle_round_id,
            price,
            late_by_blocks,
        })
    }

    /// What the closed `round`'s claimants are owed in total.
    fn settled_liability(&self, timeframe_id: TimeframeId, round: &Round) -> MarketResult<Amount> {
        let mut owed: Amount = 0;
        for (_, position) in self.ledger.round_positions(timeframe_id, round.epoch) {
            if position.claimed || !settlement::is_eligible(round, position, self.settings.tie_policy) {
                continue;
            }
            let settlement = settlement::settle(
                round,
                position,
                self.settings.payout_model,
                self.settings.tie_policy,
                self.settings.fee_bps,
            )?;
            owed = math::add(owed, settlement.gross)?;
        }
        Ok(owed)
    }

    /// Record samples as consecutive oracle rounds. Returns the first id.
    fn write_oracle(&self, chain: &Chain, oracle: &mut Oracle, samples: &[Price]) -> MarketResult<RoundId> {
        let first_id = oracle.next_round_id();
        let first_ts: Timestamp = match oracle.latest_timestamp() {
            Some(last) => chain.timestamp().max(last.saturating_add(1)),
            None => chain.timestamp(),
        };
        if let [price] = samples {
            oracle.write_price(self.address, first_id, first_ts, *price)?;
        } else {
            let ids: Vec<RoundId> = (0..samples.len() as RoundId).map(|i| first_id + i).collect();
            let timestamps: Vec<Timestamp> = (0..samples.len() as u64).map(|i| first_ts + i).collect();
            oracle.write_batch_prices(self.address, &ids, &timestamps, samples)?;
        }
        Ok(first_id)
    }

    /// Timeframes that need an execution at the current block.
    pub fn get_executable_timeframes(&self, chain: &Chain) -> Vec<TimeframeId> {
        self.timeframes
            .keys()
            .copied()
            .filter(|&id| self.is_necessary_to_execute(chain, id))
            .collect()
    }

    /// Due when the active round is past its lock block and either it or
    /// the unclosed previous round holds stakes.
    pub fn is_necessary_to_execute(&self, chain: &Chain, timeframe_id: TimeframeId) -> bool {
        if !self.schedule(timeframe_id).is_running() {
            return false;
        }
        let Ok(active) = self.active_round(timeframe_id) else {
            return false;
        };
        chain.block_number() >= active.lock_block && (active.has_bets() || self.previous_awaiting_close(timeframe_id))
    }

    /// Genesis steps still to run for a configured timeframe.
    pub fn pending_genesis(&self, timeframe_id: TimeframeId) -> Option<GenesisStep> {
        self.timeframes.get(&timeframe_id)?;
        let schedule = self.schedule(timeframe_id);
        if !schedule.genesis_started {
            Some(GenesisStep::Start)
        } else if !schedule.genesis_locked {
            Some(GenesisStep::Lock)
        } else {
            None
        }
    }

    // -----------------------------------------------------------------------
    // Betting
    // -----------------------------------------------------------------------

    /// Stake `amount` on `direction` in the active round. The market must be
    /// approved to move `user`'s tokens, and the vault must be able to
    /// reserve the round's new worst-case payout.
    #[allow(clippy::too_many_arguments)]
    pub fn open_position<T: UnderlyingToken>(
        &mut self,
        user: Address,
        chain: &Chain,
        token: &mut T,
        vault: &mut Vault,
        timeframe_id: TimeframeId,
        direction: Direction,
        amount: Amount,
    ) -> MarketResult<BetReceipt> {
        self.ensure_not_paused()?;
        self.timeframe(timeframe_id)?;
        if amount == 0 {
            return Err(MarketError::ZeroAmount);
        }
        if amount < self.settings.min_bet {
            return Err(MarketError::BelowMinimum { amount, minimum: self.settings.min_bet });
        }
        let epoch = self.schedule(timeframe_id).current_epoch;
        if !self.is_biddable(chain, timeframe_id) {
            return Err(MarketError::RoundNotBiddable { timeframe_id, epoch });
        }
        if self.ledger.contains(timeframe_id, epoch, user) {
            return Err(MarketError::DuplicatePosition(epoch));
        }
        let active = self.active_round(timeframe_id)?;
        let (bull, bear) = active.with_bet(direction, amount)?;
        let exposure = settlement::exposure(bull, bear, self.settings.payout_model)?;
        let top_up = exposure.saturating_sub(active.liability);
        let liability = math::add(active.liability, top_up)?;
        token.ensure_transfer_from(self.address, user, self.vault, amount)?;
        vault.ensure_reserve(token, self.address, top_up, amount)?;

        if let Some(round) = self.rounds.get_mut(&timeframe_id).and_then(|r| r.get_mut(&epoch)) {
            round.total_bull_amount = bull;
            round.total_bear_amount = bear;
            round.liability = liability;
        }
        self.ledger.record(timeframe_id, epoch, user, amount, direction)?;
        vault.reserve(self.address, top_up)?;
        token.transfer_from(self.address, user, self.vault, amount)?;

        info!(user = %user, timeframe_id, epoch, direction = %direction, amount, "Position opened");
        Ok(BetReceipt { timeframe_id, epoch, direction, amount })
    }

    /// Whether the active round accepts a stake right now. A round past its
    /// lock block stays open while idle, until its first stake arrives.
    pub fn is_biddable(&self, chain: &Chain, timeframe_id: TimeframeId) -> bool {
        let Ok(active) = self.active_round(timeframe_id) else {
            return false;
        };
        if active.phase() != round::RoundPhase::Bidding {
            return false;
        }
        if chain.block_number() < active.lock_block {
            return true;
        }
        !active.has_bets() && !self.previous_awaiting_close(timeframe_id)
    }

    // -----------------------------------------------------------------------
    // Claims
    // -----------------------------------------------------------------------

    pub fn is_claimable(&self, timeframe_id: TimeframeId, epoch: Epoch, user: Address) -> bool {
        let (Some(round), Some(position)) = (self.round(timeframe_id, epoch), self.ledger.get(timeframe_id, epoch, user)) else {
            return false;
        };
        !position.claimed
            && round.oracle_called
            && settlement::is_eligible(round, position, self.settings.tie_policy)
    }

    /// What a claim would pay, without paying it.
    pub fn preview_claim(&self, timeframe_id: TimeframeId, epoch: Epoch, user: Address) -> MarketResult<Settlement> {
        self.timeframe(timeframe_id)?;
        let current = self.schedule(timeframe_id).current_epoch;
        if epoch == 0 || epoch > current {
            return Err(MarketError::RoundNotStarted(epoch));
        }
        let round = self.round(timeframe_id, epoch).ok_or(MarketError::RoundNotStarted(epoch))?;
        if !round.oracle_called {
            return Err(MarketError::RoundNotEnded(epoch));
        }
        let position = self.ledger.get(timeframe_id, epoch, user).ok_or(MarketError::NotClaimable(epoch))?;
        if position.claimed {
            return Err(MarketError::AlreadyClaimed(epoch));
        }
        settlement::settle(
            round,
            position,
            self.settings.payout_model,
            self.settings.tie_policy,
            self.settings.fee_bps,
        )
    }

    /// Pay out a settled position from the vault: net to the user, fee to treasury.
    pub fn claim<T: UnderlyingToken>(
        &mut self,
        user: Address,
        token: &mut T,
        vault: &mut Vault,
        timeframe_id: TimeframeId,
        epoch: Epoch,
    ) -> MarketResult<ClaimReceipt> {
        let settlement = self.preview_claim(timeframe_id, epoch, user)?;
        let left = self.liability_after(timeframe_id, epoch, settlement.gross)?;
        vault.ensure_pay_out(token, self.address, settlement.gross)?;

        self.ledger.mark_claimed(timeframe_id, epoch, user)?;
        self.set_liability(timeframe_id, epoch, left);
        self.pay(token, vault, user, &settlement)?;

        info!(
            user = %user,
            timeframe_id,
            epoch,
            net = settlement.net,
            fee = settlement.fee,
            refund = settlement.refund,
            "Claimed"
        );
        Ok(ClaimReceipt { timeframe_id, epoch, settlement })
    }

    /// Epochs in `timeframe_id` that `user` can claim now.
    pub fn claimable_epochs(&self, timeframe_id: TimeframeId, user: Address) -> Vec<Epoch> {
        self.ledger
            .user_rounds(timeframe_id, user)
            .iter()
            .copied()
            .filter(|&epoch| self.is_claimable(timeframe_id, epoch, user))
            .collect()
    }

    /// Claim every claimable epoch at once. Nothing is paid unless the vault
    /// covers all of them.
    pub fn claim_all<T: UnderlyingToken>(
        &mut self,
        user: Address,
        token: &mut T,
        vault: &mut Vault,
        timeframe_id: TimeframeId,
    ) -> MarketResult<Vec<ClaimReceipt>> {
        let epochs = self.claimable_epochs(timeframe_id, user);
        let mut planned = Vec::with_capacity(epochs.len());
        let mut total: Amount = 0;
        for epoch in epochs {
            let settlement = self.preview_claim(timeframe_id, epoch, user)?;
            let left = self.liability_after(timeframe_id, epoch, settlement.gross)?;
            total = math::add(total, settlement.gross)?;
            planned.push((epoch, settlement, left));
        }
        if planned.is_empty() {
            return Ok(Vec::new());
        }
        vault.ensure_pay_out(token, self.address, total)?;

        for (epoch, _, left) in &planned {
            self.ledger.mark_claimed(timeframe_id, *epoch, user)?;
            self.set_liability(timeframe_id, *epoch, *left);
        }
        let mut receipts = Vec::with_capacity(planned.len());
        for (epoch, settlement, _) in planned {
            self.pay(token, vault, user, &settlement)?;
            receipts.push(ClaimReceipt { timeframe_id, epoch, settlement });
        }
        info!(user = %user, timeframe_id, claims = receipts.len(), total, "Claimed all");
        Ok(receipts)
    }

    fn liability_after(&self, timeframe_id: TimeframeId, epoch: Epoch, gross: Amount) -> MarketResult<Amount> {
        let round = self.round(timeframe_id, epoch).ok_or(MarketError::RoundNotStarted(epoch))?;
        math::sub(round.liability, gross)
    }

    fn set_liability(&mut self, timeframe_id: TimeframeId, epoch: Epoch, liability: Amount) {
        if let Some(round) = self.rounds.get_mut(&timeframe_id).and_then(|r| r.get_mut(&epoch)) {
            round.liability = liability;
        }
    }

    fn pay<T: UnderlyingToken>(
        &self,
        token: &mut T,
        vault: &mut Vault,
        user: Address,
        settlement: &Settlement,
    ) -> MarketResult<()> {
        vault.pay_out(token, self.address, user, settlement.net)?;
        if settlement.fee > 0 {
            vault.pay_out(token, self.address, self.settings.treasury, settlement.fee)?;
            debug!(treasury = %self.settings.treasury, fee = settlement.fee, "Fee routed");
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn operator(&self) -> Address {
        self.operator
    }

    pub fn vault_address(&self) -> Address {
        self.vault
    }

    pub fn settings(&self) -> &MarketSettings {
        &self.settings
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn timeframes(&self) -> impl Iterator<Item = &Timeframe> {
        self.timeframes.values()
    }

    pub fn timeframe(&self, timeframe_id: TimeframeId) -> MarketResult<&Timeframe> {
        self.timeframes
            .get(&timeframe_id)
            .ok_or(MarketError::UnknownTimeframe(timeframe_id))
    }

    pub fn schedule(&self, timeframe_id: TimeframeId) -> Schedule {
        self.schedules.get(&timeframe_id).cloned().unwrap_or_default()
    }

    pub fn current_epoch(&self, timeframe_id: TimeframeId) -> Epoch {
        self.schedule(timeframe_id).current_epoch
    }

    pub fn round(&self, timeframe_id: TimeframeId, epoch: Epoch) -> Option<&Round> {
        self.rounds.get(&timeframe_id).and_then(|r| r.get(&epoch))
    }

    /// Most recent rounds of a timeframe, newest first.
    pub fn recent_rounds(&self, timeframe_id: TimeframeId, limit: usize) -> Vec<&Round> {
        self.rounds
            .get(&timeframe_id)
            .map(|r| r.values().rev().take(limit).collect())
            .unwrap_or_default()
    }

    pub fn position(&self, timeframe_id: TimeframeId, epoch: Epoch, user: Address) -> Option<&Position> {
        self.ledger.get(timeframe_id, epoch, user)
    }

    /// Epoch of `user`'s `slot`-th bet in `timeframe_id`.
    pub fn user_rounds(&self, timeframe_id: TimeframeId, user: Address, slot: usize) -> Option<Epoch> {
        self.ledger.user_round(timeframe_id, user, slot)
    }

    pub fn user_rounds_length(&self, timeframe_id: TimeframeId, user: Address) -> usize {
        self.ledger.user_rounds(timeframe_id, user).len()
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn active_round(&self, timeframe_id: TimeframeId) -> MarketResult<&Round> {
        let epoch = self.schedule(timeframe_id).current_epoch;
        self.round(timeframe_id, epoch)
            .ok_or(MarketError::NotGenesisStarted(timeframe_id))
    }

    fn previous_awaiting_close(&self, timeframe_id: TimeframeId) -> bool {
        let epoch = self.schedule(timeframe_id).current_epoch;
        epoch > 1
            && self
                .round(timeframe_id, epoch - 1)
                .is_some_and(Round::awaiting_close)
    }

    fn ensure_operator(&self, caller: Address) -> MarketResult<()> {
        if caller != self.operator {
            return Err(MarketError::Unauthorized("market operator"));
        }
        Ok(())
    }

    fn ensure_not_paused(&self) -> MarketResult<()> {
        if self.paused {
            return Err(MarketError::Paused);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GenesisStep {
    Start,
    Lock,
}
