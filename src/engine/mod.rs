//! Assembled deployment: chain clock, underlying token, oracle, vault and
//! market wired together, with every user, operator and LP entry point.
//!
//! `engine::keeper` drives the operator side on a timer.

pub mod keeper;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::chain::Chain;
use crate::config::AppConfig;
use crate::market::round::Round;
use crate::market::{
    BetReceipt, BinaryMarket, ClaimReceipt, ExecutionPrices, ExecutionReport, MarketSettings,
};
use crate::oracle::{Oracle, RoundData};
use crate::token::{MemoryToken, UnderlyingToken};
use crate::types::{
    Address, Amount, BlockNumber, Direction, Epoch, MarketResult, Price, TimeframeId, TokenId,
};
use crate::vault::{BulkWithdrawal, UserShares, Vault, Withdrawal};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Engine {
    pub chain: Chain,
    pub token: MemoryToken,
    pub oracle: Oracle,
    pub vault: Vault,
    pub market: BinaryMarket,
    pub created_at: DateTime<Utc>,
    /// Keeper ticks applied since creation.
    pub ticks: u64,
}

/// Point-in-time summary for the dashboard and logs.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub market: String,
    pub token_symbol: String,
    pub block_number: BlockNumber,
    pub timestamp: u64,
    pub paused: bool,
    pub ticks: u64,
    pub vault_balance: Amount,
    /// Part of `vault_balance` owed to bettors.
    pub vault_reserved: Amount,
    pub total_share_supply: Amount,
    pub position_tokens: usize,
    pub latest_oracle_round: Option<RoundData>,
    pub timeframes: Vec<TimeframeStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimeframeStatus {
    pub id: TimeframeId,
    pub interval_blocks: BlockNumber,
    pub buffer_blocks: BlockNumber,
    pub current_epoch: Epoch,
    pub genesis_started: bool,
    pub genesis_locked: bool,
    pub active_lock_block: Option<BlockNumber>,
    pub executable: bool,
}

impl Engine {
    /// Bootstrap a fresh deployment from configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let m = &config.market;
        let genesis_ts = config
            .chain
            .genesis_timestamp
            .unwrap_or_else(|| Utc::now().timestamp().max(0) as u64);
        let chain = Chain::new(genesis_ts, config.chain.block_time_secs);
        let mut token = MemoryToken::new(config.token.symbol.clone(), config.token.decimals);

        let mut oracle = Oracle::new(m.owner);
        oracle.set_writer(m.owner, m.address, true).context("Failed to authorise market as oracle writer")?;

        let mut vault = Vault::new(config.vault.address, m.owner, config.vault.name.clone(), config.vault.symbol.clone())
            .with_dust_floor(config.vault.dust_floor);
        vault.whitelist_market(m.owner, m.address, true).context("Failed to whitelist market")?;

        let settings = MarketSettings {
            name: m.name.clone(),
            min_bet: config.min_bet_units()?,
            fee_bps: m.fee_bps,
            treasury: m.treasury,
            payout_model: m.payout_model,
            tie_policy: m.tie_policy,
        };
        let mut market = BinaryMarket::new(m.address, m.owner, m.operator, config.vault.address, settings)
            .context("Invalid market addresses")?;
        market.set_timeframes(m.owner, config.timeframes.clone()).context("Failed to set timeframes")?;

        for (address, amount) in config.faucet_units()? {
            token.mint(address, amount).with_context(|| format!("Faucet mint to {address} failed"))?;
        }
        if let Some(seed) = config.seed_liquidity_units()? {
            token.mint(m.owner, seed).context("Seed mint failed")?;
            token.approve(m.owner, vault.address(), seed)?;
            vault
                .add_new_liquidity_position(&mut token, m.owner, m.owner, seed)
                .context("Seed deposit failed")?;
        }

        info!(
            market = %m.name,
            timeframes = config.timeframes.len(),
            payout_model = ?m.payout_model,
            tie_policy = ?m.tie_policy,
            "Engine bootstrapped"
        );

        Ok(Self {
            chain,
            token,
            oracle,
            vault,
            market,
            created_at: Utc::now(),
            ticks: 0,
        })
    }

    pub fn mine(&mut self, blocks: u64) {
        self.chain.mine(blocks);
    }

    pub fn block_number(&self) -> BlockNumber {
        self.chain.block_number()
    }

    // -----------------------------------------------------------------------
    // Operator
    // -----------------------------------------------------------------------

    pub fn genesis_start_round(&mut self, caller: Address, timeframe_id: TimeframeId) -> MarketResult<Epoch> {
        self.market.genesis_start_round(caller, &self.chain, timeframe_id)
    }

    pub fn genesis_lock_round(&mut self, caller: Address, timeframe_id: TimeframeId, price: Price) -> MarketResult<Epoch> {
        self.market
            .genesis_lock_round(caller, &self.chain, &mut self.oracle, timeframe_id, price)
    }

    pub fn execute_round(
        &mut self,
        caller: Address,
        timeframe_ids: &[TimeframeId],
        prices: ExecutionPrices,
    ) -> MarketResult<ExecutionReport> {
        self.market
            .execute_round(caller, &self.chain, &mut self.oracle, &mut self.vault, timeframe_ids, prices)
    }

    pub fn executable_timeframes(&self) -> Vec<TimeframeId> {
        self.market.get_executable_timeframes(&self.chain)
    }

    pub fn set_pause(&mut self, caller: Address, paused: bool) -> MarketResult<()> {
        self.market.set_pause(caller, paused)
    }

    // -----------------------------------------------------------------------
    // Bettors
    // -----------------------------------------------------------------------

    /// Approve the market to pull `amount` of the underlying from `user`.
    pub fn approve_market(&mut self, user: Address, amount: Amount) -> MarketResult<()> {
        self.token.approve(user, self.market.address(), amount)
    }

    pub fn open_position(
        &mut self,
        user: Address,
        timeframe_id: TimeframeId,
        direction: Direction,
        amount: Amount,
    ) -> MarketResult<BetReceipt> {
        self.market
            .open_position(user, &self.chain, &mut self.token, &mut self.vault, timeframe_id, direction, amount)
    }

    pub fn is_claimable(&self, timeframe_id: TimeframeId, epoch: Epoch, user: Address) -> bool {
        self.market.is_claimable(timeframe_id, epoch, user)
    }

    pub fn claim(&mut self, user: Address, timeframe_id: TimeframeId, epoch: Epoch) -> MarketResult<ClaimReceipt> {
        self.market
            .claim(user, &mut self.token, &mut self.vault, timeframe_id, epoch)
    }

    pub fn claim_all(&mut self, user: Address, timeframe_id: TimeframeId) -> MarketResult<Vec<ClaimReceipt>> {
        self.market
            .claim_all(user, &mut self.token, &mut self.vault, timeframe_id)
    }

    // -----------------------------------------------------------------------
    // Liquidity providers
    // -----------------------------------------------------------------------

    /// Approve the vault to pull `amount` of the underlying from `provider`.
    pub fn approve_vault(&mut self, provider: Address, amount: Amount) -> MarketResult<()> {
        self.token.approve(provider, self.vault.address(), amount)
    }

    pub fn add_new_liquidity_position(
        &mut self,
        caller: Address,
        recipient: Address,
        amount: Amount,
    ) -> MarketResult<(TokenId, Amount)> {
        self.vault
            .add_new_liquidity_position(&mut self.token, caller, recipient, amount)
    }

    pub fn add_liquidity_position(
        &mut self,
        caller: Address,
        owner: Address,
        token_id: TokenId,
        amount: Amount,
    ) -> MarketResult<Amount> {
        self.vault
            .add_liquidity_position(&mut self.token, caller, owner, token_id, amount)
    }

    pub fn remove_liquidity_position(
        &mut self,
        caller: Address,
        owner: Address,
        token_id: TokenId,
        share_amount: Amount,
    ) -> MarketResult<Withdrawal> {
        self.vault
            .remove_liquidity_position(&mut self.token, caller, owner, token_id, share_amount)
    }

    pub fn remove_liquidity(&mut self, caller: Address, owner: Address, share_amount: Amount) -> MarketResult<BulkWithdrawal> {
        self.vault
            .remove_liquidity(&mut self.token, caller, owner, share_amount)
    }

    pub fn merge_positions(&mut self, caller: Address, owner: Address, token_ids: &[TokenId]) -> MarketResult<TokenId> {
        self.vault.merge_positions(caller, owner, token_ids)
    }

    pub fn split_position(&mut self, caller: Address, token_id: TokenId, share_amount: Amount) -> MarketResult<TokenId> {
        self.vault.split_position(caller, token_id, share_amount)
    }

    pub fn transfer_position(&mut self, caller: Address, from: Address, to: Address, token_id: TokenId) -> MarketResult<()> {
        self.vault.transfer_position(caller, from, to, token_id)
    }

    pub fn shares_of_user(&self, owner: Address) -> MarketResult<UserShares> {
        self.vault.shares_of_user(&self.token, owner)
    }

    // -----------------------------------------------------------------------
    // Reporting
    // -----------------------------------------------------------------------

    pub fn status(&self) -> EngineStatus {
        let executable = self.executable_timeframes();
        let timeframes = self
            .market
            .timeframes()
            .map(|tf| {
                let schedule = self.market.schedule(tf.id);
                TimeframeStatus {
                    id: tf.id,
                    interval_blocks: tf.interval_blocks,
                    buffer_blocks: tf.buffer_blocks,
                    current_epoch: schedule.current_epoch,
                    genesis_started: schedule.genesis_started,
                    genesis_locked: schedule.genesis_locked,
                    active_lock_block: self
                        .market
                        .round(tf.id, schedule.current_epoch)
                        .map(|r| r.lock_block),
                    executable: executable.contains(&tf.id),
                }
            })
            .collect();

        EngineStatus {
            market: self.market.settings().name.clone(),
            token_symbol: self.token.symbol.clone(),
            block_number: self.chain.block_number(),
            timestamp: self.chain.timestamp(),
            paused: self.market.is_paused(),
            ticks: self.ticks,
            vault_balance: self.vault.underlying_balance(&self.token),
            vault_reserved: self.vault.total_reserved(),
            total_share_supply: self.vault.total_share_supply(),
            position_tokens: self.vault.total_supply(),
            latest_oracle_round: self.oracle.latest_round_data().ok(),
            timeframes,
        }
    }

    pub fn recent_rounds(&self, timeframe_id: TimeframeId, limit: usize) -> Vec<Round> {
        self.market
            .recent_rounds(timeframe_id, limit)
            .into_iter()
            .cloned()
            .collect()
    }
}
