//! Share-based liquidity vault.
//!
//! Liquidity providers hold position tokens carrying share balances. A
//! share is worth `(underlying_balance - reserved) / total_share_supply`,
//! read from the token contract at call time. Stakes arrive as plain token
//! transfers and whitelisted markets earmark what they owe bettors as a
//! per-market reservation; `pay_out` draws only from that reservation. When
//! a round settles the market releases whatever its bettors did not win,
//! which raises the share value for every holder.
//!
//! Each operation validates fully, updates share bookkeeping, and only then
//! moves underlying tokens.

pub mod positions;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

use crate::math;
use crate::token::UnderlyingToken;
use crate::types::{Address, Amount, MarketError, MarketResult, TokenId};
use positions::PositionRegistry;

/// Deposits below this many base units are rejected.
pub const DEFAULT_DUST_FLOOR: Amount = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserShares {
    pub shares: Amount,
    pub underlying_amount: Amount,
}

/// Result of a single-token withdrawal. The input token is always burned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Withdrawal {
    /// Newly issued id. Holds `remaining` shares, or is never live when the
    /// token was emptied.
    pub token_id: TokenId,
    pub shares_burned: Amount,
    pub amount_out: Amount,
    pub remaining: Amount,
}

/// Result of a multi-token withdrawal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkWithdrawal {
    pub burned_tokens: Vec<TokenId>,
    pub shares_burned: Amount,
    pub amount_out: Amount,
    /// New token holding what was left of the last token drained.
    pub remainder: Option<(TokenId, Amount)>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantViolation {
    #[error("share supply {supply} != sum of token balances {sum}")]
    ShareSupplyMismatch { supply: Amount, sum: Amount },

    #[error("token {0} is live with a zero share balance")]
    EmptyToken(TokenId),

    #[error("owner index out of sync with token table")]
    OwnerIndex,

    #[error("live token {id} at or above next id {next}")]
    TokenIdOutOfRange { id: TokenId, next: TokenId },

    #[error("reserved {reserved} exceeds underlying balance {balance}")]
    Undercollateralized { reserved: Amount, balance: Amount },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vault {
    address: Address,
    admin: Address,
    pub name: String,
    pub symbol: String,
    dust_floor: Amount,
    positions: PositionRegistry,
    total_share_supply: Amount,
    whitelisted_markets: BTreeSet<Address>,
    /// Underlying owed to each market's bettors. Not LP equity.
    #[serde(default)]
    reserves: BTreeMap<Address, Amount>,
}

impl Vault {
    pub fn new(address: Address, admin: Address, name: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            address,
            admin,
            name: name.into(),
            symbol: symbol.into(),
            dust_floor: DEFAULT_DUST_FLOOR,
            positions: PositionRegistry::new(),
            total_share_supply: 0,
            whitelisted_markets: BTreeSet::new(),
            reserves: BTreeMap::new(),
        }
    }

    pub fn with_dust_floor(mut self, dust_floor: Amount) -> Self {
        self.dust_floor = dust_floor;
        self
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn admin(&self) -> Address {
        self.admin
    }

    pub fn dust_floor(&self) -> Amount {
        self.dust_floor
    }

    // -----------------------------------------------------------------------
    // Administration
    // -----------------------------------------------------------------------

    pub fn whitelist_market(&mut self, caller: Address, market: Address, whitelisted: bool) -> MarketResult<()> {
        if caller != self.admin {
            return Err(MarketError::Unauthorized("vault admin"));
        }
        if market.is_zero() {
            return Err(MarketError::ZeroAddress);
        }
        if whitelisted {
            self.whitelisted_markets.insert(market);
        } else {
            self.whitelisted_markets.remove(&market);
        }
        info!(market = %market, whitelisted, "Vault market whitelist changed");
        Ok(())
    }

    pub fn is_whitelisted(&self, market: Address) -> bool {
        self.whitelisted_markets.contains(&market)
    }

    // -----------------------------------------------------------------------
    // Deposits
    // -----------------------------------------------------------------------

    /// Deposit `amount` from `caller` and mint a new position token for
    /// `recipient`. Returns `(token_id, shares)`.
    pub fn add_new_liquidity_position<T: UnderlyingToken>(
        &mut self,
        token: &mut T,
        caller: Address,
        recipient: Address,
        amount: Amount,
    ) -> MarketResult<(TokenId, Amount)> {
        if recipient.is_zero() {
            return Err(MarketError::ZeroAddress);
        }
        let shares = self.preview_deposit(token, amount)?;
        token.ensure_transfer_from(self.address, caller, self.address, amount)?;

        let supply = math::add(self.total_share_supply, shares)?;
        let token_id = self.positions.mint(recipient, shares);
        self.total_share_supply = supply;
        token.transfer_from(self.address, caller, self.address, amount)?;

        info!(recipient = %recipient, token_id, amount, shares, "New liquidity added");
        Ok((token_id, shares))
    }

    /// Deposit `amount` from `caller` into an existing token of `owner`.
    /// Returns the shares minted; the token keeps its id.
    pub fn add_liquidity_position<T: UnderlyingToken>(
        &mut self,
        token: &mut T,
        caller: Address,
        owner: Address,
        token_id: TokenId,
        amount: Amount,
    ) -> MarketResult<Amount> {
        let current = self.positions.get(token_id).ok_or(MarketError::TokenNotFound(token_id))?;
        if current.owner != owner {
            return Err(MarketError::NotOwner(token_id));
        }
        if !self.positions.is_approved_or_owner(caller, token_id) {
            return Err(MarketError::NotOwnerOrApproved(token_id));
        }
        let shares = self.preview_deposit(token, amount)?;
        token.ensure_transfer_from(self.address, caller, self.address, amount)?;

        let balance = math::add(current.share_balance, shares)?;
        let supply = math::add(self.total_share_supply, shares)?;
        self.positions.set_share_balance(token_id, balance);
        self.total_share_supply = supply;
        token.transfer_from(self.address, caller, self.address, amount)?;

        info!(owner = %owner, token_id, amount, shares, "Liquidity added to position");
        Ok(shares)
    }

    /// Shares a deposit of `amount` would mint right now.
    pub fn preview_deposit<T: UnderlyingToken>(&self, token: &T, amount: Amount) -> MarketResult<Amount> {
        if amount == 0 {
            return Err(MarketError::ZeroAmount);
        }
        if amount < self.dust_floor {
            return Err(MarketError::InsufficientAmount { amount, floor: self.dust_floor });
        }
        if self.total_share_supply == 0 {
            return Ok(amount);
        }
        let equity = self.equity(token);
        if equity == 0 {
            return Err(MarketError::EmptyPool);
        }
        let shares = math::mul_div(amount, self.total_share_supply, equity)?;
        if shares == 0 {
            return Err(MarketError::InsufficientAmount { amount, floor: self.dust_floor });
        }
        Ok(shares)
    }

    // -----------------------------------------------------------------------
    // Withdrawals
    // -----------------------------------------------------------------------

    /// Underlying value of `shares` at the current unreserved balance.
    pub fn preview_redeem<T: UnderlyingToken>(&self, token: &T, shares: Amount) -> MarketResult<Amount> {
        if self.total_share_supply == 0 {
            return Ok(0);
        }
        math::mul_div(shares, self.equity(token), self.total_share_supply)
    }

    /// Burns `token_id`. Any shares left over move to a freshly minted token
    /// with the same owner.

    pub fn remove_liquidity_position<T: UnderlyingToken>(
        &mut self,
        token: &mut T,
        caller: Address,
        owner: Address,
        token_id: TokenId,
        share_amount: Amount,
    ) -> MarketResult<Withdrawal> {
        if share_amount == 0 {
            return Err(MarketError::ZeroAmount);
        }
        let current = self.positions.get(token_id).ok_or(MarketError::TokenNotFound(token_id))?;
        if current.owner != owner {
            return Err(MarketError::NotOwner(token_id));
        }
        if !self.positions.is_approved_or_owner(caller, token_id) {
            return Err(MarketError::NotOwnerOrApproved(token_id));
        }
        if share_amount > current.share_balance {
            return Err(MarketError::InsufficientShares {
                requested: share_amount,
                available: current.share_balance,
            });
        }
        let remaining = current.share_balance - share_amount;
        let amount_out = self.preview_redeem(token, share_amount)?;
        token.ensure_transfer(self.address, owner, amount_out)?;

        self.total_share_supply = math::sub(self.total_share_supply, share_amount)?;
        self.positions.burn(token_id);
        let handle = if remaining == 0 {
            self.positions.reserve_id()
        } else {
            self.positions.mint(owner, remaining)
        };
        token.transfer(self.address, owner, amount_out)?;

        info!(
            owner = %owner,
            token_id,
            new_token_id = handle,
            share_amount,
            amount_out,
            remaining,
            "Liquidity removed from position"
        );
        Ok(Withdrawal {
            token_id: handle,
            shares_burned: share_amount,
            amount_out,
            remaining,
        })
    }

    /// Withdraw `share_amount` across all of `owner`'s tokens, draining them
    /// in ascending id order.
    pub fn remove_liquidity<T: UnderlyingToken>(
        &mut self,
        token: &mut T,
        caller: Address,
        owner: Address,
        share_amount: Amount,
    ) -> MarketResult<BulkWithdrawal> {
        if share_amount == 0 {
            return Err(MarketError::ZeroAmount);
        }
        if caller != owner && !self.positions.is_approved_for_all(owner, caller) {
            return Err(MarketError::NotApproved(owner));
        }
        let owned = self.positions.shares_of(owner);
        if share_amount > owned {
            return Err(MarketError::InsufficientShareAmount { requested: share_amount, owned });
        }
        let amount_out = self.preview_redeem(token, share_amount)?;
        token.ensure_transfer(self.address, owner, amount_out)?;

        // Plan the drain before touching anything.
        let mut outstanding = share_amount;
        let mut drained = Vec::new();
        let mut leftover = 0;
        for id in self.positions.tokens_of_owner(owner) {
            if outstanding == 0 {
                break;
            }
            let balance = self.positions.share_balance(id);
            let take = balance.min(outstanding);
            outstanding -= take;
            leftover = balance - take;
            drained.push(id);
        }

        self.total_share_supply = math::sub(self.total_share_supply, share_amount)?;
        for id in &drained {
            self.positions.burn(*id);
        }
        let remainder = (leftover > 0).then(|| (self.positions.mint(owner, leftover), leftover));
        token.transfer(self.address, owner, amount_out)?;

        info!(
            owner = %owner,
            tokens = drained.len(),
            share_amount,
            amount_out,
            remainder = ?remainder,
            "Liquidity removed"
        );
        Ok(BulkWithdrawal {
            burned_tokens: drained,
            shares_burned: share_amount,
            amount_out,
            remainder,
        })
    }

    // -----------------------------------------------------------------------
    // Token management
    // -----------------------------------------------------------------------

    /// Combine several tokens of `owner` into one freshly minted token.
    pub fn merge_positions(&mut self, caller: Address, owner: Address, token_ids: &[TokenId]) -> MarketResult<TokenId> {
        if token_ids.is_empty() {
            return Err(MarketError::InvalidArrayLength);
        }
        let unique: BTreeSet<TokenId> = token_ids.iter().copied().collect();
        if unique.len() != token_ids.len() {
            return Err(MarketError::InvalidArrayLength);
        }
        let mut total: Amount = 0;
        for &id in token_ids {
            if !self.positions.is_approved_or_owner(caller, id) {
                return Err(MarketError::NotOwnerOrApproved(id));
            }
            if self.positions.owner_of(id) != Some(owner) {
                return Err(MarketError::NotOwner(id));
            }
            total = math::add(total, self.positions.share_balance(id))?;
        }

        for &id in token_ids {
            self.positions.burn(id);
        }
        let merged = self.positions.mint(owner, total);
        info!(owner = %owner, from = ?token_ids, token_id = merged, shares = total, "Positions merged");
        Ok(merged)
    }

    /// Carve `share_amount` out of a token into a new token with the same owner.
    pub fn split_position(&mut self, caller: Address, token_id: TokenId, share_amount: Amount) -> MarketResult<TokenId> {
        if share_amount == 0 {
            return Err(MarketError::ZeroAmount);
        }
        let current = self.positions.get(token_id).ok_or(MarketError::TokenNotFound(token_id))?;
        if !self.positions.is_approved_or_owner(caller, token_id) {
            return Err(MarketError::NotOwnerOrApproved(token_id));
        }
        if share_amount >= current.share_balance {
            return Err(MarketError::InsufficientShares {
                requested: share_amount,
                available: current.share_balance,
            });
        }
        let owner = current.owner;
        let remaining = current.share_balance - share_amount;

        self.positions.set_share_balance(token_id, remaining);
        let new_id = self.positions.mint(owner, share_amount);
        debug!(owner = %owner, token_id, new_token_id = new_id, share_amount, "Position split");
        Ok(new_id)
    }

    pub fn transfer_position(&mut self, caller: Address, from: Address, to: Address, token_id: TokenId) -> MarketResult<()> {
        if to.is_zero() {
            return Err(MarketError::ZeroAddress);
        }
        let owner = self.positions.owner_of(token_id).ok_or(MarketError::TokenNotFound(token_id))?;
        if owner != from {
            return Err(MarketError::NotOwner(token_id));
        }
        if !self.positions.is_approved_or_owner(caller, token_id) {
            return Err(MarketError::NotOwnerOrApproved(token_id));
        }
        self.positions.transfer(token_id, to);
        debug!(from = %from, to = %to, token_id, "Position transferred");
        Ok(())
    }

    /// Approve `spender` for one token; `None` clears it.
    pub fn approve(&mut self, caller: Address, spender: Option<Address>, token_id: TokenId) -> MarketResult<()> {
        let owner = self.positions.owner_of(token_id).ok_or(MarketError::TokenNotFound(token_id))?;
        if caller != owner && !self.positions.is_approved_for_all(owner, caller) {
            return Err(MarketError::NotOwnerOrApproved(token_id));
        }
        self.positions.approve(token_id, spender);
        Ok(())
    }

    pub fn set_approval_for_all(&mut self, owner: Address, operator: Address, approved: bool) -> MarketResult<()> {
        if operator.is_zero() {
            return Err(MarketError::ZeroAddress);
        }
        self.positions.set_approval_for_all(owner, operator, approved);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Market payouts
    // -----------------------------------------------------------------------

    /// Pre-flight for `reserve`. `incoming` is underlying that arrives in
    /// the same call, such as the stake that creates the liability.
    pub fn ensure_reserve<T: UnderlyingToken>(
        &self,
        token: &T,
        market: Address,
        amount: Amount,
        incoming: Amount,
    ) -> MarketResult<()> {
        if !self.is_whitelisted(market) {
            return Err(MarketError::Unauthorized("whitelisted market"));
        }
        let available = self.equity(token).saturating_add(incoming);
        if amount > available {
            return Err(MarketError::InsufficientLiquidity { needed: amount, available });
        }
        Ok(())
    }

    /// Earmark `amount` for `market`'s bettors. Call `ensure_reserve` first.
    pub fn reserve(&mut self, market: Address, amount: Amount) -> MarketResult<()> {
        if !self.is_whitelisted(market) {
            return Err(MarketError::Unauthorized("whitelisted market"));
        }
        if amount == 0 {
            return Ok(());
        }
        let entry = self.reserves.entry(market).or_default();
        *entry = math::add(*entry, amount)?;
        debug!(market = %market, amount, reserved = *entry, "Vault reserved");
        Ok(())
    }

    /// Hand `amount` of `market`'s reservation back to liquidity providers.
    pub fn release(&mut self, market: Address, amount: Amount) -> MarketResult<()> {
        if amount == 0 {
            return Ok(());
        }
        let held = self.reserved_for(market);
        let left = math::sub(held, amount)?;
        if left == 0 {
            self.reserves.remove(&market);
        } else {
            self.reserves.insert(market, left);
        }
        debug!(market = %market, amount, reserved = left, "Vault released");
        Ok(())
    }

    /// Pre-flight for `pay_out` covering `amount` in total.
    pub fn ensure_pay_out<T: UnderlyingToken>(&self, token: &T, market: Address, amount: Amount) -> MarketResult<()> {
        if !self.is_whitelisted(market) {
            return Err(MarketError::Unauthorized("whitelisted market"));
        }
        let available = self.reserved_for(market).min(token.balance_of(self.address));
        if amount > available {
            return Err(MarketError::InsufficientLiquidity { needed: amount, available });
        }
        Ok(())
    }

    /// Pay a bettor out of `market`'s reservation.
    pub fn pay_out<T: UnderlyingToken>(
        &mut self,
        token: &mut T,
        market: Address,
        recipient: Address,
        amount: Amount,
    ) -> MarketResult<()> {
        self.ensure_pay_out(token, market, amount)?;
        if amount == 0 {
            return Ok(());
        }
        self.release(market, amount)?;
        token.transfer(self.address, recipient, amount)?;
        debug!(market = %market, recipient = %recipient, amount, "Vault paid out");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn total_share_supply(&self) -> Amount {
        self.total_share_supply
    }

    /// Live position-token count.
    pub fn total_supply(&self) -> usize {
        self.positions.total_supply()
    }

    pub fn next_token_id(&self) -> TokenId {
        self.positions.next_token_id()
    }

    pub fn owner_of(&self, token_id: TokenId) -> Option<Address> {
        self.positions.owner_of(token_id)
    }

    pub fn share_balance(&self, token_id: TokenId) -> Amount {
        self.positions.share_balance(token_id)
    }

    pub fn tokens_of_owner(&self, owner: Address) -> Vec<TokenId> {
        self.positions.tokens_of_owner(owner)
    }

    pub fn get_approved(&self, token_id: TokenId) -> Option<Address> {
        self.positions.get_approved(token_id)
    }

    pub fn is_approved_for_all(&self, owner: Address, operator: Address) -> bool {
        self.positions.is_approved_for_all(owner, operator)
    }

    pub fn shares_of_user<T: UnderlyingToken>(&self, token: &T, owner: Address) -> MarketResult<UserShares> {
        let shares = self.positions.shares_of(owner);
        Ok(UserShares {
            shares,
            underlying_amount: self.preview_redeem(token, shares)?,
        })
    }

    pub fn underlying_balance<T: UnderlyingToken>(&self, token: &T) -> Amount {
        token.balance_of(self.address)
    }

    pub fn reserved_for(&self, market: Address) -> Amount {
        self.reserves.get(&market).copied().unwrap_or(0)
    }

    pub fn total_reserved(&self) -> Amount {
        self.reserves.values().fold(0, |acc, r| acc.saturating_add(*r))
    }

    /// Underlying that backs shares: the balance minus every reservation.
    pub fn equity<T: UnderlyingToken>(&self, token: &T) -> Amount {
        token.balance_of(self.address).saturating_sub(self.total_reserved())
    }

    /// Reservations must be fully funded by the underlying balance.
    pub fn check_solvency<T: UnderlyingToken>(&self, token: &T) -> Result<(), InvariantViolation> {
        let reserved = self.total_reserved();
        let balance = token.balance_of(self.address);
        if reserved > balance {
            return Err(InvariantViolation::Undercollateralized { reserved, balance });
        }
        Ok(())
    }

    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        let mut sum: Amount = 0;
        let next = self.positions.next_token_id();
        for (&id, token) in self.positions.iter() {
            if token.share_balance == 0 {
                return Err(InvariantViolation::EmptyToken(id));
            }
            if id >= next {
                return Err(InvariantViolation::TokenIdOutOfRange { id, next });
            }
            sum = sum.saturating_add(token.share_balance);
        }
        if sum != self.total_share_supply {
            return Err(InvariantViolation::ShareSupplyMismatch { supply: self.total_share_supply, sum });
        }
        if !self.positions.index_consistent() {
            return Err(InvariantViolation::OwnerIndex);
        }
        Ok(())
    }
}
