//! Underlying asset.
//!
//! The market and the vault only see the `UnderlyingToken` trait. The
//! in-memory `MemoryToken` backs the local node and the tests.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::math;
use crate::types::{Address, Amount, MarketError, MarketResult};

/// Fungible token transfer contract shared by the market and the vault.
///
/// Implementations must either apply a transfer completely or reject it
/// without touching balances.
pub trait UnderlyingToken {
    fn balance_of(&self, owner: Address) -> Amount;

    fn allowance(&self, owner: Address, spender: Address) -> Amount;

    fn approve(&mut self, owner: Address, spender: Address, amount: Amount) -> MarketResult<()>;

    fn transfer(&mut self, from: Address, to: Address, amount: Amount) -> MarketResult<()>;

    /// Move `amount` from `from` to `to` on behalf of `spender`, spending its allowance.
    fn transfer_from(
        &mut self,
        spender: Address,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> MarketResult<()>;

    /// Pre-flight check for `transfer`, so callers can validate before mutating.
    fn ensure_transfer(&self, from: Address, to: Address, amount: Amount) -> MarketResult<()> {
        if to.is_zero() {
            return Err(MarketError::ZeroAddress);
        }
        let available = self.balance_of(from);
        if available < amount {
            return Err(MarketError::InsufficientBalance { needed: amount, available });
        }
        Ok(())
    }

    /// Pre-flight check for `transfer_from`.
    fn ensure_transfer_from(
        &self,
        spender: Address,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> MarketResult<()> {
        self.ensure_transfer(from, to, amount)?;
        let allowed = self.allowance(from, spender);
        if allowed < amount {
            return Err(MarketError::InsufficientAllowance { needed: amount, allowed });
        }
        Ok(())
    }
}

/// Ledger-backed ERC-20 style token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryToken {
    pub symbol: String,
    pub decimals: u32,
    balances: BTreeMap<Address, Amount>,
    allowances: BTreeMap<Address, BTreeMap<Address, Amount>>,
    total_supply: Amount,
}

impl MemoryToken {
    pub fn new(symbol: impl Into<String>, decimals: u32) -> Self {
        Self {
            symbol: symbol.into(),
            decimals,
            balances: BTreeMap::new(),
            allowances: BTreeMap::new(),
            total_supply: 0,
        }
    }

    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    /// Faucet. Creates `amount` new units for `to`.
    pub fn mint(&mut self, to: Address, amount: Amount) -> MarketResult<()> {
        if to.is_zero() {
            return Err(MarketError::ZeroAddress);
        }
        let supply = math::add(self.total_supply, amount)?;
        let balance = math::add(self.balance_of(to), amount)?;
        self.total_supply = supply;
        self.balances.insert(to, balance);
        debug!(to = %to, amount, symbol = %self.symbol, "Minted");
        Ok(())
    }

    fn move_balance(&mut self, from: Address, to: Address, amount: Amount) -> MarketResult<()> {
        if from == to {
            return Ok(());
        }
        let from_balance = math::sub(self.balance_of(from), amount)?;
        let to_balance = math::add(self.balance_of(to), amount)?;
        self.balances.insert(from, from_balance);
        self.balances.insert(to, to_balance);
        Ok(())
    }
}

impl UnderlyingToken for MemoryToken {
    fn balance_of(&self, owner: Address) -> Amount {
        self.balances.get(&owner).copied().unwrap_or(0)
    }

    fn allowance(&self, owner: Address, spender: Address) -> Amount {
        self.allowances
            .get(&owner)
            .and_then(|m| m.get(&spender))
            .copied()
            .unwrap_or(0)
    }

    fn approve(&mut self, owner: Address, spender: Address, amount: Amount) -> MarketResult<()> {
        if spender.is_zero() {
            return Err(MarketError::ZeroAddress);
        }
        self.allowances.entry(owner).or_default().insert(spender, amount);
        Ok(())
    }

    fn transfer(&mut self, from: Address, to: Address, amount: Amount) -> MarketResult<()> {
        self.ensure_transfer(from, to, amount)?;
        self.move_balance(from, to, amount)
    }

    fn transfer_from(
        &mut self,
        spender: Address,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> MarketResult<()> {
        self.ensure_transfer_from(spender, from, to, amount)?;
        let remaining = self.allowance(from, spender) - amount;
        self.move_balance(from, to, amount)?;
        self.allowances.entry(from).or_default().insert(spender, remaining);
        Ok(())
    }
}
