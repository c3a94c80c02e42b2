//! Position-token registry.
//!
//! Tokens are keyed by monotonically assigned ids starting at 0. An explicit
//! owner index keeps `tokens_of_owner` in ascending id order, which the
//! multi-token withdrawal relies on.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::types::{Address, Amount, TokenId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionToken {
    pub owner: Address,
    pub share_balance: Amount,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionRegistry {
    tokens: BTreeMap<TokenId, PositionToken>,
    owned: BTreeMap<Address, BTreeSet<TokenId>>,
    token_approvals: BTreeMap<TokenId, Address>,
    operator_approvals: BTreeMap<Address, BTreeSet<Address>>,
    next_token_id: TokenId,
}

impl PositionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_token_id(&self) -> TokenId {
        self.next_token_id
    }

    /// Consume an id without creating a live token.
    pub fn reserve_id(&mut self) -> TokenId {
        let id = self.next_token_id;
        self.next_token_id += 1;
        id
    }

    pub fn mint(&mut self, owner: Address, share_balance: Amount) -> TokenId {
        let id = self.reserve_id();
        self.tokens.insert(id, PositionToken { owner, share_balance });
        self.owned.entry(owner).or_default().insert(id);
        id
    }

    /// Remove a token and its approval. Returns what it held.
    pub fn burn(&mut self, id: TokenId) -> Option<PositionToken> {
        let token = self.tokens.remove(&id)?;
        self.unindex(token.owner, id);
        self.token_approvals.remove(&id);
        Some(token)
    }

    pub fn set_share_balance(&mut self, id: TokenId, share_balance: Amount) {
        if let Some(token) = self.tokens.get_mut(&id) {
            token.share_balance = share_balance;
        }
    }

    pub fn get(&self, id: TokenId) -> Option<&PositionToken> {
        self.tokens.get(&id)
    }

    pub fn exists(&self, id: TokenId) -> bool {
        self.tokens.contains_key(&id)
    }

    pub fn owner_of(&self, id: TokenId) -> Option<Address> {
        self.tokens.get(&id).map(|t| t.owner)
    }

    /// Zero for burned or never-minted ids.
    pub fn share_balance(&self, id: TokenId) -> Amount {
        self.tokens.get(&id).map_or(0, |t| t.share_balance)
    }

    pub fn tokens_of_owner(&self, owner: Address) -> Vec<TokenId> {
        self.owned
            .get(&owner)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Number of live tokens held by `owner`.
    pub fn balance_of(&self, owner: Address) -> usize {
        self.owned.get(&owner).map_or(0, BTreeSet::len)
    }

    /// Number of live tokens.
    pub fn total_supply(&self) -> usize {
        self.tokens.len()
    }

    pub fn shares_of(&self, owner: Address) -> Amount {
        self.owned
            .get(&owner)
            .into_iter()
            .flatten()
            .map(|id| self.share_balance(*id))
            .sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TokenId, &PositionToken)> {
        self.tokens.iter()
    }

    /// Move a token to a new owner, clearing its single-token approval.
    pub fn transfer(&mut self, id: TokenId, to: Address) {
        let Some(token) = self.tokens.get_mut(&id) else {
            return;
        };
        let from = std::mem::replace(&mut token.owner, to);
        self.unindex(from, id);
        self.owned.entry(to).or_default().insert(id);
        self.token_approvals.remove(&id);
    }

    pub fn approve(&mut self, id: TokenId, spender: Option<Address>) {
        match spender {
            Some(spender) => {
                self.token_approvals.insert(id, spender);
            }
            None => {
                self.token_approvals.remove(&id);
            }
        }
    }

    pub fn get_approved(&self, id: TokenId) -> Option<Address> {
        self.token_approvals.get(&id).copied()
    }

    pub fn set_approval_for_all(&mut self, owner: Address, operator: Address, approved: bool) {
        let operators = self.operator_approvals.entry(owner).or_default();
        if approved {
            operators.insert(operator);
        } else {
            operators.remove(&operator);
            if operators.is_empty() {
                self.operator_approvals.remove(&owner);
            }
        }
    }

    pub fn is_approved_for_all(&self, owner: Address, operator: Address) -> bool {
        self.operator_approvals
            .get(&owner)
            .is_some_and(|ops| ops.contains(&operator))
    }

    /// Owner, per-token approved account, or operator for the owner.
    pub fn is_approved_or_owner(&self, spender: Address, id: TokenId) -> bool {
        let Some(owner) = self.owner_of(id) else {
            return false;
        };
        spender == owner
            || self.get_approved(id) == Some(spender)
            || self.is_approved_for_all(owner, spender)
    }

    /// True when the owner index mirrors the token table exactly.
    pub fn index_consistent(&self) -> bool {
        let indexed: usize = self.owned.values().map(BTreeSet::len).sum();
        indexed == self.tokens.len()
            && self.owned.values().all(|ids| !ids.is_empty())
            && self.owned.iter().all(|(owner, ids)| {
                ids.iter().all(|id| self.owner_of(*id) == Some(*owner))
            })
    }

    fn unindex(&mut self, owner: Address, id: TokenId) {
        if let Some(ids) = self.owned.get_mut(&owner) {
            ids.remove(&id);
            if ids.is_empty() {
                self.owned.remove(&owner);
            }
        }
    }
}
