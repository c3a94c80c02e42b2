//! Vault share accounting through the engine.

use binary_options::token::UnderlyingToken;
use binary_options::types::{Direction, MarketError};

use crate::harness::*;

#[test]
fn test_second_provider_gets_half_after_pool_doubles() {
    let mut e = running(1_000);
    let (first, shares) = e.add_new_liquidity_position(carol(), carol(), ONE).unwrap();
    assert_eq!(first, 0);
    assert_eq!(shares, ONE);

    // Bob's losing bet stays in the pool.
    e.open_position(bob(), TF, Direction::Bear, ONE).unwrap();
    execute_at(&mut e, 1_000);
    execute_at(&mut e, 1_500);
    assert!(!e.is_claimable(TF, 2, bob()));
    assert_eq!(e.vault.underlying_balance(&e.token), 2 * ONE);

    let (second, shares) = e.add_new_liquidity_position(alice(), alice(), ONE).unwrap();
    assert_eq!(second, 1);
    assert_eq!(shares, ONE / 2);
    assert_eq!(e.vault.total_share_supply(), ONE + ONE / 2);
    assert_eq!(e.shares_of_user(carol()).unwrap().underlying_amount, 2 * ONE);
    assert_eq!(e.shares_of_user(alice()).unwrap().underlying_amount, ONE);
}

#[test]
fn test_deposit_withdraw_round_trip() {
    let mut e = world();
    e.add_new_liquidity_position(carol(), carol(), 3 * ONE).unwrap();
    // Push the share price off 1:1.
    e.token.transfer(bob(), e.vault.address(), 7).unwrap();

    let amount = 1_234_567_890_123_456_789;
    let start = e.token.balance_of(alice());
    let (id, shares) = e.add_new_liquidity_position(alice(), alice(), amount).unwrap();
    let out = e.remove_liquidity_position(alice(), alice(), id, shares).unwrap();

    assert_eq!(out.remaining, 0);
    assert!(amount - out.amount_out <= 1, "lost {}", amount - out.amount_out);
    assert!(start - e.token.balance_of(alice()) <= 1);
    assert!(e.vault.owner_of(id).is_none());
    e.vault.check_invariants().unwrap();
}

#[test]
fn test_withdrawals_stay_open_while_paused() {
    let mut e = running(1_000);
    let (id, shares) = e.add_new_liquidity_position(carol(), carol(), ONE).unwrap();
    e.set_pause(owner(), true).unwrap();
    let out = e.remove_liquidity_position(carol(), carol(), id, shares / 2).unwrap();
    assert_eq!(out.amount_out, ONE / 2);
    assert_eq!(out.remaining, shares - shares / 2);
    // The remainder moves to a fresh token; the old id is gone.
    assert_ne!(out.token_id, id);
    assert!(e.vault.owner_of(id).is_none());
    assert_eq!(e.vault.owner_of(out.token_id), Some(carol()));
    assert_eq!(e.vault.share_balance(out.token_id), out.remaining);
}

#[test]
fn test_lp_exit_mid_round_leaves_winner_paid() {
    let mut e = running(1_000);
    e.add_new_liquidity_position(carol(), carol(), ONE).unwrap();
    e.open_position(alice(), TF, Direction::Bull, ONE).unwrap();
    e.open_position(bob(), TF, Direction::Bear, ONE).unwrap();
    assert_eq!(e.vault.underlying_balance(&e.token), 3 * ONE);

    // Carol can take out only her own deposit, not the open stakes.
    assert_eq!(e.shares_of_user(carol()).unwrap().underlying_amount, ONE);
    let out = e.remove_liquidity(carol(), carol(), ONE).unwrap();
    assert_eq!(out.amount_out, ONE);
    assert_eq!(e.vault.underlying_balance(&e.token), 2 * ONE);
    e.vault.check_solvency(&e.token).unwrap();

    execute_at(&mut e, 1_000);
    execute_at(&mut e, 1_100);
    let receipt = e.claim(alice(), TF, 2).unwrap();
    assert_eq!(receipt.settlement.gross, 2 * ONE);
    assert_eq!(e.vault.underlying_balance(&e.token), 0);
    assert_eq!(e.vault.total_reserved(), 0);
}

#[test]
fn test_deposit_mid_round_priced_without_open_stakes() {
    let mut e = running(1_000);
    e.add_new_liquidity_position(carol(), carol(), ONE).unwrap();
    e.open_position(bob(), TF, Direction::Bear, ONE).unwrap();

    // Bob's stake is still owed to bettors, so Alice buys in at 1:1.
    let (_, shares) = e.add_new_liquidity_position(alice(), alice(), ONE).unwrap();
    assert_eq!(shares, ONE);

    // Bob loses; the stake is released to both providers.
    execute_at(&mut e, 1_000);
    execute_at(&mut e, 1_100);
    assert_eq!(e.vault.total_reserved(), 0);
    assert_eq!(e.shares_of_user(carol()).unwrap().underlying_amount, ONE + ONE / 2);
    assert_eq!(e.shares_of_user(alice()).unwrap().underlying_amount, ONE + ONE / 2);
}

#[test]
fn test_bulk_withdrawal_drains_ascending_and_keeps_remainder() {
    let mut e = world();
    let (a, _) = e.add_new_liquidity_position(carol(), carol(), ONE).unwrap();
    let (b, _) = e.add_new_liquidity_position(carol(), carol(), 2 * ONE).unwrap();
    let (c, _) = e.add_new_liquidity_position(carol(), carol(), 3 * ONE).unwrap();
    assert_eq!(e.vault.tokens_of_owner(carol()), vec![a, b, c]);

    let out = e.remove_liquidity(carol(), carol(), 2 * ONE).unwrap();
    assert_eq!(out.burned_tokens, vec![a, b]);
    assert_eq!(out.amount_out, 2 * ONE);
    let (remainder, shares) = out.remainder.unwrap();
    assert_eq!(shares, ONE);
    assert_eq!(e.vault.tokens_of_owner(carol()), vec![c, remainder]);
    assert_eq!(e.shares_of_user(carol()).unwrap().shares, 4 * ONE);

    let exact = e.remove_liquidity(carol(), carol(), 3 * ONE).unwrap();
    assert_eq!(exact.burned_tokens, vec![c]);
    assert!(exact.remainder.is_none());
    e.vault.check_invariants().unwrap();
}

#[test]
fn test_bulk_withdrawal_rejects_excess_and_strangers() {
    let mut e = world();
    e.add_new_liquidity_position(carol(), carol(), ONE).unwrap();
    let before = e.clone();
    assert!(matches!(
        e.remove_liquidity(carol(), carol(), 2 * ONE),
        Err(MarketError::InsufficientShareAmount { .. })
    ));
    assert_eq!(
        e.remove_liquidity(bob(), carol(), ONE).unwrap_err(),
        MarketError::NotApproved(carol())
    );
    assert_eq!(e.vault, before.vault);
    assert_eq!(e.token, before.token);

    e.vault.set_approval_for_all(carol(), bob(), true).unwrap();
    let out = e.remove_liquidity(bob(), carol(), ONE).unwrap();
    // Proceeds go to the owner, not the operator.
    assert_eq!(e.token.balance_of(carol()), 100 * ONE);
    assert_eq!(out.amount_out, ONE);
}

#[test]
fn test_merge_split_transfer() {
    let mut e = world();
    let (a, _) = e.add_new_liquidity_position(carol(), carol(), ONE).unwrap();
    let (b, _) = e.add_new_liquidity_position(carol(), carol(), ONE).unwrap();
    let merged = e.merge_positions(carol(), carol(), &[a, b]).unwrap();
    assert_eq!(e.vault.share_balance(merged), 2 * ONE);
    assert_eq!(e.vault.tokens_of_owner(carol()), vec![merged]);

    let piece = e.split_position(carol(), merged, ONE / 4).unwrap();
    assert_eq!(e.vault.share_balance(merged), 2 * ONE - ONE / 4);
    assert_eq!(e.vault.share_balance(piece), ONE / 4);

    assert_eq!(
        e.transfer_position(bob(), carol(), bob(), piece).unwrap_err(),
        MarketError::NotOwnerOrApproved(piece)
    );
    e.transfer_position(carol(), carol(), alice(), piece).unwrap();
    assert_eq!(e.vault.owner_of(piece), Some(alice()));
    assert_eq!(e.shares_of_user(alice()).unwrap().shares, ONE / 4);

    // Alice can now top up and withdraw her piece.
    e.add_liquidity_position(alice(), alice(), piece, ONE).unwrap();
    assert_eq!(e.vault.share_balance(piece), ONE + ONE / 4);
    e.vault.check_invariants().unwrap();
}

#[test]
fn test_deposit_guards() {
    let mut e = world();
    assert_eq!(
        e.add_new_liquidity_position(carol(), carol(), 0).unwrap_err(),
        MarketError::ZeroAmount
    );
    assert!(matches!(
        e.add_new_liquidity_position(carol(), carol(), 999),
        Err(MarketError::InsufficientAmount { .. })
    ));
    assert_eq!(
        e.add_liquidity_position(carol(), carol(), 42, ONE).unwrap_err(),
        MarketError::TokenNotFound(42)
    );
    let (id, _) = e.add_new_liquidity_position(carol(), carol(), ONE).unwrap();
    assert_eq!(
        e.add_liquidity_position(alice(), alice(), id, ONE).unwrap_err(),
        MarketError::NotOwner(id)
    );
    assert_eq!(
        e.remove_liquidity_position(carol(), carol(), id, 2 * ONE).unwrap_err(),
        MarketError::InsufficientShares { requested: 2 * ONE, available: ONE }
    );
}
