//! Settlement and claims.

use binary_options::market::settlement::{PayoutModel, TiePolicy};
use binary_options::token::UnderlyingToken;
use binary_options::types::{Direction, ErrorKind, MarketError};

use crate::harness::*;

/// Alice bull 1.0 and Bob bear 1.0 in epoch 2, closed at `close`.
fn contested(close: u128) -> binary_options::engine::Engine {
    let mut e = running(1_000);
    e.open_position(alice(), TF, Direction::Bull, ONE).unwrap();
    e.open_position(bob(), TF, Direction::Bear, ONE).unwrap();
    execute_at(&mut e, 1_000);
    execute_at(&mut e, close);
    e
}

#[test]
fn test_winner_claims_once() {
    let mut e = contested(1_100);
    assert!(e.is_claimable(TF, 2, alice()));
    assert!(!e.is_claimable(TF, 2, bob()));

    let receipt = e.claim(alice(), TF, 2).unwrap();
    // 1.0 * 2.0 / 1.0 * (1 - 0.1)
    assert_eq!(receipt.settlement.gross, 2 * ONE);
    assert_eq!(receipt.settlement.net, ONE * 18 / 10);
    assert_eq!(e.token.balance_of(alice()), 100 * ONE - ONE + ONE * 18 / 10);
    assert_eq!(e.token.balance_of(treasury()), ONE / 5);
    assert_eq!(e.vault.underlying_balance(&e.token), 0);

    assert!(!e.is_claimable(TF, 2, alice()));
    let before = e.clone();
    let err = e.claim(alice(), TF, 2).unwrap_err();
    assert_eq!(err, MarketError::AlreadyClaimed(2));
    assert_eq!(err.kind(), ErrorKind::State);
    assert_eq!(e.token, before.token);
    assert_eq!(e.market, before.market);
}

#[test]
fn test_loser_cannot_claim() {
    let mut e = contested(900);
    assert!(e.is_claimable(TF, 2, bob()));
    assert_eq!(e.claim(alice(), TF, 2).unwrap_err(), MarketError::NotClaimable(2));
    assert_eq!(e.claim(carol(), TF, 2).unwrap_err(), MarketError::NotClaimable(2));
}

#[test]
fn test_claim_ordering_errors() {
    let mut e = running(1_000);
    e.open_position(alice(), TF, Direction::Bull, ONE).unwrap();
    assert_eq!(e.claim(alice(), TF, 3).unwrap_err(), MarketError::RoundNotStarted(3));
    assert_eq!(e.claim(alice(), TF, 2).unwrap_err(), MarketError::RoundNotEnded(2));
    assert!(!e.is_claimable(TF, 2, alice()));

    execute_at(&mut e, 1_000);
    // Locked, not closed.
    assert_eq!(e.claim(alice(), TF, 2).unwrap_err(), MarketError::RoundNotEnded(2));
}

#[test]
fn test_draw_refunds_without_fee() {
    let mut e = contested(1_000);
    let a = e.claim(alice(), TF, 2).unwrap();
    let b = e.claim(bob(), TF, 2).unwrap();
    assert!(a.settlement.refund && b.settlement.refund);
    assert_eq!(e.token.balance_of(alice()), 100 * ONE);
    assert_eq!(e.token.balance_of(bob()), 100 * ONE);
    assert_eq!(e.token.balance_of(treasury()), 0);
}

#[test]
fn test_house_wins_on_draw() {
    let mut cfg = config();
    cfg.market.tie_policy = TiePolicy::HouseWins;
    let mut e = world_from(&cfg);
    e.genesis_start_round(operator(), TF).unwrap();
    e.mine(INTERVAL);
    e.genesis_lock_round(operator(), TF, 1_000).unwrap();
    e.open_position(alice(), TF, Direction::Bull, ONE).unwrap();
    execute_at(&mut e, 1_000);
    execute_at(&mut e, 1_000);

    assert!(!e.is_claimable(TF, 2, alice()));
    assert_eq!(e.claim(alice(), TF, 2).unwrap_err(), MarketError::NotClaimable(2));
    assert_eq!(e.vault.underlying_balance(&e.token), ONE);
}

#[test]
fn test_fixed_odds_paid_from_liquidity() {
    let mut cfg = config();
    cfg.market.payout_model = PayoutModel::FixedOdds;
    let mut e = world_from(&cfg);
    e.add_new_liquidity_position(carol(), carol(), 10 * ONE).unwrap();
    e.genesis_start_round(operator(), TF).unwrap();
    e.mine(INTERVAL);
    e.genesis_lock_round(operator(), TF, 1_000).unwrap();
    e.open_position(alice(), TF, Direction::Bull, ONE).unwrap();
    execute_at(&mut e, 1_000);
    execute_at(&mut e, 1_001);

    let receipt = e.claim(alice(), TF, 2).unwrap();
    assert_eq!(receipt.settlement.gross, 2 * ONE);
    // Vault: 10 + 1 stake - 2 payout.
    assert_eq!(e.vault.underlying_balance(&e.token), 9 * ONE);
    assert_eq!(e.shares_of_user(carol()).unwrap().underlying_amount, 9 * ONE);
}

#[test]
fn test_fixed_odds_bet_rejected_without_backing() {
    let mut cfg = config();
    cfg.market.payout_model = PayoutModel::FixedOdds;
    let mut e = world_from(&cfg);
    e.genesis_start_round(operator(), TF).unwrap();
    e.mine(INTERVAL);
    e.genesis_lock_round(operator(), TF, 1_000).unwrap();

    // No liquidity: the stake alone cannot back an even-odds win.
    let before = e.clone();
    let err = e.open_position(alice(), TF, Direction::Bull, ONE).unwrap_err();
    assert_eq!(err, MarketError::InsufficientLiquidity { needed: 2 * ONE, available: ONE });
    assert_eq!(err.kind(), ErrorKind::Funds);
    assert_eq!(e.market, before.market);
    assert_eq!(e.token, before.token);
    assert_eq!(e.vault, before.vault);

    // Once a provider backs it, the bet goes through and the win is paid.
    e.add_new_liquidity_position(carol(), carol(), ONE).unwrap();
    e.open_position(alice(), TF, Direction::Bull, ONE).unwrap();
    execute_at(&mut e, 1_000);
    execute_at(&mut e, 1_001);
    assert_eq!(e.claim(alice(), TF, 2).unwrap().settlement.gross, 2 * ONE);
    assert_eq!(e.vault.underlying_balance(&e.token), 0);
}

#[test]
fn test_claim_all_collects_every_win() {
    let mut e = running(1_000);
    let mut wins = Vec::new();
    for round in 0..3 {
        let receipt = e.open_position(alice(), TF, Direction::Bull, ONE).unwrap();
        e.open_position(bob(), TF, Direction::Bear, ONE).unwrap();
        wins.push(receipt.epoch);
        execute_at(&mut e, 1_000 + round * 100);
    }
    execute_at(&mut e, 2_000);

    assert_eq!(e.market.claimable_epochs(TF, alice()), wins);
    assert_eq!(e.market.user_rounds_length(TF, alice()), 3);
    assert_eq!(e.market.user_rounds(TF, alice(), 1), Some(wins[1]));

    let receipts = e.claim_all(alice(), TF).unwrap();
    assert_eq!(receipts.len(), 3);
    assert!(e.market.claimable_epochs(TF, alice()).is_empty());
    assert!(e.claim_all(bob(), TF).unwrap().is_empty());
}

#[test]
fn test_bet_validation() {
    let mut e = running(1_000);
    assert!(matches!(
        e.open_position(alice(), TF, Direction::Bull, ONE / 1_000),
        Err(MarketError::BelowMinimum { .. })
    ));
    assert_eq!(
        e.open_position(alice(), TF, Direction::Bull, 0).unwrap_err(),
        MarketError::ZeroAmount
    );
    e.open_position(alice(), TF, Direction::Bull, ONE).unwrap();
    assert_eq!(
        e.open_position(alice(), TF, Direction::Bear, ONE).unwrap_err(),
        MarketError::DuplicatePosition(2)
    );

    let poor = binary_options::types::Address::from_low_u64(77);
    e.approve_market(poor, u128::MAX).unwrap();
    let before = e.clone();
    assert!(matches!(
        e.open_position(poor, TF, Direction::Bull, ONE),
        Err(MarketError::InsufficientBalance { .. })
    ));
    assert_eq!(e.market, before.market);
}
