//! Round scheduling: genesis, execution cadence, due detection.

use binary_options::market::round::RoundPhase;
use binary_options::market::timeframe::Timeframe;
use binary_options::market::ExecutionPrices;
use binary_options::types::{Direction, ErrorKind, MarketError};

use crate::harness::*;

#[test]
fn test_genesis_lock_waits_for_interval() {
    let mut e = world();
    assert_eq!(e.genesis_start_round(operator(), TF).unwrap(), 1);

    e.mine(9);
    let before = e.clone();
    let err = e.genesis_lock_round(operator(), TF, 100).unwrap_err();
    assert_eq!(err, MarketError::TooEarly { current: 9, required: 10 });
    assert_eq!(err.kind(), ErrorKind::Sequencing);
    assert_eq!(e.market, before.market);
    assert_eq!(e.oracle, before.oracle);

    e.mine(1);
    assert_eq!(e.genesis_lock_round(operator(), TF, 100).unwrap(), 2);
    let latest = e.oracle.latest_round_data().unwrap();
    assert_eq!(latest.round_id, 0);
    assert_eq!(latest.price, 100);
    assert_eq!(e.market.current_epoch(TF), 2);
    assert_eq!(e.market.round(TF, 1).unwrap().lock_oracle_round_id, Some(0));
}

#[test]
fn test_genesis_guards() {
    let mut e = world();
    assert_eq!(
        e.genesis_lock_round(operator(), TF, 1).unwrap_err(),
        MarketError::NotGenesisStarted(TF)
    );
    assert!(matches!(
        e.genesis_start_round(alice(), TF).unwrap_err(),
        MarketError::Unauthorized(_)
    ));
    e.genesis_start_round(operator(), TF).unwrap();
    assert_eq!(
        e.genesis_start_round(operator(), TF).unwrap_err(),
        MarketError::AlreadyStarted(TF)
    );
    assert_eq!(
        e.genesis_start_round(operator(), 9).unwrap_err(),
        MarketError::UnknownTimeframe(9)
    );
}

#[test]
fn test_epochs_advance_by_one_with_price_continuity() {
    let mut e = running(1_000);
    let prices = [1_010, 990, 990, 1_200, 800];
    for (i, price) in prices.into_iter().enumerate() {
        let before = e.market.current_epoch(TF);
        execute_at(&mut e, price);
        assert_eq!(e.market.current_epoch(TF), before + 1, "step {i}");
    }

    let current = e.market.current_epoch(TF);
    assert_eq!(current, 7);
    for epoch in 1..current - 1 {
        let closed = e.market.round(TF, epoch).unwrap();
        let next = e.market.round(TF, epoch + 1).unwrap();
        assert_eq!(closed.phase(), RoundPhase::Closed);
        assert_eq!(closed.close_price, next.lock_price, "epoch {epoch}");
        assert_eq!(closed.close_oracle_round_id, next.lock_oracle_round_id);
    }
    assert_eq!(e.market.round(TF, current - 1).unwrap().phase(), RoundPhase::Locked);
    assert_eq!(e.market.round(TF, current).unwrap().phase(), RoundPhase::Bidding);
    assert_eq!(e.oracle.next_round_id(), 6);
}

#[test]
fn test_execution_measures_next_round_from_now() {
    let mut e = running(1_000);
    // Operator shows up 25 blocks late.
    e.mine(35);
    let report = e
        .execute_round(operator(), &[TF], ExecutionPrices::Uniform(1_000))
        .unwrap();
    assert_eq!(report.executions[0].late_by_blocks, 25);
    let now = e.block_number();
    let active = e.market.round(TF, 3).unwrap();
    assert_eq!(active.start_block, now);
    assert_eq!(active.lock_block, now + INTERVAL);
    assert_eq!(e.market.round(TF, 2).unwrap().close_block, now + INTERVAL);
}

#[test]
fn test_execute_before_lock_block_is_too_early() {
    let mut e = running(1_000);
    e.mine(INTERVAL - 1);
    let before = e.clone();
    assert!(matches!(
        e.execute_round(operator(), &[TF], ExecutionPrices::Uniform(1)),
        Err(MarketError::TooEarly { .. })
    ));
    assert_eq!(e.market, before.market);
    assert_eq!(e.oracle, before.oracle);
}

#[test]
fn test_empty_execution_is_noop() {
    let mut e = running(1_000);
    let before = e.clone();
    let report = e
        .execute_round(operator(), &[], ExecutionPrices::Uniform(1))
        .unwrap();
    assert!(report.is_empty());
    assert_eq!(e.market, before.market);
    assert_eq!(e.oracle, before.oracle);
}

#[test]
fn test_executable_timeframes_follow_bets() {
    let mut e = running(1_000);
    e.mine(500);
    assert!(e.executable_timeframes().is_empty());

    // Idle round past its lock block still accepts the first bet.
    e.open_position(alice(), TF, Direction::Bull, ONE).unwrap();
    assert_eq!(e.executable_timeframes(), vec![TF]);

    // The round is now due; further bets are rejected.
    assert!(matches!(
        e.open_position(bob(), TF, Direction::Bear, ONE),
        Err(MarketError::RoundNotBiddable { .. })
    ));

    e.execute_round(operator(), &[TF], ExecutionPrices::Uniform(1_000))
        .unwrap();
    // Previous round still holds the stake until it closes.
    e.mine(INTERVAL);
    assert_eq!(e.executable_timeframes(), vec![TF]);
    e.execute_round(operator(), &[TF], ExecutionPrices::Uniform(1_050))
        .unwrap();
    e.mine(INTERVAL);
    assert!(e.executable_timeframes().is_empty());
}

#[test]
fn test_pause_blocks_origination_only() {
    let mut e = running(1_000);
    e.open_position(alice(), TF, Direction::Bull, ONE).unwrap();
    execute_at(&mut e, 1_000);
    execute_at(&mut e, 1_100);

    e.set_pause(owner(), true).unwrap();
    assert_eq!(
        e.open_position(bob(), TF, Direction::Bear, ONE).unwrap_err(),
        MarketError::Paused
    );
    e.mine(INTERVAL);
    assert_eq!(
        e.execute_round(operator(), &[TF], ExecutionPrices::Uniform(1)).unwrap_err(),
        MarketError::Paused
    );
    assert!(e.claim(alice(), TF, 2).is_ok());

    e.set_pause(operator(), false).unwrap();
    assert!(e.open_position(bob(), TF, Direction::Bear, ONE).is_ok());
}

#[test]
fn test_per_timeframe_prices_require_matching_length() {
    let mut e = running(1_000);
    e.mine(INTERVAL);
    assert_eq!(
        e.execute_round(operator(), &[TF], ExecutionPrices::PerTimeframe(vec![1, 2]))
            .unwrap_err(),
        MarketError::InvalidArrayLength
    );
    let report = e
        .execute_round(operator(), &[TF], ExecutionPrices::PerTimeframe(vec![777]))
        .unwrap();
    assert_eq!(report.executions[0].price, 777);
}

#[test]
fn test_new_interval_applies_from_next_round() {
    let mut e = running(1_000);
    // Epoch 2 opened at block 10 with a 10-block interval.
    e.market
        .set_timeframes(
            owner(),
            vec![Timeframe {
                id: TF,
                interval_seconds: 300,
                interval_blocks: 100,
                buffer_blocks: 2,
            }],
        )
        .unwrap();
    execute_at(&mut e, 1_000);
    assert_eq!(e.block_number(), 20);

    let locked = e.market.round(TF, 2).unwrap();
    assert_eq!(locked.close_block, 30);
    let next = e.market.round(TF, 3).unwrap();
    assert_eq!(next.lock_block, 120);
}
