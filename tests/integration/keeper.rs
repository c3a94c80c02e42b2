//! Keeper loop against a scripted price source.

use binary_options::engine::keeper::Keeper;
use binary_options::feeds::FixedPriceSource;
use binary_options::types::Direction;

use crate::harness::*;

#[tokio::test]
async fn test_keeper_runs_full_lifecycle() {
    let mut e = world();
    let keeper = Keeper::new(
        Box::new(FixedPriceSource::scripted(1_000, vec![1_000, 1_200])),
        operator(),
    );

    let report = keeper.run_once(&mut e).await.unwrap();
    assert_eq!(report.genesis_started, vec![TF]);

    e.mine(INTERVAL);
    let report = keeper.run_once(&mut e).await.unwrap();
    assert_eq!(report.genesis_locked, vec![TF]);
    assert_eq!(report.price, Some(1_000));

    e.open_position(alice(), TF, Direction::Bull, ONE).unwrap();
    e.open_position(bob(), TF, Direction::Bear, ONE).unwrap();

    // Not due until the lock block.
    e.mine(INTERVAL - 1);
    assert!(keeper.run_once(&mut e).await.unwrap().is_noop());

    e.mine(1);
    let report = keeper.run_once(&mut e).await.unwrap();
    assert_eq!(report.execution.executions[0].locked_epoch, 2);

    e.mine(INTERVAL);
    let report = keeper.run_once(&mut e).await.unwrap();
    assert_eq!(report.execution.executions[0].closed_epoch, Some(2));
    assert_eq!(report.price, Some(1_200));

    assert!(e.is_claimable(TF, 2, alice()));
    assert!(!e.is_claimable(TF, 2, bob()));

    // Nothing left to do.
    e.mine(5 * INTERVAL);
    assert!(keeper.run_once(&mut e).await.unwrap().is_noop());
    assert_eq!(e.ticks, 6);
}
