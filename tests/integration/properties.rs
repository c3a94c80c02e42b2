//! Property tests: random liquidity operations keep the vault consistent,
//! every rejected operation leaves it unchanged, and no sequence of LP
//! exits can stop a winning bettor from being paid.

use proptest::prelude::*;

use binary_options::engine::Engine;
use binary_options::token::{MemoryToken, UnderlyingToken};
use binary_options::types::{Address, Amount, Direction, Price, TokenId};
use binary_options::vault::Vault;

use crate::harness::{alice, bob, carol, execute_at, running, ONE, TF};

const USERS: u64 = 4;
const UNIT: Amount = 1_000_000_000_000;

#[derive(Debug, Clone)]
enum Op {
    AddNew { user: u64, amount: Amount },
    AddTo { pick: usize, amount: Amount },
    RemoveFrom { pick: usize, percent: u8 },
    RemoveAll { user: u64, percent: u8 },
    Merge { user: u64, take: usize },
    Split { pick: usize, percent: u8 },
    Transfer { pick: usize, to: u64 },
    Profit { amount: Amount },
    Reserve { amount: Amount },
    Release { amount: Amount },
    Payout { amount: Amount },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..USERS, 1..50 * UNIT).prop_map(|(user, amount)| Op::AddNew { user, amount }),
        (any::<usize>(), 1..50 * UNIT).prop_map(|(pick, amount)| Op::AddTo { pick, amount }),
        (any::<usize>(), 1..=100u8).prop_map(|(pick, percent)| Op::RemoveFrom { pick, percent }),
        (0..USERS, 1..=100u8).prop_map(|(user, percent)| Op::RemoveAll { user, percent }),
        (0..USERS, 0..4usize).prop_map(|(user, take)| Op::Merge { user, take }),
        (any::<usize>(), 1..=100u8).prop_map(|(pick, percent)| Op::Split { pick, percent }),
        (any::<usize>(), 0..USERS).prop_map(|(pick, to)| Op::Transfer { pick, to }),
        (1..10 * UNIT).prop_map(|amount| Op::Profit { amount }),
        (1..10 * UNIT).prop_map(|amount| Op::Reserve { amount }),
        (1..10 * UNIT).prop_map(|amount| Op::Release { amount }),
        (1..10 * UNIT).prop_map(|amount| Op::Payout { amount }),
    ]
}

fn user(n: u64) -> Address {
    Address::from_low_u64(10 + n)
}

fn admin() -> Address {
    Address::from_low_u64(1)
}

fn market() -> Address {
    Address::from_low_u64(200)
}

fn house() -> Address {
    Address::from_low_u64(300)
}

fn setup() -> (Vault, MemoryToken) {
    let mut vault = Vault::new(Address::from_low_u64(100), admin(), "Prop Vault", "PV");
    vault.whitelist_market(admin(), market(), true).unwrap();
    let mut token = MemoryToken::new("T", 18);
    for n in 0..USERS {
        token.mint(user(n), 1_000_000 * UNIT).unwrap();
        token.approve(user(n), vault.address(), u128::MAX).unwrap();
    }
    token.mint(house(), 1_000_000 * UNIT).unwrap();
    (vault, token)
}

/// Pick a live token id (any owner), if there is one.
fn live_token(vault: &Vault, pick: usize) -> Option<(TokenId, Address)> {
    let all: Vec<(TokenId, Address)> = (0..USERS)
        .flat_map(|n| vault.tokens_of_owner(user(n)).into_iter().map(move |id| (id, user(n))))
        .collect();
    if all.is_empty() {
        None
    } else {
        Some(all[pick % all.len()])
    }
}

fn apply(vault: &mut Vault, token: &mut MemoryToken, op: &Op) -> bool {
    match *op {
        Op::AddNew { user: n, amount } => vault
            .add_new_liquidity_position(token, user(n), user(n), amount)
            .is_ok(),
        Op::AddTo { pick, amount } => match live_token(vault, pick) {
            Some((id, owner)) => vault.add_liquidity_position(token, owner, owner, id, amount).is_ok(),
            None => false,
        },
        Op::RemoveFrom { pick, percent } => match live_token(vault, pick) {
            Some((id, owner)) => {
                let shares = vault.share_balance(id) * Amount::from(percent) / 100;
                vault.remove_liquidity_position(token, owner, owner, id, shares).is_ok()
            }
            None => false,
        },
        Op::RemoveAll { user: n, percent } => {
            let owned: Amount = vault.tokens_of_owner(user(n)).iter().map(|id| vault.share_balance(*id)).sum();
            let shares = owned * Amount::from(percent) / 100;
            vault.remove_liquidity(token, user(n), user(n), shares).is_ok()
        }
        Op::Merge { user: n, take } => {
            let ids: Vec<TokenId> = vault.tokens_of_owner(user(n)).into_iter().take(take).collect();
            vault.merge_positions(user(n), user(n), &ids).is_ok()
        }
        Op::Split { pick, percent } => match live_token(vault, pick) {
            Some((id, owner)) => {
                let shares = vault.share_balance(id) * Amount::from(percent) / 100;
                vault.split_position(owner, id, shares).is_ok()
            }
            None => false,
        },
        Op::Transfer { pick, to } => match live_token(vault, pick) {
            Some((id, owner)) => vault.transfer_position(owner, owner, user(to), id).is_ok(),
            None => false,
        },
        Op::Profit { amount } => token.transfer(house(), vault.address(), amount).is_ok(),
        Op::Reserve { amount } => {
            vault.ensure_reserve(token, market(), amount, 0).is_ok() && vault.reserve(market(), amount).is_ok()
        }
        Op::Release { amount } => vault.release(market(), amount).is_ok(),
        Op::Payout { amount } => vault.pay_out(token, market(), house(), amount).is_ok(),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn prop_share_supply_matches_token_balances(ops in prop::collection::vec(op(), 1..60)) {
        let (mut vault, mut token) = setup();
        for op in &ops {
            let vault_before = vault.clone();
            let token_before = token.clone();
            let ok = apply(&mut vault, &mut token, op);
            if !ok {
                prop_assert_eq!(&vault, &vault_before, "rejected {:?} mutated the vault", op);
                prop_assert_eq!(&token, &token_before, "rejected {:?} moved tokens", op);
            }
            prop_assert!(vault.check_invariants().is_ok(), "{:?} after {:?}", vault.check_invariants(), op);
            prop_assert!(vault.check_solvency(&token).is_ok(), "{:?} after {:?}", vault.check_solvency(&token), op);

            let sum: Amount = (0..USERS)
                .flat_map(|n| vault.tokens_of_owner(user(n)))
                .map(|id| vault.share_balance(id))
                .sum();
            prop_assert_eq!(sum, vault.total_share_supply());
        }
    }
}

// ---------------------------------------------------------------------------
// Bets and liquidity together
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Step {
    Deposit { who: usize, amount: Amount },
    Withdraw { who: usize, percent: u8 },
    Bet { who: usize, bull: bool, amount: Amount },
    Execute { delta: i8 },
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        (0..3usize, ONE / 100..5 * ONE).prop_map(|(who, amount)| Step::Deposit { who, amount }),
        (0..3usize, 1..=100u8).prop_map(|(who, percent)| Step::Withdraw { who, percent }),
        (0..3usize, any::<bool>(), ONE / 100..5 * ONE).prop_map(|(who, bull, amount)| Step::Bet { who, bull, amount }),
        (-2..=2i8).prop_map(|delta| Step::Execute { delta }),
    ]
}

fn player(who: usize) -> Address {
    [alice(), bob(), carol()][who]
}

fn move_price(price: Price, delta: i8) -> Price {
    if delta < 0 {
        price.saturating_sub(delta.unsigned_abs() as Price).max(1)
    } else {
        price + delta as Price
    }
}

/// Returns whether the step was accepted.
fn take(e: &mut Engine, price: &mut Price, step: &Step) -> bool {
    match *step {
        Step::Deposit { who, amount } => e.add_new_liquidity_position(player(who), player(who), amount).is_ok(),
        Step::Withdraw { who, percent } => {
            let owned = e.vault.shares_of_user(&e.token, player(who)).map(|u| u.shares).unwrap_or(0);
            let shares = owned * Amount::from(percent) / 100;
            e.remove_liquidity(player(who), player(who), shares).is_ok()
        }
        Step::Bet { who, bull, amount } => {
            let direction = if bull { Direction::Bull } else { Direction::Bear };
            e.open_position(player(who), TF, direction, amount).is_ok()
        }
        Step::Execute { delta } => {
            *price = move_price(*price, delta);
            execute_at(e, *price);
            true
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_lp_exits_never_block_winning_claims(steps in prop::collection::vec(step(), 1..40)) {
        let mut e = running(1_000);
        let mut price: Price = 1_000;
        for step in &steps {
            let before = e.clone();
            if !take(&mut e, &mut price, step) {
                prop_assert_eq!(&e.vault, &before.vault, "rejected {:?} mutated the vault", step);
                prop_assert_eq!(&e.token, &before.token, "rejected {:?} moved tokens", step);
                prop_assert_eq!(&e.market, &before.market, "rejected {:?} mutated the market", step);
            }
            prop_assert!(e.vault.check_invariants().is_ok(), "{:?} after {:?}", e.vault.check_invariants(), step);
            prop_assert!(e.vault.check_solvency(&e.token).is_ok(), "{:?} after {:?}", e.vault.check_solvency(&e.token), step);
        }

        // Every provider leaves before the last rounds settle.
        for who in 0..3 {
            let owned = e.vault.shares_of_user(&e.token, player(who)).map(|u| u.shares).unwrap_or(0);
            if owned > 0 {
                prop_assert!(e.remove_liquidity(player(who), player(who), owned).is_ok());
            }
        }
        price = move_price(price, 1);
        execute_at(&mut e, price);
        price = move_price(price, 1);
        execute_at(&mut e, price);

        for who in 0..3 {
            let user = player(who);
            for epoch in e.market.ledger().user_rounds(TF, user).to_vec() {
                if e.is_claimable(TF, epoch, user) {
                    let claimed = e.claim(user, TF, epoch);
                    prop_assert!(claimed.is_ok(), "claim {} for {} failed: {:?}", epoch, user, claimed);
                }
            }
        }
        prop_assert_eq!(e.vault.total_reserved(), 0);
        prop_assert!(e.vault.check_solvency(&e.token).is_ok());
    }
}
