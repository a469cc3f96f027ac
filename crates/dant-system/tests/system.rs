use std::collections::BTreeMap;

use dant_core::access::Role;
use dant_core::account::RequestStatus;
use dant_core::constants::WAD;
use dant_core::math::{accrued, parse_units, wad_mul};
use dant_core::types::{AccountId, Balance, Timestamp};
use dant_referral::{DividendClaim, DividendSource, TierBasis};
use dant_rewards::PolicyKind;
use dant_system::{distributor_address, System, SystemParams};
use dant_token::AssetLedger;
use proptest::prelude::*;

const T0: Timestamp = 1_700_000_000;

const PCT_4: u128 = 40_000_000_000_000_000;
const PCT_1: u128 = 10_000_000_000_000_000;
const PCT_05: u128 = 5_000_000_000_000_000;

fn wei(s: &str) -> Balance {
    parse_units(s, 18).unwrap()
}

fn acct(label: &str) -> AccountId {
    AccountId::from_label(label)
}

fn pct(amount: Balance, rate: u128) -> Balance {
    wad_mul(amount, rate).unwrap()
}

fn paid(claims: &[DividendClaim]) -> Balance {
    claims.iter().map(|cl| cl.paid).sum()
}

struct Cast {
    alice: AccountId,
    bob: AccountId,
    carol: AccountId,
    david: AccountId,
    root: AccountId,
}

/// Five participants: alice deploys, david joins under the root, then
/// carol under david, bob under carol and alice under bob. Each of david,
/// carol and bob stakes 100 on every engine; alice stakes 1.
fn deploy_chain(basis: TierBasis) -> (System, Cast) {
    let cast = Cast {
        alice: acct("alice"),
        bob: acct("bob"),
        carol: acct("carol"),
        david: acct("david"),
        root: acct("frank"),
    };
    let params = SystemParams::preset(cast.alice, cast.root).with_tier_basis(basis);
    let mut sys = System::deploy(params).unwrap();

    for p in [cast.david, cast.carol, cast.bob] {
        sys.fund(p, wei("300")).unwrap();
        for kind in PolicyKind::ALL {
            sys.approve(p, kind, wei("100")).unwrap();
        }
    }
    for kind in PolicyKind::ALL {
        sys.approve(cast.alice, kind, wei("1")).unwrap();
    }

    for kind in PolicyKind::ALL {
        sys.stake(kind, cast.david, wei("100"), cast.root, T0).unwrap();
        sys.stake(kind, cast.carol, wei("100"), cast.david, T0).unwrap();
        sys.stake(kind, cast.bob, wei("100"), cast.carol, T0).unwrap();
    }
    for kind in PolicyKind::ALL {
        sys.stake(kind, cast.alice, wei("1"), cast.bob, T0).unwrap();
    }
    (sys, cast)
}

/// What settling `user` on every engine at `now` would mint, per engine.
fn rewards_at(sys: &System, user: AccountId, now: Timestamp) -> Vec<Balance> {
    sys.engines.iter().map(|e| e.get_reward(&user, now).unwrap()).collect()
}

/// Settle `user` on every engine at `now`; returns the reward per engine.
fn settle_all(sys: &mut System, user: AccountId, now: Timestamp) -> Vec<Balance> {
    PolicyKind::ALL
        .iter()
        .map(|k| sys.stake(*k, user, 0, AccountId::NULL, now).unwrap().reward)
        .collect()
}

#[test]
fn system_integrity_with_referrer_tiers() {
    let (mut sys, c) = deploy_chain(TierBasis::Referrer);
    assert_eq!(sys.tree.get_referrals(&c.alice, 3), vec![c.bob, c.carol, c.david]);
    assert_eq!(sys.tree.get_referrals(&c.carol, 3), vec![c.david, c.root, AccountId::NULL]);

    // Nobody settles: claims price the referrals' accrual as it stands.
    let t1 = T0 + 10_000;
    let a = rewards_at(&sys, c.alice, t1);
    let b = rewards_at(&sys, c.bob, t1);
    let cr = rewards_at(&sys, c.carol, t1);

    // Deposit shares exist on the two fixed-term engines only.
    let bob_expected: Balance = a.iter().map(|r| pct(*r, PCT_4)).sum::<Balance>() + 2 * wei("0.04");
    let carol_expected: Balance = a.iter().map(|r| pct(*r, PCT_1)).sum::<Balance>()
        + b.iter().map(|r| pct(*r, PCT_4)).sum::<Balance>()
        + 2 * (wei("0.01") + wei("4"));
    let david_expected: Balance = a.iter().map(|r| pct(*r, PCT_05)).sum::<Balance>()
        + b.iter().map(|r| pct(*r, PCT_1)).sum::<Balance>()
        + cr.iter().map(|r| pct(*r, PCT_4)).sum::<Balance>()
        + 2 * (wei("0.005") + wei("1") + wei("4"));

    assert_eq!(sys.pending_dividends(&c.bob, t1).unwrap(), bob_expected);

    let bob_claims = sys.claim_all_dividends(c.bob, t1);
    let carol_claims = sys.claim_all_dividends(c.carol, t1);
    let david_claims = sys.claim_all_dividends(c.david, t1);
    for claims in [&bob_claims, &carol_claims, &david_claims] {
        assert_eq!(claims.len(), 3);
        assert!(claims.iter().all(|cl| cl.error.is_none()));
    }
    assert_eq!(paid(&bob_claims), bob_expected);
    assert_eq!(paid(&carol_claims), carol_expected);
    assert_eq!(paid(&david_claims), david_expected);

    // Everyone staked all they were funded, so balances are dividends only.
    assert_eq!(sys.token.balance_of(&c.bob), bob_expected);
    assert_eq!(sys.token.balance_of(&c.carol), carol_expected);
    assert_eq!(sys.token.balance_of(&c.david), david_expected);
    assert_eq!(sys.pending_dividends(&c.bob, t1).unwrap(), 0);
    assert_eq!(rewards_at(&sys, c.alice, t1), a);
    assert_eq!(rewards_at(&sys, c.bob, t1), b);

    // alice settles later; bob books only the accrual after the claim.
    let t2 = t1 + 5_000;
    settle_all(&mut sys, c.alice, t2);
    let after_claim: Balance = sys
        .engines
        .iter()
        .map(|e| pct(accrued(WAD, e.reward_per_sec(), t2 - t1).unwrap(), PCT_4))
        .sum();
    assert_eq!(sys.pending_dividends(&c.bob, t2).unwrap(), after_claim);

    for e in &sys.engines {
        assert_eq!(e.total_stake(), wei("301"));
    }
    sys.audit().unwrap();
}

#[test]
fn trigger_tiers_skip_small_stakes() {
    let (mut sys, c) = deploy_chain(TierBasis::Trigger);
    let t1 = T0 + 10_000;
    settle_all(&mut sys, c.alice, t1);
    let b = settle_all(&mut sys, c.bob, t1);

    // alice's 1-token stake is below the lowest tier bound.
    assert_eq!(sys.pending_dividends(&c.bob, t1).unwrap(), 0);
    let carol_expected: Balance = b.iter().map(|r| pct(*r, PCT_4)).sum::<Balance>() + 2 * wei("4");
    assert_eq!(sys.pending_dividends(&c.carol, t1).unwrap(), carol_expected);

    let claims = sys.claim_all_dividends(c.bob, t1);
    assert!(claims.iter().all(|cl| cl.paid == 0 && cl.error.is_none()));
    sys.audit().unwrap();
}

#[test]
fn claim_all_survives_a_failing_distributor() {
    let (mut sys, c) = deploy_chain(TierBasis::Referrer);
    let now = T0 + 5_000;
    settle_all(&mut sys, c.bob, now);

    let broken = distributor_address(PolicyKind::FixedExplicitExit);
    sys.token.revoke_role(&c.alice, Role::Minter, &broken).unwrap();
    let stuck = sys
        .engine(PolicyKind::FixedExplicitExit)
        .unwrap()
        .get_referral_reward(&sys.tree, &c.carol, now)
        .unwrap();
    assert!(stuck > 0);

    let claims = sys.claim_all_dividends(c.carol, now);
    assert_eq!(claims[1].distributor, broken);
    assert!(claims[1].error.is_some());
    assert!(claims[0].paid > 0 && claims[2].paid > 0);
    assert_eq!(sys.pending_dividends(&c.carol, now).unwrap(), stuck);

    // Single-distributor claim surfaces the error.
    assert!(sys.claim_dividends(PolicyKind::FixedExplicitExit, c.carol, now).is_err());
    sys.audit().unwrap();
}

#[test]
fn open_ended_timelock_gate() {
    let (mut sys, c) = deploy_chain(TierBasis::Trigger);
    let t = T0 + 1_000;
    let w = sys.engine(PolicyKind::OpenEnded).unwrap().config().unstake_timelock_secs;
    sys.unstake(PolicyKind::OpenEnded, c.bob, 0, t).unwrap();
    let before = sys.token.balance_of(&c.bob);

    sys.stake(PolicyKind::OpenEnded, c.bob, 0, AccountId::NULL, t + w - 1).unwrap();
    let engine = sys.engine(PolicyKind::OpenEnded).unwrap();
    assert_eq!(engine.unstake_request(&c.bob, 0).unwrap().status, RequestStatus::Pending);
    assert_eq!(sys.token.balance_of(&c.bob), before);

    let r = sys.stake(PolicyKind::OpenEnded, c.bob, 0, AccountId::NULL, t + w + 1).unwrap();
    assert_eq!(r.returned, wei("100"));
    let engine = sys.engine(PolicyKind::OpenEnded).unwrap();
    assert_eq!(engine.unstake_request(&c.bob, 0).unwrap().status, RequestStatus::Completed);

    let r = sys.stake(PolicyKind::OpenEnded, c.bob, 0, AccountId::NULL, t + 2 * w).unwrap();
    assert_eq!(r.returned, 0);
    sys.audit().unwrap();
}

#[test]
fn distributor_handles_report_their_ids() {
    let (sys, _) = deploy_chain(TierBasis::Trigger);
    let ids: Vec<AccountId> = sys.engines.iter().map(|e| e.distributor_id()).collect();
    assert_eq!(ids, sys.tree.get_referral_rewards());
}

// ── Property tests ───────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
enum Op {
    Stake { kind: usize, user: usize, tenths: u64, referrer: usize },
    Unstake { user: usize, tenths: u64 },
    Withdraw { user: usize, index: usize },
    Claim { kind: usize, user: usize },
    ClaimAll { user: usize },
}

const USERS: usize = 4;

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..3usize, 0..USERS, 0..30_000u64, 0..USERS + 2)
            .prop_map(|(kind, user, tenths, referrer)| Op::Stake { kind, user, tenths, referrer }),
        2 => (0..USERS, 0..5_000u64).prop_map(|(user, tenths)| Op::Unstake { user, tenths }),
        1 => (0..USERS, 0..3usize).prop_map(|(user, index)| Op::Withdraw { user, index }),
        1 => (0..3usize, 0..USERS).prop_map(|(kind, user)| Op::Claim { kind, user }),
        1 => (0..USERS).prop_map(|user| Op::ClaimAll { user }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn conservation_and_monotonic_rewards(
        ops in prop::collection::vec((op_strategy(), 0i64..4_000_000), 1..40)
    ) {
        let root = acct("root");
        let mut sys = System::deploy(SystemParams::preset(acct("deployer"), root)).unwrap();
        let users: Vec<AccountId> = (0..USERS).map(|i| acct(&format!("user-{i}"))).collect();
        for u in &users {
            sys.fund(*u, 10_000 * WAD).unwrap();
            for kind in PolicyKind::ALL {
                sys.approve(*u, kind, Balance::MAX).unwrap();
            }
        }

        let mut now = T0;
        let mut seen: BTreeMap<(usize, usize), Balance> = BTreeMap::new();
        for (op, dt) in ops {
            now += dt;
            // Rejected calls are fine; they must simply leave no trace.
            let _ = match op {
                Op::Stake { kind, user, tenths, referrer } => {
                    let referrer = match referrer {
                        0 => AccountId::NULL,
                        1 => root,
                        n => users[n - 2],
                    };
                    sys.stake(PolicyKind::ALL[kind], users[user], tenths as u128 * WAD / 10, referrer, now)
                        .map(|_| ())
                }
                Op::Unstake { user, tenths } => sys
                    .unstake(PolicyKind::OpenEnded, users[user], tenths as u128 * WAD / 10, now)
                    .map(|_| ()),
                Op::Withdraw { user, index } => sys
                    .withdraw_request(PolicyKind::OpenEnded, users[user], index, now)
                    .map(|_| ()),
                Op::Claim { kind, user } => sys
                    .claim_dividends(PolicyKind::ALL[kind], users[user], now)
                    .map(|_| ()),
                Op::ClaimAll { user } => {
                    let claims = sys.claim_all_dividends(users[user], now);
                    if claims.iter().all(|cl| cl.error.is_none()) {
                        prop_assert_eq!(sys.pending_dividends(&users[user], now).unwrap(), 0);
                    }
                    Ok(())
                }
            };

            let audit = sys.audit();
            prop_assert!(audit.is_ok(), "{:?}", audit);

            for (ki, engine) in sys.engines.iter().enumerate() {
                for (ui, u) in users.iter().enumerate() {
                    let reward = engine.user_info(u).reward;
                    let prev = seen.insert((ki, ui), reward).unwrap_or(0);
                    prop_assert!(reward >= prev);
                }
            }
        }
    }
}
