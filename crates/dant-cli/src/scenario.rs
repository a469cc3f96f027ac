//! JSON scenario format and replay.
//!
//! ```json
//! {
//!   "params": { "tree_root": "0x…" },
//!   "participants": ["alice", "bob"],
//!   "steps": [
//!     { "at": 1700000000, "action": "fund",  "to": "alice", "amount": "1000" },
//!     { "at": 1700000000, "action": "approve", "owner": "alice", "policy": "fixed_auto_exit" },
//!     { "at": 1700000000, "action": "stake", "user": "alice", "policy": "fixed_auto_exit",
//!       "amount": "1000", "referrer": "root" },
//!     { "at": 1712960000, "action": "claim_all", "user": "root" }
//!   ]
//! }
//! ```
//!
//! Names resolve as: `root` → tree root, `deployer` → admin, `null` → the
//! null address, `0x…` → literal address, anything else → label address.

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use dant_core::constants::TOKEN_DECIMALS;
use dant_core::math::{format_units, parse_units};
use dant_core::types::{AccountId, Balance, Timestamp};
use dant_rewards::{PolicyKind, Receipt};
use dant_system::{System, SystemParams};
use dant_token::AssetLedger;

// ── Input ────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub params: SystemParams,
    /// Names reported at the end, in addition to every name a step touches.
    #[serde(default)]
    pub participants: Vec<String>,
    pub steps: Vec<Step>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Step {
    pub at: Timestamp,
    #[serde(flatten)]
    pub action: Action,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Fund { to: String, amount: String },
    Approve {
        owner: String,
        policy: PolicyKind,
        #[serde(default = "unlimited")]
        amount: String,
    },
    Stake {
        user: String,
        policy: PolicyKind,
        amount: String,
        #[serde(default)]
        referrer: Option<String>,
    },
    Unstake {
        user: String,
        #[serde(default)]
        amount: Option<String>,
    },
    Withdraw { user: String, index: usize },
    Claim { user: String, policy: PolicyKind },
    ClaimAll { user: String },
}

fn unlimited() -> String {
    "max".to_string()
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Fund { .. } => "fund",
            Action::Approve { .. } => "approve",
            Action::Stake { .. } => "stake",
            Action::Unstake { .. } => "unstake",
            Action::Withdraw { .. } => "withdraw",
            Action::Claim { .. } => "claim",
            Action::ClaimAll { .. } => "claim_all",
        }
    }

    fn names(&self) -> Vec<&str> {
        match self {
            Action::Fund { to, .. } => vec![to.as_str()],
            Action::Approve { owner, .. } => vec![owner.as_str()],
            Action::Stake { user, referrer, .. } => {
                let mut v = vec![user.as_str()];
                if let Some(r) = referrer {
                    v.push(r.as_str());
                }
                v
            }
            Action::Unstake { user, .. }
            | Action::Withdraw { user, .. }
            | Action::Claim { user, .. }
            | Action::ClaimAll { user } => vec![user.as_str()],
        }
    }
}

// ── Output ───────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize)]
pub struct Report {
    pub steps: Vec<StepReport>,
    pub participants: Vec<ParticipantReport>,
    pub total_supply: String,
    pub minted: String,
    pub audit: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct StepReport {
    pub index: usize,
    pub at: Timestamp,
    pub at_utc: String,
    pub action: &'static str,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reward: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub returned: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dividends: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ParticipantReport {
    pub name: String,
    pub address: AccountId,
    pub referrer: AccountId,
    pub balance: String,
    pub pending_dividends: String,
    pub stakes: Vec<StakeReport>,
}

#[derive(Clone, Debug, Serialize)]
pub struct StakeReport {
    pub policy: PolicyKind,
    pub amount: String,
    pub unfrozen: String,
    pub reward: String,
}

fn tokens(b: Balance) -> String {
    format_units(b, TOKEN_DECIMALS)
}

fn utc(at: Timestamp) -> String {
    chrono::DateTime::from_timestamp(at, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| at.to_string())
}

// ── Replay ───────────────────────────────────────────────────────────────────

pub fn resolve(name: &str, params: &SystemParams) -> anyhow::Result<AccountId> {
    match name {
        "root" => Ok(params.tree_root),
        "deployer" | "admin" => Ok(params.admin),
        "" | "null" => Ok(AccountId::NULL),
        s if s.starts_with("0x") => AccountId::from_hex(s).with_context(|| format!("bad address {s}")),
        s => Ok(AccountId::from_label(s)),
    }
}

fn amount(s: &str) -> anyhow::Result<Balance> {
    if s == "max" {
        return Ok(Balance::MAX);
    }
    parse_units(s, TOKEN_DECIMALS).with_context(|| format!("bad amount {s:?}"))
}

/// Outcome of one step against the system.
enum Outcome {
    Done,
    Receipt(Receipt),
    Dividends(Balance),
}

fn apply(sys: &mut System, params: &SystemParams, step: &Step) -> anyhow::Result<Outcome> {
    let now = step.at;
    let outcome = match &step.action {
        Action::Fund { to, amount: a } => {
            sys.fund(resolve(to, params)?, amount(a)?)?;
            Outcome::Done
        }
        Action::Approve { owner, policy, amount: a } => {
            sys.approve(resolve(owner, params)?, *policy, amount(a)?)?;
            Outcome::Done
        }
        Action::Stake { user, policy, amount: a, referrer } => {
            let referrer = match referrer {
                Some(r) => resolve(r, params)?,
                None => AccountId::NULL,
            };
            Outcome::Receipt(sys.stake(*policy, resolve(user, params)?, amount(a)?, referrer, now)?)
        }
        Action::Unstake { user, amount: a } => {
            let a = match a {
                Some(a) => amount(a)?,
                None => 0,
            };
            Outcome::Receipt(sys.unstake(PolicyKind::OpenEnded, resolve(user, params)?, a, now)?)
        }
        Action::Withdraw { user, index } => Outcome::Receipt(sys.withdraw_request(
            PolicyKind::OpenEnded,
            resolve(user, params)?,
            *index,
            now,
        )?),
        Action::Claim { user, policy } => {
            Outcome::Dividends(sys.claim_dividends(*policy, resolve(user, params)?, now)?)
        }
        Action::ClaimAll { user } => {
            let claims = sys.claim_all_dividends(resolve(user, params)?, now);
            Outcome::Dividends(claims.iter().map(|c| c.paid).sum())
        }
    };
    Ok(outcome)
}

/// Replay `scenario` against `sys`. A rejected step is recorded and the
/// replay moves on; steps must not go back in time.
pub fn run(sys: &mut System, scenario: &Scenario) -> anyhow::Result<Report> {
    let params = &scenario.params;
    let mut steps = Vec::with_capacity(scenario.steps.len());
    let mut last_at = Timestamp::MIN;

    for (index, step) in scenario.steps.iter().enumerate() {
        if step.at < last_at {
            bail!("step {index} at {} is earlier than the previous step at {last_at}", step.at);
        }
        last_at = step.at;

        let mut report = StepReport {
            index,
            at: step.at,
            at_utc: utc(step.at),
            action: step.action.name(),
            ok: true,
            error: None,
            reward: None,
            returned: None,
            dividends: None,
        };
        match apply(sys, params, step) {
            Ok(Outcome::Done) => {}
            Ok(Outcome::Receipt(r)) => {
                report.reward = Some(tokens(r.reward));
                report.returned = Some(tokens(r.returned));
            }
            Ok(Outcome::Dividends(paid)) => report.dividends = Some(tokens(paid)),
            Err(e) => {
                warn!(index, action = step.action.name(), error = %e, "step rejected");
                report.ok = false;
                report.error = Some(format!("{e:#}"));
            }
        }
        debug!(index, action = report.action, ok = report.ok, "step applied");
        steps.push(report);
    }

    let mut names: Vec<String> = scenario.participants.clone();
    for step in &scenario.steps {
        for n in step.action.names() {
            if !names.iter().any(|x| x == n) {
                names.push(n.to_string());
            }
        }
    }
    names.retain(|n| !matches!(n.as_str(), "" | "null"));

    // Pending dividends are reported as of the last step.
    let as_of = scenario.steps.last().map_or(0, |s| s.at);
    let mut participants = Vec::with_capacity(names.len());
    for name in names {
        let address = resolve(&name, params)?;
        participants.push(participant(sys, name, address, as_of)?);
    }

    let audit = match sys.audit() {
        Ok(()) => "ok".to_string(),
        Err(e) => e.to_string(),
    };

    Ok(Report {
        steps,
        participants,
        total_supply: tokens(sys.token.total_supply()),
        minted: tokens(sys.token.minted()),
        audit,
    })
}

fn participant(sys: &System, name: String, address: AccountId, now: Timestamp) -> anyhow::Result<ParticipantReport> {
    let stakes = sys
        .engines
        .iter()
        .map(|e| {
            let info = e.user_info(&address);
            StakeReport {
                policy: e.kind(),
                amount: tokens(info.amount),
                unfrozen: tokens(info.unfrozen),
                reward: tokens(info.reward),
            }
        })
        .collect();
    Ok(ParticipantReport {
        name,
        address,
        referrer: sys.tree.referral_of(&address),
        balance: tokens(sys.token.balance_of(&address)),
        pending_dividends: tokens(sys.pending_dividends(&address, now)?),
        stakes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str = r#"{
        "participants": ["deployer"],
        "steps": [
            { "at": 1700000000, "action": "fund", "to": "alice", "amount": "1000" },
            { "at": 1700000000, "action": "fund", "to": "bob", "amount": "3000" },
            { "at": 1700000000, "action": "approve", "owner": "bob", "policy": "fixed_auto_exit" },
            { "at": 1700000000, "action": "approve", "owner": "alice", "policy": "open_ended", "amount": "1000" },
            { "at": 1700000000, "action": "stake", "user": "bob", "policy": "fixed_auto_exit",
              "amount": "3000", "referrer": "root" },
            { "at": 1700000000, "action": "stake", "user": "alice", "policy": "open_ended",
              "amount": "1000", "referrer": "bob" },
            { "at": 1710000000, "action": "unstake", "user": "alice" },
            { "at": 1710000001, "action": "withdraw", "user": "alice", "index": 0 },
            { "at": 1710300000, "action": "withdraw", "user": "alice", "index": 0 },
            { "at": 1710300000, "action": "claim_all", "user": "bob" },
            { "at": 1710300000, "action": "claim", "user": "root", "policy": "fixed_auto_exit" }
        ]
    }"#;

    #[test]
    fn replays_scenario() {
        let scenario: Scenario = serde_json::from_str(SCENARIO).unwrap();
        let mut sys = System::deploy(scenario.params.clone()).unwrap();
        let report = run(&mut sys, &scenario).unwrap();

        assert_eq!(report.steps.len(), 11);
        assert!(report.steps[..7].iter().all(|s| s.ok));
        assert_eq!(report.steps[6].reward.as_deref(), Some("578.7037037"));
        // Too early, then fine.
        assert!(!report.steps[7].ok);
        assert!(report.steps[7].error.as_deref().unwrap_or("").contains("timelock"));
        assert!(report.steps[8].ok);
        assert_eq!(report.steps[8].returned.as_deref(), Some("1000"));
        // bob earns 4% of alice's open-ended reward as alice's referrer.
        assert!(report.steps[9].ok);
        assert_eq!(report.steps[9].dividends.as_deref(), Some("23.148148148"));
        // root takes 5% of bob's 3000 deposit, and 5% of the 3576.3888969
        // bob has accrued but not settled.
        assert_eq!(report.steps[10].dividends.as_deref(), Some("328.819444845"));
        let fixed = sys.engine(PolicyKind::FixedAutoExit).unwrap();
        let root = scenario.params.tree_root;
        assert_eq!(fixed.get_referral_reward(&sys.tree, &root, 1_710_300_000).unwrap(), 0);
        assert_eq!(fixed.get_reward(&AccountId::from_label("bob"), 1_710_300_000).unwrap(), amount("3576.3888969").unwrap());

        assert_eq!(report.audit, "ok");
        let names: Vec<&str> = report.participants.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["deployer", "alice", "bob", "root"]);
        let alice = &report.participants[1];
        assert_eq!(alice.referrer, AccountId::from_label("bob"));
        assert_eq!(alice.balance, "1578.7037037");
    }

    #[test]
    fn bundled_scenario_runs_clean() {
        let scenario: Scenario =
            serde_json::from_str(include_str!("../scenarios/referral-chain.json")).unwrap();
        let mut sys = System::deploy(scenario.params.clone()).unwrap();
        let report = run(&mut sys, &scenario).unwrap();

        let failed: Vec<usize> = report.steps.iter().filter(|s| !s.ok).map(|s| s.index).collect();
        // Only the oversized unstake is refused.
        assert_eq!(failed, vec![10]);
        assert_eq!(report.steps[11].returned.as_deref(), Some("150"));
        assert_eq!(report.steps[12].returned.as_deref(), Some("2500"));
        assert_eq!(report.steps[13].returned.as_deref(), Some("6000"));
        assert_eq!(report.audit, "ok");

        let root = report.participants.iter().find(|p| p.name == "root").unwrap();
        assert_eq!(root.pending_dividends, "0");
        assert_eq!(sys.pending_dividends(&AccountId::from_label("david"), 1_725_920_001).unwrap(), 0);
    }

    #[test]
    fn rejects_time_travel() {
        let scenario: Scenario = serde_json::from_str(
            r#"{ "steps": [
                { "at": 10, "action": "fund", "to": "a", "amount": "1" },
                { "at": 9, "action": "fund", "to": "a", "amount": "1" }
            ] }"#,
        )
        .unwrap();
        let mut sys = System::deploy(scenario.params.clone()).unwrap();
        assert!(run(&mut sys, &scenario).is_err());
    }

    #[test]
    fn resolves_names() {
        let params = SystemParams::default();
        assert_eq!(resolve("root", &params).unwrap(), params.tree_root);
        assert_eq!(resolve("deployer", &params).unwrap(), params.admin);
        assert!(resolve("null", &params).unwrap().is_null());
        let a = AccountId::from_label("x");
        assert_eq!(resolve(&a.to_hex(), &params).unwrap(), a);
        assert!(resolve("0xzz", &params).is_err());
        assert_eq!(amount("max").unwrap(), Balance::MAX);
        assert!(amount("1.2.3").is_err());
    }
}
