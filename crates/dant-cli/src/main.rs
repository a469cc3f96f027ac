//! dant-sim: replay staking scenarios against a fresh or saved deployment.
//!
//! Usage:
//!   dant-sim --scenario run.json
//!   dant-sim --scenario run.json --data-dir ~/.dant/sim --snapshot day-1
//!   dant-sim --scenario more.json --data-dir ~/.dant/sim --resume day-1 --snapshot day-2
//!   dant-sim --data-dir ~/.dant/sim --list

mod scenario;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::Parser;
use tracing::info;

use dant_state::StateDb;
use dant_system::System;

use crate::scenario::Scenario;

#[derive(Parser, Debug)]
#[command(
    name = "dant-sim",
    version,
    about = "dANT staking simulator: replays timestamped scenarios and reports balances"
)]
struct Args {
    /// Scenario JSON to replay.
    #[arg(long, required_unless_present = "list")]
    scenario: Option<PathBuf>,

    /// Snapshot database directory. Without it nothing is persisted.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Name to store the final state under.
    #[arg(long, default_value = "latest")]
    snapshot: String,

    /// Continue from a stored snapshot instead of deploying afresh.
    #[arg(long, requires = "data_dir")]
    resume: Option<String>,

    /// List stored snapshots and exit.
    #[arg(long, requires = "data_dir")]
    list: bool,

    /// Write the report here instead of stdout.
    #[arg(long)]
    out: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,dant=debug".parse().unwrap()),
        )
        .init();

    let args = Args::parse();

    let db = match &args.data_dir {
        Some(dir) => {
            let dir = expand_tilde(dir);
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("creating data dir {}", dir.display()))?;
            Some(StateDb::open(&dir).context("opening snapshot database")?)
        }
        None => None,
    };

    if args.list {
        if let Some(db) = &db {
            let latest = db.latest_snapshot()?;
            for name in db.list_snapshots()? {
                let marker = if latest.as_deref() == Some(name.as_str()) { " *" } else { "" };
                println!("{name}{marker}");
            }
        }
        return Ok(());
    }

    let path = match &args.scenario {
        Some(p) => p,
        None => bail!("--scenario is required"),
    };
    let mut scenario = load_scenario(path)?;

    let mut sys = match (&args.resume, &db) {
        (Some(name), Some(db)) => {
            let sys = db
                .get_system(name)?
                .with_context(|| format!("no snapshot named {name:?}"))?;
            // Names in the scenario resolve against the saved deployment.
            if let Some(admin) = sys.token.access().admin() {
                scenario.params.admin = admin;
            }
            scenario.params.tree_root = sys.tree.tree_root();
            info!(snapshot = %name, "resumed");
            sys
        }
        _ => System::deploy(scenario.params.clone()).context("deploying system")?,
    };

    let report = scenario::run(&mut sys, &scenario)?;
    let failed = report.steps.iter().filter(|s| !s.ok).count();
    info!(steps = report.steps.len(), failed, audit = %report.audit, "scenario replayed");

    let json = serde_json::to_string_pretty(&report)?;
    match &args.out {
        Some(out) => std::fs::write(out, json)
            .with_context(|| format!("writing report to {}", out.display()))?,
        None => println!("{json}"),
    }

    if let Some(db) = &db {
        db.put_system(&args.snapshot, &sys).context("storing snapshot")?;
        db.flush()?;
        info!(snapshot = %args.snapshot, "state saved");
    }
    Ok(())
}

fn load_scenario(path: &Path) -> anyhow::Result<Scenario> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading scenario from {}", path.display()))?;
    serde_json::from_str(&json).context("parsing scenario JSON")
}

fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Ok(home) = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
            return PathBuf::from(home).join(stripped);
        }
    }
    path.to_path_buf()
}
