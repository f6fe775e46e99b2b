#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Command-line adapter that replays grant scenarios against a progression session.

mod scenario;

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use clap::Parser;
use progression_core::LedgerSnapshot;
use scenario::{RunOptions, Scenario};
use tracing_subscriber::EnvFilter;

/// Replays a scripted progression scenario headlessly.
#[derive(Debug, Parser)]
#[command(name = "progression", version)]
struct Cli {
    /// Scenario file describing the session and the steps to replay.
    scenario: PathBuf,
    /// Ledger snapshot (JSON) to resume from.
    #[arg(long)]
    restore: Option<PathBuf>,
    /// Where to write the final ledger snapshot as JSON.
    #[arg(long)]
    snapshot_out: Option<PathBuf>,
    /// Simulated frame length in milliseconds.
    #[arg(long, default_value_t = 16)]
    frame_ms: u64,
    /// Upper bound on frames spent settling pending work.
    #[arg(long, default_value_t = 10_000)]
    max_ticks: u32,
}

/// Entry point for the progression command-line interface.
fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let text = fs::read_to_string(&cli.scenario)
        .with_context(|| format!("failed to read {}", cli.scenario.display()))?;
    let scenario = Scenario::parse(&text)
        .with_context(|| format!("failed to load {}", cli.scenario.display()))?;

    let restore = cli.restore.as_deref().map(load_snapshot).transpose()?;
    let options = RunOptions {
        frame: Duration::from_millis(cli.frame_ms.max(1)),
        max_ticks: cli.max_ticks,
    };
    let report = scenario.run(options, restore.as_ref())?;

    if let (Some(path), Some(snapshot)) = (&cli.snapshot_out, &report.snapshot) {
        let json = serde_json::to_string_pretty(snapshot).context("failed to encode snapshot")?;
        fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
        tracing::info!(path = %path.display(), "snapshot written");
    }

    let summary = serde_json::to_string_pretty(&report).context("failed to encode report")?;
    println!("{summary}");
    Ok(())
}

fn load_snapshot(path: &Path) -> Result<LedgerSnapshot> {
    let text =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid snapshot {}", path.display()))
}
