//! `zentest run`: execute one suite or every suite under ./tests.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::Config;
use crate::runner::{RunOptions, Runner, SuiteReport};

use super::output;

pub struct RunArgs {
    pub suite: Option<PathBuf>,
    pub agentic: bool,
    pub no_heal: bool,
    pub env: Option<String>,
    pub headless: bool,
    pub headed: bool,
    pub verbose: bool,
}

/// Returns true iff every test in every suite passed.
pub async fn cmd_run(config: Config, args: RunArgs, cancel: CancellationToken) -> Result<bool> {
    let suites = match &args.suite {
        Some(path) => vec![path.clone()],
        None => discover_suites(Path::new("tests")).await?,
    };
    if suites.is_empty() {
        bail!("no suite files found (looked in ./tests; run `zentest init` to scaffold)");
    }

    let options = RunOptions {
        force_agentic: args.agentic,
        heal: !args.no_heal,
        env: args.env.clone(),
        headless_override: match (args.headless, args.headed) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        },
        verbose: args.verbose,
    };

    let runner = Runner::new(config, options, cancel.clone());
    let mut reports: Vec<SuiteReport> = Vec::new();

    for suite_path in &suites {
        if cancel.is_cancelled() {
            info!("cancelled before {}", suite_path.display());
            break;
        }
        let report = runner
            .run_suite(suite_path)
            .await
            .with_context(|| format!("suite {} failed to run", suite_path.display()))?;
        output::print_suite(&report);
        reports.push(report);
    }

    output::print_summary(&reports);
    Ok(reports.iter().all(SuiteReport::all_passed))
}

async fn discover_suites(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut suites = Vec::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(_) => return Ok(suites),
    };
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("md") {
            suites.push(path);
        }
    }
    suites.sort();
    Ok(suites)
}
