//! Per-run diagnostics under `runs/<suite>-<iso-timestamp>/`.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::debug;

use crate::errors::ZentestError;
use crate::runner::SuiteReport;

const RUNS_DIR: &str = "runs";
const KEEP_RUNS_PER_SUITE: usize = 10;

/// Write results.json, error.txt and failure screenshots for a run, then
/// prune old runs of the same suite.
pub async fn write_run_artifacts(
    suite: &str,
    report: &SuiteReport,
) -> Result<PathBuf, ZentestError> {
    let stamp = Utc::now().format("%Y-%m-%dT%H-%M-%SZ");
    let dir = Path::new(RUNS_DIR).join(format!("{}-{}", suite, stamp));
    tokio::fs::create_dir_all(&dir).await?;

    let results = serde_json::to_string_pretty(report)?;
    tokio::fs::write(dir.join("results.json"), results).await?;

    if let Some(first_failure) = report.outcomes.iter().find(|o| !o.passed) {
        let error = format!("{}: {}\n", first_failure.name, first_failure.reason);
        tokio::fs::write(dir.join("error.txt"), error).await?;
    }

    for (test_name, png) in &report.failure_screenshots {
        let file = dir.join(format!("{}.png", sanitize(test_name)));
        tokio::fs::write(file, png).await?;
    }

    prune_old_runs(suite, KEEP_RUNS_PER_SUITE).await?;
    Ok(dir)
}

/// Remove the oldest run directories beyond `keep` for a suite.
pub async fn prune_old_runs(suite: &str, keep: usize) -> Result<(), ZentestError> {
    let prefix = format!("{}-", suite);
    let mut entries = match tokio::fs::read_dir(RUNS_DIR).await {
        Ok(entries) => entries,
        Err(_) => return Ok(()),
    };

    let mut runs: Vec<PathBuf> = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if path.is_dir() && name.starts_with(&prefix) {
            runs.push(path);
        }
    }

    // Timestamped names sort chronologically.
    runs.sort();
    if runs.len() <= keep {
        return Ok(());
    }
    let excess = runs.len() - keep;
    for path in runs.into_iter().take(excess) {
        debug!(path = %path.display(), "pruning old run");
        tokio::fs::remove_dir_all(path).await?;
    }
    Ok(())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_keeps_kebab_names() {
        assert_eq!(sanitize("user-save"), "user-save");
        assert_eq!(sanitize("weird name/slash"), "weird_name_slash");
    }
}
