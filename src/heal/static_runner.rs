//! Launches the external script runner and parses its JSON report.
//!
//! stdout/stderr are inherited so the user sees the runner's own output;
//! the structured report goes to a temp file named by PID and timestamp.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::errors::ZentestError;

const DEFAULT_RUNNER: &str = "npx playwright test";

/// First failing test extracted from the runner report.
#[derive(Debug, Clone)]
pub struct StaticFailure {
    pub test_name: String,
    pub message: String,
    pub stack: Option<String>,
    pub screenshot_path: Option<PathBuf>,
}

/// Outcome of one static run.
#[derive(Debug, Clone)]
pub struct StaticRunOutcome {
    pub passed: bool,
    pub failure: Option<StaticFailure>,
}

pub struct StaticRunner {
    program: String,
    args: Vec<String>,
}

impl StaticRunner {
    /// Build from the configured command line (default `npx playwright test`),
    /// verifying the program exists up front.
    pub fn from_command(command: Option<&str>) -> Result<Self, ZentestError> {
        let command = command.unwrap_or(DEFAULT_RUNNER);
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| ZentestError::StaticRunnerMissing("empty runner command".into()))?;
        which::which(&program)
            .map_err(|_| ZentestError::StaticRunnerMissing(program.clone()))?;
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }

    /// Run the script; non-zero exit yields the first failure from the
    /// report.
    pub async fn run(
        &self,
        script_path: &Path,
        base_url: &str,
    ) -> Result<StaticRunOutcome, ZentestError> {
        let report_path = std::env::temp_dir().join(format!(
            "zentest-report-{}-{}.json",
            std::process::id(),
            Utc::now().timestamp_millis()
        ));

        info!(script = %script_path.display(), "running static script");
        let status = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .arg(script_path)
            .arg("--reporter=json")
            .env("ZENTEST_BASE_URL", base_url)
            .env("PLAYWRIGHT_JSON_OUTPUT_NAME", &report_path)
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await?;

        let report = match tokio::fs::read_to_string(&report_path).await {
            Ok(raw) => serde_json::from_str::<Report>(&raw).ok(),
            Err(err) => {
                debug!(error = %err, "no structured report produced");
                None
            }
        };
        let _ = tokio::fs::remove_file(&report_path).await;

        if status.success() {
            return Ok(StaticRunOutcome {
                passed: true,
                failure: None,
            });
        }

        let failure = report.as_ref().and_then(Report::first_failure);
        if failure.is_none() {
            warn!("static run failed but no failure could be extracted from the report");
        }
        Ok(StaticRunOutcome {
            passed: false,
            failure: failure.or_else(|| {
                Some(StaticFailure {
                    test_name: String::new(),
                    message: format!("static runner exited with {}", status),
                    stack: None,
                    screenshot_path: None,
                })
            }),
        })
    }
}

// Minimal slice of the Playwright JSON report shape.
#[derive(Debug, Deserialize)]
struct Report {
    #[serde(default)]
    suites: Vec<Suite>,
}

#[derive(Debug, Deserialize)]
struct Suite {
    #[serde(default)]
    specs: Vec<Spec>,
    #[serde(default)]
    suites: Vec<Suite>,
}

#[derive(Debug, Deserialize)]
struct Spec {
    title: String,
    #[serde(default)]
    tests: Vec<SpecTest>,
}

#[derive(Debug, Deserialize)]
struct SpecTest {
    #[serde(default)]
    results: Vec<SpecResult>,
}

#[derive(Debug, Deserialize)]
struct SpecResult {
    #[serde(default)]
    status: String,
    #[serde(default)]
    error: Option<SpecError>,
    #[serde(default)]
    attachments: Vec<Attachment>,
}

#[derive(Debug, Deserialize)]
struct SpecError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    stack: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Attachment {
    #[serde(default)]
    name: String,
    #[serde(default)]
    path: Option<PathBuf>,
}

impl Report {
    fn first_failure(&self) -> Option<StaticFailure> {
        fn walk(suites: &[Suite]) -> Option<StaticFailure> {
            for suite in suites {
                for spec in &suite.specs {
                    for test in &spec.tests {
                        for result in &test.results {
                            if result.status == "failed" || result.status == "timedOut" {
                                let screenshot_path = result
                                    .attachments
                                    .iter()
                                    .find(|a| a.name == "screenshot")
                                    .and_then(|a| a.path.clone());
                                return Some(StaticFailure {
                                    test_name: spec.title.clone(),
                                    message: result
                                        .error
                                        .as_ref()
                                        .map(|e| e.message.clone())
                                        .unwrap_or_else(|| "test failed".to_string()),
                                    stack: result.error.as_ref().and_then(|e| e.stack.clone()),
                                    screenshot_path,
                                });
                            }
                        }
                    }
                }
                if let Some(failure) = walk(&suite.suites) {
                    return Some(failure);
                }
            }
            None
        }
        walk(&self.suites)
    }
}
