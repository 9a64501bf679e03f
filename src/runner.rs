//! Suite runner: decides between static replay and agentic derivation,
//! routes failures into healing, and owns the shared browser page.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::agent::{AgenticDriver, DriverOptions, TestRun};
use crate::artifacts;
use crate::browser::cdp::CdpBrowser;
use crate::browser::{Executor, Page, PageError};
use crate::config::Config;
use crate::errors::ZentestError;
use crate::heal::{
    detect_drift, AgenticBackend, Drift, HealTier, HealingOrchestrator, Rewriter, StaticFailure,
    StaticRunner,
};
use crate::llm::{build_client, ModelClient, ModelRole, TokenUsage};
use crate::script::{RecordedStep, ReplayError, ScriptBuilder, ScriptReplayer, SuiteSidecar};
use crate::suite::{Test, TestSuite};

const NETWORK_IDLE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Force re-derivation even when a script exists.
    pub force_agentic: bool,
    /// Route static failures into the healing pipeline.
    pub heal: bool,
    /// Named environment overriding the base URL.
    pub env: Option<String>,
    /// CLI override of the configured headless mode.
    pub headless_override: Option<bool>,
    pub verbose: bool,
}

/// One result line per test.
#[derive(Debug, Clone, Serialize)]
pub struct TestOutcome {
    pub name: String,
    pub passed: bool,
    pub reason: String,
    pub duration_ms: u64,
    pub action_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub healed_by: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SuiteReport {
    pub suite: String,
    pub outcomes: Vec<TestOutcome>,
    pub usage: TokenUsage,
    pub duration_ms: u64,
    /// Last screenshot of each failed test, for the run artifacts.
    #[serde(skip)]
    pub failure_screenshots: Vec<(String, Vec<u8>)>,
}

impl SuiteReport {
    pub fn all_passed(&self) -> bool {
        self.outcomes.iter().all(|outcome| outcome.passed)
    }
}

pub struct Runner {
    config: Config,
    options: RunOptions,
    cancel: CancellationToken,
}

impl Runner {
    pub fn new(config: Config, options: RunOptions, cancel: CancellationToken) -> Self {
        Self {
            config,
            options,
            cancel,
        }
    }

    /// Run one suite file end to end.
    pub async fn run_suite(&self, suite_path: &Path) -> Result<SuiteReport, ZentestError> {
        let started = Instant::now();
        let suite = TestSuite::load(suite_path).await?;
        if suite.is_empty() {
            info!(suite = %suite.name, "suite has no tests");
            return Ok(SuiteReport {
                suite: suite.name,
                outcomes: Vec::new(),
                usage: TokenUsage::default(),
                duration_ms: started.elapsed().as_millis() as u64,
                failure_screenshots: Vec::new(),
            });
        }

        let base_url = self.config.resolve_base_url(self.options.env.as_deref())?;
        let script_path = sibling(suite_path, "spec.ts");
        let sidecar_path = sibling(suite_path, "steps.json");

        let mut report = if !self.options.force_agentic
            && script_path.exists()
            && sidecar_path.exists()
        {
            self.run_recorded(&suite, &base_url, &script_path, &sidecar_path)
                .await?
        } else {
            if script_path.exists() && !sidecar_path.exists() {
                // A script without its sidecar cannot be replayed or healed.
                info!("script exists but sidecar is missing; running agentically");
            }
            self.run_agentic_suite(&suite, &base_url, &script_path, &sidecar_path, false, &[])
                .await?
        };

        report.duration_ms = started.elapsed().as_millis() as u64;
        if let Err(err) = artifacts::write_run_artifacts(&suite.name, &report).await {
            warn!(error = %err, "failed to write run artifacts");
        }
        Ok(report)
    }

    /// Static-first path: replay the saved script, healing on failure.
    async fn run_recorded(
        &self,
        suite: &TestSuite,
        base_url: &str,
        script_path: &Path,
        sidecar_path: &Path,
    ) -> Result<SuiteReport, ZentestError> {
        let sidecar = SuiteSidecar::load(sidecar_path).await?;

        if let Drift::OutOfDate { covered_prefix } = detect_drift(suite, &sidecar) {
            info!(
                covered_prefix,
                "sidecar out of date with suite; replaying prefix then continuing agentically"
            );
            let prefix_steps: Vec<(String, Vec<RecordedStep>)> = suite.tests[..covered_prefix]
                .iter()
                .map(|test| {
                    let steps = sidecar.test(&test.name).expect("covered").steps.clone();
                    (test.name.clone(), steps)
                })
                .collect();
            return self
                .run_agentic_suite(
                    suite,
                    base_url,
                    script_path,
                    sidecar_path,
                    true,
                    &prefix_steps,
                )
                .await;
        }

        let static_runner = StaticRunner::from_command(self.config.static_runner.as_deref())?;
        let outcome = static_runner.run(script_path, base_url).await?;
        if outcome.passed {
            return Ok(SuiteReport {
                suite: suite.name.clone(),
                outcomes: suite
                    .tests
                    .iter()
                    .map(|test| TestOutcome {
                        name: test.name.clone(),
                        passed: true,
                        reason: "static run passed".to_string(),
                        duration_ms: 0,
                        action_count: sidecar
                            .test(&test.name)
                            .map(|t| t.steps.len())
                            .unwrap_or(0),
                        healed_by: None,
                    })
                    .collect(),
                usage: TokenUsage::default(),
                duration_ms: 0,
                failure_screenshots: Vec::new(),
            });
        }

        let failure = outcome.failure.expect("non-passing run carries a failure");
        if !self.options.heal {
            return Ok(self.failed_report(suite, &failure, None, TokenUsage::default()));
        }

        info!(test = %failure.test_name, "static run failed; healing");
        let session = self.open_session(base_url).await?;
        let healer_model = build_client(&self.config, ModelRole::Healer)?;
        let rewriter = Rewriter::new(healer_model);
        let orchestrator = HealingOrchestrator::new(
            suite,
            script_path,
            sidecar_path,
            base_url,
            &static_runner,
            rewriter,
            &session,
        );
        let heal = orchestrator.heal(&failure).await?;
        session.close().await;

        if heal.healed {
            let tier = heal.tier.expect("healed outcome has a tier");
            return Ok(SuiteReport {
                suite: suite.name.clone(),
                outcomes: suite
                    .tests
                    .iter()
                    .map(|test| TestOutcome {
                        name: test.name.clone(),
                        passed: true,
                        reason: if test.name == failure.test_name {
                            heal.detail.clone()
                        } else {
                            "static run passed".to_string()
                        },
                        duration_ms: 0,
                        action_count: 0,
                        healed_by: (test.name == failure.test_name)
                            .then(|| tier.describe().to_string()),
                    })
                    .collect(),
                usage: heal.usage,
                duration_ms: 0,
                failure_screenshots: Vec::new(),
            });
        }

        Ok(self.failed_report(suite, &failure, Some(&heal.detail), heal.usage))
    }

    /// Agentic path: optionally replay a recorded prefix, then derive the
    /// remaining tests live, then persist script + sidecar for the
    /// successful prefix.
    async fn run_agentic_suite(
        &self,
        suite: &TestSuite,
        base_url: &str,
        script_path: &Path,
        sidecar_path: &Path,
        replay_prefix: bool,
        prefix_steps: &[(String, Vec<RecordedStep>)],
    ) -> Result<SuiteReport, ZentestError> {
        let session = self.open_session(base_url).await?;

        let mut outcomes: Vec<TestOutcome> = Vec::new();
        let mut usage = TokenUsage::default();
        let mut recorded: Vec<(String, Vec<RecordedStep>)> = Vec::new();
        let mut start_index = 0usize;
        let mut skip_navigation_first = false;

        if replay_prefix && !prefix_steps.is_empty() {
            match self.replay_prefix(&session, prefix_steps).await {
                Ok(()) => {
                    for (name, steps) in prefix_steps {
                        outcomes.push(TestOutcome {
                            name: name.clone(),
                            passed: true,
                            reason: "replayed from recording".to_string(),
                            duration_ms: 0,
                            action_count: steps.len(),
                            healed_by: None,
                        });
                        recorded.push((name.clone(), steps.clone()));
                    }
                    start_index = prefix_steps.len();
                    skip_navigation_first = true;
                }
                Err(err) => {
                    warn!(error = %err, "prefix replay failed; re-deriving from scratch");
                }
            }
        }

        let remaining = &suite.tests[start_index..];
        let runs = session.derive(remaining, skip_navigation_first).await;
        session.close().await;

        let mut failure_screenshots: Vec<(String, Vec<u8>)> = Vec::new();
        for (test, run) in remaining.iter().zip(&runs) {
            usage += run.usage;
            if run.success {
                recorded.push((test.name.clone(), run.steps.clone()));
            } else if let Some(png) = run
                .steps
                .iter()
                .rev()
                .find_map(|step| step.screenshot.clone())
            {
                failure_screenshots.push((test.name.clone(), png));
            }
            outcomes.push(TestOutcome {
                name: test.name.clone(),
                passed: run.success,
                reason: run.reason.clone(),
                duration_ms: run.duration.as_millis() as u64,
                action_count: run.steps.len(),
                healed_by: None,
            });
        }
        // Tests after the first failure never ran.
        for test in remaining.iter().skip(runs.len()) {
            outcomes.push(TestOutcome {
                name: test.name.clone(),
                passed: false,
                reason: "not run: earlier test failed".to_string(),
                duration_ms: 0,
                action_count: 0,
                healed_by: None,
            });
        }

        if !recorded.is_empty() {
            let builder = ScriptBuilder::new(base_url);
            let built = builder.build(&suite.name, &recorded);
            tokio::fs::write(script_path, &built.code).await?;
            built.sidecar.save(sidecar_path).await?;
            info!(
                script = %script_path.display(),
                tests = recorded.len(),
                "wrote script and sidecar"
            );
        }

        Ok(SuiteReport {
            suite: suite.name.clone(),
            outcomes,
            usage,
            duration_ms: 0,
            failure_screenshots,
        })
    }

    async fn replay_prefix(
        &self,
        session: &BrowserSession,
        prefix_steps: &[(String, Vec<RecordedStep>)],
    ) -> Result<(), ReplayError> {
        if let Err(err) = session.reset().await {
            warn!(error = %err, "reset before prefix replay failed");
            return Err(ReplayError::Step {
                index: 0,
                action: "navigate".to_string(),
                source: err,
            });
        }
        for (name, steps) in prefix_steps {
            info!(test = %name, "replaying recorded steps");
            session.replay(steps).await?;
        }
        Ok(())
    }

    fn failed_report(
        &self,
        suite: &TestSuite,
        failure: &StaticFailure,
        heal_detail: Option<&str>,
        usage: TokenUsage,
    ) -> SuiteReport {
        let failing_index = suite
            .position(&failure.test_name)
            .unwrap_or(suite.tests.len().saturating_sub(1));
        let outcomes = suite
            .tests
            .iter()
            .enumerate()
            .map(|(index, test)| {
                let (passed, reason) = if index < failing_index {
                    (true, "static run passed".to_string())
                } else if index == failing_index {
                    let mut reason = failure.message.clone();
                    if let Some(detail) = heal_detail {
                        reason = format!("{} ({})", reason, detail);
                    }
                    (false, reason)
                } else {
                    (false, "not run: earlier test failed".to_string())
                };
                TestOutcome {
                    name: test.name.clone(),
                    passed,
                    reason,
                    duration_ms: 0,
                    action_count: 0,
                    healed_by: None,
                }
            })
            .collect();

        SuiteReport {
            suite: suite.name.clone(),
            outcomes,
            usage,
            duration_ms: 0,
            failure_screenshots: Vec::new(),
        }
    }

    async fn open_session(&self, base_url: &str) -> Result<BrowserSession, ZentestError> {
        let headless = self
            .options
            .headless_override
            .unwrap_or_else(|| self.config.headless.resolved());
        let browser = CdpBrowser::launch(headless, self.config.viewport)
            .await
            .map_err(|err| ZentestError::Config(format!("browser launch failed: {}", err)))?;
        let page = browser
            .new_page(self.config.viewport)
            .await
            .map_err(|err| ZentestError::Config(format!("page open failed: {}", err)))?;
        let model = build_client(&self.config, ModelRole::Agentic)?;

        Ok(BrowserSession {
            browser: Some(browser),
            page: Arc::new(page),
            model,
            base_url: base_url.to_string(),
            driver_options: DriverOptions {
                max_steps: self.config.max_steps,
                viewport: self.config.viewport,
                retry_no_response: 2,
                skip_navigation: false,
                verbose: self.options.verbose,
            },
            cancel: self.cancel.clone(),
        })
    }
}

fn sibling(suite_path: &Path, extension: &str) -> PathBuf {
    let stem = suite_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("suite");
    suite_path.with_file_name(format!("{}.{}", stem, extension))
}

/// A live browser page plus the pieces needed to drive it; implements the
/// healing backend so the orchestrator can replay and re-derive on the
/// same session.
pub struct BrowserSession {
    browser: Option<CdpBrowser>,
    page: Arc<dyn Page>,
    model: Arc<dyn ModelClient>,
    base_url: String,
    driver_options: DriverOptions,
    cancel: CancellationToken,
}

impl BrowserSession {
    pub async fn close(mut self) {
        if let Some(browser) = self.browser.take() {
            browser.close().await;
        }
    }
}

#[async_trait]
impl AgenticBackend for BrowserSession {
    async fn reset(&self) -> Result<(), PageError> {
        self.page.goto(&self.base_url).await?;
        self.page.wait_for_network_idle(NETWORK_IDLE_TIMEOUT).await;
        Ok(())
    }

    async fn replay(&self, steps: &[RecordedStep]) -> Result<(), ReplayError> {
        ScriptReplayer::new(self.page.as_ref()).replay(steps).await
    }

    async fn derive(&self, tests: &[Test], skip_navigation_first: bool) -> Vec<TestRun> {
        let mut runs = Vec::with_capacity(tests.len());
        for (index, test) in tests.iter().enumerate() {
            let mut options = self.driver_options.clone();
            options.skip_navigation = if index == 0 {
                skip_navigation_first
            } else {
                true
            };
            let driver = AgenticDriver::new(
                Executor::new(self.page.clone()),
                self.model.clone(),
                self.base_url.clone(),
                options,
                self.cancel.clone(),
            );
            let run = driver.run_test(test).await;
            let failed = !run.success;
            runs.push(run);
            if failed {
                break;
            }
        }
        runs
    }
}
