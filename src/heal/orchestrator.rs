//! Tiered recovery after a static run fails: deterministic partial replay
//! with agentic continuation, then a model rewrite of the failing test,
//! then full agentic re-derivation. The first tier to produce a verified
//! pass wins; every tier leaves the on-disk artifacts consistent.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::agent::TestRun;
use crate::browser::PageError;
use crate::errors::ZentestError;
use crate::llm::TokenUsage;
use crate::script::{RecordedStep, ReplayError, ScriptBuilder, SuiteSidecar};
use crate::suite::{Test, TestSuite};

use super::rewriter::{find_test_body, splice_test_body, RewriteDecision, Rewriter};
use super::static_runner::{StaticFailure, StaticRunner};

/// Which tier produced the verified pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealTier {
    PartialReplay,
    Rewrite,
    Agentic,
}

impl HealTier {
    pub fn describe(&self) -> &'static str {
        match self {
            HealTier::PartialReplay => "partial replay",
            HealTier::Rewrite => "rewrite",
            HealTier::Agentic => "agentic re-derivation",
        }
    }
}

#[derive(Debug)]
pub struct HealOutcome {
    pub healed: bool,
    pub tier: Option<HealTier>,
    pub detail: String,
    pub usage: TokenUsage,
}

/// Sidecar/suite drift state, checked before trusting a saved script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drift {
    InSync,
    /// The sidecar covers only the first `covered_prefix` suite tests.
    OutOfDate { covered_prefix: usize },
}

/// How many leading suite tests the sidecar covers; any uncovered test
/// makes the saved script out-of-date.
pub fn detect_drift(suite: &TestSuite, sidecar: &SuiteSidecar) -> Drift {
    let covered_prefix = suite
        .tests
        .iter()
        .take_while(|test| sidecar.contains(&test.name))
        .count();
    if covered_prefix == suite.tests.len() {
        Drift::InSync
    } else {
        Drift::OutOfDate { covered_prefix }
    }
}

/// The live-browser operations the orchestrator needs; the runner provides
/// the real page-backed implementation, tests provide fakes.
#[async_trait]
pub trait AgenticBackend: Send + Sync {
    /// Navigate the shared page to the base URL and let it settle.
    async fn reset(&self) -> Result<(), PageError>;

    /// Fast-forward recorded steps on the shared page.
    async fn replay(&self, steps: &[RecordedStep]) -> Result<(), ReplayError>;

    /// Run tests agentically on the shared page, stopping at the first
    /// failure. When `skip_navigation_first` the first test resumes from
    /// the page's current state.
    async fn derive(&self, tests: &[Test], skip_navigation_first: bool) -> Vec<TestRun>;
}

pub struct HealingOrchestrator<'a> {
    suite: &'a TestSuite,
    script_path: &'a Path,
    sidecar_path: &'a Path,
    base_url: String,
    builder: ScriptBuilder,
    static_runner: &'a StaticRunner,
    rewriter: Rewriter,
    backend: &'a dyn AgenticBackend,
    max_rewrite_attempts: u32,
}

impl<'a> HealingOrchestrator<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        suite: &'a TestSuite,
        script_path: &'a Path,
        sidecar_path: &'a Path,
        base_url: impl Into<String>,
        static_runner: &'a StaticRunner,
        rewriter: Rewriter,
        backend: &'a dyn AgenticBackend,
    ) -> Self {
        let base_url = base_url.into();
        Self {
            suite,
            script_path,
            sidecar_path,
            builder: ScriptBuilder::new(base_url.clone()),
            base_url,
            static_runner,
            rewriter,
            backend,
            max_rewrite_attempts: 3,
        }
    }

    /// Run the tiers in order; the first verified pass wins.
    pub async fn heal(&self, failure: &StaticFailure) -> Result<HealOutcome, ZentestError> {
        let mut usage = TokenUsage::default();

        info!(test = %failure.test_name, "healing: trying partial replay");
        match self.partial_replay(failure, &mut usage).await {
            Ok(true) => {
                return Ok(self.healed(HealTier::PartialReplay, usage));
            }
            Ok(false) => {}
            Err(err) => warn!(error = %err, "partial replay tier errored"),
        }

        info!(test = %failure.test_name, "healing: trying rewrite");
        match self.rewrite(failure, &mut usage).await {
            Ok(true) => return Ok(self.healed(HealTier::Rewrite, usage)),
            Ok(false) => {}
            Err(err) => warn!(error = %err, "rewrite tier errored"),
        }

        info!("healing: full agentic re-derivation");
        if self.full_agentic(&mut usage).await? {
            return Ok(self.healed(HealTier::Agentic, usage));
        }

        Ok(HealOutcome {
            healed: false,
            tier: None,
            detail: format!("all healing tiers failed for '{}'", failure.test_name),
            usage,
        })
    }

    fn healed(&self, tier: HealTier, usage: TokenUsage) -> HealOutcome {
        HealOutcome {
            healed: true,
            tier: Some(tier),
            detail: format!("healed by {}", tier.describe()),
            usage,
        }
    }

    /// Tier 1: replay every test before the failing one from the sidecar,
    /// resume agentically from the failure, rebuild and verify.
    async fn partial_replay(
        &self,
        failure: &StaticFailure,
        usage: &mut TokenUsage,
    ) -> Result<bool, ZentestError> {
        let Some(failing_index) = self.suite.position(&failure.test_name) else {
            return Ok(false);
        };
        if !self.sidecar_path.exists() {
            return Ok(false);
        }
        let sidecar = SuiteSidecar::load(self.sidecar_path).await?;

        let prefix = &self.suite.tests[..failing_index];
        if prefix.iter().any(|test| !sidecar.contains(&test.name)) {
            return Ok(false);
        }

        if let Err(err) = self.backend.reset().await {
            warn!(error = %err, "reset before replay failed");
            return Ok(false);
        }
        for test in prefix {
            let steps = &sidecar.test(&test.name).expect("covered prefix").steps;
            if let Err(err) = self.backend.replay(steps).await {
                warn!(test = %test.name, error = %err, "replay threw, abandoning tier");
                return Ok(false);
            }
        }

        let remaining = &self.suite.tests[failing_index..];
        let runs = self.backend.derive(remaining, true).await;
        for run in &runs {
            *usage += run.usage;
        }
        if runs.len() < remaining.len() || runs.iter().any(|run| !run.success) {
            return Ok(false);
        }

        let mut tests: Vec<(String, Vec<RecordedStep>)> = prefix
            .iter()
            .map(|test| {
                let steps = sidecar.test(&test.name).expect("covered prefix").steps.clone();
                (test.name.clone(), steps)
            })
            .collect();
        tests.extend(
            remaining
                .iter()
                .zip(runs)
                .map(|(test, run)| (test.name.clone(), run.steps)),
        );

        self.commit_and_verify(&tests).await
    }

    /// Tier 2: model-rewrite the failing test in place, re-running the
    /// script after each splice. The sidecar is left untouched.
    async fn rewrite(
        &self,
        failure: &StaticFailure,
        usage: &mut TokenUsage,
    ) -> Result<bool, ZentestError> {
        if failure.test_name.is_empty() {
            return Ok(false);
        }
        let original_script = tokio::fs::read_to_string(self.script_path).await?;
        let mut current_failure = failure.clone();

        for attempt in 1..=self.max_rewrite_attempts {
            let script = tokio::fs::read_to_string(self.script_path).await?;
            let Some(body_range) = find_test_body(&script, &current_failure.test_name) else {
                warn!(test = %current_failure.test_name, "failing test not found in script");
                break;
            };
            let test_block = script[body_range].trim_end().to_string();

            let screenshot = match &current_failure.screenshot_path {
                Some(path) => tokio::fs::read(path).await.ok(),
                None => None,
            };

            let decision = match self
                .rewriter
                .propose(
                    &current_failure.test_name,
                    &test_block,
                    &script,
                    &current_failure.message,
                    current_failure.stack.as_deref(),
                    screenshot,
                    usage,
                )
                .await
            {
                Ok(decision) => decision,
                Err(err) => {
                    warn!(attempt, error = %err, "rewrite call failed");
                    break;
                }
            };

            let new_body = match decision {
                RewriteDecision::Agentic { reasoning } => {
                    info!(reasoning = %reasoning, "rewriter escalated to agentic");
                    break;
                }
                RewriteDecision::Rewrite {
                    reasoning,
                    new_test_body,
                } => {
                    info!(attempt, reasoning = %reasoning, "applying rewrite");
                    new_test_body
                }
            };

            let Some(spliced) = splice_test_body(&script, &current_failure.test_name, &new_body)
            else {
                break;
            };
            tokio::fs::write(self.script_path, &spliced).await?;

            let outcome = self
                .static_runner
                .run(self.script_path, &self.base_url)
                .await?;
            if outcome.passed {
                return Ok(true);
            }
            match outcome.failure {
                Some(next) if !next.test_name.is_empty() => current_failure = next,
                _ => break,
            }
        }

        // Not healed: put the script back the way we found it.
        tokio::fs::write(self.script_path, original_script).await?;
        Ok(false)
    }

    /// Tier 3: rerun the whole suite agentically from a fresh navigation.
    async fn full_agentic(&self, usage: &mut TokenUsage) -> Result<bool, ZentestError> {
        let runs = self.backend.derive(&self.suite.tests, false).await;
        for run in &runs {
            *usage += run.usage;
        }
        if runs.len() < self.suite.tests.len() || runs.iter().any(|run| !run.success) {
            return Ok(false);
        }

        let tests: Vec<(String, Vec<RecordedStep>)> = self
            .suite
            .tests
            .iter()
            .zip(runs)
            .map(|(test, run)| (test.name.clone(), run.steps))
            .collect();

        self.commit_and_verify(&tests).await
    }

    /// Write the rebuilt script + sidecar, verify with the static runner,
    /// and roll both back if verification fails.
    async fn commit_and_verify(
        &self,
        tests: &[(String, Vec<RecordedStep>)],
    ) -> Result<bool, ZentestError> {
        let previous_script = tokio::fs::read_to_string(self.script_path).await.ok();
        let previous_sidecar = tokio::fs::read_to_string(self.sidecar_path).await.ok();

        let built = self.builder.build(&self.suite.name, tests);
        tokio::fs::write(self.script_path, &built.code).await?;
        built.sidecar.save(self.sidecar_path).await?;

        let outcome = self
            .static_runner
            .run(self.script_path, &self.base_url)
            .await?;
        if outcome.passed {
            return Ok(true);
        }

        warn!("verification run failed, restoring previous artifacts");
        match previous_script {
            Some(content) => tokio::fs::write(self.script_path, content).await?,
            None => {
                let _ = tokio::fs::remove_file(self.script_path).await;
            }
        }
        match previous_sidecar {
            Some(content) => tokio::fs::write(self.sidecar_path, content).await?,
            None => {
                let _ = tokio::fs::remove_file(self.sidecar_path).await;
            }
        }
        Ok(false)
    }
}
