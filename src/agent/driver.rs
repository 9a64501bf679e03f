//! The agentic driver: a state machine over `(pending batch, last failure,
//! history)` that drives the page toward a test description.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::actions::Action;
use crate::browser::Executor;
use crate::config::Viewport;
use crate::llm::{ModelClient, ModelRequest, TokenUsage};
use crate::script::sidecar::{RecordedStep, StepMode};
use crate::suite::Test;

use super::parse::{self, ModelBatch};
use super::prompt;

/// How many consecutive identical action signatures terminate the test.
const REPETITION_LIMIT: usize = 3;
/// Consecutive empty (fully trimmed) batches before giving up.
const MAX_EMPTY_BATCHES: u32 = 3;

const NETWORK_IDLE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct DriverOptions {
    pub max_steps: u32,
    pub viewport: Viewport,
    pub retry_no_response: u32,
    pub skip_navigation: bool,
    pub verbose: bool,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            max_steps: crate::config::DEFAULT_MAX_STEPS,
            viewport: Viewport::default(),
            retry_no_response: 2,
            skip_navigation: false,
            verbose: false,
        }
    }
}

/// Outcome of one agentic test run.
#[derive(Debug)]
pub struct TestRun {
    pub success: bool,
    pub reason: String,
    pub steps: Vec<RecordedStep>,
    pub usage: TokenUsage,
    pub duration: Duration,
}

struct LastFailure {
    feedback: String,
    screenshot: Option<Vec<u8>>,
}

/// Drives a single test to completion.
pub struct AgenticDriver {
    executor: Executor,
    model: Arc<dyn ModelClient>,
    base_url: String,
    options: DriverOptions,
    cancel: CancellationToken,
}

impl AgenticDriver {
    pub fn new(
        executor: Executor,
        model: Arc<dyn ModelClient>,
        base_url: impl Into<String>,
        options: DriverOptions,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            executor,
            model,
            base_url: base_url.into(),
            options,
            cancel,
        }
    }

    /// Run one test description to a terminal state.
    pub async fn run_test(&self, test: &Test) -> TestRun {
        let started = Instant::now();
        let mut steps: Vec<RecordedStep> = Vec::new();
        let mut usage = TokenUsage::default();
        let mut pending: VecDeque<Action> = VecDeque::new();
        let mut pending_reasoning = String::new();
        let mut last_failure: Option<LastFailure> = None;
        let mut empty_batches = 0u32;

        macro_rules! finish {
            ($success:expr, $reason:expr) => {
                return TestRun {
                    success: $success,
                    reason: $reason.into(),
                    steps,
                    usage,
                    duration: started.elapsed(),
                }
            };
        }

        if self.cancelled() {
            finish!(false, "Cancelled");
        }

        if !self.options.skip_navigation {
            let page = self.executor.page();
            if let Err(err) = page
                .set_viewport(self.options.viewport.width, self.options.viewport.height)
                .await
            {
                warn!(error = %err, "viewport setup failed");
            }
            if let Err(err) = page.goto(&self.base_url).await {
                finish!(false, format!("Navigation to {} failed: {}", self.base_url, err));
            }
            page.wait_for_network_idle(NETWORK_IDLE_TIMEOUT).await;
        }

        loop {
            if self.cancelled() {
                finish!(false, "Cancelled");
            }
            if steps.len() as u32 >= self.options.max_steps {
                finish!(false, "Max steps reached");
            }

            if pending.is_empty() {
                // Reuse the failure screenshot so the model sees the page
                // exactly as the failed action left it.
                let screenshot = match last_failure
                    .as_ref()
                    .and_then(|f| f.screenshot.clone())
                {
                    Some(png) => Some(png),
                    None => match self.executor.page().screenshot().await {
                        Ok(png) => Some(png),
                        Err(err) => {
                            warn!(error = %err, "screenshot for prompt failed");
                            None
                        }
                    },
                };
                let failure_text = last_failure.as_ref().map(|f| f.feedback.clone());

                let batch = match self
                    .request_batch(test, &steps, screenshot, failure_text.as_deref(), &mut usage)
                    .await
                {
                    Some(batch) => batch,
                    None => finish!(false, "Cancelled"),
                };

                let trimmed = parse::trim_batch(batch.actions, &batch.reasoning);
                if trimmed.is_empty() {
                    empty_batches += 1;
                    if empty_batches >= MAX_EMPTY_BATCHES {
                        finish!(false, "Model returned no executable actions");
                    }
                    continue;
                }
                empty_batches = 0;
                pending = trimmed.into();
                pending_reasoning = batch.reasoning;
            }

            let action = pending.pop_front().expect("non-empty batch");

            if let Action::Done { success, reason } = &action {
                info!(test = %test.name, success, "model signaled done");
                finish!(*success, reason.clone());
            }

            // Repetition guard: this action plus the preceding entries
            // forming three identical signatures means no progress.
            let signature = action.signature();
            let repeats = steps
                .iter()
                .rev()
                .take_while(|step| step.action.signature() == signature)
                .count();
            if repeats + 1 >= REPETITION_LIMIT {
                finish!(false, "Repeated same action without progress");
            }

            if self.cancelled() {
                finish!(false, "Cancelled");
            }

            debug!(test = %test.name, action = %action.describe(), "executing");
            let result = self.executor.execute(&action).await;

            let step = RecordedStep {
                action: result.action.clone(),
                reasoning: pending_reasoning.clone(),
                element_info: result.element_info.clone(),
                screenshot: result.screenshot.clone(),
                generated_code: None,
                error: result.error.as_ref().map(|e| e.to_string()),
                timestamp: result.timestamp,
                mode: StepMode::Agentic,
            };
            steps.push(step);

            match result.error {
                Some(error) => {
                    // Clear the batch: the model must see the actual
                    // post-failure state before issuing more actions.
                    if self.options.verbose {
                        info!(test = %test.name, error = %error, "action failed");
                    }
                    last_failure = Some(LastFailure {
                        feedback: format!("{}: {}", result.action.describe(), error),
                        screenshot: result.screenshot,
                    });
                    pending.clear();
                }
                None => {
                    last_failure = None;
                }
            }
        }
    }

    /// Ask the model for the next batch, retrying unusable replies with
    /// corrective feedback. `None` means cancelled.
    async fn request_batch(
        &self,
        test: &Test,
        steps: &[RecordedStep],
        screenshot: Option<Vec<u8>>,
        failure_text: Option<&str>,
        usage: &mut TokenUsage,
    ) -> Option<ModelBatch> {
        let history = prompt::history_summary(steps);
        let system = prompt::system_prompt(self.options.viewport, &history);
        let mut user_text = prompt::user_prompt(&test.description, failure_text);
        let mut retries = 0u32;

        loop {
            if self.cancelled() {
                return None;
            }

            let request = ModelRequest {
                system: system.clone(),
                user_text: user_text.clone(),
                image_png: screenshot.clone(),
            };

            let batch = match self.model.next(&request).await {
                Ok(reply) => {
                    if let Some(reply_usage) = reply.usage {
                        *usage += reply_usage;
                    }
                    parse::parse_model_batch(&reply.text)
                }
                Err(err) => {
                    return Some(ModelBatch {
                        actions: vec![Action::failed_done(format!(
                            "Provider error: {}",
                            err
                        ))],
                        reasoning: String::new(),
                    });
                }
            };

            if parse::is_no_response(&batch.actions) && retries < self.options.retry_no_response {
                retries += 1;
                let problem = match &batch.actions[0] {
                    Action::Done { reason, .. } => reason.clone(),
                    _ => "unusable reply".to_string(),
                };
                warn!(test = %test.name, retries, problem = %problem, "retrying model call");
                user_text = prompt::corrective_prompt(&test.description, &problem);
                continue;
            }

            return Some(batch);
        }
    }

    fn cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
