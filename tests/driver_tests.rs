//! Driver state-machine scenarios against a mock page and scripted model.

mod common;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use common::{MockPage, ScriptedModel};
use zentest::agent::{AgenticDriver, DriverOptions};
use zentest::browser::{ElementInfo, Executor, Locator};
use zentest::config::Viewport;
use zentest::suite::Test;

fn options(max_steps: u32) -> DriverOptions {
    DriverOptions {
        max_steps,
        viewport: Viewport::default(),
        retry_no_response: 2,
        skip_navigation: false,
        verbose: false,
    }
}

fn driver(
    page: Arc<MockPage>,
    model: Arc<ScriptedModel>,
    opts: DriverOptions,
) -> AgenticDriver {
    let executor = Executor::new(page).with_settle_jitter(0, 0);
    AgenticDriver::new(
        executor,
        model,
        "http://localhost:3000",
        opts,
        CancellationToken::new(),
    )
}

fn login_test() -> Test {
    Test {
        name: "login".to_string(),
        description: "log in with foo@example.com / hunter2".to_string(),
    }
}

#[tokio::test]
async fn happy_path_records_batch_then_asserts_and_finishes() {
    let page = Arc::new(
        MockPage::new()
            .with_text("Welcome back!")
            .with_locator(&Locator::Label("Email".to_string()), 1)
            .with_locator(&Locator::Label("Password".to_string()), 1)
            .with_locator(
                &Locator::Role {
                    role: "button".to_string(),
                    name: "Sign In".to_string(),
                    exact: true,
                },
                1,
            )
            .with_info_at_point(ElementInfo {
                tag: "button".to_string(),
                text: Some("Sign In".to_string()),
                ..Default::default()
            }),
    );
    let model = Arc::new(ScriptedModel::new(&[
        r#"{"actions": [
            {"type": "select_input", "field": "Email", "value": "foo@example.com"},
            {"type": "select_input", "field": "Password", "value": "hunter2"},
            {"type": "click_button", "name": "Sign In"}
        ], "reasoning": "fill the form and submit"}"#,
        r#"{"actions": [
            {"type": "assert_text", "text": "Welcome"},
            {"type": "done", "success": true, "reason": "logged in and verified"}
        ], "reasoning": "welcome message confirms login"}"#,
    ]));

    let run = driver(page.clone(), model.clone(), options(50))
        .run_test(&login_test())
        .await;

    assert!(run.success, "reason: {}", run.reason);
    assert_eq!(run.reason, "logged in and verified");
    assert_eq!(run.steps.len(), 4);
    assert!(run.steps.iter().all(|s| s.error.is_none()));
    // Two model calls, each with a screenshot attached.
    let requests = model.recorded_requests();
    assert_eq!(requests.len(), 2);
    assert!(requests.iter().all(|r| r.image_png.is_some()));
    assert!(run.usage.total() > 0);

    // Navigation happened once, before the loop.
    let calls = page.recorded_calls();
    assert_eq!(calls.iter().filter(|c| c.starts_with("goto:")).count(), 1);
    // Successful semantic click carries element info.
    let click_step = &run.steps[2];
    assert!(click_step.element_info.is_some());
}

#[tokio::test]
async fn skip_navigation_reuses_page_state() {
    let page = Arc::new(MockPage::new());
    let model = Arc::new(ScriptedModel::new(&[
        r#"{"actions": [{"type": "done", "success": true, "reason": "nothing to do"}], "reasoning": "r"}"#,
    ]));
    let mut opts = options(50);
    opts.skip_navigation = true;

    let run = driver(page.clone(), model, opts).run_test(&login_test()).await;
    assert!(run.success);
    assert!(page
        .recorded_calls()
        .iter()
        .all(|call| !call.starts_with("goto:")));
}

#[tokio::test]
async fn zero_max_steps_fails_immediately_with_no_model_calls() {
    let page = Arc::new(MockPage::new());
    let model = Arc::new(ScriptedModel::new(&[]));

    let run = driver(page, model.clone(), options(0))
        .run_test(&login_test())
        .await;

    assert!(!run.success);
    assert_eq!(run.reason, "Max steps reached");
    assert!(run.steps.is_empty());
    assert!(model.recorded_requests().is_empty());
}

#[tokio::test]
async fn repeated_identical_click_terminates_without_progress() {
    let page = Arc::new(MockPage::new());
    // The scripted model repeats its last reply forever.
    let model = Arc::new(ScriptedModel::new(&[
        r#"{"actions": [{"type": "click", "x": 400, "y": 300}], "reasoning": "try the button"}"#,
    ]));

    let run = driver(page, model, options(50)).run_test(&login_test()).await;

    assert!(!run.success);
    assert_eq!(run.reason, "Repeated same action without progress");
    // Two executions recorded; the third identical action trips the guard.
    assert_eq!(run.steps.len(), 2);
}

#[tokio::test]
async fn unusable_replies_are_retried_with_corrective_feedback() {
    let page = Arc::new(MockPage::new());
    let model = Arc::new(ScriptedModel::new(&[
        "sure! I clicked it for you.",
        r#"{"actions": [{"type": "done", "success": true, "reason": "ok"}], "reasoning": "r"}"#,
    ]));

    let run = driver(page, model.clone(), options(50))
        .run_test(&login_test())
        .await;

    assert!(run.success);
    let requests = model.recorded_requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[1].user_text.contains("could not be used"));
}

#[tokio::test]
async fn retry_budget_exhaustion_surfaces_the_parse_failure() {
    let page = Arc::new(MockPage::new());
    let model = Arc::new(ScriptedModel::new(&["not json at all"]));

    let run = driver(page, model.clone(), options(50))
        .run_test(&login_test())
        .await;

    assert!(!run.success);
    assert!(
        run.reason.starts_with("Failed to parse"),
        "reason: {}",
        run.reason
    );
    // Initial call plus two corrective retries.
    assert_eq!(model.recorded_requests().len(), 3);
}

#[tokio::test]
async fn executor_failure_clears_batch_and_feeds_back() {
    let page = Arc::new(MockPage::new().with_text("Welcome"));
    // "Missing" button resolves to zero elements; the second batch action
    // must never run because the failure clears the batch.
    let model = Arc::new(ScriptedModel::new(&[
        r#"{"actions": [
            {"type": "click_button", "name": "Missing"},
            {"type": "assert_text", "text": "Welcome"}
        ], "reasoning": "submit"}"#,
        r#"{"actions": [{"type": "done", "success": false, "reason": "button is gone"}], "reasoning": "r"}"#,
    ]));

    let run = driver(page.clone(), model.clone(), options(50))
        .run_test(&login_test())
        .await;

    assert!(!run.success);
    assert_eq!(run.reason, "button is gone");
    // Only the failing click was recorded; the queued assert was dropped.
    assert_eq!(run.steps.len(), 1);
    assert!(run.steps[0].error.is_some());

    let requests = model.recorded_requests();
    assert!(requests[1]
        .user_text
        .starts_with("Last instruction failed: click button \"Missing\""));
}

#[tokio::test]
async fn provider_errors_become_a_failed_done() {
    let page = Arc::new(MockPage::new());
    let model = Arc::new(ScriptedModel::always_failing("upstream exploded"));

    let run = driver(page, model, options(50)).run_test(&login_test()).await;

    assert!(!run.success);
    assert!(
        run.reason.starts_with("Provider error:"),
        "reason: {}",
        run.reason
    );
    assert!(run.steps.is_empty());
}

#[tokio::test]
async fn cancellation_short_circuits_with_no_steps() {
    let page = Arc::new(MockPage::new());
    let model = Arc::new(ScriptedModel::new(&[]));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let executor = Executor::new(page).with_settle_jitter(0, 0);
    let run = AgenticDriver::new(
        executor,
        model.clone(),
        "http://localhost:3000",
        options(50),
        cancel,
    )
    .run_test(&login_test())
    .await;

    assert!(!run.success);
    assert_eq!(run.reason, "Cancelled");
    assert!(run.steps.is_empty());
    assert!(model.recorded_requests().is_empty());
}

#[tokio::test]
async fn batch_with_trailing_actions_after_done_is_truncated() {
    let page = Arc::new(MockPage::new().with_text("Welcome"));
    let model = Arc::new(ScriptedModel::new(&[
        r#"{"actions": [
            {"type": "assert_text", "text": "Welcome"},
            {"type": "done", "success": true, "reason": "verified"},
            {"type": "click", "x": 1, "y": 1}
        ], "reasoning": "r"}"#,
    ]));

    let run = driver(page, model, options(50)).run_test(&login_test()).await;

    assert!(run.success);
    // Only the assert ran; the click after done was discarded.
    assert_eq!(run.steps.len(), 1);
}

#[tokio::test]
async fn premature_success_done_is_dropped_and_work_continues() {
    let page = Arc::new(MockPage::new().with_text("Welcome"));
    let model = Arc::new(ScriptedModel::new(&[
        r#"{"actions": [
            {"type": "assert_text", "text": "Welcome"},
            {"type": "done", "success": true, "reason": "done"}
        ], "reasoning": "I still need to submit the form after this"}"#,
        r#"{"actions": [{"type": "done", "success": true, "reason": "actually finished"}], "reasoning": "all good"}"#,
    ]));

    let run = driver(page, model.clone(), options(50))
        .run_test(&login_test())
        .await;

    assert!(run.success);
    assert_eq!(run.reason, "actually finished");
    assert_eq!(model.recorded_requests().len(), 2);
}
