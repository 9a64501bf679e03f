//! Prompt construction for the agentic driver.
//!
//! `system_prompt` and `user_prompt` are pure functions of their inputs;
//! golden tests pin the text so prompt drift is a deliberate diff.

use crate::config::Viewport;
use crate::script::sidecar::RecordedStep;

const MAX_HISTORY_ENTRIES: usize = 10;

/// Fixed system template, parameterized by viewport and history summary.
pub fn system_prompt(viewport: Viewport, history_summary: &str) -> String {
    format!(
        r#"You are a browser automation agent executing one end-to-end test. You see a screenshot of the page ({width}x{height} viewport) and respond with the next action(s) as JSON.

## Response Format

Respond with ONLY a JSON object:
{{"actions": [ ... ], "reasoning": "one or two sentences"}}

## Available Actions

- {{"type": "click", "x": 400, "y": 300}} — click at viewport coordinates
- {{"type": "double_click", "x": 400, "y": 300}}
- {{"type": "mouse_move", "x": 400, "y": 300}}
- {{"type": "drag", "sx": 100, "sy": 100, "ex": 300, "ey": 300}}
- {{"type": "click_button", "name": "Sign In"}} — click a button by its accessible name
- {{"type": "click_text", "text": "Forgot password?"}} — click visible text
- {{"type": "select_input", "field": "Email", "value": "user@example.com"}} — fill a form field by label, placeholder, or name
- {{"type": "type", "text": "hello"}} — type into the focused element
- {{"type": "key", "combo": "Enter"}} — press a key or combo like "cmd+a"
- {{"type": "scroll", "x": 640, "y": 360, "direction": "down", "amount": 400}} — amount is pixels, at least 200
- {{"type": "wait", "ms": 1000}}
- {{"type": "assert_text", "text": "Welcome"}} — assert the page contains this text
- {{"type": "assert_not_text", "text": "Error"}} — assert the page does not contain this text
- {{"type": "assert_visible", "x": 400, "y": 300}} — assert something visible at this point
- {{"type": "done", "success": true, "reason": "what was accomplished"}} — terminal

## Rules

1. Prefer semantic targeting, in this order: click_button, then click_text, then select_input, and coordinate click only as a last resort.
2. Never use generic button names like "menu", "icon", or "more"; use the visible label or aria-label you can read in the screenshot.
3. Batch multiple actions ONLY when no intermediate screenshot is needed (filling several form fields, several assertions, an assertion followed by done). After anything that changes the page, stop the batch and wait for the next screenshot.
4. Before "done" with success: true, verify the outcome with at least one assertion.
5. Use "done" with success: false when the task is impossible; explain why in reason.

## Actions Taken So Far

{history}"#,
        width = viewport.width,
        height = viewport.height,
        history = if history_summary.is_empty() {
            "(none)"
        } else {
            history_summary
        },
    )
}

/// The user message accompanying the screenshot.
pub fn user_prompt(description: &str, failure_text: Option<&str>) -> String {
    match failure_text {
        Some(failure) => format!(
            "Last instruction failed: {}\n\nThe screenshot shows the page after the failure. Continue the test: {}",
            failure, description
        ),
        None => format!("Execute this test: {}", description),
    }
}

/// Corrective feedback sent when the model returned nothing usable.
pub fn corrective_prompt(description: &str, parse_problem: &str) -> String {
    format!(
        "Your previous reply could not be used ({}). Respond with ONLY a JSON object of the form {{\"actions\": [...], \"reasoning\": \"...\"}} using the documented action schemas. The test is: {}",
        parse_problem, description
    )
}

/// Truncated summary of the steps taken so far, oldest first.
pub fn history_summary(steps: &[RecordedStep]) -> String {
    let start = steps.len().saturating_sub(MAX_HISTORY_ENTRIES);
    let mut out = String::new();
    if start > 0 {
        out.push_str(&format!("({} earlier actions omitted)\n", start));
    }
    for (index, step) in steps.iter().enumerate().skip(start) {
        let status = match &step.error {
            Some(error) => format!("failed: {}", error),
            None => "ok".to_string(),
        };
        out.push_str(&format!(
            "{}. {} — {}\n",
            index + 1,
            step.action.describe(),
            status
        ));
    }
    out.trim_end().to_string()
}
