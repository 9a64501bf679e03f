//! Parsing and validation of model output into an action batch.
//!
//! Parsing never fails: anything unusable is coerced into a terminal
//! `done { success: false }` whose reason the no-response retry loop keys
//! on.

use serde::Deserialize;
use serde_json::Value;

use crate::actions::Action;
use crate::llm::extract_json_payload;

/// Minimum scroll distance the executor accepts.
const MIN_SCROLL_AMOUNT: i64 = 200;

/// Reasons that mark a batch as "the model said nothing usable". The
/// no-response retry loop matches on these prefixes.
const NO_RESPONSE_PREFIXES: &[&str] = &["No response", "Failed to parse", "Unknown action"];

/// Phrases in the reasoning that contradict a success `done`: the batch
/// trimmer drops the `done` and keeps the prefix.
const CONTINUATION_PHRASES: &[&str] = &[
    "still need",
    "remaining",
    "more steps",
    "not yet",
    "haven't completed",
    "next step",
    "continue with",
    "haven't done",
    "not complete",
    "incomplete",
];

/// A parsed (but not yet trimmed) model reply.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelBatch {
    pub actions: Vec<Action>,
    pub reasoning: String,
}

impl ModelBatch {
    fn failed(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            actions: vec![Action::failed_done(reason.clone())],
            reasoning: reason,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    actions: Vec<Value>,
    #[serde(default)]
    reasoning: String,
}

/// Parse raw model text into a batch.
pub fn parse_model_batch(raw: &str) -> ModelBatch {
    if raw.trim().is_empty() {
        return ModelBatch::failed("No response from model");
    }

    let Some(payload) = extract_json_payload(raw, Some("actions")) else {
        return ModelBatch::failed("Failed to parse model response: no JSON object found");
    };

    let envelope: Envelope = match serde_json::from_str(&payload) {
        Ok(envelope) => envelope,
        Err(err) => {
            return ModelBatch::failed(format!("Failed to parse model response: {}", err));
        }
    };

    if envelope.actions.is_empty() {
        return ModelBatch {
            actions: vec![Action::failed_done("No actions returned")],
            reasoning: envelope.reasoning,
        };
    }

    let actions = envelope
        .actions
        .into_iter()
        .map(|value| validate_action(value))
        .collect();

    ModelBatch {
        actions,
        reasoning: envelope.reasoning,
    }
}

/// Validate one action value; unusable variants coerce to a failed `done`.
fn validate_action(value: Value) -> Action {
    let described = value
        .get("type")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| value.to_string());

    match serde_json::from_value::<Action>(value) {
        Ok(Action::Scroll {
            x,
            y,
            direction,
            amount,
        }) => Action::Scroll {
            x,
            y,
            direction,
            amount: amount.max(MIN_SCROLL_AMOUNT),
        },
        Ok(action) => action,
        Err(_) => Action::failed_done(format!("Unknown action: {}", described)),
    }
}

/// Truncate the batch at the first `done`; drop a success `done` whose
/// reasoning admits work remains.
pub fn trim_batch(actions: Vec<Action>, reasoning: &str) -> Vec<Action> {
    let Some(done_index) = actions.iter().position(Action::is_done) else {
        return actions;
    };

    let keep_done = match &actions[done_index] {
        Action::Done { success: true, .. } => !reasoning_admits_more_work(reasoning),
        _ => true,
    };

    let mut trimmed: Vec<Action> = actions
        .into_iter()
        .take(done_index + 1)
        .collect();
    if !keep_done {
        trimmed.pop();
    }
    trimmed
}

fn reasoning_admits_more_work(reasoning: &str) -> bool {
    let lowered = reasoning.to_lowercase();
    CONTINUATION_PHRASES
        .iter()
        .any(|phrase| lowered.contains(phrase))
}

/// Whether the batch is a single failed `done` produced by the parser
/// (no response / parse failure / unknown action), eligible for the
/// corrective-feedback retry.
pub fn is_no_response(actions: &[Action]) -> bool {
    match actions {
        [Action::Done {
            success: false,
            reason,
        }] => NO_RESPONSE_PREFIXES
            .iter()
            .any(|prefix| reason.starts_with(prefix)),
        _ => false,
    }
}
