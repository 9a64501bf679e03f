//! The rewrite tier: ask a model to repair one failing test in the
//! generated script, or to escalate to a full agentic re-derivation.

use std::ops::Range;
use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use crate::llm::{extract_json_payload, ModelClient, ModelError, ModelRequest, TokenUsage};

/// Discriminated outcome of a rewrite call.
#[derive(Debug, Clone, PartialEq)]
pub enum RewriteDecision {
    Rewrite {
        reasoning: String,
        new_test_body: String,
    },
    Agentic {
        reasoning: String,
    },
}

const SYSTEM_PROMPT: &str = r#"You repair failing Playwright tests. You receive the failing test's code, the full script for context, the runner's error, and a screenshot of the page when available.

Decide between two outcomes and respond with ONLY a JSON object:

1. The test is fixable with a small change (a drifted locator, a renamed button, a changed label):
{"decision": "REWRITE", "reasoning": "why this fixes it", "newTestBody": "  await ...;\n  await ...;"}

newTestBody is the complete replacement for the statements inside the failing test function, preserving two-space indentation. Do not include the test(...) wrapper.

2. The page changed too much for a local fix (new flow, moved feature, different layout):
{"decision": "AGENTIC", "reasoning": "why a re-derivation is needed"}"#;

pub struct Rewriter {
    model: Arc<dyn ModelClient>,
}

impl Rewriter {
    pub fn new(model: Arc<dyn ModelClient>) -> Self {
        Self { model }
    }

    /// One rewrite proposal for the failing test.
    pub async fn propose(
        &self,
        test_name: &str,
        test_block: &str,
        full_script: &str,
        error_message: &str,
        stack: Option<&str>,
        screenshot: Option<Vec<u8>>,
        usage: &mut TokenUsage,
    ) -> Result<RewriteDecision, ModelError> {
        let mut user_text = format!(
            "Failing test: {}\n\nError:\n{}\n",
            test_name, error_message
        );
        if let Some(stack) = stack {
            user_text.push_str(&format!("\nStack:\n{}\n", stack));
        }
        user_text.push_str(&format!(
            "\nFailing test code:\n```ts\n{}\n```\n\nFull script for context:\n```ts\n{}\n```",
            test_block, full_script
        ));

        let reply = self
            .model
            .next(&ModelRequest {
                system: SYSTEM_PROMPT.to_string(),
                user_text,
                image_png: screenshot,
            })
            .await?;
        if let Some(reply_usage) = reply.usage {
            *usage += reply_usage;
        }

        parse_decision(&reply.text)
            .ok_or_else(|| ModelError::InvalidPayload("no rewrite decision in reply".to_string()))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DecisionPayload {
    decision: String,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    new_test_body: Option<String>,
}

fn parse_decision(raw: &str) -> Option<RewriteDecision> {
    let payload = extract_json_payload(raw, Some("decision"))?;
    let parsed: DecisionPayload = serde_json::from_str(&payload).ok()?;
    match parsed.decision.as_str() {
        "REWRITE" => Some(RewriteDecision::Rewrite {
            reasoning: parsed.reasoning,
            new_test_body: parsed.new_test_body?,
        }),
        "AGENTIC" => Some(RewriteDecision::Agentic {
            reasoning: parsed.reasoning,
        }),
        _ => None,
    }
}

/// Find the body of `test('<name>', async () => { ... });` in the script.
///
/// This is a scanner, not a regex: after locating the anchor it walks the
/// source counting braces, skipping string literals, so any indentation
/// style splices cleanly. Returns the byte range of the body (exclusive of
/// the outer braces).
pub fn find_test_body(script: &str, test_name: &str) -> Option<Range<usize>> {
    let anchor = format!("test('{}'", escape_anchor(test_name));
    let start = script.find(&anchor)?;
    let after_anchor = &script[start..];

    // First `{` after the arrow opens the body.
    let arrow = after_anchor.find("=>")?;
    let open_rel = after_anchor[arrow..].find('{')? + arrow;
    let body_start = start + open_rel + 1;

    let mut depth = 1usize;
    let mut in_string: Option<char> = None;
    let mut escaped = false;
    for (offset, ch) in script[body_start..].char_indices() {
        if let Some(quote) = in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == quote {
                in_string = None;
            }
            continue;
        }
        match ch {
            '\'' | '"' | '`' => in_string = Some(ch),
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(body_start..body_start + offset);
                }
            }
            _ => {}
        }
    }
    None
}

/// Replace the failing test's body with `new_body`. `None` when the test
/// cannot be located, which the orchestrator treats as an escalation.
pub fn splice_test_body(script: &str, test_name: &str, new_body: &str) -> Option<String> {
    let range = find_test_body(script, test_name)?;
    let mut spliced = String::with_capacity(script.len() + new_body.len());
    spliced.push_str(&script[..range.start]);
    spliced.push('\n');
    let indented = reindent(new_body);
    spliced.push_str(&indented);
    if !indented.ends_with('\n') {
        spliced.push('\n');
    }
    spliced.push_str("  ");
    spliced.push_str(&script[range.end..]);
    debug!(test = test_name, "spliced rewritten test body");
    Some(spliced)
}

/// Normalize the model's body to the script's four-space statement indent.
fn reindent(body: &str) -> String {
    body.trim_matches('\n')
        .lines()
        .map(|line| {
            let trimmed = line.trim_start();
            if trimmed.is_empty() {
                String::new()
            } else {
                format!("    {}", trimmed)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn escape_anchor(name: &str) -> String {
    name.replace('\\', "\\\\").replace('\'', "\\'")
}
