//! Deterministic replay of recorded steps, no model involved.
//!
//! Replay fast-forwards browser state so the driver can resume mid-suite;
//! it does not revalidate. Assertions and steps that originally failed are
//! skipped. The first step that cannot be re-executed aborts the replay and
//! the caller falls back to an agentic run.

use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tracing::{debug, info};

use crate::actions::{normalize_key_combo, Action, MouseButton, ScrollDirection};
use crate::browser::{Locator, Page, PageError};

use super::locator::build_locator;
use super::sidecar::RecordedStep;

/// Button names that usually submit something and deserve a longer settle.
static SUBMIT_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)sign.?in|log.?in|submit|save|confirm|continue|next").expect("submit regex")
});

const POST_CLICK_SETTLE: Duration = Duration::from_millis(250);
const SUBMIT_SETTLE: Duration = Duration::from_secs(1);
const NETWORK_IDLE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("replay failed at step {index} ({action}): {source}")]
    Step {
        index: usize,
        action: String,
        source: PageError,
    },
}

pub struct ScriptReplayer<'a> {
    page: &'a dyn Page,
}

impl<'a> ScriptReplayer<'a> {
    pub fn new(page: &'a dyn Page) -> Self {
        Self { page }
    }

    /// Re-execute recorded steps in order.
    pub async fn replay(&self, steps: &[RecordedStep]) -> Result<(), ReplayError> {
        for (index, step) in steps.iter().enumerate() {
            if !step.succeeded() {
                debug!(index, "skipping step that originally failed");
                continue;
            }
            if step.action.is_assertion() {
                continue;
            }

            self.replay_step(step)
                .await
                .map_err(|source| ReplayError::Step {
                    index,
                    action: step.action.describe(),
                    source,
                })?;

            if step.action.is_click() {
                self.post_click_settle(step).await;
            }
        }
        info!(steps = steps.len(), "replay complete");
        Ok(())
    }

    async fn replay_step(&self, step: &RecordedStep) -> Result<(), PageError> {
        match &step.action {
            Action::Click { x, y, button } => {
                match step.element_info.as_ref().and_then(build_locator) {
                    Some(locator) => self.page.locator_click(&locator).await,
                    None => {
                        self.page
                            .click_at(*x, *y, button.unwrap_or(MouseButton::Left), 1)
                            .await
                    }
                }
            }
            Action::DoubleClick { x, y } => {
                self.page.click_at(*x, *y, MouseButton::Left, 2).await
            }
            Action::MouseMove { x, y } => self.page.move_mouse(*x, *y).await,
            Action::MouseDown { x, y } => self.page.mouse_down(*x, *y).await,
            Action::MouseUp { x, y } => self.page.mouse_up(*x, *y).await,
            Action::Drag { sx, sy, ex, ey } => self.page.drag(*sx, *sy, *ex, *ey).await,
            Action::ClickButton { name, .. } => {
                let locator = Locator::Role {
                    role: "button".to_string(),
                    name: name.clone(),
                    exact: step.action.exact_match(),
                };
                self.page.locator_click(&locator).await
            }
            Action::ClickText { text, .. } => {
                let locator = Locator::Text {
                    text: text.clone(),
                    exact: step.action.exact_match(),
                };
                self.page.locator_click(&locator).await
            }
            Action::SelectInput { field, value, .. } => self.fill_input(field, value).await,
            Action::Type { text } => self.page.type_text(text).await,
            Action::Key { combo } => self.page.press_key(&normalize_key_combo(combo)).await,
            Action::Scroll {
                x,
                y,
                direction,
                amount,
            } => {
                let dy = match direction {
                    ScrollDirection::Down => *amount as f64,
                    ScrollDirection::Up => -(*amount as f64),
                };
                self.page.scroll_by(*x, *y, 0.0, dy).await
            }
            Action::Wait { ms } => {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
                Ok(())
            }
            // Assertions are filtered earlier; the rest have no replayable
            // effect.
            Action::AssertText { .. }
            | Action::AssertNotText { .. }
            | Action::AssertVisible { .. }
            | Action::Screenshot
            | Action::Done { .. } => Ok(()),
        }
    }

    /// Same fallback order the executor uses live.
    async fn fill_input(&self, field: &str, value: &str) -> Result<(), PageError> {
        let candidates = [
            Locator::Label(field.to_string()),
            Locator::Placeholder(field.to_string()),
            Locator::Role {
                role: "textbox".to_string(),
                name: field.to_string(),
                exact: false,
            },
        ];
        for locator in &candidates {
            if self.page.locator_count(locator).await? >= 1 {
                return self.page.locator_fill(locator, value).await;
            }
        }
        Err(PageError::ElementNotFound(format!(
            "no input matching label/placeholder/name \"{}\"",
            field
        )))
    }

    async fn post_click_settle(&self, step: &RecordedStep) {
        tokio::time::sleep(POST_CLICK_SETTLE).await;
        if clicked_submit_like(step) {
            self.page.wait_for_network_idle(NETWORK_IDLE_TIMEOUT).await;
            tokio::time::sleep(SUBMIT_SETTLE).await;
        }
    }
}

fn clicked_submit_like(step: &RecordedStep) -> bool {
    let name = match &step.action {
        Action::ClickButton { name, .. } => Some(name.as_str()),
        Action::ClickText { text, .. } => Some(text.as_str()),
        Action::Click { .. } | Action::DoubleClick { .. } => step
            .element_info
            .as_ref()
            .and_then(|info| info.text.as_deref().or(info.name.as_deref())),
        _ => None,
    };
    name.map(|n| SUBMIT_NAME.is_match(n)).unwrap_or(false)
}
