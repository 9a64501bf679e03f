//! Executes a single [`Action`] against a live page.
//!
//! Expected action failures (missing element, timeout, failed assertion)
//! are reported in [`ActionResult::error`], never as an `Err`; retry policy
//! lives in the driver, not here.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::actions::{normalize_key_combo, Action, MouseButton, ScrollDirection};

use super::page::{Locator, Page, PageError};
use super::probe::{self, ElementInfo};

/// Default network-idle window after navigation-causing actions.
const NETWORK_IDLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Executor failure taxonomy. These are data: the driver feeds them back to
/// the model rather than aborting the test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecErrorKind {
    ElementNotFound,
    LocatorAmbiguous,
    NavigationTimeout,
    AssertionFailed,
    ActionThrow,
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct ExecError {
    pub kind: ExecErrorKind,
    pub message: String,
}

impl ExecError {
    fn new(kind: ExecErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    fn assertion(message: impl Into<String>) -> Self {
        Self::new(ExecErrorKind::AssertionFailed, message)
    }
}

impl From<PageError> for ExecError {
    fn from(err: PageError) -> Self {
        let kind = match &err {
            PageError::ElementNotFound(_) => ExecErrorKind::ElementNotFound,
            PageError::Ambiguous { .. } => ExecErrorKind::LocatorAmbiguous,
            PageError::NavigationTimeout(_) => ExecErrorKind::NavigationTimeout,
            PageError::Browser(_) => ExecErrorKind::ActionThrow,
        };
        Self::new(kind, err.to_string())
    }
}

/// Outcome of executing one action.
#[derive(Debug, Clone)]
pub struct ActionResult {
    pub action: Action,
    pub screenshot: Option<Vec<u8>>,
    pub element_info: Option<ElementInfo>,
    pub error: Option<ExecError>,
    pub timestamp: DateTime<Utc>,
}

impl ActionResult {
    pub fn ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Drives the page one action at a time.
pub struct Executor {
    page: Arc<dyn Page>,
    settle_jitter_ms: (u64, u64),
}

impl Executor {
    pub fn new(page: Arc<dyn Page>) -> Self {
        Self {
            page,
            settle_jitter_ms: (300, 1000),
        }
    }

    /// Override the post-action settle window (tests use `(0, 0)`).
    pub fn with_settle_jitter(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.settle_jitter_ms = (min_ms, max_ms);
        self
    }

    pub fn page(&self) -> &Arc<dyn Page> {
        &self.page
    }

    /// Execute one action: perform, settle, screenshot.
    pub async fn execute(&self, action: &Action) -> ActionResult {
        let (element_info, error) = match self.perform(action).await {
            Ok(info) => (info, None),
            Err(err) => (None, Some(err)),
        };

        self.settle().await;
        if action.may_navigate() && error.is_none() {
            self.page.wait_for_network_idle(NETWORK_IDLE_TIMEOUT).await;
        }

        // A failed assertion still gets its screenshot: the model needs to
        // see what the page actually showed.
        let screenshot = match self.page.screenshot().await {
            Ok(png) => Some(png),
            Err(err) => {
                warn!(error = %err, "screenshot capture failed");
                None
            }
        };

        ActionResult {
            action: action.clone(),
            screenshot,
            element_info,
            error,
            timestamp: Utc::now(),
        }
    }

    async fn perform(&self, action: &Action) -> Result<Option<ElementInfo>, ExecError> {
        match action {
            Action::Click { x, y, button } => {
                self.click_coordinate(*x, *y, button.unwrap_or(MouseButton::Left), 1)
                    .await
            }
            Action::DoubleClick { x, y } => {
                self.click_coordinate(*x, *y, MouseButton::Left, 2).await
            }
            Action::MouseMove { x, y } => {
                self.page.move_mouse(*x, *y).await?;
                Ok(None)
            }
            Action::MouseDown { x, y } => {
                self.page.mouse_down(*x, *y).await?;
                Ok(None)
            }
            Action::MouseUp { x, y } => {
                self.page.mouse_up(*x, *y).await?;
                Ok(None)
            }
            Action::Drag { sx, sy, ex, ey } => {
                self.page.drag(*sx, *sy, *ex, *ey).await?;
                Ok(None)
            }
            Action::ClickButton { name, .. } => {
                let locator = Locator::Role {
                    role: "button".to_string(),
                    name: name.clone(),
                    exact: action.exact_match(),
                };
                self.click_locator(&locator).await
            }
            Action::ClickText { text, .. } => {
                let locator = Locator::Text {
                    text: text.clone(),
                    exact: action.exact_match(),
                };
                self.click_locator(&locator).await
            }
            Action::SelectInput { field, value, .. } => self.fill_input(field, value).await,
            Action::Type { text } => {
                self.page.type_text(text).await?;
                Ok(None)
            }
            Action::Key { combo } => {
                self.page.press_key(&normalize_key_combo(combo)).await?;
                Ok(None)
            }
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
                self.page.scroll_by(*x, *y, 0.0, dy).await?;
                Ok(None)
            }
            Action::Wait { ms } => {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
                Ok(None)
            }
            Action::AssertText { text } => {
                if probe::text_present(self.page.as_ref(), text).await? {
                    Ok(None)
                } else {
                    Err(ExecError::assertion(format!(
                        "assertion failed: text \"{}\" not found on page",
                        text
                    )))
                }
            }
            Action::AssertNotText { text } => {
                if probe::text_present(self.page.as_ref(), text).await? {
                    Err(ExecError::assertion(format!(
                        "assertion failed: text \"{}\" is present on page",
                        text
                    )))
                } else {
                    Ok(None)
                }
            }
            Action::AssertVisible { x, y } => {
                match probe::element_info_at(self.page.as_ref(), *x, *y).await? {
                    Some(info) => Ok(Some(info)),
                    None => Err(ExecError::assertion(format!(
                        "assertion failed: no visible element at ({}, {})",
                        x, y
                    ))),
                }
            }
            Action::Screenshot => Ok(None),
            Action::Done { .. } => Err(ExecError::new(
                ExecErrorKind::ActionThrow,
                "done is terminal and not executable",
            )),
        }
    }

    /// Coordinate click with magnet snap: within 40px, prefer the centroid
    /// of the nearest interactive element over the raw coordinate.
    async fn click_coordinate(
        &self,
        x: f64,
        y: f64,
        button: MouseButton,
        click_count: u32,
    ) -> Result<Option<ElementInfo>, ExecError> {
        let snapped = probe::snap_to_interactive(self.page.as_ref(), x, y).await?;
        let (cx, cy, info) = match snapped {
            Some(snap) => {
                debug!(from = ?(x, y), to = ?(snap.x, snap.y), "magnet snap");
                (snap.x, snap.y, Some(snap.info))
            }
            None => {
                let info = probe::element_info_at(self.page.as_ref(), x, y).await?;
                (x, y, info)
            }
        };
        self.page.click_at(cx, cy, button, click_count).await?;
        Ok(info)
    }

    async fn click_locator(&self, locator: &Locator) -> Result<Option<ElementInfo>, ExecError> {
        let info = self.info_for_locator(locator).await;
        self.page.locator_click(locator).await?;
        Ok(info)
    }

    /// Fill the first matching input, trying label, placeholder, then
    /// role=textbox, in that order.
    async fn fill_input(
        &self,
        field: &str,
        value: &str,
    ) -> Result<Option<ElementInfo>, ExecError> {
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
                let info = self.info_for_locator(locator).await;
                self.page.locator_fill(locator, value).await?;
                return Ok(info);
            }
        }
        Err(ExecError::new(
            ExecErrorKind::ElementNotFound,
            format!("no input matching label/placeholder/name \"{}\"", field),
        ))
    }

    /// Best-effort element info before a locator interaction; failures here
    /// never fail the action.
    async fn info_for_locator(&self, locator: &Locator) -> Option<ElementInfo> {
        match self.page.locator_center(locator).await {
            Ok(Some((x, y))) => probe::element_info_at(self.page.as_ref(), x, y)
                .await
                .ok()
                .flatten(),
            _ => None,
        }
    }

    async fn settle(&self) {
        let (min, max) = self.settle_jitter_ms;
        if max == 0 {
            return;
        }
        let ms = if min >= max {
            min
        } else {
            rand::thread_rng().gen_range(min..=max)
        };
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}
