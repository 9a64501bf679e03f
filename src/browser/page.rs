//! The Playwright-class capability surface the executor and replayer drive.
//!
//! A [`Page`] is exclusively owned by whichever driver or replayer is
//! currently using it. Everything above this trait is browser-agnostic; the
//! concrete Chromium adapter lives in [`crate::browser::cdp`].

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::actions::MouseButton;

/// Default timeout for locator operations.
pub const LOCATOR_TIMEOUT: Duration = Duration::from_secs(5);
/// Default timeout for screenshots.
pub const SCREENSHOT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum PageError {
    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("locator '{locator}' matched {count} elements")]
    Ambiguous { locator: String, count: usize },

    #[error("navigation timed out: {0}")]
    NavigationTimeout(String),

    #[error("browser call failed: {0}")]
    Browser(String),
}

/// A semantic element locator, shared between the script builder and the
/// replayer so both resolve elements identically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    TestId(String),
    Role {
        role: String,
        name: String,
        exact: bool,
    },
    Label(String),
    Placeholder(String),
    Text {
        text: String,
        exact: bool,
    },
    Css(String),
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::TestId(id) => write!(f, "testid={}", id),
            Locator::Role { role, name, exact } => {
                write!(f, "role={} name={} exact={}", role, name, exact)
            }
            Locator::Label(label) => write!(f, "label={}", label),
            Locator::Placeholder(placeholder) => write!(f, "placeholder={}", placeholder),
            Locator::Text { text, exact } => write!(f, "text={} exact={}", text, exact),
            Locator::Css(selector) => write!(f, "css={}", selector),
        }
    }
}

/// Browser page primitives. All methods are suspension points; callers check
/// for cancellation between calls.
#[async_trait]
pub trait Page: Send + Sync {
    async fn goto(&self, url: &str) -> Result<(), PageError>;

    async fn set_viewport(&self, width: u32, height: u32) -> Result<(), PageError>;

    /// Capture a PNG of the current viewport.
    async fn screenshot(&self) -> Result<Vec<u8>, PageError>;

    /// Evaluate a JS expression in the page, returning its JSON value.
    async fn eval(&self, expression: &str) -> Result<Value, PageError>;

    async fn click_at(
        &self,
        x: f64,
        y: f64,
        button: MouseButton,
        click_count: u32,
    ) -> Result<(), PageError>;

    async fn move_mouse(&self, x: f64, y: f64) -> Result<(), PageError>;

    async fn mouse_down(&self, x: f64, y: f64) -> Result<(), PageError>;

    async fn mouse_up(&self, x: f64, y: f64) -> Result<(), PageError>;

    async fn drag(&self, sx: f64, sy: f64, ex: f64, ey: f64) -> Result<(), PageError>;

    /// Send text as keystrokes to the focused element.
    async fn type_text(&self, text: &str) -> Result<(), PageError>;

    /// Press a normalized key combo (see [`crate::actions::normalize_key_combo`]).
    async fn press_key(&self, combo: &str) -> Result<(), PageError>;

    /// Dispatch a wheel event at `(x, y)` with the given deltas.
    async fn scroll_by(&self, x: f64, y: f64, dx: f64, dy: f64) -> Result<(), PageError>;

    /// Number of elements the locator resolves to right now.
    async fn locator_count(&self, locator: &Locator) -> Result<usize, PageError>;

    /// Viewport center of the first resolved element, if any.
    async fn locator_center(&self, locator: &Locator) -> Result<Option<(f64, f64)>, PageError>;

    /// Click the first element the locator resolves to.
    async fn locator_click(&self, locator: &Locator) -> Result<(), PageError>;

    /// Fill the first element the locator resolves to.
    async fn locator_fill(&self, locator: &Locator, value: &str) -> Result<(), PageError>;

    /// Best-effort wait for the network to go quiet. A timeout is not an
    /// error; the page may simply have continuous background traffic.
    async fn wait_for_network_idle(&self, timeout: Duration);
}
