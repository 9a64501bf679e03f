//! Shared test doubles: an in-memory page and a scripted model client.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use zentest::actions::MouseButton;
use zentest::browser::{ElementInfo, Locator, Page, PageError};
use zentest::llm::{ModelClient, ModelError, ModelReply, ModelRequest, TokenUsage};

/// In-memory page: records every primitive call and serves canned DOM
/// probe responses.
#[derive(Default)]
pub struct MockPage {
    pub calls: Mutex<Vec<String>>,
    /// Text the fake page "contains" for assert_text probes.
    pub page_text: Mutex<String>,
    /// Match counts per locator (keyed by `Locator::to_string()`).
    pub locator_counts: Mutex<HashMap<String, usize>>,
    /// Locators whose click/fill should fail with element-not-found.
    pub broken_locators: Mutex<HashSet<String>>,
    /// Element info served for `element_info_at` probes.
    pub info_at_point: Mutex<Option<ElementInfo>>,
    /// Snap result served for magnet-snap probes.
    pub snap_result: Mutex<Option<Value>>,
}

impl MockPage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(self, text: &str) -> Self {
        *self.page_text.lock().unwrap() = text.to_string();
        self
    }

    pub fn with_locator(self, locator: &Locator, count: usize) -> Self {
        self.locator_counts
            .lock()
            .unwrap()
            .insert(locator.to_string(), count);
        self
    }

    pub fn with_info_at_point(self, info: ElementInfo) -> Self {
        *self.info_at_point.lock().unwrap() = Some(info);
        self
    }

    pub fn recorded_calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    fn count_of(&self, locator: &Locator) -> usize {
        *self
            .locator_counts
            .lock()
            .unwrap()
            .get(&locator.to_string())
            .unwrap_or(&0)
    }

    fn check_locator(&self, locator: &Locator) -> Result<(), PageError> {
        if self
            .broken_locators
            .lock()
            .unwrap()
            .contains(&locator.to_string())
            || self.count_of(locator) == 0
        {
            return Err(PageError::ElementNotFound(locator.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Page for MockPage {
    async fn goto(&self, url: &str) -> Result<(), PageError> {
        self.record(format!("goto:{}", url));
        Ok(())
    }

    async fn set_viewport(&self, width: u32, height: u32) -> Result<(), PageError> {
        self.record(format!("viewport:{}x{}", width, height));
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, PageError> {
        self.record("screenshot");
        Ok(vec![0x89, 0x50, 0x4e, 0x47])
    }

    async fn eval(&self, expression: &str) -> Result<Value, PageError> {
        if expression.contains("zentestSnap(") {
            return Ok(self
                .snap_result
                .lock()
                .unwrap()
                .clone()
                .unwrap_or(Value::Null));
        }
        if expression.contains("zentestInfoAt(") {
            let info = self.info_at_point.lock().unwrap().clone();
            return Ok(match info {
                Some(info) => serde_json::to_value(info).unwrap(),
                None => Value::Null,
            });
        }
        if expression.contains("indexOf(needle)") {
            // The needle is the single JSON-literal argument.
            let literal = expression
                .rsplit_once("})(")
                .map(|(_, rest)| rest.trim_end_matches(')'))
                .unwrap_or("\"\"");
            let needle: String = serde_json::from_str(literal).unwrap_or_default();
            return Ok(json!(self.page_text.lock().unwrap().contains(&needle)));
        }
        Ok(Value::Null)
    }

    async fn click_at(
        &self,
        x: f64,
        y: f64,
        _button: MouseButton,
        click_count: u32,
    ) -> Result<(), PageError> {
        self.record(format!("click_at:{},{}:{}", x, y, click_count));
        Ok(())
    }

    async fn move_mouse(&self, x: f64, y: f64) -> Result<(), PageError> {
        self.record(format!("move:{},{}", x, y));
        Ok(())
    }

    async fn mouse_down(&self, x: f64, y: f64) -> Result<(), PageError> {
        self.record(format!("down:{},{}", x, y));
        Ok(())
    }

    async fn mouse_up(&self, x: f64, y: f64) -> Result<(), PageError> {
        self.record(format!("up:{},{}", x, y));
        Ok(())
    }

    async fn drag(&self, sx: f64, sy: f64, ex: f64, ey: f64) -> Result<(), PageError> {
        self.record(format!("drag:{},{}->{},{}", sx, sy, ex, ey));
        Ok(())
    }

    async fn type_text(&self, text: &str) -> Result<(), PageError> {
        self.record(format!("type:{}", text));
        Ok(())
    }

    async fn press_key(&self, combo: &str) -> Result<(), PageError> {
        self.record(format!("key:{}", combo));
        Ok(())
    }

    async fn scroll_by(&self, _x: f64, _y: f64, dx: f64, dy: f64) -> Result<(), PageError> {
        self.record(format!("scroll:{},{}", dx, dy));
        Ok(())
    }

    async fn locator_count(&self, locator: &Locator) -> Result<usize, PageError> {
        Ok(self.count_of(locator))
    }

    async fn locator_center(&self, locator: &Locator) -> Result<Option<(f64, f64)>, PageError> {
        Ok((self.count_of(locator) > 0).then_some((100.0, 100.0)))
    }

    async fn locator_click(&self, locator: &Locator) -> Result<(), PageError> {
        self.check_locator(locator)?;
        self.record(format!("locator_click:{}", locator));
        Ok(())
    }

    async fn locator_fill(&self, locator: &Locator, value: &str) -> Result<(), PageError> {
        self.check_locator(locator)?;
        self.record(format!("locator_fill:{}={}", locator, value));
        Ok(())
    }

    async fn wait_for_network_idle(&self, _timeout: Duration) {
        self.record("network_idle");
    }
}

/// Model client that replays queued replies; repeats the last reply when
/// the queue runs dry.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<String>>,
    last: Mutex<Option<String>>,
    pub requests: Mutex<Vec<ModelRequest>>,
    pub fail_with: Mutex<Option<String>>,
}

impl ScriptedModel {
    pub fn new(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|s| s.to_string()).collect()),
            last: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
            fail_with: Mutex::new(None),
        }
    }

    pub fn always_failing(message: &str) -> Self {
        let model = Self::new(&[]);
        *model.fail_with.lock().unwrap() = Some(message.to_string());
        model
    }

    pub fn recorded_requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn next(&self, request: &ModelRequest) -> Result<ModelReply, ModelError> {
        self.requests.lock().unwrap().push(request.clone());

        if let Some(message) = self.fail_with.lock().unwrap().clone() {
            return Err(ModelError::Http {
                status: 500,
                message,
            });
        }

        let reply = {
            let mut replies = self.replies.lock().unwrap();
            match replies.pop_front() {
                Some(reply) => {
                    *self.last.lock().unwrap() = Some(reply.clone());
                    reply
                }
                None => self
                    .last
                    .lock()
                    .unwrap()
                    .clone()
                    .unwrap_or_else(|| "{\"actions\": []}".to_string()),
            }
        };

        Ok(ModelReply {
            text: reply,
            usage: Some(TokenUsage {
                input_tokens: 100,
                output_tokens: 20,
            }),
        })
    }

    fn model(&self) -> &str {
        "scripted-model"
    }
}
