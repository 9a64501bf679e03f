//! Chromium adapter: implements [`Page`] over CDP via `chromiumoxide`.
//!
//! Mouse and keyboard go through raw `Input.dispatch*` events so that pages
//! see trusted-looking interactions; locator resolution runs as an injected
//! DOM query, mirroring how the probe works.

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType, DispatchMouseEventParams,
    DispatchMouseEventType, InsertTextParams, MouseButton as CdpMouseButton,
};
use chromiumoxide::page::ScreenshotParams;
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, warn};

use crate::actions::MouseButton;
use crate::config::Viewport;

use super::page::{Locator, Page, PageError};

const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);

/// A launched Chromium instance. Owns the event-handler task.
pub struct CdpBrowser {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl CdpBrowser {
    /// Launch Chromium and start draining its event stream.
    pub async fn launch(headless: bool, viewport: Viewport) -> Result<Self, PageError> {
        let mut builder = BrowserConfig::builder()
            .window_size(viewport.width, viewport.height)
            .no_sandbox();
        if !headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(PageError::Browser)?;

        let (browser, mut events) = Browser::launch(config)
            .await
            .map_err(|err| PageError::Browser(err.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if let Err(err) = event {
                    debug!(error = %err, "cdp event stream error");
                }
            }
        });

        Ok(Self { browser, handler })
    }

    pub async fn new_page(&self, viewport: Viewport) -> Result<CdpPage, PageError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|err| PageError::Browser(err.to_string()))?;
        let cdp_page = CdpPage { page };
        cdp_page
            .set_viewport(viewport.width, viewport.height)
            .await?;
        Ok(cdp_page)
    }

    pub async fn close(mut self) {
        if let Err(err) = self.browser.close().await {
            warn!(error = %err, "browser close failed");
        }
        let _ = self.browser.wait().await;
        self.handler.abort();
    }
}

/// One Chromium page.
pub struct CdpPage {
    page: chromiumoxide::Page,
}

impl CdpPage {
    async fn dispatch_mouse(&self, params: DispatchMouseEventParams) -> Result<(), PageError> {
        self.page
            .execute(params)
            .await
            .map(|_| ())
            .map_err(|err| PageError::Browser(err.to_string()))
    }

    fn cdp_button(button: MouseButton) -> CdpMouseButton {
        match button {
            MouseButton::Left => CdpMouseButton::Left,
            MouseButton::Right => CdpMouseButton::Right,
            MouseButton::Middle => CdpMouseButton::Middle,
        }
    }

    fn mouse_event(
        kind: DispatchMouseEventType,
        x: f64,
        y: f64,
    ) -> chromiumoxide::cdp::browser_protocol::input::DispatchMouseEventParamsBuilder {
        DispatchMouseEventParams::builder().r#type(kind).x(x).y(y)
    }

    async fn press_and_release(
        &self,
        x: f64,
        y: f64,
        button: MouseButton,
        click_count: u32,
    ) -> Result<(), PageError> {
        let cdp_button = Self::cdp_button(button);
        let press = Self::mouse_event(DispatchMouseEventType::MousePressed, x, y)
            .button(cdp_button.clone())
            .click_count(click_count as i64)
            .build()
            .map_err(PageError::Browser)?;
        self.dispatch_mouse(press).await?;

        let release = Self::mouse_event(DispatchMouseEventType::MouseReleased, x, y)
            .button(cdp_button)
            .click_count(click_count as i64)
            .build()
            .map_err(PageError::Browser)?;
        self.dispatch_mouse(release).await
    }

    /// Resolve a locator in the page, returning `{count, x, y}` for the
    /// first visible match.
    async fn resolve(&self, locator: &Locator) -> Result<Resolution, PageError> {
        let descriptor = locator_descriptor(locator);
        let expr = format!(
            "(function() {{ {RESOLVER_JS} return zentestResolve({descriptor}); }})()"
        );
        let value = match timeout(super::page::LOCATOR_TIMEOUT, self.eval(&expr)).await {
            Ok(value) => value?,
            Err(_) => {
                return Err(PageError::Browser(format!(
                    "locator resolution timed out for {}",
                    locator
                )))
            }
        };
        serde_json::from_value(value)
            .map_err(|err| PageError::Browser(format!("locator resolution payload: {}", err)))
    }

    async fn first_match(&self, locator: &Locator) -> Result<Resolution, PageError> {
        let resolution = self.resolve(locator).await?;
        if resolution.count == 0 {
            return Err(PageError::ElementNotFound(locator.to_string()));
        }
        Ok(resolution)
    }
}

#[derive(Debug, serde::Deserialize)]
struct Resolution {
    count: usize,
    #[serde(default)]
    x: f64,
    #[serde(default)]
    y: f64,
}

#[async_trait]
impl Page for CdpPage {
    async fn goto(&self, url: &str) -> Result<(), PageError> {
        match timeout(NAVIGATION_TIMEOUT, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(err)) => Err(PageError::Browser(err.to_string())),
            Err(_) => Err(PageError::NavigationTimeout(url.to_string())),
        }
    }

    async fn set_viewport(&self, width: u32, height: u32) -> Result<(), PageError> {
        let params = SetDeviceMetricsOverrideParams::builder()
            .width(width as i64)
            .height(height as i64)
            .device_scale_factor(1.0)
            .mobile(false)
            .build()
            .map_err(PageError::Browser)?;
        self.page
            .execute(params)
            .await
            .map(|_| ())
            .map_err(|err| PageError::Browser(err.to_string()))
    }

    async fn screenshot(&self) -> Result<Vec<u8>, PageError> {
        let params = ScreenshotParams::builder().build();
        match timeout(super::page::SCREENSHOT_TIMEOUT, self.page.screenshot(params)).await {
            Ok(Ok(png)) => Ok(png),
            Ok(Err(err)) => Err(PageError::Browser(err.to_string())),
            Err(_) => Err(PageError::Browser("screenshot timed out".to_string())),
        }
    }

    async fn eval(&self, expression: &str) -> Result<Value, PageError> {
        let result = self
            .page
            .evaluate(expression)
            .await
            .map_err(|err| PageError::Browser(err.to_string()))?;
        result
            .into_value()
            .map_err(|err| PageError::Browser(format!("evaluation result: {}", err)))
    }

    async fn click_at(
        &self,
        x: f64,
        y: f64,
        button: MouseButton,
        click_count: u32,
    ) -> Result<(), PageError> {
        self.move_mouse(x, y).await?;
        for count in 1..=click_count {
            self.press_and_release(x, y, button, count).await?;
        }
        Ok(())
    }

    async fn move_mouse(&self, x: f64, y: f64) -> Result<(), PageError> {
        let params = Self::mouse_event(DispatchMouseEventType::MouseMoved, x, y)
            .build()
            .map_err(PageError::Browser)?;
        self.dispatch_mouse(params).await
    }

    async fn mouse_down(&self, x: f64, y: f64) -> Result<(), PageError> {
        let params = Self::mouse_event(DispatchMouseEventType::MousePressed, x, y)
            .button(CdpMouseButton::Left)
            .click_count(1)
            .build()
            .map_err(PageError::Browser)?;
        self.dispatch_mouse(params).await
    }

    async fn mouse_up(&self, x: f64, y: f64) -> Result<(), PageError> {
        let params = Self::mouse_event(DispatchMouseEventType::MouseReleased, x, y)
            .button(CdpMouseButton::Left)
            .click_count(1)
            .build()
            .map_err(PageError::Browser)?;
        self.dispatch_mouse(params).await
    }

    async fn drag(&self, sx: f64, sy: f64, ex: f64, ey: f64) -> Result<(), PageError> {
        self.move_mouse(sx, sy).await?;
        self.mouse_down(sx, sy).await?;
        // A few intermediate moves so drag handlers see motion.
        for step in 1..=4 {
            let t = step as f64 / 4.0;
            self.move_mouse(sx + (ex - sx) * t, sy + (ey - sy) * t)
                .await?;
        }
        self.mouse_up(ex, ey).await
    }

    async fn type_text(&self, text: &str) -> Result<(), PageError> {
        let params = InsertTextParams::builder()
            .text(text)
            .build()
            .map_err(PageError::Browser)?;
        self.page
            .execute(params)
            .await
            .map(|_| ())
            .map_err(|err| PageError::Browser(err.to_string()))
    }

    async fn press_key(&self, combo: &str) -> Result<(), PageError> {
        let tokens: Vec<&str> = combo.split('+').filter(|t| !t.is_empty()).collect();
        let Some((key, modifiers)) = tokens.split_last() else {
            return Err(PageError::Browser(format!("empty key combo '{}'", combo)));
        };

        let mut mask = 0i64;
        for modifier in modifiers {
            mask |= match *modifier {
                "Alt" => 1,
                "Control" => 2,
                "Meta" => 4,
                "Shift" => 8,
                other => {
                    return Err(PageError::Browser(format!(
                        "unknown modifier '{}' in combo '{}'",
                        other, combo
                    )))
                }
            };
        }

        for kind in [DispatchKeyEventType::KeyDown, DispatchKeyEventType::KeyUp] {
            let params = DispatchKeyEventParams::builder()
                .r#type(kind)
                .key(key.to_string())
                .modifiers(mask)
                .build()
                .map_err(PageError::Browser)?;
            self.page
                .execute(params)
                .await
                .map_err(|err| PageError::Browser(err.to_string()))?;
        }
        Ok(())
    }

    async fn scroll_by(&self, x: f64, y: f64, dx: f64, dy: f64) -> Result<(), PageError> {
        let params = Self::mouse_event(DispatchMouseEventType::MouseWheel, x, y)
            .delta_x(dx)
            .delta_y(dy)
            .build()
            .map_err(PageError::Browser)?;
        self.dispatch_mouse(params).await
    }

    async fn locator_count(&self, locator: &Locator) -> Result<usize, PageError> {
        Ok(self.resolve(locator).await?.count)
    }

    async fn locator_center(&self, locator: &Locator) -> Result<Option<(f64, f64)>, PageError> {
        let resolution = self.resolve(locator).await?;
        Ok((resolution.count > 0).then_some((resolution.x, resolution.y)))
    }

    async fn locator_click(&self, locator: &Locator) -> Result<(), PageError> {
        let resolution = self.first_match(locator).await?;
        if resolution.count > 1 && locator_is_strict(locator) {
            return Err(PageError::Ambiguous {
                locator: locator.to_string(),
                count: resolution.count,
            });
        }
        self.click_at(resolution.x, resolution.y, MouseButton::Left, 1)
            .await
    }

    async fn locator_fill(&self, locator: &Locator, value: &str) -> Result<(), PageError> {
        self.first_match(locator).await?;
        let descriptor = locator_descriptor(locator);
        let literal = serde_json::to_string(value)
            .map_err(|err| PageError::Browser(err.to_string()))?;
        let expr = format!(
            "(function() {{ {RESOLVER_JS} return zentestFill({descriptor}, {literal}); }})()"
        );
        let filled = self.eval(&expr).await?;
        if filled.as_bool() == Some(true) {
            Ok(())
        } else {
            Err(PageError::Browser(format!(
                "could not fill element for {}",
                locator
            )))
        }
    }

    async fn wait_for_network_idle(&self, timeout: Duration) {
        // Quiet means readyState complete and no new resource entries for
        // 500ms. Continuous background traffic makes this time out, which
        // is deliberately not an error.
        let deadline = Instant::now() + timeout;
        let mut last_count: Option<u64> = None;
        let mut stable_since = Instant::now();

        while Instant::now() < deadline {
            let expr = "(function() { return { ready: document.readyState === 'complete', resources: performance.getEntriesByType('resource').length }; })()";
            let snapshot = match self.eval(expr).await {
                Ok(value) => value,
                Err(err) => {
                    debug!(error = %err, "network idle probe failed");
                    return;
                }
            };
            let ready = snapshot["ready"].as_bool().unwrap_or(false);
            let count = snapshot["resources"].as_u64().unwrap_or(0);

            if ready && last_count == Some(count) {
                if stable_since.elapsed() >= Duration::from_millis(500) {
                    return;
                }
            } else {
                stable_since = Instant::now();
                last_count = Some(count);
            }
            sleep(Duration::from_millis(100)).await;
        }
        debug!("network idle wait timed out");
    }
}

/// Strict (single-match) semantics apply to everything except substring
/// text matching and raw CSS, where first-match is the useful behavior.
fn locator_is_strict(locator: &Locator) -> bool {
    match locator {
        Locator::Text { exact, .. } => *exact,
        Locator::Css(_) => false,
        _ => true,
    }
}

fn locator_descriptor(locator: &Locator) -> String {
    let value = match locator {
        Locator::TestId(id) => json!({ "kind": "testid", "value": id }),
        Locator::Role { role, name, exact } => {
            json!({ "kind": "role", "role": role, "name": name, "exact": exact })
        }
        Locator::Label(label) => json!({ "kind": "label", "value": label }),
        Locator::Placeholder(placeholder) => {
            json!({ "kind": "placeholder", "value": placeholder })
        }
        Locator::Text { text, exact } => json!({ "kind": "text", "value": text, "exact": exact }),
        Locator::Css(selector) => json!({ "kind": "css", "value": selector }),
    };
    value.to_string()
}

/// In-page locator engine. Resolution returns the count of matches and the
/// viewport center of the first visible one.
const RESOLVER_JS: &str = r#"
function zentestVisible(el) {
  var rect = el.getBoundingClientRect();
  if (rect.width <= 0 || rect.height <= 0) return false;
  var style = window.getComputedStyle(el);
  return style.visibility !== 'hidden' && style.display !== 'none';
}
function zentestAccessibleName(el) {
  var aria = el.getAttribute('aria-label');
  if (aria) return aria.trim();
  if (el.labels && el.labels.length > 0) return (el.labels[0].innerText || '').trim();
  var text = (el.innerText || el.value || '').trim().replace(/\s+/g, ' ');
  if (text) return text;
  return (el.getAttribute('placeholder') || '').trim();
}
function zentestImplicitRole(el) {
  var tag = el.tagName.toLowerCase();
  if (tag === 'button') return 'button';
  if (tag === 'a' && el.hasAttribute('href')) return 'link';
  if (tag === 'textarea') return 'textbox';
  if (tag === 'select') return 'combobox';
  if (tag === 'input') {
    var type = (el.getAttribute('type') || 'text').toLowerCase();
    if (type === 'button' || type === 'submit' || type === 'reset') return 'button';
    if (type === 'checkbox') return 'checkbox';
    if (type === 'radio') return 'radio';
    return 'textbox';
  }
  return null;
}
function zentestMatchName(actual, wanted, exact) {
  if (!actual) return wanted === '';
  if (exact) return actual === wanted;
  return actual.toLowerCase().indexOf(wanted.toLowerCase()) >= 0;
}
function zentestCandidates(locator) {
  var all = Array.prototype.slice.call(document.querySelectorAll('*'));
  if (locator.kind === 'testid') {
    return Array.prototype.slice.call(
      document.querySelectorAll('[data-testid=' + JSON.stringify(locator.value) + ']'));
  }
  if (locator.kind === 'css') {
    try {
      return Array.prototype.slice.call(document.querySelectorAll(locator.value));
    } catch (e) {
      return [];
    }
  }
  if (locator.kind === 'role') {
    return all.filter(function(el) {
      var role = el.getAttribute('role') || zentestImplicitRole(el);
      if (role !== locator.role) return false;
      return zentestMatchName(zentestAccessibleName(el), locator.name, locator.exact);
    });
  }
  if (locator.kind === 'label') {
    var out = [];
    var labels = Array.prototype.slice.call(document.querySelectorAll('label'));
    labels.forEach(function(label) {
      var text = (label.innerText || '').trim();
      if (text !== locator.value && text.indexOf(locator.value) < 0) return;
      var control = label.control ||
        (label.htmlFor ? document.getElementById(label.htmlFor) : null) ||
        label.querySelector('input, textarea, select');
      if (control && out.indexOf(control) < 0) out.push(control);
    });
    return out;
  }
  if (locator.kind === 'placeholder') {
    return Array.prototype.slice.call(
      document.querySelectorAll('[placeholder=' + JSON.stringify(locator.value) + ']'));
  }
  if (locator.kind === 'text') {
    return all.filter(function(el) {
      if (el.children.length > 3) return false;
      var text = (el.innerText || '').trim().replace(/\s+/g, ' ');
      if (!text) return false;
      return locator.exact ? text === locator.value : text.indexOf(locator.value) >= 0;
    });
  }
  return [];
}
function zentestResolve(locator) {
  var matches = zentestCandidates(locator).filter(zentestVisible);
  if (matches.length === 0) return { count: 0, x: 0, y: 0 };
  var rect = matches[0].getBoundingClientRect();
  return {
    count: matches.length,
    x: rect.left + rect.width / 2,
    y: rect.top + rect.height / 2
  };
}
function zentestFill(locator, value) {
  var matches = zentestCandidates(locator).filter(zentestVisible);
  if (matches.length === 0) return false;
  var el = matches[0];
  el.focus();
  var proto = el.tagName.toLowerCase() === 'textarea'
    ? window.HTMLTextAreaElement.prototype
    : window.HTMLInputElement.prototype;
  var setter = Object.getOwnPropertyDescriptor(proto, 'value');
  if (setter && setter.set) {
    setter.set.call(el, value);
  } else {
    el.value = value;
  }
  el.dispatchEvent(new Event('input', { bubbles: true }));
  el.dispatchEvent(new Event('change', { bubbles: true }));
  return true;
}
"#;
