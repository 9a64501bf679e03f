//! DOM probe queries injected into the page.
//!
//! The probe is a read-only snapshot query: it never mutates the page. It
//! backs the magnet snap (correcting a noisy click coordinate to the nearest
//! interactive element), element-info capture at click time, and the
//! substring text assertions.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::page::{Page, PageError};

/// Information about the DOM element at a click site, captured by probing
/// the DOM at the click coordinate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ElementInfo {
    pub tag: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aria_label: Option<String>,
    /// Best-effort selector derived in priority order: data-testid, #id,
    /// [role][aria-label], tag:has-text for short-text buttons/anchors,
    /// tag.class1.class2, bare tag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
}

impl ElementInfo {
    pub fn is_input_like(&self) -> bool {
        matches!(self.tag.as_str(), "input" | "textarea" | "select")
    }

    pub fn is_button_like(&self) -> bool {
        self.tag == "button" || self.role.as_deref() == Some("button")
    }
}

/// A magnet-snapped click point with the element found there.
#[derive(Debug, Clone, Deserialize)]
pub struct SnapPoint {
    pub x: f64,
    pub y: f64,
    pub info: ElementInfo,
}

/// Shared JS helpers: element info extraction and selector derivation.
const HELPERS_JS: &str = r#"
function zentestInfoOf(el) {
  var text = (el.innerText || el.textContent || '').trim().replace(/\s+/g, ' ');
  if (text.length > 80) text = text.slice(0, 80);
  var labelText = null;
  if (el.labels && el.labels.length > 0) {
    labelText = (el.labels[0].innerText || '').trim();
  }
  var name = el.getAttribute('aria-label') || labelText || el.getAttribute('name') || null;
  return {
    tag: el.tagName.toLowerCase(),
    text: text || null,
    role: el.getAttribute('role') || null,
    name: name,
    id: el.id || null,
    class: el.className && typeof el.className === 'string' ? el.className : null,
    href: el.getAttribute('href') || null,
    placeholder: el.getAttribute('placeholder') || null,
    ariaLabel: el.getAttribute('aria-label') || null,
    selector: zentestSelectorOf(el, text)
  };
}
function zentestSelectorOf(el, text) {
  var tag = el.tagName.toLowerCase();
  var testId = el.getAttribute('data-testid');
  if (testId) return '[data-testid="' + testId + '"]';
  if (el.id) return '#' + el.id;
  var role = el.getAttribute('role');
  var ariaLabel = el.getAttribute('aria-label');
  if (role && ariaLabel) return '[role="' + role + '"][aria-label="' + ariaLabel + '"]';
  if ((tag === 'button' || tag === 'a') && text && text.length > 0 && text.length <= 30) {
    return tag + ':has-text("' + text + '")';
  }
  if (el.className && typeof el.className === 'string') {
    var classes = el.className.trim().split(/\s+/).slice(0, 2).filter(Boolean);
    if (classes.length > 0) return tag + '.' + classes.join('.');
  }
  return tag;
}
function zentestIsInteractive(el) {
  var tag = el.tagName.toLowerCase();
  if (['button', 'a', 'input', 'textarea', 'select', 'label'].indexOf(tag) >= 0) return true;
  if (el.getAttribute('role')) return true;
  if (el.hasAttribute('tabindex')) return true;
  if (el.onclick || el.hasAttribute('onclick')) return true;
  var style = window.getComputedStyle(el);
  return style.cursor === 'pointer';
}
"#;

/// Magnet snap: search a 40px radius around the point on a 6px grid and
/// return the centroid of the closest interactive candidate.
const SNAP_JS: &str = r#"
function zentestSnap(x, y) {
  var RADIUS = 40, GRID = 6;
  var best = null, bestDist = Infinity;
  var seen = [];
  for (var dy = -RADIUS; dy <= RADIUS; dy += GRID) {
    for (var dx = -RADIUS; dx <= RADIUS; dx += GRID) {
      if (dx * dx + dy * dy > RADIUS * RADIUS) continue;
      var el = document.elementFromPoint(x + dx, y + dy);
      if (!el || seen.indexOf(el) >= 0) continue;
      seen.push(el);
      var target = el;
      while (target && !zentestIsInteractive(target)) target = target.parentElement;
      if (!target) continue;
      var rect = target.getBoundingClientRect();
      var cx = rect.left + rect.width / 2;
      var cy = rect.top + rect.height / 2;
      var dist = Math.hypot(cx - x, cy - y);
      if (dist < bestDist) {
        bestDist = dist;
        best = { x: cx, y: cy, info: zentestInfoOf(target) };
      }
    }
  }
  return best;
}
"#;

const INFO_AT_JS: &str = r#"
function zentestInfoAt(x, y) {
  var el = document.elementFromPoint(x, y);
  return el ? zentestInfoOf(el) : null;
}
"#;

/// Serialize a Rust string as a JS string literal.
fn js_literal(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

fn parse_optional<T: serde::de::DeserializeOwned>(value: Value) -> Option<T> {
    if value.is_null() {
        return None;
    }
    serde_json::from_value(value).ok()
}

/// Find the nearest interactive element within the magnet radius.
pub async fn snap_to_interactive(
    page: &dyn Page,
    x: f64,
    y: f64,
) -> Result<Option<SnapPoint>, PageError> {
    let expr = format!(
        "(function() {{ {HELPERS_JS} {SNAP_JS} return zentestSnap({x}, {y}); }})()"
    );
    let value = page.eval(&expr).await?;
    Ok(parse_optional(value))
}

/// Element info for whatever sits at `(x, y)` right now.
pub async fn element_info_at(
    page: &dyn Page,
    x: f64,
    y: f64,
) -> Result<Option<ElementInfo>, PageError> {
    let expr = format!(
        "(function() {{ {HELPERS_JS} {INFO_AT_JS} return zentestInfoAt({x}, {y}); }})()"
    );
    let value = page.eval(&expr).await?;
    Ok(parse_optional(value))
}

/// Whether at least one DOM node contains `needle` as a substring.
pub async fn text_present(page: &dyn Page, needle: &str) -> Result<bool, PageError> {
    let expr = format!(
        "(function(needle) {{ return (document.body ? document.body.innerText : '').indexOf(needle) >= 0; }})({})",
        js_literal(needle)
    );
    let value = page.eval(&expr).await?;
    Ok(value.as_bool().unwrap_or(false))
}
