//! Action model shared by the driver, executor, builder and replayer.
//!
//! `Action` is a closed sum type; the executor and the script builder both
//! match on it exhaustively so adding a variant is a compile error until
//! every consumer handles it.

use serde::{Deserialize, Serialize};

/// Mouse button for coordinate clicks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl MouseButton {
    pub fn as_str(&self) -> &'static str {
        match self {
            MouseButton::Left => "left",
            MouseButton::Right => "right",
            MouseButton::Middle => "middle",
        }
    }
}

/// Scroll direction requested by the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollDirection {
    Up,
    Down,
}

impl ScrollDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrollDirection::Up => "up",
            ScrollDirection::Down => "down",
        }
    }
}

/// The unit of interaction the model may request.
///
/// Serialized with a `type` tag so the wire form matches the JSON schemas
/// enumerated in the system prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Click {
        x: f64,
        y: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        button: Option<MouseButton>,
    },
    DoubleClick {
        x: f64,
        y: f64,
    },
    MouseMove {
        x: f64,
        y: f64,
    },
    MouseDown {
        x: f64,
        y: f64,
    },
    MouseUp {
        x: f64,
        y: f64,
    },
    Drag {
        sx: f64,
        sy: f64,
        ex: f64,
        ey: f64,
    },
    ClickButton {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        exact: Option<bool>,
    },
    ClickText {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        exact: Option<bool>,
    },
    SelectInput {
        field: String,
        value: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        exact: Option<bool>,
    },
    Type {
        text: String,
    },
    Key {
        combo: String,
    },
    Scroll {
        x: f64,
        y: f64,
        direction: ScrollDirection,
        amount: i64,
    },
    Wait {
        ms: u64,
    },
    AssertText {
        text: String,
    },
    AssertNotText {
        text: String,
    },
    AssertVisible {
        x: f64,
        y: f64,
    },
    Screenshot,
    Done {
        success: bool,
        #[serde(default)]
        reason: String,
    },
}

impl Action {
    /// Terminal marker used when the model output could not be used.
    pub fn failed_done(reason: impl Into<String>) -> Self {
        Action::Done {
            success: false,
            reason: reason.into(),
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Action::Done { .. })
    }

    pub fn is_assertion(&self) -> bool {
        matches!(
            self,
            Action::AssertText { .. } | Action::AssertNotText { .. } | Action::AssertVisible { .. }
        )
    }

    pub fn is_click(&self) -> bool {
        matches!(
            self,
            Action::Click { .. }
                | Action::DoubleClick { .. }
                | Action::ClickButton { .. }
                | Action::ClickText { .. }
        )
    }

    /// Whether the action is likely to trigger a navigation or page mutation
    /// that warrants waiting for the network to settle.
    pub fn may_navigate(&self) -> bool {
        matches!(
            self,
            Action::Click { .. }
                | Action::DoubleClick { .. }
                | Action::ClickButton { .. }
                | Action::ClickText { .. }
                | Action::Key { .. }
        )
    }

    /// Effective `exact` flag for locator-addressed variants.
    ///
    /// `click_button` matches by exact accessible name unless the model opts
    /// out; `click_text` and `select_input` match by substring by default.
    pub fn exact_match(&self) -> bool {
        match self {
            Action::ClickButton { exact, .. } => exact.unwrap_or(true),
            Action::ClickText { exact, .. } | Action::SelectInput { exact, .. } => {
                exact.unwrap_or(false)
            }
            _ => false,
        }
    }

    /// Stable string identifying the action variant plus its salient fields.
    ///
    /// Used by the repetition guard: three consecutive identical signatures
    /// terminate the test. Re-signing an action always yields the same
    /// string.
    pub fn signature(&self) -> String {
        match self {
            Action::Click { x, y, button } => format!(
                "click:{},{}:{}",
                x,
                y,
                button.map(|b| b.as_str()).unwrap_or("")
            ),
            Action::DoubleClick { x, y } => format!("double_click:{},{}", x, y),
            Action::MouseMove { x, y } => format!("mouse_move:{},{}", x, y),
            Action::MouseDown { x, y } => format!("mouse_down:{},{}", x, y),
            Action::MouseUp { x, y } => format!("mouse_up:{},{}", x, y),
            Action::Drag { sx, sy, ex, ey } => format!("drag:{},{}:{},{}", sx, sy, ex, ey),
            Action::ClickButton { name, .. } => {
                format!("click_button:{}:{}", name, self.exact_match())
            }
            Action::ClickText { text, .. } => {
                format!("click_text:{}:{}", text, self.exact_match())
            }
            Action::SelectInput { field, value, .. } => {
                format!("select_input:{}:{}", field, value)
            }
            Action::Type { text } => format!("type:{}", text),
            Action::Key { combo } => format!("key:{}", normalize_key_combo(combo)),
            Action::Scroll {
                direction, amount, ..
            } => format!("scroll:{}:{}", direction.as_str(), amount),
            Action::Wait { ms } => format!("wait:{}", ms),
            Action::AssertText { text } => format!("assert_text:{}", text),
            Action::AssertNotText { text } => format!("assert_not_text:{}", text),
            Action::AssertVisible { x, y } => format!("assert_visible:{},{}", x, y),
            Action::Screenshot => "screenshot".to_string(),
            Action::Done { success, .. } => format!("done:{}", success),
        }
    }

    /// Short human-readable label for result lines and history summaries.
    pub fn describe(&self) -> String {
        match self {
            Action::Click { x, y, .. } => format!("click ({}, {})", x, y),
            Action::DoubleClick { x, y } => format!("double-click ({}, {})", x, y),
            Action::MouseMove { x, y } => format!("move mouse to ({}, {})", x, y),
            Action::MouseDown { x, y } => format!("mouse down at ({}, {})", x, y),
            Action::MouseUp { x, y } => format!("mouse up at ({}, {})", x, y),
            Action::Drag { sx, sy, ex, ey } => {
                format!("drag ({}, {}) -> ({}, {})", sx, sy, ex, ey)
            }
            Action::ClickButton { name, .. } => format!("click button \"{}\"", name),
            Action::ClickText { text, .. } => format!("click text \"{}\"", text),
            Action::SelectInput { field, value, .. } => {
                format!("fill \"{}\" with \"{}\"", field, value)
            }
            Action::Type { text } => format!("type \"{}\"", text),
            Action::Key { combo } => format!("press {}", normalize_key_combo(combo)),
            Action::Scroll {
                direction, amount, ..
            } => format!("scroll {} {}px", direction.as_str(), amount),
            Action::Wait { ms } => format!("wait {}ms", ms),
            Action::AssertText { text } => format!("assert text \"{}\"", text),
            Action::AssertNotText { text } => format!("assert no text \"{}\"", text),
            Action::AssertVisible { x, y } => format!("assert visible at ({}, {})", x, y),
            Action::Screenshot => "screenshot".to_string(),
            Action::Done { success, reason } => {
                format!("done (success={}, reason={})", success, reason)
            }
        }
    }
}

/// Normalize a `+`- or `-`-delimited key combo into canonical form.
///
/// Folds `cmd`/`command`/`meta` to `Meta`, `ctrl`/`control` to `Control`,
/// `alt`/`option` to `Alt`, `esc` to `Escape`; single letters are
/// upper-cased. Normalization is idempotent.
pub fn normalize_key_combo(combo: &str) -> String {
    combo
        .split(|c| c == '+' || c == '-')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(normalize_key_token)
        .collect::<Vec<_>>()
        .join("+")
}

fn normalize_key_token(token: &str) -> String {
    match token.to_ascii_lowercase().as_str() {
        "cmd" | "command" | "meta" => "Meta".to_string(),
        "ctrl" | "control" => "Control".to_string(),
        "alt" | "option" => "Alt".to_string(),
        "shift" => "Shift".to_string(),
        "esc" | "escape" => "Escape".to_string(),
        "enter" | "return" => "Enter".to_string(),
        "tab" => "Tab".to_string(),
        "space" => "Space".to_string(),
        "backspace" => "Backspace".to_string(),
        "delete" => "Delete".to_string(),
        _ => {
            let mut chars = token.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => c.to_ascii_uppercase().to_string(),
                _ => token.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_round_trips_through_json() {
        let action = Action::ClickButton {
            name: "Sign In".to_string(),
            exact: None,
        };
        let json = serde_json::to_string(&action).unwrap();
        assert!(json.contains("\"type\":\"click_button\""));
        let back: Action = serde_json::from_str(&json).unwrap();
        assert_eq!(action, back);
    }

    #[test]
    fn click_signature_includes_empty_button_segment() {
        let action = Action::Click {
            x: 400.0,
            y: 300.0,
            button: None,
        };
        assert_eq!(action.signature(), "click:400,300:");
    }

    #[test]
    fn click_button_signature_uses_effective_exact() {
        let action = Action::ClickButton {
            name: "Save".to_string(),
            exact: None,
        };
        assert_eq!(action.signature(), "click_button:Save:true");

        let action = Action::ClickText {
            text: "Save".to_string(),
            exact: None,
        };
        assert_eq!(action.signature(), "click_text:Save:false");
    }

    #[test]
    fn signature_is_stable_across_calls() {
        let action = Action::Type {
            text: "hello".to_string(),
        };
        assert_eq!(action.signature(), action.signature());
        assert_eq!(action.signature(), "type:hello");
    }

    #[test]
    fn combo_normalization_folds_modifiers() {
        assert_eq!(normalize_key_combo("cmd+a"), "Meta+A");
        assert_eq!(normalize_key_combo("ctrl-shift-t"), "Control+Shift+T");
        assert_eq!(normalize_key_combo("option+esc"), "Alt+Escape");
    }

    #[test]
    fn combo_normalization_is_idempotent() {
        for combo in ["cmd+a", "Ctrl+Shift+P", "esc", "Meta+Enter", "x"] {
            let once = normalize_key_combo(combo);
            assert_eq!(normalize_key_combo(&once), once);
        }
    }

    #[test]
    fn unknown_action_type_fails_to_parse() {
        let err = serde_json::from_str::<Action>(r#"{"type":"teleport","x":1}"#);
        assert!(err.is_err());
    }
}
