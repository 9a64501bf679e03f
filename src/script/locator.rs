//! Derive a stable locator from recorded element info.
//!
//! The builder renders these locators into the script and the replayer
//! resolves the very same values live, so both agree on what a step
//! targets. Inputs and buttons never fall back to a raw CSS selector; a
//! `None` here makes the caller use the recorded coordinate instead.

use crate::browser::{ElementInfo, Locator};

/// Tags whose bare selector is too generic to be worth emitting.
const GENERIC_SELECTORS: &[&str] = &[
    "p", "h1", "h2", "h3", "h4", "h5", "h6", "div", "span", "a", "button", "input", "textarea",
    "label", "form", "section", "article", "header", "footer", "nav", "main", "aside",
];

/// Best locator for an element, in priority order: data-testid, inferred
/// role + accessible name (which covers associated-label text for inputs),
/// placeholder, exact text, #id, and finally the raw selector if it is
/// specific enough.
pub fn build_locator(info: &ElementInfo) -> Option<Locator> {
    if let Some(test_id) = test_id_from_selector(info.selector.as_deref()) {
        return Some(Locator::TestId(test_id));
    }

    if let Some(locator) = role_locator(info) {
        return Some(locator);
    }

    if let Some(placeholder) = info.placeholder.as_deref().filter(|s| !s.is_empty()) {
        return Some(Locator::Placeholder(placeholder.to_string()));
    }

    if let Some(text) = info.text.as_deref().filter(|s| !s.is_empty()) {
        return Some(Locator::Text {
            text: text.to_string(),
            exact: true,
        });
    }

    if let Some(id) = info.id.as_deref().filter(|s| !s.is_empty()) {
        return Some(Locator::Css(format!("#{}", id)));
    }

    // Raw selectors are brittle for interactive elements; better to click
    // the recorded coordinate than to pin a class chain.
    if info.is_input_like() || info.is_button_like() {
        return None;
    }

    info.selector
        .as_deref()
        .filter(|selector| !GENERIC_SELECTORS.contains(selector))
        .map(|selector| Locator::Css(selector.to_string()))
}

fn test_id_from_selector(selector: Option<&str>) -> Option<String> {
    let selector = selector?;
    let rest = selector.strip_prefix("[data-testid=\"")?;
    let end = rest.find('"')?;
    Some(rest[..end].to_string())
}

/// Infer role + accessible name. For inputs the role defaults to textbox;
/// the accessible name comes from ariaLabel, else the associated label
/// text, else name, else placeholder.
fn role_locator(info: &ElementInfo) -> Option<Locator> {
    let role = info
        .role
        .clone()
        .or_else(|| implicit_role(&info.tag))?;

    let name = info
        .aria_label
        .clone()
        .or_else(|| info.name.clone())
        .or_else(|| {
            if role == "button" || role == "link" {
                info.text.clone()
            } else {
                None
            }
        })
        .or_else(|| info.placeholder.clone())
        .filter(|name| !name.is_empty())?;

    Some(Locator::Role {
        role,
        name,
        exact: true,
    })
}

fn implicit_role(tag: &str) -> Option<String> {
    match tag {
        "button" => Some("button".to_string()),
        "a" => Some("link".to_string()),
        "input" | "textarea" => Some("textbox".to_string()),
        "select" => Some("combobox".to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(tag: &str) -> ElementInfo {
        ElementInfo {
            tag: tag.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_id_wins_over_everything() {
        let element = ElementInfo {
            selector: Some("[data-testid=\"submit-btn\"]".to_string()),
            aria_label: Some("Submit the form".to_string()),
            id: Some("submit".to_string()),
            ..info("button")
        };
        assert_eq!(
            build_locator(&element),
            Some(Locator::TestId("submit-btn".to_string()))
        );
    }

    #[test]
    fn button_uses_role_and_text() {
        let element = ElementInfo {
            text: Some("Sign In".to_string()),
            ..info("button")
        };
        assert_eq!(
            build_locator(&element),
            Some(Locator::Role {
                role: "button".to_string(),
                name: "Sign In".to_string(),
                exact: true,
            })
        );
    }

    #[test]
    fn input_defaults_to_textbox_role_with_label_name() {
        let element = ElementInfo {
            name: Some("Email".to_string()),
            ..info("input")
        };
        assert_eq!(
            build_locator(&element),
            Some(Locator::Role {
                role: "textbox".to_string(),
                name: "Email".to_string(),
                exact: true,
            })
        );
    }

    #[test]
    fn input_without_name_falls_back_to_placeholder() {
        let element = ElementInfo {
            placeholder: Some("you@example.com".to_string()),
            ..info("input")
        };
        // Placeholder feeds the accessible name of the textbox role first.
        assert_eq!(
            build_locator(&element),
            Some(Locator::Role {
                role: "textbox".to_string(),
                name: "you@example.com".to_string(),
                exact: true,
            })
        );
    }

    #[test]
    fn inputs_never_get_raw_selectors() {
        let element = ElementInfo {
            class: Some("form-control x9f2".to_string()),
            selector: Some("input.form-control.x9f2".to_string()),
            ..info("input")
        };
        assert_eq!(build_locator(&element), None);
    }

    #[test]
    fn generic_selector_is_rejected() {
        let element = ElementInfo {
            selector: Some("div".to_string()),
            ..info("div")
        };
        assert_eq!(build_locator(&element), None);
    }

    #[test]
    fn specific_selector_survives_for_non_interactive() {
        let element = ElementInfo {
            selector: Some("div.banner.hero".to_string()),
            ..info("div")
        };
        assert_eq!(
            build_locator(&element),
            Some(Locator::Css("div.banner.hero".to_string()))
        );
    }

    #[test]
    fn id_beats_raw_selector() {
        let element = ElementInfo {
            id: Some("hero".to_string()),
            selector: Some("#hero".to_string()),
            ..info("div")
        };
        assert_eq!(
            build_locator(&element),
            Some(Locator::Css("#hero".to_string()))
        );
    }
}
