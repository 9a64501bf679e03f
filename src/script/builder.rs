//! Renders recorded steps into a deterministic Playwright script plus the
//! sidecar the replayer and healer consume.
//!
//! Every translation is a pure function of the recorded `(action,
//! element info)` pair, so rebuilding from the same sidecar always yields
//! byte-identical code.

use crate::actions::{normalize_key_combo, Action, ScrollDirection};
use crate::browser::Locator;

use super::locator::build_locator;
use super::sidecar::{RecordedStep, SidecarTest, SuiteSidecar};

/// A generated script and its sidecar, built together so they cannot drift.
#[derive(Debug, Clone)]
pub struct BuiltScript {
    pub code: String,
    pub sidecar: SuiteSidecar,
}

pub struct ScriptBuilder {
    default_base_url: String,
}

impl ScriptBuilder {
    pub fn new(default_base_url: impl Into<String>) -> Self {
        Self {
            default_base_url: default_base_url.into(),
        }
    }

    /// Build the suite script from per-test recorded steps, in suite order.
    pub fn build(&self, suite_name: &str, tests: &[(String, Vec<RecordedStep>)]) -> BuiltScript {
        let mut code = String::new();
        code.push_str("import { test, expect } from '@playwright/test';\n\n");
        code.push_str(&format!(
            "const BASE_URL = process.env.ZENTEST_BASE_URL ?? '{}';\n\n",
            escape_ts(&self.default_base_url)
        ));
        code.push_str(&format!(
            "test.describe.serial('{}', () => {{\n",
            escape_ts(suite_name)
        ));
        code.push_str("  let page;\n\n");
        code.push_str("  test.beforeAll(async ({ browser }) => {\n");
        code.push_str("    page = await browser.newPage();\n");
        code.push_str("  });\n");

        let mut sidecar_tests = Vec::with_capacity(tests.len());

        for (test_index, (test_name, steps)) in tests.iter().enumerate() {
            code.push_str(&format!(
                "\n  test('{}', async () => {{\n",
                escape_ts(test_name)
            ));
            if test_index == 0 {
                code.push_str("    await page.goto(BASE_URL);\n");
            }

            let mut recorded = Vec::with_capacity(steps.len());
            let mut last_assertion: Option<String> = None;
            let mut previous_fill_target: Option<Locator> = None;

            for step in steps {
                let mut step = step.clone();
                step.generated_code = None;

                if step.succeeded() {
                    let statement = translate(&step, previous_fill_target.as_ref());

                    if let Some(statement) = statement {
                        let deduplicated = step.action.is_assertion()
                            && last_assertion.as_deref() == Some(statement.as_str());
                        if !deduplicated {
                            if !step.reasoning.is_empty() {
                                code.push_str(&format!(
                                    "    // {}\n",
                                    step.reasoning.replace('\n', " ")
                                ));
                            }
                            code.push_str(&format!("    {}\n", statement));
                            if step.action.is_assertion() {
                                last_assertion = Some(statement.clone());
                            } else {
                                last_assertion = None;
                            }
                            step.generated_code = Some(statement);
                        }
                    } else {
                        last_assertion = None;
                    }
                }

                previous_fill_target = fill_target(&step);
                recorded.push(step);
            }

            code.push_str("  });\n");
            sidecar_tests.push(SidecarTest {
                name: test_name.clone(),
                steps: recorded,
            });
        }

        code.push_str("});\n");

        BuiltScript {
            code,
            sidecar: SuiteSidecar {
                tests: sidecar_tests,
            },
        }
    }
}

/// Locator a later bare `type` should fill, if this step focused a
/// text input.
fn fill_target(step: &RecordedStep) -> Option<Locator> {
    if !step.succeeded() {
        return None;
    }
    match &step.action {
        Action::Click { .. } | Action::SelectInput { .. } => {
            let info = step.element_info.as_ref()?;
            if info.is_input_like() {
                build_locator(info)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Render one action as a script statement. `None` means the action is not
/// round-tripped (drag, raw mouse events, screenshots, done).
fn translate(step: &RecordedStep, previous_fill_target: Option<&Locator>) -> Option<String> {
    match &step.action {
        Action::Click { x, y, .. } => {
            let statement = match step.element_info.as_ref().and_then(build_locator) {
                Some(locator) => format!("await {}.click();", locator_expr(&locator)),
                None => format!("await page.mouse.click({}, {});", x, y),
            };
            Some(statement)
        }
        Action::DoubleClick { x, y } => {
            let statement = match step.element_info.as_ref().and_then(build_locator) {
                Some(locator) => format!("await {}.dblclick();", locator_expr(&locator)),
                None => format!("await page.mouse.dblclick({}, {});", x, y),
            };
            Some(statement)
        }
        Action::ClickButton { name, .. } => Some(format!(
            "await {}.click();",
            locator_expr(&Locator::Role {
                role: "button".to_string(),
                name: name.clone(),
                exact: step.action.exact_match(),
            })
        )),
        Action::ClickText { text, .. } => Some(format!(
            "await {}.click();",
            locator_expr(&Locator::Text {
                text: text.clone(),
                exact: step.action.exact_match(),
            })
        )),
        Action::SelectInput { field, value, .. } => {
            let field = escape_ts(field);
            Some(format!(
                "await page.getByLabel('{field}').or(page.getByPlaceholder('{field}')).or(page.getByRole('textbox', {{ name: '{field}' }})).first().fill('{}');",
                escape_ts(value)
            ))
        }
        Action::Type { text } => Some(match previous_fill_target {
            Some(locator) => format!(
                "await {}.fill('{}');",
                locator_expr(locator),
                escape_ts(text)
            ),
            None => format!("await page.keyboard.type('{}');", escape_ts(text)),
        }),
        Action::Key { combo } => Some(format!(
            "await page.keyboard.press('{}');",
            escape_ts(&normalize_key_combo(combo))
        )),
        Action::Scroll {
            direction, amount, ..
        } => {
            let delta = match direction {
                ScrollDirection::Down => *amount,
                ScrollDirection::Up => -*amount,
            };
            Some(format!("await page.mouse.wheel(0, {});", delta))
        }
        Action::Wait { ms } => Some(format!("await page.waitForTimeout({});", ms)),
        Action::AssertText { text } => Some(format!(
            "await expect(page.getByText('{}').first()).toBeVisible();",
            escape_ts(text)
        )),
        Action::AssertNotText { text } => Some(format!(
            "await expect(page.getByText('{}')).toHaveCount(0);",
            escape_ts(text)
        )),
        Action::AssertVisible { .. } => step
            .element_info
            .as_ref()
            .and_then(build_locator)
            .map(|locator| format!("await expect({}).toBeVisible();", locator_expr(&locator))),
        // Not round-tripped: replay covers these from the sidecar.
        Action::MouseMove { .. }
        | Action::MouseDown { .. }
        | Action::MouseUp { .. }
        | Action::Drag { .. }
        | Action::Screenshot
        | Action::Done { .. } => None,
    }
}

/// Render a locator as a Playwright expression.
pub fn locator_expr(locator: &Locator) -> String {
    match locator {
        Locator::TestId(id) => format!("page.getByTestId('{}')", escape_ts(id)),
        Locator::Role { role, name, exact } => {
            if *exact {
                format!(
                    "page.getByRole('{}', {{ name: '{}', exact: true }})",
                    escape_ts(role),
                    escape_ts(name)
                )
            } else {
                format!(
                    "page.getByRole('{}', {{ name: '{}' }})",
                    escape_ts(role),
                    escape_ts(name)
                )
            }
        }
        Locator::Label(label) => format!("page.getByLabel('{}')", escape_ts(label)),
        Locator::Placeholder(placeholder) => {
            format!("page.getByPlaceholder('{}')", escape_ts(placeholder))
        }
        Locator::Text { text, exact } => {
            if *exact {
                format!("page.getByText('{}', {{ exact: true }})", escape_ts(text))
            } else {
                format!("page.getByText('{}')", escape_ts(text))
            }
        }
        Locator::Css(selector) => format!("page.locator('{}')", escape_ts(selector)),
    }
}

/// Escape for a single-quoted TS string literal.
fn escape_ts(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('\'', "\\'")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::ElementInfo;
    use crate::script::sidecar::StepMode;
    use chrono::Utc;

    fn step(action: Action) -> RecordedStep {
        RecordedStep {
            action,
            reasoning: String::new(),
            element_info: None,
            screenshot: None,
            generated_code: None,
            error: None,
            timestamp: Utc::now(),
            mode: StepMode::Agentic,
        }
    }

    fn login_steps() -> Vec<RecordedStep> {
        vec![
            step(Action::SelectInput {
                field: "Email".to_string(),
                value: "foo@example.com".to_string(),
                exact: None,
            }),
            step(Action::SelectInput {
                field: "Password".to_string(),
                value: "hunter2".to_string(),
                exact: None,
            }),
            step(Action::ClickButton {
                name: "Sign In".to_string(),
                exact: None,
            }),
            step(Action::AssertText {
                text: "Welcome".to_string(),
            }),
            step(Action::Done {
                success: true,
                reason: "logged in".to_string(),
            }),
        ]
    }

    #[test]
    fn happy_path_script_has_five_statements() {
        let built = ScriptBuilder::new("http://localhost:3000")
            .build("auth", &[("login".to_string(), login_steps())]);

        let statements: Vec<&str> = built
            .code
            .lines()
            .filter(|line| line.trim_start().starts_with("await "))
            .collect();
        // goto + 2 fills + 1 click + 1 assert; done emits nothing.
        assert_eq!(statements.len(), 5, "script:\n{}", built.code);
        assert!(built.code.contains("await page.goto(BASE_URL);"));
        assert!(built.code.contains(
            "page.getByRole('button', { name: 'Sign In', exact: true }).click()"
        ));
        assert!(built
            .code
            .contains("await expect(page.getByText('Welcome').first()).toBeVisible();"));
        assert_eq!(built.sidecar.tests.len(), 1);
        assert_eq!(built.sidecar.tests[0].steps.len(), 5);
    }

    #[test]
    fn only_first_test_navigates() {
        let built = ScriptBuilder::new("http://localhost:3000").build(
            "suite",
            &[
                ("first".to_string(), vec![step(Action::Wait { ms: 1 })]),
                ("second".to_string(), vec![step(Action::Wait { ms: 2 })]),
            ],
        );
        assert_eq!(built.code.matches("await page.goto(BASE_URL);").count(), 1);
        assert!(built.code.contains("test.describe.serial('suite'"));
    }

    #[test]
    fn consecutive_identical_assertions_are_deduplicated() {
        let assert_step = step(Action::AssertText {
            text: "Saved".to_string(),
        });
        let built = ScriptBuilder::new("http://x").build(
            "s",
            &[("t".to_string(), vec![assert_step.clone(), assert_step])],
        );
        assert_eq!(
            built
                .code
                .matches("await expect(page.getByText('Saved').first()).toBeVisible();")
                .count(),
            1
        );
    }

    #[test]
    fn failed_steps_emit_nothing_but_stay_in_sidecar() {
        let mut failed = step(Action::ClickButton {
            name: "Missing".to_string(),
            exact: None,
        });
        failed.error = Some("element not found".to_string());

        let built =
            ScriptBuilder::new("http://x").build("s", &[("t".to_string(), vec![failed])]);
        assert!(!built.code.contains("Missing"));
        assert_eq!(built.sidecar.tests[0].steps.len(), 1);
        assert!(built.sidecar.tests[0].steps[0].generated_code.is_none());
    }

    #[test]
    fn click_with_element_info_uses_locator_and_falls_back_to_coordinates() {
        let mut with_info = step(Action::Click {
            x: 10.0,
            y: 20.0,
            button: None,
        });
        with_info.element_info = Some(ElementInfo {
            tag: "button".to_string(),
            text: Some("Go".to_string()),
            ..Default::default()
        });
        let bare = step(Action::Click {
            x: 30.0,
            y: 40.0,
            button: None,
        });

        let built = ScriptBuilder::new("http://x")
            .build("s", &[("t".to_string(), vec![with_info, bare])]);
        assert!(built
            .code
            .contains("await page.getByRole('button', { name: 'Go', exact: true }).click();"));
        assert!(built.code.contains("await page.mouse.click(30, 40);"));
    }

    #[test]
    fn type_after_input_click_becomes_a_fill() {
        let mut click = step(Action::Click {
            x: 5.0,
            y: 5.0,
            button: None,
        });
        click.element_info = Some(ElementInfo {
            tag: "input".to_string(),
            placeholder: Some("Search".to_string()),
            ..Default::default()
        });
        let typed = step(Action::Type {
            text: "rust".to_string(),
        });

        let built =
            ScriptBuilder::new("http://x").build("s", &[("t".to_string(), vec![click, typed])]);
        assert!(built.code.contains(
            "await page.getByRole('textbox', { name: 'Search', exact: true }).fill('rust');"
        ));
    }

    #[test]
    fn bare_type_uses_keyboard() {
        let built = ScriptBuilder::new("http://x").build(
            "s",
            &[(
                "t".to_string(),
                vec![step(Action::Type {
                    text: "it's".to_string(),
                })],
            )],
        );
        assert!(built.code.contains("await page.keyboard.type('it\\'s');"));
    }

    #[test]
    fn reasoning_is_attached_as_comment() {
        let mut wait = step(Action::Wait { ms: 100 });
        wait.reasoning = "give the modal time to close".to_string();
        let built =
            ScriptBuilder::new("http://x").build("s", &[("t".to_string(), vec![wait])]);
        assert!(built.code.contains("    // give the modal time to close\n"));
    }

    #[test]
    fn drag_and_raw_mouse_events_are_not_rendered() {
        let built = ScriptBuilder::new("http://x").build(
            "s",
            &[(
                "t".to_string(),
                vec![
                    step(Action::Drag {
                        sx: 1.0,
                        sy: 2.0,
                        ex: 3.0,
                        ey: 4.0,
                    }),
                    step(Action::MouseDown { x: 1.0, y: 1.0 }),
                    step(Action::MouseUp { x: 1.0, y: 1.0 }),
                    step(Action::Screenshot),
                ],
            )],
        );
        let statements: Vec<&str> = built
            .code
            .lines()
            .filter(|line| line.trim_start().starts_with("await ") && !line.contains("goto"))
            .collect();
        assert!(statements.is_empty(), "unexpected: {:?}", statements);
        assert_eq!(built.sidecar.tests[0].steps.len(), 4);
    }

    #[test]
    fn rebuilding_from_sidecar_is_deterministic() {
        let builder = ScriptBuilder::new("http://localhost:3000");
        let first = builder.build("auth", &[("login".to_string(), login_steps())]);
        let steps_back: Vec<(String, Vec<RecordedStep>)> = first
            .sidecar
            .tests
            .iter()
            .map(|t| (t.name.clone(), t.steps.clone()))
            .collect();
        let second = builder.build("auth", &steps_back);
        assert_eq!(first.code, second.code);
    }
}
