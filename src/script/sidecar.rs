//! The sidecar: raw recorded steps persisted next to the generated script.
//!
//! `<suite>.steps.json` is the single source of truth linking the script
//! file back to the recorded intent; the replayer and the healer both read
//! it. Screenshots live only in memory and are never serialized.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::actions::Action;
use crate::browser::ElementInfo;
use crate::errors::ZentestError;

/// How a step was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepMode {
    Agentic,
    Replay,
}

impl Default for StepMode {
    fn default() -> Self {
        StepMode::Agentic
    }
}

/// One recorded interaction. Never mutated after creation; owned by the
/// in-flight test and flushed to the sidecar only on success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedStep {
    pub action: Action,
    pub reasoning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_info: Option<ElementInfo>,
    /// Retained only while the test runs; not serialized.
    #[serde(skip)]
    pub screenshot: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub mode: StepMode,
}

impl RecordedStep {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Recorded steps for one test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SidecarTest {
    pub name: String,
    pub steps: Vec<RecordedStep>,
}

/// Persisted per-suite sidecar.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SuiteSidecar {
    pub tests: Vec<SidecarTest>,
}

impl SuiteSidecar {
    pub fn test(&self, name: &str) -> Option<&SidecarTest> {
        self.tests.iter().find(|t| t.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.test(name).is_some()
    }

    pub async fn load(path: &Path) -> Result<Self, ZentestError> {
        let raw = tokio::fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub async fn save(&self, path: &Path) -> Result<(), ZentestError> {
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_step() -> RecordedStep {
        RecordedStep {
            action: Action::ClickButton {
                name: "Sign In".to_string(),
                exact: None,
            },
            reasoning: "submit the login form".to_string(),
            element_info: Some(ElementInfo {
                tag: "button".to_string(),
                text: Some("Sign In".to_string()),
                ..Default::default()
            }),
            screenshot: Some(vec![1, 2, 3]),
            generated_code: Some("await page.getByRole('button', { name: 'Sign In', exact: true }).click();".to_string()),
            error: None,
            timestamp: Utc::now(),
            mode: StepMode::Agentic,
        }
    }

    #[test]
    fn serialization_round_trips_ignoring_screenshots() {
        let sidecar = SuiteSidecar {
            tests: vec![SidecarTest {
                name: "login".to_string(),
                steps: vec![sample_step()],
            }],
        };

        let json = serde_json::to_string(&sidecar).unwrap();
        assert!(!json.contains("screenshot"));

        let back: SuiteSidecar = serde_json::from_str(&json).unwrap();
        let mut expected = sidecar.clone();
        expected.tests[0].steps[0].screenshot = None;
        assert_eq!(back, expected);
    }

    #[test]
    fn steps_with_errors_are_preserved() {
        let mut step = sample_step();
        step.error = Some("element not found".to_string());
        let json = serde_json::to_string(&step).unwrap();
        let back: RecordedStep = serde_json::from_str(&json).unwrap();
        assert!(!back.succeeded());
        assert_eq!(back.error.as_deref(), Some("element not found"));
    }

    #[test]
    fn lookup_by_test_name() {
        let sidecar = SuiteSidecar {
            tests: vec![SidecarTest {
                name: "login".to_string(),
                steps: vec![],
            }],
        };
        assert!(sidecar.contains("login"));
        assert!(!sidecar.contains("dashboard"));
    }
}
