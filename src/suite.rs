//! Test suite model and the markdown suite-file parser.
//!
//! One markdown file per suite: the `#` heading names the suite (falling
//! back to the file stem), every `##` heading starts a test, and the lines
//! until the next `##` form its plain-English description. Ordering is
//! significant: tests share browser state and run serially.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::ZentestError;

/// A single plain-English test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Test {
    /// Stable identifier, taken from the `##` heading.
    pub name: String,
    /// Free-form natural language description of what to do and verify.
    pub description: String,
}

/// An ordered suite of tests sharing one browser page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSuite {
    pub name: String,
    pub tests: Vec<Test>,
}

impl TestSuite {
    /// Parse a markdown suite file.
    pub fn parse(source: &str, fallback_name: &str) -> Self {
        let mut name = fallback_name.to_string();
        let mut tests: Vec<Test> = Vec::new();
        let mut current: Option<(String, Vec<String>)> = None;

        for line in source.lines() {
            let trimmed = line.trim_end();
            if let Some(heading) = heading_text(trimmed, "## ") {
                flush_test(&mut tests, current.take());
                current = Some((heading.to_string(), Vec::new()));
            } else if let Some(heading) = heading_text(trimmed, "# ") {
                if current.is_none() && tests.is_empty() {
                    name = heading.to_string();
                }
            } else if let Some((_, lines)) = current.as_mut() {
                lines.push(trimmed.to_string());
            }
        }
        flush_test(&mut tests, current.take());

        TestSuite { name, tests }
    }

    /// Load and parse a suite file from disk.
    pub async fn load(path: &Path) -> Result<Self, ZentestError> {
        let source = tokio::fs::read_to_string(path)
            .await
            .map_err(|err| ZentestError::SuiteRead {
                path: path.to_path_buf(),
                source: err,
            })?;
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("suite");
        Ok(Self::parse(&source, stem))
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    /// Index of a test by name, if present.
    pub fn position(&self, test_name: &str) -> Option<usize> {
        self.tests.iter().position(|t| t.name == test_name)
    }
}

fn heading_text<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(prefix)?;
    let text = rest.trim();
    (!text.is_empty()).then_some(text)
}

fn flush_test(tests: &mut Vec<Test>, pending: Option<(String, Vec<String>)>) {
    if let Some((name, lines)) = pending {
        let description = lines.join("\n").trim().to_string();
        // Empty tests are dropped.
        if !description.is_empty() {
            tests.push(Test { name, description });
        }
    }
}
