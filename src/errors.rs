//! Top-level error type.
//!
//! Subsystem errors (page, model, replay, healing) live next to their
//! modules; this enum covers the infrastructure failures that are fatal at
//! process level.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ZentestError {
    #[error("failed to read suite file {path}: {source}")]
    SuiteRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to load configuration: {0}")]
    Config(String),

    #[error("missing API key for provider '{0}' (set ZENTEST_{1}_API_KEY or config apiKey)")]
    MissingApiKey(String, String),

    #[error("unknown environment '{0}' (not present in config environments)")]
    UnknownEnvironment(String),

    #[error("static runner not found: {0}")]
    StaticRunnerMissing(String),

    #[error("no base URL configured (set baseUrl in zentest.yaml or ZENTEST_BASE_URL)")]
    MissingBaseUrl,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
