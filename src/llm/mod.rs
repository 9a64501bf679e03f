//! Model clients: one capability (`next`) over interchangeable providers.
//!
//! The driver never touches a provider SDK surface; each client owns its
//! HTTP shape and its retry policy.

pub mod anthropic;
pub mod openai;
pub mod openrouter;
mod utils;

use std::ops::AddAssign;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::config::{Config, Provider};
use crate::errors::ZentestError;

pub use anthropic::AnthropicClient;
pub use openai::OpenAiClient;
pub use openrouter::OpenRouterClient;
pub use utils::extract_json_payload;

/// Which configured model identifier a client is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelRole {
    Agentic,
    Builder,
    Healer,
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("provider returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("provider request failed: {0}")]
    Transport(String),

    #[error("provider response was empty")]
    EmptyResponse,

    #[error("provider response invalid: {0}")]
    InvalidPayload(String),
}

impl ModelError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ModelError::Http { status, .. } => *status == 429 || *status >= 500,
            ModelError::Transport(_) => true,
            _ => false,
        }
    }
}

/// Aggregated token counts, when the provider reports them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, other: Self) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// One model invocation: system prompt, user text, optional screenshot.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub system: String,
    pub user_text: String,
    pub image_png: Option<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct ModelReply {
    pub text: String,
    pub usage: Option<TokenUsage>,
}

/// The single capability the driver depends on.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn next(&self, request: &ModelRequest) -> Result<ModelReply, ModelError>;

    fn model(&self) -> &str;
}

/// Bounded exponential retry shared by the providers: up to 3 attempts,
/// doubling delay capped at 10s, only for transient failures.
pub(crate) async fn with_retry<'a, F>(mut op: F) -> Result<ModelReply, ModelError>
where
    F: FnMut() -> BoxFuture<'a, Result<ModelReply, ModelError>>,
{
    const MAX_ATTEMPTS: u32 = 3;
    let mut delay = Duration::from_secs(1);
    let mut last_err = None;

    for attempt in 1..=MAX_ATTEMPTS {
        match op().await {
            Ok(reply) => return Ok(reply),
            Err(err) if err.is_retryable() && attempt < MAX_ATTEMPTS => {
                warn!(attempt, error = %err, "model request failed, retrying");
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(Duration::from_secs(10));
                last_err = Some(err);
            }
            Err(err) => return Err(err),
        }
    }
    Err(last_err.unwrap_or(ModelError::EmptyResponse))
}

/// Instantiate the configured provider for a role.
pub fn build_client(config: &Config, role: ModelRole) -> Result<Arc<dyn ModelClient>, ZentestError> {
    let api_key = config.resolve_api_key()?;
    let model = match role {
        ModelRole::Agentic => config.models.agentic_model.clone(),
        ModelRole::Builder => config.models.builder_model.clone(),
        ModelRole::Healer => config.models.healer_model.clone(),
    };

    let client: Arc<dyn ModelClient> = match config.provider {
        Provider::Anthropic => Arc::new(AnthropicClient::new(api_key, model)),
        Provider::OpenAi => Arc::new(OpenAiClient::new(api_key, model)),
        Provider::OpenRouter => Arc::new(OpenRouterClient::new(api_key, model)),
    };
    Ok(client)
}
