//! OpenRouter client: OpenAI-compatible wire format, different endpoint.

use async_trait::async_trait;

use super::openai::OpenAiClient;
use super::{with_retry, ModelClient, ModelError, ModelReply, ModelRequest};

const API_BASE: &str = "https://openrouter.ai/api/v1";

pub struct OpenRouterClient {
    inner: OpenAiClient,
}

impl OpenRouterClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            inner: OpenAiClient::new(api_key, model).with_api_base(API_BASE),
        }
    }
}

#[async_trait]
impl ModelClient for OpenRouterClient {
    async fn next(&self, request: &ModelRequest) -> Result<ModelReply, ModelError> {
        with_retry(|| Box::pin(self.inner.invoke(request))).await
    }

    fn model(&self) -> &str {
        self.inner.model()
    }
}
