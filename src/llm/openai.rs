//! OpenAI chat-completions client (also the wire shape OpenRouter speaks).

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{with_retry, ModelClient, ModelError, ModelReply, ModelRequest, TokenUsage};

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

pub struct OpenAiClient {
    client: Client,
    api_key: String,
    model: String,
    api_base: String,
}

impl OpenAiClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .expect("reqwest client"),
            api_key,
            model,
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub(crate) async fn invoke(&self, request: &ModelRequest) -> Result<ModelReply, ModelError> {
        let mut user_content = Vec::new();
        if let Some(png) = &request.image_png {
            user_content.push(UserContent::ImageUrl {
                image_url: ImageUrl {
                    url: format!("data:image/png;base64,{}", BASE64.encode(png)),
                },
            });
        }
        user_content.push(UserContent::Text {
            text: request.user_text.clone(),
        });

        let body = ChatCompletionRequest {
            model: self.model.clone(),
            response_format: ResponseFormat {
                r#type: "json_object".to_string(),
            },
            messages: vec![
                ChatMessage::System {
                    content: request.system.clone(),
                },
                ChatMessage::User {
                    content: user_content,
                },
            ],
        };

        let url = format!(
            "{}/chat/completions",
            self.api_base.trim_end_matches('/')
        );
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| ModelError::Transport(err.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "<response unavailable>".to_string());
            return Err(ModelError::Http { status, message });
        }

        let payload: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|err| ModelError::InvalidPayload(err.to_string()))?;

        let text = payload
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();
        if text.is_empty() {
            return Err(ModelError::EmptyResponse);
        }

        let usage = payload.usage.map(|u| TokenUsage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        });

        Ok(ModelReply { text, usage })
    }
}

#[async_trait]
impl ModelClient for OpenAiClient {
    async fn next(&self, request: &ModelRequest) -> Result<ModelReply, ModelError> {
        with_retry(|| Box::pin(self.invoke(request))).await
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    response_format: ResponseFormat,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    r#type: String,
}

#[derive(Debug, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
enum ChatMessage {
    System { content: String },
    User { content: Vec<UserContent> },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum UserContent {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u64,
    completion_tokens: u64,
}
