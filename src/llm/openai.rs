//! OpenAI-compatible chat-completions gateway over `reqwest`.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{ChatMessage, CompletionGateway};
use crate::assistant::instruction_for;
use crate::config::ProviderConfig;
use crate::error::{ConfigError, Error, ProviderError};

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Gateway that talks to an OpenAI-style `/chat/completions` endpoint.
pub struct OpenAiGateway {
    http: reqwest::Client,
    model: String,
    endpoint: String,
    temperature: f32,
}

impl OpenAiGateway {
    /// Build the gateway. An empty credential is a configuration error.
    pub fn new(config: &ProviderConfig) -> Result<Self, Error> {
        let key = config.api_key.expose_secret();
        if key.trim().is_empty() {
            return Err(ConfigError::MissingEnvVar("OPENAI_API_KEY".to_string()).into());
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", key)).map_err(|e| {
            ConfigError::InvalidValue {
                key: "OPENAI_API_KEY".to_string(),
                message: e.to_string(),
            }
        })?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| ProviderError::RequestFailed(format!("Failed to build client: {e}")))?;

        tracing::info!("Using completion provider (model: {})", config.model);

        Ok(Self {
            http,
            model: config.model.clone(),
            endpoint: config.endpoint.clone(),
            temperature: config.temperature,
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl CompletionGateway for OpenAiGateway {
    async fn complete(
        &self,
        assistant_type: &str,
        messages: &[ChatMessage],
    ) -> Result<String, Error> {
        let mut api_messages = Vec::with_capacity(messages.len() + 1);
        api_messages.push(ChatMessage::system(instruction_for(assistant_type)));
        api_messages.extend_from_slice(messages);

        let request = ChatRequest {
            model: &self.model,
            messages: api_messages,
            temperature: self.temperature,
        };

        debug!(
            assistant_type,
            messages = messages.len(),
            "Sending completion request"
        );

        let response = self
            .http
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::RequestFailed(format!("Failed to read body: {e}")))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorEnvelope>(&body)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| "Unknown error from completion provider".to_string());
            warn!(status = status.as_u16(), %message, "Completion provider returned an error");
            return Err(ProviderError::Status {
                status: status.as_u16(),
                message,
            }
            .into());
        }

        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::InvalidResponse(format!("Unexpected payload: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| {
                ProviderError::InvalidResponse("Missing choices[0].message.content".to_string())
                    .into()
            })
    }
}
