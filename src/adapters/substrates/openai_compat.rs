//! Chat Completions API models (OpenAI, Groq, Mistral and compatibles).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::{build_http_client, error_for_status};
use crate::domain::errors::DomainResult;
use crate::domain::models::ProviderConfig;
use crate::domain::ports::{ChatError, ChatModel};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}

/// A worker backed by an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiCompatibleChatModel {
    worker_id: String,
    model: String,
    api_key: String,
    config: ProviderConfig,
    client: Client,
}

impl OpenAiCompatibleChatModel {
    /// `model` is sent as-is in the request body.
    pub fn new(
        worker_id: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        config: ProviderConfig,
    ) -> DomainResult<Self> {
        let client = build_http_client(&config)?;
        Ok(Self {
            worker_id: worker_id.into(),
            model: model.into(),
            api_key: api_key.into(),
            config,
            client,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAiCompatibleChatModel {
    fn model_id(&self) -> &str {
        &self.worker_id
    }

    async fn complete(&self, prompt: &str) -> Result<String, ChatError> {
        let body = ChatRequest {
            model: &self.model,
            messages: [ChatMessage { role: "user", content: prompt }],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let started = Instant::now();
        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url.trim_end_matches('/')))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChatError::Transport(e.to_string()))?;

        let response = error_for_status(response).await?;
        let result: ChatResponse = response
            .json()
            .await
            .map_err(|e| ChatError::MalformedResponse(e.to_string()))?;

        let text = result
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ChatError::MalformedResponse("response has no choices".to_string()))?;

        tracing::debug!(
            worker = %self.worker_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            chars = text.len(),
            "Chat completion received"
        );
        Ok(text)
    }
}
