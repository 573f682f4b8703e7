//! Anthropic Messages API chat model.

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::{build_http_client, error_for_status};
use crate::domain::errors::DomainResult;
use crate::domain::models::ProviderConfig;
use crate::domain::ports::{ChatError, ChatModel};

const API_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: [UserMessage<'a>; 1],
}

#[derive(Debug, Serialize)]
struct UserMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

/// A worker backed by the Anthropic Messages API.
pub struct AnthropicChatModel {
    worker_id: String,
    model: String,
    api_key: String,
    config: ProviderConfig,
    client: Client,
}

impl AnthropicChatModel {
    /// `model` is the part of the worker id after `anthropic:`.
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
impl ChatModel for AnthropicChatModel {
    fn model_id(&self) -> &str {
        &self.worker_id
    }

    async fn complete(&self, prompt: &str) -> Result<String, ChatError> {
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            messages: [UserMessage { role: "user", content: prompt }],
        };

        let started = Instant::now();
        let response = self
            .client
            .post(format!("{}/v1/messages", self.config.base_url.trim_end_matches('/')))
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChatError::Transport(e.to_string()))?;

        let response = error_for_status(response).await?;
        let result: MessagesResponse = response
            .json()
            .await
            .map_err(|e| ChatError::MalformedResponse(e.to_string()))?;

        let text = result
            .content
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text),
                ContentBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n");

        if text.is_empty() {
            return Err(ChatError::MalformedResponse("response has no text content".to_string()));
        }

        tracing::debug!(
            worker = %self.worker_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            chars = text.len(),
            "Anthropic completion received"
        );
        Ok(text)
    }
}
