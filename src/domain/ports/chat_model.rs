//! Chat model port.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::domain::errors::DomainResult;

/// Errors raised by a single chat completion call.
///
/// The `Display` form of [`ChatError::Http`] carries the status code in the
/// `Error code: <status>` shape so that retry classification can work on the
/// message text alone.
#[derive(Debug, Clone, Error)]
pub enum ChatError {
    #[error("Error code: {status} - {body}")]
    Http { status: u16, body: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Missing API key for provider '{0}'")]
    MissingApiKey(String),
}

/// A remote (or scripted) model that turns a prompt into text.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Worker identifier, `provider:model`.
    fn model_id(&self) -> &str;

    /// Send one prompt and return the completion text.
    async fn complete(&self, prompt: &str) -> Result<String, ChatError>;
}

/// Builds a chat model for a worker identifier.
pub trait ModelFactory: Send + Sync {
    fn create(&self, worker_id: &str) -> DomainResult<Arc<dyn ChatModel>>;
}
