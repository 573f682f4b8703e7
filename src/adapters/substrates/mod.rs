//! Chat model implementations.

pub mod anthropic_api;
pub mod mock;
pub mod openai_compat;
pub mod rate_limited;
pub mod registry;

pub use anthropic_api::AnthropicChatModel;
pub use mock::MockChatModel;
pub use openai_compat::OpenAiCompatibleChatModel;
pub use rate_limited::RateLimitedChatModel;
pub use registry::{split_worker_id, ModelConstructor, ModelRegistry};

use reqwest::{Client, Response};
use std::time::Duration;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::ProviderConfig;
use crate::domain::ports::ChatError;

fn build_http_client(config: &ProviderConfig) -> DomainResult<Client> {
    Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| DomainError::Configuration(format!("Failed to create HTTP client: {e}")))
}

/// Turn a non-2xx response into `ChatError::Http`, keeping the body so that
/// provider error types (e.g. `rate_limit_error`) stay visible.
async fn error_for_status(response: Response) -> Result<Response, ChatError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ChatError::Http { status: status.as_u16(), body })
}
