//! Client-side request budget around any chat model.

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::{ChatError, ChatModel};

/// Waits for a slot from a per-minute quota before each call.
pub struct RateLimitedChatModel {
    inner: Arc<dyn ChatModel>,
    limiter: DefaultDirectRateLimiter,
}

impl RateLimitedChatModel {
    /// Fails when `requests_per_minute` is zero.
    pub fn new(inner: Arc<dyn ChatModel>, requests_per_minute: u32) -> DomainResult<Self> {
        let per_minute = NonZeroU32::new(requests_per_minute).ok_or_else(|| {
            DomainError::Configuration(format!("requests_per_minute for '{}' must be positive", inner.model_id()))
        })?;
        Ok(Self {
            inner,
            limiter: RateLimiter::direct(Quota::per_minute(per_minute)),
        })
    }
}

#[async_trait]
impl ChatModel for RateLimitedChatModel {
    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    async fn complete(&self, prompt: &str) -> Result<String, ChatError> {
        self.limiter.until_ready().await;
        self.inner.complete(prompt).await
    }
}
