//! Retry policy for remote model calls.
//!
//! Classification and backoff are separate: [`classify`] decides whether a
//! failure is worth waiting for, [`RetryPolicy`] decides how long to wait and
//! when to give up.

use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use crate::domain::models::RetryConfig;
use crate::domain::ports::{ChatError, ChatModel};

/// Why a failed call failed, as far as retrying is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// HTTP 429 or a provider `rate_limit_error`.
    RateLimited,
    /// HTTP 503.
    Unavailable,
    /// Anything else.
    Fatal,
}

impl ErrorClass {
    /// Whether waiting can help.
    pub fn is_transient(self) -> bool {
        !matches!(self, Self::Fatal)
    }
}

/// Classify an error by its message text.
pub fn classify(message: &str) -> ErrorClass {
    if message.contains("Error code: 429") || message.contains("rate_limit_error") {
        ErrorClass::RateLimited
    } else if message.contains("Error code: 503") {
        ErrorClass::Unavailable
    } else {
        ErrorClass::Fatal
    }
}

/// Tagged result of one remote call attempt.
#[derive(Debug)]
pub enum CallOutcome<T> {
    /// The call returned a value.
    Success(T),
    /// Worth another attempt after a backoff.
    Transient(ErrorClass, ChatError),
    /// Not worth retrying.
    Fatal(ChatError),
}

impl<T> From<Result<T, ChatError>> for CallOutcome<T> {
    fn from(result: Result<T, ChatError>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(err) => match classify(&err.to_string()) {
                ErrorClass::Fatal => Self::Fatal(err),
                class => Self::Transient(class, err),
            },
        }
    }
}

/// Exponential backoff capped at `max_backoff`, for at most `max_attempts`
/// attempts (the first one included).
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    /// Policy from `retry` config; at least one attempt.
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }

    /// Total attempts, the first call included.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn exponential(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_backoff)
            .with_multiplier(2.0)
            .with_randomization_factor(0.0)
            .with_max_interval(self.max_backoff)
            .with_max_elapsed_time(None)
            .build()
    }

    /// Send `prompt` to `model`, retrying transient failures.
    pub async fn complete(&self, model: &dyn ChatModel, prompt: &str) -> Result<String, ChatError> {
        let attempts = AtomicU32::new(0);
        let attempts = &attempts;
        let max_attempts = self.max_attempts;

        let started = Instant::now();
        let result = backoff::future::retry_notify(
            self.exponential(),
            move || async move {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                match CallOutcome::from(model.complete(prompt).await) {
                    CallOutcome::Success(text) => Ok(text),
                    CallOutcome::Transient(_, err) if attempt < max_attempts => Err(backoff::Error::transient(err)),
                    CallOutcome::Transient(_, err) | CallOutcome::Fatal(err) => Err(backoff::Error::permanent(err)),
                }
            },
            |err: ChatError, wait: Duration| {
                tracing::warn!(
                    worker = %model.model_id(),
                    class = ?classify(&err.to_string()),
                    wait_ms = wait.as_millis() as u64,
                    error = %err,
                    "Transient error, backing off"
                );
            },
        )
        .await;

        tracing::debug!(
            worker = %model.model_id(),
            attempts = attempts.load(Ordering::SeqCst),
            elapsed_ms = started.elapsed().as_millis() as u64,
            ok = result.is_ok(),
            "Remote call finished"
        );
        result
    }
}
