//! Scripted chat model for tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::domain::ports::{ChatError, ChatModel};

type Responder = Box<dyn Fn(&str, usize) -> Result<String, ChatError> + Send + Sync>;

/// Answers every prompt through a closure that sees the prompt and the
/// zero-based call number. Counts calls.
pub struct MockChatModel {
    worker_id: String,
    responder: Responder,
    calls: AtomicUsize,
}

impl MockChatModel {
    /// Model answering through `responder`.
    pub fn new<F>(worker_id: impl Into<String>, responder: F) -> Self
    where
        F: Fn(&str, usize) -> Result<String, ChatError> + Send + Sync + 'static,
    {
        Self {
            worker_id: worker_id.into(),
            responder: Box::new(responder),
            calls: AtomicUsize::new(0),
        }
    }

    /// Always returns the same text.
    pub fn constant(worker_id: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        Self::new(worker_id, move |_, _| Ok(text.clone()))
    }

    /// Always fails with the given error.
    pub fn failing(worker_id: impl Into<String>, error: ChatError) -> Self {
        Self::new(worker_id, move |_, _| Err(error.clone()))
    }

    /// Number of `complete` calls so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatModel for MockChatModel {
    fn model_id(&self) -> &str {
        &self.worker_id
    }

    async fn complete(&self, prompt: &str) -> Result<String, ChatError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        (self.responder)(prompt, call)
    }
}
