//! Provider registry: turns `provider:model` worker ids into chat models.

use std::collections::HashMap;
use std::sync::Arc;

use super::anthropic_api::AnthropicChatModel;
use super::openai_compat::OpenAiCompatibleChatModel;
use super::rate_limited::RateLimitedChatModel;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ProviderConfig, ProvidersConfig};
use crate::domain::ports::{ChatError, ChatModel, ModelFactory};

/// Builds a model from `(worker_id, model_name)`.
pub type ModelConstructor = Box<dyn Fn(&str, &str) -> DomainResult<Arc<dyn ChatModel>> + Send + Sync>;

/// Split `provider:model` at the first colon. Model names may contain colons.
pub fn split_worker_id(worker_id: &str) -> DomainResult<(&str, &str)> {
    match worker_id.split_once(':') {
        Some((provider, model)) if !provider.is_empty() && !model.is_empty() => Ok((provider, model)),
        _ => Err(DomainError::Configuration(format!(
            "worker id '{worker_id}' must have the form provider:model"
        ))),
    }
}

/// Registry of provider tags.
#[derive(Default)]
pub struct ModelRegistry {
    constructors: HashMap<String, ModelConstructor>,
}

impl ModelRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in HTTP providers.
    pub fn with_defaults(providers: &ProvidersConfig) -> Self {
        let mut registry = Self::new();

        let anthropic = providers.anthropic.clone();
        registry.register("anthropic", move |worker_id, model| {
            let api_key = resolve_api_key("anthropic", &anthropic)?;
            let chat = AnthropicChatModel::new(worker_id, model, api_key, anthropic.clone())?;
            with_rate_limit(Arc::new(chat), &anthropic)
        });

        for (tag, config) in [
            ("openai", providers.openai.clone()),
            ("groq", providers.groq.clone()),
            ("mistral", providers.mistral.clone()),
            ("gemini", providers.gemini.clone()),
        ] {
            registry.register(tag, move |worker_id, model| {
                let api_key = resolve_api_key(tag, &config)?;
                let chat = OpenAiCompatibleChatModel::new(worker_id, model, api_key, config.clone())?;
                with_rate_limit(Arc::new(chat), &config)
            });
        }

        registry
    }

    /// Add or replace a provider.
    pub fn register<F>(&mut self, tag: impl Into<String>, constructor: F)
    where
        F: Fn(&str, &str) -> DomainResult<Arc<dyn ChatModel>> + Send + Sync + 'static,
    {
        self.constructors.insert(tag.into(), Box::new(constructor));
    }

    /// Registered tags, sorted.
    pub fn providers(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }

    /// Check every worker id up front, reporting all bad ids at once.
    pub fn validate(&self, worker_ids: &[String]) -> DomainResult<()> {
        let problems: Vec<String> = worker_ids
            .iter()
            .filter_map(|id| match split_worker_id(id) {
                Ok((provider, _)) if self.constructors.contains_key(provider) => None,
                Ok((provider, _)) => Some(format!("'{id}' (unknown provider '{provider}')")),
                Err(_) => Some(format!("'{id}' (expected provider:model)")),
            })
            .collect();

        if problems.is_empty() {
            Ok(())
        } else {
            Err(DomainError::Configuration(format!(
                "invalid worker ids: {}; known providers: {}",
                problems.join(", "),
                self.providers().join(", ")
            )))
        }
    }
}

impl ModelFactory for ModelRegistry {
    fn create(&self, worker_id: &str) -> DomainResult<Arc<dyn ChatModel>> {
        let (provider, model) = split_worker_id(worker_id)?;
        let constructor = self.constructors.get(provider).ok_or_else(|| DomainError::UnknownProvider {
            provider: provider.to_string(),
            worker_id: worker_id.to_string(),
        })?;
        constructor(worker_id, model)
    }
}

fn api_key_env(tag: &str) -> String {
    format!("{}_API_KEY", tag.to_uppercase())
}

fn resolve_api_key(tag: &str, config: &ProviderConfig) -> DomainResult<String> {
    config
        .api_key
        .clone()
        .or_else(|| std::env::var(api_key_env(tag)).ok())
        .filter(|key| !key.is_empty())
        .ok_or_else(|| {
            DomainError::Configuration(format!(
                "{} (set providers.{tag}.api_key or {})",
                ChatError::MissingApiKey(tag.to_string()),
                api_key_env(tag)
            ))
        })
}

fn with_rate_limit(chat: Arc<dyn ChatModel>, config: &ProviderConfig) -> DomainResult<Arc<dyn ChatModel>> {
    match config.requests_per_minute {
        Some(rpm) => Ok(Arc::new(RateLimitedChatModel::new(chat, rpm)?)),
        None => Ok(chat),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::substrates::MockChatModel;

    fn mock_registry() -> ModelRegistry {
        let mut registry = ModelRegistry::new();
        registry.register("mock", |worker_id, _| {
            Ok(Arc::new(MockChatModel::constant(worker_id, "ok")) as Arc<dyn ChatModel>)
        });
        registry
    }

    #[test]
    fn test_split_worker_id() {
        assert_eq!(split_worker_id("groq:llama3-8b-8192").unwrap(), ("groq", "llama3-8b-8192"));
        assert_eq!(split_worker_id("ollama:llama3:8b").unwrap(), ("ollama", "llama3:8b"));
        assert!(split_worker_id("gpt-4o").is_err());
        assert!(split_worker_id(":model").is_err());
    }

    #[test]
    fn test_create_registered_provider() {
        let registry = mock_registry();
        let model = registry.create("mock:a").unwrap();
        assert_eq!(model.model_id(), "mock:a");
    }

    #[test]
    fn test_unknown_provider_fails_fast() {
        let registry = mock_registry();
        let err = registry.create("bard:x").err().unwrap();
        assert!(matches!(err, DomainError::UnknownProvider { ref provider, .. } if provider == "bard"));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_validate_reports_every_bad_id() {
        let registry = mock_registry();
        let ids = vec!["mock:a".to_string(), "bard:x".to_string(), "plain".to_string()];

        let err = registry.validate(&ids).unwrap_err().to_string();
        assert!(err.contains("bard:x"));
        assert!(err.contains("plain"));
        assert!(!err.contains("'mock:a'"));
        assert!(registry.validate(&ids[..1]).is_ok());
    }

    #[test]
    fn test_defaults_use_configured_key() {
        let mut providers = ProvidersConfig::default();
        providers.groq.api_key = Some("key".to_string());
        providers.groq.requests_per_minute = Some(30);
        let registry = ModelRegistry::with_defaults(&providers);

        assert_eq!(registry.providers(), ["anthropic", "gemini", "groq", "mistral", "openai"]);
        let model = registry.create("groq:llama3-8b-8192").unwrap();
        assert_eq!(model.model_id(), "groq:llama3-8b-8192");
    }

    #[tokio::test]
    async fn test_gemini_uses_openai_compatible_endpoint() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer gemini-key")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({"model": "gemini-pro"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                serde_json::json!({
                    "choices": [{"index": 0, "message": {"role": "assistant", "content": "a lighthouse"}}]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let mut providers = ProvidersConfig::default();
        providers.gemini.base_url = server.url();
        providers.gemini.api_key = Some("gemini-key".to_string());
        let registry = ModelRegistry::with_defaults(&providers);

        let model = registry.create("gemini:gemini-pro").unwrap();
        assert_eq!(model.model_id(), "gemini:gemini-pro");
        assert_eq!(model.complete("write a topic").await.unwrap(), "a lighthouse");
        mock.assert_async().await;
    }

    #[test]
    fn test_missing_key_is_configuration_error() {
        temp_env::with_var_unset("MISTRAL_API_KEY", || {
            let registry = ModelRegistry::with_defaults(&ProvidersConfig::default());
            let err = registry.create("mistral:mistral-large").err().unwrap();
            assert!(err.is_configuration());
            assert!(err.to_string().contains("MISTRAL_API_KEY"));
        });
    }
}
