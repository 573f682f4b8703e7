//! Layered configuration loading and validation.

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::path::Path;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Unknown `logging.level`.
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    /// Unknown `logging.format`.
    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    /// Blank `database.data_dir`.
    #[error("Data directory cannot be empty")]
    EmptyDataDir,

    /// Zero-sized pool.
    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    /// Retry policy with no attempts.
    #[error("Invalid max_attempts: {0}. Must be at least 1")]
    InvalidMaxAttempts(u32),

    /// Initial backoff above the cap.
    #[error("Invalid backoff configuration: initial_backoff_ms ({0}) must not exceed max_backoff_ms ({1})")]
    InvalidBackoff(u64, u64),

    /// Zero progress interval.
    #[error("Invalid progress_interval_secs: must be at least 1")]
    InvalidProgressInterval,

    /// Non-positive provider rate limit.
    #[error("Invalid requests_per_minute for provider '{0}': must be positive")]
    InvalidRateLimit(String),

    /// Any other rejected value.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Environment variable prefix; nested keys use `__`, e.g.
    /// `ARENA_PROVIDERS__GROQ__API_KEY`.
    pub const ENV_PREFIX: &'static str = "ARENA_";

    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults
    /// 2. arena.yaml
    /// 3. arena.local.yaml (optional local overrides)
    /// 4. Environment variables (ARENA_* prefix)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file("arena.yaml"))
            .merge(Yaml::file("arena.local.yaml"))
            .merge(Env::prefixed(Self::ENV_PREFIX).split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file; environment variables still
    /// take precedence over it.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        if !path.exists() {
            anyhow::bail!("Config file {} does not exist", path.display());
        }

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed(Self::ENV_PREFIX).split("__"))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.database.data_dir.trim().is_empty() {
            return Err(ConfigError::EmptyDataDir);
        }
        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(config.database.max_connections));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }
        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        if config.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidMaxAttempts(config.retry.max_attempts));
        }
        if config.retry.initial_backoff_ms > config.retry.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                config.retry.initial_backoff_ms,
                config.retry.max_backoff_ms,
            ));
        }

        if config.scheduler.progress_interval_secs == 0 {
            return Err(ConfigError::InvalidProgressInterval);
        }
        if config.scheduler.workers == Some(0) {
            return Err(ConfigError::ValidationFailed("scheduler.workers must be at least 1".to_string()));
        }

        for (name, value) in [("rounds", config.plan.rounds), ("tasks", config.plan.tasks), ("pairs_per_round", config.plan.pairs_per_round)] {
            if value == Some(0) {
                return Err(ConfigError::ValidationFailed(format!("plan.{name} must be at least 1")));
            }
        }

        if config.report.output_dir.trim().is_empty() {
            return Err(ConfigError::ValidationFailed("report.output_dir cannot be empty".to_string()));
        }

        let providers = &config.providers;
        for (name, provider) in [
            ("anthropic", &providers.anthropic),
            ("openai", &providers.openai),
            ("groq", &providers.groq),
            ("mistral", &providers.mistral),
            ("gemini", &providers.gemini),
        ] {
            if provider.requests_per_minute == Some(0) {
                return Err(ConfigError::InvalidRateLimit(name.to_string()));
            }
            if provider.base_url.trim().is_empty() {
                return Err(ConfigError::ValidationFailed(format!("providers.{name}.base_url cannot be empty")));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::TaskAssignment;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn yaml_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{content}").unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.database.data_dir, ".arena");
        assert_eq!(config.retry.max_attempts, 20);
        assert_eq!(config.retry.initial_backoff_ms, 1000);
        assert_eq!(config.retry.max_backoff_ms, 32000);
        assert_eq!(config.scheduler.progress_interval_secs, 5);
        assert_eq!(config.plan.task_assignment, TaskAssignment::PerRound);
        assert_eq!(config.providers.groq.base_url, "https://api.groq.com/openai/v1");
        assert_eq!(config.providers.gemini.base_url, "https://generativelanguage.googleapis.com/v1beta/openai");
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r"
database:
  data_dir: /tmp/arena
logging:
  level: debug
  format: json
plan:
  rounds: 3
  pairs_per_round: 4
  task_assignment: random
providers:
  groq:
    base_url: http://localhost:9000/v1
    requests_per_minute: 30
";
        let config: Config = serde_yaml::from_str(yaml).expect("YAML should parse");

        assert_eq!(config.database.data_dir, "/tmp/arena");
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.plan.rounds, Some(3));
        assert_eq!(config.plan.task_assignment, TaskAssignment::Random);
        assert_eq!(config.providers.groq.requests_per_minute, Some(30));
        assert_eq!(config.providers.openai.base_url, "https://api.openai.com/v1");
        ConfigLoader::validate(&config).expect("Parsed config should be valid");
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "verbose".to_string();
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::InvalidLogLevel(_))));
    }

    #[test]
    fn test_validate_invalid_log_format() {
        let mut config = Config::default();
        config.logging.format = "xml".to_string();
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::InvalidLogFormat(_))));
    }

    #[test]
    fn test_validate_empty_data_dir() {
        let mut config = Config::default();
        config.database.data_dir = " ".to_string();
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::EmptyDataDir)));
    }

    #[test]
    fn test_validate_zero_max_connections() {
        let mut config = Config::default();
        config.database.max_connections = 0;
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::InvalidMaxConnections(0))));
    }

    #[test]
    fn test_validate_retry() {
        let mut config = Config::default();
        config.retry.max_attempts = 0;
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::InvalidMaxAttempts(0))));

        let mut config = Config::default();
        config.retry.initial_backoff_ms = 5000;
        config.retry.max_backoff_ms = 1000;
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::InvalidBackoff(5000, 1000))));
    }

    #[test]
    fn test_validate_scheduler_and_plan() {
        let mut config = Config::default();
        config.scheduler.progress_interval_secs = 0;
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::InvalidProgressInterval)));

        let mut config = Config::default();
        config.plan.tasks = Some(0);
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::ValidationFailed(_))));
    }

    #[test]
    fn test_validate_zero_rate_limit() {
        let mut config = Config::default();
        config.providers.mistral.requests_per_minute = Some(0);
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidRateLimit(ref name)) if name == "mistral"
        ));
    }

    #[test]
    fn test_hierarchical_merging() {
        let base = yaml_file("logging:\n  level: info\n  format: json\nretry:\n  max_attempts: 5\n");
        let local = yaml_file("logging:\n  level: debug\n");

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(base.path()))
            .merge(Yaml::file(local.path()))
            .extract()
            .unwrap();

        assert_eq!(config.logging.level, "debug", "Override should win");
        assert_eq!(config.logging.format, "json", "Base value should be kept");
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.max_backoff_ms, 32000, "Default should fill the rest");
    }

    #[test]
    fn test_env_overrides_file() {
        let file = yaml_file("scheduler:\n  workers: 2\nproviders:\n  groq:\n    api_key: from-file\n");

        temp_env::with_vars(
            [
                ("ARENA_SCHEDULER__WORKERS", Some("8")),
                ("ARENA_PROVIDERS__GROQ__API_KEY", Some("from-env")),
            ],
            || {
                let config = ConfigLoader::load_from_file(file.path()).unwrap();
                assert_eq!(config.scheduler.workers, Some(8));
                assert_eq!(config.providers.groq.api_key.as_deref(), Some("from-env"));
            },
        );
    }

    #[test]
    fn test_load_from_missing_file_fails() {
        assert!(ConfigLoader::load_from_file("/nonexistent/arena.yaml").is_err());
    }

    #[test]
    fn test_load_from_file_validates() {
        let file = yaml_file("retry:\n  max_attempts: 0\n");
        let err = ConfigLoader::load_from_file(file.path()).unwrap_err();
        assert!(err.downcast_ref::<ConfigError>().is_some());
    }
}
