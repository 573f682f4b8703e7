//! Application configuration tree.

use serde::{Deserialize, Serialize};

/// Main configuration structure for the duel arena
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Retry policy for remote model calls
    #[serde(default)]
    pub retry: RetryConfig,

    /// Duel scheduler configuration
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Experiment plan overrides
    #[serde(default)]
    pub plan: PlanConfig,

    /// Final report output
    #[serde(default)]
    pub report: ReportConfig,

    /// Model provider endpoints
    #[serde(default)]
    pub providers: ProvidersConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Directory holding one `<experiment_id>.db` file per experiment
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_data_dir() -> String {
    ".arena".to_string()
}

const fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            max_connections: default_max_connections(),
        }
    }
}

impl DatabaseConfig {
    /// SQLite URL of the database backing one experiment.
    pub fn experiment_url(&self, experiment_id: &str) -> String {
        let dir = self.data_dir.trim_end_matches('/');
        format!("sqlite:{dir}/{experiment_id}.db")
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Console format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for the durable log file (console only when unset)
    #[serde(default)]
    pub log_dir: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
        }
    }
}

/// Retry policy for transient model errors
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Maximum attempts per remote call, first attempt included
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First backoff delay in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Backoff ceiling in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

const fn default_max_attempts() -> u32 {
    20
}

const fn default_initial_backoff_ms() -> u64 {
    1_000
}

const fn default_max_backoff_ms() -> u64 {
    32_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// Duel scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SchedulerConfig {
    /// Pool size; defaults to the number of workers in the experiment
    #[serde(default)]
    pub workers: Option<usize>,

    /// Seconds between "pending duels" progress lines
    #[serde(default = "default_progress_interval_secs")]
    pub progress_interval_secs: u64,

    /// How many times a drain may re-queue failed duels before giving up
    #[serde(default = "default_max_recovery_passes")]
    pub max_recovery_passes: u32,
}

const fn default_progress_interval_secs() -> u64 {
    5
}

const fn default_max_recovery_passes() -> u32 {
    2
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: None,
            progress_interval_secs: default_progress_interval_secs(),
            max_recovery_passes: default_max_recovery_passes(),
        }
    }
}

/// How duel requests pick their task from the generated pool
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskAssignment {
    /// Round `r` uses task `r mod task_count`
    #[default]
    PerRound,
    /// Every duel draws a task uniformly at random
    Random,
}

/// Experiment plan overrides; unset values derive from the worker count
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PlanConfig {
    /// Defaults to the number of workers
    #[serde(default)]
    pub rounds: Option<usize>,

    /// Size of the generated task pool; must be a multiple of the worker count
    #[serde(default)]
    pub tasks: Option<usize>,

    /// Random sample of ordered pairs per round instead of all of them
    #[serde(default)]
    pub pairs_per_round: Option<usize>,

    /// How each duel picks its task
    #[serde(default)]
    pub task_assignment: TaskAssignment,
}

/// Report output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ReportConfig {
    /// Directory for `<template_id>_scores.json`
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Write the JSON snapshot after a run
    #[serde(default = "default_true")]
    pub write_json: bool,
}

fn default_output_dir() -> String {
    "workdir".to_string()
}

const fn default_true() -> bool {
    true
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            write_json: true,
        }
    }
}

/// Endpoint settings for one model provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ProviderConfig {
    /// API key; falls back to the provider's environment variable
    #[serde(default)]
    pub api_key: Option<String>,

    /// Endpoint root, without the API path
    pub base_url: String,

    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Completion length limit
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Client-side request budget; unlimited when unset
    #[serde(default)]
    pub requests_per_minute: Option<u32>,
}

const fn default_timeout_secs() -> u64 {
    300
}

const fn default_max_tokens() -> u32 {
    4096
}

const fn default_temperature() -> f32 {
    1.0
}

impl ProviderConfig {
    /// Defaults for everything but the endpoint.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            api_key: None,
            base_url: base_url.into(),
            timeout_secs: default_timeout_secs(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            requests_per_minute: None,
        }
    }
}

/// Built-in providers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ProvidersConfig {
    /// Anthropic Messages API
    #[serde(default = "default_anthropic")]
    pub anthropic: ProviderConfig,

    /// OpenAI chat completions
    #[serde(default = "default_openai")]
    pub openai: ProviderConfig,

    /// Groq (OpenAI-compatible)
    #[serde(default = "default_groq")]
    pub groq: ProviderConfig,

    /// Mistral (OpenAI-compatible)
    #[serde(default = "default_mistral")]
    pub mistral: ProviderConfig,

    /// Google Gemini through its OpenAI-compatible endpoint
    #[serde(default = "default_gemini")]
    pub gemini: ProviderConfig,
}

fn default_anthropic() -> ProviderConfig {
    ProviderConfig::with_base_url("https://api.anthropic.com")
}

fn default_openai() -> ProviderConfig {
    ProviderConfig::with_base_url("https://api.openai.com/v1")
}

fn default_groq() -> ProviderConfig {
    ProviderConfig::with_base_url("https://api.groq.com/openai/v1")
}

fn default_mistral() -> ProviderConfig {
    ProviderConfig::with_base_url("https://api.mistral.ai/v1")
}

fn default_gemini() -> ProviderConfig {
    ProviderConfig::with_base_url("https://generativelanguage.googleapis.com/v1beta/openai")
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            anthropic: default_anthropic(),
            openai: default_openai(),
            groq: default_groq(),
            mistral: default_mistral(),
            gemini: default_gemini(),
        }
    }
}
