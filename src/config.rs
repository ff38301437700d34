//! Service configuration.
//!
//! All settings are environment-sourced. [`ServiceConfig::from_env`] is the
//! only function in the crate that reads environment variables; everything
//! else receives an already-validated config.
//!
//! # Keys
//!
//! | Variable | Effect | Default |
//! |----------|--------|---------|
//! | `ANTHROPIC_API_KEY` (required) | Credential for the LLM provider | unset |
//! | `ANTHROPIC_BASE_URL` | Provider endpoint override | `https://api.anthropic.com` |
//! | `CLAUDE_MODEL` | Model identifier passed through | `claude-3-5-haiku-20241022` |
//! | `MAX_TOKENS`, `TEMPERATURE` | Generation controls | 1200, 0.3 |
//! | `ENABLE_CACHE`, `CACHE_TTL_SECONDS` | Result cache knobs | true, 3600 |
//! | `CLAUDE_REQUESTS_PER_MINUTE` | Rate limiter budget | 50 |
//! | `BATCH_MAX_CONCURRENT_LLM_CALLS` | Dispatcher semaphore size | 5 |
//! | `BATCH_PERSISTENCE_BACKEND` | `memory` \| `file` \| `sqlite` | `memory` |
//! | `BATCH_JOB_STORAGE_PATH` | File backend directory | `data/batch_jobs` |
//! | `BATCH_SQLITE_PATH` | Relational backend path | `data/batch.db` |
//! | `BATCH_RECORD_RETRY_COUNT` | Additional attempts after the first | 1 |
//! | `BATCH_COST_PER_1K_INPUT_TOKENS`, `BATCH_COST_PER_1K_OUTPUT_TOKENS` | Cost estimate | unset |
//! | `HOST`, `PORT` | Bind address | `0.0.0.0:8000` |

use crate::error::{ServiceError, ServiceResult};
use crate::logging::log_debug;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Which persistence backend the job store uses.
///
/// All three expose identical observable semantics through the store; the
/// discriminator only selects durability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistenceBackendKind {
    /// Process-local map; state lost on restart.
    Memory,
    /// One JSON document per job under a configured directory.
    File,
    /// Single-file embedded SQLite database.
    Sqlite,
}

impl FromStr for PersistenceBackendKind {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "file" => Ok(Self::File),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(ServiceError::configuration_error(format!(
                "Unknown persistence backend: {other}. Supported backends: memory, file, sqlite"
            ))),
        }
    }
}

impl std::fmt::Display for PersistenceBackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Memory => "memory",
            Self::File => "file",
            Self::Sqlite => "sqlite",
        })
    }
}

/// System-wide service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Anthropic API key (required).
    pub anthropic_api_key: String,
    /// Base URL for the Anthropic API.
    pub anthropic_base_url: String,
    /// Model identifier passed through to the provider.
    pub claude_model: String,
    /// Maximum tokens to generate per response.
    pub max_tokens: u32,
    /// Temperature for response randomness.
    pub temperature: f64,

    /// Whether the result cache is active.
    pub enable_cache: bool,
    /// Cache entry time-to-live in seconds.
    pub cache_ttl_seconds: u64,

    /// Provider budget for the sliding-window rate limiter.
    pub claude_requests_per_minute: usize,

    /// Dispatcher concurrency cap for in-flight LLM calls.
    pub batch_max_concurrent_llm_calls: usize,
    /// Job persistence backend.
    pub batch_persistence_backend: PersistenceBackendKind,
    /// Directory for the file backend.
    pub batch_job_storage_path: PathBuf,
    /// Database path for the sqlite backend.
    pub batch_sqlite_path: PathBuf,
    /// Additional attempts per record after the first.
    pub batch_record_retry_count: u32,
    /// Price per 1K input tokens, for the optional cost estimate.
    pub batch_cost_per_1k_input_tokens: Option<f64>,
    /// Price per 1K output tokens, for the optional cost estimate.
    pub batch_cost_per_1k_output_tokens: Option<f64>,

    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            anthropic_api_key: String::new(),
            anthropic_base_url: "https://api.anthropic.com".to_string(),
            claude_model: "claude-3-5-haiku-20241022".to_string(),
            max_tokens: 1200,
            temperature: 0.3,
            enable_cache: true,
            cache_ttl_seconds: 3600,
            claude_requests_per_minute: 50,
            batch_max_concurrent_llm_calls: 5,
            batch_persistence_backend: PersistenceBackendKind::Memory,
            batch_job_storage_path: PathBuf::from("data/batch_jobs"),
            batch_sqlite_path: PathBuf::from("data/batch.db"),
            batch_record_retry_count: 1,
            batch_cost_per_1k_input_tokens: None,
            batch_cost_per_1k_output_tokens: None,
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    /// This is the ONLY function that should access the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::ConfigurationError`] if:
    /// - `ANTHROPIC_API_KEY` is missing or empty
    /// - A numeric or boolean value fails to parse
    /// - The persistence backend name is unknown
    pub fn from_env() -> ServiceResult<Self> {
        let defaults = Self::default();

        let config = Self {
            anthropic_api_key: env_string("ANTHROPIC_API_KEY")
                .unwrap_or(defaults.anthropic_api_key),
            anthropic_base_url: env_string("ANTHROPIC_BASE_URL")
                .unwrap_or(defaults.anthropic_base_url),
            claude_model: env_string("CLAUDE_MODEL").unwrap_or(defaults.claude_model),
            max_tokens: env_parse("MAX_TOKENS", defaults.max_tokens)?,
            temperature: env_parse("TEMPERATURE", defaults.temperature)?,
            enable_cache: env_bool("ENABLE_CACHE", defaults.enable_cache)?,
            cache_ttl_seconds: env_parse("CACHE_TTL_SECONDS", defaults.cache_ttl_seconds)?,
            claude_requests_per_minute: env_parse(
                "CLAUDE_REQUESTS_PER_MINUTE",
                defaults.claude_requests_per_minute,
            )?,
            batch_max_concurrent_llm_calls: env_parse(
                "BATCH_MAX_CONCURRENT_LLM_CALLS",
                defaults.batch_max_concurrent_llm_calls,
            )?,
            batch_persistence_backend: match env_string("BATCH_PERSISTENCE_BACKEND") {
                Some(raw) => raw.parse()?,
                None => defaults.batch_persistence_backend,
            },
            batch_job_storage_path: env_string("BATCH_JOB_STORAGE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.batch_job_storage_path),
            batch_sqlite_path: env_string("BATCH_SQLITE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.batch_sqlite_path),
            batch_record_retry_count: env_parse(
                "BATCH_RECORD_RETRY_COUNT",
                defaults.batch_record_retry_count,
            )?,
            batch_cost_per_1k_input_tokens: env_parse_opt("BATCH_COST_PER_1K_INPUT_TOKENS")?,
            batch_cost_per_1k_output_tokens: env_parse_opt("BATCH_COST_PER_1K_OUTPUT_TOKENS")?,
            host: env_string("HOST").unwrap_or(defaults.host),
            port: env_parse("PORT", defaults.port)?,
        };

        config.validate()?;

        log_debug!(
            model = %config.claude_model,
            backend = %config.batch_persistence_backend,
            cache_enabled = config.enable_cache,
            requests_per_minute = config.claude_requests_per_minute,
            "Service configuration loaded and validated"
        );

        Ok(config)
    }

    /// Validate that the configuration is complete.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::ConfigurationError`] if the API key is missing.
    pub fn validate(&self) -> ServiceResult<()> {
        if self.anthropic_api_key.is_empty() {
            return Err(ServiceError::configuration_error(
                "ANTHROPIC_API_KEY is required. Please set it in the environment or .env file",
            ));
        }
        Ok(())
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: FromStr>(name: &str, default: T) -> ServiceResult<T>
where
    T::Err: std::fmt::Display,
{
    match env_string(name) {
        Some(raw) => raw.parse().map_err(|e| {
            ServiceError::configuration_error(format!("Invalid value for {name}: {e}"))
        }),
        None => Ok(default),
    }
}

fn env_parse_opt<T: FromStr>(name: &str) -> ServiceResult<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match env_string(name) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| ServiceError::configuration_error(format!("Invalid value for {name}: {e}"))),
        None => Ok(None),
    }
}

fn env_bool(name: &str, default: bool) -> ServiceResult<bool> {
    match env_string(name) {
        Some(raw) => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(ServiceError::configuration_error(format!(
                "Invalid boolean for {name}: {other}"
            ))),
        },
        None => Ok(default),
    }
}
