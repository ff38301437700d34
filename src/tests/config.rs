// Unit Tests for ServiceConfig
//
// These tests mutate process environment variables, so they run serially.

use serial_test::serial;

use crate::config::{PersistenceBackendKind, ServiceConfig};
use crate::error::ServiceError;

const KEYS: &[&str] = &[
    "ANTHROPIC_API_KEY",
    "ANTHROPIC_BASE_URL",
    "CLAUDE_MODEL",
    "MAX_TOKENS",
    "TEMPERATURE",
    "ENABLE_CACHE",
    "CACHE_TTL_SECONDS",
    "CLAUDE_REQUESTS_PER_MINUTE",
    "BATCH_MAX_CONCURRENT_LLM_CALLS",
    "BATCH_PERSISTENCE_BACKEND",
    "BATCH_JOB_STORAGE_PATH",
    "BATCH_SQLITE_PATH",
    "BATCH_RECORD_RETRY_COUNT",
    "BATCH_COST_PER_1K_INPUT_TOKENS",
    "BATCH_COST_PER_1K_OUTPUT_TOKENS",
    "HOST",
    "PORT",
];

fn clear_env() {
    for key in KEYS {
        std::env::remove_var(key);
    }
}

#[test]
#[serial]
fn defaults_match_documented_values() {
    let config = ServiceConfig::default();

    assert_eq!(config.claude_model, "claude-3-5-haiku-20241022");
    assert_eq!(config.max_tokens, 1200);
    assert_eq!(config.temperature, 0.3);
    assert!(config.enable_cache);
    assert_eq!(config.cache_ttl_seconds, 3600);
    assert_eq!(config.claude_requests_per_minute, 50);
    assert_eq!(config.batch_max_concurrent_llm_calls, 5);
    assert_eq!(
        config.batch_persistence_backend,
        PersistenceBackendKind::Memory
    );
    assert_eq!(config.batch_record_retry_count, 1);
    assert!(config.batch_cost_per_1k_input_tokens.is_none());
    assert_eq!(config.host, "0.0.0.0");
    assert_eq!(config.port, 8000);
}

#[test]
#[serial]
fn from_env_requires_the_api_key() {
    clear_env();
    let result = ServiceConfig::from_env();
    assert!(matches!(
        result,
        Err(ServiceError::ConfigurationError { .. })
    ));
}

#[test]
#[serial]
fn from_env_applies_overrides() {
    clear_env();
    std::env::set_var("ANTHROPIC_API_KEY", "sk-ant-test");
    std::env::set_var("CLAUDE_MODEL", "claude-3-5-sonnet-20241022");
    std::env::set_var("ENABLE_CACHE", "false");
    std::env::set_var("CLAUDE_REQUESTS_PER_MINUTE", "10");
    std::env::set_var("BATCH_PERSISTENCE_BACKEND", "sqlite");
    std::env::set_var("BATCH_SQLITE_PATH", "/tmp/insight-test.db");
    std::env::set_var("BATCH_COST_PER_1K_INPUT_TOKENS", "0.8");
    std::env::set_var("PORT", "9001");

    let config = ServiceConfig::from_env().expect("config should load");

    assert_eq!(config.anthropic_api_key, "sk-ant-test");
    assert_eq!(config.claude_model, "claude-3-5-sonnet-20241022");
    assert!(!config.enable_cache);
    assert_eq!(config.claude_requests_per_minute, 10);
    assert_eq!(
        config.batch_persistence_backend,
        PersistenceBackendKind::Sqlite
    );
    assert_eq!(config.batch_cost_per_1k_input_tokens, Some(0.8));
    assert_eq!(config.port, 9001);

    clear_env();
}

#[test]
#[serial]
fn from_env_rejects_malformed_numbers() {
    clear_env();
    std::env::set_var("ANTHROPIC_API_KEY", "sk-ant-test");
    std::env::set_var("MAX_TOKENS", "a-lot");

    let result = ServiceConfig::from_env();
    assert!(matches!(
        result,
        Err(ServiceError::ConfigurationError { .. })
    ));

    clear_env();
}

#[test]
#[serial]
fn from_env_rejects_unknown_backend() {
    clear_env();
    std::env::set_var("ANTHROPIC_API_KEY", "sk-ant-test");
    std::env::set_var("BATCH_PERSISTENCE_BACKEND", "postgres");

    let result = ServiceConfig::from_env();
    assert!(matches!(
        result,
        Err(ServiceError::ConfigurationError { .. })
    ));

    clear_env();
}

#[test]
#[serial]
fn boolean_parsing_accepts_common_spellings() {
    clear_env();
    std::env::set_var("ANTHROPIC_API_KEY", "sk-ant-test");

    for (raw, expected) in [("1", true), ("yes", true), ("off", false), ("FALSE", false)] {
        std::env::set_var("ENABLE_CACHE", raw);
        let config = ServiceConfig::from_env().expect("config should load");
        assert_eq!(config.enable_cache, expected, "spelling: {raw}");
    }

    std::env::set_var("ENABLE_CACHE", "definitely");
    assert!(ServiceConfig::from_env().is_err());

    clear_env();
}

#[test]
fn backend_names_parse_case_insensitively() {
    assert_eq!(
        "FILE".parse::<PersistenceBackendKind>().unwrap(),
        PersistenceBackendKind::File
    );
    assert_eq!(
        "Sqlite".parse::<PersistenceBackendKind>().unwrap(),
        PersistenceBackendKind::Sqlite
    );
    assert!("redis".parse::<PersistenceBackendKind>().is_err());
}
