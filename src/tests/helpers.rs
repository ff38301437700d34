//! Shared test helpers: a scripted LLM client, canned payloads, and state
//! builders so each test assembles fresh components instead of touching any
//! process-wide state.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value};

use crate::analysis::AnalysisService;
use crate::cache::ResultCache;
use crate::config::ServiceConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::llm::{LlmClient, LlmReply, TokenUsage};
use crate::rate_limiter::RateLimiter;
use crate::schemas::{AnalyzeRequest, AnalyzeResponse, Insight, Metadata, NextAction, Priority};
use crate::server::{build_state, AppState};

/// Canned model payload used across scenario tests.
pub fn analysis_payload() -> String {
    json!({
        "summary": "Revenue is trending upward with strong enterprise demand.",
        "insights": [
            {
                "title": "Enterprise growth",
                "description": "Enterprise accounts grew 40% quarter over quarter.",
                "category": "sales",
                "priority": "high"
            }
        ],
        "next_actions": [
            {
                "action": "Expand the enterprise sales team",
                "priority": "high",
                "rationale": "Demand is outpacing coverage"
            }
        ],
        "confidence_score": 0.9
    })
    .to_string()
}

/// A deterministic analysis response for store-level tests.
pub fn sample_response(tokens_used: Option<u64>) -> AnalyzeResponse {
    AnalyzeResponse {
        summary: "Stable quarter.".to_string(),
        insights: vec![Insight {
            title: "Retention".to_string(),
            description: "Churn held at 2%.".to_string(),
            category: Some("customers".to_string()),
            priority: Priority::Medium,
        }],
        next_actions: vec![NextAction {
            action: "Review pricing tiers".to_string(),
            priority: Priority::Low,
            rationale: None,
        }],
        metadata: Metadata {
            confidence_score: 0.8,
            model_version: "test-model".to_string(),
            processing_time_ms: 12.5,
            tokens_used,
            timestamp: Utc::now(),
        },
    }
}

/// Build an analyze request with the given notes (no structured data).
pub fn request_with_notes(notes: &[&str]) -> AnalyzeRequest {
    AnalyzeRequest {
        structured_data: None,
        notes: notes.iter().map(|n| n.to_string()).collect(),
    }
}

/// Build a structured data map from a JSON object literal.
pub fn data_map(value: Value) -> Map<String, Value> {
    value.as_object().expect("data literal is an object").clone()
}

/// One scripted outcome for the stub LLM client.
#[derive(Clone)]
pub enum StubOutcome {
    Reply {
        text: String,
        usage: Option<TokenUsage>,
    },
    Failure(String),
}

impl StubOutcome {
    pub fn reply(text: impl Into<String>) -> Self {
        Self::Reply {
            text: text.into(),
            usage: None,
        }
    }

    pub fn reply_with_usage(
        text: impl Into<String>,
        input_tokens: u64,
        output_tokens: u64,
    ) -> Self {
        Self::Reply {
            text: text.into(),
            usage: Some(TokenUsage {
                input_tokens,
                output_tokens,
            }),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure(message.into())
    }
}

/// Scripted LLM client: pops scripted outcomes front to back, then repeats
/// the fallback outcome forever. Counts invocations.
pub struct ScriptedLlm {
    script: Mutex<VecDeque<StubOutcome>>,
    fallback: StubOutcome,
    calls: AtomicUsize,
}

impl ScriptedLlm {
    /// Always produce the same outcome.
    pub fn always(outcome: StubOutcome) -> Self {
        Self::sequence(Vec::new(), outcome)
    }

    /// Produce `script` in order, then `fallback` forever.
    pub fn sequence(script: Vec<StubOutcome>, fallback: StubOutcome) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of invocations so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn invoke(&self, _system_prompt: &str, _user_prompt: &str) -> ServiceResult<LlmReply> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .script
            .lock()
            .expect("stub script lock")
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        match next {
            StubOutcome::Reply { text, usage } => Ok(LlmReply { text, usage }),
            StubOutcome::Failure(message) => Err(ServiceError::request_failed(message, None)),
        }
    }
}

/// Base config for tests: API key set, memory backend, defaults elsewhere.
pub fn test_config() -> ServiceConfig {
    ServiceConfig {
        anthropic_api_key: "test-key".to_string(),
        ..ServiceConfig::default()
    }
}

/// Build full app state over the given LLM client.
pub fn test_state(config: ServiceConfig, llm: Arc<dyn LlmClient>) -> Arc<AppState> {
    build_state(config, llm).expect("test state should build")
}

/// Build a standalone analysis service with a fresh cache and a wide-open
/// rate limiter. Returns the cache too so tests can inspect it.
pub fn test_analysis(
    llm: Arc<dyn LlmClient>,
    enable_cache: bool,
) -> (AnalysisService, Arc<ResultCache>) {
    let cache = Arc::new(ResultCache::new(enable_cache, Duration::from_secs(3600)));
    let rate_limiter = Arc::new(RateLimiter::new(1000));
    let analysis = AnalysisService::new(
        llm,
        cache.clone(),
        rate_limiter,
        "test-model".to_string(),
    );
    (analysis, cache)
}
