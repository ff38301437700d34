//! Analysis facade: the single-record pipeline.
//!
//! `AnalysisService::analyze` is the one entry point for producing an
//! [`AnalyzeResponse`]: cache probe, rate-limiter slot, prompt construction,
//! model invocation, tolerant payload parsing, typed response construction
//! with documented defaults, and cache fill. Both the synchronous endpoint
//! and the batch dispatcher run records through this pipeline.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::{Map, Value};

use crate::cache::ResultCache;
use crate::error::ServiceResult;
use crate::llm::{LlmClient, TokenUsage};
use crate::logging::log_debug;
use crate::prompt::{PromptBuilder, USER_PROMPT_MAX_TOKENS};
use crate::rate_limiter::RateLimiter;
use crate::response_parser::ResponseParser;
use crate::schemas::{AnalyzeResponse, Insight, Metadata, NextAction, Priority};

/// Service for turning a request into an analysis via the LLM collaborator.
pub struct AnalysisService {
    llm: Arc<dyn LlmClient>,
    cache: Arc<ResultCache>,
    rate_limiter: Arc<RateLimiter>,
    model_version: String,
}

impl AnalysisService {
    /// Assemble the facade from its injected collaborators.
    pub fn new(
        llm: Arc<dyn LlmClient>,
        cache: Arc<ResultCache>,
        rate_limiter: Arc<RateLimiter>,
        model_version: String,
    ) -> Self {
        Self {
            llm,
            cache,
            rate_limiter,
            model_version,
        }
    }

    /// Analyze structured data and notes.
    ///
    /// On a cache hit the cached response is returned verbatim. On a miss,
    /// the call acquires a rate-limiter slot, invokes the model, parses the
    /// payload (with the tolerant recovery path), fills the cache, and
    /// returns a freshly timestamped response.
    ///
    /// # Errors
    ///
    /// Propagates provider and parsing failures as [`crate::ServiceError`];
    /// errors are never cached.
    pub async fn analyze(
        &self,
        structured_data: Option<&Map<String, Value>>,
        notes: &[String],
    ) -> ServiceResult<AnalyzeResponse> {
        let started = Instant::now();

        if let Some(cached) = self.cache.get(structured_data, notes) {
            log_debug!("Returning cached analysis");
            return Ok(cached);
        }

        self.rate_limiter.acquire().await;

        let user_prompt = PromptBuilder::build_user_prompt(structured_data, notes);
        let user_prompt = PromptBuilder::truncate_if_needed(&user_prompt, USER_PROMPT_MAX_TOKENS);

        let reply = self
            .llm
            .invoke(PromptBuilder::SYSTEM_PROMPT, &user_prompt)
            .await?;

        let payload = ResponseParser::parse_llm_output(&reply.text)?;

        let processing_time_ms = started.elapsed().as_secs_f64() * 1000.0;
        let response = build_response(
            &payload,
            &self.model_version,
            processing_time_ms,
            reply.usage,
        );

        self.cache.set(structured_data, notes, &response);

        Ok(response)
    }
}

/// Build the typed response from the parsed model payload, applying the
/// documented defaults for missing fields.
fn build_response(
    payload: &Value,
    model_version: &str,
    processing_time_ms: f64,
    usage: Option<TokenUsage>,
) -> AnalyzeResponse {
    let insights = payload
        .get("insights")
        .and_then(Value::as_array)
        .map(|items| items.iter().map(parse_insight).collect())
        .unwrap_or_default();

    let next_actions = payload
        .get("next_actions")
        .and_then(Value::as_array)
        .map(|items| items.iter().map(parse_next_action).collect())
        .unwrap_or_default();

    let confidence_score = payload
        .get("confidence_score")
        .and_then(Value::as_f64)
        .unwrap_or(0.5)
        .clamp(0.0, 1.0);

    let summary = payload
        .get("summary")
        .and_then(Value::as_str)
        .unwrap_or("No summary generated")
        .to_string();

    AnalyzeResponse {
        summary,
        insights,
        next_actions,
        metadata: Metadata {
            confidence_score,
            model_version: model_version.to_string(),
            processing_time_ms,
            tokens_used: usage.map(|u| u.total()),
            timestamp: Utc::now(),
        },
    }
}

fn parse_insight(item: &Value) -> Insight {
    Insight {
        title: str_field(item, "title").unwrap_or("Untitled").to_string(),
        description: str_field(item, "description").unwrap_or("").to_string(),
        category: str_field(item, "category").map(str::to_string),
        priority: Priority::parse_lenient(str_field(item, "priority")),
    }
}

fn parse_next_action(item: &Value) -> NextAction {
    NextAction {
        action: str_field(item, "action").unwrap_or("").to_string(),
        priority: Priority::parse_lenient(str_field(item, "priority")),
        rationale: str_field(item, "rationale").map(str::to_string),
    }
}

fn str_field<'a>(item: &'a Value, key: &str) -> Option<&'a str> {
    item.get(key).and_then(Value::as_str)
}
