//! LLM provider integration.
//!
//! The core consumes one capability: [`LlmClient::invoke`], which turns a
//! system/user prompt pair into raw model text plus optional token usage.
//! [`AnthropicClient`] is the production implementation; tests substitute
//! mocks or scripted stubs behind the same trait.

pub mod anthropic;

pub use anthropic::AnthropicClient;

use crate::error::ServiceResult;
use async_trait::async_trait;

/// Token counts reported by the provider for one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenUsage {
    /// Tokens in the prompt.
    pub input_tokens: u64,
    /// Tokens in the generated reply.
    pub output_tokens: u64,
}

impl TokenUsage {
    /// Combined input + output token count, used for cost attribution.
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// One raw model reply.
#[derive(Debug, Clone)]
pub struct LlmReply {
    /// Concatenated text content of the reply.
    pub text: String,
    /// Token usage, when the provider reports it.
    pub usage: Option<TokenUsage>,
}

/// The external LLM collaborator.
///
/// Implementations perform exactly one generation per call and do not retry
/// internally: every attempt must pass through the service rate limiter, so
/// retry policy lives with the callers.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Generate a reply for the given prompts.
    ///
    /// # Errors
    ///
    /// Returns a provider-mapped [`crate::ServiceError`]: authentication,
    /// rate-limit, timeout, transport, or response-parsing failures.
    async fn invoke(&self, system_prompt: &str, user_prompt: &str) -> ServiceResult<LlmReply>;
}
