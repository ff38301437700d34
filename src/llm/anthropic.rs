//! Anthropic Messages API client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use crate::config::ServiceConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::llm::{LlmClient, LlmReply, TokenUsage};
use crate::logging::log_debug;

/// Timeout applied to each individual generation request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Wire request for the Messages API.
#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f64,
    system: &'a str,
    messages: Vec<MessageParam<'a>>,
}

#[derive(Debug, Serialize)]
struct MessageParam<'a> {
    role: &'static str,
    content: &'a str,
}

/// Wire response from the Messages API. Only the fields the service consumes.
#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsageInfo {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

/// Anthropic Claude client implementing [`LlmClient`].
#[derive(Debug)]
pub struct AnthropicClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f64,
}

impl AnthropicClient {
    /// Create a new client from the service configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::ConfigurationError`] if the API key is missing
    /// or the HTTP client cannot be initialized.
    pub fn new(config: &ServiceConfig) -> ServiceResult<Self> {
        if config.anthropic_api_key.is_empty() {
            return Err(ServiceError::configuration_error(
                "Anthropic API key is required",
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| {
                ServiceError::configuration_error(format!("Failed to build HTTP client: {e}"))
            })?;

        log_debug!(
            model = %config.claude_model,
            base_url = %config.anthropic_base_url,
            "Anthropic client initialized"
        );

        Ok(Self {
            client,
            api_key: config.anthropic_api_key.clone(),
            base_url: config.anthropic_base_url.trim_end_matches('/').to_string(),
            model: config.claude_model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    /// Build the headers required by the Anthropic API.
    fn build_headers(&self) -> ServiceResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.api_key).map_err(|e| {
                ServiceError::configuration_error(format!("Invalid API key format: {e}"))
            })?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static("2023-06-01"));
        Ok(headers)
    }

    /// Check if error JSON indicates auth failure
    fn is_auth_error(error_json: &serde_json::Value) -> bool {
        error_json
            .get("error")
            .and_then(|obj| obj.get("type"))
            .and_then(|t| t.as_str())
            .map(|error_type| {
                error_type.contains("authentication") || error_type.contains("invalid_api_key")
            })
            .unwrap_or(false)
    }

    /// Parse authentication error from response text
    fn parse_auth_error(error_text: &str) -> ServiceError {
        if let Ok(error_json) = serde_json::from_str::<serde_json::Value>(error_text) {
            if Self::is_auth_error(&error_json) {
                return ServiceError::authentication_failed(
                    "Invalid Anthropic API key or authentication failed",
                );
            }
        }
        ServiceError::authentication_failed("Anthropic authentication failed")
    }

    /// Extract retry-after value from headers
    fn extract_retry_after(headers: &reqwest::header::HeaderMap) -> u64 {
        headers
            .get("retry-after")
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(60)
    }

    /// Handle non-success HTTP responses from the Anthropic API. Each branch's
    /// error constructor logs at the level documented for its variant.
    async fn handle_error_response(&self, response: reqwest::Response) -> ServiceError {
        let status = response.status();
        let headers = response.headers().clone();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        match status.as_u16() {
            401 => Self::parse_auth_error(&error_text),
            429 => {
                let retry_after_seconds = Self::extract_retry_after(&headers);
                ServiceError::rate_limit_exceeded(retry_after_seconds)
            }
            _ => ServiceError::request_failed(
                format!("Anthropic API error {status}: {error_text}"),
                None,
            ),
        }
    }

    /// Parse a successful HTTP response body.
    async fn parse_success_response(
        &self,
        response: reqwest::Response,
    ) -> ServiceResult<MessagesResponse> {
        let raw_body = response.text().await.map_err(|e| {
            ServiceError::response_parsing_error(format!("Failed to read response: {e}"))
        })?;

        let api_response: MessagesResponse = serde_json::from_str(&raw_body).map_err(|e| {
            ServiceError::response_parsing_error(format!("Invalid Anthropic response: {e}"))
        })?;

        Ok(api_response)
    }

    /// Map a transport-level reqwest error to a service error.
    fn map_transport_error(error: reqwest::Error) -> ServiceError {
        if error.is_timeout() {
            return ServiceError::timeout(REQUEST_TIMEOUT.as_secs());
        }
        ServiceError::request_failed(
            format!("Anthropic request failed: {error}"),
            Some(Box::new(error)),
        )
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn invoke(&self, system_prompt: &str, user_prompt: &str) -> ServiceResult<LlmReply> {
        let url = format!("{}/v1/messages", self.base_url);
        let headers = self.build_headers()?;

        let request = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            system: system_prompt,
            messages: vec![MessageParam {
                role: "user",
                content: user_prompt,
            }],
        };

        let response = self
            .client
            .post(&url)
            .headers(headers)
            .json(&request)
            .send()
            .await
            .map_err(Self::map_transport_error)?;

        if !response.status().is_success() {
            return Err(self.handle_error_response(response).await);
        }

        let api_response = self.parse_success_response(response).await?;

        // Concatenate the text blocks; other block kinds carry no reply text.
        let text: String = api_response
            .content
            .iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text.as_deref())
            .collect();

        if text.is_empty() {
            return Err(ServiceError::response_parsing_error(
                "No text content found in API response",
            ));
        }

        let usage = api_response.usage.map(|u| TokenUsage {
            input_tokens: u.input_tokens,
            output_tokens: u.output_tokens,
        });

        log_debug!(
            provider = "anthropic",
            reply_length = text.len(),
            has_usage = usage.is_some(),
            "Anthropic reply received"
        );

        Ok(LlmReply { text, usage })
    }
}
