//! Extraction of the analysis payload from raw model output.
//!
//! Models are asked for JSON only, but replies often arrive wrapped in
//! markdown fences or surrounded by prose. Recovery runs in three tiers:
//!
//! 1. Direct JSON parse
//! 2. First fenced ```json code block
//! 3. First balanced `{…}` substring
//!
//! Fails with a clear error if no JSON object can be recovered.

use crate::error::{ServiceError, ServiceResult};
use crate::logging::{log_debug, log_warn};

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Matches the first fenced code block, with or without a `json` tag.
static FENCED_JSON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```(?:json|JSON)?\s*(\{.*?\})\s*```").expect("fenced block pattern is valid")
});

/// Response parser with fallback strategies.
pub struct ResponseParser;

impl ResponseParser {
    /// Parse raw model output into the structured analysis payload.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::ResponseParsingError`] when no JSON object can
    /// be extracted, or when the extracted value is not a non-empty object.
    pub fn parse_llm_output(raw: &str) -> ServiceResult<Value> {
        log_debug!(
            content_length = raw.len(),
            "Parsing model output for structured JSON"
        );

        // 1. Direct JSON parse
        if let Ok(payload) = serde_json::from_str::<Value>(raw) {
            return Self::validate_and_return(payload);
        }

        // 2. First fenced ```json block
        if let Some(captures) = FENCED_JSON.captures(raw) {
            if let Some(block) = captures.get(1) {
                log_debug!(
                    extracted_length = block.as_str().len(),
                    "Extracted fenced JSON block from model output"
                );
                if let Ok(payload) = serde_json::from_str::<Value>(block.as_str()) {
                    return Self::validate_and_return(payload);
                }
            }
        }

        // 3. First balanced {…} substring
        if let Some(candidate) = Self::extract_json_object(raw) {
            log_debug!(
                extracted_length = candidate.len(),
                "Extracted balanced JSON object from mixed content"
            );
            if let Ok(payload) = serde_json::from_str::<Value>(&candidate) {
                return Self::validate_and_return(payload);
            }
        }

        let preview: String = raw.chars().take(200).collect();
        log_warn!(
            content_preview = %preview,
            "Failed to parse structured response from model output"
        );

        Err(ServiceError::response_parsing_error(format!(
            "Could not parse structured JSON response from: {}{}",
            preview,
            if raw.chars().count() > 200 { "..." } else { "" }
        )))
    }

    /// Validate parsed JSON structure: must be a non-empty object.
    fn validate_and_return(payload: Value) -> ServiceResult<Value> {
        match payload.as_object() {
            Some(obj) if !obj.is_empty() => Ok(payload),
            Some(_) => Err(ServiceError::response_parsing_error(
                "Structured response cannot be an empty object",
            )),
            None => Err(ServiceError::response_parsing_error(
                "Structured response must be a JSON object",
            )),
        }
    }

    /// Extract the first balanced JSON object from mixed content.
    fn extract_json_object(content: &str) -> Option<String> {
        let start_idx = content.find('{')?;
        let chars: Vec<char> = content[start_idx..].chars().collect();
        let end = Self::find_balanced_json_end(&chars)?;
        Some(chars[0..=end].iter().collect())
    }

    /// Find the index where the balanced object ends, handling nested braces
    /// and strings with escapes.
    fn find_balanced_json_end(chars: &[char]) -> Option<usize> {
        let mut brace_count = 0;
        let mut in_string = false;
        let mut escaped = false;

        for (char_idx, ch) in chars.iter().enumerate() {
            match ch {
                '"' if !escaped => in_string = !in_string,
                '\\' if in_string => escaped = !escaped,
                '{' if !in_string => brace_count += 1,
                '}' if !in_string => {
                    brace_count -= 1;
                    if brace_count == 0 {
                        return Some(char_idx);
                    }
                }
                _ => escaped = false,
            }

            if *ch != '\\' {
                escaped = false;
            }
        }

        None // Unbalanced braces
    }
}
