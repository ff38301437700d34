//! Prompt construction for analysis requests.
//!
//! Builds the system and user prompts sent to the model and keeps the user
//! prompt inside a context budget via middle truncation.

use serde_json::{Map, Value};

/// Truncation marker inserted when a prompt exceeds the token budget.
const TRUNCATION_MARKER: &str = "\n\n[... content truncated for length ...]\n\n";

/// Token budget applied to the user prompt before each analysis call.
pub const USER_PROMPT_MAX_TOKENS: usize = 6000;

/// Builds structured prompts for LLM analysis with context management.
pub struct PromptBuilder;

impl PromptBuilder {
    /// System prompt: pins the model to the JSON analysis contract.
    pub const SYSTEM_PROMPT: &'static str = r#"You are a business analyst. Analyze the data and return JSON only:

{
  "summary": "2-3 sentence summary",
  "insights": [{"title": "brief", "description": "concise", "category": "type", "priority": "high|medium|low"}],
  "next_actions": [{"action": "brief action", "priority": "high|medium|low", "rationale": "short reason"}],
  "confidence_score": 0.0-1.0
}

Be concise and actionable. Prioritize by importance."#;

    /// Construct the user prompt: a `## Data` section when structured data is
    /// present, a `## Notes` bullet list, and the closing instruction.
    pub fn build_user_prompt(structured_data: Option<&Map<String, Value>>, notes: &[String]) -> String {
        let mut parts: Vec<String> = Vec::new();

        if let Some(data) = structured_data {
            if !data.is_empty() {
                parts.push("## Data".to_string());
                parts.push(
                    serde_json::to_string_pretty(&Value::Object(data.clone()))
                        .unwrap_or_else(|_| "{}".to_string()),
                );
            }
        }

        if !notes.is_empty() {
            parts.push("## Notes".to_string());
            for note in notes {
                parts.push(format!("- {}", note.trim()));
            }
        }

        parts.push("\nAnalyze and return JSON only.".to_string());

        parts.join("\n")
    }

    /// Rough token estimation (1 token ~= 4 characters for English text).
    /// Used for context size management only; the provider reports
    /// authoritative usage.
    pub fn estimate_tokens(text: &str) -> usize {
        text.len() / 4
    }

    /// Truncate `text` from the middle when it exceeds `max_tokens`,
    /// preserving the beginning and the end.
    pub fn truncate_if_needed(text: &str, max_tokens: usize) -> String {
        if Self::estimate_tokens(text) <= max_tokens {
            return text.to_string();
        }

        let max_chars = max_tokens * 4;
        let half = max_chars / 2;

        let head_end = floor_char_boundary(text, half);
        let tail_start = ceil_char_boundary(text, text.len().saturating_sub(half));

        format!(
            "{}{}{}",
            &text[..head_end],
            TRUNCATION_MARKER,
            &text[tail_start..]
        )
    }
}

/// Largest byte index `<= at` that falls on a char boundary.
fn floor_char_boundary(text: &str, at: usize) -> usize {
    if at >= text.len() {
        return text.len();
    }
    let mut idx = at;
    while !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Smallest byte index `>= at` that falls on a char boundary.
fn ceil_char_boundary(text: &str, at: usize) -> usize {
    if at >= text.len() {
        return text.len();
    }
    let mut idx = at;
    while !text.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}
