//! Result cache for request deduplication.
//!
//! Identical analysis requests share one cached [`AnalyzeResponse`]. The key
//! is a SHA-256 fingerprint of the canonical request form: structured data
//! with keys sorted at every nesting depth and notes sorted lexicographically,
//! so key order and note order never split the cache. Entries expire by TTL
//! and the cache is capacity-bounded with approximately-LRU eviction.
//!
//! Errors are never cached.

use std::time::Duration;

use moka::sync::Cache;
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

use crate::logging::log_debug;
use crate::schemas::AnalyzeResponse;

/// Maximum number of cached analyses.
const MAX_ENTRIES: u64 = 1000;

/// In-memory TTL cache keyed by request fingerprint.
///
/// When disabled, `get` always misses and `set` is a no-op, so callers never
/// branch on the flag themselves.
pub struct ResultCache {
    entries: Cache<String, AnalyzeResponse>,
    enabled: bool,
}

impl ResultCache {
    /// Create a cache with the given TTL. `enabled = false` produces a cache
    /// that never stores or returns anything.
    pub fn new(enabled: bool, ttl: Duration) -> Self {
        Self {
            entries: Cache::builder()
                .max_capacity(MAX_ENTRIES)
                .time_to_live(ttl)
                .build(),
            enabled,
        }
    }

    /// Retrieve a cached response for this request, if present and fresh.
    pub fn get(
        &self,
        structured_data: Option<&Map<String, Value>>,
        notes: &[String],
    ) -> Option<AnalyzeResponse> {
        if !self.enabled {
            return None;
        }
        let key = Self::fingerprint(structured_data, notes);
        let hit = self.entries.get(&key);
        if hit.is_some() {
            log_debug!(fingerprint = %key, "Analysis cache hit");
        }
        hit
    }

    /// Store a response under this request's fingerprint.
    pub fn set(
        &self,
        structured_data: Option<&Map<String, Value>>,
        notes: &[String],
        response: &AnalyzeResponse,
    ) {
        if !self.enabled {
            return;
        }
        let key = Self::fingerprint(structured_data, notes);
        self.entries.insert(key, response.clone());
    }

    /// Drop every cached entry.
    pub fn clear(&self) {
        self.entries.invalidate_all();
    }

    /// Whether caching is active.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Compute the request fingerprint: SHA-256 hex of the canonical JSON
    /// `{"notes": <sorted>, "structured_data": <data or {}>}` with object
    /// keys sorted at every depth.
    pub fn fingerprint(structured_data: Option<&Map<String, Value>>, notes: &[String]) -> String {
        let mut sorted_notes: Vec<&str> = notes.iter().map(String::as_str).collect();
        sorted_notes.sort_unstable();

        let data = structured_data
            .map(|m| canonicalize(&Value::Object(m.clone())))
            .unwrap_or_else(|| Value::Object(Map::new()));

        let canonical = json!({
            "notes": sorted_notes,
            "structured_data": data,
        });
        let encoded = canonical.to_string();

        hex::encode(Sha256::digest(encoded.as_bytes()))
    }
}

/// Rebuild a JSON value with object keys in sorted order at every depth.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by_key(|(k, _)| k.as_str());
            let mut sorted = Map::new();
            for (key, inner) in entries {
                sorted.insert(key.clone(), canonicalize(inner));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
