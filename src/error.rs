//! Error types for the analysis service.
//!
//! This module provides structured error handling for insight-service
//! operations, including categorization and retry guidance.
//!
//! # Error Types
//!
//! The main error type is [`ServiceError`], which covers all failure modes:
//! - Configuration errors (missing API key, malformed settings)
//! - Request failures (network issues, provider errors)
//! - Response parsing failures (non-JSON model output)
//! - Rate limiting and timeouts
//! - Authentication failures
//! - Storage failures (persistence backend not writable)
//!
//! # Result Type
//!
//! Use [`ServiceResult<T>`] as a convenient alias for `Result<T, ServiceError>`:
//!
//! ```rust
//! use insight_service::ServiceResult;
//!
//! fn my_function() -> ServiceResult<String> {
//!     Ok("Success".to_string())
//! }
//! ```

use crate::logging::{log_error, log_warn};
use thiserror::Error;

// ============================================================================
// Error categorization types
// ============================================================================

/// High-level categorization of errors for routing and handling decisions.
///
/// Use [`ServiceError::category()`] to get the category for any error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// External service failures (the LLM provider, network issues).
    ///
    /// The LLM provider or network had an issue. May be transient
    /// or indicate a provider outage.
    External,

    /// Internal system errors (bugs, invariant violations).
    Internal,

    /// Client errors (invalid input, authentication, configuration).
    ///
    /// The caller made a mistake that they can fix (wrong API key,
    /// invalid parameters, etc.).
    Client,

    /// Temporary failures that should be retried.
    Transient,
}

// ============================================================================
// Service error types
// ============================================================================

/// Convenient result type for service operations.
///
/// Alias for `Result<T, ServiceError>`. Use this throughout the crate
/// for consistent error handling.
pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// Errors that can occur during analysis and batch operations.
///
/// Each variant can be:
/// - Categorized via [`category()`](Self::category)
/// - Checked for retryability via [`is_retryable()`](Self::is_retryable)
///
/// # Creating Errors
///
/// Use the constructor methods which automatically log the error:
///
/// ```rust
/// use insight_service::ServiceError;
///
/// // These methods log automatically
/// let err = ServiceError::configuration_error("Missing API key");
/// let err = ServiceError::rate_limit_exceeded(60);
/// ```
///
/// # Error Categories
///
/// | Variant | Category | Retryable |
/// |---------|----------|-----------|
/// | `ConfigurationError` | Client | No |
/// | `RequestFailed` | External | Yes |
/// | `ResponseParsingError` | External | No |
/// | `RateLimitExceeded` | Transient | Yes |
/// | `Timeout` | Transient | Yes |
/// | `AuthenticationFailed` | Client | No |
/// | `StorageUnavailable` | Internal | No |
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Service configuration is invalid or incomplete.
    ///
    /// Common causes:
    /// - Missing Anthropic API key
    /// - Malformed numeric or boolean environment values
    /// - Unknown persistence backend name
    #[error("Configuration error: {message}")]
    ConfigurationError {
        /// Description of the configuration problem.
        message: String,
    },

    /// The HTTP request to the LLM provider failed.
    ///
    /// This is a general failure that may be retryable. Check the source
    /// error for more details about the underlying cause.
    #[error("Request failed: {message}")]
    RequestFailed {
        /// Description of the failure.
        message: String,
        /// The underlying error, if available.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Failed to parse the model's response into the analysis payload.
    ///
    /// The model returned a response, but no usable JSON object could be
    /// extracted from it.
    #[error("Response parsing failed: {message}")]
    ResponseParsingError {
        /// Details about the parsing failure.
        message: String,
    },

    /// Provider rate limit exceeded.
    ///
    /// The provider is throttling requests. Wait the indicated time
    /// before retrying.
    #[error("Rate limit exceeded, retry after {retry_after_seconds}s")]
    RateLimitExceeded {
        /// Recommended wait time before retrying.
        retry_after_seconds: u64,
    },

    /// Request timed out.
    #[error("Request timed out after {timeout_seconds}s")]
    Timeout {
        /// The timeout duration that was exceeded.
        timeout_seconds: u64,
    },

    /// Authentication with the provider failed.
    ///
    /// Check the API key. This is not retryable without fixing the
    /// credential.
    #[error("Authentication failed: {message}")]
    AuthenticationFailed {
        /// Details about the authentication failure.
        message: String,
    },

    /// The persistence backend is not usable.
    ///
    /// Raised when the job storage directory or database cannot be
    /// opened or written. Surfaces as a 503 on the readiness probe.
    #[error("Storage unavailable: {message}")]
    StorageUnavailable {
        /// Details about the storage failure.
        message: String,
    },
}

impl ServiceError {
    /// Get the error category for routing and handling decisions.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConfigurationError { .. } => ErrorCategory::Client,
            Self::RequestFailed { .. } => ErrorCategory::External,
            Self::ResponseParsingError { .. } => ErrorCategory::External,
            Self::RateLimitExceeded { .. } => ErrorCategory::Transient,
            Self::Timeout { .. } => ErrorCategory::Transient,
            Self::AuthenticationFailed { .. } => ErrorCategory::Client,
            Self::StorageUnavailable { .. } => ErrorCategory::Internal,
        }
    }

    /// Whether this error is transient and a retry may succeed.
    ///
    /// Returns `true` for:
    /// - Rate limit exceeded
    /// - Timeouts
    /// - General request failures (may be network issues)
    ///
    /// The batch dispatcher retries every record error regardless (matching
    /// the documented batch semantics); this classification is for API
    /// consumers making their own retry decisions.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimitExceeded { .. } | Self::Timeout { .. } | Self::RequestFailed { .. }
        )
    }

    // =========================================================================
    // Constructor methods with automatic logging
    // =========================================================================
    //
    // These methods automatically log the error at the appropriate level.
    // Use them instead of constructing variants directly. Expected per-record
    // batch failures must never log above `warn`, so the provider-facing
    // variants log at `warn`.

    pub fn configuration_error(message: impl Into<String>) -> Self {
        let message = message.into();
        log_error!(
            error_type = "configuration_error",
            message = %message,
            "Service configuration validation failed"
        );
        Self::ConfigurationError { message }
    }

    pub fn request_failed(
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        let message = message.into();
        log_warn!(
            error_type = "request_failed",
            message = %message,
            has_source = source.is_some(),
            "LLM request execution failed"
        );
        Self::RequestFailed { message, source }
    }

    pub fn response_parsing_error(message: impl Into<String>) -> Self {
        let message = message.into();
        log_warn!(
            error_type = "response_parsing_error",
            message = %message,
            "LLM response format invalid"
        );
        Self::ResponseParsingError { message }
    }

    pub fn rate_limit_exceeded(retry_after_seconds: u64) -> Self {
        log_warn!(
            error_type = "rate_limit_exceeded",
            retry_after_seconds = retry_after_seconds,
            "LLM provider rate limit exceeded"
        );
        Self::RateLimitExceeded {
            retry_after_seconds,
        }
    }

    pub fn timeout(timeout_seconds: u64) -> Self {
        log_warn!(
            error_type = "timeout",
            timeout_seconds = timeout_seconds,
            "LLM request timed out"
        );
        Self::Timeout { timeout_seconds }
    }

    pub fn authentication_failed(message: impl Into<String>) -> Self {
        let message = message.into();
        log_warn!(
            error_type = "authentication_failed",
            message = %message,
            "LLM provider authentication failed"
        );
        Self::AuthenticationFailed { message }
    }

    pub fn storage_unavailable(message: impl Into<String>) -> Self {
        let message = message.into();
        log_error!(
            error_type = "storage_unavailable",
            message = %message,
            "Job persistence backend unavailable"
        );
        Self::StorageUnavailable { message }
    }
}
