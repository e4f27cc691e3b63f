//! Error handling for Portcullis.
//!
//! This module provides:
//! - A single error type carrying a stable, machine-readable [`ErrorCode`]
//! - User-friendly messages vs detailed internal messages
//! - HTTP status code mapping for the guard layer and API responses
//! - Severity-based logging with tracing integration
//! - Metrics integration for error tracking
//!
//! # Usage
//!
//! ```rust,ignore
//! use portcullis_core::error::{ErrorCode, PortcullisError, Result};
//!
//! fn require_token(token: Option<&str>) -> Result<&str> {
//!     token.ok_or_else(|| PortcullisError::new(ErrorCode::Unauthorized, "Please sign in"))
//! }
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::{error, warn};

// ═══════════════════════════════════════════════════════════════════════════════
// Result Type Alias
// ═══════════════════════════════════════════════════════════════════════════════

/// A specialized Result type for Portcullis operations.
pub type Result<T> = std::result::Result<T, PortcullisError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Error Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// Machine-readable error codes.
///
/// These codes are stable and can be used by clients for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Authentication (4000-4099)
    Unauthorized,
    TokenExpired,
    InvalidToken,
    Forbidden,
    SessionTimeout,

    // Lookup (4100-4199)
    NotFound,

    // Permission state (4200-4299)
    LoadSuperseded,

    // Backend (3000-3099)
    BackendUnavailable,
    BackendRejected,
    NetworkError,

    // Serialization (2200-2299)
    DeserializationError,
    SerializationError,

    // Configuration (5000-5099)
    ConfigurationError,
    InvalidRoutePattern,

    // Storage (2000-2099)
    StorageError,

    // Internal (9000-9099)
    InternalError,
}

impl ErrorCode {
    /// Get the numeric code for this error.
    pub const fn numeric_code(&self) -> u32 {
        match self {
            Self::Unauthorized => 4000,
            Self::TokenExpired => 4001,
            Self::InvalidToken => 4002,
            Self::Forbidden => 4003,
            Self::SessionTimeout => 4004,

            Self::NotFound => 4100,

            Self::LoadSuperseded => 4200,

            Self::BackendUnavailable => 3000,
            Self::BackendRejected => 3001,
            Self::NetworkError => 3002,

            Self::DeserializationError => 2200,
            Self::SerializationError => 2201,

            Self::ConfigurationError => 5000,
            Self::InvalidRoutePattern => 5001,

            Self::StorageError => 2000,

            Self::InternalError => 9000,
        }
    }

    /// Get the HTTP status code for this error.
    pub const fn http_status(&self) -> StatusCode {
        match self {
            Self::Unauthorized | Self::TokenExpired | Self::InvalidToken | Self::SessionTimeout => {
                StatusCode::UNAUTHORIZED
            }

            Self::Forbidden => StatusCode::FORBIDDEN,

            Self::NotFound => StatusCode::NOT_FOUND,

            Self::LoadSuperseded => StatusCode::CONFLICT,

            Self::BackendUnavailable => StatusCode::SERVICE_UNAVAILABLE,

            Self::BackendRejected | Self::NetworkError | Self::DeserializationError => {
                StatusCode::BAD_GATEWAY
            }

            Self::SerializationError
            | Self::ConfigurationError
            | Self::InvalidRoutePattern
            | Self::StorageError
            | Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the error means the credential is no longer usable.
    pub const fn is_authentication(&self) -> bool {
        matches!(
            self,
            Self::Unauthorized | Self::TokenExpired | Self::InvalidToken | Self::SessionTimeout
        )
    }

    /// Get the error category for grouping.
    pub const fn category(&self) -> &'static str {
        match self.numeric_code() {
            2000..=2099 => "storage",
            2200..=2299 => "serialization",
            3000..=3099 => "backend",
            4000..=4099 => "authentication",
            4100..=4199 => "lookup",
            4200..=4299 => "permission_cache",
            5000..=5099 => "configuration",
            9000..=9099 => "internal",
            _ => "unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Severity
// ═══════════════════════════════════════════════════════════════════════════════

/// Severity level for errors (affects logging).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// Expected during normal navigation (expired tokens, denials)
    Low,
    /// Operational issues (backend hiccups, superseded loads)
    Medium,
    /// Misconfiguration or malformed backend data
    High,
    /// Bugs
    Critical,
}

impl ErrorSeverity {
    /// Get severity based on error code.
    pub const fn from_code(code: &ErrorCode) -> Self {
        match code {
            ErrorCode::Unauthorized
            | ErrorCode::TokenExpired
            | ErrorCode::InvalidToken
            | ErrorCode::Forbidden
            | ErrorCode::NotFound
            | ErrorCode::LoadSuperseded => Self::Low,

            ErrorCode::SessionTimeout
            | ErrorCode::BackendUnavailable
            | ErrorCode::NetworkError
            | ErrorCode::StorageError => Self::Medium,

            ErrorCode::BackendRejected
            | ErrorCode::DeserializationError
            | ErrorCode::SerializationError
            | ErrorCode::ConfigurationError
            | ErrorCode::InvalidRoutePattern => Self::High,

            ErrorCode::InternalError => Self::Critical,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Details
// ═══════════════════════════════════════════════════════════════════════════════

/// Additional structured details about an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Additional context key-value pairs
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,

    /// Backend HTTP status, when the error came from the backend
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_status: Option<u16>,

    /// Request path or endpoint involved
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl ErrorDetails {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    pub fn with_upstream_status(mut self, status: u16) -> Self {
        self.upstream_status = Some(status);
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    fn is_empty(&self) -> bool {
        self.context.is_empty() && self.upstream_status.is_none() && self.path.is_none()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Main Error Type
// ═══════════════════════════════════════════════════════════════════════════════

/// The main error type for Portcullis.
#[derive(Error, Debug)]
pub struct PortcullisError {
    /// Machine-readable error code
    code: ErrorCode,

    /// User-friendly error message (safe to expose to clients)
    user_message: Cow<'static, str>,

    /// Detailed internal message (for logging only)
    internal_message: Option<String>,

    /// Additional structured details
    details: ErrorDetails,

    /// The source error that caused this error
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl fmt::Display for PortcullisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.user_message)?;
        if let Some(ref internal) = self.internal_message {
            write!(f, " (internal: {})", internal)?;
        }
        Ok(())
    }
}

impl PortcullisError {
    // ─────────────────────────────────────────────────────────────────────────
    // Constructors
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a new error with code and user message.
    pub fn new(code: ErrorCode, user_message: impl Into<Cow<'static, str>>) -> Self {
        let error = Self {
            code,
            user_message: user_message.into(),
            internal_message: None,
            details: ErrorDetails::default(),
            source: None,
        };
        error.record_metrics();
        error
    }

    /// Create an error with both user and internal messages.
    pub fn with_internal(
        code: ErrorCode,
        user_message: impl Into<Cow<'static, str>>,
        internal_message: impl Into<String>,
    ) -> Self {
        let mut error = Self::new(code, user_message);
        error.internal_message = Some(internal_message.into());
        error
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_internal(
            ErrorCode::InternalError,
            "An internal error occurred",
            message,
        )
    }

    /// Create an unauthorized error.
    pub fn unauthorized(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    /// Create a forbidden error.
    pub fn forbidden(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::ConfigurationError, message)
    }

    /// Create a not found error.
    pub fn not_found(what: &str, id: impl fmt::Display) -> Self {
        Self::with_internal(ErrorCode::NotFound, format!("{} not found", what), format!("{} {} not found", what, id))
    }

    /// A cache load whose result was discarded by an invalidation.
    pub fn load_superseded() -> Self {
        Self::new(
            ErrorCode::LoadSuperseded,
            "Permission load was superseded by an invalidation",
        )
    }

    /// Map a non-success backend status into an error.
    pub fn from_status(status: u16, path: &str, body: impl Into<String>) -> Self {
        let (code, user_msg): (ErrorCode, &'static str) = match status {
            401 => (ErrorCode::Unauthorized, "The backend rejected the credential"),
            403 => (ErrorCode::Forbidden, "The backend denied access"),
            404 => (ErrorCode::NotFound, "The requested resource does not exist"),
            500..=599 => (ErrorCode::BackendUnavailable, "The permission service is unavailable"),
            _ => (ErrorCode::BackendRejected, "The backend rejected the request"),
        };
        Self::with_internal(code, user_msg, body).with_details(
            ErrorDetails::new()
                .with_upstream_status(status)
                .with_path(path),
        )
    }

    /// Rebuild an owned error from one shared between coalesced callers.
    ///
    /// The boxed source is not cloneable and is dropped; code, messages and
    /// details are kept.
    pub fn from_shared(shared: &PortcullisError) -> Self {
        let mut error = Self::new(shared.code, shared.user_message.clone());
        error.internal_message = shared.internal_message.clone();
        error.details = shared.details.clone();
        error
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Builder Methods
    // ─────────────────────────────────────────────────────────────────────────

    /// Add a source error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Add error details.
    pub fn with_details(mut self, details: ErrorDetails) -> Self {
        self.details = details;
        self
    }

    /// Add internal message.
    pub fn with_internal_message(mut self, message: impl Into<String>) -> Self {
        self.internal_message = Some(message.into());
        self
    }

    /// Add context to details.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.details.context.insert(key.into(), v);
        }
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Get the user-friendly message.
    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    /// Get the internal message (if any).
    pub fn internal_message(&self) -> Option<&str> {
        self.internal_message.as_deref()
    }

    /// Get the error details.
    pub fn details(&self) -> &ErrorDetails {
        &self.details
    }

    /// Get the HTTP status code.
    pub fn http_status(&self) -> StatusCode {
        self.code.http_status()
    }

    /// Whether the credential should be treated as unusable.
    pub fn is_authentication(&self) -> bool {
        self.code.is_authentication()
    }

    /// Get the error severity.
    pub fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::from_code(&self.code)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Logging
    // ─────────────────────────────────────────────────────────────────────────

    /// Log this error with appropriate severity.
    pub fn log(&self) {
        let code = self.code.to_string();
        let category = self.code.category();

        match self.severity() {
            ErrorSeverity::Critical => {
                error!(
                    error_code = %code,
                    category = category,
                    user_message = %self.user_message,
                    internal_message = ?self.internal_message,
                    details = ?self.details,
                    source = ?self.source,
                    "CRITICAL ERROR"
                );
            }
            ErrorSeverity::High => {
                error!(
                    error_code = %code,
                    category = category,
                    user_message = %self.user_message,
                    internal_message = ?self.internal_message,
                    "High severity error"
                );
            }
            ErrorSeverity::Medium => {
                warn!(
                    error_code = %code,
                    category = category,
                    user_message = %self.user_message,
                    "Medium severity error"
                );
            }
            ErrorSeverity::Low => {
                tracing::debug!(
                    error_code = %code,
                    category = category,
                    user_message = %self.user_message,
                    "Low severity error"
                );
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Metrics
    // ─────────────────────────────────────────────────────────────────────────

    fn record_metrics(&self) {
        counter!(
            "portcullis_errors_total",
            "code" => self.code.to_string(),
            "category" => self.code.category().to_string(),
            "severity" => format!("{:?}", self.severity()),
        )
        .increment(1);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// API Response
// ═══════════════════════════════════════════════════════════════════════════════

/// Error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Always false for errors
    pub success: bool,

    /// Error information
    pub error: ErrorInfo,
}

/// Detailed error information for responses.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub numeric_code: u32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<ErrorDetails>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl From<&PortcullisError> for ErrorResponse {
    fn from(error: &PortcullisError) -> Self {
        Self {
            success: false,
            error: ErrorInfo {
                code: error.code,
                numeric_code: error.code.numeric_code(),
                message: error.user_message.to_string(),
                details: if error.details.is_empty() {
                    None
                } else {
                    Some(error.details.clone())
                },
                timestamp: chrono::Utc::now(),
            },
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Axum Integration
// ═══════════════════════════════════════════════════════════════════════════════

impl IntoResponse for PortcullisError {
    fn into_response(self) -> Response {
        self.log();

        let status = self.http_status();
        let response = ErrorResponse::from(&self);

        (status, Json(response)).into_response()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// From Implementations for Common Error Types
// ═══════════════════════════════════════════════════════════════════════════════

impl From<reqwest::Error> for PortcullisError {
    fn from(error: reqwest::Error) -> Self {
        let (code, user_msg) = if error.is_timeout() {
            (
                ErrorCode::BackendUnavailable,
                "The permission service timed out",
            )
        } else if error.is_connect() {
            (
                ErrorCode::NetworkError,
                "Failed to connect to the permission service",
            )
        } else if error.is_decode() {
            (
                ErrorCode::DeserializationError,
                "The permission service returned malformed data",
            )
        } else if let Some(status) = error.status() {
            return Self::from_status(status.as_u16(), "", error.to_string()).with_source(error);
        } else {
            (ErrorCode::NetworkError, "Permission service request failed")
        };

        Self::with_internal(code, user_msg, error.to_string()).with_source(error)
    }
}

impl From<serde_json::Error> for PortcullisError {
    fn from(error: serde_json::Error) -> Self {
        let code = if error.is_syntax() || error.is_data() || error.is_eof() {
            ErrorCode::DeserializationError
        } else {
            ErrorCode::SerializationError
        };

        Self::with_internal(code, "Failed to process JSON data", error.to_string())
            .with_source(error)
    }
}

impl From<config::ConfigError> for PortcullisError {
    fn from(error: config::ConfigError) -> Self {
        Self::with_internal(
            ErrorCode::ConfigurationError,
            "Invalid configuration",
            error.to_string(),
        )
        .with_source(error)
    }
}

impl From<std::io::Error> for PortcullisError {
    fn from(error: std::io::Error) -> Self {
        Self::with_internal(ErrorCode::StorageError, "Storage I/O failed", error.to_string())
            .with_source(error)
    }
}

impl From<regex::Error> for PortcullisError {
    fn from(error: regex::Error) -> Self {
        Self::with_internal(
            ErrorCode::InvalidRoutePattern,
            "Route pattern could not be compiled",
            error.to_string(),
        )
        .with_source(error)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_http_status() {
        assert_eq!(ErrorCode::Unauthorized.http_status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorCode::Forbidden.http_status(), StatusCode::FORBIDDEN);
        assert_eq!(
            ErrorCode::BackendUnavailable.http_status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ErrorCode::InvalidRoutePattern.http_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_code_classification() {
        assert!(ErrorCode::TokenExpired.is_authentication());
        assert!(ErrorCode::SessionTimeout.is_authentication());
        assert!(!ErrorCode::Forbidden.is_authentication());
        assert_eq!(ErrorCode::LoadSuperseded.category(), "permission_cache");
    }

    #[test]
    fn test_from_status() {
        let err = PortcullisError::from_status(401, "/rbac/me/permissions", "expired");
        assert_eq!(err.code(), ErrorCode::Unauthorized);
        assert!(err.is_authentication());
        assert_eq!(err.details().upstream_status, Some(401));

        let err = PortcullisError::from_status(503, "/rbac/roles", "");
        assert_eq!(err.code(), ErrorCode::BackendUnavailable);

        let err = PortcullisError::from_status(422, "/rbac/roles", "bad page");
        assert_eq!(err.code(), ErrorCode::BackendRejected);
    }

    #[test]
    fn test_from_shared_keeps_code_and_messages() {
        let original = PortcullisError::with_internal(
            ErrorCode::BackendUnavailable,
            "down",
            "connection reset",
        )
        .with_context("attempt", 1);
        let copy = PortcullisError::from_shared(&original);
        assert_eq!(copy.code(), ErrorCode::BackendUnavailable);
        assert_eq!(copy.user_message(), "down");
        assert_eq!(copy.internal_message(), Some("connection reset"));
        assert!(copy.details().context.contains_key("attempt"));
    }

    #[test]
    fn test_error_display() {
        let err = PortcullisError::with_internal(ErrorCode::Forbidden, "nope", "missing user:delete");
        assert_eq!(err.to_string(), "[Forbidden] nope (internal: missing user:delete)");
    }

    #[test]
    fn test_error_response_omits_empty_details() {
        let err = PortcullisError::forbidden("denied");
        let response = ErrorResponse::from(&err);
        assert!(!response.success);
        assert!(response.error.details.is_none());
        assert_eq!(response.error.numeric_code, 4003);
    }
}
