//! Telemetry: structured logging and metric descriptions.
//!
//! # Example
//!
//! ```rust,no_run
//! use portcullis_core::telemetry::{init_telemetry, LoggingConfig};
//!
//! init_telemetry(&LoggingConfig::default(), "production").expect("Failed to initialize telemetry");
//! ```

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, CredentialRedactor, LogFormat, LoggingConfig, RedactionConfig};
pub use metrics::describe_metrics;

/// Initialize logging and register metric descriptions.
///
/// Call once at startup.
pub fn init_telemetry(config: &LoggingConfig, environment: &str) -> anyhow::Result<()> {
    init_logging(config, environment)?;
    describe_metrics();
    Ok(())
}

/// Per-request telemetry context, inserted into request extensions by the
/// guard layer.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Unique request identifier
    pub request_id: String,
    /// User ID if authenticated
    pub user_id: Option<String>,
}

impl RequestContext {
    /// Create a new request context with a generated request ID.
    pub fn new() -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            user_id: None,
        }
    }

    /// Reuse an incoming request ID.
    pub fn with_request_id(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            user_id: None,
        }
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_context_creation() {
        let ctx = RequestContext::new();
        assert!(!ctx.request_id.is_empty());
        assert!(ctx.user_id.is_none());
    }

    #[test]
    fn test_request_context_with_user() {
        let ctx = RequestContext::with_request_id("req-1").with_user_id("42");
        assert_eq!(ctx.request_id, "req-1");
        assert_eq!(ctx.user_id.as_deref(), Some("42"));
    }
}
