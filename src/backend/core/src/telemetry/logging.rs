//! Structured logging with JSON/pretty formats and credential redaction.
//!
//! - JSON format for production environments
//! - Pretty format for development
//! - Per-module log level configuration
//! - Redaction of bearer tokens and other credentials in log fields

use serde::Deserialize;
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Global redactor instance.
static REDACTOR: OnceLock<CredentialRedactor> = OnceLock::new();

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Global log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (json, pretty or compact)
    #[serde(default)]
    pub format: LogFormat,

    /// Per-module log levels
    #[serde(default)]
    pub module_levels: HashMap<String, String>,

    /// Whether to include file/line information
    #[serde(default)]
    pub include_location: bool,

    /// Whether to include target (module path)
    #[serde(default = "default_include_target")]
    pub include_target: bool,

    /// Redaction configuration
    #[serde(default)]
    pub redaction: RedactionConfig,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            module_levels: HashMap::new(),
            include_location: false,
            include_target: default_include_target(),
            redaction: RedactionConfig::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format for production/structured logging
    #[default]
    Json,
    /// Pretty format for development
    Pretty,
    /// Compact single-line format
    Compact,
}

/// Configuration for credential redaction.
#[derive(Debug, Clone, Deserialize)]
pub struct RedactionConfig {
    #[serde(default = "default_redaction_enabled")]
    pub enabled: bool,

    /// Field names (case-insensitive substrings) whose values are always hidden
    #[serde(default = "default_sensitive_fields")]
    pub field_names: Vec<String>,

    #[serde(default = "default_redaction_replacement")]
    pub replacement: String,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            enabled: default_redaction_enabled(),
            field_names: default_sensitive_fields(),
            replacement: default_redaction_replacement(),
        }
    }
}

/// Hides credentials before they reach a log field.
#[derive(Debug, Clone)]
pub struct CredentialRedactor {
    field_names: Vec<String>,
    jwt: regex::Regex,
    replacement: String,
    enabled: bool,
}

impl CredentialRedactor {
    pub fn new(config: &RedactionConfig) -> Self {
        Self {
            field_names: config.field_names.iter().map(|s| s.to_lowercase()).collect(),
            jwt: regex::Regex::new(r"eyJ[a-zA-Z0-9_-]+\.[a-zA-Z0-9_-]+\.[a-zA-Z0-9_-]*")
                .expect("Invalid JWT regex"),
            replacement: config.replacement.clone(),
            enabled: config.enabled,
        }
    }

    pub fn should_redact_field(&self, field_name: &str) -> bool {
        if !self.enabled {
            return false;
        }
        let lower = field_name.to_lowercase();
        self.field_names.iter().any(|f| lower.contains(f.as_str()))
    }

    /// Replace anything token-shaped inside `value`.
    pub fn redact_value(&self, value: &str) -> String {
        if !self.enabled {
            return value.to_string();
        }
        self.jwt.replace_all(value, self.replacement.as_str()).into_owned()
    }

    /// Redact a field value, checking both the field name and the value.
    pub fn redact(&self, field_name: &str, value: &str) -> String {
        if self.should_redact_field(field_name) {
            return self.replacement.clone();
        }
        self.redact_value(value)
    }

    /// Get the global redactor instance.
    pub fn global() -> &'static CredentialRedactor {
        REDACTOR.get_or_init(|| CredentialRedactor::new(&RedactionConfig::default()))
    }
}

// Default value functions
fn default_log_level() -> String {
    std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string())
}

fn default_include_target() -> bool {
    true
}

fn default_redaction_enabled() -> bool {
    true
}

fn default_redaction_replacement() -> String {
    "[REDACTED]".to_string()
}

fn default_sensitive_fields() -> Vec<String> {
    ["token", "authorization", "bearer", "jwt", "cookie", "password", "secret"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Initialize the logging subsystem.
///
/// In `development` the JSON default is swapped for the pretty format.
///
/// # Errors
///
/// Returns an error if a filter directive is invalid or a global subscriber
/// is already installed.
pub fn init_logging(config: &LoggingConfig, environment: &str) -> anyhow::Result<()> {
    let _ = REDACTOR.set(CredentialRedactor::new(&config.redaction));

    let mut filter = EnvFilter::try_new(&config.level)?;
    for (module, level) in &config.module_levels {
        filter = filter.add_directive(format!("{}={}", module, level).parse()?);
    }

    let format = if environment == "development" && config.format == LogFormat::Json {
        &LogFormat::Pretty
    } else {
        &config.format
    };

    match format {
        LogFormat::Json => {
            let fmt_layer = fmt::layer()
                .json()
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .with_target(config.include_target);
            tracing_subscriber::registry().with(filter).with(fmt_layer).try_init()?;
        }
        LogFormat::Pretty => {
            let fmt_layer = fmt::layer()
                .pretty()
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .with_target(config.include_target);
            tracing_subscriber::registry().with(filter).with(fmt_layer).try_init()?;
        }
        LogFormat::Compact => {
            let fmt_layer = fmt::layer()
                .compact()
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .with_target(config.include_target);
            tracing_subscriber::registry().with(filter).with(fmt_layer).try_init()?;
        }
    }

    Ok(())
}
