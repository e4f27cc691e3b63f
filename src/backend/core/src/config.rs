//! Configuration management.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::cache::PermissionMirror;
use crate::client::DEFAULT_PAGE_SIZE;
use crate::error::{PortcullisError, Result};
use crate::routing::{RouteTable, RouteTableConfig};
use crate::session::SessionBootstrap;
use crate::telemetry::LoggingConfig;

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Backend API configuration
    #[serde(default)]
    pub backend: BackendConfig,

    /// Session resolution configuration
    #[serde(default)]
    pub session: SessionConfig,

    /// Route authorization table
    #[serde(default)]
    pub routes: RouteTableConfig,

    /// Warm-start permission mirror
    #[serde(default)]
    pub mirror: MirrorConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the backend API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// Page size for list endpoints (max 100)
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Bearer token presented to the backend
    #[serde(default)]
    pub token: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout: default_request_timeout(),
            page_size: default_page_size(),
            token: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Upper bound on waiting for the session to resolve
    #[serde(default = "default_resolve_timeout", with = "humantime_serde")]
    pub resolve_timeout: Duration,

    /// Seconds before `exp` at which a token already counts as expired
    #[serde(default)]
    pub expiry_skew_secs: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            resolve_timeout: default_resolve_timeout(),
            expiry_skew_secs: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MirrorConfig {
    /// Whether loaded permissions are mirrored to disk
    #[serde(default)]
    pub enabled: bool,

    /// Mirror file location
    #[serde(default = "default_mirror_path")]
    pub path: PathBuf,

    /// Entries older than this are ignored
    #[serde(default = "default_mirror_max_age", with = "humantime_serde")]
    pub max_age: Duration,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_mirror_path(),
            max_age: default_mirror_max_age(),
        }
    }
}

// Default value functions
fn default_base_url() -> String { "http://localhost:8000/api/v1".to_string() }
fn default_request_timeout() -> Duration { Duration::from_secs(10) }
fn default_page_size() -> u32 { DEFAULT_PAGE_SIZE }
fn default_resolve_timeout() -> Duration { Duration::from_secs(3) }
fn default_mirror_path() -> PathBuf { PathBuf::from(".portcullis/permissions.json") }
fn default_mirror_max_age() -> Duration { Duration::from_secs(24 * 60 * 60) }

impl Config {
    /// Load configuration from the environment (`PORTCULLIS__SECTION__KEY`).
    ///
    /// A `.env` file in the working directory is read first, if present.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("PORTCULLIS").separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from a specific file path, with the environment layered on top.
    pub fn from_file(path: &str) -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("PORTCULLIS").separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.backend.base_url.trim().is_empty() {
            return Err(PortcullisError::configuration("backend.base_url must not be empty"));
        }
        if self.session.resolve_timeout.is_zero() {
            return Err(PortcullisError::configuration(
                "session.resolve_timeout must be greater than zero",
            ));
        }
        if self.session.expiry_skew_secs < 0 {
            return Err(PortcullisError::configuration(
                "session.expiry_skew_secs must not be negative",
            ));
        }
        Ok(())
    }

    /// Compile the configured route table.
    pub fn route_table(&self) -> Result<RouteTable> {
        RouteTable::from_config(&self.routes)
    }

    /// Bootstrap configured with the session bounds and, when enabled, the mirror.
    pub fn bootstrap(&self) -> SessionBootstrap {
        let bootstrap =
            SessionBootstrap::new(self.session.resolve_timeout, self.session.expiry_skew_secs);
        if self.mirror.enabled {
            bootstrap.with_mirror(PermissionMirror::new(&self.mirror.path, self.mirror.max_age))
        } else {
            bootstrap
        }
    }
}
