//! HTTP client for the backend's RBAC and user endpoints.
//!
//! | Endpoint                | Used by                               |
//! |-------------------------|---------------------------------------|
//! | `GET /rbac/me/permissions` | permission cache ([`PermissionSource`]) |
//! | `GET /users/me`         | bearer sessions ([`ProfileSource`])   |
//! | `GET /rbac/roles`       | role directory (paginated)            |
//! | `GET /rbac/permissions` | permission catalogue (paginated)      |

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::cache::PermissionSource;
use crate::config::BackendConfig;
use crate::error::{ErrorCode, ErrorDetails, PortcullisError, Result};
use crate::rbac::directory::RoleDirectory;
use crate::rbac::models::{Permission, PermissionWithMeta, Role};
use crate::session::{ProfileSource, UserProfile};

/// Default page size for list endpoints; the backend caps it at 100.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

const MAX_PAGE_SIZE: u32 = 100;

/// One page of a paginated list.
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub page_size: Option<u32>,
}

/// Client for the backend API.
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Clone)]
pub struct BackendClient {
    client: Client,
    base_url: String,
    token: Option<String>,
    page_size: u32,
}

impl std::fmt::Debug for BackendClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendClient")
            .field("base_url", &self.base_url)
            .field("has_token", &self.token.is_some())
            .field("page_size", &self.page_size)
            .finish()
    }
}

impl BackendClient {
    /// Create a client for `base_url`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            PortcullisError::with_internal(
                ErrorCode::ConfigurationError,
                "Failed to create HTTP client",
                e.to_string(),
            )
        })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    pub fn from_config(config: &BackendConfig) -> Result<Self> {
        let client = Self::new(&config.base_url, config.timeout)?.with_page_size(config.page_size);
        Ok(match &config.token {
            Some(token) => client.with_token(token.clone()),
            None => client,
        })
    }

    /// A client presenting `token` as its bearer credential.
    pub fn with_token(&self, token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            ..self.clone()
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Endpoints
    // ─────────────────────────────────────────────────────────────────────────

    /// Effective permissions of the caller.
    #[instrument(skip(self), fields(base_url = %self.base_url))]
    pub async fn my_permissions(&self) -> Result<Vec<PermissionWithMeta>> {
        self.get_json("/rbac/me/permissions", &[]).await
    }

    /// Profile of the caller.
    #[instrument(skip(self), fields(base_url = %self.base_url))]
    pub async fn current_user(&self) -> Result<UserProfile> {
        self.get_json("/users/me", &[]).await
    }

    /// Every role with its permissions.
    pub async fn list_roles(&self) -> Result<Vec<Role>> {
        self.fetch_all("/rbac/roles").await
    }

    /// The permission catalogue.
    pub async fn list_permissions(&self) -> Result<Vec<PermissionWithMeta>> {
        self.fetch_all("/rbac/permissions").await
    }

    /// Build a role directory from the backend's roles.
    pub async fn role_directory(&self) -> Result<RoleDirectory> {
        let roles = self.list_roles().await?;
        Ok(RoleDirectory::from_roles(roles))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Transport
    // ─────────────────────────────────────────────────────────────────────────

    /// Fetch one page.
    pub async fn page<T: DeserializeOwned>(&self, path: &str, page: u32) -> Result<Page<T>> {
        let query = [
            ("page", page.to_string()),
            ("page_size", self.page_size.to_string()),
        ];
        self.get_json(path, &query).await
    }

    /// Fetch every page of `path`, stopping at the first short or empty page.
    pub async fn fetch_all<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut page = 1;

        loop {
            let batch: Page<T> = self.page(path, page).await?;
            let received = batch.items.len();
            items.extend(batch.items);

            let exhausted = batch.total.is_some_and(|total| items.len() as u64 >= total);
            if received < self.page_size as usize || exhausted {
                break;
            }
            page += 1;
        }

        debug!(path, pages = page, count = items.len(), "Fetched paginated list");
        Ok(items)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.get(&url).query(query);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            PortcullisError::from(e).with_details(ErrorDetails::new().with_path(path))
        })?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            debug!(path, status = status.as_u16(), "Backend returned an error status");
            return Err(PortcullisError::from_status(status.as_u16(), path, body));
        }
        if status == StatusCode::NO_CONTENT {
            return Err(PortcullisError::with_internal(
                ErrorCode::DeserializationError,
                "The permission service returned no data",
                format!("{} returned 204", path),
            ));
        }

        serde_json::from_str(&body).map_err(|e| {
            PortcullisError::from(e).with_details(ErrorDetails::new().with_path(path))
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Collaborator Implementations
// ═══════════════════════════════════════════════════════════════════════════════

#[async_trait]
impl PermissionSource for BackendClient {
    async fn fetch_permissions(&self) -> Result<Vec<Permission>> {
        let permissions = self.my_permissions().await?;
        Ok(permissions.into_iter().map(|p| p.permission).collect())
    }

    async fn fetch_permissions_with_meta(&self) -> Result<Vec<PermissionWithMeta>> {
        self.my_permissions().await
    }
}

#[async_trait]
impl ProfileSource for BackendClient {
    async fn fetch_profile(&self) -> Result<UserProfile> {
        self.current_user().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_size_is_capped() {
        let client = BackendClient::new("http://localhost:8000/", Duration::from_secs(1))
            .unwrap()
            .with_page_size(500);
        assert_eq!(client.page_size, MAX_PAGE_SIZE);
        assert_eq!(client.base_url(), "http://localhost:8000");
    }

    #[test]
    fn test_with_token_keeps_settings() {
        let client = BackendClient::new("http://localhost:8000", Duration::from_secs(1))
            .unwrap()
            .with_page_size(25);
        let authed = client.with_token("abc");
        assert_eq!(authed.token(), Some("abc"));
        assert_eq!(authed.page_size, 25);
        assert!(client.token().is_none());
    }

    #[test]
    fn test_page_decodes_without_optional_fields() {
        let page: Page<String> = serde_json::from_str(r#"{"items":["a","b"]}"#).unwrap();
        assert_eq!(page.items.len(), 2);
        assert!(page.total.is_none());
    }
}
