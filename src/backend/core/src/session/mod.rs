//! Session state: who is signed in, with which credential.
//!
//! The authentication provider is an external collaborator reached through
//! [`SessionProvider`]. Two implementations ship with the crate:
//!
//! - [`InMemorySession`]: state pushed in by the host (tests, embedded hosts)
//! - [`BearerSession`]: a bearer token whose principal is resolved from the
//!   backend's `/users/me`
//!
//! A [`SessionContext`] pairs one provider with one permission cache and
//! lives exactly as long as one login.

pub mod bearer;
pub mod bootstrap;
pub mod context;
pub mod memory;
pub mod token;

pub use bearer::BearerSession;
pub use bootstrap::{BootstrapOutcome, SessionBootstrap};
pub use context::SessionContext;
pub use memory::InMemorySession;
pub use token::{decode_claims, is_expired, token_status, TokenClaims, TokenStatus};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::rbac::models::{Principal, RoleName, UserId};

// ═══════════════════════════════════════════════════════════════════════════════
// Provider Trait
// ═══════════════════════════════════════════════════════════════════════════════

/// The authentication/session collaborator.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Whether the authentication state has been determined.
    fn is_resolved(&self) -> bool;

    /// Completes once the state is determined. Callers bound the wait.
    async fn wait_resolved(&self);

    fn is_authenticated(&self) -> bool;

    fn current_principal(&self) -> Option<Principal>;

    fn access_token(&self) -> Option<String>;

    /// Re-read the session from its source of truth.
    async fn refresh_session(&self) -> Result<()>;

    /// Forget the principal and credential.
    async fn clear_session(&self) -> Result<()>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// User Profile
// ═══════════════════════════════════════════════════════════════════════════════

/// The signed-in user as returned by `GET /users/me`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub roles: Vec<RoleName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl UserProfile {
    pub fn principal(&self) -> Principal {
        Principal {
            id: self.id.clone(),
            roles: self.roles.clone(),
        }
    }
}

/// Where the current user's profile comes from.
#[async_trait]
pub trait ProfileSource: Send + Sync {
    async fn fetch_profile(&self) -> Result<UserProfile>;
}
