//! Bearer-token session resolved against the backend.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{ProfileSource, SessionProvider, UserProfile};
use crate::error::Result;
use crate::rbac::models::Principal;

/// A session carrying a bearer token.
///
/// The credential is known up front, so the session counts as resolved from
/// construction. The principal stays unknown until [`refresh_session`]
/// fetches the profile; a backend authentication failure during refresh
/// drops both the principal and the token.
///
/// [`refresh_session`]: SessionProvider::refresh_session
pub struct BearerSession {
    token: RwLock<Option<String>>,
    profile: RwLock<Option<UserProfile>>,
    source: Arc<dyn ProfileSource>,
}

impl std::fmt::Debug for BearerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerSession")
            .field("has_token", &self.token.read().is_some())
            .field("profile", &*self.profile.read())
            .finish()
    }
}

impl BearerSession {
    pub fn new(token: Option<String>, source: Arc<dyn ProfileSource>) -> Self {
        let token = token.filter(|t| !t.trim().is_empty());
        Self {
            token: RwLock::new(token),
            profile: RwLock::new(None),
            source,
        }
    }

    /// The last profile fetched, if any.
    pub fn profile(&self) -> Option<UserProfile> {
        self.profile.read().clone()
    }

    fn clear(&self) {
        *self.token.write() = None;
        *self.profile.write() = None;
    }
}

#[async_trait]
impl SessionProvider for BearerSession {
    fn is_resolved(&self) -> bool {
        true
    }

    async fn wait_resolved(&self) {}

    fn is_authenticated(&self) -> bool {
        self.token.read().is_some() && self.profile.read().is_some()
    }

    fn current_principal(&self) -> Option<Principal> {
        self.profile.read().as_ref().map(UserProfile::principal)
    }

    fn access_token(&self) -> Option<String> {
        self.token.read().clone()
    }

    async fn refresh_session(&self) -> Result<()> {
        if self.token.read().is_none() {
            *self.profile.write() = None;
            return Ok(());
        }

        match self.source.fetch_profile().await {
            Ok(profile) => {
                debug!(user_id = %profile.id, username = %profile.username, "Session profile refreshed");
                *self.profile.write() = Some(profile);
                Ok(())
            }
            Err(error) => {
                if error.is_authentication() {
                    warn!(code = %error.code(), "Backend rejected the session credential");
                    self.clear();
                }
                Err(error)
            }
        }
    }

    async fn clear_session(&self) -> Result<()> {
        self.clear();
        Ok(())
    }
}
