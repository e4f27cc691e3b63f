//! Session state held in memory and driven by the host.

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::debug;

use super::SessionProvider;
use crate::error::Result;
use crate::rbac::models::Principal;

#[derive(Debug, Default)]
struct SessionState {
    principal: Option<Principal>,
    token: Option<String>,
}

/// A session whose state is pushed in by the host.
///
/// Starts unresolved; `sign_in`, `sign_out` and `mark_resolved` all resolve
/// it. Useful for embedding hosts that own the login flow, and for tests.
#[derive(Debug)]
pub struct InMemorySession {
    state: RwLock<SessionState>,
    resolved: watch::Sender<bool>,
}

impl Default for InMemorySession {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySession {
    /// An unresolved session.
    pub fn new() -> Self {
        let (resolved, _) = watch::channel(false);
        Self {
            state: RwLock::new(SessionState::default()),
            resolved,
        }
    }

    /// A resolved session with no principal.
    pub fn anonymous() -> Self {
        let session = Self::new();
        session.mark_resolved();
        session
    }

    /// A resolved session for `principal` holding `token`.
    pub fn signed_in(principal: Principal, token: impl Into<String>) -> Self {
        let session = Self::new();
        session.sign_in(principal, token);
        session
    }

    pub fn sign_in(&self, principal: Principal, token: impl Into<String>) {
        debug!(user_id = %principal.id, "Session signed in");
        {
            let mut state = self.state.write();
            state.principal = Some(principal);
            state.token = Some(token.into());
        }
        self.mark_resolved();
    }

    pub fn sign_out(&self) {
        *self.state.write() = SessionState::default();
        self.mark_resolved();
    }

    /// Replace only the credential, e.g. after a token refresh.
    pub fn set_token(&self, token: Option<String>) {
        self.state.write().token = token;
    }

    pub fn mark_resolved(&self) {
        self.resolved.send_replace(true);
    }
}

#[async_trait]
impl SessionProvider for InMemorySession {
    fn is_resolved(&self) -> bool {
        *self.resolved.borrow()
    }

    async fn wait_resolved(&self) {
        let mut rx = self.resolved.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|resolved| *resolved).await;
    }

    fn is_authenticated(&self) -> bool {
        self.state.read().principal.is_some()
    }

    fn current_principal(&self) -> Option<Principal> {
        self.state.read().principal.clone()
    }

    fn access_token(&self) -> Option<String> {
        self.state.read().token.clone()
    }

    async fn refresh_session(&self) -> Result<()> {
        self.mark_resolved();
        Ok(())
    }

    async fn clear_session(&self) -> Result<()> {
        self.sign_out();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbac::models::RoleName;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_starts_unresolved() {
        let session = InMemorySession::new();
        assert!(!session.is_resolved());
        assert!(!session.is_authenticated());
        assert!(InMemorySession::anonymous().is_resolved());
    }

    #[tokio::test]
    async fn test_wait_resolved_wakes_on_sign_in() {
        let session = Arc::new(InMemorySession::new());
        let waiter = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.wait_resolved().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        session.sign_in(Principal::new("1", [RoleName::User]), "token");

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
        assert!(session.is_authenticated());
        assert_eq!(session.access_token().as_deref(), Some("token"));
    }

    #[tokio::test]
    async fn test_clear_session_keeps_resolution() {
        let session = InMemorySession::signed_in(Principal::new("1", [RoleName::Admin]), "t");
        session.clear_session().await.unwrap();
        assert!(session.is_resolved());
        assert!(session.current_principal().is_none());
        assert!(session.access_token().is_none());
    }
}
