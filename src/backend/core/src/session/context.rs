//! One login's worth of authorization state.

use std::sync::Arc;
use tracing::{debug, warn};

use super::SessionProvider;
use crate::cache::{PermissionCache, PermissionSource};
use crate::rbac::evaluator::PermissionEvaluator;
use crate::rbac::models::Principal;

/// A session provider paired with the permission cache of that session.
///
/// Every context owns a fresh cache; a new login means a new context, so
/// permissions never carry over from one user to the next. Clones share the
/// same session and cache.
#[derive(Clone)]
pub struct SessionContext {
    session: Arc<dyn SessionProvider>,
    cache: PermissionCache,
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("authenticated", &self.session.is_authenticated())
            .field("cache", &self.cache)
            .finish()
    }
}

impl SessionContext {
    pub fn new(session: Arc<dyn SessionProvider>, source: Arc<dyn PermissionSource>) -> Self {
        Self {
            session,
            cache: PermissionCache::new(source),
        }
    }

    pub fn session(&self) -> &Arc<dyn SessionProvider> {
        &self.session
    }

    pub fn cache(&self) -> &PermissionCache {
        &self.cache
    }

    pub fn principal(&self) -> Option<Principal> {
        self.session.current_principal()
    }

    /// Run `f` against an evaluator over the current cache view.
    ///
    /// Returns `None` when nobody is signed in.
    pub fn evaluate<T>(&self, f: impl FnOnce(&PermissionEvaluator<'_>) -> T) -> Option<T> {
        let principal = self.principal()?;
        let evaluator = PermissionEvaluator::with_view(&principal, self.cache.view());
        Some(f(&evaluator))
    }

    /// Drop cached permissions and clear the session.
    ///
    /// Used on logout and whenever the credential is found to be stale.
    pub async fn sign_out(&self) {
        self.cache.invalidate();
        if let Err(error) = self.session.clear_session().await {
            warn!(error = %error, "Failed to clear session");
        }
        debug!("Session signed out");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbac::directory::{DirectorySource, RoleDirectory};
    use crate::rbac::models::{Permission, RoleName};
    use crate::session::InMemorySession;

    fn context_for(principal: Principal) -> SessionContext {
        let source = DirectorySource::new(RoleDirectory::builtin(), principal.clone());
        SessionContext::new(
            Arc::new(InMemorySession::signed_in(principal, "t")),
            Arc::new(source),
        )
    }

    #[tokio::test]
    async fn test_sign_out_clears_cache_and_session() {
        let ctx = context_for(Principal::new("u1", [RoleName::User]));
        ctx.cache().load().await.unwrap();
        assert!(ctx.cache().is_loaded());

        ctx.sign_out().await;
        assert!(!ctx.cache().is_loaded());
        assert!(ctx.principal().is_none());
        assert!(ctx.evaluate(|_| ()).is_none());
    }

    #[tokio::test]
    async fn test_contexts_do_not_share_cache() {
        let first = context_for(Principal::new("u1", [RoleName::User]));
        let second = context_for(Principal::new("u2", [RoleName::User]));

        first.cache().load().await.unwrap();
        assert!(first.cache().is_loaded());
        assert!(!second.cache().is_loaded());
    }

    #[tokio::test]
    async fn test_evaluate_uses_loaded_view() {
        let ctx = context_for(Principal::new("u1", [RoleName::User]));
        let dashboard = Permission::new("dashboard", "access");

        assert_eq!(ctx.evaluate(|e| e.has_permission(&dashboard)), Some(false));
        ctx.cache().load().await.unwrap();
        assert_eq!(ctx.evaluate(|e| e.has_permission(&dashboard)), Some(true));
    }
}
