//! Route guard: decides every navigation.
//!
//! A navigation moves through `PENDING_SESSION → AUTH_CHECK →
//! PERMISSION_CHECK` and always ends in [`Verdict::Allow`] or
//! [`Verdict::Redirect`]. Errors never escape a navigation: anything that
//! cannot be resolved ends in a redirect to login or to the forbidden page.
//!
//! # Usage
//!
//! ```rust,ignore
//! use portcullis_core::guard::RouteGuard;
//!
//! let guard = RouteGuard::new(Arc::new(RouteTable::builtin()));
//! let decision = guard.navigate("/users/42", &ctx).await;
//! if let Some(location) = decision.location() {
//!     // redirect
//! }
//! ```

pub mod layer;

pub use layer::{BackendSessions, GuardLayer, GuardService, SessionFactory};

use chrono::Utc;
use metrics::counter;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::PortcullisError;
use crate::rbac::evaluator::PermissionEvaluator;
use crate::rbac::models::Principal;
use crate::routing::{MatchKind, PageClass, Requirement, RouteTable};
use crate::session::bootstrap::DEFAULT_RESOLVE_TIMEOUT;
use crate::session::{token_status, SessionContext, SessionProvider};

// ═══════════════════════════════════════════════════════════════════════════════
// Decisions
// ═══════════════════════════════════════════════════════════════════════════════

/// Why a navigation was redirected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RedirectReason {
    /// Guest-only page visited while signed in.
    AlreadyAuthenticated,
    /// No principal, or the credential is missing or expired.
    Unauthenticated,
    /// The session did not resolve in time.
    SessionTimeout,
    /// Signed in but lacking the required permission.
    Forbidden,
    /// Permissions could not be loaded.
    PermissionsUnavailable,
}

impl RedirectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AlreadyAuthenticated => "already_authenticated",
            Self::Unauthenticated => "unauthenticated",
            Self::SessionTimeout => "session_timeout",
            Self::Forbidden => "forbidden",
            Self::PermissionsUnavailable => "permissions_unavailable",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Allow,
    Redirect {
        location: String,
        reason: RedirectReason,
    },
}

/// Outcome of one navigation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuardDecision {
    /// Path as requested.
    pub path: String,
    /// How the requirement was resolved, when resolution got that far.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<MatchKind>,
    #[serde(flatten)]
    pub verdict: Verdict,
}

impl GuardDecision {
    fn allow(path: &str, kind: Option<MatchKind>) -> Self {
        Self {
            path: path.to_string(),
            kind,
            verdict: Verdict::Allow,
        }
    }

    fn redirect(path: &str, kind: Option<MatchKind>, location: String, reason: RedirectReason) -> Self {
        Self {
            path: path.to_string(),
            kind,
            verdict: Verdict::Redirect { location, reason },
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self.verdict, Verdict::Allow)
    }

    /// Redirect target, if any.
    pub fn location(&self) -> Option<&str> {
        match &self.verdict {
            Verdict::Allow => None,
            Verdict::Redirect { location, .. } => Some(location),
        }
    }

    pub fn reason(&self) -> Option<RedirectReason> {
        match &self.verdict {
            Verdict::Allow => None,
            Verdict::Redirect { reason, .. } => Some(*reason),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Route Guard
// ═══════════════════════════════════════════════════════════════════════════════

/// Navigation guard over a route table.
#[derive(Debug, Clone)]
pub struct RouteGuard {
    table: Arc<RouteTable>,
    resolve_timeout: Duration,
    expiry_skew_secs: i64,
}

impl RouteGuard {
    pub fn new(table: Arc<RouteTable>) -> Self {
        Self {
            table,
            resolve_timeout: DEFAULT_RESOLVE_TIMEOUT,
            expiry_skew_secs: 0,
        }
    }

    /// Bound on waiting for an unresolved session.
    pub fn with_resolve_timeout(mut self, timeout: Duration) -> Self {
        self.resolve_timeout = timeout;
        self
    }

    /// Treat tokens as expired this many seconds before `exp`.
    pub fn with_expiry_skew(mut self, skew_secs: i64) -> Self {
        self.expiry_skew_secs = skew_secs;
        self
    }

    pub fn table(&self) -> &RouteTable {
        &self.table
    }

    /// Decide a navigation to `path`.
    pub async fn navigate(&self, path: &str, ctx: &SessionContext) -> GuardDecision {
        let decision = self.decide(path, ctx).await;

        let (outcome, reason) = match decision.reason() {
            None => ("allow", "none"),
            Some(reason) => ("redirect", reason.as_str()),
        };
        counter!(
            "portcullis_navigation_decisions_total",
            "outcome" => outcome,
            "reason" => reason
        )
        .increment(1);
        debug!(
            path,
            outcome,
            reason,
            kind = decision.kind.map(|k| k.as_str()),
            location = decision.location(),
            "Navigation decided"
        );

        decision
    }

    async fn decide(&self, path: &str, ctx: &SessionContext) -> GuardDecision {
        let session = ctx.session();

        match self.table.classify(path) {
            PageClass::Public => return GuardDecision::allow(path, Some(MatchKind::Public)),
            PageClass::GuestOnly => {
                return if self.has_usable_session(session.as_ref()) {
                    GuardDecision::redirect(
                        path,
                        Some(MatchKind::GuestOnly),
                        self.table.landing_path().to_string(),
                        RedirectReason::AlreadyAuthenticated,
                    )
                } else {
                    GuardDecision::allow(path, Some(MatchKind::GuestOnly))
                };
            }
            PageClass::Protected => {}
        }

        // PENDING_SESSION
        if !session.is_resolved()
            && tokio::time::timeout(self.resolve_timeout, session.wait_resolved())
                .await
                .is_err()
        {
            warn!(path, timeout = ?self.resolve_timeout, "Session did not resolve in time");
            return self.to_login(path, ctx, RedirectReason::SessionTimeout).await;
        }

        // AUTH_CHECK
        let principal = match session.current_principal() {
            Some(principal) if self.has_usable_session(session.as_ref()) => principal,
            _ => return self.to_login(path, ctx, RedirectReason::Unauthenticated).await,
        };

        if principal.is_super_admin() {
            return GuardDecision::allow(path, None);
        }

        // PERMISSION_CHECK
        let resolution = self.table.resolve(path);
        let kind = Some(resolution.kind);

        if resolution.requirement == Requirement::Authenticated {
            return GuardDecision::allow(path, kind);
        }

        if principal.is_admin() && resolution.requirement.is_single_access() {
            return GuardDecision::allow(path, kind);
        }

        let permissions = match ctx.cache().load().await {
            Ok(permissions) => permissions,
            Err(error) => return self.on_load_error(path, kind, ctx, error).await,
        };

        if PermissionEvaluator::with_view(&principal, Some(permissions)).satisfies(&resolution.requirement) {
            GuardDecision::allow(path, kind)
        } else {
            self.deny(path, kind, &principal, &resolution.requirement)
        }
    }

    /// A principal is present and the credential is present and unexpired.
    fn has_usable_session(&self, session: &dyn SessionProvider) -> bool {
        session.is_authenticated()
            && token_status(
                session.access_token().as_deref(),
                self.expiry_skew_secs,
                Utc::now(),
            )
            .is_valid()
    }

    async fn to_login(&self, path: &str, ctx: &SessionContext, reason: RedirectReason) -> GuardDecision {
        let session = ctx.session();
        if session.current_principal().is_some() || session.access_token().is_some() {
            info!(path, reason = reason.as_str(), "Clearing stale session");
            ctx.sign_out().await;
        } else {
            ctx.cache().invalidate();
        }
        GuardDecision::redirect(path, None, self.login_location(path), reason)
    }

    async fn on_load_error(
        &self,
        path: &str,
        kind: Option<MatchKind>,
        ctx: &SessionContext,
        error: PortcullisError,
    ) -> GuardDecision {
        if error.is_authentication() {
            warn!(path, code = %error.code(), "Credential rejected while loading permissions");
            ctx.sign_out().await;
            return GuardDecision::redirect(
                path,
                kind,
                self.login_location(path),
                RedirectReason::Unauthenticated,
            );
        }

        warn!(path, code = %error.code(), error = %error, "Permissions unavailable; denying navigation");
        GuardDecision::redirect(
            path,
            kind,
            self.table.forbidden_path().to_string(),
            RedirectReason::PermissionsUnavailable,
        )
    }

    fn deny(
        &self,
        path: &str,
        kind: Option<MatchKind>,
        principal: &Principal,
        requirement: &Requirement,
    ) -> GuardDecision {
        info!(
            path,
            user_id = %principal.id,
            requires = %requirement,
            "Navigation forbidden"
        );
        GuardDecision::redirect(
            path,
            kind,
            self.table.forbidden_path().to_string(),
            RedirectReason::Forbidden,
        )
    }

    /// Login path carrying the requested path for the post-login return.
    pub fn login_location(&self, path: &str) -> String {
        format!(
            "{}?redirect={}",
            self.table.login_path(),
            urlencoding::encode(path)
        )
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::PermissionSource;
    use crate::error::{ErrorCode, Result};
    use crate::rbac::models::{Permission, RoleName};
    use crate::session::InMemorySession;
    use async_trait::async_trait;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticSource {
        result: std::result::Result<Vec<Permission>, ErrorCode>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PermissionSource for StaticSource {
        async fn fetch_permissions(&self) -> Result<Vec<Permission>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result
                .clone()
                .map_err(|code| PortcullisError::new(code, "fetch failed"))
        }
    }

    fn token(exp_offset: i64) -> String {
        let claims = serde_json::json!({ "sub": "1", "exp": Utc::now().timestamp() + exp_offset });
        encode(&Header::default(), &claims, &EncodingKey::from_secret(b"k")).unwrap()
    }

    fn ctx_with(
        principal: Option<Principal>,
        result: std::result::Result<Vec<Permission>, ErrorCode>,
    ) -> (SessionContext, Arc<StaticSource>) {
        let session = match principal {
            Some(p) => InMemorySession::signed_in(p, token(3600)),
            None => InMemorySession::anonymous(),
        };
        let source = Arc::new(StaticSource {
            result,
            calls: AtomicUsize::new(0),
        });
        (SessionContext::new(Arc::new(session), source.clone()), source)
    }

    fn guard() -> RouteGuard {
        RouteGuard::new(Arc::new(RouteTable::builtin()))
    }

    #[tokio::test]
    async fn test_public_page_skips_session() {
        let (ctx, _) = ctx_with(None, Ok(vec![]));
        let decision = guard().navigate("/404", &ctx).await;
        assert!(decision.is_allowed());
        assert_eq!(decision.kind, Some(MatchKind::Public));
    }

    #[tokio::test]
    async fn test_unauthenticated_redirects_with_return_path() {
        let (ctx, _) = ctx_with(None, Ok(vec![]));
        let decision = guard().navigate("/users/42?tab=roles", &ctx).await;
        assert_eq!(
            decision.location(),
            Some("/login?redirect=%2Fusers%2F42%3Ftab%3Droles")
        );
        assert_eq!(decision.reason(), Some(RedirectReason::Unauthenticated));
    }

    #[tokio::test]
    async fn test_super_admin_skips_table_and_cache() {
        let (ctx, source) = ctx_with(
            Some(Principal::new("1", [RoleName::SuperAdmin])),
            Err(ErrorCode::BackendUnavailable),
        );
        let decision = guard().navigate("/rbac/permissions/3", &ctx).await;
        assert!(decision.is_allowed());
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_authenticated_only_route_skips_cache() {
        let (ctx, source) = ctx_with(Some(Principal::new("1", [RoleName::User])), Ok(vec![]));
        assert!(guard().navigate("/profile", &ctx).await.is_allowed());
        assert!(guard().navigate("/unknown/page", &ctx).await.is_allowed());
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_admin_non_access_route_needs_cache() {
        let (ctx, source) = ctx_with(Some(Principal::new("1", [RoleName::Admin])), Ok(vec![]));
        let decision = guard().navigate("/users/42/edit", &ctx).await;
        // Admin shortcut in the evaluator grants user:write once loaded.
        assert!(decision.is_allowed());
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_backend_outage_fails_closed_to_forbidden() {
        let (ctx, _) = ctx_with(
            Some(Principal::new("1", [RoleName::User])),
            Err(ErrorCode::BackendUnavailable),
        );
        let decision = guard().navigate("/users", &ctx).await;
        assert_eq!(decision.location(), Some("/403"));
        assert_eq!(decision.reason(), Some(RedirectReason::PermissionsUnavailable));
        assert!(ctx.principal().is_some());
    }

    #[tokio::test]
    async fn test_rejected_credential_signs_out() {
        let (ctx, _) = ctx_with(
            Some(Principal::new("1", [RoleName::User])),
            Err(ErrorCode::Unauthorized),
        );
        let decision = guard().navigate("/users", &ctx).await;
        assert_eq!(decision.reason(), Some(RedirectReason::Unauthenticated));
        assert!(decision.location().unwrap().starts_with("/login?redirect="));
        assert!(ctx.principal().is_none());
    }

    #[tokio::test]
    async fn test_unresolved_session_times_out_to_login() {
        let source: Arc<dyn PermissionSource> = Arc::new(StaticSource {
            result: Ok(vec![]),
            calls: AtomicUsize::new(0),
        });
        let ctx = SessionContext::new(Arc::new(InMemorySession::new()), source);
        let guard = guard().with_resolve_timeout(Duration::from_millis(20));

        let decision = guard.navigate("/dashboard", &ctx).await;
        assert_eq!(decision.reason(), Some(RedirectReason::SessionTimeout));
    }

    #[tokio::test]
    async fn test_any_requirement_uses_or() {
        let mut config = crate::routing::RouteTableConfig::default();
        config.entries.push(crate::routing::RouteEntry {
            path: "/reports".into(),
            requires: Requirement::Any(vec![
                Permission::new("report", "read"),
                Permission::new("report", "export"),
            ]),
            nav: None,
        });
        let guard = RouteGuard::new(Arc::new(RouteTable::from_config(&config).unwrap()));
        let (ctx, _) = ctx_with(
            Some(Principal::new("1", [RoleName::User])),
            Ok(vec![Permission::new("report", "export")]),
        );
        assert!(guard.navigate("/reports", &ctx).await.is_allowed());
    }

    #[test]
    fn test_decision_serializes_flat() {
        let decision = GuardDecision::redirect(
            "/users",
            Some(MatchKind::Exact),
            "/403".into(),
            RedirectReason::Forbidden,
        );
        let json = serde_json::to_value(&decision).unwrap();
        assert_eq!(json["verdict"], "redirect");
        assert_eq!(json["reason"], "forbidden");
        assert_eq!(json["kind"], "exact");
    }
}
