//! Tower layer applying the route guard to page requests.
//!
//! For hosts that render pages server-side (or sit in front of the UI as a
//! BFF): each request's bearer token selects a [`SessionContext`], the guard
//! decides the request path, and a redirect decision becomes a
//! `303 See Other`. Allowed requests reach the inner service with the
//! session and a [`RequestContext`] in their extensions. Public pages are
//! served without bootstrapping a session.

use axum::{
    body::Body,
    extract::Request,
    http::header,
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;
use dashmap::DashMap;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::{debug, warn};

use super::{GuardDecision, RouteGuard};
use crate::client::BackendClient;
use crate::error::{self, ErrorCode, PortcullisError};
use crate::routing::PageClass;
use crate::session::{token_status, BearerSession, SessionBootstrap, SessionContext};
use crate::telemetry::{CredentialRedactor, RequestContext};

// ═══════════════════════════════════════════════════════════════════════════════
// Session Factory
// ═══════════════════════════════════════════════════════════════════════════════

/// Builds a fresh session context for a credential.
pub trait SessionFactory: Send + Sync {
    /// `None` means the request carried no credential.
    fn create(&self, token: Option<String>) -> SessionContext;
}

/// Sessions backed by the backend API: `/users/me` for the principal and
/// `/rbac/me/permissions` for the cache.
#[derive(Debug, Clone)]
pub struct BackendSessions {
    client: BackendClient,
}

impl BackendSessions {
    pub fn new(client: BackendClient) -> Self {
        Self { client }
    }
}

impl SessionFactory for BackendSessions {
    fn create(&self, token: Option<String>) -> SessionContext {
        let client = match &token {
            Some(token) => self.client.with_token(token.clone()),
            None => self.client.clone(),
        };
        let client = Arc::new(client);
        let session = BearerSession::new(token, client.clone());
        SessionContext::new(Arc::new(session), client)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Session Registry
// ═══════════════════════════════════════════════════════════════════════════════

/// Signed-in sessions keyed by credential.
///
/// A context enters the registry after a successful bootstrap and leaves it
/// as soon as it is no longer authenticated, so a new login always starts
/// with a new cache. Entries whose credential has expired are pruned each
/// time a new session is registered.
#[derive(Clone)]
struct SessionRegistry {
    factory: Arc<dyn SessionFactory>,
    bootstrap: SessionBootstrap,
    sessions: Arc<DashMap<String, SessionContext>>,
}

impl SessionRegistry {
    async fn context_for(&self, token: Option<String>) -> SessionContext {
        let Some(token) = token else {
            return self.factory.create(None);
        };

        if let Some(ctx) = self.sessions.get(&token) {
            return ctx.clone();
        }

        let ctx = self.factory.create(Some(token.clone()));
        let outcome = self.bootstrap.run(&ctx).await;
        if outcome.is_authenticated() {
            self.prune_expired();
            debug!(
                credential = %CredentialRedactor::global().redact("token", &token),
                "Registered session"
            );
            self.sessions.insert(token, ctx.clone());
        }
        ctx
    }

    /// The registered context for `token`, or an anonymous one. Never
    /// bootstraps.
    fn existing_or_anonymous(&self, token: Option<&str>) -> SessionContext {
        token
            .and_then(|token| self.sessions.get(token).map(|ctx| ctx.clone()))
            .unwrap_or_else(|| self.factory.create(None))
    }

    /// Drop every session whose credential has expired.
    fn prune_expired(&self) -> usize {
        let now = Utc::now();
        let skew = self.bootstrap.expiry_skew_secs();
        let before = self.sessions.len();

        self.sessions.retain(|token, ctx| {
            let keep = token_status(Some(token), skew, now).is_valid();
            if !keep {
                ctx.cache().invalidate();
            }
            keep
        });

        let pruned = before.saturating_sub(self.sessions.len());
        if pruned > 0 {
            debug!(pruned, remaining = self.sessions.len(), "Pruned expired sessions");
        }
        pruned
    }

    fn release_if_signed_out(&self, token: Option<&str>, ctx: &SessionContext) {
        if let Some(token) = token {
            if !ctx.session().is_authenticated() && self.sessions.remove(token).is_some() {
                debug!("Released signed-out session");
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tower Layer
// ═══════════════════════════════════════════════════════════════════════════════

/// Layer that guards every request path.
///
/// # Example
///
/// ```rust,ignore
/// use portcullis_core::guard::{GuardLayer, RouteGuard};
///
/// let guard = RouteGuard::new(Arc::new(config.route_table()?));
/// let app = Router::new()
///     .route("/users/:id", get(user_page))
///     .layer(GuardLayer::new(guard, Arc::new(BackendSessions::new(client)), config.bootstrap()));
/// ```
#[derive(Clone)]
pub struct GuardLayer {
    guard: Arc<RouteGuard>,
    registry: SessionRegistry,
}

impl GuardLayer {
    pub fn new(guard: RouteGuard, factory: Arc<dyn SessionFactory>, bootstrap: SessionBootstrap) -> Self {
        Self {
            guard: Arc::new(guard),
            registry: SessionRegistry {
                factory,
                bootstrap,
                sessions: Arc::new(DashMap::new()),
            },
        }
    }

    /// Number of registered signed-in sessions.
    pub fn active_sessions(&self) -> usize {
        self.registry.sessions.len()
    }

    /// Drop sessions whose credential has expired and return how many went.
    ///
    /// Registration already does this; hosts with long quiet periods can
    /// also call it on a timer.
    pub fn prune_expired(&self) -> usize {
        self.registry.prune_expired()
    }

    /// Drop the session registered for `token`, e.g. on logout.
    pub async fn sign_out(&self, token: &str) {
        if let Some((_, ctx)) = self.registry.sessions.remove(token) {
            ctx.sign_out().await;
        }
    }
}

impl<S> Layer<S> for GuardLayer {
    type Service = GuardService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        GuardService {
            inner,
            guard: self.guard.clone(),
            registry: self.registry.clone(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tower Service
// ═══════════════════════════════════════════════════════════════════════════════

/// Service that guards each request before passing it on.
#[derive(Clone)]
pub struct GuardService<S> {
    inner: S,
    guard: Arc<RouteGuard>,
    registry: SessionRegistry,
}

impl<S> Service<Request<Body>> for GuardService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<Body>) -> Self::Future {
        let guard = self.guard.clone();
        let registry = self.registry.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let token = match bearer_token(&request) {
                Ok(token) => token,
                Err(error) => return Ok(error.into_response()),
            };
            let path = request
                .uri()
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_else(|| request.uri().path().to_string());

            let ctx = match guard.table().classify(&path) {
                PageClass::Public => registry.existing_or_anonymous(token.as_deref()),
                _ => registry.context_for(token.clone()).await,
            };
            let decision = guard.navigate(&path, &ctx).await;
            registry.release_if_signed_out(token.as_deref(), &ctx);

            if let Some(location) = decision.location() {
                return Ok(redirect_response(location, &decision));
            }

            let mut telemetry = request
                .headers()
                .get("x-request-id")
                .and_then(|v| v.to_str().ok())
                .map(RequestContext::with_request_id)
                .unwrap_or_default();
            if let Some(principal) = ctx.principal() {
                telemetry = telemetry.with_user_id(principal.id.to_string());
            }
            request.extensions_mut().insert(telemetry);
            request.extensions_mut().insert(ctx);

            inner.call(request).await
        })
    }
}

/// Credential from `Authorization: Bearer <token>`.
///
/// Other schemes count as no credential. A header that is not visible ASCII
/// is rejected outright.
fn bearer_token(request: &Request<Body>) -> error::Result<Option<String>> {
    let Some(value) = request.headers().get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value.to_str().map_err(|e| {
        warn!("Rejecting non-ASCII Authorization header");
        PortcullisError::with_internal(
            ErrorCode::InvalidToken,
            "The Authorization header could not be read",
            e.to_string(),
        )
    })?;
    Ok(value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from))
}

/// Build a `303 See Other` response for a redirect decision.
fn redirect_response(location: &str, decision: &GuardDecision) -> Response {
    let mut response = Redirect::to(location).into_response();
    if let Some(reason) = decision.reason() {
        if let Ok(value) = reason.as_str().parse() {
            response.headers_mut().insert("x-portcullis-reason", value);
        }
    }
    response
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, StatusCode};

    #[test]
    fn test_bearer_token_extraction() {
        let mut request = Request::builder().uri("/users").body(Body::empty()).unwrap();
        assert!(bearer_token(&request).unwrap().is_none());

        request
            .headers_mut()
            .insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def.ghi"));
        assert_eq!(bearer_token(&request).unwrap().as_deref(), Some("abc.def.ghi"));

        request
            .headers_mut()
            .insert(header::AUTHORIZATION, HeaderValue::from_static("Basic Zm9vOmJhcg=="));
        assert!(bearer_token(&request).unwrap().is_none());

        request
            .headers_mut()
            .insert(header::AUTHORIZATION, HeaderValue::from_bytes(b"Bearer \xff").unwrap());
        let err = bearer_token(&request).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidToken);
    }

    #[test]
    fn test_redirect_response_is_see_other() {
        let decision = GuardDecision::redirect(
            "/users",
            None,
            "/403".into(),
            super::super::RedirectReason::Forbidden,
        );
        let response = redirect_response("/403", &decision);
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/403");
        assert_eq!(response.headers()["x-portcullis-reason"], "forbidden");
    }
}
