//! Startup resolution of the session and pre-warming of the permission cache.

use chrono::Utc;
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::token::{token_status, TokenStatus};
use super::SessionContext;
use crate::cache::{PermissionMirror, PermissionSet};
use crate::error::{ErrorCode, PortcullisError};
use crate::rbac::directory::RoleDirectory;
use crate::rbac::models::{Principal, UserId};

/// Default bound on waiting for the session provider.
pub const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_secs(3);

/// What the bootstrap settled on.
#[derive(Debug)]
pub enum BootstrapOutcome {
    /// A principal is signed in and its permissions are loaded.
    Authenticated {
        principal: Principal,
        permissions: Arc<PermissionSet>,
    },
    /// Nobody is signed in, either because no usable credential exists or
    /// because resolution failed. `fallback` holds the built-in role
    /// directory so the host can still render a coherent signed-out state.
    Unauthenticated {
        failure: Option<PortcullisError>,
        fallback: RoleDirectory,
    },
}

impl BootstrapOutcome {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated { .. })
    }

    pub fn principal(&self) -> Option<&Principal> {
        match self {
            Self::Authenticated { principal, .. } => Some(principal),
            Self::Unauthenticated { .. } => None,
        }
    }

    pub fn failure(&self) -> Option<&PortcullisError> {
        match self {
            Self::Authenticated { .. } => None,
            Self::Unauthenticated { failure, .. } => failure.as_ref(),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Authenticated { .. } => "authenticated",
            Self::Unauthenticated { failure: None, .. } => "anonymous",
            Self::Unauthenticated { failure: Some(_), .. } => "degraded",
        }
    }
}

/// Resolves a session at startup.
#[derive(Debug, Clone)]
pub struct SessionBootstrap {
    resolve_timeout: Duration,
    expiry_skew_secs: i64,
    mirror: Option<PermissionMirror>,
}

impl Default for SessionBootstrap {
    fn default() -> Self {
        Self::new(DEFAULT_RESOLVE_TIMEOUT, 0)
    }
}

impl SessionBootstrap {
    pub fn new(resolve_timeout: Duration, expiry_skew_secs: i64) -> Self {
        Self {
            resolve_timeout,
            expiry_skew_secs,
            mirror: None,
        }
    }

    /// Seconds before `exp` at which a token already counts as expired.
    pub fn expiry_skew_secs(&self) -> i64 {
        self.expiry_skew_secs
    }

    /// Mirror successful loads to disk for warm starts.
    pub fn with_mirror(mut self, mirror: PermissionMirror) -> Self {
        self.mirror = Some(mirror);
        self
    }

    /// Permissions mirrored for `user_id` by an earlier run.
    ///
    /// For optimistic rendering only; `run` always fetches a fresh set
    /// before anything is allowed or denied.
    pub async fn warm_start(&self, user_id: &UserId) -> Option<PermissionSet> {
        let mirror = self.mirror.as_ref()?;
        match mirror.load(user_id).await {
            Ok(found) => found,
            Err(error) => {
                warn!(error = %error, path = %mirror.path().display(), "Could not read permission mirror");
                None
            }
        }
    }

    /// Resolve the session and load its permissions.
    ///
    /// The permission load and the profile refresh run concurrently. If
    /// either fails the session and the cache are both cleared.
    pub async fn run(&self, ctx: &SessionContext) -> BootstrapOutcome {
        let outcome = self.resolve(ctx).await;
        counter!("portcullis_bootstrap_total", "outcome" => outcome.label()).increment(1);
        outcome
    }

    async fn resolve(&self, ctx: &SessionContext) -> BootstrapOutcome {
        let session = ctx.session();

        if !session.is_resolved()
            && tokio::time::timeout(self.resolve_timeout, session.wait_resolved())
                .await
                .is_err()
        {
            warn!(timeout = ?self.resolve_timeout, "Session did not resolve in time");
            let failure = PortcullisError::new(
                ErrorCode::SessionTimeout,
                "Session resolution timed out",
            );
            return self.fall_back(ctx, Some(failure)).await;
        }

        let token = session.access_token();
        match token_status(token.as_deref(), self.expiry_skew_secs, Utc::now()) {
            TokenStatus::Valid { .. } => {}
            TokenStatus::Missing => {
                debug!("No credential present");
                return self.fall_back(ctx, None).await;
            }
            status => {
                info!(?status, "Discarding unusable credential");
                let failure = PortcullisError::new(
                    ErrorCode::TokenExpired,
                    "Your session has expired. Please sign in again.",
                );
                return self.fall_back(ctx, Some(failure)).await;
            }
        }

        let (permissions, profile) = tokio::join!(ctx.cache().load(), session.refresh_session());

        let permissions = match (permissions, profile) {
            (Ok(permissions), Ok(())) => permissions,
            (Err(error), _) | (_, Err(error)) => {
                warn!(code = %error.code(), error = %error, "Session bootstrap failed");
                return self.fall_back(ctx, Some(error)).await;
            }
        };

        let Some(principal) = session.current_principal() else {
            let failure = PortcullisError::unauthorized("No principal for the presented credential");
            return self.fall_back(ctx, Some(failure)).await;
        };

        if let Some(mirror) = &self.mirror {
            if let Err(error) = mirror.store(&principal.id, &permissions).await {
                warn!(error = %error, "Could not write permission mirror");
            }
        }

        info!(
            user_id = %principal.id,
            roles = ?principal.role_names(),
            permissions = permissions.len(),
            "Session bootstrapped"
        );
        BootstrapOutcome::Authenticated {
            principal,
            permissions,
        }
    }

    async fn fall_back(
        &self,
        ctx: &SessionContext,
        failure: Option<PortcullisError>,
    ) -> BootstrapOutcome {
        ctx.sign_out().await;
        BootstrapOutcome::Unauthenticated {
            failure,
            fallback: RoleDirectory::builtin(),
        }
    }
}
