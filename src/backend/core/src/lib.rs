#![allow(clippy::result_large_err)]
//! # Portcullis Core
//!
//! Role-based permission evaluation and route authorization for an admin
//! application.
//!
//! ## Architecture
//!
//! - **RBAC**: Permission model, system roles, role directory and the
//!   fail-closed permission evaluator
//! - **Routing**: Ordered route authorization table (exact, dynamic segment,
//!   prefix, default) with navigation metadata
//! - **Cache**: Per-session permission cache with load coalescing and
//!   generation-guarded invalidation, plus an on-disk warm-start mirror
//! - **Session**: Session provider trait, token expiry checks and the
//!   startup bootstrap
//! - **Guard**: The navigation state machine and its tower layer
//! - **Client**: Backend API client for permissions, profile and roles
//! - **Telemetry**: Structured logging with credential redaction

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod guard;
pub mod rbac;
pub mod routing;
pub mod session;
pub mod telemetry;

pub use error::{ErrorCode, ErrorDetails, ErrorSeverity, PortcullisError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::cache::{CacheState, PermissionCache, PermissionMirror, PermissionSet, PermissionSource};
    pub use crate::client::BackendClient;
    pub use crate::config::Config;
    pub use crate::error::{ErrorCode, ErrorDetails, ErrorSeverity, PortcullisError, Result};
    pub use crate::guard::{
        BackendSessions, GuardDecision, GuardLayer, GuardService, RedirectReason, RouteGuard,
        SessionFactory, Verdict,
    };
    pub use crate::rbac::{
        has_all_permissions, has_any_permission, has_permission, Capabilities, Elevation, Grant,
        Permission, PermissionEvaluator, PermissionKind, PermissionWithMeta, PolicyDecision,
        Principal, Role, RoleDirectory, RoleName, SystemRole, UserId,
    };
    pub use crate::routing::{MatchKind, NavItem, Requirement, Resolution, RouteTable, RouteTableConfig};
    pub use crate::session::{
        BearerSession, BootstrapOutcome, InMemorySession, SessionBootstrap, SessionContext,
        SessionProvider, TokenStatus, UserProfile,
    };
}
