//! Permission evaluator.
//!
//! The evaluator answers "may this principal do `target:action`?":
//!
//! 1. `super_admin` is always allowed
//! 2. `admin` is allowed unless the permission deletes a user, role or permission
//! 3. everyone else needs the permission in the loaded cache; an unloaded
//!    cache denies

use std::sync::Arc;
use tracing::debug;

use super::models::{Elevation, Permission, Principal};
use crate::cache::{PermissionCache, PermissionSet};
use crate::error::{PortcullisError, Result};
use crate::routing::Requirement;

// ═══════════════════════════════════════════════════════════════════════════════
// Decision
// ═══════════════════════════════════════════════════════════════════════════════

/// Why a permission was granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grant {
    SuperAdmin,
    Admin,
    Cached,
}

impl Grant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SuperAdmin => "super_admin",
            Self::Admin => "admin",
            Self::Cached => "cache",
        }
    }
}

/// Result of a policy evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    /// The action is allowed.
    Allow(Grant),
    /// The action is denied, with a reason.
    Deny(String),
}

impl PolicyDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow(_))
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, Self::Deny(_))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Evaluator
// ═══════════════════════════════════════════════════════════════════════════════

/// Evaluates permission checks for one principal against one cache view.
///
/// The cache is read once at construction, so every check made through the
/// same evaluator observes the same state.
#[derive(Debug, Clone)]
pub struct PermissionEvaluator<'a> {
    principal: &'a Principal,
    permissions: Option<Arc<PermissionSet>>,
}

impl<'a> PermissionEvaluator<'a> {
    pub fn new(principal: &'a Principal, cache: &PermissionCache) -> Self {
        Self::with_view(principal, cache.view())
    }

    /// Evaluate against an explicit view; `None` means the cache is unloaded.
    pub fn with_view(principal: &'a Principal, permissions: Option<Arc<PermissionSet>>) -> Self {
        Self {
            principal,
            permissions,
        }
    }

    pub fn principal(&self) -> &Principal {
        self.principal
    }

    /// Check a single permission.
    pub fn check(&self, permission: &Permission) -> PolicyDecision {
        let decision = match self.principal.elevation() {
            Elevation::SuperAdmin => PolicyDecision::Allow(Grant::SuperAdmin),
            Elevation::Admin if !permission.is_protected_delete() => {
                PolicyDecision::Allow(Grant::Admin)
            }
            _ => match &self.permissions {
                None => PolicyDecision::Deny(format!(
                    "Permission cache not loaded; denying {}",
                    permission
                )),
                Some(set) if set.contains(permission) => PolicyDecision::Allow(Grant::Cached),
                Some(_) => PolicyDecision::Deny(format!(
                    "User {} does not have permission {}",
                    self.principal.id, permission
                )),
            },
        };

        match &decision {
            PolicyDecision::Allow(grant) => debug!(
                user_id = %self.principal.id,
                permission = %permission,
                via = grant.as_str(),
                "Permission granted"
            ),
            PolicyDecision::Deny(reason) => debug!(
                user_id = %self.principal.id,
                permission = %permission,
                reason = %reason,
                "Permission denied"
            ),
        }
        decision
    }

    pub fn has_permission(&self, permission: &Permission) -> bool {
        self.check(permission).is_allowed()
    }

    /// Logical AND; stops at the first denial. An empty list is satisfied.
    pub fn has_all_permissions(&self, permissions: &[Permission]) -> bool {
        permissions.iter().all(|p| self.has_permission(p))
    }

    /// Logical OR. An empty list is not satisfied.
    pub fn has_any_permission(&self, permissions: &[Permission]) -> bool {
        permissions.iter().any(|p| self.has_permission(p))
    }

    /// Whether the principal meets a route requirement.
    pub fn satisfies(&self, requirement: &Requirement) -> bool {
        match requirement {
            Requirement::Authenticated => true,
            Requirement::One(p) => self.has_permission(p),
            Requirement::All(ps) => self.has_all_permissions(ps),
            Requirement::Any(ps) => self.has_any_permission(ps),
        }
    }

    /// Convenience: returns `Ok(())` if allowed, a `Forbidden` error if denied.
    pub fn enforce(&self, permission: &Permission) -> Result<()> {
        match self.check(permission) {
            PolicyDecision::Allow(_) => Ok(()),
            PolicyDecision::Deny(reason) => Err(PortcullisError::with_internal(
                crate::error::ErrorCode::Forbidden,
                "Permission denied",
                reason,
            )),
        }
    }
}

/// One-shot check of `permission` for `principal` against `cache`.
pub fn has_permission(principal: &Principal, permission: &Permission, cache: &PermissionCache) -> bool {
    PermissionEvaluator::new(principal, cache).has_permission(permission)
}

/// One-shot AND check.
pub fn has_all_permissions(
    principal: &Principal,
    permissions: &[Permission],
    cache: &PermissionCache,
) -> bool {
    PermissionEvaluator::new(principal, cache).has_all_permissions(permissions)
}

/// One-shot OR check.
pub fn has_any_permission(
    principal: &Principal,
    permissions: &[Permission],
    cache: &PermissionCache,
) -> bool {
    PermissionEvaluator::new(principal, cache).has_any_permission(permissions)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn loaded(keys: &[&str]) -> Option<Arc<PermissionSet>> {
        Some(Arc::new(PermissionSet::from_keys(keys)))
    }

    fn perm(target: &str, action: &str) -> Permission {
        Permission::new(target, action)
    }

    #[test]
    fn test_super_admin_bypasses_cache() {
        let principal = Principal::new("1", ["super_admin"]);
        let eval = PermissionEvaluator::with_view(&principal, None);
        assert!(eval.has_permission(&perm("user", "delete")));
        assert!(eval.has_permission(&perm("anything", "at_all")));
        assert_eq!(
            eval.check(&perm("permission", "delete")),
            PolicyDecision::Allow(Grant::SuperAdmin)
        );
    }

    #[test]
    fn test_admin_shortcut_excludes_core_deletes() {
        let principal = Principal::new("2", ["admin"]);

        let unloaded = PermissionEvaluator::with_view(&principal, None);
        assert!(unloaded.has_permission(&perm("report", "delete")));
        assert!(unloaded.has_permission(&perm("user_mgmt", "access")));
        assert!(!unloaded.has_permission(&perm("user", "delete")));
        assert!(!unloaded.has_permission(&perm("role", "delete")));
        assert!(!unloaded.has_permission(&perm("permission", "delete")));

        let granted = PermissionEvaluator::with_view(&principal, loaded(&["user:delete"]));
        assert_eq!(
            granted.check(&perm("user", "delete")),
            PolicyDecision::Allow(Grant::Cached)
        );
        assert!(!granted.has_permission(&perm("role", "delete")));
    }

    #[test]
    fn test_unloaded_cache_fails_closed() {
        let principal = Principal::new("3", ["user"]);
        let eval = PermissionEvaluator::with_view(&principal, None);
        assert!(eval.check(&perm("dashboard", "access")).is_denied());
    }

    #[test]
    fn test_loaded_cache_membership_is_exact() {
        let principal = Principal::new("3", ["user"]);
        let eval = PermissionEvaluator::with_view(&principal, loaded(&["dashboard:access"]));
        assert!(eval.has_permission(&perm("dashboard", "access")));
        assert!(!eval.has_permission(&perm("Dashboard", "access")));
        assert!(!eval.has_permission(&perm("dashboard", "read")));
    }

    #[test]
    fn test_all_and_any() {
        let principal = Principal::new("4", ["editor"]);
        let eval = PermissionEvaluator::with_view(&principal, loaded(&["a:read", "b:read"]));

        assert!(eval.has_all_permissions(&[perm("a", "read"), perm("b", "read")]));
        assert!(!eval.has_all_permissions(&[perm("a", "read"), perm("c", "read")]));
        assert!(eval.has_any_permission(&[perm("c", "read"), perm("b", "read")]));
        assert!(!eval.has_any_permission(&[perm("c", "read")]));
        assert!(eval.has_all_permissions(&[]));
        assert!(!eval.has_any_permission(&[]));
    }

    #[test]
    fn test_satisfies_requirement() {
        let principal = Principal::new("4", ["editor"]);
        let eval = PermissionEvaluator::with_view(&principal, loaded(&["a:read"]));

        assert!(eval.satisfies(&Requirement::Authenticated));
        assert!(eval.satisfies(&Requirement::One(perm("a", "read"))));
        assert!(!eval.satisfies(&Requirement::All(vec![perm("a", "read"), perm("b", "read")])));
        assert!(eval.satisfies(&Requirement::Any(vec![perm("a", "read"), perm("b", "read")])));
    }

    #[test]
    fn test_enforce_maps_denial_to_forbidden() {
        let principal = Principal::new("5", ["user"]);
        let eval = PermissionEvaluator::with_view(&principal, loaded(&[]));
        let err = eval.enforce(&perm("user", "read")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Forbidden);
        assert!(eval.enforce(&perm("user", "read")).is_err());
    }
}
