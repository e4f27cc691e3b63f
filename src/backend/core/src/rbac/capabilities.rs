//! System-vs-business protection rules for the admin screens.
//!
//! System roles and system permissions can be edited (display name,
//! description) but never deleted. Users can always edit themselves and can
//! never delete themselves.

use serde::Serialize;

use super::evaluator::PermissionEvaluator;
use super::models::{Permission, PermissionWithMeta, Role, RoleName, UserId};
use super::roles::CORE_TARGETS;

/// Presentation class of a permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionKind {
    /// A page-visibility gate (`action == "access"`).
    Page,
    /// A permission over the RBAC core itself.
    Core,
    /// Anything else.
    Business,
}

impl PermissionKind {
    pub fn of(permission: &Permission) -> Self {
        if permission.is_access() {
            Self::Page
        } else if is_core_target(&permission.target) {
            Self::Core
        } else {
            Self::Business
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Page => "page",
            Self::Core => "core",
            Self::Business => "business",
        }
    }
}

pub fn is_core_target(target: &str) -> bool {
    CORE_TARGETS.contains(&target)
}

pub fn is_system_role(name: &str) -> bool {
    RoleName::parse(name).is_system()
}

/// Whether a permission is protected from deletion.
pub fn is_system_permission(permission: &PermissionWithMeta) -> bool {
    permission.is_system || is_core_target(&permission.permission.target)
}

/// Capability checks layered over the evaluator.
#[derive(Debug, Clone)]
pub struct Capabilities<'a> {
    evaluator: PermissionEvaluator<'a>,
}

impl<'a> Capabilities<'a> {
    pub fn new(evaluator: PermissionEvaluator<'a>) -> Self {
        Self { evaluator }
    }

    fn has(&self, target: &str, action: &str) -> bool {
        self.evaluator.has_permission(&Permission::new(target, action))
    }

    fn is_self(&self, user_id: &UserId) -> bool {
        &self.evaluator.principal().id == user_id
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Users
    // ─────────────────────────────────────────────────────────────────────────

    pub fn can_view_users(&self) -> bool {
        self.has("user", "read")
    }

    /// `user:write` edits anyone; without it a user may edit only themselves.
    pub fn can_edit_user(&self, user_id: &UserId) -> bool {
        self.has("user", "write") || self.is_self(user_id)
    }

    /// Requires `user:delete`, and never applies to oneself.
    pub fn can_delete_user(&self, user_id: &UserId) -> bool {
        self.has("user", "delete") && !self.is_self(user_id)
    }

    /// Assigning roles to users is a role write.
    pub fn can_manage_user_roles(&self) -> bool {
        self.has("role", "write")
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Roles
    // ─────────────────────────────────────────────────────────────────────────

    pub fn can_view_roles(&self) -> bool {
        self.has("role", "read")
    }

    /// System roles stay editable (non-core fields only).
    pub fn can_edit_role(&self, _role: &Role) -> bool {
        self.has("role", "write")
    }

    pub fn can_delete_role(&self, role: &Role) -> bool {
        self.has("role", "delete") && role.is_deletable()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Permissions
    // ─────────────────────────────────────────────────────────────────────────

    pub fn can_view_permissions(&self) -> bool {
        self.has("permission", "read")
    }

    pub fn can_edit_permission(&self, _permission: &PermissionWithMeta) -> bool {
        self.has("permission", "write")
    }

    pub fn can_delete_permission(&self, permission: &PermissionWithMeta) -> bool {
        self.has("permission", "delete") && !is_system_permission(permission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::PermissionSet;
    use crate::rbac::models::Principal;
    use std::sync::Arc;

    fn caps<'a>(principal: &'a Principal, keys: &[&str]) -> Capabilities<'a> {
        Capabilities::new(PermissionEvaluator::with_view(
            principal,
            Some(Arc::new(PermissionSet::from_keys(keys))),
        ))
    }

    #[test]
    fn test_permission_kind() {
        assert_eq!(PermissionKind::of(&Permission::new("dashboard", "access")), PermissionKind::Page);
        assert_eq!(PermissionKind::of(&Permission::new("role_mgmt", "access")), PermissionKind::Page);
        assert_eq!(PermissionKind::of(&Permission::new("role", "write")), PermissionKind::Core);
        assert_eq!(PermissionKind::of(&Permission::new("report", "export")), PermissionKind::Business);
    }

    #[test]
    fn test_self_rules() {
        let me = Principal::new("10", ["user"]);
        let c = caps(&me, &[]);
        assert!(c.can_edit_user(&UserId::new("10")));
        assert!(!c.can_edit_user(&UserId::new("11")));

        let admin = Principal::new("1", ["super_admin"]);
        let c = caps(&admin, &[]);
        assert!(c.can_delete_user(&UserId::new("2")));
        assert!(!c.can_delete_user(&UserId::new("1")));
    }

    #[test]
    fn test_system_roles_never_deletable() {
        let root = Principal::new("1", ["super_admin"]);
        let c = caps(&root, &[]);
        let admin_role = Role::new("admin", "Administrator", Vec::<Permission>::new()).system();
        let custom = Role::new("editor", "Editor", Vec::<Permission>::new());
        assert!(c.can_edit_role(&admin_role));
        assert!(!c.can_delete_role(&admin_role));
        assert!(c.can_delete_role(&custom));
    }

    #[test]
    fn test_admin_cannot_delete_roles_without_grant() {
        let admin = Principal::new("2", ["admin"]);
        let c = caps(&admin, &[]);
        assert!(c.can_edit_role(&Role::new("editor", "Editor", Vec::<Permission>::new())));
        assert!(!c.can_delete_role(&Role::new("editor", "Editor", Vec::<Permission>::new())));
        assert!(c.can_manage_user_roles());
    }

    #[test]
    fn test_system_permissions_not_deletable() {
        let root = Principal::new("1", ["super_admin"]);
        let c = caps(&root, &[]);
        let core = PermissionWithMeta::new(Permission::new("user", "read"));
        let flagged = PermissionWithMeta::new(Permission::new("report", "read")).system();
        let business = PermissionWithMeta::new(Permission::new("report", "export"));
        assert!(!c.can_delete_permission(&core));
        assert!(!c.can_delete_permission(&flagged));
        assert!(c.can_delete_permission(&business));
        assert!(c.can_edit_permission(&core));
    }

    #[test]
    fn test_plain_user_reads_by_cache() {
        let viewer = Principal::new("3", ["viewer"]);
        let c = caps(&viewer, &["user:read", "permission:read"]);
        assert!(c.can_view_users());
        assert!(c.can_view_permissions());
        assert!(!c.can_view_roles());
        assert!(!c.can_edit_user(&UserId::new("4")));
    }
}
