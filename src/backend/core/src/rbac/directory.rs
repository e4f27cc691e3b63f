//! Role directory: the role → permission map behind the admin screens.
//!
//! The directory answers "what does each role grant?" and aggregates a
//! principal's effective permissions as the union over all of its roles.
//! When the backend cannot be reached, [`RoleDirectory::builtin`] provides the
//! seeded system roles so rendering stays coherent.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::models::{Permission, PermissionWithMeta, Principal, Role, RoleName};
use super::roles::SystemRole;
use crate::cache::{PermissionSet, PermissionSource};
use crate::error::{PortcullisError, Result};

/// Roles indexed by name.
///
/// Thread-safe via `DashMap`; clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct RoleDirectory {
    roles: Arc<DashMap<String, Role>>,
}

impl RoleDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory holding only the seeded system roles.
    pub fn builtin() -> Self {
        Self::from_roles(SystemRole::all_defaults())
    }

    pub fn from_roles(roles: impl IntoIterator<Item = Role>) -> Self {
        let directory = Self::new();
        directory.load_roles(roles);
        directory
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Role management
    // ─────────────────────────────────────────────────────────────────────────

    /// Register or replace a role.
    pub fn upsert(&self, role: Role) {
        debug!(role = %role.name, permissions = role.permissions.len(), "Adding role to directory");
        self.roles.insert(role.name.clone(), role);
    }

    pub fn load_roles(&self, roles: impl IntoIterator<Item = Role>) {
        for role in roles {
            self.upsert(role);
        }
    }

    pub fn get(&self, name: &str) -> Option<Role> {
        self.roles.get(name).map(|r| r.clone())
    }

    /// Remove a role. Fails for system roles and reserved names.
    pub fn remove(&self, name: &str) -> Result<Role> {
        let deletable = match self.roles.get(name) {
            Some(role) => role.is_deletable(),
            None => return Err(PortcullisError::not_found("Role", name)),
        };
        if !deletable {
            warn!(role = name, "Cannot remove system role");
            return Err(PortcullisError::forbidden("System roles cannot be deleted"));
        }
        self.roles
            .remove(name)
            .map(|(_, role)| role)
            .ok_or_else(|| PortcullisError::internal(format!("role {name} vanished during removal")))
    }

    /// All roles, system roles first, then by name.
    pub fn roles(&self) -> Vec<Role> {
        let mut roles: Vec<Role> = self.roles.iter().map(|r| r.value().clone()).collect();
        roles.sort_by(|a, b| b.is_system.cmp(&a.is_system).then_with(|| a.name.cmp(&b.name)));
        roles
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Aggregation
    // ─────────────────────────────────────────────────────────────────────────

    /// Effective permissions of a set of roles: the union of their grants.
    ///
    /// Unknown role names contribute nothing.
    pub fn aggregate<'a>(&self, roles: impl IntoIterator<Item = &'a RoleName>) -> PermissionSet {
        let mut set = PermissionSet::new();
        for name in roles {
            match self.roles.get(name.as_str()) {
                Some(role) => set.extend(role.permissions.iter().cloned()),
                None => debug!(role = %name, "Role not in directory; contributes nothing"),
            }
        }
        set
    }

    /// Effective permissions of a principal.
    pub fn permissions_for(&self, principal: &Principal) -> PermissionSet {
        self.aggregate(principal.roles.iter())
    }

    /// Roles that grant `permission`.
    pub fn roles_granting(&self, permission: &Permission) -> Vec<String> {
        let mut names: Vec<String> = self
            .roles
            .iter()
            .filter(|r| r.has_permission(permission))
            .map(|r| r.name.clone())
            .collect();
        names.sort();
        names
    }
}

/// A permission source that aggregates a principal's roles from a directory.
///
/// Used as the degraded source when the permission service is unavailable.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    directory: RoleDirectory,
    principal: Principal,
}

impl DirectorySource {
    pub fn new(directory: RoleDirectory, principal: Principal) -> Self {
        Self {
            directory,
            principal,
        }
    }
}

#[async_trait]
impl PermissionSource for DirectorySource {
    async fn fetch_permissions(&self) -> Result<Vec<Permission>> {
        Ok(self
            .directory
            .permissions_for(&self.principal)
            .iter()
            .cloned()
            .collect())
    }

    async fn fetch_permissions_with_meta(&self) -> Result<Vec<PermissionWithMeta>> {
        Ok(self.directory.permissions_for(&self.principal).to_vec())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::PermissionCache;
    use crate::error::ErrorCode;

    fn editor() -> Role {
        Role::new(
            "editor",
            "Editor",
            [Permission::new("article", "write"), Permission::new("user", "read")],
        )
    }

    #[test]
    fn test_aggregate_is_union() {
        let directory = RoleDirectory::builtin();
        directory.upsert(editor());

        let principal = Principal::new("5", ["user", "editor"]);
        let set = directory.permissions_for(&principal);
        assert!(set.contains(&Permission::new("dashboard", "access")));
        assert!(set.contains(&Permission::new("article", "write")));
        assert!(set.contains(&Permission::new("user", "read")));
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_unknown_roles_contribute_nothing() {
        let directory = RoleDirectory::builtin();
        let principal = Principal::new("5", ["ghost"]);
        assert!(directory.permissions_for(&principal).is_empty());
    }

    #[test]
    fn test_remove_refuses_system_roles() {
        let directory = RoleDirectory::builtin();
        directory.upsert(editor());

        let err = directory.remove("admin").unwrap_err();
        assert_eq!(err.code(), ErrorCode::Forbidden);
        assert!(directory.get("admin").is_some());

        let removed = directory.remove("editor").unwrap();
        assert_eq!(removed.name, "editor");
        assert!(directory.remove("editor").is_err());
    }

    #[test]
    fn test_roles_ordering_and_lookup() {
        let directory = RoleDirectory::builtin();
        directory.upsert(editor());
        let names: Vec<String> = directory.roles().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["admin", "super_admin", "user", "editor"]);
        assert_eq!(
            directory.roles_granting(&Permission::new("user", "delete")),
            vec!["super_admin"]
        );
    }

    #[tokio::test]
    async fn test_directory_source_feeds_cache() {
        let directory = RoleDirectory::builtin();
        let source = DirectorySource::new(directory, Principal::new("1", ["user"]));
        let cache = PermissionCache::new(Arc::new(source));
        let set = cache.load().await.unwrap();
        assert_eq!(set.keys(), vec!["dashboard:access"]);
    }
}
