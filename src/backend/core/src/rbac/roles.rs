//! Built-in system roles and the seed permission catalog.
//!
//! Portcullis knows three reserved roles:
//!
//! | Role        | Description                                                   |
//! |-------------|---------------------------------------------------------------|
//! | SuperAdmin  | Every permission, unconditionally                             |
//! | Admin       | Everything except deleting users, roles or permissions        |
//! | User        | Dashboard access only                                         |
//!
//! The catalog mirrors the backend's seed data and is used as the fallback
//! directory when the permission service cannot be reached.

use super::models::{Permission, PermissionWithMeta, Role, RoleName};

/// Targets of the RBAC core permissions, including their page gates.
pub const CORE_TARGETS: [&str; 6] = [
    "user",
    "role",
    "permission",
    "user_mgmt",
    "role_mgmt",
    "perm_mgmt",
];

/// `(target, action, display name, description)` for every core permission.
const CORE_CATALOG: [(&str, &str, &str, &str); 12] = [
    ("user", "read", "View users", "View user details and lists"),
    ("user", "write", "Edit users", "Create and edit users"),
    ("user", "delete", "Delete users", "Delete user accounts"),
    ("role", "read", "View roles", "View roles and their permissions"),
    ("role", "write", "Edit roles", "Create and edit roles and assignments"),
    ("role", "delete", "Delete roles", "Delete custom roles"),
    ("permission", "read", "View permissions", "View the permission catalog"),
    ("permission", "write", "Edit permissions", "Edit permission metadata"),
    ("permission", "delete", "Delete permissions", "Delete business permissions"),
    ("user_mgmt", "access", "Open user management", "Open the user management pages"),
    ("role_mgmt", "access", "Open role management", "Open the role management pages"),
    ("perm_mgmt", "access", "Open permission management", "Open the permission management pages"),
];

/// The RBAC core permissions. These are flagged as system permissions.
pub fn core_permissions() -> Vec<PermissionWithMeta> {
    CORE_CATALOG
        .iter()
        .map(|(target, action, name, description)| {
            PermissionWithMeta::new(Permission::new(*target, *action))
                .with_display_name(*name)
                .with_description(*description)
                .system()
        })
        .collect()
}

/// Business permissions shipped with the default installation.
pub fn business_permissions() -> Vec<PermissionWithMeta> {
    module_permissions("dashboard", &["access"])
}

/// Every seeded permission, core first.
pub fn seed_permissions() -> Vec<PermissionWithMeta> {
    let mut all = core_permissions();
    all.extend(business_permissions());
    all
}

/// Generate the permissions of a business module, one per action.
///
/// Common actions get a standard display name; others fall back to
/// `"{action} {module}"`.
pub fn module_permissions(module: &str, actions: &[&str]) -> Vec<PermissionWithMeta> {
    actions
        .iter()
        .map(|action| {
            let display = match *action {
                "access" => format!("Open {module}"),
                "read" => format!("View {module}"),
                "write" => format!("Edit {module}"),
                "delete" => format!("Delete {module}"),
                "export" => format!("Export {module}"),
                "import" => format!("Import {module}"),
                "approve" => format!("Approve {module}"),
                "publish" => format!("Publish {module}"),
                "manage" => format!("Manage {module}"),
                other => format!("{other} {module}"),
            };
            PermissionWithMeta::new(Permission::new(module, *action)).with_display_name(display)
        })
        .collect()
}

/// Reserved role templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemRole {
    SuperAdmin,
    Admin,
    User,
}

impl SystemRole {
    /// Get the role identifier string.
    pub fn id(&self) -> &'static str {
        match self {
            Self::SuperAdmin => "super_admin",
            Self::Admin => "admin",
            Self::User => "user",
        }
    }

    /// Get the human-readable name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SuperAdmin => "Super Administrator",
            Self::Admin => "Administrator",
            Self::User => "User",
        }
    }

    /// Get the description.
    pub fn description(&self) -> &'static str {
        match self {
            Self::SuperAdmin => "Holds every permission",
            Self::Admin => "Manages the system but cannot delete core resources",
            Self::User => "Basic access only",
        }
    }

    pub fn role_name(&self) -> RoleName {
        match self {
            Self::SuperAdmin => RoleName::SuperAdmin,
            Self::Admin => RoleName::Admin,
            Self::User => RoleName::User,
        }
    }

    /// Look up a template by role name.
    pub fn from_name(name: &RoleName) -> Option<Self> {
        match name {
            RoleName::SuperAdmin => Some(Self::SuperAdmin),
            RoleName::Admin => Some(Self::Admin),
            RoleName::User => Some(Self::User),
            RoleName::Custom(_) => None,
        }
    }

    /// Return the seeded permissions of this role.
    pub fn permissions(&self) -> Vec<PermissionWithMeta> {
        match self {
            Self::SuperAdmin => seed_permissions(),
            // Admin gets everything but the core deletes.
            Self::Admin => seed_permissions()
                .into_iter()
                .filter(|p| !p.permission.is_protected_delete())
                .collect(),
            Self::User => module_permissions("dashboard", &["access"]),
        }
    }

    /// Build a full `Role` struct from this template.
    pub fn to_role(&self) -> Role {
        let mut role = Role::new(self.id(), self.name(), std::iter::empty::<Permission>())
            .with_description(self.description())
            .system();
        role.permissions = self.permissions();
        role
    }

    /// Return all system roles, highest first.
    pub fn all() -> Vec<SystemRole> {
        vec![Self::SuperAdmin, Self::Admin, Self::User]
    }

    /// Return all system roles as `Role` structs.
    pub fn all_defaults() -> Vec<Role> {
        Self::all().into_iter().map(|r| r.to_role()).collect()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_super_admin_has_every_seed_permission() {
        let role = SystemRole::SuperAdmin.to_role();
        for p in seed_permissions() {
            assert!(role.has_permission(&p.permission), "missing {}", p.permission);
        }
    }

    #[test]
    fn test_admin_lacks_core_deletes() {
        let role = SystemRole::Admin.to_role();
        assert!(role.has_permission(&Permission::new("user", "write")));
        assert!(role.has_permission(&Permission::new("perm_mgmt", "access")));
        assert!(role.has_permission(&Permission::new("dashboard", "access")));
        assert!(!role.has_permission(&Permission::new("user", "delete")));
        assert!(!role.has_permission(&Permission::new("role", "delete")));
        assert!(!role.has_permission(&Permission::new("permission", "delete")));
    }

    #[test]
    fn test_user_dashboard_only() {
        let role = SystemRole::User.to_role();
        assert_eq!(role.permissions.len(), 1);
        assert!(role.has_permission(&Permission::new("dashboard", "access")));
    }

    #[test]
    fn test_all_defaults_are_system_roles() {
        let roles = SystemRole::all_defaults();
        assert_eq!(roles.len(), 3);
        assert!(roles.iter().all(|r| r.is_system && !r.is_deletable()));
    }

    #[test]
    fn test_core_permissions_flagged_system() {
        assert!(core_permissions().iter().all(|p| p.is_system));
        assert!(business_permissions().iter().all(|p| !p.is_system));
        assert!(core_permissions()
            .iter()
            .all(|p| CORE_TARGETS.contains(&p.permission.target.as_str())));
    }

    #[test]
    fn test_module_permissions_display_names() {
        let perms = module_permissions("reports", &["access", "export", "send"]);
        assert_eq!(perms[0].display_name.as_deref(), Some("Open reports"));
        assert_eq!(perms[1].display_name.as_deref(), Some("Export reports"));
        assert_eq!(perms[2].display_name.as_deref(), Some("send reports"));
    }

    #[test]
    fn test_role_name_round_trip() {
        for role in SystemRole::all() {
            assert_eq!(SystemRole::from_name(&role.role_name()), Some(role));
            assert_eq!(role.role_name().as_str(), role.id());
        }
    }
}
