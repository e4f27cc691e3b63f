//! RBAC data models: Permission, Role, role names, and the Principal.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::fmt;

// ═══════════════════════════════════════════════════════════════════════════════
// Identifiers
// ═══════════════════════════════════════════════════════════════════════════════

/// Strongly-typed user identifier.
///
/// Decodes from either a JSON integer or a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireUserId {
    Int(i64),
    Text(String),
}

impl<'de> Deserialize<'de> for UserId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match WireUserId::deserialize(deserializer)? {
            WireUserId::Int(id) => Self::from(id),
            WireUserId::Text(id) => Self(id),
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Permission
// ═══════════════════════════════════════════════════════════════════════════════

/// Targets whose `delete` action is never covered by the admin shortcut.
pub const PROTECTED_TARGETS: [&str; 3] = ["user", "role", "permission"];

/// The action used by page-visibility gates.
pub const ACCESS_ACTION: &str = "access";

/// A capability on a target, e.g. `user:write` or `dashboard:access`.
///
/// Two permissions are equal iff target and action match exactly
/// (case-sensitive).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Permission {
    /// The protected object (e.g., "user", "role", "dashboard").
    pub target: String,
    /// The action (e.g., "read", "write", "delete", "access").
    pub action: String,
}

impl Permission {
    /// Create a new permission.
    pub fn new(target: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            action: action.into(),
        }
    }

    /// Structural equality on `(target, action)`.
    pub fn equals(&self, other: &Permission) -> bool {
        self.target == other.target && self.action == other.action
    }

    /// Canonical `"target:action"` form.
    ///
    /// `:` and `\` inside the target are backslash-escaped so the key stays
    /// injective; the action is taken verbatim after the first unescaped `:`.
    pub fn key(&self) -> String {
        let mut out = String::with_capacity(self.target.len() + self.action.len() + 1);
        for c in self.target.chars() {
            if c == ':' || c == '\\' {
                out.push('\\');
            }
            out.push(c);
        }
        out.push(':');
        out.push_str(&self.action);
        out
    }

    /// Parse a key produced by [`Permission::key`] (or a plain `"user:read"`).
    pub fn parse(s: &str) -> Option<Self> {
        let mut target = String::new();
        let mut chars = s.char_indices();
        while let Some((idx, c)) = chars.next() {
            match c {
                '\\' => {
                    let (_, escaped) = chars.next()?;
                    target.push(escaped);
                }
                ':' => {
                    let action = &s[idx + 1..];
                    if target.is_empty() || action.is_empty() {
                        return None;
                    }
                    return Some(Self::new(target, action));
                }
                _ => target.push(c),
            }
        }
        None
    }

    /// Whether this is a page-visibility gate (`action == "access"`).
    pub fn is_access(&self) -> bool {
        self.action == ACCESS_ACTION
    }

    /// Whether this is a delete on one of the core identity/RBAC targets.
    pub fn is_protected_delete(&self) -> bool {
        self.action == "delete" && PROTECTED_TARGETS.contains(&self.target.as_str())
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Backend payloads have used `target` or the legacy `resource` field, and
/// occasionally bare `"target:action"` strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum WirePermission {
    Key(String),
    Object {
        #[serde(alias = "resource")]
        target: String,
        action: String,
    },
}

impl WirePermission {
    fn into_permission<E: serde::de::Error>(self) -> Result<Permission, E> {
        match self {
            WirePermission::Key(key) => Permission::parse(&key)
                .ok_or_else(|| E::custom(format!("invalid permission key: {key}"))),
            WirePermission::Object { target, action } => Ok(Permission::new(target, action)),
        }
    }
}

impl<'de> Deserialize<'de> for Permission {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        WirePermission::deserialize(deserializer)?.into_permission()
    }
}

/// A permission plus presentation metadata, as returned by the backend.
///
/// Metadata never takes part in authorization decisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionWithMeta {
    #[serde(flatten)]
    pub permission: Permission,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether the backend marks this as a protected system permission.
    pub is_system: bool,
}

impl PermissionWithMeta {
    pub fn new(permission: Permission) -> Self {
        Self {
            permission,
            id: None,
            display_name: None,
            description: None,
            is_system: false,
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn system(mut self) -> Self {
        self.is_system = true;
        self
    }

    /// Display name, falling back to the permission key.
    pub fn label(&self) -> String {
        self.display_name
            .clone()
            .unwrap_or_else(|| self.permission.key())
    }
}

impl From<Permission> for PermissionWithMeta {
    fn from(permission: Permission) -> Self {
        Self::new(permission)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WirePermissionWithMeta {
    Key(String),
    Object {
        #[serde(alias = "resource")]
        target: String,
        action: String,
        #[serde(default)]
        id: Option<i64>,
        #[serde(default)]
        display_name: Option<String>,
        #[serde(default)]
        description: Option<String>,
        #[serde(default)]
        is_system: bool,
    },
}

impl<'de> Deserialize<'de> for PermissionWithMeta {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match WirePermissionWithMeta::deserialize(deserializer)? {
            WirePermissionWithMeta::Key(key) => WirePermission::Key(key)
                .into_permission()
                .map(PermissionWithMeta::new),
            WirePermissionWithMeta::Object {
                target,
                action,
                id,
                display_name,
                description,
                is_system,
            } => Ok(PermissionWithMeta {
                permission: Permission::new(target, action),
                id,
                display_name,
                description,
                is_system,
            }),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Role names
// ═══════════════════════════════════════════════════════════════════════════════

/// A role name. The three reserved system roles are distinguished from
/// arbitrary business roles.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RoleName {
    SuperAdmin,
    Admin,
    User,
    Custom(String),
}

impl RoleName {
    pub fn parse(name: &str) -> Self {
        match name {
            "super_admin" => Self::SuperAdmin,
            "admin" => Self::Admin,
            "user" => Self::User,
            other => Self::Custom(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::SuperAdmin => "super_admin",
            Self::Admin => "admin",
            Self::User => "user",
            Self::Custom(name) => name,
        }
    }

    /// Reserved names that must never be deleted.
    pub fn is_system(&self) -> bool {
        !matches!(self, Self::Custom(_))
    }
}

impl fmt::Display for RoleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for RoleName {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl From<String> for RoleName {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl Serialize for RoleName {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RoleName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(Self::parse(&name))
    }
}

/// The elevated standing a principal holds, highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Elevation {
    None,
    Admin,
    SuperAdmin,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Role
// ═══════════════════════════════════════════════════════════════════════════════

/// A role groups a set of permissions under a named identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    /// Backend identifier, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Stable unique name (e.g., "admin").
    pub name: String,
    /// Human-readable name.
    #[serde(default)]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Built-in system role (cannot be deleted).
    #[serde(default)]
    pub is_system: bool,
    /// Permissions granted by this role.
    #[serde(default)]
    pub permissions: Vec<PermissionWithMeta>,
}

impl Role {
    /// Create a new business role with the given permissions.
    pub fn new(
        name: impl Into<String>,
        display_name: impl Into<String>,
        permissions: impl IntoIterator<Item = Permission>,
    ) -> Self {
        Self {
            id: None,
            name: name.into(),
            display_name: display_name.into(),
            description: None,
            is_system: false,
            permissions: permissions.into_iter().map(PermissionWithMeta::new).collect(),
        }
    }

    /// Mark this as a system role.
    pub fn system(mut self) -> Self {
        self.is_system = true;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn role_name(&self) -> RoleName {
        RoleName::parse(&self.name)
    }

    /// Check if this role grants a specific permission.
    pub fn has_permission(&self, permission: &Permission) -> bool {
        self.permissions.iter().any(|p| p.permission.equals(permission))
    }

    /// System roles, and roles carrying a reserved name, are never deletable.
    pub fn is_deletable(&self) -> bool {
        !self.is_system && !self.role_name().is_system()
    }

    /// Add a permission to this role. Returns `false` if already present.
    pub fn grant(&mut self, permission: Permission) -> bool {
        if self.has_permission(&permission) {
            return false;
        }
        self.permissions.push(PermissionWithMeta::new(permission));
        true
    }

    /// Remove a permission from this role.
    pub fn revoke(&mut self, permission: &Permission) -> bool {
        let before = self.permissions.len();
        self.permissions.retain(|p| !p.permission.equals(permission));
        self.permissions.len() != before
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Principal
// ═══════════════════════════════════════════════════════════════════════════════

/// The authenticated identity making a navigation, characterized by its roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: UserId,
    #[serde(default)]
    pub roles: Vec<RoleName>,
}

impl Principal {
    pub fn new<I, R>(id: impl Into<UserId>, roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<RoleName>,
    {
        Self {
            id: id.into(),
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    pub fn has_role(&self, role: &RoleName) -> bool {
        self.roles.contains(role)
    }

    pub fn is_super_admin(&self) -> bool {
        self.has_role(&RoleName::SuperAdmin)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(&RoleName::Admin)
    }

    /// Highest elevated role held.
    pub fn elevation(&self) -> Elevation {
        if self.is_super_admin() {
            Elevation::SuperAdmin
        } else if self.is_admin() {
            Elevation::Admin
        } else {
            Elevation::None
        }
    }

    /// Role names as plain strings.
    pub fn role_names(&self) -> Vec<&str> {
        self.roles.iter().map(RoleName::as_str).collect()
    }

    /// Distinct role set.
    pub fn role_set(&self) -> HashSet<&RoleName> {
        self.roles.iter().collect()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_equals_reflexive_and_symmetric() {
        let a = Permission::new("user", "write");
        let b = Permission::new("user", "write");
        assert!(a.equals(&a));
        assert!(a.equals(&b) && b.equals(&a));
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn test_permission_case_sensitive() {
        let a = Permission::new("user", "write");
        let b = Permission::new("User", "write");
        assert!(!a.equals(&b));
        assert_ne!(a.key(), b.key());
    }

    #[test]
    fn test_permission_key_and_parse() {
        let perm = Permission::parse("user_mgmt:access").unwrap();
        assert_eq!(perm.target, "user_mgmt");
        assert_eq!(perm.action, "access");
        assert_eq!(perm.key(), "user_mgmt:access");

        assert!(Permission::parse("invalid").is_none());
        assert!(Permission::parse(":read").is_none());
        assert!(Permission::parse("user:").is_none());
    }

    #[test]
    fn test_permission_key_injective_with_colons() {
        let a = Permission::new("a:b", "c");
        let b = Permission::new("a", "b:c");
        assert_ne!(a.key(), b.key());
        assert_eq!(Permission::parse(&a.key()), Some(a.clone()));
        assert_eq!(Permission::parse(&b.key()), Some(b));

        let slashed = Permission::new("x\\:", "y");
        assert_eq!(Permission::parse(&slashed.key()), Some(slashed));
    }

    #[test]
    fn test_protected_delete() {
        assert!(Permission::new("user", "delete").is_protected_delete());
        assert!(Permission::new("role", "delete").is_protected_delete());
        assert!(Permission::new("permission", "delete").is_protected_delete());
        assert!(!Permission::new("report", "delete").is_protected_delete());
        assert!(!Permission::new("user", "write").is_protected_delete());
    }

    #[test]
    fn test_permission_with_meta_wire_formats() {
        let json = r#"[
            {"target": "user", "action": "read", "display_name": "View users"},
            {"resource": "role", "action": "write", "id": 5, "is_system": true},
            "dashboard:access"
        ]"#;
        let perms: Vec<PermissionWithMeta> = serde_json::from_str(json).unwrap();
        assert_eq!(perms[0].permission, Permission::new("user", "read"));
        assert_eq!(perms[0].label(), "View users");
        assert_eq!(perms[1].permission, Permission::new("role", "write"));
        assert_eq!(perms[1].id, Some(5));
        assert!(perms[1].is_system);
        assert_eq!(perms[2].permission, Permission::new("dashboard", "access"));
        assert_eq!(perms[2].label(), "dashboard:access");
    }

    #[test]
    fn test_permission_serializes_flat() {
        let meta = PermissionWithMeta::new(Permission::new("user", "read")).with_id(1);
        let value = serde_json::to_value(&meta).unwrap();
        assert_eq!(value["target"], "user");
        assert_eq!(value["action"], "read");
        assert_eq!(value["id"], 1);
    }

    #[test]
    fn test_role_name_parse() {
        assert_eq!(RoleName::parse("super_admin"), RoleName::SuperAdmin);
        assert_eq!(RoleName::parse("admin"), RoleName::Admin);
        assert_eq!(RoleName::parse("user"), RoleName::User);
        assert_eq!(
            RoleName::parse("editor"),
            RoleName::Custom("editor".to_string())
        );
        assert!(RoleName::Admin.is_system());
        assert!(!RoleName::parse("editor").is_system());
    }

    #[test]
    fn test_role_grant_revoke() {
        let mut role = Role::new("editor", "Editor", Vec::<Permission>::new());
        assert!(!role.has_permission(&Permission::new("report", "write")));

        assert!(role.grant(Permission::new("report", "write")));
        assert!(!role.grant(Permission::new("report", "write")));
        assert!(role.has_permission(&Permission::new("report", "write")));

        assert!(role.revoke(&Permission::new("report", "write")));
        assert!(!role.has_permission(&Permission::new("report", "write")));
    }

    #[test]
    fn test_system_role_not_deletable() {
        assert!(!Role::new("custom", "Custom", Vec::<Permission>::new()).system().is_deletable());
        // A reserved name is protected even if the flag was lost.
        assert!(!Role::new("admin", "Admin", Vec::<Permission>::new()).is_deletable());
        assert!(Role::new("editor", "Editor", Vec::<Permission>::new()).is_deletable());
    }

    #[test]
    fn test_principal_elevation() {
        assert_eq!(
            Principal::new("1", ["user", "super_admin"]).elevation(),
            Elevation::SuperAdmin
        );
        assert_eq!(Principal::new("2", ["admin"]).elevation(), Elevation::Admin);
        assert_eq!(Principal::new("3", ["editor"]).elevation(), Elevation::None);
    }
}
