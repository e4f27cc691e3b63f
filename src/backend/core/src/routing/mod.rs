//! Route authorization table.
//!
//! Maps a navigation path to the permission requirement guarding it.
//! Resolution runs in a fixed order:
//!
//! 1. **Exact** match on the literal path
//! 2. **Dynamic** patterns, where each `[param]` matches one non-slash
//!    segment; first declared pattern wins
//! 3. **Prefix** fallback on the first path segment (`/users/42/x` → `/users`)
//! 4. **Default**: authentication required, no extra permission
//!
//! Public pages and guest-only pages are classified separately and checked
//! before the table.
//!
//! # Usage
//!
//! ```rust,ignore
//! use portcullis_core::routing::{MatchKind, RouteTable};
//!
//! let table = RouteTable::builtin();
//! let resolved = table.resolve("/users/42?tab=roles");
//! assert_eq!(resolved.kind, MatchKind::Dynamic);
//! ```

pub mod defaults;
pub mod requirement;

pub use requirement::Requirement;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::cache::PermissionCache;
use crate::error::{ErrorCode, PortcullisError, Result};
use crate::rbac::evaluator::PermissionEvaluator;
use crate::rbac::models::Principal;

// ═══════════════════════════════════════════════════════════════════════════════
// Configuration Types
// ═══════════════════════════════════════════════════════════════════════════════

/// Menu metadata for a route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavMeta {
    pub label: String,
    #[serde(default)]
    pub order: i32,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

fn default_true() -> bool {
    true
}

/// One row of the route table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteEntry {
    /// Literal path or pattern with `[param]` placeholders.
    pub path: String,
    #[serde(default)]
    pub requires: Requirement,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nav: Option<NavMeta>,
}

impl RouteEntry {
    pub fn is_dynamic(&self) -> bool {
        self.path.contains('[')
    }
}

/// Declarative route table definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteTableConfig {
    /// Where authenticated users visiting a guest-only page are sent.
    #[serde(default = "default_landing_path")]
    pub landing_path: String,

    #[serde(default = "default_login_path")]
    pub login_path: String,

    #[serde(default = "default_forbidden_path")]
    pub forbidden_path: String,

    #[serde(default = "defaults::public_pages")]
    pub public_pages: Vec<String>,

    /// Matched by segment prefix.
    #[serde(default = "defaults::guest_pages")]
    pub guest_pages: Vec<String>,

    #[serde(default = "defaults::entries")]
    pub entries: Vec<RouteEntry>,
}

fn default_landing_path() -> String {
    defaults::LANDING_PATH.to_string()
}

fn default_login_path() -> String {
    defaults::LOGIN_PATH.to_string()
}

fn default_forbidden_path() -> String {
    defaults::FORBIDDEN_PATH.to_string()
}

impl Default for RouteTableConfig {
    fn default() -> Self {
        Self {
            landing_path: default_landing_path(),
            login_path: default_login_path(),
            forbidden_path: default_forbidden_path(),
            public_pages: defaults::public_pages(),
            guest_pages: defaults::guest_pages(),
            entries: defaults::entries(),
        }
    }
}

impl RouteTableConfig {
    /// Parse a standalone route table file.
    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| {
            PortcullisError::with_internal(
                ErrorCode::ConfigurationError,
                "Route table file is invalid",
                e.to_string(),
            )
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Resolution Types
// ═══════════════════════════════════════════════════════════════════════════════

/// Which resolution step produced a requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Public,
    GuestOnly,
    Exact,
    Dynamic,
    Prefix,
    Default,
}

impl MatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::GuestOnly => "guest_only",
            Self::Exact => "exact",
            Self::Dynamic => "dynamic",
            Self::Prefix => "prefix",
            Self::Default => "default",
        }
    }
}

/// Classification of a path before table lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageClass {
    Public,
    GuestOnly,
    Protected,
}

/// Result of resolving a path against the table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    /// Normalized path that was resolved.
    pub path: String,
    pub requirement: Requirement,
    pub kind: MatchKind,
    /// Table pattern that matched, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

/// A menu entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavItem {
    pub path: String,
    pub label: String,
    pub order: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    pub requires: Requirement,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Route Table
// ═══════════════════════════════════════════════════════════════════════════════

/// Compiled, immutable route table.
#[derive(Debug, Clone)]
pub struct RouteTable {
    entries: Vec<RouteEntry>,
    exact: HashMap<String, usize>,
    dynamic: Vec<(Regex, usize)>,
    public_pages: Vec<String>,
    guest_pages: Vec<String>,
    landing_path: String,
    login_path: String,
    forbidden_path: String,
}

impl RouteTable {
    /// Compile a table, validating every pattern.
    pub fn from_config(config: &RouteTableConfig) -> Result<Self> {
        let mut exact = HashMap::new();
        let mut dynamic = Vec::new();

        for (idx, entry) in config.entries.iter().enumerate() {
            if !entry.path.starts_with('/') {
                return Err(invalid_pattern(&entry.path, "must start with '/'"));
            }
            if entry.is_dynamic() || entry.path.contains(']') {
                dynamic.push((compile_pattern(&entry.path)?, idx));
            } else {
                // First declaration wins.
                exact.entry(normalize(&entry.path)).or_insert(idx);
            }
        }

        debug!(
            exact = exact.len(),
            dynamic = dynamic.len(),
            "Route table compiled"
        );

        Ok(Self {
            entries: config.entries.clone(),
            exact,
            dynamic,
            public_pages: config.public_pages.iter().map(|p| normalize(p)).collect(),
            guest_pages: config.guest_pages.iter().map(|p| normalize(p)).collect(),
            landing_path: config.landing_path.clone(),
            login_path: config.login_path.clone(),
            forbidden_path: config.forbidden_path.clone(),
        })
    }

    /// The application's default table.
    pub fn builtin() -> Self {
        Self::from_config(&RouteTableConfig::default())
            .expect("Invalid built-in route table")
    }

    pub fn landing_path(&self) -> &str {
        &self.landing_path
    }

    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    pub fn forbidden_path(&self) -> &str {
        &self.forbidden_path
    }

    pub fn entries(&self) -> &[RouteEntry] {
        &self.entries
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Classification
    // ─────────────────────────────────────────────────────────────────────────

    pub fn is_public(&self, path: &str) -> bool {
        let path = normalize(path);
        self.public_pages.iter().any(|p| *p == path)
    }

    /// Guest-only pages match on whole leading segments, so `/login/sso`
    /// is guest-only but `/loginx` is not.
    pub fn is_guest_only(&self, path: &str) -> bool {
        let path = normalize(path);
        self.guest_pages.iter().any(|page| {
            path == *page
                || path
                    .strip_prefix(page.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }

    pub fn classify(&self, path: &str) -> PageClass {
        if self.is_public(path) {
            PageClass::Public
        } else if self.is_guest_only(path) {
            PageClass::GuestOnly
        } else {
            PageClass::Protected
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Resolution
    // ─────────────────────────────────────────────────────────────────────────

    /// Resolve the requirement for `path`.
    pub fn resolve(&self, path: &str) -> Resolution {
        let path = normalize(path);

        let hit = |idx: usize, kind: MatchKind, path: String| {
            let entry = &self.entries[idx];
            Resolution {
                path,
                requirement: entry.requires.clone(),
                kind,
                pattern: Some(entry.path.clone()),
            }
        };

        if let Some(&idx) = self.exact.get(&path) {
            return hit(idx, MatchKind::Exact, path);
        }

        if let Some(&(_, idx)) = self.dynamic.iter().find(|(re, _)| re.is_match(&path)) {
            return hit(idx, MatchKind::Dynamic, path);
        }

        if let Some(prefix) = first_segment(&path) {
            if prefix != path {
                if let Some(&idx) = self.exact.get(prefix) {
                    return hit(idx, MatchKind::Prefix, path);
                }
            }
        }

        Resolution {
            path,
            requirement: Requirement::Authenticated,
            kind: MatchKind::Default,
            pattern: None,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Navigation
    // ─────────────────────────────────────────────────────────────────────────

    /// Visible menu entries, by `order` then declaration.
    pub fn navigation(&self) -> Vec<NavItem> {
        let mut items: Vec<(usize, NavItem)> = self
            .entries
            .iter()
            .enumerate()
            .filter_map(|(idx, entry)| {
                let nav = entry.nav.as_ref().filter(|n| n.visible)?;
                Some((
                    idx,
                    NavItem {
                        path: entry.path.clone(),
                        label: nav.label.clone(),
                        order: nav.order,
                        icon: nav.icon.clone(),
                        requires: entry.requires.clone(),
                    },
                ))
            })
            .collect();
        items.sort_by_key(|(idx, item)| (item.order, *idx));
        items.into_iter().map(|(_, item)| item).collect()
    }

    /// Menu entries `principal` can open given the current cache state.
    pub fn navigation_for(&self, principal: &Principal, cache: &PermissionCache) -> Vec<NavItem> {
        let evaluator = PermissionEvaluator::new(principal, cache);
        self.navigation()
            .into_iter()
            .filter(|item| evaluator.satisfies(&item.requires))
            .collect()
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::builtin()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Helpers
// ═══════════════════════════════════════════════════════════════════════════════

/// Strip query and fragment, and a trailing slash except on `/`.
pub fn normalize(path: &str) -> String {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    let path = &path[..end];
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

fn first_segment(path: &str) -> Option<&str> {
    let rest = path.strip_prefix('/')?;
    let end = rest.find('/').map_or(path.len(), |i| i + 1);
    if end <= 1 {
        None
    } else {
        Some(&path[..end])
    }
}

fn invalid_pattern(pattern: &str, reason: &str) -> PortcullisError {
    PortcullisError::with_internal(
        ErrorCode::InvalidRoutePattern,
        "Invalid route pattern",
        format!("{}: {}", pattern, reason),
    )
    .with_context("pattern", pattern)
}

/// Compile `/users/[id]/edit` to `^/users/[^/]+/edit$`.
fn compile_pattern(pattern: &str) -> Result<Regex> {
    let mut regex = String::from("^");
    let mut literal = String::new();
    let mut chars = pattern.chars();

    while let Some(c) = chars.next() {
        match c {
            '[' => {
                regex.push_str(&regex::escape(&literal));
                literal.clear();
                let mut name = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    match c {
                        ']' => {
                            closed = true;
                            break;
                        }
                        '/' | '[' => {
                            return Err(invalid_pattern(pattern, "placeholder spans a segment"))
                        }
                        c => name.push(c),
                    }
                }
                if !closed {
                    return Err(invalid_pattern(pattern, "unterminated '['"));
                }
                if name.is_empty() {
                    return Err(invalid_pattern(pattern, "empty placeholder"));
                }
                regex.push_str("[^/]+");
            }
            ']' => return Err(invalid_pattern(pattern, "unmatched ']'")),
            c => literal.push(c),
        }
    }
    regex.push_str(&regex::escape(literal.trim_end_matches('/')));
    regex.push('$');

    Ok(Regex::new(&regex)?)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbac::models::Permission;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("/users/"), "/users");
        assert_eq!(normalize("/users?page=2#top"), "/users");
        assert_eq!(normalize("/"), "/");
        assert_eq!(normalize("/?x=1"), "/");
        assert_eq!(normalize(""), "/");
    }

    #[test]
    fn test_first_segment() {
        assert_eq!(first_segment("/users/42/edit"), Some("/users"));
        assert_eq!(first_segment("/users"), Some("/users"));
        assert_eq!(first_segment("/"), None);
    }

    #[test]
    fn test_exact_match() {
        let table = RouteTable::builtin();
        let r = table.resolve("/users/create");
        assert_eq!(r.kind, MatchKind::Exact);
        assert_eq!(r.requirement, Requirement::one("user", "write"));
    }

    #[test]
    fn test_dynamic_beats_prefix() {
        let table = RouteTable::builtin();
        let r = table.resolve("/users/42");
        assert_eq!(r.kind, MatchKind::Dynamic);
        assert_eq!(r.requirement, Requirement::one("user", "read"));
        assert_eq!(r.pattern.as_deref(), Some("/users/[id]"));

        let r = table.resolve("/rbac/roles/7/permissions/");
        assert_eq!(r.kind, MatchKind::Dynamic);
        assert_eq!(r.requirement, Requirement::one("role", "write"));
    }

    #[test]
    fn test_prefix_fallback() {
        let table = RouteTable::builtin();
        let r = table.resolve("/users/42/audit/log");
        assert_eq!(r.kind, MatchKind::Prefix);
        assert_eq!(r.requirement, Requirement::one("user_mgmt", "access"));
    }

    #[test]
    fn test_unmatched_requires_authentication() {
        let table = RouteTable::builtin();
        let r = table.resolve("/reports/2024");
        assert_eq!(r.kind, MatchKind::Default);
        assert_eq!(r.requirement, Requirement::Authenticated);
        assert!(r.pattern.is_none());
    }

    #[test]
    fn test_dynamic_declaration_order_wins() {
        let config = RouteTableConfig {
            entries: vec![
                RouteEntry {
                    path: "/docs/[slug]".into(),
                    requires: Requirement::one("docs", "read"),
                    nav: None,
                },
                RouteEntry {
                    path: "/docs/[id]".into(),
                    requires: Requirement::one("docs", "write"),
                    nav: None,
                },
            ],
            ..RouteTableConfig::default()
        };
        let table = RouteTable::from_config(&config).unwrap();
        assert_eq!(
            table.resolve("/docs/readme").requirement,
            Requirement::one("docs", "read")
        );
    }

    #[test]
    fn test_placeholder_matches_one_segment() {
        let table = RouteTable::builtin();
        assert_ne!(table.resolve("/users/1/2").kind, MatchKind::Dynamic);
        assert_ne!(table.resolve("/users//edit").pattern.as_deref(), Some("/users/[id]/edit"));
    }

    #[test]
    fn test_literal_regex_characters_are_escaped() {
        let config = RouteTableConfig {
            entries: vec![RouteEntry {
                path: "/files/[name].json".into(),
                requires: Requirement::one("file", "read"),
                nav: None,
            }],
            ..RouteTableConfig::default()
        };
        let table = RouteTable::from_config(&config).unwrap();
        assert_eq!(table.resolve("/files/a.json").kind, MatchKind::Dynamic);
        assert_eq!(table.resolve("/files/axjson").kind, MatchKind::Default);
    }

    #[test]
    fn test_invalid_patterns_rejected() {
        for bad in ["/users/[id", "/users/id]", "/users/[]", "users", "/a/[b/c]"] {
            let config = RouteTableConfig {
                entries: vec![RouteEntry {
                    path: bad.into(),
                    requires: Requirement::Authenticated,
                    nav: None,
                }],
                ..RouteTableConfig::default()
            };
            let err = RouteTable::from_config(&config).unwrap_err();
            assert_eq!(err.code(), ErrorCode::InvalidRoutePattern, "pattern {bad}");
        }
    }

    #[test]
    fn test_public_and_guest_classification() {
        let table = RouteTable::builtin();
        assert_eq!(table.classify("/"), PageClass::Public);
        assert_eq!(table.classify("/404"), PageClass::Public);
        assert_eq!(table.classify("/login?redirect=%2Fusers"), PageClass::GuestOnly);
        assert_eq!(table.classify("/reset-password/abc123"), PageClass::GuestOnly);
        assert_eq!(table.classify("/loginx"), PageClass::Protected);
        assert_eq!(table.classify("/dashboard"), PageClass::Protected);
    }

    #[test]
    fn test_navigation_order() {
        let table = RouteTable::builtin();
        let labels: Vec<String> = table.navigation().into_iter().map(|n| n.label).collect();
        assert_eq!(
            labels,
            vec!["Dashboard", "Users", "Roles", "Permissions", "Charts", "Settings"]
        );
    }

    #[test]
    fn test_config_from_toml() {
        let raw = r#"
            landing_path = "/home"

            [[entries]]
            path = "/reports"
            requires = "reports:access"
            nav = { label = "Reports", order = 5 }

            [[entries]]
            path = "/system/advanced"
            requires = ["user:write", "role:write"]

            [[entries]]
            path = "/audit"
            requires = { any = ["audit:read", "user:read"] }

            [[entries]]
            path = "/help"
        "#;
        let config = RouteTableConfig::from_toml(raw).unwrap();
        assert_eq!(config.landing_path, "/home");
        assert_eq!(config.login_path, "/login");

        let table = RouteTable::from_config(&config).unwrap();
        assert_eq!(table.resolve("/reports").requirement, Requirement::one("reports", "access"));
        assert_eq!(
            table.resolve("/system/advanced").requirement,
            Requirement::All(vec![Permission::new("user", "write"), Permission::new("role", "write")])
        );
        assert!(matches!(table.resolve("/audit").requirement, Requirement::Any(_)));
        assert_eq!(table.resolve("/help").requirement, Requirement::Authenticated);
        assert_eq!(table.resolve("/reports/q3").kind, MatchKind::Prefix);
        assert_eq!(table.navigation().len(), 1);
    }
}
