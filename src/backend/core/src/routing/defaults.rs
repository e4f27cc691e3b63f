//! The built-in route table of the admin application.

use super::{NavMeta, RouteEntry};
use super::requirement::Requirement;

pub const LANDING_PATH: &str = "/dashboard";
pub const LOGIN_PATH: &str = "/login";
pub const FORBIDDEN_PATH: &str = "/403";

pub fn public_pages() -> Vec<String> {
    ["/", "/401", "/403", "/404", "/500"]
        .into_iter()
        .map(String::from)
        .collect()
}

pub fn guest_pages() -> Vec<String> {
    ["/login", "/register", "/reset-password", "/request-password-reset"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn entry(path: &str, requires: Requirement) -> RouteEntry {
    RouteEntry {
        path: path.to_string(),
        requires,
        nav: None,
    }
}

fn nav(path: &str, requires: Requirement, label: &str, order: i32) -> RouteEntry {
    RouteEntry {
        path: path.to_string(),
        requires,
        nav: Some(NavMeta {
            label: label.to_string(),
            order,
            visible: true,
            icon: None,
        }),
    }
}

/// Entries in declaration order.
pub fn entries() -> Vec<RouteEntry> {
    use Requirement::Authenticated;
    let one = Requirement::one;

    vec![
        // Pages open to any signed-in user
        nav("/dashboard", one("dashboard", "access"), "Dashboard", 0),
        entry("/profile", Authenticated),
        nav("/settings", Authenticated, "Settings", 90),
        nav("/charts", Authenticated, "Charts", 50),
        // User management
        nav("/users", one("user_mgmt", "access"), "Users", 10),
        entry("/users/create", one("user", "write")),
        entry("/users/[id]", one("user", "read")),
        entry("/users/[id]/edit", one("user", "write")),
        entry("/users/[id]/roles", one("user", "write")),
        // RBAC management
        entry("/rbac", one("role_mgmt", "access")),
        nav("/rbac/roles", one("role_mgmt", "access"), "Roles", 20),
        entry("/rbac/roles/create", one("role", "write")),
        entry("/rbac/roles/[id]", one("role", "read")),
        entry("/rbac/roles/[id]/edit", one("role", "write")),
        entry("/rbac/roles/[id]/permissions", one("role", "write")),
        nav("/rbac/permissions", one("perm_mgmt", "access"), "Permissions", 30),
        entry("/rbac/permissions/[id]", one("permission", "read")),
    ]
}
