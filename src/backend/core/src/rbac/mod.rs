//! Role-based access control.
//!
//! This module provides:
//! - **Models**: Permission, Role, RoleName, Principal
//! - **Evaluator**: Answers whether a principal holds a permission, with the
//!   elevated-role shortcuts and fail-closed cache lookup
//! - **System Roles**: super_admin, admin and user with their seeded permissions
//! - **Directory**: The role → permission map and union aggregation over roles
//! - **Capabilities**: Delete/edit protection for system roles and permissions
//!
//! # Usage
//!
//! ```rust,ignore
//! use portcullis_core::rbac::{Permission, PermissionEvaluator, Principal};
//!
//! let principal = Principal::new("42", ["admin"]);
//! let evaluator = PermissionEvaluator::new(&principal, &cache);
//!
//! // Admins pass everything except core deletes.
//! assert!(evaluator.has_permission(&Permission::new("report", "delete")));
//! assert!(!evaluator.has_permission(&Permission::new("user", "delete")));
//! ```

pub mod capabilities;
pub mod directory;
pub mod evaluator;
pub mod models;
pub mod roles;

pub use capabilities::{Capabilities, PermissionKind};
pub use directory::{DirectorySource, RoleDirectory};
pub use evaluator::{
    has_all_permissions, has_any_permission, has_permission, Grant, PermissionEvaluator,
    PolicyDecision,
};
pub use models::{
    Elevation, Permission, PermissionWithMeta, Principal, Role, RoleName, UserId,
};
pub use roles::SystemRole;
