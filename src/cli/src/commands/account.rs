//! Commands for the signed-in account: profile, effective permissions and
//! the role catalogue.

use anyhow::{Context, Result};
use portcullis_core::client::BackendClient;
use portcullis_core::rbac::capabilities::is_system_permission;
use portcullis_core::rbac::{PermissionKind, PermissionWithMeta, Role};
use serde::Serialize;
use tabled::Tabled;

use crate::output::{self, OutputFormat};

#[derive(Debug, Serialize, Tabled)]
struct PermissionRow {
    #[tabled(rename = "Permission")]
    key: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Kind")]
    kind: &'static str,
    #[tabled(rename = "System")]
    system: String,
}

impl From<&PermissionWithMeta> for PermissionRow {
    fn from(p: &PermissionWithMeta) -> Self {
        Self {
            key: p.permission.key(),
            name: p.label(),
            kind: PermissionKind::of(&p.permission).as_str(),
            system: output::flag(is_system_permission(p)),
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
struct RoleRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Display Name")]
    display_name: String,
    #[tabled(rename = "System")]
    system: String,
    #[tabled(rename = "Permissions")]
    permissions: usize,
}

impl From<&Role> for RoleRow {
    fn from(role: &Role) -> Self {
        Self {
            name: role.name.clone(),
            display_name: role.display_name.clone(),
            system: output::flag(!role.is_deletable()),
            permissions: role.permissions.len(),
        }
    }
}

fn require_token(client: &BackendClient) -> Result<()> {
    client
        .token()
        .map(|_| ())
        .context("No token configured; pass --token or run `portcullis config set token <TOKEN>`")
}

pub async fn whoami(client: &BackendClient, format: OutputFormat) -> Result<()> {
    require_token(client)?;
    let profile = client.current_user().await?;

    match format {
        OutputFormat::Table => {
            output::print_header("Current User");
            output::print_detail("ID", profile.id.as_str());
            output::print_detail("Username", &profile.username);
            output::print_detail("Email", profile.email.as_deref().unwrap_or("-"));
            output::print_detail("Roles", &profile.principal().role_names().join(", "));
            if let Some(created) = &profile.created_at {
                output::print_detail("Created", created);
            }
        }
        _ => output::print_item(&profile, format),
    }
    Ok(())
}

pub async fn permissions(client: &BackendClient, format: OutputFormat) -> Result<()> {
    require_token(client)?;
    let mut permissions = client.my_permissions().await?;
    permissions.sort_by_key(|p| p.permission.key());

    match format {
        OutputFormat::Table => {
            let rows: Vec<PermissionRow> = permissions.iter().map(PermissionRow::from).collect();
            output::print_list(&rows, format);
        }
        _ => output::print_item(&permissions, format),
    }
    Ok(())
}

pub async fn roles(client: &BackendClient, format: OutputFormat) -> Result<()> {
    require_token(client)?;
    let roles = client.list_roles().await?;

    match format {
        OutputFormat::Table => {
            let rows: Vec<RoleRow> = roles.iter().map(RoleRow::from).collect();
            output::print_list(&rows, format);
        }
        _ => output::print_item(&roles, format),
    }
    Ok(())
}
