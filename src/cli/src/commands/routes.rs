//! Route table inspection commands.

use anyhow::Result;
use clap::Subcommand;
use portcullis_core::routing::{RouteEntry, RouteTable};
use serde::Serialize;
use tabled::Tabled;

use crate::output::{self, OutputFormat};

#[derive(Subcommand)]
pub enum RouteCommands {
    /// List every entry in declaration order
    List,

    /// Show the navigation menu
    Nav,

    /// Resolve a path to its requirement
    Resolve {
        /// Path to resolve, e.g. /users/42/edit
        path: String,
    },
}

#[derive(Debug, Serialize, Tabled)]
struct RouteRow {
    #[tabled(rename = "Path")]
    path: String,
    #[tabled(rename = "Pattern")]
    pattern: String,
    #[tabled(rename = "Requires")]
    requires: String,
    #[tabled(rename = "Menu")]
    menu: String,
}

impl From<&RouteEntry> for RouteRow {
    fn from(entry: &RouteEntry) -> Self {
        Self {
            path: entry.path.clone(),
            pattern: if entry.is_dynamic() { "dynamic" } else { "exact" }.to_string(),
            requires: entry.requires.to_string(),
            menu: entry
                .nav
                .as_ref()
                .map(|n| format!("{} ({})", n.label, n.order))
                .unwrap_or_else(|| "-".to_string()),
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
struct NavRow {
    #[tabled(rename = "Order")]
    order: i32,
    #[tabled(rename = "Label")]
    label: String,
    #[tabled(rename = "Path")]
    path: String,
    #[tabled(rename = "Requires")]
    requires: String,
}

pub async fn execute(cmd: RouteCommands, table: &RouteTable, format: OutputFormat) -> Result<()> {
    match cmd {
        RouteCommands::List => match format {
            OutputFormat::Table => {
                let rows: Vec<RouteRow> = table.entries().iter().map(RouteRow::from).collect();
                output::print_list(&rows, format);
                output::print_detail("Login", table.login_path());
                output::print_detail("Landing", table.landing_path());
                output::print_detail("Forbidden", table.forbidden_path());
            }
            _ => output::print_item(table.entries(), format),
        },

        RouteCommands::Nav => {
            let items = table.navigation();
            match format {
                OutputFormat::Table => {
                    let rows: Vec<NavRow> = items
                        .into_iter()
                        .map(|item| NavRow {
                            order: item.order,
                            label: item.label,
                            path: item.path,
                            requires: item.requires.to_string(),
                        })
                        .collect();
                    output::print_list(&rows, format);
                }
                _ => output::print_item(&items, format),
            }
        }

        RouteCommands::Resolve { path } => {
            let class = table.classify(&path);
            let resolution = table.resolve(&path);
            match format {
                OutputFormat::Table => {
                    output::print_header("Resolution");
                    output::print_detail("Path", &resolution.path);
                    output::print_detail("Page", &format!("{:?}", class).to_lowercase());
                    output::print_detail("Match", resolution.kind.as_str());
                    output::print_detail("Pattern", resolution.pattern.as_deref().unwrap_or("-"));
                    output::print_detail("Requires", &resolution.requirement.to_string());
                }
                _ => output::print_item(&resolution, format),
            }
        }
    }

    Ok(())
}
