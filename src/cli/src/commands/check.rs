//! Navigation check command.
//!
//! Bootstraps a session for the configured token exactly as the guard layer
//! does, then runs each path through the route guard.

use anyhow::Result;
use clap::Args;
use portcullis_core::client::BackendClient;
use portcullis_core::guard::{BackendSessions, GuardDecision, RouteGuard, SessionFactory};
use portcullis_core::session::{BootstrapOutcome, SessionBootstrap};
use serde::Serialize;
use tabled::Tabled;

use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct CheckArgs {
    /// Paths to check, e.g. /users/42/edit
    #[arg(required = true)]
    paths: Vec<String>,
}

#[derive(Debug, Serialize, Tabled)]
struct DecisionRow {
    #[tabled(rename = "Path")]
    path: String,
    #[tabled(rename = "Match")]
    kind: String,
    #[tabled(rename = "Verdict")]
    verdict: String,
    #[tabled(rename = "Location")]
    location: String,
    #[tabled(rename = "Reason")]
    reason: String,
}

impl From<&GuardDecision> for DecisionRow {
    fn from(decision: &GuardDecision) -> Self {
        Self {
            path: decision.path.clone(),
            kind: decision.kind.map_or("-", |k| k.as_str()).to_string(),
            verdict: if decision.is_allowed() { "allow" } else { "redirect" }.to_string(),
            location: decision.location().unwrap_or("-").to_string(),
            reason: decision.reason().map_or("-", |r| r.as_str()).to_string(),
        }
    }
}

pub async fn execute(
    args: CheckArgs,
    client: &BackendClient,
    guard: &RouteGuard,
    bootstrap: &SessionBootstrap,
    format: OutputFormat,
) -> Result<()> {
    let sessions = BackendSessions::new(client.clone());
    let ctx = sessions.create(client.token().map(String::from));
    let outcome = bootstrap.run(&ctx).await;

    if format == OutputFormat::Table {
        print_outcome(&outcome);
    }

    let mut decisions = Vec::with_capacity(args.paths.len());
    for path in &args.paths {
        decisions.push(guard.navigate(path, &ctx).await);
    }

    match (format, decisions.as_slice()) {
        (_, [single]) => output::print_decision(single, format),
        (OutputFormat::Table, _) => {
            let rows: Vec<DecisionRow> = decisions.iter().map(DecisionRow::from).collect();
            output::print_list(&rows, format);
        }
        _ => output::print_item(&decisions, format),
    }

    Ok(())
}

fn print_outcome(outcome: &BootstrapOutcome) {
    match outcome {
        BootstrapOutcome::Authenticated {
            principal,
            permissions,
        } => {
            output::print_header("Session");
            output::print_detail("User", principal.id.as_str());
            output::print_detail("Roles", &principal.role_names().join(", "));
            output::print_detail("Permissions", &permissions.len().to_string());
        }
        BootstrapOutcome::Unauthenticated { failure, .. } => match failure {
            Some(error) => output::print_info(&format!("Not signed in: {}", error)),
            None => output::print_info("Not signed in: no token configured"),
        },
    }
}
