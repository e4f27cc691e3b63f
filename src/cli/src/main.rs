//! Portcullis CLI - inspect route tables, permissions and navigation
//! decisions against a running backend.

mod commands;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use portcullis_core::client::BackendClient;
use portcullis_core::config::Config;
use portcullis_core::guard::RouteGuard;
use portcullis_core::routing::{RouteTable, RouteTableConfig};
use portcullis_core::telemetry::{init_telemetry, LogFormat, LoggingConfig};
use std::path::PathBuf;
use std::sync::Arc;

use commands::{account, check, config, routes};
use output::OutputFormat;

/// Portcullis - role-based route authorization
#[derive(Parser)]
#[command(
    name = "portcullis",
    author = "Aezi <aezi.zhu@icloud.com>",
    version = "0.1.0",
    about = "Portcullis - role-based route authorization",
    long_about = "Inspect route tables, effective permissions and navigation decisions.",
    propagate_version = true
)]
pub struct Cli {
    /// Output format
    #[arg(short, long, global = true, default_value = "table")]
    output: OutputFormat,

    /// Backend API URL
    #[arg(long, global = true, env = "PORTCULLIS_API_URL")]
    api_url: Option<String>,

    /// Bearer token for the backend
    #[arg(long, global = true, env = "PORTCULLIS_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Route table file (TOML) replacing the built-in table
    #[arg(long, global = true)]
    routes: Option<PathBuf>,

    /// Log guard and client activity to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decide navigations to one or more paths
    Check(check::CheckArgs),

    /// Route table inspection
    #[command(subcommand)]
    Routes(routes::RouteCommands),

    /// Show the signed-in user
    Whoami,

    /// List the signed-in user's effective permissions
    Permissions,

    /// List roles and their permission counts
    Roles,

    /// Configuration management
    #[command(subcommand)]
    Config(config::ConfigCommands),
}

/// Settings given on the command line.
struct Overrides {
    api_url: Option<String>,
    token: Option<String>,
    routes: Option<PathBuf>,
}

/// Effective settings: flags, then the CLI config file, then `PORTCULLIS__*`.
struct Settings {
    config: Config,
    routes_file: Option<PathBuf>,
}

impl Settings {
    fn resolve(overrides: Overrides) -> Result<Self> {
        let stored = config::load();
        let mut config = Config::load().context("Invalid PORTCULLIS__* environment")?;

        if let Some(url) = overrides.api_url.or_else(|| stored.get("api-url").map(String::from)) {
            config.backend.base_url = url;
        }
        if let Some(token) = overrides.token.or_else(|| stored.get("token").map(String::from)) {
            config.backend.token = Some(token);
        }
        let routes_file = overrides
            .routes
            .or_else(|| stored.get("routes").map(PathBuf::from));

        Ok(Self { config, routes_file })
    }

    fn client(&self) -> Result<BackendClient> {
        Ok(BackendClient::from_config(&self.config.backend)?)
    }

    fn route_table(&self) -> Result<RouteTable> {
        let routes = match &self.routes_file {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                RouteTableConfig::from_toml(&raw)
                    .with_context(|| format!("Invalid route table {}", path.display()))?
            }
            None => self.config.routes.clone(),
        };
        Ok(RouteTable::from_config(&routes)?)
    }

    fn guard(&self) -> Result<RouteGuard> {
        Ok(RouteGuard::new(Arc::new(self.route_table()?))
            .with_resolve_timeout(self.config.session.resolve_timeout)
            .with_expiry_skew(self.config.session.expiry_skew_secs))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    if cli.verbose {
        let logging = LoggingConfig {
            level: "debug".to_string(),
            format: LogFormat::Compact,
            ..Default::default()
        };
        init_telemetry(&logging, "cli")?;
    }

    let format = cli.output;
    let overrides = Overrides {
        api_url: cli.api_url,
        token: cli.token,
        routes: cli.routes,
    };
    let result = run(cli.command, overrides, format).await;

    if let Err(e) = result {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}

async fn run(command: Commands, overrides: Overrides, format: OutputFormat) -> Result<()> {
    let settings = match command {
        Commands::Config(cmd) => return config::execute(cmd, format).await,
        _ => Settings::resolve(overrides)?,
    };

    match command {
        Commands::Check(args) => {
            let client = settings.client()?;
            let guard = settings.guard()?;
            let bootstrap = settings.config.bootstrap();
            check::execute(args, &client, &guard, &bootstrap, format).await
        }
        Commands::Routes(cmd) => routes::execute(cmd, &settings.route_table()?, format).await,
        Commands::Whoami => account::whoami(&settings.client()?, format).await,
        Commands::Permissions => account::permissions(&settings.client()?, format).await,
        Commands::Roles => account::roles(&settings.client()?, format).await,
        Commands::Config(_) => Ok(()),
    }
}
