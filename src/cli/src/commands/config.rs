//! Configuration management commands.
//!
//! Stores CLI configuration in `~/.portcullis/config.toml`. Recognized keys
//! are `api-url`, `token` and `routes` (path to a route table file).

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::output::{self, OutputFormat};

const KNOWN_KEYS: [&str; 3] = ["api-url", "token", "routes"];

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Set a configuration value
    Set {
        /// Configuration key (api-url, token, routes)
        key: String,
        /// Value to set
        value: String,
    },

    /// Get a configuration value
    Get {
        /// Configuration key
        key: String,
    },

    /// Show all configuration
    Show,

    /// Reset configuration to defaults
    Reset {
        /// Skip confirmation
        #[arg(short, long)]
        force: bool,
    },
}

/// Persistent CLI configuration stored on disk.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CliConfig {
    #[serde(default)]
    pub values: BTreeMap<String, String>,
}

impl CliConfig {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

/// Return the path to the configuration file (`~/.portcullis/config.toml`).
fn config_path() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".portcullis").join("config.toml"))
}

/// Load the CLI configuration, returning defaults if the file does not exist.
fn load_from(path: &Path) -> Result<CliConfig> {
    if !path.exists() {
        return Ok(CliConfig::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let cfg: CliConfig = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    Ok(cfg)
}

/// Save the CLI configuration, creating the directory if needed.
fn save_to(path: &Path, cfg: &CliConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let content = toml::to_string_pretty(cfg).context("Failed to serialize config")?;
    std::fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// The stored configuration; unreadable files count as empty.
pub fn load() -> CliConfig {
    config_path()
        .and_then(|path| load_from(&path))
        .unwrap_or_default()
}

/// Hide all but the last four characters of a token.
fn mask(key: &str, value: &str) -> String {
    if key != "token" {
        return value.to_string();
    }
    let tail: String = value.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
    format!("****{}", tail)
}

pub async fn execute(cmd: ConfigCommands, format: OutputFormat) -> Result<()> {
    let path = config_path()?;

    match cmd {
        ConfigCommands::Set { key, value } => {
            if !KNOWN_KEYS.contains(&key.as_str()) {
                bail!("Unknown key '{}' (expected one of: {})", key, KNOWN_KEYS.join(", "));
            }
            let mut cfg = load_from(&path)?;
            let shown = mask(&key, &value);
            cfg.values.insert(key.clone(), value);
            save_to(&path, &cfg)?;

            match format {
                OutputFormat::Table => output::print_success(&format!("{} = {}", key, shown)),
                _ => output::print_item(&serde_json::json!({ "key": key, "value": shown }), format),
            }
        }

        ConfigCommands::Get { key } => {
            let cfg = load_from(&path)?;
            match cfg.get(&key) {
                Some(value) => match format {
                    OutputFormat::Table => println!("{}", mask(&key, value)),
                    _ => output::print_item(
                        &serde_json::json!({ "key": key, "value": mask(&key, value) }),
                        format,
                    ),
                },
                None => output::print_error(&format!("Key '{}' not found", key)),
            }
        }

        ConfigCommands::Show => {
            let cfg = load_from(&path)?;
            if cfg.values.is_empty() {
                output::print_info("No configuration values set.");
                return Ok(());
            }

            let shown: BTreeMap<&str, String> = cfg
                .values
                .iter()
                .map(|(k, v)| (k.as_str(), mask(k, v)))
                .collect();
            match format {
                OutputFormat::Table => {
                    output::print_header("Configuration");
                    for (k, v) in &shown {
                        output::print_detail(k, v);
                    }
                }
                _ => output::print_item(&shown, format),
            }
        }

        ConfigCommands::Reset { force } => {
            if !force {
                output::print_info("This will reset all CLI configuration. Use --force to confirm.");
                return Ok(());
            }
            if path.exists() {
                std::fs::remove_file(&path)
                    .with_context(|| format!("Failed to remove {}", path.display()))?;
            }
            output::print_success("Configuration reset to defaults");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        assert!(load_from(&path).unwrap().values.is_empty());

        let mut cfg = CliConfig::default();
        cfg.values.insert("api-url".into(), "http://backend:8000/api/v1".into());
        save_to(&path, &cfg).unwrap();

        let loaded = load_from(&path).unwrap();
        assert_eq!(loaded.get("api-url"), Some("http://backend:8000/api/v1"));
    }

    #[test]
    fn test_token_is_masked() {
        assert_eq!(mask("token", "eyJhbGciOi.abcd"), "****abcd");
        assert_eq!(mask("api-url", "http://x"), "http://x");
    }
}
