//! Configuration management commands.
//!
//! Stores CLI configuration in `<config dir>/bastion/config.toml`. Known keys
//! are `api-url` and `token`; other keys are stored as given.

use anyhow::{Context, Result};
use clap::Subcommand;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::output::{self, OutputFormat};

pub const API_URL_KEY: &str = "api-url";
pub const TOKEN_KEY: &str = "token";

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Set a configuration value
    Set {
        /// Configuration key (api-url, token)
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
    /// Copy for display, with the session token masked.
    fn redacted(&self) -> BTreeMap<String, String> {
        self.values
            .iter()
            .map(|(k, v)| {
                let shown = if k == TOKEN_KEY { mask(v) } else { v.clone() };
                (k.clone(), shown)
            })
            .collect()
    }
}

fn mask(token: &str) -> String {
    let visible: String = token.chars().take(4).collect();
    format!("{}…", visible)
}

/// Return the path to the configuration file.
fn config_path() -> Result<PathBuf> {
    let dir = dirs::config_dir().context("Could not determine config directory")?;
    Ok(dir.join("bastion").join("config.toml"))
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

fn load_config() -> Result<CliConfig> {
    load_from(&config_path()?)
}

fn load_value(key: &str) -> Option<String> {
    load_config().ok().and_then(|cfg| cfg.values.get(key).cloned())
}

/// Load the `api-url` value from the config file, if set.
pub fn load_api_url() -> Option<String> {
    load_value(API_URL_KEY)
}

/// Load the saved session token, if set.
pub fn load_token() -> Option<String> {
    load_value(TOKEN_KEY)
}

pub async fn execute(cmd: ConfigCommands, format: OutputFormat) -> Result<()> {
    let path = config_path()?;

    match cmd {
        ConfigCommands::Set { key, value } => {
            let mut cfg = load_from(&path)?;
            let shown = if key == TOKEN_KEY { mask(&value) } else { value.clone() };
            cfg.values.insert(key.clone(), value);
            save_to(&path, &cfg)?;

            match format {
                OutputFormat::Table => output::print_success(&format!("{} = {}", key, shown)),
                _ => output::print_item(&serde_json::json!({ "key": key, "value": shown }), format)?,
            }
        }

        ConfigCommands::Get { key } => {
            let cfg = load_from(&path)?;
            match cfg.redacted().get(&key) {
                Some(value) => match format {
                    OutputFormat::Table => println!("{}", value),
                    _ => output::print_item(&serde_json::json!({ "key": key, "value": value }), format)?,
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

            let values = cfg.redacted();
            match format {
                OutputFormat::Table => {
                    output::print_header("Configuration");
                    output::print_detail("file", &path.display().to_string());
                    for (k, v) in &values {
                        output::print_detail(k, v);
                    }
                }
                _ => output::print_item(&values, format)?,
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
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        assert!(load_from(&path).unwrap().values.is_empty());

        let mut cfg = CliConfig::default();
        cfg.values.insert(API_URL_KEY.into(), "http://bastion.local".into());
        cfg.values.insert(TOKEN_KEY.into(), "secret-token".into());
        save_to(&path, &cfg).unwrap();

        let loaded = load_from(&path).unwrap();
        assert_eq!(loaded.values.get(API_URL_KEY).map(String::as_str), Some("http://bastion.local"));
        assert_eq!(loaded.redacted().get(TOKEN_KEY).map(String::as_str), Some("secr…"));
    }
}
