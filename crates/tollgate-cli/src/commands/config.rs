//! Config command - inspect, validate and initialise the configuration file.

use std::path::Path;

use anyhow::{Context, Result};
use tollgate_core::{Config, SigningSecret};

use crate::ui;

/// Config actions.
#[derive(Debug, Clone, Copy)]
pub enum ConfigAction {
    /// Print the effective configuration with the secret redacted.
    Show,
    /// Parse and validate the configuration file.
    Validate,
    /// Write a default configuration file.
    Init {
        /// Overwrite an existing file.
        force: bool,
    },
}

/// Run the config command.
///
/// # Errors
///
/// Returns error if the file cannot be read, written or validated.
pub fn run_config(path: Option<&Path>, action: ConfigAction) -> Result<()> {
    let path = path.map_or_else(Config::default_path, Path::to_path_buf);

    match action {
        ConfigAction::Show => show_config(&path),
        ConfigAction::Validate => validate_config(&path),
        ConfigAction::Init { force } => init_config(&path, force),
    }
}

fn show_config(path: &Path) -> Result<()> {
    let config = if path.exists() {
        super::load_config(Some(path))?
    } else {
        ui::warning(&format!(
            "Config file not found: {} (showing defaults)",
            path.display()
        ));
        Config::default().with_env_overrides()
    };

    println!("{}", serde_json::to_string_pretty(&redacted(&config)?)?);
    Ok(())
}

/// Render the config as JSON with the signing secret masked.
fn redacted(config: &Config) -> Result<serde_json::Value> {
    let mut value = serde_json::to_value(config)?;
    if let Some(secret) = value
        .pointer_mut("/auth/signingSecret")
        .filter(|secret| !secret.is_null())
    {
        *secret = serde_json::Value::String("[REDACTED]".to_string());
    }
    Ok(value)
}

fn validate_config(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("Config file not found: {}", path.display());
    }

    match Config::load(path) {
        Ok(config) => {
            ui::success(&format!("Configuration is valid: {}", path.display()));
            ui::kv("Port", &config.server.port.to_string());
            ui::kv("Resources", &config.resources.join(", "));
            if config.auth.signing_secret.is_none() {
                ui::warning("No signing secret set; an ephemeral one is used at startup");
            }
            Ok(())
        }
        Err(e) => {
            ui::error(&format!("Invalid configuration: {e}"));
            Err(e).with_context(|| format!("Failed to validate {}", path.display()))
        }
    }
}

fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "Config file already exists: {} (use --force to overwrite)",
            path.display()
        );
    }

    let mut config = Config::default();
    config.auth.signing_secret = Some(SigningSecret::generate_hex());
    config
        .save(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    ui::success(&format!("Wrote {}", path.display()));
    ui::info("A fresh signing secret was generated; keep this file private");
    Ok(())
}
