//! CLI command implementations.

pub mod config;
pub mod secret;
pub mod serve;
pub mod status;
pub mod users;

use std::path::Path;

use anyhow::{Context, Result};
use tollgate_core::Config;

pub use config::run_config;
pub use secret::run_secret_generate;
pub use serve::run_serve;
pub use status::run_status;
pub use users::run_users;

/// Load configuration from `path`, or the default location, then apply
/// environment overrides.
///
/// # Errors
///
/// Returns error if the file cannot be read or the result fails validation.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => {
            Config::load(path).with_context(|| format!("Failed to load {}", path.display()))?
        }
        None => Config::load_default().context("Failed to load configuration")?,
    };

    let config = config.with_env_overrides();
    config
        .validate()
        .context("Invalid configuration after environment overrides")?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_config_from_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tollgate.json");
        std::fs::write(
            &path,
            r#"{
                // JSON5 comments are allowed
                server: { port: 9191 },
                resources: ["books"],
            }"#,
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.server.port, 9191);
        assert_eq!(config.resources, vec!["books"]);
    }

    #[test]
    fn test_load_config_missing_file() {
        let dir = tempdir().unwrap();
        let err = load_config(Some(&dir.path().join("absent.json"))).unwrap_err();
        assert!(err.to_string().contains("absent.json"));
    }

    #[test]
    fn test_load_config_rejects_invalid() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tollgate.json");
        std::fs::write(&path, r#"{ resources: ["Bad Name"] }"#).unwrap();

        assert!(load_config(Some(&path)).is_err());
    }
}
