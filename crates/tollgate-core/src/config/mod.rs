//! Configuration loading and validation.
//!
//! Config is JSON5. Location: `$TOLLGATE_STATE_DIR/tollgate.json`, falling back
//! to `~/.tollgate/tollgate.json`. A missing file means defaults.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::access::Role;
use crate::secrets::{SecretError, SigningSecret};
use crate::validation::{ValidationError, validate_collection_name};

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON5 parsing error.
    #[error("Parse error: {0}")]
    Parse(#[from] json5::Error),

    /// Config validation error.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Signing secret could not be decoded.
    #[error("Signing secret error: {0}")]
    Secret(#[from] SecretError),
}

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Authentication configuration.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Resource collections exposed under `/api/v1` and `/api/v2`.
    #[serde(default = "default_resources")]
    pub resources: Vec<String>,

    /// Global settings.
    #[serde(default)]
    pub settings: GlobalSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            storage: StorageConfig::default(),
            resources: default_resources(),
            settings: GlobalSettings::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// # Errors
    ///
    /// Returns error if config cannot be loaded or parsed.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path.
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read, parsed or validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = json5::from_str(&content)?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Save configuration to a path.
    ///
    /// # Errors
    ///
    /// Returns error if serialization or file write fails.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Validation(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config file path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        Self::state_dir().join("tollgate.json")
    }

    /// Get the Tollgate state directory.
    ///
    /// Uses `TOLLGATE_STATE_DIR` env var if set, otherwise `~/.tollgate`.
    #[must_use]
    pub fn state_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("TOLLGATE_STATE_DIR") {
            PathBuf::from(dir)
        } else if let Some(home) = dirs::home_dir() {
            home.join(".tollgate")
        } else {
            PathBuf::from(".tollgate")
        }
    }

    /// Directory holding the sled database.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.storage
            .data_dir
            .clone()
            .unwrap_or_else(|| Self::state_dir().join("data"))
    }

    /// Apply environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(secret) = std::env::var("TOLLGATE_SIGNING_SECRET") {
            self.auth.signing_secret = Some(secret);
        }

        if let Some(port) = std::env::var("TOLLGATE_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
        {
            self.server.port = port;
        }

        if let Ok(dir) = std::env::var("TOLLGATE_DATA_DIR") {
            self.storage.data_dir = Some(PathBuf::from(dir));
        }

        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Validation(
                "Server port cannot be 0".to_string(),
            ));
        }

        if self.server.request_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "server.requestTimeoutSecs must be greater than 0".to_string(),
            ));
        }

        if self.auth.store_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "auth.storeTimeoutMs must be greater than 0".to_string(),
            ));
        }

        if self.auth.token_expiry_secs > MAX_TOKEN_EXPIRY_SECS {
            return Err(ConfigError::Validation(format!(
                "auth.tokenExpirySecs must be at most {MAX_TOKEN_EXPIRY_SECS} (10 years)"
            )));
        }

        if let Some(secret) = &self.auth.signing_secret {
            SigningSecret::from_hex(secret)?;
        }

        if !self.auth.default_role.is_assignable() {
            return Err(ConfigError::Validation(
                "auth.defaultRole must be one of: user, writer, editor, admin".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for name in &self.resources {
            validate_collection_name(name).map_err(|e: ValidationError| {
                ConfigError::Validation(format!("Resource '{name}': {e}"))
            })?;
            if !seen.insert(name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "Resource '{name}' is declared more than once"
                )));
            }
        }

        Ok(())
    }
}

/// Longest token lifetime accepted by [`Config::validate`].
pub const MAX_TOKEN_EXPIRY_SECS: u64 = 10 * 365 * 24 * 60 * 60;

fn default_resources() -> Vec<String> {
    vec!["clothes".to_string(), "food".to_string()]
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Bind address.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Enable CORS.
    #[serde(default = "default_true")]
    pub cors: bool,

    /// Request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_bind_address(),
            cors: true,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl ServerConfig {
    /// Request timeout as a `Duration`.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

const fn default_port() -> u16 {
    8080
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

const fn default_request_timeout() -> u64 {
    30
}

const fn default_true() -> bool {
    true
}

/// Authentication configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfig {
    /// Token signing secret (hex-encoded, at least 32 bytes).
    /// An ephemeral secret is generated at startup when unset.
    #[serde(default)]
    pub signing_secret: Option<String>,

    /// Token lifetime in seconds. 0 disables expiry.
    #[serde(default)]
    pub token_expiry_secs: u64,

    /// Upper bound on a single credential store call, in milliseconds.
    #[serde(default = "default_store_timeout")]
    pub store_timeout_ms: u64,

    /// Sign-in attempts allowed per username per minute. 0 disables limiting.
    #[serde(default = "default_sign_in_per_minute")]
    pub sign_in_per_minute: u32,

    /// Role assigned on sign-up when the request names none.
    #[serde(default = "default_role")]
    pub default_role: Role,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            signing_secret: None,
            token_expiry_secs: 0,
            store_timeout_ms: default_store_timeout(),
            sign_in_per_minute: default_sign_in_per_minute(),
            default_role: default_role(),
        }
    }
}

impl AuthConfig {
    /// Token expiry, or `None` when disabled.
    #[must_use]
    pub const fn token_expiry(&self) -> Option<Duration> {
        if self.token_expiry_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.token_expiry_secs))
        }
    }

    /// Credential store call timeout.
    #[must_use]
    pub const fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    /// Decode the configured signing secret, if any.
    ///
    /// # Errors
    ///
    /// Returns error if the configured secret is malformed.
    pub fn signing_secret(&self) -> Result<Option<SigningSecret>, SecretError> {
        self.signing_secret
            .as_deref()
            .map(SigningSecret::from_hex)
            .transpose()
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field(
                "signing_secret",
                &self.signing_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("token_expiry_secs", &self.token_expiry_secs)
            .field("store_timeout_ms", &self.store_timeout_ms)
            .field("sign_in_per_minute", &self.sign_in_per_minute)
            .field("default_role", &self.default_role)
            .finish()
    }
}

const fn default_store_timeout() -> u64 {
    5000
}

const fn default_sign_in_per_minute() -> u32 {
    20
}

const fn default_role() -> Role {
    Role::User
}

/// Storage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    /// Data directory override.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

/// Global settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalSettings {
    /// Enable debug logging.
    #[serde(default)]
    pub debug: bool,

    /// Log format.
    #[serde(default)]
    pub log_format: LogFormat,
}

/// Log format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable format.
    #[default]
    Pretty,
    /// JSON format.
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.auth.token_expiry(), None);
        assert_eq!(config.auth.default_role, Role::User);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_resources_from_empty_file() {
        let config: Config = json5::from_str("{}").unwrap();
        assert_eq!(config.resources, vec!["clothes", "food"]);
    }

    #[test]
    fn test_config_roundtrip() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("tollgate.json");

        let mut config = Config::default();
        config.resources = vec!["books".to_string()];
        config.auth.token_expiry_secs = 3600;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.resources, vec!["books"]);
        assert_eq!(loaded.auth.token_expiry(), Some(Duration::from_secs(3600)));
    }

    #[test]
    fn test_json5_parsing() {
        let json5_content = r#"{
            // This is a comment
            server: {
                port: 9090,
            },
            auth: {
                tokenExpirySecs: 900,
                defaultRole: "writer",
            },
            resources: ["clothes", "food", "games"],
        }"#;

        let config: Config = json5::from_str(json5_content).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.auth.token_expiry_secs, 900);
        assert_eq!(config.auth.default_role, Role::Writer);
        assert_eq!(config.resources.len(), 3);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.resources = vec!["clothes".to_string(), "clothes".to_string()];
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.resources = vec!["Bad Name".to_string()];
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.auth.signing_secret = Some("abcd".to_string());
        assert!(matches!(config.validate(), Err(ConfigError::Secret(_))));

        let mut config = Config::default();
        config.auth.default_role = Role::Unrecognized;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_timeouts_rejected() {
        let mut config = Config::default();
        config.server.request_timeout_secs = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation(msg)) if msg.contains("requestTimeoutSecs")
        ));

        let mut config = Config::default();
        config.auth.store_timeout_ms = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation(msg)) if msg.contains("storeTimeoutMs")
        ));
    }

    #[test]
    fn test_token_expiry_bounds() {
        let mut config = Config::default();
        config.auth.token_expiry_secs = MAX_TOKEN_EXPIRY_SECS;
        assert!(config.validate().is_ok());

        config.auth.token_expiry_secs = MAX_TOKEN_EXPIRY_SECS + 1;
        assert!(config.validate().is_err());

        config.auth.token_expiry_secs = 10_000_000_000_000;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation(msg)) if msg.contains("tokenExpirySecs")
        ));
    }

    #[test]
    fn test_auth_config_debug_redacts_secret() {
        let config = AuthConfig {
            signing_secret: Some(SigningSecret::generate_hex()),
            ..Default::default()
        };
        let debug = format!("{config:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains(config.signing_secret.as_deref().unwrap()));
    }

    #[test]
    fn test_state_dir() {
        let dir = Config::state_dir();
        assert!(dir.to_str().unwrap().contains("tollgate"));
    }
}
