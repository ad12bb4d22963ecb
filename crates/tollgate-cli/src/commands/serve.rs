//! Serve command - run the HTTP server.

use std::path::PathBuf;

use anyhow::Result;
use tollgate_core::Config;
use tollgate_gateway::GatewayConfig;

use crate::ui;

/// Serve command arguments.
#[derive(Debug, Clone, Default)]
pub struct ServeArgs {
    /// Port to listen on.
    pub port: Option<u16>,
    /// Bind address.
    pub bind: Option<String>,
    /// Data directory override.
    pub data_dir: Option<PathBuf>,
}

/// Apply command-line overrides on top of the loaded configuration.
fn apply_overrides(mut config: Config, args: ServeArgs) -> Result<Config> {
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(bind) = args.bind {
        config.server.bind_address = bind;
    }
    if let Some(dir) = args.data_dir {
        config.storage.data_dir = Some(dir);
    }

    config.validate()?;
    Ok(config)
}

/// Run the server until interrupted.
///
/// # Errors
///
/// Returns error if the address is taken or the server fails to start.
pub async fn run_serve(config: Config, args: ServeArgs) -> Result<()> {
    let config = apply_overrides(config, args)?;
    let gateway_config = GatewayConfig::from(&config);
    tracing::debug!(config = ?gateway_config, "Resolved gateway configuration");
    let address = format!("{}:{}", gateway_config.bind_address, gateway_config.port);

    if std::net::TcpListener::bind(&address).is_err() {
        anyhow::bail!("Address {address} is already in use");
    }

    ui::header("Starting Tollgate");
    ui::kv("Address", &address);
    ui::kv("Data dir", &gateway_config.data_dir.display().to_string());
    ui::kv("Resources", &config.resources.join(", "));
    ui::kv("Default role", config.auth.default_role.as_str());
    match config.auth.token_expiry() {
        Some(expiry) => ui::kv("Token expiry", &format!("{}s", expiry.as_secs())),
        None => ui::kv("Token expiry", "never"),
    }

    if config.auth.signing_secret.is_none() {
        ui::warning("No signing secret configured; tokens will not survive a restart");
        ui::info("Generate one with: tollgate secret generate");
    }

    println!();
    tollgate_gateway::start(gateway_config).await?;

    Ok(())
}
