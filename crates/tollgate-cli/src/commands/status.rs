//! Status command - probe a running server.

use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;

use crate::ui::{self, HealthStatus};

#[derive(Debug, Deserialize)]
struct Health {
    status: String,
    version: Option<String>,
}

/// Probe `/health` on the local server.
///
/// # Errors
///
/// Only fails if the HTTP client cannot be built; an unreachable server is
/// reported, not returned.
pub async fn run_status(port: u16) -> Result<()> {
    ui::header("Tollgate Status");
    ui::kv("Address", &format!("127.0.0.1:{port}"));
    println!();

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()?;

    match probe_health(&client, port).await {
        Ok(health) if health.status == "ok" => {
            let detail = health
                .version
                .map_or_else(|| "running".to_string(), |v| format!("running, v{v}"));
            ui::health_check("Server", HealthStatus::Ok, Some(&detail));
        }
        Ok(health) => {
            ui::health_check("Server", HealthStatus::Warning, Some(&health.status));
        }
        Err(e) if e.is_connect() => {
            ui::health_check("Server", HealthStatus::Warning, Some("not running"));
            ui::info("Start with: tollgate serve");
        }
        Err(e) => {
            ui::health_check("Server", HealthStatus::Error, Some(&e.to_string()));
        }
    }

    Ok(())
}

async fn probe_health(client: &reqwest::Client, port: u16) -> Result<Health, reqwest::Error> {
    client
        .get(format!("http://127.0.0.1:{port}/health"))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await
}
