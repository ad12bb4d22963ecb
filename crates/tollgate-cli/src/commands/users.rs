//! Identity management commands.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tollgate_core::validation::{validate_password, validate_role, validate_username};
use tollgate_core::{Config, Role};
use tollgate_gateway::auth::{StoreError, password};
use tollgate_gateway::{CredentialStore, Identity, SledCredentialStore, open_database};
use zeroize::Zeroizing;

use crate::ui;

const GENERATED_PASSWORD_LENGTH: usize = 20;

/// Arguments for identity commands.
pub struct UsersArgs {
    /// The action to perform.
    pub action: UsersAction,
    /// Data directory override.
    pub data_dir: Option<PathBuf>,
}

/// Identity actions.
pub enum UsersAction {
    /// Create a new identity.
    Create {
        username: String,
        password: Option<String>,
        generate_password: bool,
        role: Role,
    },
    /// List all identities.
    List,
}

/// Run an identity command against the on-disk credential store.
///
/// The server must not be running: sled holds an exclusive lock on the database.
///
/// # Errors
///
/// Returns error if the store cannot be opened or the operation fails.
pub async fn run_users(config: &Config, args: UsersArgs) -> Result<()> {
    let data_dir = args.data_dir.unwrap_or_else(|| config.data_dir());
    let db = open_database(&data_dir).with_context(|| {
        format!(
            "Failed to open {} (is the server running?)",
            data_dir.display()
        )
    })?;
    let store = SledCredentialStore::with_db(&db).context("Failed to open credential store")?;

    match args.action {
        UsersAction::Create {
            username,
            password,
            generate_password,
            role,
        } => {
            let password = resolve_password(password, generate_password)?;
            let identity = create_identity(&store, &username, &password, role).await?;
            ui::success(&format!(
                "Created identity '{}' with role '{}'",
                identity.username, identity.role
            ));
            ui::kv("ID", &identity.id);
        }
        UsersAction::List => list_identities(&store).await?,
    }

    Ok(())
}

fn resolve_password(given: Option<String>, generate: bool) -> Result<Zeroizing<String>> {
    if generate {
        let generated = password::generate_password(GENERATED_PASSWORD_LENGTH);
        ui::success(&format!("Generated password: {}", generated.as_str()));
        return Ok(generated);
    }

    if let Some(given) = given {
        return Ok(Zeroizing::new(given));
    }

    let first = Zeroizing::new(ui::prompts::password("Password")?);
    let second = Zeroizing::new(ui::prompts::password("Confirm password")?);
    if first.as_str() != second.as_str() {
        anyhow::bail!("Passwords do not match");
    }
    Ok(first)
}

/// Validate, hash and persist a new identity.
async fn create_identity(
    store: &dyn CredentialStore,
    username: &str,
    password: &str,
    role: Role,
) -> Result<Identity> {
    validate_username(username)?;
    validate_password(password)?;
    validate_role(role)?;

    let secret = Zeroizing::new(password.to_string());
    let hash = tokio::task::spawn_blocking(move || password::hash_password(&secret))
        .await
        .context("Hashing task failed")??;

    match store.create(Identity::new(username, hash, role)).await {
        Ok(identity) => Ok(identity),
        Err(StoreError::DuplicateKey(username)) => {
            anyhow::bail!("Identity '{username}' already exists")
        }
        Err(e) => Err(e).context("Failed to save identity"),
    }
}

async fn list_identities(store: &dyn CredentialStore) -> Result<()> {
    let mut identities = store.list().await.context("Failed to list identities")?;

    if identities.is_empty() {
        ui::info("No identities registered.");
        ui::info(
            "Run 'tollgate users create --username admin --role admin --generate-password' to create one.",
        );
        return Ok(());
    }

    identities.sort_by_key(|identity| identity.created_at);

    ui::info(&format!("Identities ({}):", identities.len()));
    println!();
    println!("{:<24} {:<10} {:<24}", "USERNAME", "ROLE", "CREATED");
    println!("{}", "-".repeat(58));

    for identity in identities {
        let created = identity.created_at.format("%Y-%m-%d %H:%M:%S");
        println!(
            "{:<24} {:<10} {:<24}",
            identity.username, identity.role, created
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tollgate_gateway::MemoryCredentialStore;

    #[tokio::test]
    async fn test_create_identity() {
        let store = MemoryCredentialStore::new();

        let identity = create_identity(&store, "editor", "hunter2-long", Role::Editor)
            .await
            .unwrap();
        assert_eq!(identity.role, Role::Editor);
        assert!(password::verify_password("hunter2-long", &identity.password_hash));

        let found = store.find_by_username("editor").await.unwrap().unwrap();
        assert_eq!(found.id, identity.id);
    }

    #[tokio::test]
    async fn test_create_duplicate() {
        let store = MemoryCredentialStore::new();
        create_identity(&store, "editor", "hunter2-long", Role::Editor)
            .await
            .unwrap();

        let err = create_identity(&store, "editor", "another-pass", Role::Admin)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[tokio::test]
    async fn test_create_rejects_bad_input() {
        let store = MemoryCredentialStore::new();

        assert!(
            create_identity(&store, "", "hunter2-long", Role::User)
                .await
                .is_err()
        );
        assert!(
            create_identity(&store, "editor", "hunter2-long", Role::Unrecognized)
                .await
                .is_err()
        );
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[test]
    fn test_resolve_given_password() {
        let password = resolve_password(Some("hunter2-long".to_string()), false).unwrap();
        assert_eq!(password.as_str(), "hunter2-long");
    }
}
