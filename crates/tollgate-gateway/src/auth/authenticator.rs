//! Sign-up and sign-in orchestration.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tollgate_core::Role;
use tollgate_core::validation::{validate_password, validate_role, validate_username};
use zeroize::Zeroizing;

use super::AuthError;
use super::identity::{Identity, IdentitySummary};
use super::password;
use super::store::{CredentialStore, StoreError};
use super::token::TokenCodec;

/// Result of a successful sign-up or sign-in.
#[derive(Debug, Clone, Serialize)]
pub struct SessionGrant {
    /// Signed bearer token.
    pub token: String,
    /// Token expiry, when enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// The authenticated identity.
    pub user: IdentitySummary,
}

/// Verifies credentials against the store and issues tokens.
#[derive(Clone)]
pub struct Authenticator {
    store: Arc<dyn CredentialStore>,
    codec: Arc<TokenCodec>,
    store_timeout: Duration,
}

impl Authenticator {
    /// Create an authenticator.
    ///
    /// Every store call is abandoned after `store_timeout`.
    #[must_use]
    pub fn new(
        store: Arc<dyn CredentialStore>,
        codec: Arc<TokenCodec>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            codec,
            store_timeout,
        }
    }

    /// The token codec used for issuance.
    #[must_use]
    pub fn codec(&self) -> &Arc<TokenCodec> {
        &self.codec
    }

    /// The underlying credential store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// Register a new identity without issuing a token.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for bad input, `DuplicateIdentity` if the username
    /// is taken, `StoreUnavailable` if the store fails or times out.
    pub async fn register(
        &self,
        username: &str,
        password: &str,
        role: Role,
    ) -> Result<Identity, AuthError> {
        let identity = self.prepare(username, password, role).await?;
        self.persist(identity).await
    }

    /// Register an identity and issue its first token.
    ///
    /// The token is signed before the identity is written, so a signing
    /// failure leaves nothing behind in the store.
    ///
    /// # Errors
    ///
    /// See [`Authenticator::register`]; token signing failures surface as `Config`.
    pub async fn sign_up(
        &self,
        username: &str,
        password: &str,
        role: Role,
    ) -> Result<SessionGrant, AuthError> {
        let identity = self.prepare(username, password, role).await?;
        let grant = self.grant(&identity)?;
        self.persist(identity).await?;
        Ok(grant)
    }

    /// Validate input, reject known usernames and hash the password.
    async fn prepare(
        &self,
        username: &str,
        password: &str,
        role: Role,
    ) -> Result<Identity, AuthError> {
        validate_username(username)?;
        validate_password(password)?;
        validate_role(role)?;

        // Cheap early exit; `persist` is what actually guarantees uniqueness.
        if self
            .bounded("find_by_username", self.store.find_by_username(username))
            .await?
            .is_some()
        {
            return Err(AuthError::DuplicateIdentity(username.to_string()));
        }

        let plaintext = Zeroizing::new(password.to_string());
        let password_hash =
            run_blocking(move || password::hash_password(&plaintext)).await??;

        Ok(Identity::new(username, password_hash, role))
    }

    async fn persist(&self, identity: Identity) -> Result<Identity, AuthError> {
        let username = identity.username.clone();
        let identity = self
            .bounded("create", self.store.create(identity))
            .await
            .inspect_err(|e| {
                if matches!(e, AuthError::DuplicateIdentity(_)) {
                    tracing::debug!(%username, "Concurrent sign-up lost the uniqueness race");
                }
            })?;

        tracing::info!(
            username = %identity.username,
            role = %identity.role,
            "Identity registered"
        );
        Ok(identity)
    }

    /// Verify a username/password pair and issue a token.
    ///
    /// Unknown usernames and wrong passwords both yield `InvalidCredentials`
    /// after the same amount of hashing work.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCredentials` on any credential mismatch and
    /// `StoreUnavailable` if the store fails or times out.
    pub async fn sign_in(&self, username: &str, password: &str) -> Result<SessionGrant, AuthError> {
        let identity = self
            .bounded("find_by_username", self.store.find_by_username(username))
            .await?;

        let plaintext = Zeroizing::new(password.to_string());
        let stored_hash = identity.as_ref().map(|i| i.password_hash.clone());
        let verified = run_blocking(move || match stored_hash {
            Some(hash) => password::verify_password(&plaintext, &hash),
            None => password::verify_dummy(&plaintext),
        })
        .await?;

        match identity {
            Some(identity) if verified => {
                tracing::info!(
                    username = %identity.username,
                    role = %identity.role,
                    "Sign-in succeeded"
                );
                self.grant(&identity)
            }
            _ => {
                tracing::info!(username, "Sign-in rejected");
                Err(AuthError::InvalidCredentials)
            }
        }
    }

    fn grant(&self, identity: &Identity) -> Result<SessionGrant, AuthError> {
        let issued = self.codec.issue(identity)?;
        Ok(SessionGrant {
            token: issued.token,
            expires_at: issued.expires_at,
            user: identity.to_summary(),
        })
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, AuthError> {
        match tokio::time::timeout(self.store_timeout, call).await {
            Ok(result) => result.map_err(|e| {
                if let StoreError::Unavailable(reason) = &e {
                    tracing::warn!(operation, %reason, "Credential store call failed");
                }
                AuthError::from(e)
            }),
            Err(_) => {
                tracing::warn!(
                    operation,
                    timeout_ms = u64::try_from(self.store_timeout.as_millis()).unwrap_or(u64::MAX),
                    "Credential store call timed out"
                );
                Err(AuthError::StoreUnavailable(format!("{operation} timed out")))
            }
        }
    }
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("codec", &self.codec)
            .field("store_timeout", &self.store_timeout)
            .finish_non_exhaustive()
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T, AuthError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AuthError::Hashing(format!("Hashing task failed: {e}")))
}
