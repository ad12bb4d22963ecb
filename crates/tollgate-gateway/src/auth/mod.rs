//! Authentication and authorization for the gateway.
//!
//! This module provides:
//! - Password hashing (Argon2id)
//! - Signed bearer tokens carrying identity claims
//! - The credential store interface and its sled/in-memory implementations
//! - Sign-up and sign-in orchestration
//! - The bearer verifier and permission evaluator gates
//!
//! Request auth status moves `Unauthenticated → Authenticated(claims) →
//! Authorized(action)`, stopping early with a 401 at the bearer verifier or a
//! 403 at the permission evaluator.

mod acl;
mod authenticator;
mod identity;
mod middleware;
/// Password hashing and verification.
pub mod password;
mod store;
mod token;

pub use acl::{RequireActionLayer, RequireActionService, evaluate, require_action};
pub use authenticator::{Authenticator, SessionGrant};
pub use identity::{Identity, IdentitySummary};
pub use middleware::{Authenticated, parse_basic_credentials, verify_bearer, verify_header};
pub use store::{CredentialStore, MemoryCredentialStore, SledCredentialStore, StoreError};
pub use token::{Claims, IssuedToken, MAX_TOKEN_SIZE, TokenCodec};

use thiserror::Error;
use tollgate_core::validation::ValidationError;
use tollgate_core::{Action, Role};

/// Authentication and authorization errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Sign-up for a username that is already registered.
    #[error("Identity already exists: {0}")]
    DuplicateIdentity(String),

    /// Unknown username or wrong password. Deliberately indistinguishable.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Authorization header absent or malformed.
    #[error("Missing or malformed credentials")]
    MissingCredential,

    /// Token signature or structure did not verify.
    #[error("Invalid token")]
    InvalidToken,

    /// Token verified but is past its expiry.
    #[error("Token expired")]
    TokenExpired,

    /// Authenticated, but the role is not granted the action.
    #[error("Role '{role}' is not permitted to {action}")]
    Forbidden {
        /// Role carried by the token.
        role: Role,
        /// Action the route requires.
        action: Action,
    },

    /// The permission evaluator ran without verified claims attached.
    /// This is a routing bug, not a client error.
    #[error("Permission check ran before bearer verification")]
    Unauthorized,

    /// Credential store failed or timed out. Retryable by the caller.
    #[error("Credential store unavailable: {0}")]
    StoreUnavailable(String),

    /// Too many sign-in attempts.
    #[error("Too many sign-in attempts")]
    RateLimited,

    /// Sign-up input failed validation.
    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),

    /// Password hashing failed.
    #[error("Password hashing failed: {0}")]
    Hashing(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),
}

impl AuthError {
    /// Whether this error is the server's fault rather than the client's.
    #[must_use]
    pub const fn is_server_fault(&self) -> bool {
        matches!(
            self,
            Self::Unauthorized | Self::StoreUnavailable(_) | Self::Hashing(_) | Self::Config(_)
        )
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateKey(username) => Self::DuplicateIdentity(username),
            StoreError::Unavailable(reason) => Self::StoreUnavailable(reason),
        }
    }
}
