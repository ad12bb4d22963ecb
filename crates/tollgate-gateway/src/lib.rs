//! # Tollgate Gateway
//!
//! HTTP server exposing generic CRUD over named resource collections in two
//! tiers: `/api/v1` is open, `/api/v2` requires a bearer token and gates
//! mutating routes on the caller's role.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Authentication and authorization.
pub mod auth;
mod middleware;
/// Resource collection registry and CRUD handlers.
pub mod resources;
mod server;

pub use auth::{
    AuthError, Authenticator, Claims, CredentialStore, Identity, MemoryCredentialStore,
    SledCredentialStore, TokenCodec,
};
pub use middleware::{ErrorBody, SignInLimiter};
pub use resources::{ResourceError, ResourceRegistry};
pub use server::{
    Gateway, GatewayBuilder, GatewayConfig, GatewayState, build_router, open_database,
};

/// Start the gateway server.
///
/// # Errors
///
/// Returns error if server fails to start.
pub async fn start(config: GatewayConfig) -> Result<(), GatewayError> {
    let gateway = Gateway::new(config)?;
    gateway.run().await
}

/// Gateway errors.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Server error.
    #[error("Server error: {0}")]
    Server(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// Resource registration error.
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
