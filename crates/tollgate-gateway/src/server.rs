//! Gateway server.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    middleware as axum_middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tower_http::{
    catch_panic::CatchPanicLayer, cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer,
};

use tollgate_core::{AuthConfig, Config, RecordStore, Role, SigningSecret, ValidationError};

use crate::GatewayError;
use crate::auth::{
    AuthError, Authenticated, Authenticator, CredentialStore, SessionGrant, SledCredentialStore,
    TokenCodec, parse_basic_credentials, verify_bearer,
};
use crate::middleware::{SignInLimiter, error_response, not_found, panic_response};
use crate::resources::ResourceRegistry;

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Port to listen on.
    pub port: u16,
    /// Bind address.
    pub bind_address: String,
    /// Enable permissive CORS.
    pub cors: bool,
    /// Per-request time limit.
    pub request_timeout: Duration,
    /// Data directory for persistent storage.
    pub data_dir: PathBuf,
    /// Authentication configuration.
    pub auth: AuthConfig,
    /// Resource collections to serve.
    pub resources: Vec<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for GatewayConfig {
    fn from(config: &Config) -> Self {
        Self {
            port: config.server.port,
            bind_address: config.server.bind_address.clone(),
            cors: config.server.cors,
            request_timeout: config.server.request_timeout(),
            data_dir: config.data_dir(),
            auth: config.auth.clone(),
            resources: config.resources.clone(),
        }
    }
}

/// Gateway server state shared across handlers.
pub struct GatewayState {
    /// Sign-up and sign-in.
    pub authenticator: Authenticator,
    /// Token codec shared with the bearer middleware.
    pub codec: Arc<TokenCodec>,
    /// Sign-in rate limiter.
    pub limiter: SignInLimiter,
    /// Resource record store.
    pub records: RecordStore,
    /// Served collections.
    pub registry: ResourceRegistry,
    /// Gateway configuration.
    pub config: GatewayConfig,
}

impl std::fmt::Debug for GatewayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayState")
            .field("authenticator", &self.authenticator)
            .field("limiter", &self.limiter)
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Gateway server.
#[derive(Debug)]
pub struct Gateway {
    state: Arc<GatewayState>,
}

/// Builder for constructing a Gateway with its dependencies.
#[derive(Default)]
pub struct GatewayBuilder {
    config: GatewayConfig,
    credential_store: Option<Arc<dyn CredentialStore>>,
    record_store: Option<RecordStore>,
    signing_secret: Option<SigningSecret>,
}

impl GatewayBuilder {
    /// Create a new builder with default config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set gateway configuration.
    #[must_use]
    pub fn with_config(mut self, config: GatewayConfig) -> Self {
        self.config = config;
        self
    }

    /// Use this credential store instead of the on-disk one.
    #[must_use]
    pub fn with_credential_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.credential_store = Some(store);
        self
    }

    /// Use this record store instead of the on-disk one.
    #[must_use]
    pub fn with_record_store(mut self, store: RecordStore) -> Self {
        self.record_store = Some(store);
        self
    }

    /// Use this signing secret instead of the configured one.
    #[must_use]
    pub fn with_signing_secret(mut self, secret: SigningSecret) -> Self {
        self.signing_secret = Some(secret);
        self
    }

    /// Build the gateway.
    ///
    /// # Errors
    ///
    /// Returns error if storage cannot be opened, a timeout is zero, the
    /// signing secret is malformed or the token expiry is out of range, or a
    /// resource name is invalid.
    pub fn build(self) -> Result<Gateway, GatewayError> {
        let config = self.config;

        if config.request_timeout.is_zero() {
            return Err(GatewayError::Config(
                "Request timeout must be greater than 0".to_string(),
            ));
        }
        if config.auth.store_timeout().is_zero() {
            return Err(GatewayError::Config(
                "Store timeout must be greater than 0".to_string(),
            ));
        }

        let registry = ResourceRegistry::from_names(config.resources.iter().cloned())?;

        let secret = match self.signing_secret {
            Some(secret) => secret,
            None => config
                .auth
                .signing_secret()
                .map_err(|e| GatewayError::Config(format!("Signing secret: {e}")))?
                .unwrap_or_else(|| {
                    tracing::warn!(
                        "No signing secret configured; using an ephemeral one. \
                         Issued tokens will not survive a restart."
                    );
                    SigningSecret::generate()
                }),
        };
        let codec = Arc::new(
            TokenCodec::new(&secret, config.auth.token_expiry())
                .map_err(|e| GatewayError::Config(e.to_string()))?,
        );
        drop(secret);

        // Only touch the disk for stores that were not injected.
        let (credential_store, records) = match (self.credential_store, self.record_store) {
            (Some(credentials), Some(records)) => (credentials, records),
            (credentials, records) => {
                let db = open_database(&config.data_dir)?;
                let credentials = match credentials {
                    Some(store) => store,
                    None => Arc::new(SledCredentialStore::with_db(&db).map_err(|e| {
                        GatewayError::Server(format!("Failed to open credential store: {e}"))
                    })?) as Arc<dyn CredentialStore>,
                };
                let records = match records {
                    Some(store) => store,
                    None => RecordStore::with_db(db).map_err(|e| {
                        GatewayError::Server(format!("Failed to open record store: {e}"))
                    })?,
                };
                (credentials, records)
            }
        };

        let authenticator = Authenticator::new(
            credential_store,
            Arc::clone(&codec),
            config.auth.store_timeout(),
        );

        let state = GatewayState {
            authenticator,
            codec,
            limiter: SignInLimiter::new(config.auth.sign_in_per_minute),
            records,
            registry,
            config,
        };

        Ok(Gateway {
            state: Arc::new(state),
        })
    }
}

/// Open the sled database under `data_dir`, creating the directory if needed.
///
/// Credentials and records share this database. sled takes an exclusive lock,
/// so only one process can hold it at a time.
///
/// # Errors
///
/// Returns error if the directory cannot be created or the database is locked.
pub fn open_database(data_dir: &std::path::Path) -> Result<sled::Db, GatewayError> {
    std::fs::create_dir_all(data_dir)
        .map_err(|e| GatewayError::Config(format!("Failed to create data dir: {e}")))?;
    sled::open(data_dir.join("db"))
        .map_err(|e| GatewayError::Server(format!("Failed to open database: {e}")))
}

impl Gateway {
    /// Create a gateway with on-disk stores.
    ///
    /// # Errors
    ///
    /// See [`GatewayBuilder::build`].
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        GatewayBuilder::new().with_config(config).build()
    }

    /// Shared state.
    #[must_use]
    pub fn state(&self) -> &Arc<GatewayState> {
        &self.state
    }

    /// The complete HTTP router.
    #[must_use]
    pub fn router(&self) -> Router {
        build_router(Arc::clone(&self.state))
    }

    /// Run the gateway server until Ctrl-C.
    ///
    /// # Errors
    ///
    /// Returns error if the address is invalid or the listener fails.
    pub async fn run(&self) -> Result<(), GatewayError> {
        let config = &self.state.config;
        let addr: SocketAddr = format!("{}:{}", config.bind_address, config.port)
            .parse()
            .map_err(|e| GatewayError::Config(format!("Invalid address: {e}")))?;

        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(
            collections = ?self.state.registry.names().collect::<Vec<_>>(),
            token_expiry = ?self.state.codec.expiry(),
            "Tollgate listening on http://{addr}"
        );

        let limiter_state = Arc::clone(&self.state);
        let housekeeping = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                limiter_state.limiter.shrink();
            }
        });

        let served = axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await;
        housekeeping.abort();
        served.map_err(|e| GatewayError::Server(e.to_string()))?;

        self.state
            .records
            .flush()
            .await
            .map_err(|e| GatewayError::Server(format!("Failed to flush records: {e}")))?;
        tracing::info!("Tollgate stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}

/// Build the HTTP router over shared state.
pub fn build_router(state: Arc<GatewayState>) -> Router {
    let codec = Arc::clone(&state.codec);

    let session_routes = Router::new()
        .route("/signup", post(sign_up))
        .route("/signin", post(sign_in))
        .route("/health", get(health))
        .with_state(Arc::clone(&state));

    let whoami_routes = Router::new()
        .route("/whoami", get(whoami))
        .route_layer(axum_middleware::from_fn_with_state(
            Arc::clone(&codec),
            verify_bearer,
        ));

    let mut app = Router::new().merge(session_routes).merge(whoami_routes);

    if !state.registry.is_empty() {
        app = app
            .nest("/api/v1", state.registry.open_routes(&state.records))
            .nest("/api/v2", state.registry.gated_routes(&state.records, &codec));
    }

    let mut app = app
        .fallback(not_found)
        .layer(TimeoutLayer::new(state.config.request_timeout));

    if state.config.cors {
        app = app.layer(CorsLayer::permissive());
    }

    app.layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(panic_response))
}

#[derive(Debug, Deserialize)]
struct SignUpRequest {
    username: String,
    password: String,
    #[serde(default)]
    role: Option<String>,
}

async fn sign_up(
    State(state): State<Arc<GatewayState>>,
    body: Result<Json<SignUpRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return error_response(StatusCode::BAD_REQUEST, rejection.body_text()),
    };
    let password = zeroize::Zeroizing::new(request.password);
    let role = match request.role.as_deref().map(str::parse::<Role>) {
        Some(Ok(role)) => role,
        Some(Err(e)) => return AuthError::Validation(ValidationError::from(e)).into_response(),
        None => state.config.auth.default_role,
    };

    match state
        .authenticator
        .sign_up(&request.username, &password, role)
        .await
    {
        Ok(grant) => (StatusCode::CREATED, Json(grant)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn sign_in(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
) -> Result<Json<SessionGrant>, AuthError> {
    let (username, password) = parse_basic_credentials(headers.get(AUTHORIZATION))?;

    if !state.limiter.check(&username) {
        tracing::warn!(%username, "Sign-in rate limit exceeded");
        return Err(AuthError::RateLimited);
    }

    let grant = state.authenticator.sign_in(&username, &password).await?;
    Ok(Json(grant))
}

#[derive(Debug, Serialize)]
struct WhoAmI {
    id: String,
    username: String,
    role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    issued_at: Option<chrono::DateTime<chrono::Utc>>,
}

async fn whoami(Authenticated(claims): Authenticated) -> Json<WhoAmI> {
    Json(WhoAmI {
        issued_at: claims.issued_at(),
        id: claims.sub,
        username: claims.username,
        role: claims.role,
    })
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<Health> {
    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
