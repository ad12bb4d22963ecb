//! Resource collections and their CRUD handlers.
//!
//! Collections are registered once at startup. Each registered name gets its
//! own concrete routes, so a request for an undeclared collection never
//! reaches a handler and falls through to the 404 fallback.

use std::collections::BTreeSet;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    handler::Handler,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::Value;
use thiserror::Error;
use tollgate_core::records::UpdateMode;
use tollgate_core::validation::{ValidationError, validate_collection_name};
use tollgate_core::{Action, RecordStore, RecordStoreError};

use crate::auth::{TokenCodec, require_action, verify_bearer};
use crate::middleware::error_response;

/// Resource errors.
#[derive(Debug, Error)]
pub enum ResourceError {
    /// Collection name failed validation at registration.
    #[error("Invalid resource name '{name}': {source}")]
    InvalidName {
        /// The rejected name.
        name: String,
        /// Why it was rejected.
        source: ValidationError,
    },

    /// Collection registered twice.
    #[error("Resource '{0}' is registered more than once")]
    Duplicate(String),

    /// No record with that id.
    #[error("No {collection} record with id {id}")]
    NotFound {
        /// Collection name.
        collection: String,
        /// Requested id.
        id: String,
    },

    /// Request body is not a JSON object.
    #[error("Invalid body: {0}")]
    InvalidBody(String),

    /// Record store failure.
    #[error("Record store error: {0}")]
    Storage(RecordStoreError),
}

impl From<RecordStoreError> for ResourceError {
    fn from(err: RecordStoreError) -> Self {
        match err {
            RecordStoreError::NotAnObject => Self::InvalidBody(err.to_string()),
            other => Self::Storage(other),
        }
    }
}

impl IntoResponse for ResourceError {
    fn into_response(self) -> Response {
        match &self {
            Self::NotFound { .. } => {
                error_response(StatusCode::NOT_FOUND, self.to_string())
            }
            Self::InvalidBody(_) => error_response(StatusCode::BAD_REQUEST, self.to_string()),
            Self::InvalidName { .. } | Self::Duplicate(_) | Self::Storage(_) => {
                tracing::error!(error = %self, "Resource request failed");
                error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        }
    }
}

/// The set of collections the gateway serves.
#[derive(Debug, Clone, Default)]
pub struct ResourceRegistry {
    collections: BTreeSet<String>,
}

impl ResourceRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a list of names.
    ///
    /// # Errors
    ///
    /// Fails on the first invalid or repeated name.
    pub fn from_names<I, N>(names: I) -> Result<Self, ResourceError>
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        let mut registry = Self::new();
        for name in names {
            registry.register(name)?;
        }
        Ok(registry)
    }

    /// Register a collection.
    ///
    /// # Errors
    ///
    /// Returns `InvalidName` or `Duplicate`.
    pub fn register(&mut self, name: impl Into<String>) -> Result<(), ResourceError> {
        let name = name.into();
        if let Err(source) = validate_collection_name(&name) {
            return Err(ResourceError::InvalidName { name, source });
        }
        if self.collections.contains(&name) {
            return Err(ResourceError::Duplicate(name));
        }

        tracing::debug!(collection = %name, "Registered resource collection");
        self.collections.insert(name);
        Ok(())
    }

    /// Registered collection names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.collections.iter().map(String::as_str)
    }

    /// Number of registered collections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.collections.len()
    }

    /// Whether no collections are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    /// Routes for the unauthenticated tier.
    pub fn open_routes(&self, records: &RecordStore) -> Router {
        self.names().fold(Router::new(), |router, name| {
            let ctx = CollectionContext::new(name, records);
            let item_path = format!("/{name}/{{id}}");

            router.merge(
                Router::new()
                    .route(&format!("/{name}"), get(list_records).post(create_record))
                    .route(
                        &item_path,
                        get(get_record)
                            .put(replace_record)
                            .patch(merge_record)
                            .delete(delete_record),
                    )
                    .with_state(ctx),
            )
        })
    }

    /// Routes for the bearer-authenticated tier. Reads need a valid token;
    /// writes additionally need the role to grant the matching action.
    pub fn gated_routes(&self, records: &RecordStore, codec: &Arc<TokenCodec>) -> Router {
        self.names().fold(Router::new(), |router, name| {
            let ctx = CollectionContext::new(name, records);
            let item_path = format!("/{name}/{{id}}");

            router.merge(
                Router::new()
                    .route(
                        &format!("/{name}"),
                        get(list_records).post(create_record.layer(require_action(Action::Create))),
                    )
                    .route(
                        &item_path,
                        get(get_record)
                            .put(replace_record.layer(require_action(Action::Update)))
                            .patch(merge_record.layer(require_action(Action::Update)))
                            .delete(delete_record.layer(require_action(Action::Delete))),
                    )
                    .route_layer(middleware::from_fn_with_state(
                        Arc::clone(codec),
                        verify_bearer,
                    ))
                    .with_state(ctx),
            )
        })
    }
}

struct CollectionContext {
    name: String,
    records: RecordStore,
}

impl CollectionContext {
    fn new(name: &str, records: &RecordStore) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            records: records.clone(),
        })
    }

    fn parse_id(&self, raw: &str) -> Result<u64, ResourceError> {
        raw.parse().map_err(|_| self.not_found(raw))
    }

    fn not_found(&self, id: impl ToString) -> ResourceError {
        ResourceError::NotFound {
            collection: self.name.clone(),
            id: id.to_string(),
        }
    }
}

type Collection = State<Arc<CollectionContext>>;

fn json_body(body: Result<Json<Value>, JsonRejection>) -> Result<Value, ResourceError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| ResourceError::InvalidBody(rejection.body_text()))
}

async fn list_records(State(ctx): Collection) -> Result<Json<Vec<Value>>, ResourceError> {
    Ok(Json(ctx.records.list(&ctx.name)?))
}

async fn get_record(
    State(ctx): Collection,
    Path(id): Path<String>,
) -> Result<Json<Value>, ResourceError> {
    let id = ctx.parse_id(&id)?;
    ctx.records
        .get(&ctx.name, id)?
        .map(Json)
        .ok_or_else(|| ctx.not_found(id))
}

async fn create_record(
    State(ctx): Collection,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ResourceError> {
    let record = ctx.records.create(&ctx.name, json_body(body)?)?;
    tracing::debug!(collection = %ctx.name, id = %record["id"], "Record created");
    Ok((StatusCode::CREATED, Json(record)))
}

fn update_record(
    ctx: &CollectionContext,
    id: &str,
    body: Result<Json<Value>, JsonRejection>,
    mode: UpdateMode,
) -> Result<Json<Value>, ResourceError> {
    let id = ctx.parse_id(id)?;
    ctx.records
        .update(&ctx.name, id, json_body(body)?, mode)?
        .map(Json)
        .ok_or_else(|| ctx.not_found(id))
}

async fn replace_record(
    State(ctx): Collection,
    Path(id): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ResourceError> {
    update_record(&ctx, &id, body, UpdateMode::Replace)
}

async fn merge_record(
    State(ctx): Collection,
    Path(id): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ResourceError> {
    update_record(&ctx, &id, body, UpdateMode::Merge)
}

async fn delete_record(
    State(ctx): Collection,
    Path(id): Path<String>,
) -> Result<Json<Value>, ResourceError> {
    let id = ctx.parse_id(&id)?;
    let removed = ctx
        .records
        .delete(&ctx.name, id)?
        .ok_or_else(|| ctx.not_found(id))?;
    tracing::debug!(collection = %ctx.name, id, "Record deleted");
    Ok(Json(removed))
}
