//! Bearer verification for axum.

use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderValue, StatusCode, header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use zeroize::Zeroizing;

use super::AuthError;
use super::token::{Claims, TokenCodec};
use crate::middleware::error_response;

impl AuthError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::DuplicateIdentity(_) => StatusCode::CONFLICT,
            Self::InvalidCredentials
            | Self::MissingCredential
            | Self::InvalidToken
            | Self::TokenExpired => StatusCode::UNAUTHORIZED,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized | Self::Hashing(_) | Self::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();

        if self.is_server_fault() {
            tracing::error!(error = %self, "Auth request failed on the server side");
            let message = if matches!(self, Self::StoreUnavailable(_)) {
                "Credential store unavailable, retry later"
            } else {
                "Internal server error"
            };
            return error_response(status, message);
        }

        error_response(status, self.to_string())
    }
}

/// Verify an `Authorization` header value and return the token claims.
///
/// # Errors
///
/// `MissingCredential` if the header is absent or not a bearer credential,
/// otherwise whatever [`TokenCodec::decode`] reports.
pub fn verify_header(codec: &TokenCodec, header: Option<&HeaderValue>) -> Result<Claims, AuthError> {
    let token = header
        .and_then(|v| v.to_str().ok())
        .and_then(TokenCodec::extract_from_header)
        .ok_or(AuthError::MissingCredential)?;

    codec.decode(token)
}

/// Middleware that rejects requests without a valid bearer token and attaches
/// the verified [`Claims`] to the request extensions.
///
/// # Errors
///
/// Rejects with 401 on a missing, invalid or expired token.
pub async fn verify_bearer(
    State(codec): State<Arc<TokenCodec>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let claims = verify_header(&codec, request.headers().get(AUTHORIZATION)).inspect_err(|e| {
        tracing::debug!(path = %request.uri().path(), error = %e, "Bearer verification failed");
    })?;

    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}

/// Extractor for claims attached by [`verify_bearer`].
///
/// Only valid behind the bearer middleware; used elsewhere it fails with
/// `AuthError::Unauthorized` (500).
#[derive(Debug, Clone)]
pub struct Authenticated(pub Claims);

impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Claims>().cloned().map(Self).ok_or_else(|| {
            tracing::error!(path = %parts.uri.path(), "Handler expected verified claims");
            AuthError::Unauthorized
        })
    }
}

/// Parse `Authorization: Basic base64(username:password)`.
///
/// The password may contain colons; the username may not.
///
/// # Errors
///
/// Returns `MissingCredential` if the header is absent or malformed.
pub fn parse_basic_credentials(
    header: Option<&HeaderValue>,
) -> Result<(String, Zeroizing<String>), AuthError> {
    let value = header
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingCredential)?;

    let (scheme, encoded) = value.split_once(' ').ok_or(AuthError::MissingCredential)?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return Err(AuthError::MissingCredential);
    }

    let decoded = STANDARD
        .decode(encoded.trim())
        .map_err(|_| AuthError::MissingCredential)?;
    let decoded = Zeroizing::new(String::from_utf8(decoded).map_err(|_| AuthError::MissingCredential)?);

    let (username, password) = decoded.split_once(':').ok_or(AuthError::MissingCredential)?;
    if username.is_empty() {
        return Err(AuthError::MissingCredential);
    }

    Ok((username.to_string(), Zeroizing::new(password.to_string())))
}
