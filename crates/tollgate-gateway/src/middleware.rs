//! Gateway middleware.

use std::any::Any;
use std::num::NonZeroU32;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use serde::{Deserialize, Serialize};

/// Error body returned for every rejected request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// HTTP status code.
    pub status: u16,
    /// Human-readable reason.
    pub message: String,
}

pub(crate) fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    let body = ErrorBody {
        status: status.as_u16(),
        message: message.into(),
    };
    (status, Json(body)).into_response()
}

/// Fallback for unmatched routes.
pub(crate) async fn not_found() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

/// Render a handler panic as a 500.
#[allow(clippy::needless_pass_by_value)]
pub(crate) fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(%detail, "Handler panicked");

    error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
}

/// Per-username sign-in rate limiter.
pub struct SignInLimiter {
    limiter: Option<RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>>,
}

impl SignInLimiter {
    /// Create a limiter allowing `attempts_per_minute` per username.
    /// Zero disables limiting.
    #[must_use]
    pub fn new(attempts_per_minute: u32) -> Self {
        Self {
            limiter: NonZeroU32::new(attempts_per_minute)
                .map(|n| RateLimiter::keyed(Quota::per_minute(n))),
        }
    }

    /// Record an attempt for `username`. Returns `false` once over quota.
    #[must_use]
    pub fn check(&self, username: &str) -> bool {
        self.limiter
            .as_ref()
            .is_none_or(|limiter| limiter.check_key(&username.to_string()).is_ok())
    }

    /// Drop bookkeeping for usernames whose quota has fully replenished.
    pub fn shrink(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.retain_recent();
            limiter.shrink_to_fit();
        }
    }
}

impl Default for SignInLimiter {
    fn default() -> Self {
        Self::new(20)
    }
}

impl std::fmt::Debug for SignInLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignInLimiter")
            .field("enabled", &self.limiter.is_some())
            .finish()
    }
}
