//! Permission evaluation.
//!
//! Attach [`require_action`] to a route handler behind the bearer middleware:
//!
//! ```ignore
//! routing::delete(delete_record.layer(require_action(Action::Delete)))
//! ```

use std::convert::Infallible;
use std::task::{Context, Poll};

use axum::{
    extract::Request,
    response::{IntoResponse, Response},
};
use futures::future::BoxFuture;
use tollgate_core::Action;
use tower::{Layer, Service};

use super::AuthError;
use super::token::Claims;

/// Decide whether verified claims grant `action`.
///
/// # Errors
///
/// `Forbidden` if the role lacks the action (including roles this build does
/// not recognize). `Unauthorized` if no claims were attached, which means the
/// route was wired without the bearer middleware.
pub fn evaluate(claims: Option<&Claims>, action: Action) -> Result<(), AuthError> {
    let Some(claims) = claims else {
        tracing::error!(%action, "Permission check ran without verified claims");
        return Err(AuthError::Unauthorized);
    };

    if claims.role.permits(action) {
        Ok(())
    } else {
        tracing::info!(
            username = %claims.username,
            role = %claims.role,
            %action,
            "Permission denied"
        );
        Err(AuthError::Forbidden {
            role: claims.role,
            action,
        })
    }
}

/// Layer that requires the caller's role to grant an action.
#[derive(Debug, Clone, Copy)]
pub struct RequireActionLayer {
    action: Action,
}

impl RequireActionLayer {
    /// Create a layer gating on `action`.
    #[must_use]
    pub const fn new(action: Action) -> Self {
        Self { action }
    }
}

impl<S> Layer<S> for RequireActionLayer {
    type Service = RequireActionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequireActionService {
            inner,
            action: self.action,
        }
    }
}

/// Service produced by [`RequireActionLayer`].
#[derive(Debug, Clone)]
pub struct RequireActionService<S> {
    inner: S,
    action: Action,
}

impl<S> Service<Request> for RequireActionService<S>
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        if let Err(e) = evaluate(req.extensions().get::<Claims>(), self.action) {
            return Box::pin(async move { Ok(e.into_response()) });
        }

        // Call the instance that was polled ready, leave a fresh clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        Box::pin(async move { inner.call(req).await })
    }
}

/// Create a layer that gates a handler on `action`.
#[must_use]
pub const fn require_action(action: Action) -> RequireActionLayer {
    RequireActionLayer::new(action)
}
