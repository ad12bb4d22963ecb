//! Identity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tollgate_core::Role;

/// A registered identity. Immutable once created.
#[derive(Clone, Serialize, Deserialize)]
pub struct Identity {
    /// Unique identity ID.
    pub id: String,
    /// Username for sign-in. Unique and case-sensitive.
    pub username: String,
    /// Argon2 password hash (never exposed in API responses).
    pub password_hash: String,
    /// Role used for authorization.
    pub role: Role,
    /// When the identity was created.
    pub created_at: DateTime<Utc>,
}

impl Identity {
    /// Build a new identity around an already-computed password hash.
    #[must_use]
    pub fn new(username: impl Into<String>, password_hash: String, role: Role) -> Self {
        Self {
            id: format!("user_{}", uuid::Uuid::new_v4()),
            username: username.into(),
            password_hash,
            role,
            created_at: Utc::now(),
        }
    }

    /// Create a safe version of the identity for API responses.
    #[must_use]
    pub fn to_summary(&self) -> IdentitySummary {
        IdentitySummary {
            id: self.id.clone(),
            username: self.username.clone(),
            role: self.role,
            created_at: self.created_at,
        }
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("role", &self.role)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// Public identity representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentitySummary {
    /// Unique identity ID.
    pub id: String,
    /// Username.
    pub username: String,
    /// Role.
    pub role: Role,
    /// When created.
    pub created_at: DateTime<Utc>,
}
