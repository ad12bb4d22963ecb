//! Roles, actions and the permission rule set.
//!
//! Authorization is role → action only. Every role maps to a fixed action set
//! through an exhaustive match, so there is no lookup that can miss:
//!
//! | Role     | create | read | update | delete |
//! |----------|:------:|:----:|:------:|:------:|
//! | `user`   |        |  ✓   |        |        |
//! | `writer` |   ✓    |  ✓   |        |        |
//! | `editor` |   ✓    |  ✓   |   ✓    |        |
//! | `admin`  |   ✓    |  ✓   |   ✓    |   ✓    |
//!
//! Role strings outside this list decode to [`Role::Unrecognized`], which is
//! granted nothing.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identity role used as the sole input to authorization decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    /// Read-only access.
    User,
    /// Can read and create records.
    Writer,
    /// Can read, create and update records.
    Editor,
    /// Full access, including deletes.
    Admin,
    /// A role name this build does not know about.
    Unrecognized,
}

/// Actions gated by the permission evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Create a record.
    Create,
    /// Read one or more records.
    Read,
    /// Replace or modify a record.
    Update,
    /// Remove a record.
    Delete,
}

impl Role {
    /// Roles that can be assigned to an identity.
    pub const ASSIGNABLE: [Self; 4] = [Self::User, Self::Writer, Self::Editor, Self::Admin];

    /// Parse a role name. Unknown names yield `None`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "user" => Some(Self::User),
            "writer" => Some(Self::Writer),
            "editor" => Some(Self::Editor),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    /// Canonical lowercase name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Writer => "writer",
            Self::Editor => "editor",
            Self::Admin => "admin",
            Self::Unrecognized => "unrecognized",
        }
    }

    /// The permission rule set.
    #[must_use]
    pub const fn permitted_actions(&self) -> &'static [Action] {
        match self {
            Self::User => &[Action::Read],
            Self::Writer => &[Action::Read, Action::Create],
            Self::Editor => &[Action::Read, Action::Create, Action::Update],
            Self::Admin => &[Action::Read, Action::Create, Action::Update, Action::Delete],
            Self::Unrecognized => &[],
        }
    }

    /// Check whether this role is granted `action`.
    #[must_use]
    pub fn permits(&self, action: Action) -> bool {
        self.permitted_actions().contains(&action)
    }

    /// Whether this role may be stored on an identity.
    #[must_use]
    pub const fn is_assignable(&self) -> bool {
        !matches!(self, Self::Unrecognized)
    }
}

impl From<String> for Role {
    fn from(s: String) -> Self {
        Self::parse(&s).unwrap_or(Self::Unrecognized)
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.as_str().to_string()
    }
}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| UnknownRole(s.to_string()))
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing a role name that is not assignable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown role: {0} (expected one of: user, writer, editor, admin)")]
pub struct UnknownRole(pub String);

impl Action {
    /// All actions.
    pub const ALL: [Self; 4] = [Self::Create, Self::Read, Self::Update, Self::Delete];

    /// Lowercase name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
