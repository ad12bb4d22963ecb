//! Input validation.
//!
//! Usernames and passwords arrive over the wire on sign-up and sign-in;
//! collection names come from configuration and become route segments.

use thiserror::Error;
use unicode_normalization::is_nfc;

use crate::access::{Role, UnknownRole};

/// Validation error types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Input is empty.
    #[error("{0} must not be empty")]
    Empty(&'static str),

    /// Input exceeds maximum allowed length.
    #[error("{field} exceeds maximum length ({max} bytes, got {actual})")]
    TooLong {
        /// Field name.
        field: &'static str,
        /// Maximum allowed length.
        max: usize,
        /// Actual input length.
        actual: usize,
    },

    /// Disallowed characters in input.
    #[error("{0} contains disallowed characters")]
    DisallowedChars(&'static str),

    /// Unicode text that is not in composed (NFC) form.
    #[error("{0} must be NFC-normalized")]
    NotNormalized(&'static str),

    /// Role name that cannot be assigned to an identity.
    #[error("Unknown role: {0} (expected one of: user, writer, editor, admin)")]
    UnknownRole(String),
}

impl From<UnknownRole> for ValidationError {
    fn from(UnknownRole(name): UnknownRole) -> Self {
        Self::UnknownRole(name)
    }
}

/// Size limits per input type.
pub mod limits {
    /// Maximum username length.
    pub const MAX_USERNAME_LENGTH: usize = 64;

    /// Maximum password length.
    pub const MAX_PASSWORD_LENGTH: usize = 1024;

    /// Maximum collection name length.
    pub const MAX_COLLECTION_NAME_LENGTH: usize = 64;
}

/// Validate a username.
///
/// Usernames are case-sensitive and compared byte-for-byte, so visually
/// identical names in different Unicode forms are rejected up front. A colon
/// is not allowed because Basic credentials split on the first one.
///
/// # Errors
///
/// Returns the first rule the username violates.
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    const FIELD: &str = "username";

    if username.is_empty() {
        return Err(ValidationError::Empty(FIELD));
    }
    if username.len() > limits::MAX_USERNAME_LENGTH {
        return Err(ValidationError::TooLong {
            field: FIELD,
            max: limits::MAX_USERNAME_LENGTH,
            actual: username.len(),
        });
    }
    if username
        .chars()
        .any(|c| c.is_control() || c.is_whitespace() || c == ':')
    {
        return Err(ValidationError::DisallowedChars(FIELD));
    }
    if !is_nfc(username) {
        return Err(ValidationError::NotNormalized(FIELD));
    }

    Ok(())
}

/// Validate a plaintext password.
///
/// # Errors
///
/// Returns error if the password is empty or too long.
pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    const FIELD: &str = "password";

    if password.is_empty() {
        return Err(ValidationError::Empty(FIELD));
    }
    if password.len() > limits::MAX_PASSWORD_LENGTH {
        return Err(ValidationError::TooLong {
            field: FIELD,
            max: limits::MAX_PASSWORD_LENGTH,
            actual: password.len(),
        });
    }
    if password.contains('\0') {
        return Err(ValidationError::DisallowedChars(FIELD));
    }

    Ok(())
}

/// Validate a role requested for a new identity.
///
/// # Errors
///
/// Returns error if the role is [`Role::Unrecognized`].
pub fn validate_role(role: Role) -> Result<(), ValidationError> {
    if role.is_assignable() {
        Ok(())
    } else {
        Err(ValidationError::UnknownRole(role.to_string()))
    }
}

/// Validate a resource collection name.
///
/// Allowed: lowercase ASCII letters, digits, `-` and `_`.
///
/// # Errors
///
/// Returns error if the name is empty, too long or has other characters.
pub fn validate_collection_name(name: &str) -> Result<(), ValidationError> {
    const FIELD: &str = "collection name";

    if name.is_empty() {
        return Err(ValidationError::Empty(FIELD));
    }
    if name.len() > limits::MAX_COLLECTION_NAME_LENGTH {
        return Err(ValidationError::TooLong {
            field: FIELD,
            max: limits::MAX_COLLECTION_NAME_LENGTH,
            actual: name.len(),
        });
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'_')
    {
        return Err(ValidationError::DisallowedChars(FIELD));
    }

    Ok(())
}
