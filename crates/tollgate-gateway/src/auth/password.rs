//! Password hashing and verification.
//!
//! Argon2id with default parameters, PHC string output and a fresh random salt
//! per call, so two hashes of the same password never match byte-for-byte.

use std::sync::LazyLock;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use rand::Rng;
use zeroize::Zeroizing;

use super::AuthError;

/// Hash compared against when the username does not exist, so a miss costs
/// the same as a wrong password.
static DUMMY_HASH: LazyLock<Option<String>> =
    LazyLock::new(|| hash_password("tollgate-timing-equalizer").ok());

/// Hash a password using Argon2id.
///
/// Returns the hash in PHC format: `$argon2id$v=19$m=...,t=...,p=...$salt$hash`
///
/// # Errors
///
/// Returns `AuthError::Hashing` if Argon2 rejects the input.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AuthError::Hashing(e.to_string()))
}

/// Verify a password against a stored PHC hash.
///
/// A hash that cannot be parsed never verifies.
#[must_use]
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::warn!("Stored password hash is malformed: {e}");
            return false;
        }
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Burn one verification against a fixed hash. Always returns `false`.
#[must_use]
pub fn verify_dummy(password: &str) -> bool {
    if let Some(hash) = DUMMY_HASH.as_deref() {
        let _ = verify_password(password, hash);
    }
    false
}

/// Generate a random password of `length` characters.
#[must_use]
pub fn generate_password(length: usize) -> Zeroizing<String> {
    const CHARSET: &[u8] =
        b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789!@#$%^&*";
    let mut rng = rand::thread_rng();

    Zeroizing::new(
        (0..length)
            .map(|_| char::from(CHARSET[rng.gen_range(0..CHARSET.len())]))
            .collect(),
    )
}
