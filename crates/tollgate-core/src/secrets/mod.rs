//! Signing secret handling.
//!
//! The token signing secret is loaded once at startup and handed to the
//! token codec. It lives in a `secrecy::SecretBox`, so it is zeroized on drop
//! and never shows up in `Debug` or `Display` output.

use rand::RngCore;
use secrecy::{ExposeSecret, SecretBox};
use thiserror::Error;
use zeroize::Zeroizing;

/// Minimum secret length in bytes.
pub const MIN_SECRET_LEN: usize = 32;

/// Errors from secret handling.
#[derive(Error, Debug)]
pub enum SecretError {
    /// Secret is not valid hex.
    #[error("Invalid hex secret: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// Secret is shorter than [`MIN_SECRET_LEN`].
    #[error("Secret too short: need at least {MIN_SECRET_LEN} bytes, got {0}")]
    TooShort(usize),
}

/// HMAC signing secret for bearer tokens.
pub struct SigningSecret(SecretBox<[u8]>);

impl SigningSecret {
    /// Wrap raw secret bytes.
    ///
    /// # Errors
    ///
    /// Returns `SecretError::TooShort` if fewer than [`MIN_SECRET_LEN`] bytes are given.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, SecretError> {
        if bytes.len() < MIN_SECRET_LEN {
            let len = bytes.len();
            drop(Zeroizing::new(bytes));
            return Err(SecretError::TooShort(len));
        }
        Ok(Self(SecretBox::new(bytes.into_boxed_slice())))
    }

    /// Decode a hex-encoded secret.
    ///
    /// # Errors
    ///
    /// Returns error if the input is not hex or is too short.
    pub fn from_hex(hex_secret: &str) -> Result<Self, SecretError> {
        let bytes = hex::decode(hex_secret.trim())?;
        Self::from_bytes(bytes)
    }

    /// Generate a random 256-bit secret.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = vec![0u8; MIN_SECRET_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(SecretBox::new(bytes.into_boxed_slice()))
    }

    /// Generate a random 256-bit secret as a hex string.
    #[must_use]
    pub fn generate_hex() -> String {
        let mut bytes = Zeroizing::new([0u8; MIN_SECRET_LEN]);
        rand::thread_rng().fill_bytes(&mut *bytes);
        hex::encode(&*bytes)
    }

    /// Expose the raw secret bytes.
    ///
    /// Only the token codec should call this, to derive its keys.
    #[must_use]
    pub fn expose(&self) -> &[u8] {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SigningSecret([REDACTED])")
    }
}

impl std::fmt::Display for SigningSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}
