//! Bearer token codec.
//!
//! Tokens are compact JWTs signed with HMAC-SHA256. Verification is pure: no
//! store lookup, so any process holding the signing secret can check a token,
//! and a token cannot be revoked before it expires.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use tollgate_core::{Role, SigningSecret};

use super::AuthError;
use super::identity::Identity;

/// Largest token the verifier will look at.
pub const MAX_TOKEN_SIZE: usize = 8 * 1024;

/// Claims embedded in a bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (identity ID).
    pub sub: String,
    /// Username.
    pub username: String,
    /// Role at issue time.
    pub role: Role,
    /// Issued at (Unix timestamp).
    pub iat: i64,
    /// Expiration (Unix timestamp), present only when expiry is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

/// A freshly signed token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuedToken {
    /// The encoded token.
    pub token: String,
    /// Expiry, if the codec enforces one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Signs and verifies bearer tokens.
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    expiry: Option<Duration>,
    ttl: Option<TimeDelta>,
}

impl TokenCodec {
    /// Create a codec from the signing secret.
    ///
    /// `expiry` of `None` issues tokens without `exp` and accepts them forever.
    ///
    /// # Errors
    ///
    /// Returns `Config` if `now + expiry` cannot be represented as a timestamp.
    pub fn new(secret: &SigningSecret, expiry: Option<Duration>) -> Result<Self, AuthError> {
        let ttl = expiry
            .map(|expiry| {
                TimeDelta::from_std(expiry)
                    .ok()
                    .filter(|ttl| Utc::now().checked_add_signed(*ttl).is_some())
                    .ok_or_else(|| {
                        AuthError::Config(format!(
                            "Token expiry of {}s is out of range",
                            expiry.as_secs()
                        ))
                    })
            })
            .transpose()?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        if ttl.is_some() {
            validation.validate_exp = true;
            validation.set_required_spec_claims(&["exp"]);
        } else {
            validation.validate_exp = false;
            validation.set_required_spec_claims::<&str>(&[]);
        }

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.expose()),
            decoding_key: DecodingKey::from_secret(secret.expose()),
            validation,
            expiry,
            ttl,
        })
    }

    /// Configured token lifetime.
    #[must_use]
    pub const fn expiry(&self) -> Option<Duration> {
        self.expiry
    }

    /// Issue a token for an identity.
    ///
    /// # Errors
    ///
    /// Returns error if token encoding fails.
    pub fn issue(&self, identity: &Identity) -> Result<IssuedToken, AuthError> {
        let now = Utc::now();
        let expires_at = self
            .ttl
            .map(|ttl| {
                now.checked_add_signed(ttl)
                    .ok_or_else(|| AuthError::Config("Token expiry out of range".to_string()))
            })
            .transpose()?;

        let claims = Claims {
            sub: identity.id.clone(),
            username: identity.username.clone(),
            role: identity.role,
            iat: now.timestamp(),
            exp: expires_at.map(|t| t.timestamp()),
        };

        let token = self.encode(&claims)?;
        Ok(IssuedToken { token, expires_at })
    }

    /// Sign a set of claims.
    ///
    /// # Errors
    ///
    /// Returns error if serialization or signing fails.
    pub fn encode(&self, claims: &Claims) -> Result<String, AuthError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| AuthError::Config(format!("Token encoding failed: {e}")))
    }

    /// Verify a token and return its claims.
    ///
    /// # Errors
    ///
    /// Returns `TokenExpired` past expiry and `InvalidToken` for anything else
    /// that does not verify.
    pub fn decode(&self, token: &str) -> Result<Claims, AuthError> {
        if token.len() > MAX_TOKEN_SIZE {
            return Err(AuthError::InvalidToken);
        }

        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => {
                    tracing::debug!("Token rejected: {e}");
                    AuthError::InvalidToken
                }
            })
    }

    /// Extract token from an Authorization header value.
    ///
    /// Expects format: "Bearer <token>" (scheme is case-insensitive).
    #[must_use]
    pub fn extract_from_header(header: &str) -> Option<&str> {
        let (scheme, token) = header.split_once(' ')?;
        let token = token.trim();
        if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() {
            Some(token)
        } else {
            None
        }
    }
}

impl Claims {
    /// Issue time as a `DateTime`.
    #[must_use]
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.iat, 0).single()
    }
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("expiry", &self.expiry)
            .finish_non_exhaustive()
    }
}
