//! Signed, time-limited authentication tokens.
//!
//! Wire format:
//!
//! ```text
//! base64url(payload) "." base64url(HMAC-SHA256(secret, base64url(payload)))
//! ```
//!
//! where `payload` is the JSON object `{"id": ..., "iat": ..., "exp": ...}`.
//! Both segments use the URL-safe alphabet without padding.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Default token lifetime in seconds.
pub const DEFAULT_TOKEN_EXPIRY_SECS: u64 = 3600;

/// Reasons a token fails verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenError {
    /// The token is not two base64url segments around a JSON payload.
    #[error("malformed token")]
    Malformed,

    /// The signature does not match the payload.
    #[error("invalid token signature")]
    BadSignature,

    /// The token's expiry is in the past.
    #[error("token expired")]
    Expired,

    /// The signing key could not initialise the MAC.
    #[error("invalid signing key")]
    InvalidKey,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    id: String,
    iat: u64,
    exp: u64,
}

/// A freshly issued token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssuedToken {
    /// The encoded token.
    pub token: String,
    /// Lifetime in seconds.
    pub expiration: u64,
}

/// Issues and verifies HMAC-SHA256 signed tokens.
#[derive(Clone)]
pub struct TokenSigner {
    secret: Vec<u8>,
    expiry_secs: u64,
}

impl TokenSigner {
    /// Creates a signer with the default one-hour expiry.
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
            expiry_secs: DEFAULT_TOKEN_EXPIRY_SECS,
        }
    }

    /// Sets the token lifetime.
    #[must_use]
    pub fn with_expiry(mut self, seconds: u64) -> Self {
        self.expiry_secs = seconds;
        self
    }

    /// Returns the token lifetime in seconds.
    pub fn expiry_secs(&self) -> u64 {
        self.expiry_secs
    }

    /// Issues a token for `principal_id` valid from now.
    pub fn issue(&self, principal_id: &str) -> Result<IssuedToken, TokenError> {
        self.issue_at(principal_id, now_secs())
    }

    /// Issues a token as if the current time were `now`.
    pub fn issue_at(&self, principal_id: &str, now: u64) -> Result<IssuedToken, TokenError> {
        let claims = Claims {
            id: principal_id.to_string(),
            iat: now,
            exp: now.saturating_add(self.expiry_secs),
        };
        let payload = serde_json::to_vec(&claims).map_err(|_| TokenError::Malformed)?;
        let payload_b64 = URL_SAFE_NO_PAD.encode(payload);

        let mut mac = self.mac()?;
        mac.update(payload_b64.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(IssuedToken {
            token: format!("{payload_b64}.{signature}"),
            expiration: self.expiry_secs,
        })
    }

    /// Verifies `token` and returns the embedded principal id.
    pub fn verify(&self, token: &str) -> Result<String, TokenError> {
        self.verify_at(token, now_secs())
    }

    /// Verifies `token` as if the current time were `now`.
    ///
    /// The signature is checked in constant time before the payload is
    /// parsed. A token is valid while `now < exp`.
    pub fn verify_at(&self, token: &str, now: u64) -> Result<String, TokenError> {
        let (payload_b64, signature_b64) = token.split_once('.').ok_or(TokenError::Malformed)?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| TokenError::Malformed)?;

        let mut mac = self.mac()?;
        mac.update(payload_b64.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::BadSignature)?;

        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| TokenError::Malformed)?;
        let claims: Claims = serde_json::from_slice(&payload).map_err(|_| TokenError::Malformed)?;

        if now >= claims.exp {
            return Err(TokenError::Expired);
        }
        Ok(claims.id)
    }

    fn mac(&self) -> Result<HmacSha256, TokenError> {
        HmacSha256::new_from_slice(&self.secret).map_err(|_| TokenError::InvalidKey)
    }
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner")
            .field("secret", &"<redacted>")
            .field("expiry_secs", &self.expiry_secs)
            .finish()
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
