//! Authenticated caller identity.

use serde::{Deserialize, Serialize};

/// The authenticated identity associated with a request.
///
/// A `Principal` is produced by the authentication stage and lives only for
/// the duration of one request. Its `id` doubles as the rate-limit and audit
/// key, so it must be stable and unique per user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    /// Opaque unique identifier.
    pub id: String,
    /// Login name, for logging only.
    pub username: String,
}

impl Principal {
    /// Creates a new principal.
    #[must_use]
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
        }
    }

    /// Returns an identifier suitable for logs. Never contains credentials.
    #[must_use]
    pub fn log_id(&self) -> String {
        format!("user:{}", self.id)
    }
}
