//! Credential resolution.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use errand_core::{ErrandResult, Principal};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::directory::UserDirectory;
use crate::password::verify_password;
use crate::token::{IssuedToken, TokenError, TokenSigner};

/// An authentication strategy.
///
/// Declaration order is the order strategies are tried in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    /// Signed token presented as the username with an empty password.
    Token,
    /// Username and password checked against the stored hash.
    Password,
}

/// A `(username, password)` pair taken from the `Authorization` header.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Username, or a token.
    pub username: String,
    /// Password; empty when a token is presented.
    pub password: String,
}

impl Credentials {
    /// Creates a credential pair.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Parses an `Authorization` header value.
    ///
    /// `Basic base64(user:pass)` yields `(user, pass)`; `Bearer <token>`
    /// yields `(token, "")`. Anything else is `None`.
    pub fn from_authorization(value: &str) -> Option<Self> {
        let (scheme, rest) = value.trim().split_once(' ')?;
        let rest = rest.trim();

        if scheme.eq_ignore_ascii_case("basic") {
            let decoded = STANDARD.decode(rest).ok()?;
            let decoded = String::from_utf8(decoded).ok()?;
            let (username, password) = decoded.split_once(':')?;
            Some(Self::new(username, password))
        } else if scheme.eq_ignore_ascii_case("bearer") && !rest.is_empty() {
            Some(Self::new(rest, ""))
        } else {
            None
        }
    }

    /// Encodes the pair as a `Basic` header value.
    pub fn to_basic_header(&self) -> String {
        format!(
            "Basic {}",
            STANDARD.encode(format!("{}:{}", self.username, self.password))
        )
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &"<redacted>")
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Resolves credentials to a [`Principal`] using the configured strategies.
#[derive(Clone)]
pub struct AuthResolver {
    directory: Arc<dyn UserDirectory>,
    signer: TokenSigner,
    methods: Vec<CredentialKind>,
}

impl AuthResolver {
    /// Creates a resolver with both token and password authentication.
    pub fn new(directory: Arc<dyn UserDirectory>, signer: TokenSigner) -> Self {
        Self {
            directory,
            signer,
            methods: vec![CredentialKind::Token, CredentialKind::Password],
        }
    }

    /// Restricts the enabled strategies.
    ///
    /// Duplicates are dropped and the fixed try order is kept regardless of
    /// the order given.
    #[must_use]
    pub fn with_methods(mut self, methods: impl IntoIterator<Item = CredentialKind>) -> Self {
        let mut methods: Vec<_> = methods.into_iter().collect();
        methods.sort_unstable();
        methods.dedup();
        self.methods = methods;
        self
    }

    /// Returns the enabled strategies in try order.
    pub fn methods(&self) -> &[CredentialKind] {
        &self.methods
    }

    /// Returns the token signer.
    pub fn signer(&self) -> &TokenSigner {
        &self.signer
    }

    /// Issues a token for an authenticated principal.
    pub fn issue_token(&self, principal: &Principal) -> Result<IssuedToken, TokenError> {
        self.signer.issue(&principal.id)
    }

    /// Resolves `credentials`, returning `Ok(None)` when no strategy accepts
    /// them. Directory failures are returned as errors.
    pub async fn authenticate(&self, credentials: &Credentials) -> ErrandResult<Option<Principal>> {
        for method in &self.methods {
            let principal = match method {
                CredentialKind::Token if credentials.password.is_empty() => {
                    self.by_token(&credentials.username).await?
                }
                CredentialKind::Token => None,
                CredentialKind::Password => self.by_password(credentials).await?,
            };
            if let Some(principal) = principal {
                debug!(principal = %principal.log_id(), method = ?method, "credentials accepted");
                return Ok(Some(principal));
            }
        }
        Ok(None)
    }

    async fn by_token(&self, token: &str) -> ErrandResult<Option<Principal>> {
        let id = match self.signer.verify(token) {
            Ok(id) => id,
            Err(reason) => {
                debug!(%reason, "token rejected");
                return Ok(None);
            }
        };
        Ok(self
            .directory
            .find_by_id(&id)
            .await?
            .map(|record| record.principal))
    }

    async fn by_password(&self, credentials: &Credentials) -> ErrandResult<Option<Principal>> {
        if credentials.username.is_empty() {
            return Ok(None);
        }
        let Some(record) = self
            .directory
            .find_by_username(&credentials.username)
            .await?
        else {
            return Ok(None);
        };

        if verify_password(&credentials.password, &record.password_hash) {
            Ok(Some(record.principal))
        } else {
            Ok(None)
        }
    }
}

impl std::fmt::Debug for AuthResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthResolver")
            .field("methods", &self.methods)
            .field("signer", &self.signer)
            .finish_non_exhaustive()
    }
}
