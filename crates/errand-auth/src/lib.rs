//! # Errand Auth
//!
//! Resolves `Authorization` credentials to a [`Principal`](errand_core::Principal).
//!
//! Two strategies are supported, tried in a fixed order:
//!
//! 1. [`CredentialKind::Token`] - a signed, time-limited token sent as the
//!    username with an empty password (or as a `Bearer` token)
//! 2. [`CredentialKind::Password`] - username and password verified against
//!    an Argon2id hash
//!
//! Verification failures are `Ok(None)`; only directory outages are errors.

#![doc(html_root_url = "https://docs.rs/errand-auth/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod directory;
mod password;
mod resolver;
mod token;

pub use directory::{InMemoryUserDirectory, UserDirectory, UserRecord};
pub use password::{hash_password, verify_password, PasswordError};
pub use resolver::{AuthResolver, CredentialKind, Credentials};
pub use token::{IssuedToken, TokenError, TokenSigner, DEFAULT_TOKEN_EXPIRY_SECS};
