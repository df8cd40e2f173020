//! User lookup.

use async_trait::async_trait;
use errand_core::{ErrandResult, Principal};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::password::{hash_password, PasswordError};

/// A stored user: identity plus Argon2 PHC password hash.
#[derive(Debug, Clone)]
pub struct UserRecord {
    /// The user's identity.
    pub principal: Principal,
    /// PHC-format password hash.
    pub password_hash: String,
}

/// Source of users for credential checks.
///
/// Lookups that fail for infrastructure reasons must return
/// `ErrandError::StoreUnavailable` rather than `Ok(None)`, so that an outage
/// is not reported as bad credentials.
#[async_trait]
pub trait UserDirectory: Send + Sync + 'static {
    /// Finds a user by principal id.
    async fn find_by_id(&self, id: &str) -> ErrandResult<Option<UserRecord>>;

    /// Finds a user by login name.
    async fn find_by_username(&self, username: &str) -> ErrandResult<Option<UserRecord>>;
}

/// In-process user directory with sequential numeric ids.
#[derive(Debug, Default)]
pub struct InMemoryUserDirectory {
    users: RwLock<HashMap<String, UserRecord>>,
    next_id: AtomicU64,
}

impl InMemoryUserDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Hashes `password` and stores a new user, returning its principal.
    pub fn add_user(&self, username: &str, password: &str) -> Result<Principal, PasswordError> {
        let password_hash = hash_password(password)?;
        let id = (self.next_id.fetch_add(1, Ordering::Relaxed) + 1).to_string();
        let principal = Principal::new(id.clone(), username);

        self.users.write().insert(
            id,
            UserRecord {
                principal: principal.clone(),
                password_hash,
            },
        );
        Ok(principal)
    }

    /// Removes a user. Returns `true` if it existed.
    pub fn remove_user(&self, id: &str) -> bool {
        self.users.write().remove(id).is_some()
    }

    /// Returns the number of stored users.
    pub fn len(&self) -> usize {
        self.users.read().len()
    }

    /// Returns `true` if no users are stored.
    pub fn is_empty(&self) -> bool {
        self.users.read().is_empty()
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_by_id(&self, id: &str) -> ErrandResult<Option<UserRecord>> {
        Ok(self.users.read().get(id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> ErrandResult<Option<UserRecord>> {
        Ok(self
            .users
            .read()
            .values()
            .find(|record| record.principal.username == username)
            .cloned())
    }
}
