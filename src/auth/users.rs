//! On-disk credential store (`users.json`) for the single admin account.

use super::password::{dummy_verify, PasswordRecord, DEFAULT_ITERATIONS, MIN_PASSWORD_LEN};
use crate::persist::{read_json, write_json_atomic, PersistError};
use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{info, warn};

/// Credential store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Username must be 3-40 chars and use only letters, numbers, dot, dash or underscore.")]
    InvalidUsername,

    #[error("Password must be at least 4 characters.")]
    WeakPassword,

    #[error("An admin account is already configured.")]
    AlreadyConfigured,

    #[error("Username already exists.")]
    UsernameTaken,

    #[error("Current password is incorrect.")]
    InvalidCredentials,

    #[error("Failed to save users: {0}")]
    Persist(#[from] PersistError),
}

/// Public view of an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub username: String,
    pub must_change_password: bool,
}

/// Shape of `users.json`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct UsersDocument {
    #[serde(default)]
    users: BTreeMap<String, PasswordRecord>,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

impl UsersDocument {
    fn has_users(&self) -> bool {
        self.users.keys().any(|k| !k.trim().is_empty())
    }
}

/// Returns true if `username` is 3-40 chars of `[A-Za-z0-9._-]`.
pub fn valid_username(username: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9._-]{3,40}$").expect("static regex"))
        .is_match(username)
}

fn check_password_strength(password: &str) -> Result<(), StoreError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(StoreError::WeakPassword);
    }
    Ok(())
}

/// File-backed store holding at most one admin account.
///
/// The file is the source of truth: every operation reads it under the
/// store's lock, and mutations write it back atomically before the lock is
/// released. Password derivation is CPU-heavy, so callers on the async
/// runtime should invoke these methods via `spawn_blocking`.
pub struct CredentialStore {
    path: PathBuf,
    iterations: u32,
    lock: Mutex<()>,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_iterations(path, DEFAULT_ITERATIONS)
    }

    /// Use a custom PBKDF2 work factor for newly written records.
    pub fn with_iterations(path: impl Into<PathBuf>, iterations: u32) -> Self {
        Self {
            path: path.into(),
            iterations: iterations.max(1),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create an empty `{"users": {}}` file if none exists yet.
    pub fn ensure_file(&self) -> Result<(), StoreError> {
        let _guard = self.lock.lock();
        if !self.path.exists() {
            write_json_atomic(&self.path, &UsersDocument::default())?;
        }
        Ok(())
    }

    fn load(&self) -> Result<UsersDocument, StoreError> {
        Ok(read_json(&self.path)?.unwrap_or_default())
    }

    fn save(&self, doc: &UsersDocument) -> Result<(), StoreError> {
        write_json_atomic(&self.path, doc).map_err(|e| {
            warn!("Failed to persist {}: {}", self.path.display(), e);
            StoreError::Persist(e)
        })
    }

    /// True once the admin account has been created.
    pub fn has_users(&self) -> Result<bool, StoreError> {
        let _guard = self.lock.lock();
        Ok(self.load()?.has_users())
    }

    /// Look up an account without touching its credential.
    pub fn user(&self, username: &str) -> Result<Option<User>, StoreError> {
        let _guard = self.lock.lock();
        Ok(self.load()?.users.get(username).map(|rec| User {
            username: username.to_string(),
            must_change_password: rec.must_change_password,
        }))
    }

    /// Whether policy blocks `username` from editing until the password is
    /// changed. An unknown account is always blocked.
    pub fn requires_password_change(&self, username: &str) -> Result<bool, StoreError> {
        Ok(self
            .user(username)?
            .map(|u| u.must_change_password)
            .unwrap_or(true))
    }

    /// Create the one and only admin account.
    pub fn bootstrap(&self, username: &str, password: &str) -> Result<User, StoreError> {
        let _guard = self.lock.lock();
        let mut doc = self.load()?;
        if doc.has_users() {
            return Err(StoreError::AlreadyConfigured);
        }

        let username = username.trim();
        if !valid_username(username) {
            return Err(StoreError::InvalidUsername);
        }
        check_password_strength(password)?;

        doc.users.clear();
        doc.users.insert(
            username.to_string(),
            PasswordRecord::new(password, self.iterations),
        );
        self.save(&doc)?;

        info!("Admin account '{}' created", username);
        Ok(User {
            username: username.to_string(),
            must_change_password: false,
        })
    }

    /// Check a username/password pair. A missing account costs the same
    /// derivation as a wrong password.
    pub fn verify(&self, username: &str, password: &str) -> Result<bool, StoreError> {
        let record = {
            let _guard = self.lock.lock();
            self.load()?.users.get(username).cloned()
        };
        Ok(match record {
            Some(rec) => rec.verify(password),
            None => {
                dummy_verify(password, self.iterations);
                false
            }
        })
    }

    /// Rename the account after re-checking its password.
    pub fn change_username(
        &self,
        old_username: &str,
        current_password: &str,
        new_username: &str,
    ) -> Result<User, StoreError> {
        let new_username = new_username.trim();
        if !valid_username(new_username) {
            return Err(StoreError::InvalidUsername);
        }

        let _guard = self.lock.lock();
        let mut doc = self.load()?;
        let record = match doc.users.get(old_username) {
            Some(rec) if rec.verify(current_password) => rec.clone(),
            Some(_) => return Err(StoreError::InvalidCredentials),
            None => {
                dummy_verify(current_password, self.iterations);
                return Err(StoreError::InvalidCredentials);
            }
        };

        if new_username != old_username {
            if doc.users.contains_key(new_username) {
                return Err(StoreError::UsernameTaken);
            }
            doc.users.remove(old_username);
            doc.users.insert(new_username.to_string(), record.clone());
            self.save(&doc)?;
            info!("Admin account renamed '{}' -> '{}'", old_username, new_username);
        }

        Ok(User {
            username: new_username.to_string(),
            must_change_password: record.must_change_password,
        })
    }

    /// Replace the password and clear any pending forced change.
    pub fn change_password(
        &self,
        username: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), StoreError> {
        check_password_strength(new_password)?;

        let _guard = self.lock.lock();
        let mut doc = self.load()?;
        let extra = match doc.users.get(username) {
            Some(rec) if rec.verify(current_password) => rec.extra.clone(),
            Some(_) => return Err(StoreError::InvalidCredentials),
            None => {
                dummy_verify(current_password, self.iterations);
                return Err(StoreError::InvalidCredentials);
            }
        };

        let mut record = PasswordRecord::new(new_password, self.iterations);
        record.extra = extra;
        doc.users.insert(username.to_string(), record);
        self.save(&doc)?;

        info!("Password changed for '{}'", username);
        Ok(())
    }
}
