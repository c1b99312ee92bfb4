//! Session table for cookie authentication, persisted to `sessions.json`.
//!
//! Tokens are 32 random bytes, base64url-encoded without padding. Expiry
//! slides forward every time a token is resolved, so with the default TTL a
//! session effectively lives until logout.

use crate::persist::{read_json, write_json_atomic, PersistError};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Default session TTL: ten years.
pub const DEFAULT_SESSION_TTL_SECS: i64 = 315_360_000;

/// Upper bound keeps `now + ttl` far from chrono's range limits.
const MAX_SESSION_TTL_SECS: i64 = 100 * 365 * 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "StoredSession")]
pub struct SessionInfo {
    pub username: String,
    pub expires_at: DateTime<Utc>,
}

/// On-disk session entry. Older installs wrote `{"Username", "Expires"}`
/// with the expiry in unix seconds; those are read and rewritten on save.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredSession {
    #[serde(rename_all = "camelCase")]
    Current {
        username: String,
        expires_at: DateTime<Utc>,
    },
    Legacy {
        #[serde(rename = "Username")]
        username: String,
        #[serde(rename = "Expires")]
        expires: i64,
    },
}

impl From<StoredSession> for SessionInfo {
    fn from(stored: StoredSession) -> Self {
        match stored {
            StoredSession::Current {
                username,
                expires_at,
            } => SessionInfo {
                username,
                expires_at,
            },
            // Out-of-range timestamps fall back to the epoch and get pruned.
            StoredSession::Legacy { username, expires } => SessionInfo {
                username,
                expires_at: DateTime::from_timestamp(expires, 0).unwrap_or_default(),
            },
        }
    }
}

/// Thread-safe session table with write-through persistence.
pub struct SessionManager {
    path: Option<PathBuf>,
    ttl_secs: i64,
    sessions: Mutex<HashMap<String, SessionInfo>>,
}

impl SessionManager {
    /// Session table that is never written to disk.
    pub fn in_memory(ttl_secs: i64) -> Self {
        Self {
            path: None,
            ttl_secs: ttl_secs.clamp(0, MAX_SESSION_TTL_SECS),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Load sessions from `path`, discarding entries that already expired.
    /// A missing or unreadable file starts an empty table.
    pub fn load(path: impl Into<PathBuf>, ttl_secs: i64) -> Self {
        let path = path.into();
        let mut manager = Self::in_memory(ttl_secs);

        match read_json::<HashMap<String, SessionInfo>>(&path) {
            Ok(Some(stored)) => {
                let now = Utc::now();
                let live: HashMap<_, _> = stored
                    .into_iter()
                    .filter(|(_, s)| s.expires_at > now)
                    .collect();
                debug!("Loaded {} live session(s) from {}", live.len(), path.display());
                manager.sessions = Mutex::new(live);
            }
            Ok(None) => {}
            Err(e) => warn!("Could not parse sessions file {}: {}", path.display(), e),
        }

        manager.path = Some(path);
        manager
    }

    /// Session lifetime in seconds (also the cookie Max-Age).
    pub fn ttl_secs(&self) -> i64 {
        self.ttl_secs
    }

    fn next_expiry(&self) -> DateTime<Utc> {
        Utc::now() + Duration::seconds(self.ttl_secs)
    }

    fn persist_locked(&self, sessions: &HashMap<String, SessionInfo>) -> Result<(), PersistError> {
        match &self.path {
            Some(path) => write_json_atomic(path, sessions),
            None => Ok(()),
        }
    }

    fn prune_locked(sessions: &mut HashMap<String, SessionInfo>) -> usize {
        let now = Utc::now();
        let before = sessions.len();
        sessions.retain(|_, s| s.expires_at > now);
        before - sessions.len()
    }

    /// Create a session for `username` and return its token.
    pub fn create(&self, username: &str) -> Result<String, PersistError> {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill(&mut bytes);
        let token = URL_SAFE_NO_PAD.encode(bytes);

        let mut sessions = self.sessions.lock();
        Self::prune_locked(&mut sessions);
        sessions.insert(
            token.clone(),
            SessionInfo {
                username: username.to_string(),
                expires_at: self.next_expiry(),
            },
        );
        if let Err(e) = self.persist_locked(&sessions) {
            sessions.remove(&token);
            return Err(e);
        }

        Ok(token)
    }

    /// Resolve a token to its username, renewing the expiry on a hit.
    pub fn resolve(&self, token: &str) -> Option<String> {
        if token.is_empty() {
            return None;
        }
        let mut sessions = self.sessions.lock();
        let pruned = Self::prune_locked(&mut sessions);

        let expires_at = self.next_expiry();
        let username = match sessions.get_mut(token) {
            Some(info) => {
                info.expires_at = expires_at;
                Some(info.username.clone())
            }
            None => None,
        };

        if username.is_some() || pruned > 0 {
            if let Err(e) = self.persist_locked(&sessions) {
                warn!("Could not save sessions: {}", e);
            }
        }
        username
    }

    /// Remove a session (logout).
    pub fn remove(&self, token: &str) -> Result<(), PersistError> {
        let mut sessions = self.sessions.lock();
        if sessions.remove(token).is_some() {
            self.persist_locked(&sessions)?;
        }
        Ok(())
    }

    /// Rebind every session owned by `old_username` to `new_username` and
    /// return how many moved. On a failed save the table is left unchanged.
    pub fn rename(&self, old_username: &str, new_username: &str) -> Result<usize, PersistError> {
        let mut sessions = self.sessions.lock();
        Self::prune_locked(&mut sessions);

        let owned: Vec<String> = sessions
            .iter()
            .filter(|(_, info)| info.username == old_username)
            .map(|(token, _)| token.clone())
            .collect();
        if owned.is_empty() || old_username == new_username {
            return Ok(0);
        }

        for token in &owned {
            if let Some(info) = sessions.get_mut(token) {
                info.username = new_username.to_string();
            }
        }
        if let Err(e) = self.persist_locked(&sessions) {
            for token in &owned {
                if let Some(info) = sessions.get_mut(token) {
                    info.username = old_username.to_string();
                }
            }
            return Err(e);
        }
        debug!(
            "Moved {} session(s) from '{}' to '{}'",
            owned.len(),
            old_username,
            new_username
        );
        Ok(owned.len())
    }

    /// Current expiry of a token without renewing it.
    pub fn expires_at(&self, token: &str) -> Option<DateTime<Utc>> {
        self.sessions.lock().get(token).map(|s| s.expires_at)
    }

    /// Number of sessions in the table (expired ones included until pruned).
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
