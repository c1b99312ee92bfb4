//! HTTP request handlers
//!
//! Split into submodules by domain:
//! - `auth`: bootstrap, login/logout, account changes, auth status
//! - `config`: dashboard configuration read/write
//! - `icons`: icon search and import
//! - `status`: health check and version

mod auth;
mod config;
mod icons;
mod status;

use super::errors::ApiError;
use crate::auth::{CredentialStore, StoreError};
use crate::config::Config;
use crate::dashboard::DashboardStore;
use crate::icons::{IconService, Upstream};
use crate::metrics::Metrics;
use crate::session::SessionManager;
use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

// Re-export all public handlers so the router can name them directly.
pub use auth::{auth_status, bootstrap, change_password, change_username, login, logout};
pub use config::{get_config, save_config};
pub use icons::{import_iconify, import_selfhst, search_icons, SearchQuery};
pub use status::{health_check, version, HealthResponse, VersionResponse};

/// Application state shared across handlers
pub struct AppState {
    pub users: CredentialStore,
    pub sessions: SessionManager,
    pub dashboard: DashboardStore,
    pub icons: IconService,
    pub metrics: Option<Metrics>,
    pub cookie_name: String,
    pub app_root: PathBuf,
    pub private_icons_dir: PathBuf,
    data_dir: PathBuf,
    default_config: Option<PathBuf>,
}

impl AppState {
    /// Wire every component from `config`. Nothing is read from disk or the
    /// network here except the session table.
    pub fn new(config: &Config, upstream: Arc<dyn Upstream>, metrics: Option<Metrics>) -> Self {
        Self {
            users: CredentialStore::with_iterations(
                config.users_path(),
                config.effective_password_iterations(),
            ),
            sessions: SessionManager::load(config.sessions_path(), config.session_ttl_secs),
            dashboard: DashboardStore::new(config.dashboard_config_path()),
            icons: IconService::new(config.icon_config(), upstream, metrics.clone()),
            metrics,
            cookie_name: config.session_cookie_name.clone(),
            app_root: config.app_root.clone(),
            private_icons_dir: config.private_icons_dir.clone(),
            data_dir: config.data_dir.clone(),
            default_config: config.default_config.clone(),
        }
    }

    /// Create the data directory and seed `dashboard-config.json` and
    /// `users.json` when missing. Existing files are never touched.
    pub fn ensure_files(&self) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.data_dir).map_err(crate::persist::PersistError::from)?;
        self.dashboard
            .ensure_file(self.default_config.as_deref())?;
        self.users.ensure_file()
    }

    fn cookie_header(&self, value: &str, max_age: i64) -> Result<HeaderValue, ApiError> {
        let cookie = format!(
            "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}",
            self.cookie_name, value, max_age
        );
        HeaderValue::from_str(&cookie)
            .map_err(|_| ApiError::Internal("Failed to create session.".to_string()))
    }

    /// `Set-Cookie` header carrying a fresh session token.
    pub fn session_cookie(&self, token: &str) -> Result<HeaderValue, ApiError> {
        self.cookie_header(token, self.sessions.ttl_secs())
    }

    /// `Set-Cookie` header that expires the session cookie.
    pub fn clear_session_cookie(&self) -> Result<HeaderValue, ApiError> {
        self.cookie_header("deleted", 0)
    }

    fn record_auth(&self, kind: &str, result: &str) {
        if let Some(m) = &self.metrics {
            m.auth_attempts_total
                .with_label_values(&[kind, result])
                .inc();
        }
    }
}

/// Run a credential store operation on the blocking pool (PBKDF2 is CPU-bound).
async fn run_blocking<T, F>(state: &Arc<AppState>, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&AppState) -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state))
        .await
        .map_err(|e| ApiError::Internal(format!("Worker task failed: {e}")))?
        .map_err(ApiError::from)
}

/// JSON response with `Cache-Control: no-store`.
fn json_response<T: Serialize>(headers: HeaderMap, body: T) -> Response {
    let mut resp = (headers, Json(body)).into_response();
    resp.headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    resp
}

fn json_ok<T: Serialize>(body: T) -> Response {
    json_response(HeaderMap::new(), body)
}
