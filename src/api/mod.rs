//! HTTP API: routing, extractors, handlers and static file serving

mod errors;
mod extractors;
pub mod handlers;
mod static_files;

pub use errors::{ApiError, PASSWORD_CHANGE_REQUIRED};
pub use extractors::{extract_session_token, EditorUser, JsonBody, SessionUser, MAX_BODY_BYTES};
pub use static_files::{private_icon, static_fallback};

use crate::metrics::{http_metrics_middleware, metrics_handler};
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use handlers::{
    auth_status, bootstrap, change_password, change_username, get_config, health_check,
    import_iconify, import_selfhst, login, logout, save_config, search_icons, version, AppState,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

async fn not_found() -> ApiError {
    ApiError::not_found()
}

/// Build the application router.
///
/// Routes:
///   GET  /health, /api/version, /metrics
///   GET  /api/config (public), POST /api/config (editor)
///   GET  /api/auth/status
///   POST /api/auth/bootstrap, /api/login, /api/logout
///   POST /api/auth/change-username, /api/auth/change-password (session)
///   GET  /api/icons/search, POST /api/icons/import-* (editor)
///   GET  /icons/{file} - private icons
///   everything else - static dashboard assets, or 404 JSON
///
/// A known path hit with the wrong method answers 404 like an unknown path.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check).fallback(not_found))
        .route("/metrics", get(metrics_handler).fallback(not_found))
        .route("/api/version", get(version).fallback(not_found))
        .route(
            "/api/config",
            get(get_config).post(save_config).fallback(not_found),
        )
        .route("/api/auth/status", get(auth_status).fallback(not_found))
        .route("/api/auth/bootstrap", post(bootstrap).fallback(not_found))
        .route("/api/login", post(login).fallback(not_found))
        .route("/api/logout", post(logout).fallback(not_found))
        .route(
            "/api/auth/change-username",
            post(change_username).fallback(not_found),
        )
        .route(
            "/api/auth/change-password",
            post(change_password).fallback(not_found),
        )
        .route("/api/icons/search", get(search_icons).fallback(not_found))
        .route(
            "/api/icons/import-selfhst",
            post(import_selfhst).fallback(not_found),
        )
        .route(
            "/api/icons/import-iconify",
            post(import_iconify).fallback(not_found),
        )
        .route("/icons/*file", get(private_icon).fallback(not_found))
        .fallback(static_fallback)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            http_metrics_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
