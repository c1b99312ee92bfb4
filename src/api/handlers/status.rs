//! Health-check and version handlers.

use super::json_ok;
use axum::response::Response;
use serde::Serialize;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
}

/// GET /health
pub async fn health_check() -> Response {
    json_ok(HealthResponse { ok: true })
}

/// Version response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionResponse {
    pub version: &'static str,
    pub build_time: &'static str,
}

/// GET /api/version
pub async fn version() -> Response {
    json_ok(VersionResponse {
        version: env!("CARGO_PKG_VERSION"),
        build_time: env!("KISS_BUILD_TIME"),
    })
}
