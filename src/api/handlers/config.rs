//! Dashboard configuration handlers.

use super::{json_ok, AppState};
use crate::api::errors::ApiError;
use crate::api::extractors::{EditorUser, JsonBody};
use crate::dashboard::DashboardConfig;
use axum::extract::State;
use axum::response::Response;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Serialize)]
struct ConfigResponse {
    config: DashboardConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SaveConfigResponse {
    ok: bool,
    saved_by: String,
    config: DashboardConfig,
}

/// GET /api/config: public read of the dashboard document.
pub async fn get_config(State(state): State<Arc<AppState>>) -> Response {
    json_ok(ConfigResponse {
        config: state.dashboard.load(),
    })
}

/// POST /api/config: `{config}`; normalized, persisted and echoed back.
pub async fn save_config(
    State(state): State<Arc<AppState>>,
    user: EditorUser,
    mut body: JsonBody,
) -> Result<Response, ApiError> {
    let value = body
        .take("config")
        .ok_or_else(|| ApiError::InvalidInput("Missing config payload.".to_string()))?;

    let saved = state.dashboard.save(value).map_err(|e| {
        error!("Failed to save dashboard config: {}", e);
        ApiError::Internal("Failed to save config.".to_string())
    })?;
    info!("Dashboard config saved by '{}'", user.username);

    Ok(json_ok(SaveConfigResponse {
        ok: true,
        saved_by: user.username.clone(),
        config: saved,
    }))
}
