//! Icon search and import handlers.

use super::{json_ok, AppState};
use crate::api::errors::ApiError;
use crate::api::extractors::{EditorUser, JsonBody};
use crate::icons::{IconError, IconFormat, ImportedIcon};
use axum::extract::{Query, State};
use axum::response::Response;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Query parameters for GET /api/icons/search
#[derive(Debug, Deserialize, Default)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
    /// Kept as text so a malformed value falls back to the default limit.
    #[serde(default)]
    pub limit: Option<String>,
    #[serde(default)]
    pub source: String,
}

#[derive(Serialize)]
struct ImportResponse {
    ok: bool,
    #[serde(flatten)]
    icon: ImportedIcon,
}

/// GET /api/icons/search?q=&limit=&source=
pub async fn search_icons(
    State(state): State<Arc<AppState>>,
    _user: EditorUser,
    Query(query): Query<SearchQuery>,
) -> Result<Response, ApiError> {
    let limit = query
        .limit
        .as_deref()
        .and_then(|l| l.trim().parse::<i64>().ok());

    let outcome = state
        .icons
        .search(&query.q, limit, &query.source)
        .await
        .map_err(|e| match e {
            IconError::Upstream(msg) => {
                ApiError::UpstreamUnavailable(format!("Icon search source unavailable: {msg}"))
            }
            other => other.into(),
        })?;
    Ok(json_ok(outcome))
}

/// POST /api/icons/import-selfhst: `{reference, format}`
pub async fn import_selfhst(
    State(state): State<Arc<AppState>>,
    _user: EditorUser,
    body: JsonBody,
) -> Result<Response, ApiError> {
    let reference = body.trimmed("reference");
    let format = IconFormat::from_request(&body.string("format"));

    let icon = state.icons.import_from_catalog(&reference, format).await?;
    Ok(json_ok(ImportResponse { ok: true, icon }))
}

/// POST /api/icons/import-iconify: `{name, format, source}`
pub async fn import_iconify(
    State(state): State<Arc<AppState>>,
    _user: EditorUser,
    body: JsonBody,
) -> Result<Response, ApiError> {
    let name = body.trimmed("name");
    let source_hint = body.trimmed("source");
    let format = IconFormat::from_request(&body.string("format"));

    let icon = state
        .icons
        .import_from_iconify(&name, format, &source_hint)
        .await?;
    Ok(json_ok(ImportResponse { ok: true, icon }))
}
