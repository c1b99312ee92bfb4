//! Static dashboard assets and private icon files.
//!
//! Both are plain sandboxed reads: the request path is decoded, cleaned
//! lexically and checked against an extension allow-list before the file
//! system is touched, and the resolved path must stay under its root.

use super::errors::ApiError;
use super::handlers::AppState;
use axum::extract::rejection::PathRejection;
use axum::extract::{Path as UrlPath, State};
use axum::http::{header, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

const STATIC_EXTENSIONS: &[&str] = &[
    "html", "js", "json", "css", "svg", "png", "jpg", "jpeg", "gif", "webp", "ico", "txt",
];

const ICON_EXTENSIONS: &[&str] = &["svg", "png", "jpg", "jpeg", "gif", "webp", "ico"];

/// Where a static request ends up.
#[derive(Debug, PartialEq, Eq)]
enum StaticTarget {
    Redirect(&'static str),
    File(String),
    Reject,
}

fn redirect_target(path: &str) -> Option<&'static str> {
    match path {
        "/index.html" => Some("/"),
        "/admin.html" | "/admin" | "/edit.html" | "/edit/" => Some("/edit"),
        _ => None,
    }
}

/// Lexically clean a relative path. `None` when `..` climbs above the root.
fn clean_relative(path: &str) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            s => parts.push(s),
        }
    }
    Some(parts.join("/"))
}

fn extension(path: &str) -> Option<String> {
    let name = path.rsplit('/').next()?;
    let (_, ext) = name.rsplit_once('.')?;
    Some(ext.to_ascii_lowercase())
}

/// Map a decoded request path to a redirect, an app-root relative file, or a
/// rejection.
fn resolve_static(path: &str) -> StaticTarget {
    if let Some(location) = redirect_target(path) {
        return StaticTarget::Redirect(location);
    }

    let relative = match path {
        "" | "/" | "/edit" => "index.html".to_string(),
        p if p.ends_with('/') => format!("{}/index.html", p.trim_matches('/')),
        p => p.trim_start_matches('/').to_string(),
    };
    let Some(mut relative) = clean_relative(&relative) else {
        return StaticTarget::Reject;
    };
    if relative.is_empty() {
        relative = "index.html".to_string();
    }

    if relative.starts_with("backend/")
        || relative.starts_with("ops/")
        || relative.starts_with('.')
        || relative.contains("/.")
    {
        return StaticTarget::Reject;
    }
    match extension(&relative) {
        Some(ext) if STATIC_EXTENSIONS.contains(&ext.as_str()) => StaticTarget::File(relative),
        _ => StaticTarget::Reject,
    }
}

fn static_content_type(path: &str) -> String {
    match extension(path).as_deref() {
        Some("html") => "text/html; charset=utf-8".to_string(),
        Some("js") => "application/javascript; charset=utf-8".to_string(),
        Some("json") => "application/json; charset=utf-8".to_string(),
        Some("css") => "text/css; charset=utf-8".to_string(),
        _ => {
            let mime = mime_guess::from_path(path).first_or_octet_stream();
            if mime.type_() == mime_guess::mime::TEXT {
                format!("{}; charset=utf-8", mime.essence_str())
            } else {
                mime.essence_str().to_string()
            }
        }
    }
}

fn icon_content_type(name: &str) -> String {
    match extension(name).as_deref() {
        Some("svg") => "image/svg+xml".to_string(),
        _ => mime_guess::from_path(name)
            .first_or_octet_stream()
            .essence_str()
            .to_string(),
    }
}

/// Validate a private icon file name: a single non-hidden path segment.
fn valid_icon_name(name: &str) -> bool {
    !name.is_empty()
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains("..")
        && !name.starts_with('.')
        && extension(name).is_some_and(|ext| ICON_EXTENSIONS.contains(&ext.as_str()))
}

fn bytes_response(body: Vec<u8>, content_type: &str) -> Response {
    let content_type = HeaderValue::from_str(content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, HeaderValue::from_static("no-store")),
        ],
        body,
    )
        .into_response()
}

fn redirect_response(location: &str) -> Response {
    let location =
        HeaderValue::from_str(location).unwrap_or_else(|_| HeaderValue::from_static("/"));
    (
        StatusCode::FOUND,
        [
            (header::LOCATION, location),
            (header::CACHE_CONTROL, HeaderValue::from_static("no-store")),
        ],
    )
        .into_response()
}

/// Read `relative` under `root`, refusing anything that resolves outside it
/// (symlinks included). `Ok(None)` means "not servable".
async fn read_under_root(root: &Path, relative: &str) -> Result<Option<Vec<u8>>, ApiError> {
    let root = match tokio::fs::canonicalize(root).await {
        Ok(root) => root,
        Err(e) => {
            debug!("Root {} unavailable: {}", root.display(), e);
            return Ok(None);
        }
    };
    let candidate: PathBuf = root.join(relative);
    let resolved = match tokio::fs::canonicalize(&candidate).await {
        Ok(path) => path,
        Err(_) => return Ok(None),
    };
    if !resolved.starts_with(&root) {
        warn!("Refusing path outside root: {}", resolved.display());
        return Ok(None);
    }
    match tokio::fs::metadata(&resolved).await {
        Ok(meta) if meta.is_file() => {}
        _ => return Ok(None),
    }
    tokio::fs::read(&resolved).await.map(Some).map_err(|e| {
        warn!("Failed to read {}: {}", resolved.display(), e);
        ApiError::Internal("Failed to read static file.".to_string())
    })
}

/// Router fallback: dashboard assets from the app root, 404 JSON otherwise.
pub async fn static_fallback(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
) -> Result<Response, ApiError> {
    if method != Method::GET {
        return Err(ApiError::not_found());
    }
    let Ok(path) = urlencoding::decode(uri.path()) else {
        return Err(ApiError::not_found());
    };
    if path.starts_with("/icons/") {
        return Err(ApiError::not_found());
    }

    match resolve_static(&path) {
        StaticTarget::Redirect(location) => {
            let location = match uri.query() {
                Some(q) if !q.is_empty() => format!("{location}?{q}"),
                _ => location.to_string(),
            };
            Ok(redirect_response(&location))
        }
        StaticTarget::File(relative) => match read_under_root(&state.app_root, &relative).await? {
            Some(body) => Ok(bytes_response(body, &static_content_type(&relative))),
            None => Err(ApiError::not_found()),
        },
        StaticTarget::Reject => Err(ApiError::not_found()),
    }
}

/// GET /icons/*file: user-provided icons from the private icons directory.
pub async fn private_icon(
    State(state): State<Arc<AppState>>,
    file: Result<UrlPath<String>, PathRejection>,
) -> Result<Response, ApiError> {
    let UrlPath(name) =
        file.map_err(|_| ApiError::InvalidInput("Invalid icon path.".to_string()))?;
    let name = name.trim();
    if !valid_icon_name(name) {
        return Err(ApiError::not_found());
    }

    match read_under_root(&state.private_icons_dir, name)
        .await
        .map_err(|_| ApiError::Internal("Failed to read icon file.".to_string()))?
    {
        Some(body) => Ok(bytes_response(body, &icon_content_type(name))),
        None => Err(ApiError::not_found()),
    }
}
