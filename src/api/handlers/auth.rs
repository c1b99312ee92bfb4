//! Account handlers: first-run bootstrap, login/logout, auth status and
//! username/password changes.

use super::{json_ok, json_response, run_blocking, AppState};
use crate::api::errors::ApiError;
use crate::api::extractors::{extract_session_token, resolve_account, JsonBody, SessionUser};
use crate::auth::MIN_PASSWORD_LEN;
use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::response::Response;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AuthStatusResponse {
    authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    must_change_password: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    setup_required: Option<bool>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    ok: bool,
    username: String,
    must_change_password: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    setup_required: Option<bool>,
}

#[derive(Serialize)]
struct OkResponse {
    ok: bool,
}

#[derive(Serialize)]
struct UsernameResponse {
    ok: bool,
    username: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordResponse {
    ok: bool,
    must_change_password: bool,
}

/// Create a session for `username` and build the response carrying its cookie.
fn start_session(state: &AppState, username: &str, body: LoginResponse) -> Result<Response, ApiError> {
    let token = state.sessions.create(username).map_err(|e| {
        warn!("Could not persist new session: {}", e);
        ApiError::Internal("Failed to create session.".to_string())
    })?;
    let mut headers = HeaderMap::new();
    headers.insert(header::SET_COOKIE, state.session_cookie(&token)?);
    Ok(json_response(headers, body))
}

/// GET /api/auth/status: who is logged in, or whether setup is pending.
pub async fn auth_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let username = match extract_session_token(&headers, &state.cookie_name) {
        Some(token) => resolve_account(&state, &token)?,
        None => None,
    };

    let body = match username {
        Some(username) => AuthStatusResponse {
            authenticated: true,
            must_change_password: Some(state.users.requires_password_change(&username)?),
            username: Some(username),
            setup_required: None,
        },
        None => AuthStatusResponse {
            authenticated: false,
            username: None,
            must_change_password: None,
            setup_required: Some(!state.users.has_users()?),
        },
    };
    Ok(json_ok(body))
}

/// POST /api/auth/bootstrap: create the admin account on first run.
pub async fn bootstrap(
    State(state): State<Arc<AppState>>,
    body: JsonBody,
) -> Result<Response, ApiError> {
    let username = body.trimmed("username");
    let password = body.string("password");

    let user = match run_blocking(&state, move |s| s.users.bootstrap(&username, &password)).await
    {
        Ok(user) => user,
        Err(e) => {
            state.record_auth("bootstrap", "rejected");
            return Err(e);
        }
    };
    state.record_auth("bootstrap", "success");

    start_session(
        &state,
        &user.username,
        LoginResponse {
            ok: true,
            username: user.username.clone(),
            must_change_password: false,
            setup_required: Some(false),
        },
    )
}

/// POST /api/login: verify credentials and set the session cookie.
pub async fn login(
    State(state): State<Arc<AppState>>,
    body: JsonBody,
) -> Result<Response, ApiError> {
    let username = body.trimmed("username");
    let password = body.string("password");
    if username.is_empty() || password.is_empty() {
        return Err(ApiError::InvalidInput(
            "Username and password are required.".to_string(),
        ));
    }

    if !state.users.has_users()? {
        return Err(ApiError::Conflict {
            message: "No admin account configured yet. Complete first-time setup.".to_string(),
            setup_required: Some(true),
        });
    }

    let candidate = username.clone();
    let valid = run_blocking(&state, move |s| s.users.verify(&candidate, &password)).await?;
    if !valid {
        state.record_auth("login", "failure");
        warn!("Failed login for '{}'", username);
        return Err(ApiError::Unauthenticated(
            "Invalid username or password.".to_string(),
        ));
    }
    state.record_auth("login", "success");
    info!("User '{}' logged in", username);

    let must_change_password = state.users.requires_password_change(&username)?;
    start_session(
        &state,
        &username,
        LoginResponse {
            ok: true,
            username: username.clone(),
            must_change_password,
            setup_required: None,
        },
    )
}

/// POST /api/logout: drop the session and expire the cookie.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    if let Some(token) = extract_session_token(&headers, &state.cookie_name) {
        if let Err(e) = state.sessions.remove(&token) {
            warn!("Could not persist session removal: {}", e);
        }
    }

    let mut resp_headers = HeaderMap::new();
    resp_headers.insert(header::SET_COOKIE, state.clear_session_cookie()?);
    Ok(json_response(resp_headers, OkResponse { ok: true }))
}

/// POST /api/auth/change-username: `{currentPassword, newUsername}`.
pub async fn change_username(
    State(state): State<Arc<AppState>>,
    user: SessionUser,
    body: JsonBody,
) -> Result<Response, ApiError> {
    let current_password = body.string("currentPassword");
    let new_username = body.trimmed("newUsername");

    let old = user.username.clone();
    let renamed = run_blocking(&state, move |s| {
        s.users.change_username(&old, &current_password, &new_username)
    })
    .await?;

    if renamed.username != user.username {
        state
            .sessions
            .rename(&user.username, &renamed.username)
            .map_err(|e| {
                warn!("Could not persist renamed session: {}", e);
                ApiError::Internal("Failed to update session.".to_string())
            })?;
    }

    Ok(json_ok(UsernameResponse {
        ok: true,
        username: renamed.username,
    }))
}

/// POST /api/auth/change-password: `{currentPassword, newPassword}`.
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    user: SessionUser,
    body: JsonBody,
) -> Result<Response, ApiError> {
    let current_password = body.string("currentPassword");
    let new_password = body.string("newPassword");

    if new_password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::InvalidInput(
            "New password must be at least 4 characters.".to_string(),
        ));
    }

    let username = user.username.clone();
    run_blocking(&state, move |s| {
        s.users
            .change_password(&username, &current_password, &new_password)
    })
    .await?;

    Ok(json_ok(PasswordResponse {
        ok: true,
        must_change_password: false,
    }))
}
