//! Custom Axum extractors for session auth and lenient JSON bodies
//!
//! These extractors keep the auth policy and body parsing out of the handlers.

use super::errors::ApiError;
use super::handlers::AppState;
use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRef, FromRequest, FromRequestParts, Request},
    http::{header, request::Parts, HeaderMap},
};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::warn;

/// Maximum accepted request body.
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Extract the session token named `cookie_name` from the Cookie header.
pub fn extract_session_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .find_map(|part| {
            let (name, value) = part.trim().split_once('=')?;
            (name == cookie_name && !value.is_empty()).then(|| value.to_string())
        })
}

/// Resolve `token` to the account it belongs to. A session whose account no
/// longer exists is dropped and reads as logged out.
pub fn resolve_account(state: &AppState, token: &str) -> Result<Option<String>, ApiError> {
    let Some(username) = state.sessions.resolve(token) else {
        return Ok(None);
    };
    if state.users.user(&username)?.is_some() {
        return Ok(Some(username));
    }
    warn!("Dropping session bound to unknown user '{}'", username);
    if let Err(e) = state.sessions.remove(token) {
        warn!("Could not save sessions: {}", e);
    }
    Ok(None)
}

/// Authenticated session.
///
/// Resolving the session renews its expiry. Returns
/// `ApiError::Unauthenticated` if the cookie is missing, unknown or expired,
/// or if its account is gone.
///
/// # Example
/// ```ignore
/// async fn change_password(
///     State(state): State<Arc<AppState>>,
///     user: SessionUser,
///     JsonBody(body): JsonBody,
/// ) -> Result<Response, ApiError> {
///     // user.username is the account bound to the cookie
/// }
/// ```
#[derive(Debug, Clone)]
pub struct SessionUser {
    pub username: String,
    pub token: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for SessionUser
where
    S: Send + Sync,
    Arc<AppState>: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = Arc::<AppState>::from_ref(state);
        let token = extract_session_token(&parts.headers, &app_state.cookie_name)
            .ok_or_else(ApiError::authentication_required)?;
        let username = resolve_account(&app_state, &token)?
            .ok_or_else(ApiError::authentication_required)?;
        Ok(SessionUser { username, token })
    }
}

/// Authenticated session whose account has no pending forced password change.
///
/// Required for editing the dashboard and for the icon endpoints.
#[derive(Debug, Clone)]
pub struct EditorUser(pub SessionUser);

impl std::ops::Deref for EditorUser {
    type Target = SessionUser;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for EditorUser
where
    S: Send + Sync,
    Arc<AppState>: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = SessionUser::from_request_parts(parts, state).await?;
        let app_state = Arc::<AppState>::from_ref(state);
        if app_state.users.requires_password_change(&user.username)? {
            return Err(ApiError::PasswordChangeRequired);
        }
        Ok(EditorUser(user))
    }
}

/// JSON object body. An empty body (or `null`) reads as `{}`; anything that
/// is not a JSON object is rejected with "Invalid JSON body.".
#[derive(Debug, Clone, Default)]
pub struct JsonBody(pub Map<String, Value>);

impl JsonBody {
    /// String view of a field: strings as-is, numbers and booleans in their
    /// JSON form, everything else (including absent) empty.
    pub fn string(&self, key: &str) -> String {
        match self.0.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(v @ (Value::Number(_) | Value::Bool(_))) => v.to_string(),
            _ => String::new(),
        }
    }

    /// Like [`JsonBody::string`], trimmed.
    pub fn trimmed(&self, key: &str) -> String {
        self.string(key).trim().to_string()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn take(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }
}

pub fn parse_json_body(raw: &[u8]) -> Result<JsonBody, ApiError> {
    if raw.trim_ascii().is_empty() {
        return Ok(JsonBody::default());
    }
    match serde_json::from_slice::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(JsonBody(map)),
        Ok(Value::Null) => Ok(JsonBody::default()),
        _ => Err(ApiError::InvalidInput("Invalid JSON body.".to_string())),
    }
}

#[async_trait]
impl<S> FromRequest<S> for JsonBody
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let raw = Bytes::from_request(req, state)
            .await
            .map_err(|_| ApiError::InvalidInput("Failed to read request body.".to_string()))?;
        parse_json_body(&raw)
    }
}
