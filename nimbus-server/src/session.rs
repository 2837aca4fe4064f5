//! Cookie sessions
//!
//! The session token lives in an HTTP-only cookie and maps to a row in the
//! `sessions` table. Handlers opt in through the `CurrentUser` (login
//! required) and `MaybeUser` (login optional) extractors.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use chrono::Duration;
use nimbus_common::db::{sessions, User};

use crate::{ApiError, ApiResult, AppState};

/// Session cookie name
pub const SESSION_COOKIE: &str = "nimbus_session";

/// Cookie carrying the OAuth `state` value between redirect and callback
pub const OAUTH_STATE_COOKIE: &str = "nimbus_oauth_state";

/// Find a cookie value in the request headers
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.to_string())
        .filter(|v| !v.is_empty())
}

/// `Set-Cookie` value for an HTTP-only cookie living `max_age`
pub fn build_cookie(name: &str, value: &str, max_age: Duration) -> String {
    format!(
        "{}={}; HttpOnly; Path=/; SameSite=Lax; Max-Age={}",
        name,
        value,
        max_age.num_seconds().max(0)
    )
}

/// `Set-Cookie` value that removes `name`
pub fn clear_cookie(name: &str) -> String {
    build_cookie(name, "", Duration::zero())
}

/// Create a session for `user_id` and return its `Set-Cookie` value
pub async fn start_session(state: &AppState, user_id: i64) -> ApiResult<String> {
    let ttl = state.config.session_ttl;
    let token = sessions::create_session(&state.db, user_id, ttl).await?;
    Ok(build_cookie(SESSION_COOKIE, &token, ttl))
}

async fn lookup(parts: &Parts, state: &AppState) -> ApiResult<Option<(User, String)>> {
    let Some(token) = read_cookie(&parts.headers, SESSION_COOKIE) else {
        return Ok(None);
    };
    let user = sessions::find_session_user(&state.db, &token).await?;
    Ok(user.map(|u| (u, token)))
}

/// Logged-in user; rejects with 401 when there is no valid session
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: User,
    pub token: String,
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match lookup(parts, state).await? {
            Some((user, token)) => Ok(CurrentUser { user, token }),
            None => Err(ApiError::authentication_required()),
        }
    }
}

/// Logged-in user if any
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<User>);

#[async_trait]
impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(lookup(parts, state).await?.map(|(user, _)| user)))
    }
}
