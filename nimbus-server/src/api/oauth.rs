//! Google sign-in (OAuth 2.0 authorization code flow)

use anyhow::{anyhow, bail, Context};
use axum::{
    extract::{Query, State},
    http::{header, HeaderMap},
    response::{AppendHeaders, IntoResponse, Redirect, Response},
    routing::get,
    Router,
};
use chrono::Duration;
use nimbus_common::auth::generate_token;
use nimbus_common::config::GoogleCredentials;
use nimbus_common::db::{users, NewUser, User};
use serde::Deserialize;
use sqlx::SqlitePool;
use tracing::{error, info, warn};

use crate::session::{build_cookie, clear_cookie, read_cookie, start_session, OAUTH_STATE_COOKIE};
use crate::{ApiError, ApiResult, AppState};

pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v3/userinfo";

const SCOPES: &str = "openid https://www.googleapis.com/auth/userinfo.profile \
                      https://www.googleapis.com/auth/userinfo.email";

/// Lifetime of the state cookie
const STATE_TTL_MINUTES: i64 = 10;

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    email: Option<String>,
    name: Option<String>,
}

/// Authorization endpoint URL for `creds` carrying `state`
pub fn authorization_url(creds: &GoogleCredentials, state: &str) -> anyhow::Result<String> {
    let url = reqwest::Url::parse_with_params(
        GOOGLE_AUTH_URL,
        &[
            ("response_type", "code"),
            ("client_id", creds.client_id.as_str()),
            ("redirect_uri", creds.redirect_uri.as_str()),
            ("scope", SCOPES),
            ("access_type", "offline"),
            ("include_granted_scopes", "true"),
            ("state", state),
        ],
    )?;
    Ok(url.into())
}

/// GET /api/auth/google
pub async fn google_login(State(state): State<AppState>) -> ApiResult<Response> {
    let login_failed = || ApiError::Internal("An error occurred during Google login".to_string());

    let Some(creds) = state.config.google.as_ref() else {
        error!("Google login requested but OAuth is not configured");
        return Err(login_failed());
    };

    let oauth_state = generate_token();
    let url = authorization_url(creds, &oauth_state).map_err(|e| {
        error!("Failed to build Google authorization URL: {}", e);
        login_failed()
    })?;

    let cookie = build_cookie(
        OAUTH_STATE_COOKIE,
        &oauth_state,
        Duration::minutes(STATE_TTL_MINUTES),
    );
    Ok(([(header::SET_COOKIE, cookie)], Redirect::to(&url)).into_response())
}

/// GET /api/auth/google/callback
///
/// Always answers with a redirect back to the frontend.
pub async fn google_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Response {
    let frontend = &state.config.frontend_url;
    let clear_state = (header::SET_COOKIE, clear_cookie(OAUTH_STATE_COOKIE));

    let user = match complete_login(&state, &headers, params).await {
        Ok(user) => user,
        Err(e) => {
            warn!("Google login failed: {:#}", e);
            return (
                [clear_state],
                Redirect::to(&format!("{}/auth/error", frontend)),
            )
                .into_response();
        }
    };

    match start_session(&state, user.id).await {
        Ok(session) => {
            info!(user_id = user.id, "User logged in with Google");
            (
                AppendHeaders([clear_state, (header::SET_COOKIE, session)]),
                Redirect::to(&format!("{}/auth/success", frontend)),
            )
                .into_response()
        }
        Err(e) => {
            error!("Failed to start session after Google login: {}", e);
            (
                [clear_state],
                Redirect::to(&format!("{}/auth/error", frontend)),
            )
                .into_response()
        }
    }
}

async fn complete_login(
    state: &AppState,
    headers: &HeaderMap,
    params: CallbackParams,
) -> anyhow::Result<User> {
    let creds = state
        .config
        .google
        .as_ref()
        .ok_or_else(|| anyhow!("OAuth is not configured"))?;

    if let Some(err) = params.error {
        bail!("authorization denied: {}", err);
    }

    let expected = read_cookie(headers, OAUTH_STATE_COOKIE).context("missing state cookie")?;
    if params.state.as_deref() != Some(expected.as_str()) {
        bail!("state mismatch");
    }
    let code = params.code.context("missing authorization code")?;

    let token: TokenResponse = state
        .http
        .post(GOOGLE_TOKEN_URL)
        .form(&[
            ("code", code.as_str()),
            ("client_id", creds.client_id.as_str()),
            ("client_secret", creds.client_secret.as_str()),
            ("redirect_uri", creds.redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ])
        .send()
        .await
        .context("token request failed")?
        .error_for_status()
        .context("token endpoint rejected the code")?
        .json()
        .await
        .context("invalid token response")?;

    let info: GoogleUserInfo = state
        .http
        .get(GOOGLE_USERINFO_URL)
        .bearer_auth(&token.access_token)
        .send()
        .await
        .context("userinfo request failed")?
        .error_for_status()
        .context("userinfo endpoint rejected the token")?
        .json()
        .await
        .context("invalid userinfo response")?;

    let email = info
        .email
        .filter(|e| !e.is_empty())
        .context("Google account has no email")?;

    Ok(find_or_create_google_user(&state.db, &email, info.name.as_deref()).await?)
}

/// Existing account with `email`, or a new password-less one named after
/// the Google display name (the email's local part when there is none)
pub async fn find_or_create_google_user(
    pool: &SqlitePool,
    email: &str,
    display_name: Option<&str>,
) -> nimbus_common::Result<User> {
    if let Some(user) = users::find_user_by_email(pool, email).await? {
        return Ok(user);
    }

    let base = match display_name.map(str::trim) {
        Some(name) if !name.is_empty() => name,
        _ => email.split('@').next().unwrap_or("user"),
    };
    let username = unique_username(pool, base).await?;

    let user = users::create_user(
        pool,
        &NewUser {
            username,
            email: email.to_string(),
            password_hash: None,
            password_salt: None,
        },
    )
    .await?;
    info!(user_id = user.id, username = %user.username, "Created user from Google account");
    Ok(user)
}

/// `base`, or `base` with the smallest numeric suffix not yet taken
async fn unique_username(pool: &SqlitePool, base: &str) -> nimbus_common::Result<String> {
    if !users::username_exists(pool, base).await? {
        return Ok(base.to_string());
    }
    let mut n = 1u32;
    loop {
        let candidate = format!("{}{}", base, n);
        if !users::username_exists(pool, &candidate).await? {
            return Ok(candidate);
        }
        n += 1;
    }
}

/// Build OAuth routes
pub fn oauth_routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/google", get(google_login))
        .route("/api/auth/google/callback", get(google_callback))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nimbus_common::db::init_database;

    #[tokio::test]
    async fn test_google_user_find_or_create() {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_database(&dir.path().join("nimbus.db")).await.unwrap();

        let first = find_or_create_google_user(&pool, "a1@example.com", Some("alice"))
            .await
            .unwrap();
        let second = find_or_create_google_user(&pool, "a2@example.com", Some("alice"))
            .await
            .unwrap();
        let third = find_or_create_google_user(&pool, "a3@example.com", Some(" alice "))
            .await
            .unwrap();
        assert_eq!(first.username, "alice");
        assert_eq!(second.username, "alice1");
        assert_eq!(third.username, "alice2");
        assert!(third.password_hash.is_none());

        // Known email keeps its account whatever the display name
        let again = find_or_create_google_user(&pool, "a2@example.com", Some("someone else"))
            .await
            .unwrap();
        assert_eq!(again.id, second.id);
        assert_eq!(again.username, "alice1");

        let unnamed = find_or_create_google_user(&pool, "bob@example.com", None)
            .await
            .unwrap();
        assert_eq!(unnamed.username, "bob");
    }

    #[test]
    fn test_authorization_url_parameters() {
        let creds = GoogleCredentials {
            client_id: "client-123".to_string(),
            client_secret: "secret".to_string(),
            redirect_uri: "http://localhost:5000/api/auth/google/callback".to_string(),
        };
        let url = authorization_url(&creds, "xyz").unwrap();
        let parsed = reqwest::Url::parse(&url).unwrap();
        let params: std::collections::HashMap<_, _> = parsed.query_pairs().into_owned().collect();

        assert!(url.starts_with(GOOGLE_AUTH_URL));
        assert_eq!(params["client_id"], "client-123");
        assert_eq!(params["redirect_uri"], creds.redirect_uri);
        assert_eq!(params["access_type"], "offline");
        assert_eq!(params["include_granted_scopes"], "true");
        assert_eq!(params["state"], "xyz");
        assert!(params["scope"].contains("userinfo.email"));
        assert!(!params.contains_key("client_secret"));
    }
}
