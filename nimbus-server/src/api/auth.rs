//! Email/password account endpoints

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use nimbus_common::auth::{hash_password, verify_password};
use nimbus_common::db::{users, NewUser, User};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};

use crate::session::{clear_cookie, start_session, CurrentUser, SESSION_COOKIE};
use crate::{ApiError, ApiResult, AppState};

const MIN_USERNAME_LEN: usize = 3;
const MIN_PASSWORD_LEN: usize = 6;

/// Public view of a user
#[derive(Debug, Serialize)]
pub struct UserInfo {
    pub id: i64,
    pub username: String,
    pub email: String,
}

impl From<&User> for UserInfo {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SignupRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

fn required<'a>(value: &'a Option<String>, field: &str) -> ApiResult<&'a str> {
    match value.as_deref() {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ApiError::BadRequest(format!("{} is required", field))),
    }
}

/// Check field presence and lengths, in the order the client reports them
pub fn validate_signup(req: &SignupRequest) -> ApiResult<(&str, &str, &str)> {
    let username = required(&req.username, "username")?;
    let email = required(&req.email, "email")?;
    let password = required(&req.password, "password")?;

    if username.chars().count() < MIN_USERNAME_LEN {
        return Err(ApiError::BadRequest(
            "Username must be at least 3 characters long".to_string(),
        ));
    }
    if !email.contains('@') {
        return Err(ApiError::BadRequest("Invalid email format".to_string()));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::BadRequest(
            "Password must be at least 6 characters long".to_string(),
        ));
    }
    Ok((username, email, password))
}

fn signup_failed(err: impl std::fmt::Display) -> ApiError {
    error!("Signup failed: {}", err);
    ApiError::Internal("An error occurred during signup".to_string())
}

fn login_failed(err: impl std::fmt::Display) -> ApiError {
    error!("Login failed: {}", err);
    ApiError::Internal("An error occurred during login".to_string())
}

/// POST /api/signup
///
/// An unreadable body (wrong content type, malformed JSON) is reported as
/// the endpoint's generic failure.
pub async fn signup(
    State(state): State<AppState>,
    payload: Result<Json<SignupRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = payload.map_err(|e| signup_failed(e.body_text()))?;
    let (username, email, password) = validate_signup(&req)?;

    if users::username_exists(&state.db, username).await.map_err(signup_failed)? {
        return Err(ApiError::BadRequest("Username already exists".to_string()));
    }
    if users::email_exists(&state.db, email).await.map_err(signup_failed)? {
        return Err(ApiError::BadRequest("Email already exists".to_string()));
    }

    let (hash, salt) = hash_password(password);
    let user = users::create_user(
        &state.db,
        &NewUser {
            username: username.to_string(),
            email: email.to_string(),
            password_hash: Some(hash),
            password_salt: Some(salt),
        },
    )
    .await
    .map_err(signup_failed)?;

    let cookie = start_session(&state, user.id).await.map_err(signup_failed)?;
    info!(user_id = user.id, username = %user.username, "User signed up");

    Ok((
        StatusCode::CREATED,
        [(header::SET_COOKIE, cookie)],
        Json(json!({
            "message": "User created successfully",
            "user": UserInfo::from(&user),
        })),
    ))
}

/// POST /api/login
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = payload.map_err(|e| login_failed(e.body_text()))?;
    let (Some(email), Some(password)) = (
        req.email.as_deref().filter(|v| !v.is_empty()),
        req.password.as_deref().filter(|v| !v.is_empty()),
    ) else {
        return Err(ApiError::BadRequest("Email and password are required".to_string()));
    };

    let user = users::find_user_by_email(&state.db, email)
        .await
        .map_err(login_failed)?;
    let verified = user.filter(|u| match (&u.password_hash, &u.password_salt) {
        (Some(hash), Some(salt)) => verify_password(password, hash, salt),
        _ => false,
    });
    let Some(user) = verified else {
        return Err(ApiError::Unauthorized("Invalid email or password".to_string()));
    };

    let cookie = start_session(&state, user.id).await.map_err(login_failed)?;
    info!(user_id = user.id, "User logged in");

    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(json!({
            "message": "Logged in successfully",
            "user": UserInfo::from(&user),
        })),
    ))
}

/// GET /api/logout
pub async fn logout(
    State(state): State<AppState>,
    current: CurrentUser,
) -> ApiResult<impl IntoResponse> {
    nimbus_common::db::sessions::delete_session(&state.db, &current.token).await?;
    info!(user_id = current.user.id, "User logged out");

    Ok((
        [(header::SET_COOKIE, clear_cookie(SESSION_COOKIE))],
        Json(json!({ "message": "Logged out successfully" })),
    ))
}

/// GET /api/current_user
pub async fn current_user(current: CurrentUser) -> Json<UserInfo> {
    Json(UserInfo::from(&current.user))
}

/// Build account routes
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/api/signup", post(signup))
        .route("/api/login", post(login))
        .route("/api/logout", get(logout))
        .route("/api/current_user", get(current_user))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(username: &str, email: &str, password: &str) -> SignupRequest {
        SignupRequest {
            username: Some(username.to_string()),
            email: Some(email.to_string()),
            password: Some(password.to_string()),
        }
    }

    fn message(result: ApiResult<(&str, &str, &str)>) -> String {
        result.unwrap_err().to_string()
    }

    #[test]
    fn test_missing_fields_in_order() {
        assert_eq!(message(validate_signup(&SignupRequest::default())), "username is required");

        let mut req = request("alice", "", "secret1");
        assert_eq!(message(validate_signup(&req)), "email is required");

        req.email = Some("a@b.c".to_string());
        req.password = None;
        assert_eq!(message(validate_signup(&req)), "password is required");
    }

    #[test]
    fn test_length_and_format_rules() {
        assert_eq!(
            message(validate_signup(&request("al", "a@b.c", "secret1"))),
            "Username must be at least 3 characters long"
        );
        assert_eq!(
            message(validate_signup(&request("alice", "alice.example.com", "secret1"))),
            "Invalid email format"
        );
        assert_eq!(
            message(validate_signup(&request("alice", "a@b.c", "12345"))),
            "Password must be at least 6 characters long"
        );
        assert!(validate_signup(&request("alice", "a@b.c", "123456")).is_ok());
    }
}
