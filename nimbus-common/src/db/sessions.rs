//! Login session persistence
//!
//! A session is an opaque random token mapped to a user id with an
//! expiry time. Expired sessions are removed lazily on lookup and in bulk
//! by [`purge_expired_sessions`].

use chrono::{Duration, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use super::models::User;
use super::users::{find_user_by_id, format_timestamp, parse_timestamp};
use crate::auth::generate_token;
use crate::Result;

/// Create a session for `user_id` and return its token
pub async fn create_session(pool: &SqlitePool, user_id: i64, ttl: Duration) -> Result<String> {
    let token = generate_token();
    let now = Utc::now();

    sqlx::query(
        "INSERT INTO sessions (token, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)",
    )
    .bind(&token)
    .bind(user_id)
    .bind(format_timestamp(now))
    .bind(format_timestamp(now + ttl))
    .execute(pool)
    .await?;

    Ok(token)
}

/// Resolve a session token to its user
///
/// Returns `None` for unknown tokens and for expired sessions, which are
/// deleted as a side effect.
pub async fn find_session_user(pool: &SqlitePool, token: &str) -> Result<Option<User>> {
    let row: Option<(i64, String)> =
        sqlx::query_as("SELECT user_id, expires_at FROM sessions WHERE token = ?")
            .bind(token)
            .fetch_optional(pool)
            .await?;

    let Some((user_id, expires_at)) = row else {
        return Ok(None);
    };

    if parse_timestamp(&expires_at)? <= Utc::now() {
        debug!(user_id, "Session expired");
        delete_session(pool, token).await?;
        return Ok(None);
    }

    find_user_by_id(pool, user_id).await
}

pub async fn delete_session(pool: &SqlitePool, token: &str) -> Result<()> {
    sqlx::query("DELETE FROM sessions WHERE token = ?")
        .bind(token)
        .execute(pool)
        .await?;
    Ok(())
}

/// Delete every expired session, returning how many were removed
pub async fn purge_expired_sessions(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
        .bind(format_timestamp(Utc::now()))
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
