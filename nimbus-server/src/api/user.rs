//! Per-user upload history

use axum::{
    extract::{rejection::PathRejection, Path, State},
    routing::get,
    Json, Router,
};
use nimbus_common::db::{audio_files, AudioFileRecord};

use crate::session::CurrentUser;
use crate::{ApiError, ApiResult, AppState};

/// GET /api/user/:user_id/audio-files
///
/// Newest first. Only the owner may read the list.
pub async fn list_audio_files(
    State(state): State<AppState>,
    current: CurrentUser,
    user_id: Result<Path<i64>, PathRejection>,
) -> ApiResult<Json<Vec<AudioFileRecord>>> {
    let Path(user_id) = user_id?;
    if current.user.id != user_id {
        return Err(ApiError::Forbidden("Unauthorized".to_string()));
    }

    let files = audio_files::list_audio_files_for_user(&state.db, user_id).await?;
    Ok(Json(files))
}

/// Build user routes
pub fn user_routes() -> Router<AppState> {
    Router::new().route("/api/user/:user_id/audio-files", get(list_audio_files))
}
