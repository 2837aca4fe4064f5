//! Emotion prediction from an uploaded clip

use axum::{
    body::Bytes,
    extract::{multipart::MultipartRejection, Multipart, State},
    routing::post,
    Json, Router,
};
use chrono::Utc;
use nimbus_common::db::{audio_files, AudioFileRecord, NewAudioFile, User};
use nimbus_common::model::Prediction;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::session::MaybeUser;
use crate::{ApiError, ApiResult, AppState};

/// Prediction response
#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub emotion: String,
    pub confidence: f64,
    pub probabilities: BTreeMap<String, f64>,
    /// Present when the upload was stored in the caller's history
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_file_id: Option<i64>,
}

struct Upload {
    filename: String,
    data: Bytes,
}

/// Reduce a client-supplied file name to a safe single path component
pub fn secure_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "upload.wav".to_string()
    } else {
        cleaned
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1")
}

/// POST /api/predict
///
/// The model check runs before the multipart body is read.
pub async fn predict(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<PredictResponse>> {
    let Some(model) = state.classifier.clone() else {
        return Err(ApiError::ServiceUnavailable(
            "Model not trained yet. Please train the model first.".to_string(),
        ));
    };
    let mut multipart = multipart?;

    let mut upload: Option<Upload> = None;
    let mut is_recorded = false;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "audio" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let data = field.bytes().await?;
                upload = Some(Upload { filename, data });
            }
            "is_recorded" => {
                let text = field.text().await?;
                is_recorded = is_truthy(&text);
            }
            _ => {}
        }
    }

    let upload = upload.ok_or_else(|| ApiError::BadRequest("No audio file provided".to_string()))?;
    if upload.filename.is_empty() {
        return Err(ApiError::BadRequest("No selected file".to_string()));
    }

    debug!(filename = %upload.filename, bytes = upload.data.len(), "Received audio upload");

    let extractor = state.extractor.clone();
    let suffix = Path::new(&upload.filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e))
        .unwrap_or_else(|| ".wav".to_string());
    let data = upload.data.clone();

    let prediction: Prediction = tokio::task::spawn_blocking(move || -> nimbus_common::Result<Prediction> {
        let mut tmp = tempfile::Builder::new().suffix(&suffix).tempfile()?;
        tmp.write_all(&data)?;
        tmp.flush()?;
        let features = extractor.extract_file(tmp.path())?;
        model.classify(&features)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("Prediction task failed: {}", e)))?
    .map_err(|e| ApiError::Internal(e.to_string()))?;

    info!(
        emotion = %prediction.emotion,
        confidence = prediction.confidence,
        "Classified audio clip"
    );

    // History is best effort: the prediction is returned either way
    let audio_file_id = match user {
        Some(user) => match store_upload(&state, &user, &upload, is_recorded, &prediction).await {
            Ok(record) => {
                debug!(user_id = user.id, audio_file_id = record.id, "Stored upload");
                Some(record.id)
            }
            Err(e) => {
                warn!(user_id = user.id, "Failed to store upload: {}", e);
                None
            }
        },
        None => None,
    };

    Ok(Json(PredictResponse {
        emotion: prediction.emotion,
        confidence: prediction.confidence,
        probabilities: prediction.probabilities,
        audio_file_id,
    }))
}

/// Save the clip under `<uploads>/<user_id>/` and record it
///
/// The file is removed again when the row cannot be inserted.
async fn store_upload(
    state: &AppState,
    user: &User,
    upload: &Upload,
    is_recorded: bool,
    prediction: &Prediction,
) -> nimbus_common::Result<AudioFileRecord> {
    let dir = state.config.uploads_dir.join(user.id.to_string());
    let filename = secure_filename(&upload.filename);
    let path = dir.join(format!("{}_{}", Utc::now().format("%Y%m%d%H%M%S%6f"), filename));

    tokio::fs::create_dir_all(&dir).await?;
    tokio::fs::write(&path, &upload.data).await?;

    let inserted = audio_files::insert_audio_file(
        &state.db,
        &NewAudioFile {
            user_id: user.id,
            filename,
            file_path: path.to_string_lossy().into_owned(),
            is_recorded,
            emotion_result: Some(prediction.emotion.clone()),
            confidence_score: Some(prediction.confidence),
            emotion_scores: Some(prediction.probabilities.clone()),
        },
    )
    .await;

    if inserted.is_err() {
        if let Err(e) = tokio::fs::remove_file(&path).await {
            warn!(path = %path.display(), "Failed to remove orphaned upload: {}", e);
        }
    }
    inserted
}

/// Build prediction routes
pub fn predict_routes() -> Router<AppState> {
    Router::new().route("/api/predict", post(predict))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ServerConfig;
    use nimbus_common::config::{RootFolderInitializer, TomlConfig};
    use nimbus_common::db::{init_database, users, NewUser};

    #[tokio::test]
    async fn test_failed_insert_removes_stored_clip() {
        let dir = tempfile::tempdir().unwrap();
        let initializer = RootFolderInitializer::new(dir.path().join("root"));
        initializer.ensure_directory_exists().unwrap();
        let config = ServerConfig::resolve(&TomlConfig::default(), &initializer);
        let db = init_database(&initializer.database_path()).await.unwrap();

        let user = users::create_user(
            &db,
            &NewUser {
                username: "alice".to_string(),
                email: "alice@example.com".to_string(),
                password_hash: None,
                password_salt: None,
            },
        )
        .await
        .unwrap();
        sqlx::query("DROP TABLE audio_files").execute(&db).await.unwrap();

        let state = AppState::new(db, config, None);
        let upload = Upload {
            filename: "clip.wav".to_string(),
            data: Bytes::from_static(b"RIFF"),
        };
        let prediction = Prediction {
            emotion: "happy".to_string(),
            confidence: 1.0,
            probabilities: BTreeMap::from([("happy".to_string(), 1.0)]),
        };

        assert!(store_upload(&state, &user, &upload, false, &prediction).await.is_err());

        let user_dir = state.config.uploads_dir.join(user.id.to_string());
        assert_eq!(std::fs::read_dir(&user_dir).unwrap().count(), 0);
    }

    #[test]
    fn test_secure_filename() {
        assert_eq!(secure_filename("clip.wav"), "clip.wav");
        assert_eq!(secure_filename("../../etc/passwd"), "passwd");
        assert_eq!(secure_filename("C:\\Users\\me\\my clip.mp3"), "my_clip.mp3");
        assert_eq!(secure_filename(".hidden"), "hidden");
        assert_eq!(secure_filename("///"), "upload.wav");
    }

    #[test]
    fn test_is_truthy() {
        assert!(is_truthy("true"));
        assert!(is_truthy("True"));
        assert!(is_truthy("1"));
        assert!(!is_truthy("false"));
        assert!(!is_truthy(""));
    }
}
