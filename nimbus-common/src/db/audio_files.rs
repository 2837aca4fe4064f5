//! Audio file history queries

use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use std::collections::BTreeMap;

use super::models::{AudioFileRecord, NewAudioFile};
use super::users::{format_timestamp, parse_timestamp};
use crate::Result;

/// Record an uploaded clip and its classification
pub async fn insert_audio_file(pool: &SqlitePool, file: &NewAudioFile) -> Result<AudioFileRecord> {
    let upload_date = Utc::now();
    let scores_json = file
        .emotion_scores
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    let id = sqlx::query(
        r#"
        INSERT INTO audio_files
            (user_id, filename, file_path, upload_date, is_recorded,
             emotion_result, confidence_score, emotion_scores)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(file.user_id)
    .bind(&file.filename)
    .bind(&file.file_path)
    .bind(format_timestamp(upload_date))
    .bind(file.is_recorded)
    .bind(&file.emotion_result)
    .bind(file.confidence_score)
    .bind(scores_json)
    .execute(pool)
    .await?
    .last_insert_rowid();

    Ok(AudioFileRecord {
        id,
        user_id: file.user_id,
        filename: file.filename.clone(),
        file_path: file.file_path.clone(),
        upload_date,
        is_recorded: file.is_recorded,
        emotion_result: file.emotion_result.clone(),
        confidence_score: file.confidence_score,
        emotion_scores: file.emotion_scores.clone(),
    })
}

/// All clips uploaded by a user, newest first
pub async fn list_audio_files_for_user(
    pool: &SqlitePool,
    user_id: i64,
) -> Result<Vec<AudioFileRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT id, user_id, filename, file_path, upload_date, is_recorded,
               emotion_result, confidence_score, emotion_scores
        FROM audio_files
        WHERE user_id = ?
        ORDER BY upload_date DESC, id DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(audio_file_from_row).collect()
}

fn audio_file_from_row(row: &SqliteRow) -> Result<AudioFileRecord> {
    let upload_date: String = row.try_get("upload_date")?;
    let scores: Option<String> = row.try_get("emotion_scores")?;
    let emotion_scores = scores
        .map(|s| serde_json::from_str::<BTreeMap<String, f64>>(&s))
        .transpose()?;

    Ok(AudioFileRecord {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        filename: row.try_get("filename")?,
        file_path: row.try_get("file_path")?,
        upload_date: parse_timestamp(&upload_date)?,
        is_recorded: row.try_get("is_recorded")?,
        emotion_result: row.try_get("emotion_result")?,
        confidence_score: row.try_get("confidence_score")?,
        emotion_scores,
    })
}
