//! Database models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Registered user
///
/// Users created through Google sign-in have no password and can only log
/// in through OAuth.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    #[serde(skip_serializing)]
    pub password_salt: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields for inserting a user
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub password_salt: Option<String>,
}

/// Uploaded clip with its classification result
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudioFileRecord {
    pub id: i64,
    pub user_id: i64,
    pub filename: String,
    pub file_path: String,
    pub upload_date: DateTime<Utc>,
    pub is_recorded: bool,
    pub emotion_result: Option<String>,
    pub confidence_score: Option<f64>,
    pub emotion_scores: Option<BTreeMap<String, f64>>,
}

/// Fields for inserting an audio file record
#[derive(Debug, Clone)]
pub struct NewAudioFile {
    pub user_id: i64,
    pub filename: String,
    pub file_path: String,
    pub is_recorded: bool,
    pub emotion_result: Option<String>,
    pub confidence_score: Option<f64>,
    pub emotion_scores: Option<BTreeMap<String, f64>>,
}
