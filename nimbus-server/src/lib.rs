//! nimbus-server library interface
//!
//! Exposes the router and shared state for integration testing.

pub mod api;
pub mod config;
pub mod error;
pub mod session;

pub use crate::config::ServerConfig;
pub use crate::error::{ApiError, ApiResult};

use axum::extract::DefaultBodyLimit;
use axum::Router;
use chrono::{DateTime, Utc};
use nimbus_common::audio::{FeatureExtractor, FeatureKind};
use nimbus_common::model::EmotionModel;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Resolved server configuration
    pub config: Arc<ServerConfig>,
    /// Loaded classifier; `None` until a model has been trained
    pub classifier: Option<Arc<EmotionModel>>,
    /// Feature extractor matching the classifier's feature layout
    pub extractor: Arc<FeatureExtractor>,
    /// Outbound HTTP client (OAuth token exchange)
    pub http: reqwest::Client,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(db: SqlitePool, config: ServerConfig, classifier: Option<EmotionModel>) -> Self {
        let kind = classifier
            .as_ref()
            .map(|m| m.feature_kind)
            .unwrap_or(FeatureKind::Summary);

        Self {
            db,
            config: Arc::new(config),
            classifier: classifier.map(Arc::new),
            extractor: Arc::new(FeatureExtractor::new(kind)),
            http: reqwest::Client::new(),
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
///
/// API routes are matched first; every other path falls through to the
/// single-page frontend bundle.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true);

    let body_limit = state.config.max_upload_bytes;
    let static_dir = state.config.static_dir.clone();

    Router::new()
        .merge(api::auth_routes())
        .merge(api::oauth_routes())
        .merge(api::predict_routes())
        .merge(api::user_routes())
        .merge(api::health_routes())
        .fallback_service(api::spa_service(&static_dir))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
