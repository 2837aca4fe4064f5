//! HTTP API handlers for nimbus-server

pub mod auth;
pub mod health;
pub mod oauth;
pub mod predict;
pub mod static_files;
pub mod user;

pub use auth::auth_routes;
pub use health::health_routes;
pub use oauth::oauth_routes;
pub use predict::predict_routes;
pub use static_files::spa_service;
pub use user::user_routes;
