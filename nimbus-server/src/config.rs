//! Server configuration
//!
//! Combines the TOML file, command line overrides and the root folder
//! layout into the values handlers need at runtime.

use chrono::Duration;
use nimbus_common::config::{GoogleCredentials, RootFolderInitializer, TomlConfig};
use std::path::PathBuf;

/// Runtime configuration for the HTTP service
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Prebuilt frontend bundle
    pub static_dir: PathBuf,
    /// Model bundle loaded at startup
    pub model_path: PathBuf,
    /// Per-user upload storage (`<uploads_dir>/<user_id>/`)
    pub uploads_dir: PathBuf,
    /// Frontend base URL for OAuth completion redirects
    pub frontend_url: String,
    pub max_upload_bytes: usize,
    pub session_ttl: Duration,
    /// `None` disables Google sign-in
    pub google: Option<GoogleCredentials>,
}

impl ServerConfig {
    /// Resolve configuration from TOML values and the root folder layout
    pub fn resolve(toml: &TomlConfig, root: &RootFolderInitializer) -> Self {
        Self {
            host: toml.host.clone(),
            port: toml.port,
            static_dir: toml.static_dir.clone(),
            model_path: toml
                .model_path
                .clone()
                .unwrap_or_else(|| root.default_model_path()),
            uploads_dir: root.uploads_dir(),
            frontend_url: toml.frontend_url.trim_end_matches('/').to_string(),
            max_upload_bytes: toml.max_upload_bytes,
            session_ttl: Duration::hours(toml.session_ttl_hours),
            google: toml.google_credentials(),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_resolve_uses_root_layout() {
        let toml = TomlConfig::default();
        let root = RootFolderInitializer::new(PathBuf::from("/srv/nimbus"));
        let config = ServerConfig::resolve(&toml, &root);

        assert_eq!(config.model_path, Path::new("/srv/nimbus/model/emotion_model.json"));
        assert_eq!(config.uploads_dir, Path::new("/srv/nimbus/uploads"));
        assert_eq!(config.session_ttl, Duration::hours(168));
        assert_eq!(config.bind_address(), "127.0.0.1:5000");
    }

    #[test]
    fn test_explicit_model_path_and_trailing_slash() {
        let toml = TomlConfig::from_toml_str(
            r#"
            model_path = "/opt/models/custom.json"
            frontend_url = "https://app.example/"
            "#,
        )
        .unwrap();
        let root = RootFolderInitializer::new(PathBuf::from("/srv/nimbus"));
        let config = ServerConfig::resolve(&toml, &root);

        assert_eq!(config.model_path, Path::new("/opt/models/custom.json"));
        assert_eq!(config.frontend_url, "https://app.example");
    }
}
