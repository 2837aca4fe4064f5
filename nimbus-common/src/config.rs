//! Configuration loading and root folder resolution
//!
//! Bootstrap configuration comes from a TOML file. Individual values can be
//! overridden from the command line or the environment. Priority order for
//! the root folder:
//! 1. Command-line argument (highest priority)
//! 2. `NIMBUS_ROOT_FOLDER` environment variable
//! 3. `root_folder` key in the TOML config file
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "NIMBUS_ROOT_FOLDER";

/// Database file name inside the root folder
pub const DATABASE_FILE: &str = "nimbus.db";

/// Default model bundle file name inside `<root>/model`
pub const MODEL_FILE: &str = "emotion_model.json";

/// Bootstrap configuration loaded from TOML file
///
/// Every key is optional. Missing keys fall back to compiled defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    /// Root folder holding the database, model and uploads
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// HTTP bind address
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Prebuilt frontend bundle served for non-API paths
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,

    /// Model bundle path (defaults to `<root>/model/emotion_model.json`)
    #[serde(default)]
    pub model_path: Option<PathBuf>,

    /// Frontend base URL used for OAuth redirects
    #[serde(default = "default_frontend_url")]
    pub frontend_url: String,

    /// Maximum accepted request body size
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// Lifetime of a login session
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: i64,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Google OAuth client (optional)
    #[serde(default)]
    pub google: Option<GoogleOAuthConfig>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Google OAuth 2.0 web client credentials
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct GoogleOAuthConfig {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub redirect_uri: Option<String>,
}

/// Fully resolved Google credentials (all three values present)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoogleCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("frontend/build")
}

fn default_frontend_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_max_upload_bytes() -> usize {
    25 * 1024 * 1024
}

fn default_session_ttl_hours() -> i64 {
    24 * 7
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            host: default_host(),
            port: default_port(),
            static_dir: default_static_dir(),
            model_path: None,
            frontend_url: default_frontend_url(),
            max_upload_bytes: default_max_upload_bytes(),
            session_ttl_hours: default_session_ttl_hours(),
            logging: LoggingConfig::default(),
            google: None,
        }
    }
}

impl TomlConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))
    }

    /// Load configuration from `path`, or from the platform default location
    ///
    /// A missing file is not fatal: a warning is logged and compiled
    /// defaults are returned. A file that exists but cannot be parsed is a
    /// configuration error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match default_config_file() {
                Some(p) => p,
                None => {
                    warn!("Could not determine config directory, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        if !path.exists() {
            warn!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Resolve Google credentials, environment variables taking precedence
    ///
    /// Returns `None` unless client id, secret and redirect URI are all set.
    pub fn google_credentials(&self) -> Option<GoogleCredentials> {
        let toml = self.google.clone().unwrap_or_default();
        let pick = |env: &str, fallback: Option<String>| {
            std::env::var(env)
                .ok()
                .filter(|v| !v.is_empty())
                .or(fallback.filter(|v| !v.is_empty()))
        };

        Some(GoogleCredentials {
            client_id: pick("GOOGLE_CLIENT_ID", toml.client_id)?,
            client_secret: pick("GOOGLE_CLIENT_SECRET", toml.client_secret)?,
            redirect_uri: pick("GOOGLE_REDIRECT_URI", toml.redirect_uri)?,
        })
    }
}

/// Platform config file location: `<config_dir>/nimbus/config.toml`
pub fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("nimbus").join("config.toml"))
}

/// Root folder resolution
#[derive(Debug, Clone, Default)]
pub struct RootFolderResolver {
    cli_arg: Option<PathBuf>,
    toml_root: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(cli_arg: Option<PathBuf>, toml_root: Option<PathBuf>) -> Self {
        Self { cli_arg, toml_root }
    }

    /// Resolve the root folder by priority (CLI, env, TOML, default)
    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.is_empty() {
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &self.toml_root {
            return path.clone();
        }

        default_root_folder()
    }
}

/// OS-dependent default root folder
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("nimbus"))
        .unwrap_or_else(|| PathBuf::from("./nimbus_data"))
}

/// Root folder layout and creation
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root folder and its `model/` and `uploads/` children
    pub fn ensure_directory_exists(&self) -> Result<()> {
        for dir in [self.root.clone(), self.model_dir(), self.uploads_dir()] {
            if !dir.exists() {
                std::fs::create_dir_all(&dir)?;
                info!("Created directory: {}", dir.display());
            }
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.root.join(DATABASE_FILE)
    }

    pub fn model_dir(&self) -> PathBuf {
        self.root.join("model")
    }

    pub fn default_model_path(&self) -> PathBuf {
        self.model_dir().join(MODEL_FILE)
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.root.join("uploads")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = TomlConfig::from_toml_str("").unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 5000);
        assert_eq!(config.max_upload_bytes, 25 * 1024 * 1024);
        assert_eq!(config.session_ttl_hours, 168);
        assert_eq!(config.logging.level, "info");
        assert!(config.google.is_none());
    }

    #[test]
    fn test_toml_overrides() {
        let config = TomlConfig::from_toml_str(
            r#"
            root_folder = "/srv/nimbus"
            port = 8080
            frontend_url = "https://nimbus.example"

            [logging]
            level = "debug"

            [google]
            client_id = "id"
            "#,
        )
        .unwrap();

        assert_eq!(config.root_folder, Some(PathBuf::from("/srv/nimbus")));
        assert_eq!(config.port, 8080);
        assert_eq!(config.frontend_url, "https://nimbus.example");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.google.unwrap().client_id.as_deref(), Some("id"));
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        let err = TomlConfig::from_toml_str("port = \"not a number\"").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_layout_paths() {
        let init = RootFolderInitializer::new(PathBuf::from("/data/nimbus"));
        assert_eq!(init.database_path(), PathBuf::from("/data/nimbus/nimbus.db"));
        assert_eq!(
            init.default_model_path(),
            PathBuf::from("/data/nimbus/model/emotion_model.json")
        );
        assert_eq!(init.uploads_dir(), PathBuf::from("/data/nimbus/uploads"));
    }
}
