//! Configuration resolution tests
//!
//! Tests that touch process environment variables are marked `#[serial]`
//! so they never run concurrently.

use nimbus_common::config::{RootFolderInitializer, RootFolderResolver, TomlConfig, ROOT_FOLDER_ENV};
use serial_test::serial;
use std::env;
use std::path::PathBuf;

#[test]
#[serial]
fn test_cli_argument_wins() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/nimbus-env");
    let resolver = RootFolderResolver::new(
        Some(PathBuf::from("/tmp/nimbus-cli")),
        Some(PathBuf::from("/tmp/nimbus-toml")),
    );
    assert_eq!(resolver.resolve(), PathBuf::from("/tmp/nimbus-cli"));
    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_env_beats_toml() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/nimbus-env");
    let resolver = RootFolderResolver::new(None, Some(PathBuf::from("/tmp/nimbus-toml")));
    assert_eq!(resolver.resolve(), PathBuf::from("/tmp/nimbus-env"));
    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_toml_then_default() {
    env::remove_var(ROOT_FOLDER_ENV);
    let resolver = RootFolderResolver::new(None, Some(PathBuf::from("/tmp/nimbus-toml")));
    assert_eq!(resolver.resolve(), PathBuf::from("/tmp/nimbus-toml"));

    let fallback = RootFolderResolver::new(None, None).resolve();
    assert!(!fallback.as_os_str().is_empty());
    assert!(fallback.ends_with("nimbus") || fallback.ends_with("nimbus_data"));
}

#[test]
#[serial]
fn test_google_credentials_env_overrides_toml() {
    env::remove_var("GOOGLE_CLIENT_ID");
    env::remove_var("GOOGLE_CLIENT_SECRET");
    env::remove_var("GOOGLE_REDIRECT_URI");

    let config = TomlConfig::from_toml_str(
        r#"
        [google]
        client_id = "toml-id"
        client_secret = "toml-secret"
        "#,
    )
    .unwrap();

    // Redirect URI missing: OAuth disabled
    assert!(config.google_credentials().is_none());

    env::set_var("GOOGLE_REDIRECT_URI", "http://localhost:5000/api/auth/google/callback");
    env::set_var("GOOGLE_CLIENT_ID", "env-id");

    let creds = config.google_credentials().unwrap();
    assert_eq!(creds.client_id, "env-id");
    assert_eq!(creds.client_secret, "toml-secret");

    env::remove_var("GOOGLE_CLIENT_ID");
    env::remove_var("GOOGLE_REDIRECT_URI");
}

#[test]
fn test_missing_config_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = TomlConfig::load(Some(&dir.path().join("absent.toml"))).unwrap();
    assert_eq!(config.port, 5000);
}

#[test]
fn test_config_file_loaded() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "port = 6100\nhost = \"0.0.0.0\"\n").unwrap();

    let config = TomlConfig::load(Some(&path)).unwrap();
    assert_eq!(config.port, 6100);
    assert_eq!(config.host, "0.0.0.0");
}

#[test]
fn test_initializer_creates_layout() {
    let dir = tempfile::tempdir().unwrap();
    let init = RootFolderInitializer::new(dir.path().join("root"));
    init.ensure_directory_exists().unwrap();

    assert!(init.root().is_dir());
    assert!(init.model_dir().is_dir());
    assert!(init.uploads_dir().is_dir());
}
