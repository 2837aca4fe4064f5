//! nimbus-server - speech emotion recognition web service
//!
//! Serves the prediction API, user accounts and the prebuilt frontend.

use std::path::PathBuf;
use std::time::Duration as StdDuration;

use anyhow::{Context, Result};
use clap::Parser;
use nimbus_common::config::{RootFolderInitializer, RootFolderResolver, TomlConfig};
use nimbus_common::db::{init_database, sessions};
use nimbus_common::model::EmotionModel;
use nimbus_server::{build_router, AppState, ServerConfig};
use sqlx::SqlitePool;
use tokio::signal;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How often expired sessions are removed
const SESSION_PURGE_INTERVAL: StdDuration = StdDuration::from_secs(3600);

/// Command-line arguments for nimbus-server
#[derive(Parser, Debug)]
#[command(name = "nimbus-server")]
#[command(about = "Speech emotion recognition web service")]
#[command(version)]
struct Args {
    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, env = "NIMBUS_CONFIG")]
    config: Option<PathBuf>,

    /// Root folder for the database, model and uploads
    #[arg(short, long, env = "NIMBUS_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Address to bind
    #[arg(long, env = "NIMBUS_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "NIMBUS_PORT")]
    port: Option<u16>,

    /// Model bundle to load
    #[arg(short, long, env = "NIMBUS_MODEL")]
    model: Option<PathBuf>,

    /// Frontend bundle directory
    #[arg(long, env = "NIMBUS_STATIC_DIR")]
    static_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config is read before tracing starts so its log level can apply
    let toml_config = TomlConfig::load(args.config.as_deref())
        .context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| toml_config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting nimbus-server v{}", env!("CARGO_PKG_VERSION"));

    let root_folder =
        RootFolderResolver::new(args.root_folder.clone(), toml_config.root_folder.clone()).resolve();
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;
    info!("Root folder: {}", initializer.root().display());

    let mut config = ServerConfig::resolve(&toml_config, &initializer);
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(model) = args.model {
        config.model_path = model;
    }
    if let Some(static_dir) = args.static_dir {
        config.static_dir = static_dir;
    }

    let db_path = initializer.database_path();
    info!("Database: {}", db_path.display());
    let pool = init_database(&db_path)
        .await
        .context("Failed to open database")?;

    let classifier = load_classifier(&config)?;
    if config.google.is_none() {
        info!("Google sign-in disabled (no client credentials configured)");
    }

    spawn_session_purge(pool.clone());

    let bind_address = config.bind_address();
    let state = AppState::new(pool, config, classifier);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_address))?;
    info!("Listening on http://{}", bind_address);
    info!("Health check: http://{}/health", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Load the model bundle; a missing file is allowed, a broken one is not
fn load_classifier(config: &ServerConfig) -> Result<Option<EmotionModel>> {
    let path = &config.model_path;
    if !path.exists() {
        warn!(path = %path.display(), "Model file not found. Please train the model first.");
        return Ok(None);
    }

    let model = EmotionModel::load(path)
        .with_context(|| format!("Failed to load model {}", path.display()))?;
    info!(
        path = %path.display(),
        features = %model.feature_kind,
        labels = ?model.labels,
        "Model loaded"
    );
    Ok(Some(model))
}

fn spawn_session_purge(pool: SqlitePool) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_PURGE_INTERVAL);
        loop {
            interval.tick().await;
            match sessions::purge_expired_sessions(&pool).await {
                Ok(0) => {}
                Ok(n) => debug!("Purged {} expired sessions", n),
                Err(e) => warn!("Session purge failed: {}", e),
            }
        }
    });
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
