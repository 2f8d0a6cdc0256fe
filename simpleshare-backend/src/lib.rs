use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

// Re-export shared types from simpleshare-types
pub use simpleshare_types::*;

pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod lifecycle;
pub mod storage;

use config::Config;
use database::setup_database;
use error::{AppError, Result};
use lifecycle::FileManager;
use storage::FileStorage;

/// Room for multipart framing and the text fields on top of the file itself
const MULTIPART_OVERHEAD: u64 = 1024 * 1024;

// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub manager: FileManager,
    pub config: Config,
}

pub async fn run_server() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Load configuration
    let config = Config::from_env()?;

    // Setup database
    let db = setup_database(&config.database_url).await?;

    // Setup file storage
    let storage = FileStorage::new(&config.storage_dir);
    storage.init().await?;

    let manager = FileManager::new(db, storage, config.max_file_size);

    // Expire old files once at startup
    let expired = manager.expire_older_than(config.retention()).await?;
    tracing::info!(
        "🧹 Startup cleanup removed {} file(s) older than {} days",
        expired,
        config.retention_days
    );

    // Extract config values before moving state
    let server_address = config.server_address.clone();
    let storage_dir = config.storage_dir.clone();
    let max_file_size = config.max_file_size;

    // Create application state
    let state = AppState { manager, config };

    // Build the application router
    let app = create_app(state);

    // Create TCP listener
    let listener = tokio::net::TcpListener::bind(&server_address)
        .await
        .map_err(|e| {
            AppError::ServerError(format!("Failed to bind to {}: {}", server_address, e))
        })?;

    tracing::info!("🚀 SimpleShare server starting on {}", server_address);
    tracing::info!("📁 Upload folder: {}", storage_dir);
    tracing::info!("📊 Max file size: {} bytes", max_file_size);

    // Start the server
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .map_err(|e| AppError::ServerError(format!("Server error: {}", e)))?;

    Ok(())
}

pub fn create_app(state: AppState) -> Router {
    let upload_limit = state.config.max_file_size.saturating_add(MULTIPART_OVERHEAD);
    let upload_limit = usize::try_from(upload_limit).unwrap_or(usize::MAX);
    let static_dir = state.config.static_dir.clone();

    Router::new()
        // File operations
        .route(
            "/upload",
            post(handlers::upload_file).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/download/:file_id", get(handlers::download_file))
        .route(
            "/delete/:file_id",
            post(handlers::delete_file).delete(handlers::delete_file),
        )
        // JSON API
        .route("/api/files", get(handlers::list_files))
        .route("/api/stats", get(handlers::get_stats))
        // Cleanup operations
        .route("/admin/cleanup", get(handlers::cleanup_expired_files))
        // Health check
        .route("/health", get(handlers::health_check))
        // Static file serving for the upload page
        .fallback_service(ServeDir::new(static_dir))
        // Add middleware
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
        .with_state(state)
}
