pub mod extractors;
pub mod images;
pub mod repos;
pub mod updates;

use axum::Router;
use tower_http::services::ServeDir;

use crate::config::CONFIG;
use crate::state::AppState;

/// Create the main API router
pub fn create_router(state: AppState) -> Router {
    let storage = ServeDir::new(&state.storage_dir);

    Router::new()
        .route("/api/health", axum::routing::get(health_check))
        .route("/api/version", axum::routing::get(get_version))
        .nest("/api/v1/images", images::images_routes(state.clone()))
        .nest("/api/v1/repos", repos::repos_routes(state.clone()))
        .nest("/api/v1/updates", updates::updates_routes(state))
        .nest_service("/storage", storage)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

/// Version info endpoint
async fn get_version() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "version": CONFIG.version,
        "commit_hash": CONFIG.commit_hash,
    }))
}
