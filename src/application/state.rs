use std::path::PathBuf;
use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::services::build_queue::BuildQueue;
use crate::services::image::ImageService;
use crate::services::repo_builder::RepoBuilder;

/// Database connection type alias
pub type DbConn = DatabaseConnection;

/// Shared state handed to every request handler
#[derive(Clone)]
pub struct AppState {
    pub db: DbConn,
    pub images: Arc<ImageService>,
    pub repos: RepoBuilder,
    pub queue: BuildQueue,
    /// Directory published artifacts are served from
    pub storage_dir: PathBuf,
}

impl AppState {
    pub fn new(
        db: DbConn,
        images: Arc<ImageService>,
        repos: RepoBuilder,
        queue: BuildQueue,
        storage_dir: PathBuf,
    ) -> Self {
        Self {
            db,
            images,
            repos,
            queue,
            storage_dir,
        }
    }
}
