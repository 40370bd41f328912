use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use sea_orm::EntityTrait;

use crate::endpoints::extractors::OrgId;
use crate::error::{AppError, Result};
use crate::models::prelude::*;
use crate::schemas::QueuedResponse;
use crate::services::BuildJob;
use crate::state::AppState;

/// Create repo routes
pub fn repos_routes(state: AppState) -> Router {
    Router::new()
        .route("/{repo_id}/import", post(import_repo))
        .with_state(state)
}

/// Queue a re-import of a repo from its commit's tarball
async fn import_repo(
    State(state): State<AppState>,
    org: OrgId,
    Path(repo_id): Path<i64>,
) -> Result<(StatusCode, Json<QueuedResponse>)> {
    let not_found = || AppError::NotFound(format!("Repo {} not found", repo_id));

    let repo = Repo::find_by_id(repo_id)
        .one(&state.db)
        .await?
        .ok_or_else(not_found)?;
    // Repos are owned through their commit
    Commit::find_by_id(repo.commit_id)
        .one(&state.db)
        .await?
        .filter(|c| c.org_id == org.0)
        .ok_or_else(not_found)?;

    if !state.repos.claim_repo(repo.id).await? {
        return Err(AppError::Conflict(format!(
            "Repo {} is already building",
            repo_id
        )));
    }

    if let Err(e) = state.queue.submit(BuildJob::ImportRepo(repo.id)).await {
        if let Err(release_err) = state.repos.release_repo(&repo).await {
            tracing::error!(repo_id, error = %release_err, "Failed to release repo claim");
        }
        return Err(e);
    }
    tracing::info!(repo_id, "Queued repo import");

    Ok((
        StatusCode::ACCEPTED,
        Json(QueuedResponse {
            id: repo.id,
            queued: true,
        }),
    ))
}
