use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};

use crate::endpoints::extractors::OrgId;
use crate::error::{AppError, Result};
use crate::models::prelude::*;
use crate::models::{update_transaction, update_transaction_old_commit};
use crate::schemas::{QueuedResponse, UpdateResponse};
use crate::services::BuildJob;
use crate::state::AppState;

/// Create update routes
pub fn updates_routes(state: AppState) -> Router {
    Router::new()
        .route("/{update_id}", get(get_update))
        .route("/{update_id}/build", post(build_update))
        .with_state(state)
}

async fn find_update(
    state: &AppState,
    update_id: i64,
    org: &OrgId,
) -> Result<update_transaction::Model> {
    UpdateTransaction::find_by_id(update_id)
        .one(&state.db)
        .await?
        .filter(|u| u.org_id == org.0)
        .ok_or_else(|| AppError::NotFound(format!("Update {} not found", update_id)))
}

/// Get an update transaction and its repo
async fn get_update(
    State(state): State<AppState>,
    org: OrgId,
    Path(update_id): Path<i64>,
) -> Result<Json<UpdateResponse>> {
    let update = find_update(&state, update_id, &org).await?;

    let repo = match update.repo_id {
        Some(id) => Repo::find_by_id(id).one(&state.db).await?,
        None => None,
    };

    let old_commit_ids = UpdateTransactionOldCommit::find()
        .filter(update_transaction_old_commit::Column::UpdateTransactionId.eq(update.id))
        .order_by_asc(update_transaction_old_commit::Column::Position)
        .all(&state.db)
        .await?
        .into_iter()
        .map(|link| link.commit_id)
        .collect();

    Ok(Json(UpdateResponse::from_parts(
        &update,
        repo.as_ref(),
        old_commit_ids,
    )))
}

/// Queue assembly of an update's repo
async fn build_update(
    State(state): State<AppState>,
    org: OrgId,
    Path(update_id): Path<i64>,
) -> Result<(StatusCode, Json<QueuedResponse>)> {
    let update = find_update(&state, update_id, &org).await?;

    if !state.repos.claim_update(update.id).await? {
        return Err(AppError::Conflict(format!(
            "Update {} is already building",
            update_id
        )));
    }

    if let Err(e) = state.queue.submit(BuildJob::BuildUpdateRepo(update.id)).await {
        if let Err(release_err) = state.repos.release_update(&update).await {
            tracing::error!(update_id, error = %release_err, "Failed to release update claim");
        }
        return Err(e);
    }
    tracing::info!(update_id, "Queued update repo build");

    Ok((
        StatusCode::ACCEPTED,
        Json(QueuedResponse {
            id: update.id,
            queued: true,
        }),
    ))
}
