use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use crate::endpoints::extractors::OrgId;
use crate::error::{AppError, Result};
use crate::schemas::{CreateImageRequest, ImageResponse};
use crate::state::AppState;

/// Create image routes
pub fn images_routes(state: AppState) -> Router {
    Router::new()
        .route("/", post(create_image))
        .route("/{image_id}", get(get_image))
        .route("/{image_id}/retry", post(retry_image))
        .route("/{image_id}/update", post(update_image))
        .with_state(state)
}

async fn load_response(state: &AppState, image_id: i64, org: &OrgId) -> Result<ImageResponse> {
    let (image, commit, installer, repo) = state.images.image_details(image_id).await?;
    if image.org_id != org.0 {
        return Err(AppError::NotFound(format!("Image {} not found", image_id)));
    }
    Ok(ImageResponse::from_parts(
        &image,
        Some(&commit),
        installer.as_ref(),
        repo.as_ref(),
    ))
}

/// Start building a new image
async fn create_image(
    State(state): State<AppState>,
    org: OrgId,
    Json(request): Json<CreateImageRequest>,
) -> Result<(StatusCode, Json<ImageResponse>)> {
    let image = state.images.create_image(request, &org.0).await?;
    let response = load_response(&state, image.id, &org).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Get an image with its commit, installer and repo
async fn get_image(
    State(state): State<AppState>,
    org: OrgId,
    Path(image_id): Path<i64>,
) -> Result<Json<ImageResponse>> {
    Ok(Json(load_response(&state, image_id, &org).await?))
}

/// Retry a failed image build
async fn retry_image(
    State(state): State<AppState>,
    org: OrgId,
    Path(image_id): Path<i64>,
) -> Result<(StatusCode, Json<ImageResponse>)> {
    // Ownership check before touching the build
    load_response(&state, image_id, &org).await?;

    let image = state.images.retry_create_image(image_id).await?;
    let response = load_response(&state, image.id, &org).await?;
    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// Build the next version of an image
async fn update_image(
    State(state): State<AppState>,
    org: OrgId,
    Path(image_id): Path<i64>,
    Json(request): Json<CreateImageRequest>,
) -> Result<(StatusCode, Json<ImageResponse>)> {
    let image = state.images.update_image(image_id, request, &org.0).await?;
    let response = load_response(&state, image.id, &org).await?;
    Ok((StatusCode::CREATED, Json(response)))
}
