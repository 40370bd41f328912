//! HTTP endpoint integration tests
//!
//! Covers:
//! - health check and the X-Org-Id requirement
//! - image create/get scoped to the calling org
//! - update lookup and build queuing, including the already-building conflict
//! - repo re-import queuing
//! - published files served under /storage

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use sea_orm::{ActiveModelTrait, EntityTrait, IntoActiveModel, Set};
use serde_json::Value;
use tower::util::ServiceExt;

mod common;
use common::{harness, insert_commit, insert_repo, insert_update, Harness, ORG};

use edgebuild::endpoints::create_router;
use edgebuild::models::prelude::*;
use edgebuild::models::BuildStatus;

fn app(h: &Harness) -> Router {
    create_router(h.app_state())
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

fn get(uri: &str, org: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("x-org-id", org)
        .body(Body::empty())
        .unwrap()
}

fn post_json(uri: &str, org: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("x-org-id", org)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

// ============================================================================
// Health and headers
// ============================================================================

#[tokio::test]
async fn test_health_check() {
    let h = harness().await;
    let response = app(&h)
        .oneshot(
            Request::builder()
                .uri("/api/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"OK");
}

#[tokio::test]
async fn test_missing_org_header_is_bad_request() {
    let h = harness().await;
    let request = Request::builder()
        .uri("/api/v1/images/1")
        .body(Body::empty())
        .unwrap();

    let (status, body) = send(app(&h), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"]
        .as_str()
        .unwrap_or_default()
        .contains("X-Org-Id"));
}

// ============================================================================
// Images
// ============================================================================

#[tokio::test]
async fn test_create_image_returns_building_image() {
    let h = harness().await;
    let (status, body) = send(
        app(&h),
        post_json(
            "/api/v1/images",
            ORG,
            serde_json::json!({
                "name": "kiosk",
                "packages": ["podman"],
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "BUILDING");
    assert_eq!(body["version"], 1);
    assert_eq!(body["output_types"], serde_json::json!(["commit"]));
    assert_eq!(body["commit"]["status"], "BUILDING");
    assert!(body["installer"].is_null());

    let id = body["id"].as_i64().unwrap();
    let (status, body) = send(app(&h), get(&format!("/api/v1/images/{}", id), ORG)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "kiosk");
}

#[tokio::test]
async fn test_image_of_other_org_is_not_found() {
    let h = harness().await;
    let (_, body) = send(
        app(&h),
        post_json("/api/v1/images", ORG, serde_json::json!({ "name": "kiosk" })),
    )
    .await;
    let id = body["id"].as_i64().unwrap();

    let (status, _) = send(app(&h), get(&format!("/api/v1/images/{}", id), "org-2")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_installer_image_without_user_is_rejected() {
    let h = harness().await;
    let (status, _) = send(
        app(&h),
        post_json(
            "/api/v1/images",
            ORG,
            serde_json::json!({
                "name": "kiosk",
                "output_types": ["commit", "installer"],
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_retry_of_building_image_conflicts() {
    let h = harness().await;
    let (_, body) = send(
        app(&h),
        post_json("/api/v1/images", ORG, serde_json::json!({ "name": "kiosk" })),
    )
    .await;
    let id = body["id"].as_i64().unwrap();

    let (status, _) = send(
        app(&h),
        post_json(
            &format!("/api/v1/images/{}/retry", id),
            ORG,
            serde_json::json!({}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

// ============================================================================
// Updates
// ============================================================================

#[tokio::test]
async fn test_get_update_lists_old_commits_in_order() {
    let h = harness().await;
    let commit = insert_commit(&h.db, "target", false).await;
    let repo = insert_repo(&h.db, commit.id).await;
    let a = insert_commit(&h.db, "a", false).await;
    let b = insert_commit(&h.db, "b", false).await;
    let update = insert_update(
        &h.db,
        Some(commit.id),
        Some(repo.id),
        &[(b.id, 1), (a.id, 0)],
    )
    .await;

    let (status, body) = send(app(&h), get(&format!("/api/v1/updates/{}", update.id), ORG)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "CREATED");
    assert_eq!(body["repo_id"], repo.id);
    assert_eq!(body["old_commit_ids"], serde_json::json!([a.id, b.id]));
}

#[tokio::test]
async fn test_build_update_is_queued() {
    let h = harness().await;
    let commit = insert_commit(&h.db, "target", false).await;
    let repo = insert_repo(&h.db, commit.id).await;
    let update = insert_update(&h.db, Some(commit.id), Some(repo.id), &[]).await;

    let (status, body) = send(
        app(&h),
        post_json(
            &format!("/api/v1/updates/{}/build", update.id),
            ORG,
            serde_json::json!({}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["id"], update.id);
    assert_eq!(body["queued"], true);
}

#[tokio::test]
async fn test_build_of_building_update_conflicts() {
    let h = harness().await;
    let commit = insert_commit(&h.db, "target", false).await;
    let repo = insert_repo(&h.db, commit.id).await;
    let update = insert_update(&h.db, Some(commit.id), Some(repo.id), &[]).await;

    let mut active = update.clone().into_active_model();
    active.status = Set(BuildStatus::Building.as_str().to_string());
    active.update(&h.db).await.unwrap();

    let (status, _) = send(
        app(&h),
        post_json(
            &format!("/api/v1/updates/{}/build", update.id),
            ORG,
            serde_json::json!({}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_second_build_request_conflicts_until_first_runs() {
    let h = harness().await;
    let commit = insert_commit(&h.db, "target", false).await;
    let repo = insert_repo(&h.db, commit.id).await;
    let update = insert_update(&h.db, Some(commit.id), Some(repo.id), &[]).await;
    let uri = format!("/api/v1/updates/{}/build", update.id);

    let (first, _) = send(app(&h), post_json(&uri, ORG, serde_json::json!({}))).await;
    let (second, body) = send(app(&h), post_json(&uri, ORG, serde_json::json!({}))).await;

    assert_eq!(first, StatusCode::ACCEPTED);
    assert_eq!(second, StatusCode::CONFLICT);
    assert!(body["detail"]
        .as_str()
        .unwrap_or_default()
        .contains("already building"));

    let update = UpdateTransaction::find_by_id(update.id)
        .one(&h.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(update.build_status(), BuildStatus::Building);
}

#[tokio::test]
async fn test_build_request_after_shutdown_releases_update() {
    let h = harness().await;
    let commit = insert_commit(&h.db, "target", false).await;
    let repo = insert_repo(&h.db, commit.id).await;
    let update = insert_update(&h.db, Some(commit.id), Some(repo.id), &[]).await;
    h.queue.shutdown().await;

    let (status, _) = send(
        app(&h),
        post_json(
            &format!("/api/v1/updates/{}/build", update.id),
            ORG,
            serde_json::json!({}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let update = UpdateTransaction::find_by_id(update.id)
        .one(&h.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(update.build_status(), BuildStatus::Created);
}

#[tokio::test]
async fn test_update_of_other_org_is_not_found() {
    let h = harness().await;
    let commit = insert_commit(&h.db, "target", false).await;
    let update = insert_update(&h.db, Some(commit.id), None, &[]).await;

    let (status, _) = send(
        app(&h),
        get(&format!("/api/v1/updates/{}", update.id), "org-2"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ============================================================================
// Repos
// ============================================================================

async fn failed_repo(h: &Harness) -> i64 {
    let commit = insert_commit(&h.db, "abc", false).await;
    let repo = insert_repo(&h.db, commit.id).await;
    let mut active = repo.clone().into_active_model();
    active.status = Set(BuildStatus::Error.as_str().to_string());
    active.update(&h.db).await.unwrap();
    repo.id
}

#[tokio::test]
async fn test_import_of_failed_repo_is_queued_once() {
    let h = harness().await;
    let repo_id = failed_repo(&h).await;
    let uri = format!("/api/v1/repos/{}/import", repo_id);

    let (status, body) = send(app(&h), post_json(&uri, ORG, serde_json::json!({}))).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["id"], repo_id);
    assert_eq!(body["queued"], true);

    let repo = Repo::find_by_id(repo_id).one(&h.db).await.unwrap().unwrap();
    assert_eq!(repo.build_status(), BuildStatus::Building);

    let (status, _) = send(app(&h), post_json(&uri, ORG, serde_json::json!({}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_import_of_other_org_repo_is_not_found() {
    let h = harness().await;
    let repo_id = failed_repo(&h).await;

    let (status, _) = send(
        app(&h),
        post_json(
            &format!("/api/v1/repos/{}/import", repo_id),
            "org-2",
            serde_json::json!({}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let repo = Repo::find_by_id(repo_id).one(&h.db).await.unwrap().unwrap();
    assert_eq!(repo.build_status(), BuildStatus::Error);
}

// ============================================================================
// Storage
// ============================================================================

#[tokio::test]
async fn test_storage_serves_published_files() {
    let h = harness().await;
    let dir = h.temp.path().join("storage/v2/org-1/tar/1");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("abc.tar"), b"tar-bytes").unwrap();

    let response = app(&h)
        .oneshot(
            Request::builder()
                .uri("/storage/v2/org-1/tar/1/abc.tar")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"tar-bytes");
}
