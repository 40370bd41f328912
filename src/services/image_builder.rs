//! Image-builder API client
//!
//! Submits edge-commit and edge-installer composes and reports their
//! progress. The orchestrator only sees the [`ImageBuilder`] trait so tests
//! can script compose outcomes.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::image_builder::ImageBuilderConfig;
use crate::error::{AppError, Result};
use crate::models::BuildStatus;

const ORG_HEADER: &str = "X-Org-Id";

// ============================================================================
// Domain types
// ============================================================================

/// Request to build an OSTree commit tarball
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeCommitRequest {
    pub org_id: String,
    pub distribution: String,
    pub arch: String,
    pub ostree_ref: String,
    /// Repo URL and revision of the previous version, when building an update
    pub parent_url: Option<String>,
    pub parent_commit: Option<String>,
    pub packages: Vec<String>,
}

/// Request to build an installer ISO from a published commit repo
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeInstallerRequest {
    pub org_id: String,
    pub distribution: String,
    pub arch: String,
    pub ostree_ref: String,
    pub repo_url: String,
}

/// Status of a compose job, mapped onto the entity status vocabulary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeStatusReport {
    pub status: BuildStatus,
    /// Where the finished artifact can be downloaded from
    pub upload_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInfo {
    pub name: String,
    pub arch: String,
    pub version: String,
    pub release: String,
    #[serde(default)]
    pub epoch: Option<String>,
    #[serde(rename = "type")]
    pub package_type: String,
    #[serde(default, rename = "sigmd5")]
    pub signature: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CommitMetadata {
    pub ostree_commit: String,
    #[serde(default)]
    pub packages: Vec<PackageInfo>,
}

#[async_trait]
pub trait ImageBuilder: Send + Sync {
    /// Submit a commit compose, returning the compose job id
    async fn compose_commit(&self, request: &ComposeCommitRequest) -> Result<String>;

    /// Submit an installer compose, returning the compose job id
    async fn compose_installer(&self, request: &ComposeInstallerRequest) -> Result<String>;

    async fn get_compose_status(&self, org_id: &str, job_id: &str) -> Result<ComposeStatusReport>;

    async fn get_metadata(&self, org_id: &str, job_id: &str) -> Result<CommitMetadata>;
}

// ============================================================================
// Wire format
// ============================================================================

#[derive(Debug, Serialize)]
struct ComposeRequest {
    distribution: String,
    image_requests: Vec<ImageRequest>,
    customizations: Customizations,
}

#[derive(Debug, Serialize)]
struct ImageRequest {
    architecture: String,
    image_type: &'static str,
    ostree: OstreeRequest,
    upload_request: UploadRequest,
}

#[derive(Debug, Serialize)]
struct OstreeRequest {
    #[serde(rename = "ref")]
    reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent: Option<String>,
}

#[derive(Debug, Serialize)]
struct UploadRequest {
    #[serde(rename = "type")]
    upload_type: &'static str,
    options: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct Customizations {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    packages: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ComposeResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ComposeStatusResponse {
    image_status: ImageStatus,
}

#[derive(Debug, Deserialize)]
struct ImageStatus {
    status: String,
    #[serde(default)]
    upload_status: Option<UploadStatus>,
}

#[derive(Debug, Deserialize)]
struct UploadStatus {
    options: UploadOptions,
}

#[derive(Debug, Deserialize)]
struct UploadOptions {
    #[serde(default)]
    url: Option<String>,
}

/// Map an image-builder compose status onto a build status
pub fn map_compose_status(status: &str) -> Option<BuildStatus> {
    match status {
        "success" => Some(BuildStatus::Success),
        "failure" => Some(BuildStatus::Error),
        "pending" | "building" | "uploading" | "registering" => Some(BuildStatus::Building),
        _ => None,
    }
}

// ============================================================================
// HTTP client
// ============================================================================

pub struct ImageBuilderClient {
    base_url: String,
    client: reqwest::Client,
}

impl ImageBuilderClient {
    pub fn new(config: &ImageBuilderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("edgebuild")
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn submit(&self, org_id: &str, body: &ComposeRequest) -> Result<String> {
        let url = format!("{}/compose", self.base_url);
        let response = self
            .client
            .post(&url)
            .header(ORG_HEADER, org_id)
            .json(body)
            .send()
            .await?;

        let response = check_status(response).await?;
        let compose: ComposeResponse = response.json().await?;
        Ok(compose.id)
    }
}

/// Turn a non-2xx answer into an `ImageBuilder` error carrying the body
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(AppError::ImageBuilder(format!(
        "image builder returned {}: {}",
        status,
        body.trim()
    )))
}

#[async_trait]
impl ImageBuilder for ImageBuilderClient {
    async fn compose_commit(&self, request: &ComposeCommitRequest) -> Result<String> {
        let body = ComposeRequest {
            distribution: request.distribution.clone(),
            image_requests: vec![ImageRequest {
                architecture: request.arch.clone(),
                image_type: "edge-commit",
                ostree: OstreeRequest {
                    reference: request.ostree_ref.clone(),
                    url: request.parent_url.clone(),
                    parent: request.parent_commit.clone(),
                },
                upload_request: UploadRequest {
                    upload_type: "aws.s3",
                    options: serde_json::json!({}),
                },
            }],
            customizations: Customizations {
                packages: request.packages.clone(),
            },
        };

        let job_id = self.submit(&request.org_id, &body).await?;
        tracing::info!(job_id = %job_id, org_id = %request.org_id, "Submitted commit compose");
        Ok(job_id)
    }

    async fn compose_installer(&self, request: &ComposeInstallerRequest) -> Result<String> {
        let body = ComposeRequest {
            distribution: request.distribution.clone(),
            image_requests: vec![ImageRequest {
                architecture: request.arch.clone(),
                image_type: "edge-installer",
                ostree: OstreeRequest {
                    reference: request.ostree_ref.clone(),
                    url: Some(request.repo_url.clone()),
                    parent: None,
                },
                upload_request: UploadRequest {
                    upload_type: "aws.s3",
                    options: serde_json::json!({}),
                },
            }],
            customizations: Customizations {
                packages: Vec::new(),
            },
        };

        let job_id = self.submit(&request.org_id, &body).await?;
        tracing::info!(job_id = %job_id, org_id = %request.org_id, "Submitted installer compose");
        Ok(job_id)
    }

    async fn get_compose_status(&self, org_id: &str, job_id: &str) -> Result<ComposeStatusReport> {
        let url = format!("{}/composes/{}", self.base_url, job_id);
        let response = self
            .client
            .get(&url)
            .header(ORG_HEADER, org_id)
            .send()
            .await?;

        let response = check_status(response).await?;
        let body: ComposeStatusResponse = response.json().await?;

        let status = map_compose_status(&body.image_status.status).ok_or_else(|| {
            AppError::ImageBuilder(format!(
                "unknown compose status '{}' for job {}",
                body.image_status.status, job_id
            ))
        })?;

        Ok(ComposeStatusReport {
            status,
            upload_url: body.image_status.upload_status.and_then(|u| u.options.url),
        })
    }

    async fn get_metadata(&self, org_id: &str, job_id: &str) -> Result<CommitMetadata> {
        let url = format!("{}/composes/{}/metadata", self.base_url, job_id);
        let response = self
            .client
            .get(&url)
            .header(ORG_HEADER, org_id)
            .send()
            .await?;

        let response = check_status(response).await?;
        Ok(response.json().await?)
    }
}
