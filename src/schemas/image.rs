use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{commit, image, installer, repo, OutputType};

fn default_output_types() -> Vec<OutputType> {
    vec![OutputType::Commit]
}

/// User data injected into an installer ISO's kickstart
#[derive(Debug, Clone, Deserialize)]
pub struct InstallerRequest {
    pub username: String,
    pub ssh_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateImageRequest {
    pub name: String,
    pub description: Option<String>,
    pub distribution: Option<String>,
    pub arch: Option<String>,
    #[serde(default = "default_output_types")]
    pub output_types: Vec<OutputType>,
    #[serde(default)]
    pub packages: Vec<String>,
    pub ostree_ref: Option<String>,
    pub installer: Option<InstallerRequest>,
}

impl CreateImageRequest {
    /// Requested outputs, deduplicated, always including the commit
    pub fn normalized_outputs(&self) -> Vec<OutputType> {
        let mut outputs = vec![OutputType::Commit];
        if self.output_types.contains(&OutputType::Installer) {
            outputs.push(OutputType::Installer);
        }
        outputs
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CommitSummary {
    pub id: i64,
    pub status: String,
    pub arch: String,
    pub os_tree_commit: Option<String>,
    pub os_tree_ref: String,
    pub version: String,
}

impl From<&commit::Model> for CommitSummary {
    fn from(commit: &commit::Model) -> Self {
        Self {
            id: commit.id,
            status: commit.status.clone(),
            arch: commit.arch.clone(),
            os_tree_commit: commit.os_tree_commit.clone(),
            os_tree_ref: commit.os_tree_ref.clone(),
            version: commit.version_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InstallerSummary {
    pub id: i64,
    pub status: String,
    pub iso_url: Option<String>,
    pub checksum: Option<String>,
}

impl From<&installer::Model> for InstallerSummary {
    fn from(installer: &installer::Model) -> Self {
        Self {
            id: installer.id,
            status: installer.status.clone(),
            iso_url: installer.image_build_iso_url.clone(),
            checksum: installer.checksum.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageResponse {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub distribution: String,
    pub status: String,
    pub version: i32,
    pub output_types: Vec<OutputType>,
    pub packages: Vec<String>,
    pub image_set_id: i64,
    pub commit: Option<CommitSummary>,
    pub installer: Option<InstallerSummary>,
    pub repo_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ImageResponse {
    pub fn from_parts(
        image: &image::Model,
        commit: Option<&commit::Model>,
        installer: Option<&installer::Model>,
        repo: Option<&repo::Model>,
    ) -> Self {
        Self {
            id: image.id,
            name: image.name.clone(),
            description: image.description.clone(),
            distribution: image.distribution.clone(),
            status: image.status.clone(),
            version: image.version,
            output_types: image.output_types(),
            packages: image.package_names(),
            image_set_id: image.image_set_id,
            commit: commit.map(CommitSummary::from),
            installer: installer.map(InstallerSummary::from),
            repo_url: repo.and_then(|r| r.url.clone()),
            created_at: image.created_at,
            updated_at: image.updated_at,
        }
    }
}
