//! Image build orchestration
//!
//! Drives an image from request to final status: submits the commit compose,
//! polls it, publishes the commit's OSTree repo, builds and customizes the
//! installer ISO when one was requested, and folds the sub-statuses into the
//! image's final status.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::prelude::*;
use crate::models::{
    commit, image, image_set, installed_package, installer, repo, BuildStatus, OutputType,
};
use crate::schemas::{CreateImageRequest, InstallerRequest};
use crate::services::build_queue::{BuildJob, BuildQueue};
use crate::services::command::{run_checked, CommandRunner, CommandSpec};
use crate::services::fatal::{ExitOnFatal, FatalHandler};
use crate::services::files::{sha256_file, FilesService};
use crate::services::image_builder::{
    CommitMetadata, ComposeCommitRequest, ComposeInstallerRequest, ImageBuilder,
};
use crate::services::kickstart;
use crate::services::repo_builder::RepoBuilder;

// ============================================================================
// Settings
// ============================================================================

#[derive(Debug, Clone)]
pub struct BuildSettings {
    pub poll_interval: Duration,
    pub iso_script: PathBuf,
    pub kickstart_template: Option<PathBuf>,
    /// Scratch space for ISO customization
    pub work_dir: PathBuf,
    pub default_distribution: String,
    pub default_arch: String,
}

impl BuildSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_interval: Duration::from_secs(config.build.poll_interval_secs),
            iso_script: config.build.iso_script.clone(),
            kickstart_template: config.build.kickstart_template.clone(),
            work_dir: config.repo.repo_temp_path.join("isos"),
            default_distribution: config.image_builder.default_distribution.clone(),
            default_arch: config.image_builder.default_arch.clone(),
        }
    }
}

/// Default OSTree ref for a distribution, e.g. `rhel-90` -> `rhel/9/x86_64/edge`
pub fn default_ostree_ref(distribution: &str, arch: &str) -> String {
    let major = distribution
        .strip_prefix("rhel-")
        .and_then(|v| v.chars().next())
        .filter(|c| c.is_ascii_digit())
        .unwrap_or('9');
    format!("rhel/{}/{}/edge", major, arch)
}

/// File-name-safe form of an image name
fn iso_file_name(image_name: &str) -> String {
    let safe: String = image_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect();
    format!("{}.iso", safe)
}

pub fn iso_key(org_id: &str, installer_id: i64, file: &str) -> String {
    format!("v2/{}/isos/{}/{}", org_id, installer_id, file)
}

/// Parent commit/repo a new image version builds on
#[derive(Debug, Clone, Default)]
struct ParentRef {
    commit: Option<String>,
    url: Option<String>,
}

// ============================================================================
// Image service
// ============================================================================

pub struct ImageService {
    db: DatabaseConnection,
    builder: Arc<dyn ImageBuilder>,
    repos: RepoBuilder,
    files: FilesService,
    runner: Arc<dyn CommandRunner>,
    queue: BuildQueue,
    settings: BuildSettings,
    fatal: Arc<dyn FatalHandler>,
}

impl ImageService {
    pub fn new(
        db: DatabaseConnection,
        builder: Arc<dyn ImageBuilder>,
        repos: RepoBuilder,
        files: FilesService,
        runner: Arc<dyn CommandRunner>,
        queue: BuildQueue,
        settings: BuildSettings,
    ) -> Self {
        Self {
            db,
            builder,
            repos,
            files,
            runner,
            queue,
            settings,
            fatal: Arc::new(ExitOnFatal),
        }
    }

    pub fn with_fatal_handler(mut self, fatal: Arc<dyn FatalHandler>) -> Self {
        self.fatal = fatal;
        self
    }

    // ------------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------------

    pub async fn get_image_by_id(&self, image_id: i64) -> Result<image::Model> {
        Image::find_by_id(image_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Image {} not found", image_id)))
    }

    async fn get_commit(&self, commit_id: i64) -> Result<commit::Model> {
        Commit::find_by_id(commit_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Commit {} not found", commit_id)))
    }

    async fn get_installer(&self, image: &image::Model) -> Result<Option<installer::Model>> {
        match image.installer_id {
            Some(id) => Ok(Installer::find_by_id(id).one(&self.db).await?),
            None => Ok(None),
        }
    }

    /// Image with its commit, installer and published repo
    pub async fn image_details(
        &self,
        image_id: i64,
    ) -> Result<(
        image::Model,
        commit::Model,
        Option<installer::Model>,
        Option<repo::Model>,
    )> {
        let image = self.get_image_by_id(image_id).await?;
        let commit = self.get_commit(image.commit_id).await?;
        let installer = self.get_installer(&image).await?;
        let repo = match commit.repo_id {
            Some(id) => Repo::find_by_id(id).one(&self.db).await?,
            None => None,
        };
        Ok((image, commit, installer, repo))
    }

    // ------------------------------------------------------------------------
    // Creation
    // ------------------------------------------------------------------------

    /// Start a new image. Only the image set is persisted if the builder
    /// rejects the compose.
    pub async fn create_image(
        &self,
        request: CreateImageRequest,
        org_id: &str,
    ) -> Result<image::Model> {
        validate_request(&request)?;

        let image_set = self.find_or_create_image_set(&request.name, org_id).await?;
        self.start_build(request, org_id, image_set, 1, ParentRef::default())
            .await
    }

    /// Build the next version of an existing image on top of its commit
    pub async fn update_image(
        &self,
        image_id: i64,
        request: CreateImageRequest,
        org_id: &str,
    ) -> Result<image::Model> {
        validate_request(&request)?;

        let previous = self.get_image_by_id(image_id).await?;
        if previous.org_id != org_id {
            return Err(AppError::NotFound(format!("Image {} not found", image_id)));
        }

        let image_set = ImageSet::find_by_id(previous.image_set_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Image set {} not found", previous.image_set_id))
            })?;

        let latest = Image::find()
            .filter(image::Column::ImageSetId.eq(image_set.id))
            .order_by_desc(image::Column::Version)
            .one(&self.db)
            .await?;
        if latest.as_ref().map(|i| i.id) != Some(previous.id) {
            return Err(AppError::Conflict(format!(
                "Image {} is not the latest version of {}",
                image_id, image_set.name
            )));
        }

        let (_, commit, _, repo) = self.image_details(previous.id).await?;
        let parent_url = repo.and_then(|r| r.url);
        if commit.build_status() != BuildStatus::Success
            || commit.os_tree_commit.is_none()
            || parent_url.is_none()
        {
            return Err(AppError::BadRequest(format!(
                "Image {} has no published commit to update from",
                image_id
            )));
        }

        let parent = ParentRef {
            commit: commit.os_tree_commit.clone(),
            url: parent_url,
        };
        let request = CreateImageRequest {
            name: image_set.name.clone(),
            ..request
        };

        self.start_build(request, org_id, image_set, previous.version + 1, parent)
            .await
    }

    /// Re-run a failed image from a fresh compose
    pub async fn retry_create_image(&self, image_id: i64) -> Result<image::Model> {
        let (image, commit, installer, _) = self.image_details(image_id).await?;
        if image.build_status() != BuildStatus::Error {
            return Err(AppError::Conflict(format!(
                "Image {} is {} and cannot be retried",
                image_id, image.status
            )));
        }

        let compose = ComposeCommitRequest {
            org_id: image.org_id.clone(),
            distribution: image.distribution.clone(),
            arch: commit.arch.clone(),
            ostree_ref: commit.os_tree_ref.clone(),
            parent_url: commit.os_tree_parent_url.clone(),
            parent_commit: commit.os_tree_parent_commit.clone(),
            packages: image.package_names(),
        };
        let job_id = self.builder.compose_commit(&compose).await?;

        let now = Utc::now();
        let txn = self.db.begin().await?;

        let mut active_commit = commit.into_active_model();
        active_commit.status = Set(BuildStatus::Building.as_str().to_string());
        active_commit.compose_job_id = Set(Some(job_id));
        active_commit.os_tree_commit = Set(None);
        active_commit.updated_at = Set(now);
        active_commit.update(&txn).await?;

        if let Some(installer) = installer {
            let mut active = installer.into_active_model();
            active.status = Set(BuildStatus::Building.as_str().to_string());
            active.compose_job_id = Set(None);
            active.image_build_iso_url = Set(None);
            active.checksum = Set(None);
            active.updated_at = Set(now);
            active.update(&txn).await?;
        }

        let mut active_image = image.into_active_model();
        active_image.status = Set(BuildStatus::Building.as_str().to_string());
        active_image.updated_at = Set(now);
        let image = active_image.update(&txn).await?;

        txn.commit().await?;

        tracing::info!(image_id = image.id, "Retrying image build");
        self.enqueue(&image).await?;
        Ok(image)
    }

    async fn find_or_create_image_set(&self, name: &str, org_id: &str) -> Result<image_set::Model> {
        let existing = ImageSet::find()
            .filter(image_set::Column::OrgId.eq(org_id))
            .filter(image_set::Column::Name.eq(name))
            .one(&self.db)
            .await?;

        if let Some(set) = existing {
            // A set left behind by a rejected compose can be reused
            let has_images = Image::find()
                .filter(image::Column::ImageSetId.eq(set.id))
                .one(&self.db)
                .await?
                .is_some();
            if has_images {
                return Err(AppError::Conflict(format!(
                    "Image name already in use: {}",
                    name
                )));
            }
            return Ok(set);
        }

        let now = Utc::now();
        let set = image_set::ActiveModel {
            name: Set(name.to_string()),
            org_id: Set(org_id.to_string()),
            version: Set(1),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        Ok(set.insert(&self.db).await?)
    }

    async fn start_build(
        &self,
        request: CreateImageRequest,
        org_id: &str,
        image_set: image_set::Model,
        version: i32,
        parent: ParentRef,
    ) -> Result<image::Model> {
        let distribution = request
            .distribution
            .clone()
            .unwrap_or_else(|| self.settings.default_distribution.clone());
        let arch = request
            .arch
            .clone()
            .unwrap_or_else(|| self.settings.default_arch.clone());
        let ostree_ref = request
            .ostree_ref
            .clone()
            .unwrap_or_else(|| default_ostree_ref(&distribution, &arch));
        let outputs = request.normalized_outputs();

        let compose = ComposeCommitRequest {
            org_id: org_id.to_string(),
            distribution: distribution.clone(),
            arch: arch.clone(),
            ostree_ref: ostree_ref.clone(),
            parent_url: parent.url.clone(),
            parent_commit: parent.commit.clone(),
            packages: request.packages.clone(),
        };
        let job_id = self.builder.compose_commit(&compose).await.map_err(|e| {
            tracing::error!(org_id = %org_id, name = %request.name, error = %e, "Compose rejected");
            e
        })?;

        let now = Utc::now();
        let building = BuildStatus::Building.as_str().to_string();
        let txn = self.db.begin().await?;

        let commit = commit::ActiveModel {
            org_id: Set(org_id.to_string()),
            status: Set(building.clone()),
            arch: Set(arch),
            os_tree_commit: Set(None),
            os_tree_parent_commit: Set(parent.commit),
            os_tree_ref: Set(ostree_ref),
            os_tree_parent_url: Set(parent.url),
            image_build_tar_url: Set(None),
            image_build_hash: Set(None),
            compose_job_id: Set(Some(job_id)),
            build_date: Set(now.format("%Y-%m-%d").to_string()),
            build_number: Set(version),
            external_url: Set(true),
            repo_id: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let installer_id = match (outputs.contains(&OutputType::Installer), &request.installer) {
            (true, Some(InstallerRequest { username, ssh_key })) => {
                let installer = installer::ActiveModel {
                    org_id: Set(org_id.to_string()),
                    status: Set(building.clone()),
                    image_build_iso_url: Set(None),
                    compose_job_id: Set(None),
                    ssh_key: Set(ssh_key.trim().to_string()),
                    username: Set(username.clone()),
                    checksum: Set(None),
                    created_at: Set(now),
                    updated_at: Set(now),
                    ..Default::default()
                }
                .insert(&txn)
                .await?;
                Some(installer.id)
            }
            _ => None,
        };

        let image = image::ActiveModel {
            name: Set(request.name.clone()),
            description: Set(request.description.clone()),
            org_id: Set(org_id.to_string()),
            distribution: Set(distribution),
            status: Set(building),
            version: Set(version),
            output_types: Set(serde_json::to_string(&outputs)?),
            packages: Set(serde_json::to_string(&request.packages)?),
            image_set_id: Set(image_set.id),
            commit_id: Set(commit.id),
            installer_id: Set(installer_id),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        if image_set.version != version {
            let mut active_set = image_set.into_active_model();
            active_set.version = Set(version);
            active_set.updated_at = Set(now);
            active_set.update(&txn).await?;
        }

        txn.commit().await?;

        tracing::info!(
            image_id = image.id,
            commit_id = commit.id,
            installer_id = ?installer_id,
            version,
            "Image build started"
        );

        self.enqueue(&image).await?;
        Ok(image)
    }

    async fn enqueue(&self, image: &image::Model) -> Result<()> {
        if let Err(e) = self.queue.submit(BuildJob::PostProcessImage(image.id)).await {
            self.set_error_status_on_image(&e, image).await;
            return Err(e);
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Post-processing
    // ------------------------------------------------------------------------

    /// Run the build pipeline for an image until it reaches a final status.
    /// If `cancel` fires first, a still-BUILDING image is marked ERROR.
    pub async fn post_process_image(&self, image_id: i64, cancel: CancellationToken) -> Result<()> {
        let image = self.get_image_by_id(image_id).await?;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => self.handle_cancellation(image_id).await,
            result = self.process_image(&image) => result,
        }
    }

    async fn handle_cancellation(&self, image_id: i64) -> Result<()> {
        let image = self.get_image_by_id(image_id).await?;
        let err = AppError::Cancelled(format!("Image {} build interrupted", image_id));

        if image.build_status() == BuildStatus::Building {
            tracing::warn!(image_id, "Build interrupted, marking image as failed");
            self.set_error_status_on_image(&err, &image).await;
        }
        Err(err)
    }

    async fn process_image(&self, image: &image::Model) -> Result<()> {
        tracing::info!(image_id = image.id, "Post-processing image");

        let commit = self.wait_for_commit(image).await?;
        if commit.build_status() != BuildStatus::Success {
            let err = AppError::ImageBuilder(format!("Commit {} compose failed", commit.id));
            self.set_error_status_on_image(&err, image).await;
            return Err(err);
        }

        self.record_commit_metadata(&commit).await;

        let repo = match self.publish_commit_repo(&commit).await {
            Ok(repo) => repo,
            Err(e) => {
                self.set_error_status_on_image(&e, image).await;
                return Err(e);
            }
        };

        if image.has_output(OutputType::Installer) {
            if let Err(e) = self.build_installer(image, &commit, &repo).await {
                tracing::error!(image_id = image.id, error = %e, "Installer build failed");
            }
        }

        let image = self.set_final_image_status(image).await?;
        tracing::info!(image_id = image.id, status = %image.status, "Image build finished");
        Ok(())
    }

    /// Poll until the commit leaves BUILDING
    async fn wait_for_commit(&self, image: &image::Model) -> Result<commit::Model> {
        loop {
            let (commit, _) = self.update_image_status(image).await?;
            if commit.build_status() != BuildStatus::Building {
                return Ok(commit);
            }
            tokio::time::sleep(self.settings.poll_interval).await;
        }
    }

    /// Poll until the installer leaves BUILDING
    async fn wait_for_installer(&self, image: &image::Model) -> Result<installer::Model> {
        loop {
            let (_, installer) = self.update_image_status(image).await?;
            let installer = installer.ok_or_else(|| {
                AppError::InvalidArgument(format!("Image {} has no installer", image.id))
            })?;
            if installer.build_status() != BuildStatus::Building {
                return Ok(installer);
            }
            tokio::time::sleep(self.settings.poll_interval).await;
        }
    }

    /// One poll step. Queries the builder for every sub-build still BUILDING
    /// and persists a status only when it moved on. A builder error is final
    /// for that sub-build.
    pub async fn update_image_status(
        &self,
        image: &image::Model,
    ) -> Result<(commit::Model, Option<installer::Model>)> {
        let mut commit = self.get_commit(image.commit_id).await?;
        if commit.build_status() == BuildStatus::Building {
            if let Some(job_id) = commit.compose_job_id.clone() {
                let (status, upload_url) =
                    match self.builder.get_compose_status(&commit.org_id, &job_id).await {
                        Ok(report) => (report.status, report.upload_url),
                        Err(e) => {
                            tracing::error!(image_id = image.id, commit_id = commit.id, error = %e, "Commit status check failed");
                            (BuildStatus::Error, None)
                        }
                    };

                if status != BuildStatus::Building {
                    tracing::info!(image_id = image.id, commit_id = commit.id, status = %status, "Commit compose finished");
                    let mut active = commit.into_active_model();
                    active.status = Set(status.as_str().to_string());
                    if status == BuildStatus::Success {
                        active.image_build_tar_url = Set(upload_url);
                        active.external_url = Set(true);
                    }
                    active.updated_at = Set(Utc::now());
                    commit = active.update(&self.db).await?;
                }
            }
        }

        let mut installer = self.get_installer(image).await?;
        if let Some(current) = installer.take() {
            installer = Some(self.poll_installer(image, current).await?);
        }

        Ok((commit, installer))
    }

    async fn poll_installer(
        &self,
        image: &image::Model,
        installer: installer::Model,
    ) -> Result<installer::Model> {
        if installer.build_status() != BuildStatus::Building {
            return Ok(installer);
        }
        let Some(job_id) = installer.compose_job_id.clone() else {
            return Ok(installer);
        };

        let (status, upload_url) = match self
            .builder
            .get_compose_status(&installer.org_id, &job_id)
            .await
        {
            Ok(report) => (report.status, report.upload_url),
            Err(e) => {
                tracing::error!(image_id = image.id, installer_id = installer.id, error = %e, "Installer status check failed");
                (BuildStatus::Error, None)
            }
        };

        if status == BuildStatus::Building {
            return Ok(installer);
        }

        tracing::info!(image_id = image.id, installer_id = installer.id, status = %status, "Installer compose finished");
        let mut active = installer.into_active_model();
        active.status = Set(status.as_str().to_string());
        if status == BuildStatus::Success {
            active.image_build_iso_url = Set(upload_url);
        }
        active.updated_at = Set(Utc::now());
        Ok(active.update(&self.db).await?)
    }

    /// Store the commit hash and package list. Failures are only logged.
    async fn record_commit_metadata(&self, commit: &commit::Model) {
        let Some(job_id) = commit.compose_job_id.as_deref() else {
            return;
        };

        let metadata = match self.builder.get_metadata(&commit.org_id, job_id).await {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::warn!(commit_id = commit.id, error = %e, "Failed to fetch commit metadata");
                return;
            }
        };

        if let Err(e) = self.store_metadata(commit, metadata).await {
            tracing::warn!(commit_id = commit.id, error = %e, "Failed to store commit metadata");
        }
    }

    async fn store_metadata(&self, commit: &commit::Model, metadata: CommitMetadata) -> Result<()> {
        let txn = self.db.begin().await?;

        let mut active = commit.clone().into_active_model();
        active.os_tree_commit = Set(Some(metadata.ostree_commit.clone()));
        active.image_build_hash = Set(Some(metadata.ostree_commit));
        active.updated_at = Set(Utc::now());
        active.update(&txn).await?;

        InstalledPackage::delete_many()
            .filter(installed_package::Column::CommitId.eq(commit.id))
            .exec(&txn)
            .await?;

        let count = metadata.packages.len();
        let rows: Vec<installed_package::ActiveModel> = metadata
            .packages
            .into_iter()
            .map(|p| installed_package::ActiveModel {
                commit_id: Set(commit.id),
                name: Set(p.name),
                arch: Set(p.arch),
                version: Set(p.version),
                release: Set(p.release),
                epoch: Set(p.epoch),
                package_type: Set(p.package_type),
                signature: Set(p.signature),
                ..Default::default()
            })
            .collect();
        if !rows.is_empty() {
            InstalledPackage::insert_many(rows).exec(&txn).await?;
        }

        txn.commit().await?;
        tracing::debug!(commit_id = commit.id, packages = count, "Stored commit metadata");
        Ok(())
    }

    /// Create (or reuse) the commit's repo and run the import
    async fn publish_commit_repo(&self, commit: &commit::Model) -> Result<repo::Model> {
        let commit = self.get_commit(commit.id).await?;

        let existing = match commit.repo_id {
            Some(id) => Repo::find_by_id(id).one(&self.db).await?,
            None => None,
        };

        let repo = match existing {
            Some(repo) => {
                let mut active = repo.into_active_model();
                active.status = Set(BuildStatus::Building.as_str().to_string());
                active.updated_at = Set(Utc::now());
                active.update(&self.db).await?
            }
            None => {
                let now = Utc::now();
                let repo = repo::ActiveModel {
                    commit_id: Set(commit.id),
                    status: Set(BuildStatus::Building.as_str().to_string()),
                    url: Set(None),
                    created_at: Set(now),
                    updated_at: Set(now),
                    ..Default::default()
                }
                .insert(&self.db)
                .await?;

                let mut active = commit.into_active_model();
                active.repo_id = Set(Some(repo.id));
                active.updated_at = Set(now);
                active.update(&self.db).await?;
                repo
            }
        };

        self.repos.import_repo(repo).await
    }

    async fn build_installer(
        &self,
        image: &image::Model,
        commit: &commit::Model,
        repo: &repo::Model,
    ) -> Result<()> {
        let installer = self.get_installer(image).await?.ok_or_else(|| {
            AppError::InvalidArgument(format!("Image {} has no installer", image.id))
        })?;

        let request = ComposeInstallerRequest {
            org_id: image.org_id.clone(),
            distribution: image.distribution.clone(),
            arch: commit.arch.clone(),
            ostree_ref: commit.os_tree_ref.clone(),
            repo_url: repo.url.clone().unwrap_or_default(),
        };

        let job_id = match self.builder.compose_installer(&request).await {
            Ok(job_id) => job_id,
            Err(e) => {
                self.set_installer_status(&installer, BuildStatus::Error)
                    .await?;
                return Err(e);
            }
        };

        let mut active = installer.into_active_model();
        active.compose_job_id = Set(Some(job_id));
        active.status = Set(BuildStatus::Building.as_str().to_string());
        active.updated_at = Set(Utc::now());
        active.update(&self.db).await?;

        let installer = self.wait_for_installer(image).await?;
        if installer.build_status() != BuildStatus::Success {
            return Err(AppError::ImageBuilder(format!(
                "Installer {} compose failed",
                installer.id
            )));
        }

        if let Err(e) = self.add_user_info(image).await {
            let installer = self.get_installer(image).await?;
            if let Some(installer) = installer {
                self.set_installer_status(&installer, BuildStatus::Error)
                    .await?;
            }
            return Err(e);
        }
        Ok(())
    }

    async fn set_installer_status(
        &self,
        installer: &installer::Model,
        status: BuildStatus,
    ) -> Result<installer::Model> {
        let mut active = installer.clone().into_active_model();
        active.status = Set(status.as_str().to_string());
        active.updated_at = Set(Utc::now());
        Ok(active.update(&self.db).await?)
    }

    // ------------------------------------------------------------------------
    // ISO customization
    // ------------------------------------------------------------------------

    /// Inject the installer's user into the ISO, publish the result and
    /// record its URL and checksum
    pub async fn add_user_info(&self, image: &image::Model) -> Result<installer::Model> {
        let installer = self.get_installer(image).await?.ok_or_else(|| {
            AppError::InvalidArgument(format!("Image {} has no installer", image.id))
        })?;
        let source_url = installer
            .image_build_iso_url
            .clone()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| {
                AppError::InvalidArgument(format!("Installer {} has no ISO URL", installer.id))
            })?;

        let work_dir = self
            .settings
            .work_dir
            .join(format!("installer-{}", installer.id));
        tokio::fs::create_dir_all(&work_dir).await?;

        let result = self
            .customize_iso(image, &installer, &source_url, &work_dir)
            .await;

        if let Err(e) = tokio::fs::remove_dir_all(&work_dir).await {
            tracing::warn!(installer_id = installer.id, error = %e, "Failed to remove ISO work directory");
        }

        let (url, checksum) = result?;

        let mut active = installer.into_active_model();
        active.image_build_iso_url = Set(Some(url));
        active.checksum = Set(Some(checksum));
        active.updated_at = Set(Utc::now());
        let installer = active.update(&self.db).await?;

        tracing::info!(image_id = image.id, installer_id = installer.id, "Installer ISO customized");
        Ok(installer)
    }

    async fn customize_iso(
        &self,
        image: &image::Model,
        installer: &installer::Model,
        source_url: &str,
        work_dir: &Path,
    ) -> Result<(String, String)> {
        let file_name = iso_file_name(&image.name);
        let iso_path = work_dir.join(&file_name);
        self.files
            .downloader
            .download_to_path(source_url, &iso_path)
            .await?;

        let template = kickstart::load_template(self.settings.kickstart_template.as_deref()).await?;
        let rendered =
            kickstart::render_kickstart(&template, &installer.username, &installer.ssh_key)?;
        let kickstart_path = work_dir.join("finalKickstart.ks");
        tokio::fs::write(&kickstart_path, rendered).await?;

        let spec = CommandSpec::new(self.settings.iso_script.to_string_lossy())
            .path_arg(&kickstart_path)
            .path_arg(&iso_path)
            .path_arg(&iso_path)
            .current_dir(work_dir);
        run_checked(self.runner.as_ref(), &spec).await?;

        let checksum = sha256_file(&iso_path).await?;
        let url = self
            .files
            .uploader
            .upload_file(&iso_path, &iso_key(&image.org_id, installer.id, &file_name))
            .await?;

        Ok((url, checksum))
    }

    // ------------------------------------------------------------------------
    // Status aggregation
    // ------------------------------------------------------------------------

    /// Mark the image and its commit and installer ERROR. If that cannot be
    /// persisted the fatal handler is invoked.
    pub async fn set_error_status_on_image(&self, err: &AppError, image: &image::Model) {
        tracing::error!(image_id = image.id, error = %err, "Image build failed");

        if let Err(db_err) = self.mark_image_failed(image).await {
            let message = format!(
                "Failed to record error status for image {}: {} (original error: {})",
                image.id, db_err, err
            );
            self.fatal.fatal(&message);
        }
    }

    async fn mark_image_failed(&self, image: &image::Model) -> Result<()> {
        let now = Utc::now();
        let error = BuildStatus::Error.as_str().to_string();

        if let Some(commit) = Commit::find_by_id(image.commit_id).one(&self.db).await? {
            let mut active = commit.into_active_model();
            active.status = Set(error.clone());
            active.updated_at = Set(now);
            active.update(&self.db).await?;
        }

        if let Some(installer) = self.get_installer(image).await? {
            let mut active = installer.into_active_model();
            active.status = Set(error.clone());
            active.updated_at = Set(now);
            active.update(&self.db).await?;
        }

        let mut active = image.clone().into_active_model();
        active.status = Set(error);
        active.updated_at = Set(now);
        active.update(&self.db).await?;
        Ok(())
    }

    /// Fold commit and installer statuses into the image's final status
    pub async fn set_final_image_status(&self, image: &image::Model) -> Result<image::Model> {
        let commit = self.get_commit(image.commit_id).await?;
        let installer = self.get_installer(image).await?;

        let status = crate::models::final_image_status(
            &image.output_types(),
            commit.build_status(),
            installer.as_ref().map(|i| i.build_status()),
        );

        let mut active = image.clone().into_active_model();
        active.status = Set(status.as_str().to_string());
        active.updated_at = Set(Utc::now());
        Ok(active.update(&self.db).await?)
    }
}

fn validate_request(request: &CreateImageRequest) -> Result<()> {
    if request.name.trim().is_empty() {
        return Err(AppError::BadRequest("Image name is required".to_string()));
    }

    if request.normalized_outputs().contains(&OutputType::Installer) {
        let installer = request.installer.as_ref().ok_or_else(|| {
            AppError::BadRequest("Installer output requires username and ssh_key".to_string())
        })?;
        kickstart::validate_user_info(&installer.username, &installer.ssh_key)?;
    }

    Ok(())
}
