//! OSTree repository assembly
//!
//! Turns a finished commit compose into a published OSTree repo, and merges
//! older commits into an update repo with static deltas so devices can move
//! between versions by fetching a binary patch.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    QueryOrder, Set,
};

use crate::config::repo::RepoConfig;
use crate::error::{AppError, Result};
use crate::models::prelude::*;
use crate::models::{commit, repo, update_transaction, update_transaction_old_commit, BuildStatus};
use crate::services::fatal::{ExitOnFatal, FatalHandler};
use crate::services::files::FilesService;
use crate::services::ostree::OstreeCli;

/// Fallback tarball name for commits without a build hash
const DEFAULT_TARBALL: &str = "repo.tar";
const REPO_ACL: &str = "public-read";

#[derive(Debug, Clone)]
pub struct RepoSettings {
    /// Scratch root; imports use `<root>/<repo id>`, updates `<root>/upd/<update id>`
    pub temp_path: PathBuf,
}

impl RepoSettings {
    pub fn from_config(config: &RepoConfig) -> Self {
        Self {
            temp_path: config.repo_temp_path.clone(),
        }
    }
}

/// OSTree checksums are hex; anything else must not reach a path
fn is_ostree_checksum(hash: &str) -> bool {
    !hash.is_empty() && hash.chars().all(|c| c.is_ascii_hexdigit())
}

/// Local tarball name for a commit. Stable per commit so a retried
/// download lands on the same path.
pub fn tarball_name(commit: &commit::Model) -> String {
    match commit.image_build_hash.as_deref() {
        Some(hash) if !hash.is_empty() => format!("{}.tar", hash),
        _ => DEFAULT_TARBALL.to_string(),
    }
}

pub fn tar_key(org_id: &str, repo_id: i64, file: &str) -> String {
    format!("v2/{}/tar/{}/{}", org_id, repo_id, file)
}

pub fn repo_key(org_id: &str, repo_id: i64) -> String {
    format!("v2/{}/repos/{}", org_id, repo_id)
}

pub fn update_key(org_id: &str, update_id: i64) -> String {
    format!("v2/{}/updates/{}", org_id, update_id)
}

#[derive(Clone)]
pub struct RepoBuilder {
    db: DatabaseConnection,
    files: FilesService,
    ostree: OstreeCli,
    settings: RepoSettings,
    fatal: Arc<dyn FatalHandler>,
}

impl RepoBuilder {
    pub fn new(
        db: DatabaseConnection,
        files: FilesService,
        ostree: OstreeCli,
        settings: RepoSettings,
    ) -> Self {
        Self {
            db,
            files,
            ostree,
            settings,
            fatal: Arc::new(ExitOnFatal),
        }
    }

    pub fn with_fatal_handler(mut self, fatal: Arc<dyn FatalHandler>) -> Self {
        self.fatal = fatal;
        self
    }

    pub async fn get_repo(&self, repo_id: i64) -> Result<repo::Model> {
        Repo::find_by_id(repo_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Repo {} not found", repo_id)))
    }

    // ========================================================================
    // Single commit import
    // ========================================================================

    /// Publish the repo for `repo`'s commit. The repo ends SUCCESS with a URL,
    /// or ERROR with the failure returned.
    pub async fn import_repo(&self, repo: repo::Model) -> Result<repo::Model> {
        tracing::info!(repo_id = repo.id, commit_id = repo.commit_id, "Importing repo");

        match self.import_repo_steps(&repo).await {
            Ok(url) => {
                let updated = self
                    .set_repo_status(&repo, BuildStatus::Success, Some(url))
                    .await?;
                tracing::info!(repo_id = repo.id, url = ?updated.url, "Repo imported");
                Ok(updated)
            }
            Err(e) => {
                tracing::error!(repo_id = repo.id, error = %e, "Repo import failed");
                self.fail_repo(&repo, &e).await;
                Err(e)
            }
        }
    }

    async fn import_repo_steps(&self, repo: &repo::Model) -> Result<String> {
        let commit = Commit::find_by_id(repo.commit_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| {
                AppError::InvalidArgument(format!("Repo {} has no commit", repo.id))
            })?;

        let work_dir = self.settings.temp_path.join(repo.id.to_string());
        tokio::fs::create_dir_all(&work_dir).await?;

        let tarball = self.download_version_repo(&commit, &work_dir).await?;

        if commit.external_url {
            self.upload_commit_tarball(&commit, repo.id, &tarball).await?;
        }

        let repo_dir = work_dir.join("repo");
        self.ostree
            .commit_version(&repo_dir, &commit.os_tree_ref, &commit.version_string())
            .await?;

        let url = self
            .files
            .uploader
            .upload_repo(&repo_dir, &repo_key(&commit.org_id, repo.id), REPO_ACL)
            .await?;

        if let Err(e) = tokio::fs::remove_dir_all(&work_dir).await {
            tracing::warn!(repo_id = repo.id, error = %e, "Failed to remove work directory");
        }

        Ok(url)
    }

    /// Copy the builder's tarball into our storage and point the commit at it
    async fn upload_commit_tarball(
        &self,
        commit: &commit::Model,
        repo_id: i64,
        tarball: &Path,
    ) -> Result<()> {
        let key = tar_key(&commit.org_id, repo_id, &tarball_name(commit));
        let url = self.files.uploader.upload_file(tarball, &key).await?;

        let mut active = commit.clone().into_active_model();
        active.image_build_tar_url = Set(Some(url));
        active.external_url = Set(false);
        active.updated_at = Set(Utc::now());
        active.update(&self.db).await?;

        tracing::debug!(commit_id = commit.id, key = %key, "Stored commit tarball");
        Ok(())
    }

    // ========================================================================
    // Update repo assembly
    // ========================================================================

    /// Assemble and publish the repo for an update transaction, grafting
    /// each old commit into it with a static delta to the target commit.
    pub async fn build_update_repo(&self, update_id: i64) -> Result<update_transaction::Model> {
        let update = UpdateTransaction::find_by_id(update_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Update {} not found", update_id)))?;

        let repo = self.find_update_repo(&update).await?;
        let commit = match update.commit_id {
            Some(id) => Commit::find_by_id(id).one(&self.db).await?,
            None => None,
        };

        let (commit, repo) = match (commit, repo) {
            (Some(commit), Some(repo)) => (commit, repo),
            (commit, repo) => {
                let missing = if commit.is_none() { "commit" } else { "repo" };
                let e = AppError::InvalidArgument(format!(
                    "Update {} has no {}",
                    update_id, missing
                ));
                tracing::error!(update_id, error = %e, "Update is missing its commit or repo");
                self.fail_update(&update, repo.as_ref(), &e).await;
                return Err(e);
            }
        };

        let old_commits = match self.load_old_commits(&update).await {
            Ok(commits) => commits,
            Err(e) => {
                tracing::error!(update_id, error = %e, "Update has unusable old commits");
                self.fail_update(&update, Some(&repo), &e).await;
                return Err(e);
            }
        };

        tracing::info!(
            update_id,
            commit_id = commit.id,
            repo_id = repo.id,
            old_commits = old_commits.len(),
            "Building update repo"
        );

        let update = self.set_update_status(&update, BuildStatus::Building).await?;
        let repo = self.set_repo_status(&repo, BuildStatus::Building, None).await?;

        match self
            .build_update_repo_steps(&update, &commit, &old_commits)
            .await
        {
            Ok(url) => {
                let update = self
                    .finish_update(&update, Some(&repo), BuildStatus::Success, Some(url))
                    .await?;
                tracing::info!(update_id, "Update repo published");
                Ok(update)
            }
            Err(e) => {
                tracing::error!(update_id, error = %e, "Update repo assembly failed");
                self.fail_update(&update, Some(&repo), &e).await;
                Err(e)
            }
        }
    }

    /// Close out an update whose build will not run, marking it and its
    /// repo ERROR
    pub async fn abandon_update(&self, update_id: i64, reason: &AppError) -> Result<()> {
        let update = UpdateTransaction::find_by_id(update_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Update {} not found", update_id)))?;
        let repo = self.find_update_repo(&update).await?;

        tracing::warn!(update_id, reason = %reason, "Abandoning update build");
        self.fail_update(&update, repo.as_ref(), reason).await;
        Ok(())
    }

    async fn find_update_repo(
        &self,
        update: &update_transaction::Model,
    ) -> Result<Option<repo::Model>> {
        Ok(match update.repo_id {
            Some(id) => Repo::find_by_id(id).one(&self.db).await?,
            None => None,
        })
    }

    /// Old commits in merge order. Every one must be resolvable before any
    /// download starts.
    async fn load_old_commits(
        &self,
        update: &update_transaction::Model,
    ) -> Result<Vec<commit::Model>> {
        let links = UpdateTransactionOldCommit::find()
            .filter(update_transaction_old_commit::Column::UpdateTransactionId.eq(update.id))
            .order_by_asc(update_transaction_old_commit::Column::Position)
            .all(&self.db)
            .await?;

        let mut commits = Vec::with_capacity(links.len());
        for link in links {
            let commit = Commit::find_by_id(link.commit_id)
                .one(&self.db)
                .await?
                .ok_or_else(|| {
                    AppError::InvalidArgument(format!("Old commit {} not found", link.commit_id))
                })?;

            match commit.os_tree_commit.as_deref() {
                None | Some("") => {
                    return Err(AppError::InvalidArgument(format!(
                        "Old commit {} has no ostree commit hash",
                        commit.id
                    )));
                }
                Some(hash) if !is_ostree_checksum(hash) => {
                    return Err(AppError::InvalidArgument(format!(
                        "Old commit {} has a malformed ostree commit hash",
                        commit.id
                    )));
                }
                Some(_) => {}
            }
            commits.push(commit);
        }
        Ok(commits)
    }

    async fn build_update_repo_steps(
        &self,
        update: &update_transaction::Model,
        commit: &commit::Model,
        old_commits: &[commit::Model],
    ) -> Result<String> {
        let work_dir = self
            .settings
            .temp_path
            .join("upd")
            .join(update.id.to_string());
        tokio::fs::create_dir_all(&work_dir).await?;

        self.download_version_repo(commit, &work_dir).await?;
        let target_repo = work_dir.join("repo");

        if !old_commits.is_empty() {
            let staging = work_dir.join("staging");
            let mut update_revision: Option<String> = None;

            for old in old_commits {
                let hash = old.os_tree_commit.as_deref().unwrap_or_default();
                let old_dir = staging.join(hash);
                tracing::info!(update_id = update.id, old_commit_id = old.id, "Merging old commit");

                self.download_version_repo(old, &old_dir).await?;
                let revision = self
                    .pull_local_static_deltas(
                        commit,
                        old,
                        &target_repo,
                        &old_dir.join("repo"),
                        update_revision.as_deref(),
                    )
                    .await?;
                update_revision = Some(revision);
            }

            tokio::fs::remove_dir_all(&staging).await?;
        }

        let url = self
            .files
            .uploader
            .upload_repo(&target_repo, &update_key(&update.org_id, update.id), REPO_ACL)
            .await?;

        if let Err(e) = tokio::fs::remove_dir_all(&work_dir).await {
            tracing::warn!(update_id = update.id, error = %e, "Failed to remove work directory");
        }

        Ok(url)
    }

    /// Copy `old_commit`'s objects into `target_repo` and generate the static
    /// delta from it to `update_commit`.
    pub async fn repo_pull_local_static_deltas(
        &self,
        update_commit: &commit::Model,
        old_commit: &commit::Model,
        target_repo: &Path,
        old_repo: &Path,
    ) -> Result<()> {
        self.pull_local_static_deltas(update_commit, old_commit, target_repo, old_repo, None)
            .await?;
        Ok(())
    }

    /// Returns the target revision so a caller merging several old commits
    /// resolves it only once.
    async fn pull_local_static_deltas(
        &self,
        update_commit: &commit::Model,
        old_commit: &commit::Model,
        target_repo: &Path,
        old_repo: &Path,
        update_revision: Option<&str>,
    ) -> Result<String> {
        let update_revision = match update_revision {
            Some(rev) => rev.to_string(),
            None => {
                self.ostree
                    .rev_parse(target_repo, &update_commit.os_tree_ref)
                    .await?
            }
        };
        let old_revision = self
            .ostree
            .rev_parse(old_repo, &old_commit.os_tree_ref)
            .await?;

        self.ostree
            .pull_local(target_repo, old_repo, &old_revision)
            .await?;
        self.ostree
            .static_delta_generate(target_repo, &old_revision, &update_revision)
            .await?;

        tracing::debug!(
            from = %old_revision,
            to = %update_revision,
            "Generated static delta"
        );
        Ok(update_revision)
    }

    // ========================================================================
    // Queue claims
    // ========================================================================

    /// Move the repo to BUILDING unless it already is. Returns false when a
    /// build already holds it.
    pub async fn claim_repo(&self, repo_id: i64) -> Result<bool> {
        let claimed = Repo::update_many()
            .col_expr(repo::Column::Status, Expr::value(BuildStatus::Building.as_str()))
            .col_expr(repo::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(repo::Column::Id.eq(repo_id))
            .filter(repo::Column::Status.ne(BuildStatus::Building.as_str()))
            .exec(&self.db)
            .await?;
        Ok(claimed.rows_affected > 0)
    }

    /// Put back the status a claimed repo had before its job could not be queued
    pub async fn release_repo(&self, repo: &repo::Model) -> Result<()> {
        Repo::update_many()
            .col_expr(repo::Column::Status, Expr::value(repo.status.clone()))
            .col_expr(repo::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(repo::Column::Id.eq(repo.id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    /// Move the update to BUILDING unless it already is. Returns false when a
    /// build already holds it.
    pub async fn claim_update(&self, update_id: i64) -> Result<bool> {
        let claimed = UpdateTransaction::update_many()
            .col_expr(
                update_transaction::Column::Status,
                Expr::value(BuildStatus::Building.as_str()),
            )
            .col_expr(update_transaction::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(update_transaction::Column::Id.eq(update_id))
            .filter(update_transaction::Column::Status.ne(BuildStatus::Building.as_str()))
            .exec(&self.db)
            .await?;
        Ok(claimed.rows_affected > 0)
    }

    pub async fn release_update(&self, update: &update_transaction::Model) -> Result<()> {
        UpdateTransaction::update_many()
            .col_expr(
                update_transaction::Column::Status,
                Expr::value(update.status.clone()),
            )
            .col_expr(update_transaction::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(update_transaction::Column::Id.eq(update.id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Download the commit's tarball into `dest` and extract it there.
    /// Returns the tarball path.
    pub async fn download_version_repo(
        &self,
        commit: &commit::Model,
        dest: &Path,
    ) -> Result<PathBuf> {
        let url = commit
            .image_build_tar_url
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| {
                AppError::InvalidArgument(format!("Commit {} has no tarball URL", commit.id))
            })?;

        tokio::fs::create_dir_all(dest).await?;
        let tarball = dest.join(tarball_name(commit));

        self.files.downloader.download_to_path(url, &tarball).await?;
        self.files.extractor.extract(&tarball, dest).await?;

        Ok(tarball)
    }

    async fn set_repo_status(
        &self,
        repo: &repo::Model,
        status: BuildStatus,
        url: Option<String>,
    ) -> Result<repo::Model> {
        let mut active = repo.clone().into_active_model();
        active.status = Set(status.as_str().to_string());
        if url.is_some() {
            active.url = Set(url);
        }
        active.updated_at = Set(Utc::now());
        Ok(active.update(&self.db).await?)
    }

    async fn set_update_status(
        &self,
        update: &update_transaction::Model,
        status: BuildStatus,
    ) -> Result<update_transaction::Model> {
        let mut active = update.clone().into_active_model();
        active.status = Set(status.as_str().to_string());
        active.updated_at = Set(Utc::now());
        Ok(active.update(&self.db).await?)
    }

    /// Mark the repo ERROR. If that cannot be persisted the fatal handler
    /// is invoked.
    pub async fn fail_repo(&self, repo: &repo::Model, err: &AppError) {
        if let Err(db_err) = self.set_repo_status(repo, BuildStatus::Error, None).await {
            let message = format!(
                "Failed to record error status for repo {}: {} (original error: {})",
                repo.id, db_err, err
            );
            self.fatal.fatal(&message);
        }
    }

    async fn fail_update(
        &self,
        update: &update_transaction::Model,
        repo: Option<&repo::Model>,
        err: &AppError,
    ) {
        if let Err(db_err) = self
            .finish_update(update, repo, BuildStatus::Error, None)
            .await
        {
            let message = format!(
                "Failed to record error status for update {}: {} (original error: {})",
                update.id, db_err, err
            );
            self.fatal.fatal(&message);
        }
    }

    /// Record the outcome on the update's repo (when there is one) and then
    /// on the update itself
    async fn finish_update(
        &self,
        update: &update_transaction::Model,
        repo: Option<&repo::Model>,
        status: BuildStatus,
        url: Option<String>,
    ) -> Result<update_transaction::Model> {
        if let Some(repo) = repo {
            self.set_repo_status(repo, status, url).await?;
        }
        self.set_update_status(update, status).await
    }
}
