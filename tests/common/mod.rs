//! Test helpers and utilities for integration testing.
//!
//! This module provides an in-memory database, scripted collaborators for
//! the image builder and files service, and fixtures for the build entities.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use sea_orm::{ActiveModelTrait, Database, DatabaseConnection, Set};
use sea_orm_migration::MigratorTrait;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use edgebuild::error::{AppError, Result};
use edgebuild::migrations::Migrator;
use edgebuild::models::{commit, repo, update_transaction, update_transaction_old_commit, BuildStatus};
use edgebuild::services::command::{CommandOutput, CommandSpec, ScriptedCommandRunner};
use edgebuild::services::files::{Downloader, Extractor, FilesService, Uploader};
use edgebuild::services::image_builder::{
    CommitMetadata, ComposeCommitRequest, ComposeInstallerRequest, ComposeStatusReport,
    ImageBuilder, PackageInfo,
};
use edgebuild::services::{
    BuildQueue, BuildSettings, FatalHandler, ImageService, OstreeCli, RepoBuilder, RepoSettings,
};
use edgebuild::state::AppState;

pub const ORG: &str = "org-1";
pub const STORAGE_URL: &str = "https://storage.test";
pub const SSH_KEY: &str = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIMk admin@fleet";

/// Create an in-memory SQLite database for testing
pub async fn create_test_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("Failed to create test database");

    // Run migrations using the Migrator
    Migrator::up(&db, None)
        .await
        .expect("Failed to run test migrations");

    db
}

// ============================================================================
// Scripted collaborators
// ============================================================================

/// Image builder whose compose outcomes are scripted per test
#[derive(Default)]
pub struct FakeImageBuilder {
    /// Statuses returned for commit composes, in order; SUCCESS once drained
    pub commit_statuses: Mutex<VecDeque<BuildStatus>>,
    pub installer_statuses: Mutex<VecDeque<BuildStatus>>,
    /// Keep reporting BUILDING for commit composes
    pub hold_commit: Mutex<bool>,
    pub reject_compose: Mutex<bool>,
    pub fail_status: Mutex<bool>,
    pub fail_metadata: Mutex<bool>,
    pub commit_requests: Mutex<Vec<ComposeCommitRequest>>,
    pub installer_requests: Mutex<Vec<ComposeInstallerRequest>>,
    pub status_calls: Mutex<Vec<String>>,
}

impl FakeImageBuilder {
    pub fn with_commit_statuses(statuses: &[BuildStatus]) -> Self {
        let builder = Self::default();
        builder.commit_statuses.lock().extend(statuses.iter().copied());
        builder
    }

    pub fn set_installer_statuses(&self, statuses: &[BuildStatus]) {
        self.installer_statuses.lock().extend(statuses.iter().copied());
    }

    pub fn status_calls_for(&self, prefix: &str) -> usize {
        self.status_calls
            .lock()
            .iter()
            .filter(|job| job.starts_with(prefix))
            .count()
    }
}

#[async_trait]
impl ImageBuilder for FakeImageBuilder {
    async fn compose_commit(&self, request: &ComposeCommitRequest) -> Result<String> {
        if *self.reject_compose.lock() {
            return Err(AppError::ImageBuilder(
                "image builder returned 400: bad request".to_string(),
            ));
        }
        let mut requests = self.commit_requests.lock();
        requests.push(request.clone());
        Ok(format!("commit-job-{}", requests.len()))
    }

    async fn compose_installer(&self, request: &ComposeInstallerRequest) -> Result<String> {
        let mut requests = self.installer_requests.lock();
        requests.push(request.clone());
        Ok(format!("installer-job-{}", requests.len()))
    }

    async fn get_compose_status(&self, _org_id: &str, job_id: &str) -> Result<ComposeStatusReport> {
        self.status_calls.lock().push(job_id.to_string());
        if *self.fail_status.lock() {
            return Err(AppError::ImageBuilder("status unavailable".to_string()));
        }

        if job_id.starts_with("commit") {
            let status = if *self.hold_commit.lock() {
                BuildStatus::Building
            } else {
                self.commit_statuses
                    .lock()
                    .pop_front()
                    .unwrap_or(BuildStatus::Success)
            };
            Ok(ComposeStatusReport {
                status,
                upload_url: Some(format!("https://builder.test/{}/commit.tar", job_id)),
            })
        } else {
            let status = self
                .installer_statuses
                .lock()
                .pop_front()
                .unwrap_or(BuildStatus::Success);
            Ok(ComposeStatusReport {
                status,
                upload_url: Some(format!("https://builder.test/{}/installer.iso", job_id)),
            })
        }
    }

    async fn get_metadata(&self, _org_id: &str, job_id: &str) -> Result<CommitMetadata> {
        if *self.fail_metadata.lock() {
            return Err(AppError::ImageBuilder("metadata unavailable".to_string()));
        }
        Ok(CommitMetadata {
            ostree_commit: format!("hash-{}", job_id),
            packages: vec![PackageInfo {
                name: "bash".to_string(),
                arch: "x86_64".to_string(),
                version: "5.1.8".to_string(),
                release: "6.el9".to_string(),
                epoch: None,
                package_type: "rpm".to_string(),
                signature: None,
            }],
        })
    }
}

pub const ISO_BYTES: &[u8] = b"iso-bytes";

/// Writes fixed bytes instead of fetching
#[derive(Default)]
pub struct FakeDownloader {
    pub calls: Mutex<Vec<(String, PathBuf)>>,
}

#[async_trait]
impl Downloader for FakeDownloader {
    async fn download_to_path(&self, url: &str, path: &Path) -> Result<()> {
        self.calls.lock().push((url.to_string(), path.to_path_buf()));
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let body: &[u8] = if url.ends_with(".iso") { ISO_BYTES } else { b"tar-bytes" };
        tokio::fs::write(path, body).await?;
        Ok(())
    }
}

/// Lays down an empty `repo/` tree where the archive would be extracted
#[derive(Default)]
pub struct FakeExtractor {
    pub calls: Mutex<Vec<(PathBuf, PathBuf)>>,
}

#[async_trait]
impl Extractor for FakeExtractor {
    async fn extract(&self, archive: &Path, dest: &Path) -> Result<()> {
        self.calls
            .lock()
            .push((archive.to_path_buf(), dest.to_path_buf()));
        tokio::fs::create_dir_all(dest.join("repo")).await?;
        tokio::fs::write(dest.join("repo/config"), "[core]\nmode=archive-z2\n").await?;
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingUploader {
    pub files: Mutex<Vec<String>>,
    pub repos: Mutex<Vec<String>>,
}

#[async_trait]
impl Uploader for RecordingUploader {
    async fn upload_file(&self, local: &Path, key: &str) -> Result<String> {
        if !local.exists() {
            return Err(AppError::Internal(format!("{} missing", local.display())));
        }
        self.files.lock().push(key.to_string());
        Ok(format!("{}/{}", STORAGE_URL, key))
    }

    async fn upload_repo(&self, local_dir: &Path, key: &str, _acl: &str) -> Result<String> {
        if !local_dir.is_dir() {
            return Err(AppError::Internal(format!("{} missing", local_dir.display())));
        }
        self.repos.lock().push(key.to_string());
        Ok(format!("{}/{}", STORAGE_URL, key))
    }
}

#[derive(Default)]
pub struct RecordingFatal {
    pub messages: Mutex<Vec<String>>,
}

impl FatalHandler for RecordingFatal {
    fn fatal(&self, message: &str) {
        self.messages.lock().push(message.to_string());
    }
}

/// Revision reported by `ostree rev-parse`: `rev-<hash>` for a staged old
/// commit, `rev-target` for the repo being assembled
pub fn fake_revision(spec: &CommandSpec) -> String {
    let path = spec.args.get(2).cloned().unwrap_or_default();
    match path.find("staging/") {
        Some(idx) => {
            let hash = path[idx + "staging/".len()..]
                .split('/')
                .next()
                .unwrap_or_default()
                .to_string();
            format!("rev-{}", hash)
        }
        None => "rev-target".to_string(),
    }
}

/// Runner answering rev-parse with [`fake_revision`] and succeeding otherwise
pub fn ostree_runner() -> ScriptedCommandRunner {
    ScriptedCommandRunner::new(|spec| {
        if spec.has_arg("rev-parse") {
            CommandOutput::ok(format!("{}\n", fake_revision(spec)))
        } else {
            CommandOutput::ok("")
        }
    })
}

/// Like [`ostree_runner`] but fails every command containing `subcommand`
pub fn ostree_runner_failing(subcommand: &'static str) -> ScriptedCommandRunner {
    ScriptedCommandRunner::new(move |spec| {
        if spec.has_arg(subcommand) {
            CommandOutput::failed(1, format!("{} failed", subcommand))
        } else if spec.has_arg("rev-parse") {
            CommandOutput::ok(format!("{}\n", fake_revision(spec)))
        } else {
            CommandOutput::ok("")
        }
    })
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub db: DatabaseConnection,
    pub builder: Arc<FakeImageBuilder>,
    pub runner: ScriptedCommandRunner,
    pub downloader: Arc<FakeDownloader>,
    pub extractor: Arc<FakeExtractor>,
    pub uploader: Arc<RecordingUploader>,
    pub fatal: Arc<RecordingFatal>,
    pub repos: RepoBuilder,
    pub images: Arc<ImageService>,
    pub queue: BuildQueue,
    pub cancel: CancellationToken,
    pub temp: TempDir,
}

impl Harness {
    pub fn work_root(&self) -> PathBuf {
        self.temp.path().join("repos")
    }

    pub fn app_state(&self) -> AppState {
        AppState::new(
            self.db.clone(),
            self.images.clone(),
            self.repos.clone(),
            self.queue.clone(),
            self.temp.path().join("storage"),
        )
    }
}

pub async fn harness() -> Harness {
    harness_with(FakeImageBuilder::default(), ostree_runner()).await
}

pub async fn harness_with(builder: FakeImageBuilder, runner: ScriptedCommandRunner) -> Harness {
    let db = create_test_db().await;
    let temp = tempfile::tempdir().expect("Failed to create temp dir");

    let builder = Arc::new(builder);
    let downloader = Arc::new(FakeDownloader::default());
    let extractor = Arc::new(FakeExtractor::default());
    let uploader = Arc::new(RecordingUploader::default());
    let fatal = Arc::new(RecordingFatal::default());
    let files = FilesService::new(downloader.clone(), extractor.clone(), uploader.clone());

    let repos = RepoBuilder::new(
        db.clone(),
        files.clone(),
        OstreeCli::new(Arc::new(runner.clone()), "ostree"),
        RepoSettings {
            temp_path: temp.path().join("repos"),
        },
    )
    .with_fatal_handler(fatal.clone());

    let cancel = CancellationToken::new();
    let queue = BuildQueue::new(16, 2, cancel.clone());

    let settings = BuildSettings {
        poll_interval: Duration::from_millis(5),
        iso_script: PathBuf::from("/usr/local/bin/fleetkick.sh"),
        kickstart_template: None,
        work_dir: temp.path().join("isos"),
        default_distribution: "rhel-90".to_string(),
        default_arch: "x86_64".to_string(),
    };

    let images = Arc::new(
        ImageService::new(
            db.clone(),
            builder.clone(),
            repos.clone(),
            files,
            Arc::new(runner.clone()),
            queue.clone(),
            settings,
        )
        .with_fatal_handler(fatal.clone()),
    );

    Harness {
        db,
        builder,
        runner,
        downloader,
        extractor,
        uploader,
        fatal,
        repos,
        images,
        queue,
        cancel,
        temp,
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub async fn insert_commit(db: &DatabaseConnection, hash: &str, external: bool) -> commit::Model {
    let now = Utc::now();
    commit::ActiveModel {
        org_id: Set(ORG.to_string()),
        status: Set(BuildStatus::Success.as_str().to_string()),
        arch: Set("x86_64".to_string()),
        os_tree_commit: Set(Some(hash.to_string())),
        os_tree_parent_commit: Set(None),
        os_tree_ref: Set("rhel/9/x86_64/edge".to_string()),
        os_tree_parent_url: Set(None),
        image_build_tar_url: Set(Some(format!("https://builder.test/{}.tar", hash))),
        image_build_hash: Set(Some(hash.to_string())),
        compose_job_id: Set(None),
        build_date: Set("2026-10-18".to_string()),
        build_number: Set(1),
        external_url: Set(external),
        repo_id: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap()
}

pub async fn insert_repo(db: &DatabaseConnection, commit_id: i64) -> repo::Model {
    let now = Utc::now();
    repo::ActiveModel {
        commit_id: Set(commit_id),
        status: Set(BuildStatus::Building.as_str().to_string()),
        url: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap()
}

pub async fn insert_update(
    db: &DatabaseConnection,
    commit_id: Option<i64>,
    repo_id: Option<i64>,
    old_commits: &[(i64, i32)],
) -> update_transaction::Model {
    let now = Utc::now();
    let update = update_transaction::ActiveModel {
        org_id: Set(ORG.to_string()),
        status: Set(BuildStatus::Created.as_str().to_string()),
        commit_id: Set(commit_id),
        repo_id: Set(repo_id),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap();

    for (commit_id, position) in old_commits {
        update_transaction_old_commit::ActiveModel {
            update_transaction_id: Set(update.id),
            commit_id: Set(*commit_id),
            position: Set(*position),
        }
        .insert(db)
        .await
        .unwrap();
    }

    update
}

/// Wait until `check` passes, polling every 10ms for up to 5s
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..500 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
