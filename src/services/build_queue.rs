//! Bounded build queue
//!
//! Builds are handed to a fixed pool of workers through a bounded channel.
//! `submit` waits for capacity, so a burst of requests slows the caller down
//! instead of spawning unbounded work. All workers run on one `TaskTracker`
//! and observe one process-wide `CancellationToken`.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::error::{AppError, Result};
use crate::services::image::ImageService;
use crate::services::repo_builder::RepoBuilder;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildJob {
    PostProcessImage(i64),
    ImportRepo(i64),
    BuildUpdateRepo(i64),
}

impl fmt::Display for BuildJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildJob::PostProcessImage(id) => write!(f, "post-process image {}", id),
            BuildJob::ImportRepo(id) => write!(f, "import repo {}", id),
            BuildJob::BuildUpdateRepo(id) => write!(f, "build update repo {}", id),
        }
    }
}

#[async_trait]
pub trait BuildJobHandler: Send + Sync + 'static {
    /// Run one job. `cancel` fires when the process is shutting down.
    async fn handle(&self, job: BuildJob, cancel: CancellationToken) -> Result<()>;
}

#[derive(Clone)]
pub struct BuildQueue {
    tx: mpsc::Sender<BuildJob>,
    rx: Arc<parking_lot::Mutex<Option<mpsc::Receiver<BuildJob>>>>,
    tracker: TaskTracker,
    cancel: CancellationToken,
    workers: usize,
}

impl BuildQueue {
    pub fn new(capacity: usize, workers: usize, cancel: CancellationToken) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            tx,
            rx: Arc::new(parking_lot::Mutex::new(Some(rx))),
            tracker: TaskTracker::new(),
            cancel,
            workers: workers.max(1),
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Enqueue a job, waiting while the queue is full
    pub async fn submit(&self, job: BuildJob) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(AppError::ServiceUnavailable(
                "Build queue is shutting down".to_string(),
            ));
        }

        let sent: Result<()> = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(AppError::ServiceUnavailable(
                "Build queue is shutting down".to_string(),
            )),
            sent = self.tx.send(job) => sent.map_err(|_| {
                AppError::ServiceUnavailable("Build queue is closed".to_string())
            }),
        };
        sent?;

        tracing::debug!(job = %job, "Queued build job");
        Ok(())
    }

    /// Spawn the workers. Calling this more than once has no effect.
    pub fn start(&self, handler: Arc<dyn BuildJobHandler>) {
        let Some(rx) = self.rx.lock().take() else {
            tracing::warn!("Build queue workers already started");
            return;
        };
        let rx = Arc::new(Mutex::new(rx));

        for worker in 0..self.workers {
            let rx = rx.clone();
            let handler = handler.clone();
            let cancel = self.cancel.clone();
            self.tracker
                .spawn(async move { run_worker(worker, rx, handler, cancel).await });
        }

        tracing::info!(workers = self.workers, "Build queue started");
    }

    /// Cancel in-flight builds and wait for every worker to finish
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        tracing::info!("Build queue stopped");
    }
}

async fn run_worker(
    worker: usize,
    rx: Arc<Mutex<mpsc::Receiver<BuildJob>>>,
    handler: Arc<dyn BuildJobHandler>,
    cancel: CancellationToken,
) {
    loop {
        let job = {
            let mut rx = rx.lock().await;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                job = rx.recv() => job,
            }
        };

        let Some(job) = job else {
            break;
        };
        run_job(worker, job, handler.as_ref(), &cancel).await;
    }

    // Jobs still queued at shutdown are handed over with the cancelled token
    // so their entities are closed out instead of left BUILDING
    loop {
        let job = rx.lock().await.try_recv();
        let Ok(job) = job else {
            break;
        };
        run_job(worker, job, handler.as_ref(), &cancel).await;
    }

    tracing::debug!(worker, "Build worker exiting");
}

async fn run_job(
    worker: usize,
    job: BuildJob,
    handler: &dyn BuildJobHandler,
    cancel: &CancellationToken,
) {
    tracing::info!(worker, job = %job, "Build job started");
    match handler.handle(job, cancel.clone()).await {
        Ok(()) => tracing::info!(worker, job = %job, "Build job finished"),
        Err(e) => tracing::error!(worker, job = %job, error = %e, "Build job failed"),
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Routes queued jobs to the image orchestrator and repo assembler
pub struct BuildDispatcher {
    images: Arc<ImageService>,
    repos: RepoBuilder,
}

impl BuildDispatcher {
    pub fn new(images: Arc<ImageService>, repos: RepoBuilder) -> Self {
        Self { images, repos }
    }
}

#[async_trait]
impl BuildJobHandler for BuildDispatcher {
    async fn handle(&self, job: BuildJob, cancel: CancellationToken) -> Result<()> {
        match job {
            BuildJob::PostProcessImage(id) => self.images.post_process_image(id, cancel).await,
            BuildJob::ImportRepo(id) => {
                let repo = self.repos.get_repo(id).await?;
                if cancel.is_cancelled() {
                    let err = AppError::Cancelled(format!("Repo {} import not started", id));
                    self.repos.fail_repo(&repo, &err).await;
                    return Err(err);
                }
                self.repos.import_repo(repo).await.map(|_| ())
            }
            BuildJob::BuildUpdateRepo(id) => {
                if cancel.is_cancelled() {
                    let err = AppError::Cancelled(format!("Update {} build not started", id));
                    self.repos.abandon_update(id, &err).await?;
                    return Err(err);
                }
                self.repos.build_update_repo(id).await.map(|_| ())
            }
        }
    }
}
