//! Periodic task scheduler
//!
//! A simple scheduler for running background tasks at regular intervals.
//! Add new tasks by implementing the `PeriodicTask` trait.

use async_trait::async_trait;
use sea_orm::DatabaseConnection;
use std::time::Duration;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;

use crate::config::build::BuildConfig;

/// Trait for periodic background tasks
#[async_trait]
pub trait PeriodicTask: Send + Sync {
    /// Task name for logging
    fn name(&self) -> &'static str;

    /// How often to run (e.g., every 15 minutes)
    fn interval(&self) -> Duration;

    /// Execute the task
    async fn run(&self, db: &DatabaseConnection) -> anyhow::Result<()>;
}

/// Start all enabled periodic tasks. They stop when `cancel` fires.
pub fn start_scheduler(db: DatabaseConnection, config: &BuildConfig, cancel: CancellationToken) {
    let mut tasks: Vec<Box<dyn PeriodicTask>> = Vec::new();

    if config.stale_recovery {
        tasks.push(Box::new(StaleBuildReaperTask::new(Duration::from_secs(
            config.stale_after_secs,
        ))));
    }

    if tasks.is_empty() {
        tracing::info!("No periodic tasks enabled");
        return;
    }

    for task in tasks {
        let db = db.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            run_task(task, db, cancel).await;
        });
    }

    tracing::info!("Periodic task scheduler started");
}

/// Run a single task on its interval
async fn run_task(task: Box<dyn PeriodicTask>, db: DatabaseConnection, cancel: CancellationToken) {
    let mut ticker = interval(task.interval());

    // Skip the first immediate tick
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        tracing::debug!(task = task.name(), "Running periodic task");

        match task.run(&db).await {
            Ok(()) => {
                tracing::debug!(task = task.name(), "Periodic task completed");
            }
            Err(e) => {
                tracing::error!(task = task.name(), error = %e, "Periodic task failed");
            }
        }
    }

    tracing::debug!(task = task.name(), "Periodic task stopped");
}

// ============================================================================
// Stale Build Reaper Task
// ============================================================================

use crate::models::prelude::*;
use crate::models::{commit, image, installer, repo, update_transaction, BuildStatus};
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};

/// Moves builds stuck in BUILDING past a cutoff to ERROR.
///
/// Each statement only matches rows that are still BUILDING, so replicas
/// running the task at the same time cannot overwrite each other's work.
pub struct StaleBuildReaperTask {
    stale_after: Duration,
}

impl StaleBuildReaperTask {
    pub fn new(stale_after: Duration) -> Self {
        Self { stale_after }
    }
}

macro_rules! reap {
    ($entity:ty, $module:ident, $db:expr, $now:expr, $cutoff:expr) => {
        <$entity>::update_many()
            .col_expr($module::Column::Status, Expr::value(BuildStatus::Error.as_str()))
            .col_expr($module::Column::UpdatedAt, Expr::value($now))
            .filter($module::Column::Status.eq(BuildStatus::Building.as_str()))
            .filter($module::Column::UpdatedAt.lt($cutoff))
            .exec($db)
            .await?
            .rows_affected
    };
}

#[async_trait]
impl PeriodicTask for StaleBuildReaperTask {
    fn name(&self) -> &'static str {
        "stale_build_reaper"
    }

    fn interval(&self) -> Duration {
        Duration::from_secs(15 * 60) // Every 15 minutes
    }

    async fn run(&self, db: &DatabaseConnection) -> anyhow::Result<()> {
        let now = Utc::now();
        let cutoff = now - chrono::Duration::from_std(self.stale_after)?;

        let images = reap!(Image, image, db, now, cutoff);
        let commits = reap!(Commit, commit, db, now, cutoff);
        let installers = reap!(Installer, installer, db, now, cutoff);
        let repos = reap!(Repo, repo, db, now, cutoff);
        let updates = reap!(UpdateTransaction, update_transaction, db, now, cutoff);

        if images + commits + installers + repos + updates > 0 {
            tracing::warn!(
                images,
                commits,
                installers,
                repos,
                updates,
                "Marked stale builds as failed"
            );
        }

        Ok(())
    }
}
