use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{repo, update_transaction};

#[derive(Debug, Clone, Serialize)]
pub struct UpdateResponse {
    pub id: i64,
    pub status: String,
    pub commit_id: Option<i64>,
    pub repo_id: Option<i64>,
    pub repo_url: Option<String>,
    pub old_commit_ids: Vec<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UpdateResponse {
    pub fn from_parts(
        update: &update_transaction::Model,
        repo: Option<&repo::Model>,
        old_commit_ids: Vec<i64>,
    ) -> Self {
        Self {
            id: update.id,
            status: update.status.clone(),
            commit_id: update.commit_id,
            repo_id: update.repo_id,
            repo_url: repo.and_then(|r| r.url.clone()),
            old_commit_ids,
            created_at: update.created_at,
            updated_at: update.updated_at,
        }
    }
}

/// Acknowledgement for work handed to the build queue
#[derive(Debug, Clone, Serialize)]
pub struct QueuedResponse {
    pub id: i64,
    pub queued: bool,
}
