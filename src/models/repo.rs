use sea_orm::entity::prelude::*;
use sea_orm::ConnectionTrait;
use serde::{Deserialize, Serialize};

use super::build_status::{status_of, BuildStatus};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "repos")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// The commit this repo serves. Fixed at insert time.
    pub commit_id: i64,
    pub status: String, // 'CREATED', 'BUILDING', 'SUCCESS', 'ERROR'
    pub url: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::commit::Entity",
        from = "Column::CommitId",
        to = "super::commit::Column::Id"
    )]
    Commit,
}

#[async_trait::async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        if !insert && self.commit_id.is_set() {
            return Err(DbErr::Custom(
                "repo commit reference is immutable once created".to_string(),
            ));
        }
        Ok(self)
    }
}

impl Model {
    pub fn build_status(&self) -> BuildStatus {
        status_of(&self.status)
    }
}
