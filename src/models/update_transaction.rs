use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::build_status::{status_of, BuildStatus};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "update_transactions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub org_id: String,
    pub status: String, // 'CREATED', 'BUILDING', 'SUCCESS', 'ERROR'
    /// Target commit devices are moved to
    pub commit_id: Option<i64>,
    pub repo_id: Option<i64>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::update_transaction_old_commit::Entity")]
    OldCommits,
}

impl Related<super::update_transaction_old_commit::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OldCommits.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn build_status(&self) -> BuildStatus {
        status_of(&self.status)
    }
}
