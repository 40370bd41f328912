use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One historical commit merged into an update repo, ordered by `position`
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "update_transaction_old_commits")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub update_transaction_id: i64,
    #[sea_orm(primary_key, auto_increment = false)]
    pub commit_id: i64,
    pub position: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::update_transaction::Entity",
        from = "Column::UpdateTransactionId",
        to = "super::update_transaction::Column::Id",
        on_delete = "Cascade"
    )]
    UpdateTransaction,
    #[sea_orm(
        belongs_to = "super::commit::Entity",
        from = "Column::CommitId",
        to = "super::commit::Column::Id"
    )]
    Commit,
}

impl Related<super::update_transaction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::UpdateTransaction.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
