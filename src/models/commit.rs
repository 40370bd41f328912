use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::build_status::{status_of, BuildStatus};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "commits")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub org_id: String,
    pub status: String, // 'CREATED', 'BUILDING', 'SUCCESS', 'ERROR'
    pub arch: String,
    pub os_tree_commit: Option<String>,
    pub os_tree_parent_commit: Option<String>,
    pub os_tree_ref: String,
    pub os_tree_parent_url: Option<String>,
    pub image_build_tar_url: Option<String>,
    pub image_build_hash: Option<String>,
    pub compose_job_id: Option<String>,
    pub build_date: String,
    pub build_number: i32,
    pub external_url: bool,
    pub repo_id: Option<i64>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::installed_package::Entity")]
    InstalledPackages,
}

impl Related<super::installed_package::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::InstalledPackages.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn build_status(&self) -> BuildStatus {
        status_of(&self.status)
    }

    /// Version metadata stamped onto the tree: `<build date>.<build number>`
    pub fn version_string(&self) -> String {
        format!("{}.{}", self.build_date, self.build_number)
    }
}
