use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::build_status::{status_of, BuildStatus};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "installers")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub org_id: String,
    pub status: String, // 'CREATED', 'BUILDING', 'SUCCESS', 'ERROR'
    pub image_build_iso_url: Option<String>,
    pub compose_job_id: Option<String>,
    pub ssh_key: String,
    pub username: String,
    pub checksum: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn build_status(&self) -> BuildStatus {
        status_of(&self.status)
    }
}
