use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::build_status::{status_of, BuildStatus, OutputType};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "images")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub org_id: String,
    pub distribution: String,
    pub status: String, // 'CREATED', 'BUILDING', 'SUCCESS', 'ERROR'
    pub version: i32,
    pub output_types: String, // JSON array of output types
    pub packages: String,     // JSON array of package names
    pub image_set_id: i64,
    pub commit_id: i64,
    pub installer_id: Option<i64>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::image_set::Entity",
        from = "Column::ImageSetId",
        to = "super::image_set::Column::Id"
    )]
    ImageSet,
}

impl Related<super::image_set::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ImageSet.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn build_status(&self) -> BuildStatus {
        status_of(&self.status)
    }

    /// Requested outputs; a malformed column degrades to commit-only
    pub fn output_types(&self) -> Vec<OutputType> {
        serde_json::from_str(&self.output_types).unwrap_or_else(|_| vec![OutputType::Commit])
    }

    pub fn has_output(&self, output: OutputType) -> bool {
        self.output_types().contains(&output)
    }

    pub fn package_names(&self) -> Vec<String> {
        serde_json::from_str(&self.packages).unwrap_or_default()
    }
}
