//! Migration: Create image_sets table

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ImageSets::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ImageSets::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ImageSets::Name).string().not_null())
                    .col(ColumnDef::new(ImageSets::OrgId).string().not_null())
                    .col(
                        ColumnDef::new(ImageSets::Version)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(
                        ColumnDef::new(ImageSets::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ImageSets::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_image_sets_org_name")
                    .table(ImageSets::Table)
                    .col(ImageSets::OrgId)
                    .col(ImageSets::Name)
                    .unique()
                    .if_not_exists()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ImageSets::Table).if_exists().to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum ImageSets {
    Table,
    Id,
    Name,
    OrgId,
    Version,
    CreatedAt,
    UpdatedAt,
}
