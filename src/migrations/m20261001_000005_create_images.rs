//! Migration: Create images table

use sea_orm_migration::prelude::*;

use super::m20261001_000001_create_image_sets::ImageSets;
use super::m20261001_000002_create_commits::Commits;
use super::m20261001_000004_create_installers::Installers;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Images::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Images::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Images::Name).string().not_null())
                    .col(ColumnDef::new(Images::Description).text().null())
                    .col(ColumnDef::new(Images::OrgId).string().not_null())
                    .col(ColumnDef::new(Images::Distribution).string().not_null())
                    .col(
                        ColumnDef::new(Images::Status)
                            .string()
                            .not_null()
                            .default("CREATED"),
                    )
                    .col(
                        ColumnDef::new(Images::Version)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(
                        ColumnDef::new(Images::OutputTypes)
                            .text()
                            .not_null()
                            .default("[\"commit\"]"),
                    )
                    .col(
                        ColumnDef::new(Images::Packages)
                            .text()
                            .not_null()
                            .default("[]"),
                    )
                    .col(ColumnDef::new(Images::ImageSetId).big_integer().not_null())
                    .col(ColumnDef::new(Images::CommitId).big_integer().not_null())
                    .col(ColumnDef::new(Images::InstallerId).big_integer().null())
                    .col(
                        ColumnDef::new(Images::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Images::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(Images::Table, Images::ImageSetId)
                            .to(ImageSets::Table, ImageSets::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(Images::Table, Images::CommitId)
                            .to(Commits::Table, Commits::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(Images::Table, Images::InstallerId)
                            .to(Installers::Table, Installers::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_images_image_set")
                    .table(Images::Table)
                    .col(Images::ImageSetId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Images::Table).if_exists().to_owned())
            .await
    }
}

#[derive(Iden)]
enum Images {
    Table,
    Id,
    Name,
    Description,
    OrgId,
    Distribution,
    Status,
    Version,
    OutputTypes,
    Packages,
    ImageSetId,
    CommitId,
    InstallerId,
    CreatedAt,
    UpdatedAt,
}
