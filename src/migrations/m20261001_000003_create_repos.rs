//! Migration: Create repos table

use sea_orm_migration::prelude::*;

use super::m20261001_000002_create_commits::Commits;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Repos::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Repos::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Repos::CommitId).big_integer().not_null())
                    .col(
                        ColumnDef::new(Repos::Status)
                            .string()
                            .not_null()
                            .default("BUILDING"),
                    )
                    .col(ColumnDef::new(Repos::Url).text().null())
                    .col(
                        ColumnDef::new(Repos::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Repos::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(Repos::Table, Repos::CommitId)
                            .to(Commits::Table, Commits::Id),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Repos::Table).if_exists().to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum Repos {
    Table,
    Id,
    CommitId,
    Status,
    Url,
    CreatedAt,
    UpdatedAt,
}
