//! Migration: Create installers table

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Installers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Installers::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Installers::OrgId).string().not_null())
                    .col(
                        ColumnDef::new(Installers::Status)
                            .string()
                            .not_null()
                            .default("CREATED"),
                    )
                    .col(ColumnDef::new(Installers::ImageBuildIsoUrl).text().null())
                    .col(ColumnDef::new(Installers::ComposeJobId).string().null())
                    .col(ColumnDef::new(Installers::SshKey).text().not_null())
                    .col(ColumnDef::new(Installers::Username).string().not_null())
                    .col(ColumnDef::new(Installers::Checksum).string().null())
                    .col(
                        ColumnDef::new(Installers::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Installers::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Installers::Table).if_exists().to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum Installers {
    Table,
    Id,
    OrgId,
    Status,
    ImageBuildIsoUrl,
    ComposeJobId,
    SshKey,
    Username,
    Checksum,
    CreatedAt,
    UpdatedAt,
}
