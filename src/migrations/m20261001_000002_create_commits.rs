//! Migration: Create commits and installed_packages tables

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Commits::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Commits::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Commits::OrgId).string().not_null())
                    .col(
                        ColumnDef::new(Commits::Status)
                            .string()
                            .not_null()
                            .default("CREATED"),
                    )
                    .col(ColumnDef::new(Commits::Arch).string().not_null())
                    .col(ColumnDef::new(Commits::OsTreeCommit).string().null())
                    .col(ColumnDef::new(Commits::OsTreeParentCommit).string().null())
                    .col(ColumnDef::new(Commits::OsTreeRef).string().not_null())
                    .col(ColumnDef::new(Commits::OsTreeParentUrl).text().null())
                    .col(ColumnDef::new(Commits::ImageBuildTarUrl).text().null())
                    .col(ColumnDef::new(Commits::ImageBuildHash).string().null())
                    .col(ColumnDef::new(Commits::ComposeJobId).string().null())
                    .col(ColumnDef::new(Commits::BuildDate).string().not_null())
                    .col(
                        ColumnDef::new(Commits::BuildNumber)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(
                        ColumnDef::new(Commits::ExternalUrl)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(ColumnDef::new(Commits::RepoId).big_integer().null())
                    .col(
                        ColumnDef::new(Commits::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Commits::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_commits_status")
                    .table(Commits::Table)
                    .col(Commits::Status)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(InstalledPackages::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(InstalledPackages::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(InstalledPackages::CommitId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(InstalledPackages::Name).string().not_null())
                    .col(ColumnDef::new(InstalledPackages::Arch).string().not_null())
                    .col(ColumnDef::new(InstalledPackages::Version).string().not_null())
                    .col(ColumnDef::new(InstalledPackages::Release).string().not_null())
                    .col(ColumnDef::new(InstalledPackages::Epoch).string().null())
                    .col(
                        ColumnDef::new(InstalledPackages::PackageType)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(InstalledPackages::Signature).string().null())
                    .foreign_key(
                        ForeignKey::create()
                            .from(InstalledPackages::Table, InstalledPackages::CommitId)
                            .to(Commits::Table, Commits::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_installed_packages_commit")
                    .table(InstalledPackages::Table)
                    .col(InstalledPackages::CommitId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .table(InstalledPackages::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(Commits::Table).if_exists().to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum Commits {
    Table,
    Id,
    OrgId,
    Status,
    Arch,
    OsTreeCommit,
    OsTreeParentCommit,
    OsTreeRef,
    OsTreeParentUrl,
    ImageBuildTarUrl,
    ImageBuildHash,
    ComposeJobId,
    BuildDate,
    BuildNumber,
    ExternalUrl,
    RepoId,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum InstalledPackages {
    Table,
    Id,
    CommitId,
    Name,
    Arch,
    Version,
    Release,
    Epoch,
    PackageType,
    Signature,
}
