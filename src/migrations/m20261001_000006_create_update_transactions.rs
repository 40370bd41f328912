//! Migration: Create update_transactions and update_transaction_old_commits tables

use sea_orm_migration::prelude::*;

use super::m20261001_000002_create_commits::Commits;
use super::m20261001_000003_create_repos::Repos;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(UpdateTransactions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(UpdateTransactions::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(UpdateTransactions::OrgId).string().not_null())
                    .col(
                        ColumnDef::new(UpdateTransactions::Status)
                            .string()
                            .not_null()
                            .default("CREATED"),
                    )
                    .col(
                        ColumnDef::new(UpdateTransactions::CommitId)
                            .big_integer()
                            .null(),
                    )
                    .col(ColumnDef::new(UpdateTransactions::RepoId).big_integer().null())
                    .col(
                        ColumnDef::new(UpdateTransactions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(UpdateTransactions::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(UpdateTransactions::Table, UpdateTransactions::CommitId)
                            .to(Commits::Table, Commits::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(UpdateTransactions::Table, UpdateTransactions::RepoId)
                            .to(Repos::Table, Repos::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(UpdateTransactionOldCommits::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(UpdateTransactionOldCommits::UpdateTransactionId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(UpdateTransactionOldCommits::CommitId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(UpdateTransactionOldCommits::Position)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .primary_key(
                        Index::create()
                            .col(UpdateTransactionOldCommits::UpdateTransactionId)
                            .col(UpdateTransactionOldCommits::CommitId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(
                                UpdateTransactionOldCommits::Table,
                                UpdateTransactionOldCommits::UpdateTransactionId,
                            )
                            .to(UpdateTransactions::Table, UpdateTransactions::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(
                                UpdateTransactionOldCommits::Table,
                                UpdateTransactionOldCommits::CommitId,
                            )
                            .to(Commits::Table, Commits::Id),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .table(UpdateTransactionOldCommits::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(
                Table::drop()
                    .table(UpdateTransactions::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await
    }
}

#[derive(Iden)]
enum UpdateTransactions {
    Table,
    Id,
    OrgId,
    Status,
    CommitId,
    RepoId,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum UpdateTransactionOldCommits {
    Table,
    UpdateTransactionId,
    CommitId,
    Position,
}
