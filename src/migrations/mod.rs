pub use sea_orm_migration::prelude::*;

mod m20261001_000001_create_image_sets;
mod m20261001_000002_create_commits;
mod m20261001_000003_create_repos;
mod m20261001_000004_create_installers;
mod m20261001_000005_create_images;
mod m20261001_000006_create_update_transactions;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20261001_000001_create_image_sets::Migration),
            Box::new(m20261001_000002_create_commits::Migration),
            Box::new(m20261001_000003_create_repos::Migration),
            Box::new(m20261001_000004_create_installers::Migration),
            Box::new(m20261001_000005_create_images::Migration),
            Box::new(m20261001_000006_create_update_transactions::Migration),
        ]
    }
}
