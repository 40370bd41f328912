use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;

use crate::config::database::DatabaseConfig;
use crate::error::{AppError, Result};
use crate::migrations::Migrator;

pub type DbConn = DatabaseConnection;

/// Open the build database and bring its schema up to date
pub async fn connect(config: &DatabaseConfig) -> Result<DbConn> {
    tracing::info!(
        max_connections = config.max_connections,
        "Connecting to build database"
    );

    let mut opts = ConnectOptions::new(config.database_url.clone());
    opts.max_connections(config.max_connections)
        .min_connections(config.min_connections.min(config.max_connections))
        .connect_timeout(config.connect_timeout)
        .idle_timeout(config.idle_timeout)
        .sqlx_logging(false);

    let db = Database::connect(opts)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to connect to database: {}", e)))?;

    apply_migrations(&db).await?;
    Ok(db)
}

/// Apply any pending migrations for the build tables
pub async fn apply_migrations(db: &DbConn) -> Result<()> {
    let pending = Migrator::get_pending_migrations(db)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to read migration state: {}", e)))?;
    if pending.is_empty() {
        tracing::info!("Build schema is up to date");
        return Ok(());
    }

    tracing::info!(pending = pending.len(), "Applying build schema migrations");
    Migrator::up(db, None)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to run migrations: {}", e)))?;
    Ok(())
}
