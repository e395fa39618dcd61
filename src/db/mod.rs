use sea_orm::{ Database, DatabaseConnection };
use sea_orm_migration::MigratorTrait;
use tracing::info;

use crate::error::Result;

pub mod entity;
pub use entity::*;

/// Connects to Postgres and brings the schema up to date.
pub async fn connect(database_url: &str) -> Result<DatabaseConnection> {
    let db = Database::connect(database_url).await?;
    info!("Database connected successfully");

    migration::Migrator::up(&db, None).await?;
    info!("Migrations completed successfully");

    Ok(db)
}
