//! Database configuration module.
//!
//! This module handles `SQLite` database connections and table creation using `SeaORM`.
//! Two databases are involved: the row store of record (accounts, transactions,
//! preferences, shared rate snapshot) and the device-local state store. Tables are
//! generated from the entity definitions with `Schema::create_table_from_entity`, so
//! the schema always matches the Rust structs.

use crate::entities::{Account, CurrencyRates, LocalState, Transaction, UserPreferences};
use crate::errors::Result;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, EntityTrait, Schema};
use tracing::{debug, info};

/// Connects to the database at `url`.
pub async fn connect(url: &str) -> Result<DatabaseConnection> {
    debug!("Connecting to database: {}", url);
    Database::connect(url).await.map_err(Into::into)
}

async fn create_table<C, E>(db: &C, entity: E) -> Result<()>
where
    C: ConnectionTrait,
    E: EntityTrait,
{
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);
    let mut statement = schema.create_table_from_entity(entity);
    statement.if_not_exists();
    db.execute(builder.build(&statement)).await?;
    Ok(())
}

/// Creates the row-store tables: accounts, transactions, user preferences and
/// currency rates.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    create_table(db, Account).await?;
    create_table(db, Transaction).await?;
    create_table(db, UserPreferences).await?;
    create_table(db, CurrencyRates).await?;
    info!("Store tables ready");
    Ok(())
}

/// Creates the device-local state table.
pub async fn create_local_tables(db: &DatabaseConnection) -> Result<()> {
    create_table(db, LocalState).await?;
    info!("Local state table ready");
    Ok(())
}

/// Connects to the row store and ensures its tables exist.
pub async fn open_store(url: &str) -> Result<DatabaseConnection> {
    let db = connect(url).await?;
    create_tables(&db).await?;
    Ok(db)
}

/// Connects to the local state database and ensures its table exists.
pub async fn open_local(url: &str) -> Result<DatabaseConnection> {
    let db = connect(url).await?;
    create_local_tables(&db).await?;
    Ok(db)
}
