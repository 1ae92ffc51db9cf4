//! Database configuration module for the loyalty ledger.
//!
//! This module handles `SQLite` database connection and table creation using `SeaORM`.
//! Tables are generated from the entity definitions with `Schema::create_table_from_entity`,
//! so the schema always matches the Rust structs. The secondary indexes the query paths
//! rely on are created here as well, including the unique `(customer_id, transaction_id)`
//! index that backs history de-duplication.

use crate::entities::{
    Account, AccountColumn, AccountEntry, AccountEntryColumn, Transaction, TransactionColumn,
};
use crate::errors::Result;
use sea_orm::sea_query::Index;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Schema};
use tracing::{debug, info, instrument};

const DEFAULT_DATABASE_URL: &str = "sqlite://loyalty.sqlite?mode=rwc";

/// Gets the database URL from environment variable or returns default `SQLite` path.
///
/// This function looks for `DATABASE_URL` in the environment and falls back to
/// a local `SQLite` file, created on first connect, if not found.
#[must_use]
pub fn get_database_url() -> String {
    std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string())
}

/// Establishes a connection to the database named by `DATABASE_URL`.
pub async fn create_connection() -> Result<DatabaseConnection> {
    let database_url = get_database_url();
    debug!("Connecting to database at {database_url}");
    Database::connect(&database_url).await.map_err(Into::into)
}

/// Creates all tables and indexes if they do not already exist.
///
/// Safe to call on every start-up.
#[instrument(skip(db))]
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let mut transaction_table = schema.create_table_from_entity(Transaction);
    let mut account_table = schema.create_table_from_entity(Account);
    let mut entry_table = schema.create_table_from_entity(AccountEntry);

    transaction_table.if_not_exists();
    account_table.if_not_exists();
    entry_table.if_not_exists();

    db.execute(builder.build(&transaction_table)).await?;
    db.execute(builder.build(&account_table)).await?;
    db.execute(builder.build(&entry_table)).await?;

    let transactions_by_customer = Index::create()
        .name("idx_transactions_customer_id")
        .table(Transaction)
        .col(TransactionColumn::CustomerId)
        .if_not_exists()
        .to_owned();
    let accounts_by_active_points = Index::create()
        .name("idx_accounts_active_points")
        .table(Account)
        .col(AccountColumn::ActivePoints)
        .if_not_exists()
        .to_owned();
    let unique_entry_per_transaction = Index::create()
        .name("idx_account_entries_customer_transaction")
        .table(AccountEntry)
        .col(AccountEntryColumn::CustomerId)
        .col(AccountEntryColumn::TransactionId)
        .unique()
        .if_not_exists()
        .to_owned();

    db.execute(builder.build(&transactions_by_customer)).await?;
    db.execute(builder.build(&accounts_by_active_points)).await?;
    db.execute(builder.build(&unique_entry_per_transaction)).await?;

    info!("Database tables and indexes ensured");
    Ok(())
}
