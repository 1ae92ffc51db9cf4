//! Shared test utilities for the loyalty ledger.
//!
//! This module provides common helper functions for setting up test databases
//! and creating transactions and accounts with sensible defaults.

use crate::{
    core::{
        context::LoyaltyContext,
        rules,
        transaction::{NewTransaction, record_transaction},
    },
    entities::{account, transaction},
    errors::Result,
};
use chrono::{DateTime, TimeZone, Utc};
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Creates a context over a fresh in-memory database with default settings.
pub async fn setup_test_context() -> Result<LoyaltyContext> {
    Ok(LoyaltyContext::new(setup_test_db().await?))
}

/// Fixed reference time used as "now" and as the first purchase date in tests.
pub fn anchor_date() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0)
        .single()
        .unwrap_or_default()
}

/// Records a test transaction with sensible defaults.
///
/// # Defaults
/// * `customer_name`: `"Test Customer"`
/// * `store`: `"Test Store"`
/// * `quantity`: 1
pub async fn record_test_transaction(
    ctx: &LoyaltyContext,
    customer_id: &str,
    date: DateTime<Utc>,
    amount: f64,
) -> Result<transaction::Model> {
    let mut new_transaction = NewTransaction::new(customer_id, date, amount);
    new_transaction.customer_name = "Test Customer".to_string();
    new_transaction.store = "Test Store".to_string();
    record_transaction(&ctx.database, new_transaction).await
}

/// Builds a transaction model without touching storage.
pub fn transaction_model(
    id: i64,
    customer_id: &str,
    date: DateTime<Utc>,
    amount: f64,
) -> transaction::Model {
    transaction::Model {
        id,
        customer_id: customer_id.to_string(),
        date,
        store: "Test Store".to_string(),
        brand: String::new(),
        channel: String::new(),
        customer_name: "Test Customer".to_string(),
        phone: None,
        email: None,
        item: String::new(),
        description: String::new(),
        quantity: 1,
        amount,
        category: String::new(),
        number: String::new(),
        points_awarded: rules::points_for_amount(amount),
    }
}

/// Inserts an account snapshot directly, bypassing aggregation.
///
/// Lifetime figures mirror `active_points` so the row stays self-consistent.
pub async fn insert_test_account(
    db: &DatabaseConnection,
    customer_id: &str,
    active_points: i64,
) -> Result<account::Model> {
    let redemption = rules::redemption(active_points);
    #[allow(clippy::cast_precision_loss)]
    let spend = active_points as f64;
    let date = anchor_date();

    let account = account::ActiveModel {
        customer_id: Set(customer_id.to_string()),
        display_name: Set(format!("Customer {customer_id}")),
        phone: Set(None),
        email: Set(None),
        registered_at: Set(date),
        subscription_date: Set(date),
        lifetime_spend: Set(spend),
        lifetime_purchases: Set(1),
        lifetime_points: Set(active_points),
        active_points: Set(active_points),
        redeemable_points: Set(redemption.points),
        redeemable_amount: Set(redemption.amount),
        tier: Set(rules::classify_tier(1, spend).to_string()),
        last_updated: Set(date),
    };

    Ok(account.insert(db).await?)
}

/// Installs a tracing subscriber that writes through the test harness.
pub fn init_test_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("trace")),
        )
        .with_test_writer()
        .try_init();
}
