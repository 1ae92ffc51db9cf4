//! Account aggregation - merges transactions into per-customer loyalty accounts.
//!
//! Every write follows the same cycle: take the customer's lock, open a database
//! transaction, append the entry if it is new, fold the full history back into
//! the derived fields, persist, commit. Because the derived fields are always
//! recomputed from the stored history, re-applying a transaction that is
//! already present leaves the account exactly as it was (apart from
//! `last_updated`).

use crate::{
    core::{
        context::LoyaltyContext,
        rules::{self, HistoryPoint, Redemption, Tier},
    },
    entities::{Account, AccountEntry, account, account_entry, transaction},
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use serde::Serialize;
use tracing::{debug, info, instrument};

/// Result of applying one transaction to an account.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountState {
    /// The account as persisted after the update
    pub account: account::Model,
    /// False when the transaction was already in the history
    pub entry_appended: bool,
    /// True when this transaction opened the account
    pub created: bool,
}

/// Values derived from an account's history at one evaluation time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountTotals {
    /// Sum of entry amounts
    pub lifetime_spend: f64,
    /// Number of entries
    pub lifetime_purchases: i64,
    /// Sum of entry points
    pub lifetime_points: i64,
    /// Points inside the current window
    pub active_points: i64,
    /// Redeemable points and their currency value
    pub redemption: Redemption,
    /// Tier for the lifetime totals
    pub tier: Tier,
}

/// Folds an account's history into its derived fields.
pub fn derive_totals(
    entries: &[account_entry::Model],
    subscription_date: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<AccountTotals> {
    let lifetime_spend: f64 = entries.iter().map(|entry| entry.amount).sum();
    let lifetime_purchases = i64::try_from(entries.len())?;
    let lifetime_points = entries
        .iter()
        .fold(0_i64, |total, entry| total.saturating_add(entry.points_awarded));

    let history: Vec<HistoryPoint> = entries.iter().map(HistoryPoint::from).collect();
    let active_points = rules::active_points(&history, subscription_date, now);

    Ok(AccountTotals {
        lifetime_spend,
        lifetime_purchases,
        lifetime_points,
        active_points,
        redemption: rules::redemption(active_points),
        tier: rules::classify_tier(lifetime_purchases, lifetime_spend),
    })
}

fn write_totals(model: &mut account::ActiveModel, totals: &AccountTotals, now: DateTime<Utc>) {
    model.lifetime_spend = Set(totals.lifetime_spend);
    model.lifetime_purchases = Set(totals.lifetime_purchases);
    model.lifetime_points = Set(totals.lifetime_points);
    model.active_points = Set(totals.active_points);
    model.redeemable_points = Set(totals.redemption.points);
    model.redeemable_amount = Set(totals.redemption.amount);
    model.tier = Set(totals.tier.as_str().to_string());
    model.last_updated = Set(now);
}

/// Loads an account's history, oldest first.
pub async fn get_entries_for_account<C>(
    db: &C,
    customer_id: &str,
) -> Result<Vec<account_entry::Model>>
where
    C: ConnectionTrait,
{
    AccountEntry::find()
        .filter(account_entry::Column::CustomerId.eq(customer_id))
        .order_by_asc(account_entry::Column::Date)
        .order_by_asc(account_entry::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

async fn open_account<C>(
    db: &C,
    transaction: &transaction::Model,
    now: DateTime<Utc>,
) -> Result<account::Model>
where
    C: ConnectionTrait,
{
    let model = account::ActiveModel {
        customer_id: Set(transaction.customer_id.clone()),
        display_name: Set(transaction.customer_name.clone()),
        phone: Set(transaction.phone.clone()),
        email: Set(transaction.email.clone()),
        registered_at: Set(now),
        subscription_date: Set(transaction.date),
        lifetime_spend: Set(0.0),
        lifetime_purchases: Set(0),
        lifetime_points: Set(0),
        active_points: Set(0),
        redeemable_points: Set(0),
        redeemable_amount: Set(0.0),
        tier: Set(Tier::Base.as_str().to_string()),
        last_updated: Set(now),
    };

    let created = model.insert(db).await?;
    info!(
        "Opened account for customer {} with subscription date {}",
        created.customer_id, created.subscription_date
    );
    Ok(created)
}

/// Appends a history entry unless the transaction is already recorded.
///
/// Returns whether an entry was written.
async fn append_entry<C>(
    db: &C,
    transaction: &transaction::Model,
    now: DateTime<Utc>,
) -> Result<bool>
where
    C: ConnectionTrait,
{
    let already_recorded = AccountEntry::find()
        .filter(account_entry::Column::CustomerId.eq(transaction.customer_id.as_str()))
        .filter(account_entry::Column::TransactionId.eq(transaction.id))
        .one(db)
        .await?
        .is_some();

    if already_recorded {
        debug!(
            "Transaction {} already in history of customer {}",
            transaction.id, transaction.customer_id
        );
        return Ok(false);
    }

    let entry = account_entry::ActiveModel {
        customer_id: Set(transaction.customer_id.clone()),
        transaction_id: Set(transaction.id),
        date: Set(transaction.date),
        store: Set(transaction.store.clone()),
        item: Set(transaction.item.clone()),
        quantity: Set(transaction.quantity),
        amount: Set(transaction.amount),
        points_awarded: Set(transaction.points_awarded),
        recorded_at: Set(now),
        ..Default::default()
    };
    entry.insert(db).await?;
    Ok(true)
}

/// Recomputes and persists every derived field of `account` from its stored history.
///
/// Callers must hold the customer's lock.
pub async fn recompute_account<C>(
    db: &C,
    account: account::Model,
    now: DateTime<Utc>,
) -> Result<account::Model>
where
    C: ConnectionTrait,
{
    let entries = get_entries_for_account(db, &account.customer_id).await?;
    let totals = derive_totals(&entries, account.subscription_date, now)?;

    let mut model: account::ActiveModel = account.into();
    write_totals(&mut model, &totals, now);
    model.update(db).await.map_err(Into::into)
}

/// Applies a recorded transaction to its customer's account, evaluated at the current time.
pub async fn apply_transaction(
    ctx: &LoyaltyContext,
    transaction: &transaction::Model,
) -> Result<AccountState> {
    apply_transaction_at(ctx, transaction, Utc::now()).await
}

/// Applies a recorded transaction to its customer's account, evaluated at `now`.
///
/// Creates the account on the customer's first transaction, anchoring its
/// subscription date at the transaction date. Re-applying a transaction whose
/// id is already in the history appends nothing but still recomputes.
#[instrument(
    skip(ctx, transaction),
    fields(customer_id = %transaction.customer_id, transaction_id = transaction.id)
)]
pub async fn apply_transaction_at(
    ctx: &LoyaltyContext,
    transaction: &transaction::Model,
    now: DateTime<Utc>,
) -> Result<AccountState> {
    if transaction.customer_id.trim().is_empty() {
        return Err(Error::Validation {
            message: format!("Transaction {} has no customer id", transaction.id),
        });
    }

    let _guard = ctx.locks.acquire(&transaction.customer_id).await;
    let txn = ctx.database.begin().await?;

    let existing = Account::find_by_id(transaction.customer_id.clone())
        .one(&txn)
        .await?;
    let created = existing.is_none();
    let account = match existing {
        Some(account) => account,
        None => open_account(&txn, transaction, now).await?,
    };

    let subscription_date = account.subscription_date;
    let entry_appended = append_entry(&txn, transaction, now).await?;

    // Latest receipt wins for contact details, but blanks never erase them
    let mut model: account::ActiveModel = account.into();
    if !transaction.customer_name.trim().is_empty() {
        model.display_name = Set(transaction.customer_name.clone());
    }
    if let Some(phone) = &transaction.phone {
        model.phone = Set(Some(phone.clone()));
    }
    if let Some(email) = &transaction.email {
        model.email = Set(Some(email.clone()));
    }

    let entries = get_entries_for_account(&txn, &transaction.customer_id).await?;
    let totals = derive_totals(&entries, subscription_date, now)?;
    write_totals(&mut model, &totals, now);

    let account = model.update(&txn).await?;
    txn.commit().await?;

    info!(
        "Applied transaction {} to customer {}: appended={}, tier={}, active_points={}, redeemable_points={}",
        transaction.id,
        account.customer_id,
        entry_appended,
        account.tier,
        account.active_points,
        account.redeemable_points
    );

    Ok(AccountState {
        account,
        entry_appended,
        created,
    })
}
