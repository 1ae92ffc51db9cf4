//! Window refresh business logic
//!
//! Active points depend on when they are evaluated, but the aggregator only
//! recomputes an account when a transaction arrives for it. An account that
//! goes quiet keeps reporting last year's balance until something refreshes
//! it. This module sweeps every account and recomputes its derived fields at a
//! given time, one customer at a time under that customer's lock.

use crate::{
    core::{account::recompute_account, context::LoyaltyContext},
    entities::{Account, account},
    errors::Result,
};
use chrono::{DateTime, Utc};
use sea_orm::{QueryOrder, QuerySelect, TransactionTrait, prelude::*};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

/// Change to a single account made by a refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountRefreshResult {
    /// Customer whose account changed
    pub customer_id: String,
    /// Active points before the refresh
    pub old_active_points: i64,
    /// Active points after the refresh
    pub new_active_points: i64,
    /// Redeemable points before the refresh
    pub old_redeemable_points: i64,
    /// Redeemable points after the refresh
    pub new_redeemable_points: i64,
}

/// An account the refresh could not recompute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshFailure {
    /// Customer whose account was left as it was
    pub customer_id: String,
    /// Human-readable description
    pub message: String,
}

/// Outcome of refreshing every account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshResult {
    /// Accounts whose active or redeemable points changed
    pub changed_accounts: Vec<AccountRefreshResult>,
    /// Accounts whose recompute failed and were skipped
    pub failed_accounts: Vec<RefreshFailure>,
    /// Total number of accounts visited
    pub accounts_processed: usize,
    /// Evaluation time used for every account
    pub evaluated_at: DateTime<Utc>,
}

/// Recomputes one account under its customer's lock.
///
/// Returns the change, or `None` when the balances did not move or the
/// account no longer exists.
async fn refresh_account(
    ctx: &LoyaltyContext,
    customer_id: &str,
    now: DateTime<Utc>,
) -> Result<Option<AccountRefreshResult>> {
    let _guard = ctx.locks.acquire(customer_id).await;
    let txn = ctx.database.begin().await?;

    let Some(before) = Account::find_by_id(customer_id.to_string()).one(&txn).await? else {
        return Ok(None);
    };
    let (old_active_points, old_redeemable_points) =
        (before.active_points, before.redeemable_points);

    let after = recompute_account(&txn, before, now).await?;
    txn.commit().await?;

    if after.active_points == old_active_points && after.redeemable_points == old_redeemable_points
    {
        return Ok(None);
    }

    debug!(
        "Customer {customer_id}: active points {old_active_points} -> {}",
        after.active_points
    );
    Ok(Some(AccountRefreshResult {
        customer_id: customer_id.to_string(),
        old_active_points,
        new_active_points: after.active_points,
        old_redeemable_points,
        new_redeemable_points: after.redeemable_points,
    }))
}

/// Recomputes the derived fields of every account as of `now`.
///
/// Each account is refreshed in its own database transaction while holding
/// its customer's lock, so refreshes interleave safely with ingestion. A
/// failing account is recorded in the result and the sweep moves on.
#[instrument(skip(ctx))]
pub async fn refresh_active_points(
    ctx: &LoyaltyContext,
    now: DateTime<Utc>,
) -> Result<RefreshResult> {
    let customer_ids: Vec<String> = Account::find()
        .select_only()
        .column(account::Column::CustomerId)
        .order_by_asc(account::Column::CustomerId)
        .into_tuple()
        .all(&ctx.database)
        .await?;

    let mut changed_accounts = Vec::new();
    let mut failed_accounts = Vec::new();
    for customer_id in &customer_ids {
        match refresh_account(ctx, customer_id, now).await {
            Ok(Some(change)) => changed_accounts.push(change),
            Ok(None) => {}
            Err(e) => {
                warn!("Failed to refresh customer {customer_id}: {e}");
                failed_accounts.push(RefreshFailure {
                    customer_id: customer_id.clone(),
                    message: e.to_string(),
                });
            }
        }
    }

    info!(
        "Refreshed {} accounts, {} changed, {} failed",
        customer_ids.len(),
        changed_accounts.len(),
        failed_accounts.len()
    );

    Ok(RefreshResult {
        changed_accounts,
        failed_accounts,
        accounts_processed: customer_ids.len(),
        evaluated_at: now,
    })
}

/// Formats a refresh result into a human-readable summary string.
#[must_use]
pub fn format_refresh_summary(result: &RefreshResult) -> String {
    use std::fmt::Write;

    let mut summary = format!(
        "Points refresh - {} - Processed {} accounts, {} changed, {} failed\n",
        result.evaluated_at.format("%Y-%m-%d %H:%M UTC"),
        result.accounts_processed,
        result.changed_accounts.len(),
        result.failed_accounts.len()
    );

    for change in &result.changed_accounts {
        // Writing to a String cannot fail
        let _ = writeln!(
            summary,
            "  {}: active {} -> {}, redeemable {} -> {}",
            change.customer_id,
            change.old_active_points,
            change.new_active_points,
            change.old_redeemable_points,
            change.new_redeemable_points
        );
    }

    for failure in &result.failed_accounts {
        let _ = writeln!(summary, "  {}: failed: {}", failure.customer_id, failure.message);
    }

    summary
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::account::apply_transaction_at;
    use crate::core::query::get_points;
    use crate::test_utils::*;
    use chrono::Duration;
    use sea_orm::ConnectionTrait;

    #[tokio::test]
    async fn test_refresh_resets_quiet_accounts() -> Result<()> {
        let ctx = setup_test_context().await?;
        let t = anchor_date();

        let quiet = record_test_transaction(&ctx, "QUIET", t, 900.0).await?;
        apply_transaction_at(&ctx, &quiet, t).await?;
        let busy = record_test_transaction(&ctx, "BUSY", t + Duration::days(370), 600.0).await?;
        apply_transaction_at(&ctx, &busy, t + Duration::days(370)).await?;

        assert_eq!(get_points(&ctx, "QUIET").await?.unwrap().active_points, 900);

        let result = refresh_active_points(&ctx, t + Duration::days(400)).await?;
        assert_eq!(result.accounts_processed, 2);
        assert_eq!(result.changed_accounts.len(), 1);

        let change = &result.changed_accounts[0];
        assert_eq!(change.customer_id, "QUIET");
        assert_eq!(change.old_active_points, 900);
        assert_eq!(change.new_active_points, 0);
        assert_eq!(change.old_redeemable_points, 500);
        assert_eq!(change.new_redeemable_points, 0);

        let quiet = get_points(&ctx, "QUIET").await?.unwrap();
        assert_eq!(quiet.active_points, 0);
        assert_eq!(quiet.lifetime_points, 900);
        assert_eq!(get_points(&ctx, "BUSY").await?.unwrap().active_points, 600);
        Ok(())
    }

    #[tokio::test]
    async fn test_refresh_with_no_accounts() -> Result<()> {
        let ctx = setup_test_context().await?;
        let result = refresh_active_points(&ctx, anchor_date()).await?;
        assert_eq!(result.accounts_processed, 0);
        assert!(result.changed_accounts.is_empty());
        assert!(result.failed_accounts.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_refresh_continues_past_failing_accounts() -> Result<()> {
        let ctx = setup_test_context().await?;
        insert_test_account(&ctx.database, "A", 900).await?;
        insert_test_account(&ctx.database, "B", 600).await?;
        ctx.database
            .execute_unprepared("DROP TABLE account_entries")
            .await?;

        let result = refresh_active_points(&ctx, anchor_date()).await?;

        assert_eq!(result.accounts_processed, 2);
        assert!(result.changed_accounts.is_empty());
        let failed: Vec<&str> = result
            .failed_accounts
            .iter()
            .map(|f| f.customer_id.as_str())
            .collect();
        assert_eq!(failed, ["A", "B"]);

        // Failed accounts keep their last snapshot
        assert_eq!(get_points(&ctx, "A").await?.unwrap().active_points, 900);
        assert!(format_refresh_summary(&result).contains("2 failed"));
        Ok(())
    }

    #[test]
    fn test_format_refresh_summary() {
        let result = RefreshResult {
            changed_accounts: vec![AccountRefreshResult {
                customer_id: "V-1".to_string(),
                old_active_points: 900,
                new_active_points: 0,
                old_redeemable_points: 500,
                new_redeemable_points: 0,
            }],
            failed_accounts: vec![RefreshFailure {
                customer_id: "V-2".to_string(),
                message: "Database error: locked".to_string(),
            }],
            accounts_processed: 3,
            evaluated_at: anchor_date(),
        };

        let summary = format_refresh_summary(&result);
        assert!(summary.contains("Processed 3 accounts, 1 changed, 1 failed"));
        assert!(summary.contains("V-2: failed: Database error: locked"));
        assert!(summary.contains("V-1: active 900 -> 0, redeemable 500 -> 0"));
    }
}
