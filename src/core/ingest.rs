//! Batch ingestion - normalize, record and apply rows in arrival order.
//!
//! A batch never aborts on a bad row. Validation failures skip the row;
//! persistence failures are recorded against it; either way the next row is
//! processed. A transaction that was recorded but failed to apply stays in the
//! fact store and can be re-applied later, since application is idempotent.

use crate::{
    core::{
        account::{AccountState, apply_transaction_at},
        context::LoyaltyContext,
        transaction::{NewTransaction, RawTransaction, normalize, record_transaction},
    },
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{info, instrument, warn};

/// Why a row was not fully ingested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RowErrorKind {
    /// The row was malformed and skipped
    Validation,
    /// Storage failed while recording or applying the row
    Persistence,
}

/// A per-row failure collected during a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowError {
    /// 1-based position of the row within the batch
    pub row: usize,
    /// Customer the row belonged to, when it could be determined
    pub customer_id: Option<String>,
    /// Failure category
    pub kind: RowErrorKind,
    /// Human-readable description
    pub message: String,
}

impl RowError {
    fn new(row: usize, customer_id: Option<String>, error: &Error) -> Self {
        let kind = if error.is_validation() {
            RowErrorKind::Validation
        } else {
            RowErrorKind::Persistence
        };
        Self {
            row,
            customer_id,
            kind,
            message: error.to_string(),
        }
    }
}

/// Outcome of one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Rows recorded in the fact store
    pub records_processed: usize,
    /// Distinct customers whose accounts were updated
    pub accounts_updated: usize,
    /// Rows that were skipped or only partially ingested
    pub errors: Vec<RowError>,
}

/// Records one validated transaction and applies it to its account.
pub async fn ingest_transaction(
    ctx: &LoyaltyContext,
    new_transaction: NewTransaction,
    now: DateTime<Utc>,
) -> Result<AccountState> {
    let recorded = record_transaction(&ctx.database, new_transaction).await?;
    apply_transaction_at(ctx, &recorded, now).await
}

/// Ingests a batch of producer rows, evaluated at the current time.
pub async fn ingest_batch(ctx: &LoyaltyContext, rows: &[RawTransaction]) -> IngestReport {
    ingest_batch_at(ctx, rows, Utc::now()).await
}

/// Ingests a batch of producer rows, evaluated at `now`.
///
/// `now` is also the fallback date for rows without a parseable date.
#[instrument(skip(ctx, rows), fields(rows = rows.len()))]
pub async fn ingest_batch_at(
    ctx: &LoyaltyContext,
    rows: &[RawTransaction],
    now: DateTime<Utc>,
) -> IngestReport {
    let mut report = IngestReport::default();
    let mut updated_customers = BTreeSet::new();

    for (index, raw) in rows.iter().enumerate() {
        let row = index + 1;

        let new_transaction = match normalize(raw, now) {
            Ok(new_transaction) => new_transaction,
            Err(e) => {
                warn!("Row {row}: skipped: {e}");
                report.errors.push(RowError::new(row, None, &e));
                continue;
            }
        };
        let customer_id = new_transaction.customer_id.clone();

        let recorded = match record_transaction(&ctx.database, new_transaction).await {
            Ok(recorded) => recorded,
            Err(e) => {
                warn!("Row {row}: failed to record transaction for {customer_id}: {e}");
                report
                    .errors
                    .push(RowError::new(row, Some(customer_id), &e));
                continue;
            }
        };
        report.records_processed += 1;

        match apply_transaction_at(ctx, &recorded, now).await {
            Ok(_) => {
                updated_customers.insert(customer_id);
            }
            Err(e) => {
                warn!(
                    "Row {row}: transaction {} recorded but not applied to {customer_id}: {e}",
                    recorded.id
                );
                report
                    .errors
                    .push(RowError::new(row, Some(customer_id), &e));
            }
        }
    }

    report.accounts_updated = updated_customers.len();
    info!(
        "Batch ingested: {} of {} rows recorded, {} accounts updated, {} errors",
        report.records_processed,
        rows.len(),
        report.accounts_updated,
        report.errors.len()
    );
    report
}
