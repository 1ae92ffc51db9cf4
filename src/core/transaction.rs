//! Transaction business logic - row validation and the immutable fact store.
//!
//! Producers hand over rows whose fields are loose text (`RawTransaction`).
//! [`normalize`] turns one row into a validated [`NewTransaction`] or a
//! validation error for that row alone. [`record_transaction`] persists the
//! fact, awarding points and assigning the id that accounts de-duplicate on.

use crate::{
    core::rules,
    entities::{Transaction, transaction},
    errors::{Error, Result},
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sea_orm::{QueryOrder, Set, prelude::*};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Date-only formats accepted in rows, tried in order.
const DATE_FORMATS: [&str; 6] = [
    "%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%Y/%m/%d", "%d/%m/%y", "%m/%d/%Y",
];

/// Date-time formats accepted in rows besides RFC 3339.
const DATE_TIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// One producer row with every field as optional text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RawTransaction {
    /// Store name
    pub store: Option<String>,
    /// Item brand
    pub brand: Option<String>,
    /// Purchase date in any supported format
    pub date: Option<String>,
    /// Sales channel
    pub channel: Option<String>,
    /// Customer identity document
    pub customer_id: Option<String>,
    /// Customer or business name
    pub name: Option<String>,
    /// Phone number
    pub phone: Option<String>,
    /// Email address
    pub email: Option<String>,
    /// Item code
    pub item: Option<String>,
    /// Item description
    pub description: Option<String>,
    /// Units purchased
    pub quantity: Option<String>,
    /// Amount paid
    pub amount: Option<String>,
    /// Item category
    pub category: Option<String>,
    /// Receipt number
    pub number: Option<String>,
}

/// A validated transaction ready to be recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTransaction {
    /// Cleaned customer identity document, never empty
    pub customer_id: String,
    /// Purchase time in UTC
    pub date: DateTime<Utc>,
    /// Store name
    pub store: String,
    /// Item brand
    pub brand: String,
    /// Sales channel
    pub channel: String,
    /// Customer or business name
    pub customer_name: String,
    /// Phone number, if any
    pub phone: Option<String>,
    /// Email address, if any
    pub email: Option<String>,
    /// Item code
    pub item: String,
    /// Item description
    pub description: String,
    /// Units purchased
    pub quantity: i32,
    /// Amount paid, never negative
    pub amount: f64,
    /// Item category
    pub category: String,
    /// Receipt number
    pub number: String,
}

impl NewTransaction {
    /// Builds a transaction with only the fields the points engine needs.
    #[must_use]
    pub fn new(customer_id: impl Into<String>, date: DateTime<Utc>, amount: f64) -> Self {
        Self {
            customer_id: customer_id.into(),
            date,
            store: String::new(),
            brand: String::new(),
            channel: String::new(),
            customer_name: String::new(),
            phone: None,
            email: None,
            item: String::new(),
            description: String::new(),
            quantity: 1,
            amount,
            category: String::new(),
            number: String::new(),
        }
    }

    /// Points this purchase earns.
    #[must_use]
    pub fn points_awarded(&self) -> i64 {
        rules::points_for_amount(self.amount)
    }

    /// Checks the fields the ledger depends on.
    pub fn validate(&self) -> Result<()> {
        if self.customer_id.trim().is_empty() {
            return Err(Error::Validation {
                message: "Customer id is empty or invalid".to_string(),
            });
        }
        if !self.amount.is_finite() || self.amount < 0.0 || self.amount > rules::MAX_AMOUNT {
            return Err(Error::InvalidAmount {
                amount: self.amount,
            });
        }
        if self.quantity < 0 {
            return Err(Error::Validation {
                message: format!("Quantity cannot be negative: {}", self.quantity),
            });
        }
        Ok(())
    }
}

/// Strips whitespace and dots from an identity document, keeping prefixes like `V-`.
#[must_use]
pub fn clean_customer_id(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && *c != '.')
        .collect()
}

/// Parses a row date, falling back to `now` when it is missing or unrecognized.
#[must_use]
pub fn parse_date(raw: Option<&str>, now: DateTime<Utc>) -> DateTime<Utc> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return now;
    };

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return parsed.with_timezone(&Utc);
    }

    if let Some(parsed) = DATE_TIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
    {
        return parsed.and_utc();
    }

    // A two-digit year must not satisfy a four-digit-year format
    DATE_FORMATS
        .iter()
        .filter_map(|format| NaiveDate::parse_from_str(raw, format).ok())
        .find(|date| chrono::Datelike::year(date) >= 1000)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map_or_else(
            || {
                debug!("Unrecognized date '{raw}', defaulting to now");
                now
            },
            |naive| naive.and_utc(),
        )
}

fn text(field: Option<&String>) -> String {
    field.map(|s| s.trim().to_string()).unwrap_or_default()
}

fn optional_text(field: Option<&String>) -> Option<String> {
    field
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

fn parse_amount(raw: Option<&String>) -> Result<f64> {
    let Some(raw) = raw.map(|s| s.trim()).filter(|s| !s.is_empty()) else {
        return Err(Error::Validation {
            message: "Amount is missing".to_string(),
        });
    };
    let amount: f64 = raw.parse().map_err(|_| Error::Validation {
        message: format!("Amount '{raw}' is not a number"),
    })?;
    if !amount.is_finite() || amount < 0.0 || amount > rules::MAX_AMOUNT {
        return Err(Error::InvalidAmount { amount });
    }
    Ok(amount)
}

/// Missing, blank and zero quantities all count as one unit.
#[allow(clippy::cast_possible_truncation)]
fn parse_quantity(raw: Option<&String>) -> Result<i32> {
    let Some(raw) = raw.map(|s| s.trim()).filter(|s| !s.is_empty()) else {
        return Ok(1);
    };
    let quantity = match raw.parse::<i32>() {
        Ok(quantity) => quantity,
        // Spreadsheets often export whole numbers as "2.0"
        Err(_) => match raw.parse::<f64>() {
            Ok(value) if value.fract() == 0.0 && value.abs() <= f64::from(i32::MAX) => {
                value as i32
            }
            _ => {
                return Err(Error::Validation {
                    message: format!("Quantity '{raw}' is not a whole number"),
                });
            }
        },
    };
    Ok(if quantity == 0 { 1 } else { quantity })
}

/// Validates one producer row.
///
/// `now` is the fallback for missing or unparseable dates.
pub fn normalize(raw: &RawTransaction, now: DateTime<Utc>) -> Result<NewTransaction> {
    let customer_id = raw
        .customer_id
        .as_deref()
        .map(clean_customer_id)
        .unwrap_or_default();

    let new_transaction = NewTransaction {
        customer_id,
        date: parse_date(raw.date.as_deref(), now),
        store: text(raw.store.as_ref()),
        brand: text(raw.brand.as_ref()),
        channel: text(raw.channel.as_ref()),
        customer_name: text(raw.name.as_ref()),
        phone: optional_text(raw.phone.as_ref()),
        email: optional_text(raw.email.as_ref()),
        item: text(raw.item.as_ref()),
        description: text(raw.description.as_ref()),
        quantity: parse_quantity(raw.quantity.as_ref())?,
        amount: parse_amount(raw.amount.as_ref())?,
        category: text(raw.category.as_ref()),
        number: text(raw.number.as_ref()),
    };
    new_transaction.validate()?;
    Ok(new_transaction)
}

/// Persists a transaction fact and returns it with its assigned id.
///
/// The transaction is validated again here so callers that build
/// `NewTransaction` directly get the same guarantees as normalized rows.
#[instrument(skip(db, new_transaction), fields(customer_id = %new_transaction.customer_id))]
pub async fn record_transaction<C>(db: &C, new_transaction: NewTransaction) -> Result<transaction::Model>
where
    C: ConnectionTrait,
{
    new_transaction.validate()?;
    let points_awarded = new_transaction.points_awarded();

    let model = transaction::ActiveModel {
        customer_id: Set(new_transaction.customer_id),
        date: Set(new_transaction.date),
        store: Set(new_transaction.store),
        brand: Set(new_transaction.brand),
        channel: Set(new_transaction.channel),
        customer_name: Set(new_transaction.customer_name),
        phone: Set(new_transaction.phone),
        email: Set(new_transaction.email),
        item: Set(new_transaction.item),
        description: Set(new_transaction.description),
        quantity: Set(new_transaction.quantity),
        amount: Set(new_transaction.amount),
        category: Set(new_transaction.category),
        number: Set(new_transaction.number),
        points_awarded: Set(points_awarded),
        ..Default::default()
    };

    let recorded = model.insert(db).await?;
    debug!(
        "Recorded transaction {} for customer {}: amount={:.2}, points={}",
        recorded.id, recorded.customer_id, recorded.amount, recorded.points_awarded
    );
    Ok(recorded)
}

/// Retrieves a transaction fact by id.
pub async fn get_transaction_by_id<C>(db: &C, transaction_id: i64) -> Result<Option<transaction::Model>>
where
    C: ConnectionTrait,
{
    Transaction::find_by_id(transaction_id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Retrieves every transaction fact for a customer, oldest first.
pub async fn get_transactions_for_customer<C>(
    db: &C,
    customer_id: &str,
) -> Result<Vec<transaction::Model>>
where
    C: ConnectionTrait,
{
    Transaction::find()
        .filter(transaction::Column::CustomerId.eq(customer_id))
        .order_by_asc(transaction::Column::Date)
        .order_by_asc(transaction::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::test_utils::*;
    use chrono::TimeZone;
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn raw_row(customer_id: &str, amount: &str, date: &str) -> RawTransaction {
        RawTransaction {
            customer_id: Some(customer_id.to_string()),
            amount: Some(amount.to_string()),
            date: Some(date.to_string()),
            name: Some("  Ana Pérez ".to_string()),
            store: Some("Centro".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_clean_customer_id() {
        assert_eq!(clean_customer_id(" V-12.345.678 "), "V-12345678");
        assert_eq!(clean_customer_id("J 4001 2"), "J40012");
        assert_eq!(clean_customer_id(" . "), "");
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap();
        assert_eq!(parse_date(Some("2024-03-15"), now()), expected);
        assert_eq!(parse_date(Some("15/03/2024"), now()), expected);
        assert_eq!(parse_date(Some("15-03-2024"), now()), expected);
        assert_eq!(parse_date(Some("2024/03/15"), now()), expected);
        assert_eq!(parse_date(Some("15/03/24"), now()), expected);
        assert_eq!(parse_date(Some("03/15/2024"), now()), expected);
    }

    #[test]
    fn test_parse_date_with_time() {
        assert_eq!(
            parse_date(Some("2024-03-15 08:30:00"), now()),
            Utc.with_ymd_and_hms(2024, 3, 15, 8, 30, 0).unwrap()
        );
        assert_eq!(
            parse_date(Some("2024-03-15T08:30:00-04:00"), now()),
            Utc.with_ymd_and_hms(2024, 3, 15, 12, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_parse_date_falls_back_to_now() {
        assert_eq!(parse_date(None, now()), now());
        assert_eq!(parse_date(Some("   "), now()), now());
        assert_eq!(parse_date(Some("yesterday"), now()), now());
    }

    #[test]
    fn test_normalize_valid_row() {
        let row = raw_row("V-1.234", "125.75", "2024-03-15");
        let normalized = normalize(&row, now()).unwrap();

        assert_eq!(normalized.customer_id, "V-1234");
        assert_eq!(normalized.amount, 125.75);
        assert_eq!(normalized.quantity, 1);
        assert_eq!(normalized.customer_name, "Ana Pérez");
        assert_eq!(normalized.phone, None);
        assert_eq!(normalized.points_awarded(), 125);
    }

    #[test]
    fn test_normalize_rejects_missing_amount() {
        let row = RawTransaction {
            customer_id: Some("V-1".to_string()),
            date: Some("2024-03-15".to_string()),
            ..Default::default()
        };
        let err = normalize(&row, now()).unwrap_err();
        assert!(matches!(err, Error::Validation { ref message } if message == "Amount is missing"));

        let err = normalize(&raw_row("V-1", "   ", "2024-03-15"), now()).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_normalize_missing_date_defaults_to_now() {
        let row = RawTransaction {
            customer_id: Some("V-1".to_string()),
            amount: Some("15".to_string()),
            ..Default::default()
        };
        assert_eq!(normalize(&row, now()).unwrap().date, now());
    }

    #[test]
    fn test_normalize_rejects_amounts_above_maximum() {
        let err = normalize(&raw_row("V-1", "1e19", "2024-03-15"), now()).unwrap_err();
        assert!(matches!(err, Error::InvalidAmount { amount } if amount == 1e19));

        let at_limit = normalize(&raw_row("V-1", "1000000000000", "2024-03-15"), now()).unwrap();
        assert_eq!(at_limit.amount, rules::MAX_AMOUNT);

        let mut direct = NewTransaction::new("V-1", now(), 1e19);
        assert!(matches!(direct.validate(), Err(Error::InvalidAmount { .. })));
        direct.amount = rules::MAX_AMOUNT;
        assert!(direct.validate().is_ok());
    }

    #[test]
    fn test_normalize_rejects_empty_customer() {
        let row = raw_row(" ", "10", "2024-03-15");
        let err = normalize(&row, now()).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert!(err.is_validation());
    }

    #[test]
    fn test_normalize_rejects_bad_amounts() {
        let err = normalize(&raw_row("V-1", "-5", "2024-03-15"), now()).unwrap_err();
        assert!(matches!(err, Error::InvalidAmount { amount } if amount == -5.0));

        let err = normalize(&raw_row("V-1", "ten", "2024-03-15"), now()).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));

        let err = normalize(&raw_row("V-1", "NaN", "2024-03-15"), now()).unwrap_err();
        assert!(matches!(err, Error::InvalidAmount { .. }));
    }

    #[test]
    fn test_normalize_quantity() {
        let mut row = raw_row("V-1", "10", "2024-03-15");
        row.quantity = Some("3.0".to_string());
        assert_eq!(normalize(&row, now()).unwrap().quantity, 3);

        row.quantity = Some("2.5".to_string());
        assert!(normalize(&row, now()).is_err());

        row.quantity = Some("-1".to_string());
        assert!(normalize(&row, now()).is_err());

        row.quantity = Some("0".to_string());
        assert_eq!(normalize(&row, now()).unwrap().quantity, 1);

        row.quantity = Some("0.0".to_string());
        assert_eq!(normalize(&row, now()).unwrap().quantity, 1);
    }

    #[tokio::test]
    async fn test_record_transaction_validation_skips_storage() {
        // No query results configured: any storage access would fail differently
        let db = MockDatabase::new(DatabaseBackend::Sqlite).into_connection();

        let result = record_transaction(&db, NewTransaction::new("V-1", now(), -1.0)).await;
        assert!(matches!(result, Err(Error::InvalidAmount { .. })));

        let result = record_transaction(&db, NewTransaction::new("", now(), 1.0)).await;
        assert!(matches!(result, Err(Error::Validation { .. })));
    }

    #[tokio::test]
    async fn test_record_transaction_assigns_id_and_points() -> Result<()> {
        let db = setup_test_db().await?;

        let first = record_transaction(&db, NewTransaction::new("V-1", now(), 99.99)).await?;
        let second = record_transaction(&db, NewTransaction::new("V-1", now(), 20.0)).await?;

        assert!(first.id > 0);
        assert_ne!(first.id, second.id);
        assert_eq!(first.points_awarded, 99);
        assert_eq!(second.points_awarded, 20);

        let found = get_transaction_by_id(&db, first.id).await?.unwrap();
        assert_eq!(found, first);
        assert!(get_transaction_by_id(&db, 999).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_get_transactions_for_customer_oldest_first() -> Result<()> {
        let db = setup_test_db().await?;
        let later = now();
        let earlier = now() - chrono::Duration::days(3);

        record_transaction(&db, NewTransaction::new("V-1", later, 10.0)).await?;
        record_transaction(&db, NewTransaction::new("V-2", later, 10.0)).await?;
        record_transaction(&db, NewTransaction::new("V-1", earlier, 5.0)).await?;

        let transactions = get_transactions_for_customer(&db, "V-1").await?;
        assert_eq!(transactions.len(), 2);
        assert_eq!(transactions[0].date, earlier);
        assert_eq!(transactions[1].date, later);
        Ok(())
    }
}
