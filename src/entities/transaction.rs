//! Transaction entity - An immutable retail purchase fact.
//!
//! Rows are written once by the ingestion path and never updated. The `id`
//! assigned on insert is the key accounts use to de-duplicate their history.
//! `points_awarded` is stored alongside the amount so history folds never
//! have to re-derive it.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Transaction database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    /// Unique identifier assigned by the store
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Customer identity document (cleaned of spaces and dots)
    pub customer_id: String,
    /// When the purchase happened, normalized to UTC
    pub date: DateTimeUtc,
    /// Store where the purchase happened
    pub store: String,
    /// Brand of the purchased item
    pub brand: String,
    /// Sales channel (e.g. "store", "online")
    pub channel: String,
    /// Customer name or business name as printed on the receipt
    pub customer_name: String,
    /// Customer phone, if captured
    pub phone: Option<String>,
    /// Customer email, if captured
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
    /// Loyalty points earned: the amount truncated to whole currency units
    pub points_awarded: i64,
}

/// Transactions are standalone facts; accounts reference them by id
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
