//! Account entry entity - Append-only transaction summary in an account's history.
//!
//! Each entry copies the fields of a `transactions` row the points engine needs.
//! `(customer_id, transaction_id)` is unique, which is what makes retried
//! applications of the same transaction a no-op.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Account entry database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "account_entries")]
pub struct Model {
    /// Row identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning account
    pub customer_id: String,
    /// Id of the source row in `transactions`
    pub transaction_id: i64,
    /// When the purchase happened
    pub date: DateTimeUtc,
    /// Store where the purchase happened
    pub store: String,
    /// Item code
    pub item: String,
    /// Units purchased
    pub quantity: i32,
    /// Amount paid
    pub amount: f64,
    /// Points earned by this purchase
    pub points_awarded: i64,
    /// When the entry was appended
    pub recorded_at: DateTimeUtc,
}

/// Defines relationships between `AccountEntry` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each entry belongs to one account
    #[sea_orm(
        belongs_to = "super::account::Entity",
        from = "Column::CustomerId",
        to = "super::account::Column::CustomerId"
    )]
    Account,
}

impl Related<super::account::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Account.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
