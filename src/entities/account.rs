//! Account entity - The per-customer loyalty aggregate.
//!
//! One row per `customer_id`. Every numeric field besides the identity and
//! contact data is derived from the account's entries and rewritten on each
//! recompute.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Account database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "accounts")]
pub struct Model {
    /// Customer identity document
    #[sea_orm(primary_key, auto_increment = false)]
    pub customer_id: String,
    /// Latest known customer name
    pub display_name: String,
    /// Latest known phone number
    pub phone: Option<String>,
    /// Latest known email address
    pub email: Option<String>,
    /// Wall-clock time the account was created
    pub registered_at: DateTimeUtc,
    /// Date of the first applied transaction; anchors the 365-day windows
    pub subscription_date: DateTimeUtc,
    /// Sum of all entry amounts
    pub lifetime_spend: f64,
    /// Number of entries
    pub lifetime_purchases: i64,
    /// Sum of all entry points
    pub lifetime_points: i64,
    /// Points earned inside the current window
    pub active_points: i64,
    /// Active points rounded down to the redemption unit
    pub redeemable_points: i64,
    /// Currency value of the redeemable points
    pub redeemable_amount: f64,
    /// Tier name: `"Base"`, `"Intermediate"`, `"Advanced"` or `"Pro"`
    pub tier: String,
    /// When the derived fields were last recomputed
    pub last_updated: DateTimeUtc,
}

/// Defines relationships between Account and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One account has many history entries
    #[sea_orm(has_many = "super::account_entry::Entity")]
    Entries,
}

impl Related<super::account_entry::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Entries.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
