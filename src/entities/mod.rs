//! Entity module - Contains all SeaORM entity definitions for the database.
//! Transactions are immutable facts, accounts are the per-customer aggregate,
//! and account entries are the append-only history linking the two.

pub mod account;
pub mod account_entry;
pub mod transaction;

// Re-export specific types to avoid conflicts
pub use account::{Column as AccountColumn, Entity as Account, Model as AccountModel};
pub use account_entry::{
    Column as AccountEntryColumn, Entity as AccountEntry, Model as AccountEntryModel,
};
pub use transaction::{
    Column as TransactionColumn, Entity as Transaction, Model as TransactionModel,
};
