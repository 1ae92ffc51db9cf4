//! Shared ledger context - the store handle and per-customer write locks.
//!
//! A `LoyaltyContext` is built once at start-up and passed by reference to
//! every operation that needs persistence. Writes for one customer are
//! serialized through [`CustomerLocks`]; writes for different customers never
//! wait on each other.

use crate::config::program::{ListingConfig, ProgramConfig};
use sea_orm::DatabaseConnection;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;

// Dead entries are pruned once the map grows past this many keys.
const PRUNE_THRESHOLD: usize = 128;

/// Per-customer async write locks.
///
/// The map only holds weak references, so a customer's lock is freed as soon
/// as the last writer releases it.
#[derive(Debug, Default)]
pub struct CustomerLocks {
    locks: Mutex<HashMap<String, Weak<Mutex<()>>>>,
}

impl CustomerLocks {
    /// Creates an empty lock map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive write access to `customer_id`.
    ///
    /// The returned guard releases the lock when dropped.
    pub async fn acquire(&self, customer_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            if locks.len() > PRUNE_THRESHOLD {
                locks.retain(|_, weak| weak.strong_count() > 0);
            }

            if let Some(existing) = locks.get(customer_id).and_then(Weak::upgrade) {
                existing
            } else {
                let lock = Arc::new(Mutex::new(()));
                locks.insert(customer_id.to_string(), Arc::downgrade(&lock));
                lock
            }
        };

        trace!("Waiting for write lock on customer {customer_id}");
        lock.lock_owned().await
    }

    /// Number of customers with a live lock.
    pub async fn live_count(&self) -> usize {
        self.locks
            .lock()
            .await
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}

/// Everything the ledger operations need, constructed once and passed explicitly.
#[derive(Debug)]
pub struct LoyaltyContext {
    /// Database connection for all persistence
    pub database: DatabaseConnection,
    /// Serializes read-modify-write cycles per customer
    pub locks: CustomerLocks,
    /// Listing defaults from config.toml
    pub listing: ListingConfig,
}

impl LoyaltyContext {
    /// Creates a context with default program settings.
    #[must_use]
    pub fn new(database: DatabaseConnection) -> Self {
        Self::with_config(database, &ProgramConfig::default())
    }

    /// Creates a context using the settings from a loaded `config.toml`.
    #[must_use]
    pub fn with_config(database: DatabaseConnection, config: &ProgramConfig) -> Self {
        Self {
            database,
            locks: CustomerLocks::new(),
            listing: config.listing.clone(),
        }
    }
}
