//! Core business logic - framework-agnostic loyalty operations.
//!
//! Everything here takes a [`context::LoyaltyContext`] or a bare connection and
//! returns plain data, so callers can sit behind any transport.

/// Account aggregation: applying transactions and recomputing derived fields
pub mod account;
/// Shared context and per-customer serialization
pub mod context;
/// Batch ingestion of producer rows
pub mod ingest;
/// Read-side queries: points, redemption listing, customer records
pub mod query;
/// Periodic recompute of time-dependent fields
pub mod refresh;
/// Pure points, tier and window rules
pub mod rules;
/// Transaction normalization and the append-only fact store
pub mod transaction;
