//! Database infrastructure for the reseller ledger
//!
//! This crate provides PostgreSQL persistence for wallets, wallet
//! transactions, and invoices using SQLx. The append-only and amount-freeze
//! invariants the domain crates enforce in memory are mirrored here by
//! database triggers, so no code path (including ad hoc SQL) can rewrite
//! ledger history.
//!
//! Tenant scoping follows the same rule as the domain layer: every query
//! binds the acting context's partner scope, and a `NULL` scope (super
//! admin) matches all rows.

pub mod error;
pub mod pool;
pub mod repositories;

pub use error::DatabaseError;
pub use pool::{create_pool, create_pool_from_url, DatabaseConfig, DatabasePool};
pub use repositories::{InvoiceRepository, WalletRepository};
