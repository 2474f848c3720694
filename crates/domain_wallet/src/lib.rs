//! Wallet Domain - Prepaid partner balances
//!
//! Each partner holds exactly one wallet: a cached balance backed by an
//! append-only ledger of typed transactions. The balance is a derived
//! projection and must always equal the signed sum of the wallet's
//! transactions.
//!
//! # Invariants
//!
//! - Transactions are append-only: once written they are never updated or
//!   deleted, only compensated by a later entry
//! - The balance changes only through `credit`, `debit`, `refund`, and
//!   `adjust`; each operation appends exactly one transaction atomically
//! - A debit never drives the balance negative unless the caller explicitly
//!   allows it
//! - Every wallet and transaction is bound to one partner for its lifetime
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_wallet::WalletLedger;
//!
//! let ledger = WalletLedger::new(audit_sink);
//! let wallet_id = ledger.open_wallet(&ctx)?;
//!
//! ledger.credit(&ctx, wallet_id, topup, "Wallet top-up", None, None)?;
//! ledger.debit(&ctx, wallet_id, price, "Domain registration", reference, None, false)?;
//! ```

pub mod error;
pub mod ledger;
pub mod transaction;
pub mod wallet;

pub use error::WalletError;
pub use ledger::WalletLedger;
pub use transaction::{LedgerReference, TransactionKind, WalletTransaction};
pub use wallet::Wallet;
