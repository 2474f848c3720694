//! Wallet domain errors

use core_kernel::{Money, MoneyError, TenantViolation};
use thiserror::Error;

/// Errors that can occur in the wallet domain
#[derive(Debug, Error)]
pub enum WalletError {
    /// Debit would drive the balance below zero without an explicit override
    #[error("Insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance { available: Money, requested: Money },

    /// Attempt to update or delete an append-only record
    #[error("Immutable record: {0}")]
    ImmutableRecord(&'static str),

    /// Malformed input (non-positive magnitude, empty description)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Wallet not found (or outside the acting tenant's scope)
    #[error("Wallet not found: {0}")]
    WalletNotFound(String),

    /// Transaction not found (or outside the acting tenant's scope)
    #[error("Wallet transaction not found: {0}")]
    TransactionNotFound(String),

    /// A partner may hold only one wallet
    #[error("Partner {0} already has a wallet")]
    WalletAlreadyExists(String),

    /// Partner isolation violation
    #[error("Tenant boundary violation: {0}")]
    Tenant(#[from] TenantViolation),

    /// Arithmetic failure
    #[error("Money error: {0}")]
    Money(#[from] MoneyError),
}

impl WalletError {
    pub fn validation(message: impl Into<String>) -> Self {
        WalletError::Validation(message.into())
    }
}
