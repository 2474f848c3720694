//! Billing domain errors

use core_kernel::TenantViolation;
use domain_wallet::WalletError;
use thiserror::Error;

use crate::invoice::InvoiceStatus;

/// Errors that can occur in the billing domain
#[derive(Debug, Error)]
pub enum BillingError {
    /// Operation invoked from a state that does not permit it; the message
    /// names the required precondition
    #[error("{message} (current status: {status})")]
    InvalidStateTransition {
        message: &'static str,
        status: InvoiceStatus,
    },

    /// Attempt to modify frozen amounts or items
    #[error("Immutable record: {0}")]
    ImmutableRecord(&'static str),

    /// Invoice not found (or outside the acting tenant's scope)
    #[error("Invoice not found: {0}")]
    InvoiceNotFound(String),

    /// Line item not found on the invoice
    #[error("Invoice item not found: {0}")]
    ItemNotFound(String),

    /// Malformed input
    #[error("Validation error: {0}")]
    Validation(String),

    /// The registrar rejected or failed the order after payment
    #[error("Registrar order failed: {reason} (wallet refunded: {refunded})")]
    RegistrarFailed { reason: String, refunded: bool },

    /// The pricing collaborator could not supply a quote
    #[error("Pricing unavailable: {0}")]
    Pricing(String),

    /// A wallet operation failed (insufficient balance propagates unchanged)
    #[error("Wallet error: {0}")]
    Wallet(#[from] WalletError),

    /// Partner isolation violation
    #[error("Tenant boundary violation: {0}")]
    Tenant(#[from] TenantViolation),
}

impl BillingError {
    pub fn validation(message: impl Into<String>) -> Self {
        BillingError::Validation(message.into())
    }

    pub(crate) fn invalid_transition(message: &'static str, status: InvoiceStatus) -> Self {
        BillingError::InvalidStateTransition { message, status }
    }
}
