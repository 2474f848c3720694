//! Collaborator ports
//!
//! The billing engine consumes two external collaborators: pricing supplies a
//! quoted amount per (tld, partner, action, years), and the registrar carries
//! out the actual domain-side effect. Both are opaque behind these traits;
//! the ledger only reacts to their success or failure.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use core_kernel::{DomainId, Money, PartnerId};

/// Errors surfaced by external collaborators
#[derive(Debug, Error)]
pub enum PortError {
    /// The collaborator could not be reached or timed out
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// The collaborator refused the request
    #[error("Request rejected: {0}")]
    Rejected(String),
}

/// Domain lifecycle action being billed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainAction {
    Register,
    Renew,
    Transfer,
}

impl DomainAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            DomainAction::Register => "register",
            DomainAction::Renew => "renew",
            DomainAction::Transfer => "transfer",
        }
    }
}

/// Inputs for a price quote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceRequest {
    pub tld: String,
    pub partner_id: PartnerId,
    pub action: DomainAction,
    pub years: u32,
}

/// Supplies a quoted price; the quote is final and already marked up
pub trait PricingPort: Send + Sync {
    fn quote(&self, request: &PriceRequest) -> Result<Money, PortError>;
}

/// A domain order handed to the registrar after payment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrarOrder {
    pub domain_id: DomainId,
    pub domain_name: String,
    pub action: DomainAction,
    pub years: u32,
}

/// Performs the registrar-side effect for a paid order
pub trait RegistrarPort: Send + Sync {
    fn execute(&self, order: &RegistrarOrder) -> Result<(), PortError>;
}
