//! Core Kernel - Foundational types for the reseller ledger
//!
//! This crate provides the fundamental building blocks used across all domain modules:
//! - Money with precise decimal arithmetic and half-up settlement
//! - Strongly-typed identifiers
//! - Explicit tenant context for partner isolation
//! - The audit sink port

pub mod audit;
pub mod identifiers;
pub mod money;
pub mod tenant;

pub use audit::{AuditAction, AuditEvent, AuditSink, NoopAudit};
pub use identifiers::{
    AuditEventId, ClientId, DomainId, InvoiceId, ItemId, PartnerId, TxnId, UserId, WalletId,
};
pub use money::{Money, MoneyError, Rate};
pub use tenant::{TenantContext, TenantViolation};
