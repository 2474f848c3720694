//! Billing Domain - Invoice lifecycle and wallet settlement
//!
//! Invoices progress through a strict state machine:
//!
//! ```text
//! draft ──issue()──► issued ──mark_paid()──► paid ──refund()──► refunded
//!                       │
//!                       └──mark_failed()──► failed
//! ```
//!
//! Amounts (subtotal, tax, total) and line items are frozen the moment an
//! invoice leaves draft; the status itself stays mutable so that payment
//! failures and refunds remain representable. Settlement debits the owning
//! partner's wallet and every ledger entry written for an invoice carries a
//! back-reference to it.
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_billing::{BillingEngine, NewItem};
//!
//! let invoice_id = engine.create_draft(&ctx, client_id, None)?;
//! engine.add_item(&ctx, invoice_id, NewItem::new("example.com registration", price))?;
//! engine.set_tax(&ctx, invoice_id, tax)?;
//! engine.issue(&ctx, invoice_id)?;
//! engine.mark_paid(&ctx, invoice_id, None)?;
//! ```

pub mod engine;
pub mod error;
pub mod invoice;
pub mod item;
pub mod numbering;
pub mod ports;

pub use engine::{BillingConfig, BillingEngine};
pub use error::BillingError;
pub use invoice::{Invoice, InvoiceStatus};
pub use item::{InvoiceItem, ItemReference, NewItem};
pub use numbering::InvoiceNumbering;
pub use ports::{DomainAction, PortError, PriceRequest, PricingPort, RegistrarOrder, RegistrarPort};
