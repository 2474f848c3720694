//! Repository implementations
//!
//! Every query binds the acting tenant scope as its first parameter. A
//! `NULL` scope (super admin) matches all rows; a partner scope restricts
//! reads and writes to that partner's data, and a row outside the scope
//! behaves exactly as if it did not exist.

pub mod invoice;
pub mod wallet;

pub use invoice::InvoiceRepository;
pub use wallet::WalletRepository;

use core_kernel::TenantContext;
use uuid::Uuid;

/// The acting context's partner scope as a bindable value
pub(crate) fn scope_of(ctx: &TenantContext) -> Option<Uuid> {
    ctx.scope().map(|p| *p.as_uuid())
}
