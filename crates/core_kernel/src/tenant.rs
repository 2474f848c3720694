//! Explicit tenant context
//!
//! Every financial entity belongs to exactly one partner, and every ledger
//! operation receives the acting tenant as an explicit parameter. There is no
//! ambient (thread-local or global) tenant state: callers construct a
//! `TenantContext` at the request boundary and pass it down.
//!
//! A partner-scoped context restricts reads and writes to that partner's own
//! rows. The super-admin context bypasses the filter entirely; when a
//! super-admin needs to act on behalf of one partner, `for_partner` yields an
//! explicitly scoped context rather than widening any query.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identifiers::PartnerId;

/// Violations of the partner isolation boundary
///
/// These are always fatal to the operation that raised them: the boundary is
/// never silently corrected.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TenantViolation {
    /// Entity creation with no resolvable partner id
    #[error("partner_id is required")]
    PartnerRequired,

    /// Attempt to re-home an entity to a different partner
    #[error("partner_id cannot be changed")]
    PartnerImmutable,

    /// A scoped context attempted to mutate another partner's entity
    #[error("entity belongs to another partner")]
    CrossTenantAccess,
}

/// The acting tenant for a single logical operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TenantContext {
    /// A partner session: reads and writes are restricted to this partner
    Partner(PartnerId),
    /// Platform super-admin: no filter applied
    SuperAdmin,
}

impl TenantContext {
    /// A context scoped to a single partner
    pub fn partner(id: PartnerId) -> Self {
        TenantContext::Partner(id)
    }

    /// The unscoped platform context
    pub fn super_admin() -> Self {
        TenantContext::SuperAdmin
    }

    /// Escape hatch: an explicitly partner-scoped context, regardless of the
    /// current one (super-admin tooling acting for one partner)
    pub fn for_partner(&self, id: PartnerId) -> TenantContext {
        TenantContext::Partner(id)
    }

    /// The partner filter this context imposes on queries
    ///
    /// `None` means unscoped; `Some(p)` means every read and aggregate must
    /// behave exactly as if `WHERE partner_id = p` had been written by hand.
    pub fn scope(&self) -> Option<PartnerId> {
        match self {
            TenantContext::Partner(id) => Some(*id),
            TenantContext::SuperAdmin => None,
        }
    }

    /// Returns true if this context may see entities owned by `owner`
    pub fn covers(&self, owner: PartnerId) -> bool {
        match self {
            TenantContext::Partner(id) => *id == owner,
            TenantContext::SuperAdmin => true,
        }
    }

    /// Resolves the partner id for entity creation
    pub fn require_partner(&self) -> Result<PartnerId, TenantViolation> {
        self.scope().ok_or(TenantViolation::PartnerRequired)
    }

    /// Rejects mutations against an entity the context does not cover
    pub fn authorize(&self, owner: PartnerId) -> Result<(), TenantViolation> {
        if self.covers(owner) {
            Ok(())
        } else {
            Err(TenantViolation::CrossTenantAccess)
        }
    }
}

/// Guard invoked before persisting a partner-bound entity
///
/// The partner id is set exactly once, at creation; any write that would
/// change it fails here rather than reaching storage.
pub fn guard_partner_unchanged(
    current: PartnerId,
    incoming: PartnerId,
) -> Result<(), TenantViolation> {
    if current == incoming {
        Ok(())
    } else {
        Err(TenantViolation::PartnerImmutable)
    }
}
