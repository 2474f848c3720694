//! Wallet transaction types
//!
//! A `WalletTransaction` is one immutable balance movement. The stored amount
//! is positive for credits, debits, and refunds; the sign is implied by the
//! kind. Adjustments carry their sign explicitly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use core_kernel::{DomainId, InvoiceId, Money, PartnerId, TxnId, UserId, WalletId};

/// Type of balance movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Funds added to the wallet
    Credit,
    /// Funds removed from the wallet
    Debit,
    /// Funds returned to the wallet, kept distinct from credits for reporting
    Refund,
    /// Manual admin correction, signed
    Adjustment,
}

impl TransactionKind {
    /// Stable tag used in storage and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Credit => "credit",
            TransactionKind::Debit => "debit",
            TransactionKind::Refund => "refund",
            TransactionKind::Adjustment => "adjustment",
        }
    }
}

/// What a ledger entry points back at
///
/// A closed sum type rather than a free-form (type, id) string pair, so a
/// reference can only name an entity kind the ledger actually knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum LedgerReference {
    /// The invoice this movement settles or reverses
    Invoice(InvoiceId),
    /// The domain a movement relates to directly
    Domain(DomainId),
}

impl LedgerReference {
    /// Storage discriminator
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerReference::Invoice(_) => "invoice",
            LedgerReference::Domain(_) => "domain",
        }
    }

    /// Referenced entity id
    pub fn id(&self) -> Uuid {
        match self {
            LedgerReference::Invoice(id) => *id.as_uuid(),
            LedgerReference::Domain(id) => *id.as_uuid(),
        }
    }
}

/// One immutable, signed balance movement
///
/// Transactions are created solely as a side effect of a wallet operation and
/// carry no `updated_at`: there is nothing that may ever update them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletTransaction {
    /// Unique identifier (time-ordered)
    pub id: TxnId,
    /// Owning wallet
    pub wallet_id: WalletId,
    /// Owning partner, denormalized for tenant-scoped queries
    pub partner_id: PartnerId,
    /// Movement type
    pub kind: TransactionKind,
    /// Magnitude; positive except for adjustments, which are signed
    pub amount: Money,
    /// Human-readable description
    pub description: String,
    /// Optional back-reference to the entity that caused the movement
    pub reference: Option<LedgerReference>,
    /// User who triggered the operation, when known
    pub created_by: Option<UserId>,
    /// When the entry was written
    pub created_at: DateTime<Utc>,
}

impl WalletTransaction {
    /// Appends are driven by wallet operations only; see [`crate::Wallet`]
    pub(crate) fn record(
        wallet_id: WalletId,
        partner_id: PartnerId,
        kind: TransactionKind,
        amount: Money,
        description: String,
        reference: Option<LedgerReference>,
        created_by: Option<UserId>,
    ) -> Self {
        Self {
            id: TxnId::new_v7(),
            wallet_id,
            partner_id,
            kind,
            amount,
            description,
            reference,
            created_by,
            created_at: Utc::now(),
        }
    }

    /// The movement as a signed delta against the balance
    pub fn signed_amount(&self) -> Money {
        match self.kind {
            TransactionKind::Credit | TransactionKind::Refund => self.amount,
            TransactionKind::Debit => -self.amount,
            TransactionKind::Adjustment => self.amount,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn record(kind: TransactionKind, amount: Money) -> WalletTransaction {
        WalletTransaction::record(
            WalletId::new(),
            PartnerId::new(),
            kind,
            amount,
            "test".to_string(),
            None,
            None,
        )
    }

    #[test]
    fn test_signed_amount_by_kind() {
        let amount = Money::new(dec!(80.00));

        assert_eq!(
            record(TransactionKind::Credit, amount).signed_amount(),
            amount
        );
        assert_eq!(
            record(TransactionKind::Refund, amount).signed_amount(),
            amount
        );
        assert_eq!(
            record(TransactionKind::Debit, amount).signed_amount(),
            -amount
        );
    }

    #[test]
    fn test_adjustment_keeps_explicit_sign() {
        let down = record(TransactionKind::Adjustment, Money::new(dec!(-25.00)));
        assert_eq!(down.signed_amount(), Money::new(dec!(-25.00)));
    }

    #[test]
    fn test_reference_column_mapping() {
        let invoice = InvoiceId::new();
        let reference = LedgerReference::Invoice(invoice);

        assert_eq!(reference.kind(), "invoice");
        assert_eq!(reference.id(), *invoice.as_uuid());
    }
}
