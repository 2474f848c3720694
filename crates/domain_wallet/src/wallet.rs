//! Wallet aggregate
//!
//! The wallet holds a cached balance that moves only through the four typed
//! operations. Each operation validates its input, applies the delta, and
//! returns the ledger entry that records it; the caller ([`crate::WalletLedger`]
//! or a repository) is responsible for persisting both together.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{Money, PartnerId, UserId, WalletId};

use crate::error::WalletError;
use crate::transaction::{LedgerReference, TransactionKind, WalletTransaction};

/// A partner's prepaid balance account
///
/// Fields are private: the partner binding is set once at creation and the
/// balance is mutated exclusively through the operations below.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    id: WalletId,
    partner_id: PartnerId,
    balance: Money,
    created_at: DateTime<Utc>,
}

impl Wallet {
    /// Opens a wallet for a partner with a zero balance
    pub fn open(partner_id: PartnerId) -> Self {
        Self {
            id: WalletId::new_v7(),
            partner_id,
            balance: Money::zero(),
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> WalletId {
        self.id
    }

    pub fn partner_id(&self) -> PartnerId {
        self.partner_id
    }

    pub fn balance(&self) -> Money {
        self.balance
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Adds funds; always succeeds for a positive amount
    pub fn credit(
        &mut self,
        amount: Money,
        description: impl Into<String>,
        reference: Option<LedgerReference>,
        created_by: Option<UserId>,
    ) -> Result<WalletTransaction, WalletError> {
        let amount = require_positive(amount, "credit")?;
        self.apply(
            TransactionKind::Credit,
            amount,
            description.into(),
            reference,
            created_by,
        )
    }

    /// Removes funds
    ///
    /// Fails with [`WalletError::InsufficientBalance`] when the debit would
    /// drive the balance below zero, unless `allow_negative` is set.
    pub fn debit(
        &mut self,
        amount: Money,
        description: impl Into<String>,
        reference: Option<LedgerReference>,
        created_by: Option<UserId>,
        allow_negative: bool,
    ) -> Result<WalletTransaction, WalletError> {
        let amount = require_positive(amount, "debit")?;
        if !allow_negative && self.balance.checked_sub(&amount)?.is_negative() {
            return Err(WalletError::InsufficientBalance {
                available: self.balance,
                requested: amount,
            });
        }
        self.apply(
            TransactionKind::Debit,
            amount,
            description.into(),
            reference,
            created_by,
        )
    }

    /// Returns funds, recorded as a refund for reporting distinction
    pub fn refund(
        &mut self,
        amount: Money,
        description: impl Into<String>,
        reference: Option<LedgerReference>,
        created_by: Option<UserId>,
    ) -> Result<WalletTransaction, WalletError> {
        let amount = require_positive(amount, "refund")?;
        self.apply(
            TransactionKind::Refund,
            amount,
            description.into(),
            reference,
            created_by,
        )
    }

    /// Manual admin correction with an explicitly signed amount
    ///
    /// Bypasses the insufficient-balance check; a negative adjustment may
    /// take the balance below zero.
    pub fn adjust(
        &mut self,
        signed_amount: Money,
        description: impl Into<String>,
        created_by: Option<UserId>,
    ) -> Result<WalletTransaction, WalletError> {
        let signed_amount = signed_amount.settle();
        if signed_amount.is_zero() {
            return Err(WalletError::validation("adjustment amount must be non-zero"));
        }
        self.apply(
            TransactionKind::Adjustment,
            signed_amount,
            description.into(),
            None,
            created_by,
        )
    }

    fn apply(
        &mut self,
        kind: TransactionKind,
        amount: Money,
        description: String,
        reference: Option<LedgerReference>,
        created_by: Option<UserId>,
    ) -> Result<WalletTransaction, WalletError> {
        if description.trim().is_empty() {
            return Err(WalletError::validation("description is required"));
        }

        let entry = WalletTransaction::record(
            self.id,
            self.partner_id,
            kind,
            amount,
            description,
            reference,
            created_by,
        );
        self.balance = self.balance.checked_add(&entry.signed_amount())?;
        Ok(entry)
    }
}

/// Settles to the stored precision before validating, so a sub-cent
/// magnitude that rounds to zero is rejected rather than recorded
fn require_positive(amount: Money, operation: &str) -> Result<Money, WalletError> {
    let amount = amount.settle();
    if !amount.is_positive() {
        return Err(WalletError::validation(format!(
            "{operation} amount must be positive, got {amount}"
        )));
    }
    Ok(amount)
}
