//! Wallet ledger engine
//!
//! Holds every wallet together with its append-only journal and serializes
//! mutations per wallet. Two operations against the same wallet execute one
//! after the other; operations against different wallets never block each
//! other.
//!
//! The journal is the durable record; each wallet's cached balance is a
//! projection that [`WalletLedger::reconstruct_balance`] can rebuild by
//! summing the journal at any time.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::{debug, info};

use core_kernel::{AuditEvent, AuditSink, Money, TenantContext, TxnId, UserId, WalletId};

use crate::error::WalletError;
use crate::transaction::{LedgerReference, WalletTransaction};
use crate::wallet::Wallet;

/// The wallet ledger
///
/// # Invariants
///
/// - Exactly one wallet per partner
/// - Each successful operation appends exactly one journal entry and updates
///   the wallet balance under the same wallet lock, all-or-nothing
/// - Journal entries are never updated or deleted
pub struct WalletLedger {
    wallets: RwLock<HashMap<WalletId, Arc<Mutex<Wallet>>>>,
    by_partner: RwLock<HashMap<core_kernel::PartnerId, WalletId>>,
    journal: RwLock<Vec<WalletTransaction>>,
    audit: Arc<dyn AuditSink>,
}

impl WalletLedger {
    /// Creates an empty ledger reporting to the given audit sink
    pub fn new(audit: Arc<dyn AuditSink>) -> Self {
        Self {
            wallets: RwLock::new(HashMap::new()),
            by_partner: RwLock::new(HashMap::new()),
            journal: RwLock::new(Vec::new()),
            audit,
        }
    }

    /// Opens the wallet for the acting partner
    ///
    /// # Errors
    ///
    /// - [`WalletError::Tenant`] when the context carries no partner id
    /// - [`WalletError::WalletAlreadyExists`] on a second open for the same
    ///   partner (wallets are 1:1 with partners)
    pub fn open_wallet(&self, ctx: &TenantContext) -> Result<WalletId, WalletError> {
        let partner_id = ctx.require_partner()?;

        let mut by_partner = write_lock(&self.by_partner);
        if by_partner.contains_key(&partner_id) {
            return Err(WalletError::WalletAlreadyExists(partner_id.to_string()));
        }

        let wallet = Wallet::open(partner_id);
        let wallet_id = wallet.id();

        self.audit.record(AuditEvent::created(
            partner_id,
            None,
            "wallet",
            *wallet_id.as_uuid(),
            serde_json::to_value(&wallet).ok(),
        ));

        write_lock(&self.wallets).insert(wallet_id, Arc::new(Mutex::new(wallet)));
        by_partner.insert(partner_id, wallet_id);

        debug!(partner = %partner_id, wallet = %wallet_id, "wallet opened");
        Ok(wallet_id)
    }

    /// Adds funds to a wallet
    pub fn credit(
        &self,
        ctx: &TenantContext,
        wallet_id: WalletId,
        amount: Money,
        description: impl Into<String>,
        reference: Option<LedgerReference>,
        created_by: Option<UserId>,
    ) -> Result<WalletTransaction, WalletError> {
        let description = description.into();
        self.mutate(ctx, wallet_id, move |wallet| {
            wallet.credit(amount, description, reference, created_by)
        })
    }

    /// Removes funds from a wallet
    ///
    /// Concurrent debits against the same wallet are serialized: if their
    /// combined magnitude exceeds the available balance, at most one succeeds.
    #[allow(clippy::too_many_arguments)]
    pub fn debit(
        &self,
        ctx: &TenantContext,
        wallet_id: WalletId,
        amount: Money,
        description: impl Into<String>,
        reference: Option<LedgerReference>,
        created_by: Option<UserId>,
        allow_negative: bool,
    ) -> Result<WalletTransaction, WalletError> {
        let description = description.into();
        self.mutate(ctx, wallet_id, move |wallet| {
            wallet.debit(amount, description, reference, created_by, allow_negative)
        })
    }

    /// Returns funds to a wallet, recorded as a refund
    pub fn refund(
        &self,
        ctx: &TenantContext,
        wallet_id: WalletId,
        amount: Money,
        description: impl Into<String>,
        reference: Option<LedgerReference>,
        created_by: Option<UserId>,
    ) -> Result<WalletTransaction, WalletError> {
        let description = description.into();
        self.mutate(ctx, wallet_id, move |wallet| {
            wallet.refund(amount, description, reference, created_by)
        })
    }

    /// Applies a signed manual correction
    pub fn adjust(
        &self,
        ctx: &TenantContext,
        wallet_id: WalletId,
        signed_amount: Money,
        description: impl Into<String>,
        created_by: Option<UserId>,
    ) -> Result<WalletTransaction, WalletError> {
        let description = description.into();
        self.mutate(ctx, wallet_id, move |wallet| {
            wallet.adjust(signed_amount, description, created_by)
        })
    }

    /// Snapshot of a wallet visible to the acting tenant
    ///
    /// A wallet owned by another partner is reported as not found, exactly as
    /// if the row did not exist.
    pub fn wallet(&self, ctx: &TenantContext, wallet_id: WalletId) -> Result<Wallet, WalletError> {
        let cell = self.cell(wallet_id)?;
        let wallet = lock(&cell);
        if !ctx.covers(wallet.partner_id()) {
            return Err(WalletError::WalletNotFound(wallet_id.to_string()));
        }
        Ok(wallet.clone())
    }

    /// The acting partner's own wallet
    pub fn wallet_for_partner(&self, ctx: &TenantContext) -> Result<Wallet, WalletError> {
        let partner_id = ctx.require_partner()?;
        let wallet_id = read_lock(&self.by_partner)
            .get(&partner_id)
            .copied()
            .ok_or_else(|| WalletError::WalletNotFound(partner_id.to_string()))?;
        self.wallet(ctx, wallet_id)
    }

    /// Current cached balance
    pub fn balance(&self, ctx: &TenantContext, wallet_id: WalletId) -> Result<Money, WalletError> {
        Ok(self.wallet(ctx, wallet_id)?.balance())
    }

    /// All journal entries for a wallet, oldest first
    pub fn transactions(
        &self,
        ctx: &TenantContext,
        wallet_id: WalletId,
    ) -> Result<Vec<WalletTransaction>, WalletError> {
        // Visibility check first: an out-of-scope wallet reads as absent.
        self.wallet(ctx, wallet_id)?;
        Ok(read_lock(&self.journal)
            .iter()
            .filter(|t| t.wallet_id == wallet_id)
            .cloned()
            .collect())
    }

    /// Count of journal entries visible to the acting tenant
    pub fn count_transactions(&self, ctx: &TenantContext) -> usize {
        let scope = ctx.scope();
        read_lock(&self.journal)
            .iter()
            .filter(|t| scope.map_or(true, |p| t.partner_id == p))
            .count()
    }

    /// Rebuilds a wallet's balance from its journal
    ///
    /// Must always equal the cached balance; used by integrity checks.
    pub fn reconstruct_balance(
        &self,
        ctx: &TenantContext,
        wallet_id: WalletId,
    ) -> Result<Money, WalletError> {
        Ok(self
            .transactions(ctx, wallet_id)?
            .iter()
            .map(WalletTransaction::signed_amount)
            .sum())
    }

    /// Journal entries are append-only; any update attempt fails here
    ///
    /// The record is located (and tenant-checked) first so that a missing or
    /// out-of-scope id still reads as not found, then the write is refused
    /// before any state is touched.
    pub fn update_transaction(
        &self,
        ctx: &TenantContext,
        txn_id: TxnId,
    ) -> Result<(), WalletError> {
        self.resolve_transaction(ctx, txn_id)?;
        Err(WalletError::ImmutableRecord(
            "wallet transactions are append-only and cannot be updated",
        ))
    }

    /// Journal entries are append-only; any delete attempt fails here
    pub fn delete_transaction(
        &self,
        ctx: &TenantContext,
        txn_id: TxnId,
    ) -> Result<(), WalletError> {
        self.resolve_transaction(ctx, txn_id)?;
        Err(WalletError::ImmutableRecord(
            "wallet transactions are append-only and cannot be deleted",
        ))
    }

    fn resolve_transaction(
        &self,
        ctx: &TenantContext,
        txn_id: TxnId,
    ) -> Result<WalletTransaction, WalletError> {
        read_lock(&self.journal)
            .iter()
            .find(|t| t.id == txn_id && ctx.covers(t.partner_id))
            .cloned()
            .ok_or_else(|| WalletError::TransactionNotFound(txn_id.to_string()))
    }

    fn cell(&self, wallet_id: WalletId) -> Result<Arc<Mutex<Wallet>>, WalletError> {
        read_lock(&self.wallets)
            .get(&wallet_id)
            .cloned()
            .ok_or_else(|| WalletError::WalletNotFound(wallet_id.to_string()))
    }

    /// Runs one operation under the wallet's own lock
    ///
    /// The journal append happens while the wallet lock is still held, so the
    /// balance update and its ledger entry land together or not at all.
    fn mutate<F>(
        &self,
        ctx: &TenantContext,
        wallet_id: WalletId,
        op: F,
    ) -> Result<WalletTransaction, WalletError>
    where
        F: FnOnce(&mut Wallet) -> Result<WalletTransaction, WalletError>,
    {
        let cell = self.cell(wallet_id)?;
        let mut wallet = lock(&cell);
        ctx.authorize(wallet.partner_id())?;

        let old_balance = wallet.balance();
        let entry = op(&mut wallet)?;
        write_lock(&self.journal).push(entry.clone());

        info!(
            wallet = %wallet_id,
            kind = entry.kind.as_str(),
            amount = %entry.amount,
            balance = %wallet.balance(),
            "wallet transaction appended"
        );
        self.audit.record(AuditEvent::created(
            entry.partner_id,
            entry.created_by,
            "wallet_transaction",
            *entry.id.as_uuid(),
            serde_json::to_value(&entry).ok(),
        ));
        self.audit.record(AuditEvent::updated(
            entry.partner_id,
            entry.created_by,
            "wallet",
            *wallet_id.as_uuid(),
            serde_json::to_value(old_balance).ok(),
            serde_json::to_value(wallet.balance()).ok(),
        ));

        Ok(entry)
    }
}

// A poisoned lock means a panic elsewhere; the guarded data is a completed
// snapshot either way, so recover the inner value instead of propagating.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read_lock<T>(rwlock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    rwlock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_lock<T>(rwlock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    rwlock.write().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::NoopAudit;
    use rust_decimal_macros::dec;

    fn ledger() -> WalletLedger {
        WalletLedger::new(Arc::new(NoopAudit))
    }

    #[test]
    fn test_one_wallet_per_partner() {
        let ledger = ledger();
        let ctx = TenantContext::partner(core_kernel::PartnerId::new());

        ledger.open_wallet(&ctx).unwrap();
        assert!(matches!(
            ledger.open_wallet(&ctx),
            Err(WalletError::WalletAlreadyExists(_))
        ));
    }

    #[test]
    fn test_open_wallet_requires_partner() {
        let ledger = ledger();
        let err = ledger.open_wallet(&TenantContext::super_admin()).unwrap_err();
        assert!(matches!(err, WalletError::Tenant(_)));
    }

    #[test]
    fn test_cached_balance_matches_journal() {
        let ledger = ledger();
        let ctx = TenantContext::partner(core_kernel::PartnerId::new());
        let wallet_id = ledger.open_wallet(&ctx).unwrap();

        ledger
            .credit(&ctx, wallet_id, Money::new(dec!(100.00)), "Top-up", None, None)
            .unwrap();
        ledger
            .debit(
                &ctx,
                wallet_id,
                Money::new(dec!(37.25)),
                "Registration",
                None,
                None,
                false,
            )
            .unwrap();

        let cached = ledger.balance(&ctx, wallet_id).unwrap();
        let rebuilt = ledger.reconstruct_balance(&ctx, wallet_id).unwrap();
        assert_eq!(cached, rebuilt);
        assert_eq!(cached.amount(), dec!(62.75));
    }
}
