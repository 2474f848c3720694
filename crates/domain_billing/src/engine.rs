//! Billing engine
//!
//! Orchestrates the invoice lifecycle against the wallet ledger: issuing
//! allocates the partner-scoped invoice number, settlement debits the
//! partner's wallet with a back-reference to the invoice, and refunds credit
//! it back. The registrar call sits outside any ledger atomicity boundary, so
//! a failed order is compensated with an explicit refund rather than a
//! rollback.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::{info, warn};

use core_kernel::{
    AuditEvent, AuditSink, ClientId, InvoiceId, ItemId, Money, TenantContext, UserId,
};
use domain_wallet::{LedgerReference, WalletLedger};

use crate::error::BillingError;
use crate::invoice::{Invoice, InvoiceStatus};
use crate::item::NewItem;
use crate::numbering::InvoiceNumbering;
use crate::ports::{PortError, PriceRequest, PricingPort, RegistrarOrder, RegistrarPort};

/// Engine tunables
#[derive(Debug, Clone, Copy)]
pub struct BillingConfig {
    /// Days between issuance and the due date
    pub payment_terms_days: i64,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            payment_terms_days: 14,
        }
    }
}

/// The billing engine
pub struct BillingEngine {
    invoices: RwLock<HashMap<InvoiceId, Invoice>>,
    /// Invoices whose registrar order is in flight; their lifecycle is
    /// reserved while the map lock is released around the registrar call
    settling: Mutex<HashSet<InvoiceId>>,
    numbering: InvoiceNumbering,
    wallets: Arc<WalletLedger>,
    audit: Arc<dyn AuditSink>,
    config: BillingConfig,
}

impl BillingEngine {
    /// Creates an engine with default payment terms
    pub fn new(wallets: Arc<WalletLedger>, audit: Arc<dyn AuditSink>) -> Self {
        Self::with_config(wallets, audit, BillingConfig::default())
    }

    /// Creates an engine with explicit configuration
    pub fn with_config(
        wallets: Arc<WalletLedger>,
        audit: Arc<dyn AuditSink>,
        config: BillingConfig,
    ) -> Self {
        Self {
            invoices: RwLock::new(HashMap::new()),
            settling: Mutex::new(HashSet::new()),
            numbering: InvoiceNumbering::new(),
            wallets,
            audit,
            config,
        }
    }

    // ------------------------------------------------------------------
    // Drafting
    // ------------------------------------------------------------------

    /// Creates a draft invoice for the acting partner
    pub fn create_draft(
        &self,
        ctx: &TenantContext,
        client_id: ClientId,
        notes: Option<String>,
    ) -> Result<InvoiceId, BillingError> {
        let partner_id = ctx.require_partner()?;
        let mut invoice = Invoice::draft(partner_id, client_id);
        if let Some(notes) = notes {
            invoice.set_notes(notes);
        }
        let invoice_id = invoice.id();

        self.audit.record(AuditEvent::created(
            partner_id,
            None,
            "invoice",
            *invoice_id.as_uuid(),
            serde_json::to_value(&invoice).ok(),
        ));
        self.write().insert(invoice_id, invoice);

        info!(invoice = %invoice_id, partner = %partner_id, "draft invoice created");
        Ok(invoice_id)
    }

    /// Adds a line item to a draft invoice
    pub fn add_item(
        &self,
        ctx: &TenantContext,
        invoice_id: InvoiceId,
        new: NewItem,
    ) -> Result<ItemId, BillingError> {
        self.mutate(ctx, invoice_id, |invoice| invoice.add_item(new))
    }

    /// Replaces a draft item's billable fields
    pub fn update_item(
        &self,
        ctx: &TenantContext,
        invoice_id: InvoiceId,
        item_id: ItemId,
        new: NewItem,
    ) -> Result<(), BillingError> {
        self.mutate(ctx, invoice_id, |invoice| invoice.update_item(item_id, new))
    }

    /// Removes a draft item
    pub fn remove_item(
        &self,
        ctx: &TenantContext,
        invoice_id: InvoiceId,
        item_id: ItemId,
    ) -> Result<(), BillingError> {
        self.mutate(ctx, invoice_id, |invoice| invoice.remove_item(item_id))
    }

    /// Sets the tax amount on a draft invoice
    pub fn set_tax(
        &self,
        ctx: &TenantContext,
        invoice_id: InvoiceId,
        tax: Money,
    ) -> Result<(), BillingError> {
        self.mutate(ctx, invoice_id, |invoice| invoice.set_tax(tax))
    }

    /// Recomputes subtotal and total from the current items
    pub fn calculate_totals(
        &self,
        ctx: &TenantContext,
        invoice_id: InvoiceId,
    ) -> Result<(), BillingError> {
        self.mutate(ctx, invoice_id, |invoice| invoice.calculate_totals())
    }

    /// Shapes a quoted price into a line item
    ///
    /// Pricing is an opaque collaborator: the quote arrives final and already
    /// marked up; the engine only settles it and labels the item.
    pub fn quote_item(
        &self,
        ctx: &TenantContext,
        pricing: &dyn PricingPort,
        request: &PriceRequest,
    ) -> Result<NewItem, BillingError> {
        ctx.authorize(request.partner_id)?;
        let price = pricing
            .quote(request)
            .map_err(|e| BillingError::Pricing(e.to_string()))?;
        if price.is_negative() {
            return Err(BillingError::validation(format!(
                "quoted price cannot be negative, got {price}"
            )));
        }

        let plural = if request.years == 1 { "" } else { "s" };
        Ok(NewItem::new(
            format!(
                "Domain {} .{} ({} year{plural})",
                request.action.as_str(),
                request.tld,
                request.years
            ),
            price.settle(),
        ))
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Issues a draft invoice
    ///
    /// Recomputes totals, assigns the invoice number if none was assigned
    /// yet, and stamps issued/due dates. Number allocation is serialized per
    /// partner, so concurrent issuance cannot collide.
    pub fn issue(&self, ctx: &TenantContext, invoice_id: InvoiceId) -> Result<(), BillingError> {
        let terms = self.config.payment_terms_days;
        let numbering = &self.numbering;
        self.transition(ctx, invoice_id, |invoice| {
            if invoice.status() != InvoiceStatus::Draft {
                return Err(BillingError::InvalidStateTransition {
                    message: "Only draft invoices can be issued",
                    status: invoice.status(),
                });
            }
            invoice.calculate_totals()?;
            if invoice.invoice_number().is_none() {
                invoice.assign_number(numbering.next_number(invoice.partner_id()))?;
            }
            invoice.issue(terms)
        })
    }

    /// Settles an issued invoice against the partner wallet
    ///
    /// The debit carries a reference to the invoice. On insufficient balance
    /// the error propagates unchanged and the invoice stays issued.
    pub fn mark_paid(
        &self,
        ctx: &TenantContext,
        invoice_id: InvoiceId,
        created_by: Option<UserId>,
    ) -> Result<(), BillingError> {
        let mut invoices = self.write();
        let invoice = Self::resolve_mut(&mut invoices, ctx, invoice_id)?;
        if invoice.status() != InvoiceStatus::Issued {
            return Err(BillingError::InvalidStateTransition {
                message: "Invoice cannot be marked as paid; only issued invoices can be paid",
                status: invoice.status(),
            });
        }
        self.ensure_not_settling(invoice_id, invoice.status())?;

        self.debit_for(invoice, created_by)?;

        let old = invoice.status();
        invoice.mark_paid()?;
        self.record_transition(invoice, old);
        Ok(())
    }

    /// Refunds a paid invoice, crediting the wallet back
    pub fn refund(
        &self,
        ctx: &TenantContext,
        invoice_id: InvoiceId,
        created_by: Option<UserId>,
    ) -> Result<(), BillingError> {
        let mut invoices = self.write();
        let invoice = Self::resolve_mut(&mut invoices, ctx, invoice_id)?;
        if invoice.status() != InvoiceStatus::Paid {
            return Err(BillingError::InvalidStateTransition {
                message: "Only paid invoices can be refunded",
                status: invoice.status(),
            });
        }

        let partner_ctx = TenantContext::partner(invoice.partner_id());
        let wallet = self.wallets.wallet_for_partner(&partner_ctx)?;
        self.wallets.refund(
            &partner_ctx,
            wallet.id(),
            invoice.total(),
            format!("Refund of invoice {}", Self::label(invoice)),
            Some(LedgerReference::Invoice(invoice.id())),
            created_by,
        )?;

        let old = invoice.status();
        invoice.refund()?;
        self.record_transition(invoice, old);
        Ok(())
    }

    /// Pays an issued invoice and hands the order to the registrar
    ///
    /// The registrar runs outside the ledger's atomicity boundary, so its
    /// failure cannot roll the debit back; instead an explicit compensating
    /// refund is written and the invoice is marked failed.
    pub fn settle_order(
        &self,
        ctx: &TenantContext,
        invoice_id: InvoiceId,
        order: &RegistrarOrder,
        registrar: &dyn RegistrarPort,
        created_by: Option<UserId>,
    ) -> Result<(), BillingError> {
        // Reserve the invoice, then release the map lock before talking to
        // the registrar: a collaborator with unbounded latency must not
        // stall unrelated invoice operations.
        let snapshot = {
            let mut invoices = self.write();
            let invoice = Self::resolve_mut(&mut invoices, ctx, invoice_id)?;
            if invoice.status() != InvoiceStatus::Issued {
                return Err(BillingError::InvalidStateTransition {
                    message: "Only issued invoices can settle a registrar order",
                    status: invoice.status(),
                });
            }
            self.begin_settlement(invoice_id, invoice.status())?;
            invoice.clone()
        };

        if let Err(err) = self.debit_for(&snapshot, created_by) {
            self.finish_settlement(invoice_id);
            return Err(err);
        }

        let outcome = registrar.execute(order);

        let result = self.conclude_settlement(ctx, invoice_id, outcome, created_by);
        self.finish_settlement(invoice_id);
        result
    }

    fn conclude_settlement(
        &self,
        ctx: &TenantContext,
        invoice_id: InvoiceId,
        outcome: Result<(), PortError>,
        created_by: Option<UserId>,
    ) -> Result<(), BillingError> {
        let mut invoices = self.write();
        let invoice = Self::resolve_mut(&mut invoices, ctx, invoice_id)?;
        match outcome {
            Ok(()) => {
                let old = invoice.status();
                invoice.mark_paid()?;
                self.record_transition(invoice, old);
                Ok(())
            }
            Err(port_err) => {
                let refunded = self.compensate(invoice, created_by, &port_err).is_ok();
                let old = invoice.status();
                invoice.mark_failed()?;
                self.record_transition(invoice, old);
                warn!(
                    invoice = %invoice.id(),
                    reason = %port_err,
                    refunded,
                    "registrar order failed after wallet debit"
                );
                Err(BillingError::RegistrarFailed {
                    reason: port_err.to_string(),
                    refunded,
                })
            }
        }
    }

    // ------------------------------------------------------------------
    // Queries (tenant-filtered)
    // ------------------------------------------------------------------

    /// Snapshot of an invoice visible to the acting tenant
    ///
    /// Another partner's invoice reads as not found, exactly as if the row
    /// did not exist.
    pub fn invoice(
        &self,
        ctx: &TenantContext,
        invoice_id: InvoiceId,
    ) -> Result<Invoice, BillingError> {
        self.read()
            .get(&invoice_id)
            .filter(|i| ctx.covers(i.partner_id()))
            .cloned()
            .ok_or_else(|| BillingError::InvoiceNotFound(invoice_id.to_string()))
    }

    /// Count of invoices visible to the acting tenant
    pub fn count_invoices(&self, ctx: &TenantContext) -> usize {
        self.read()
            .values()
            .filter(|i| ctx.covers(i.partner_id()))
            .count()
    }

    /// All visible invoices, oldest first
    pub fn list_invoices(&self, ctx: &TenantContext) -> Vec<Invoice> {
        let mut invoices: Vec<_> = self
            .read()
            .values()
            .filter(|i| ctx.covers(i.partner_id()))
            .cloned()
            .collect();
        invoices.sort_by_key(|i| i.created_at());
        invoices
    }

    /// Sum of issued-or-later invoice totals visible to the acting tenant
    pub fn total_invoiced(&self, ctx: &TenantContext) -> Money {
        self.read()
            .values()
            .filter(|i| ctx.covers(i.partner_id()) && i.status() != InvoiceStatus::Draft)
            .map(|i| i.total())
            .sum()
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn debit_for(&self, invoice: &Invoice, created_by: Option<UserId>) -> Result<(), BillingError> {
        let partner_ctx = TenantContext::partner(invoice.partner_id());
        let wallet = self.wallets.wallet_for_partner(&partner_ctx)?;
        self.wallets.debit(
            &partner_ctx,
            wallet.id(),
            invoice.total(),
            format!("Payment for invoice {}", Self::label(invoice)),
            Some(LedgerReference::Invoice(invoice.id())),
            created_by,
            false,
        )?;
        Ok(())
    }

    fn compensate(
        &self,
        invoice: &Invoice,
        created_by: Option<UserId>,
        cause: &PortError,
    ) -> Result<(), BillingError> {
        let partner_ctx = TenantContext::partner(invoice.partner_id());
        let wallet = self.wallets.wallet_for_partner(&partner_ctx)?;
        self.wallets.refund(
            &partner_ctx,
            wallet.id(),
            invoice.total(),
            format!(
                "Compensation for failed order on invoice {}: {cause}",
                Self::label(invoice)
            ),
            Some(LedgerReference::Invoice(invoice.id())),
            created_by,
        )?;
        Ok(())
    }

    fn mutate<T>(
        &self,
        ctx: &TenantContext,
        invoice_id: InvoiceId,
        op: impl FnOnce(&mut Invoice) -> Result<T, BillingError>,
    ) -> Result<T, BillingError> {
        let mut invoices = self.write();
        let invoice = Self::resolve_mut(&mut invoices, ctx, invoice_id)?;
        op(invoice)
    }

    fn transition(
        &self,
        ctx: &TenantContext,
        invoice_id: InvoiceId,
        op: impl FnOnce(&mut Invoice) -> Result<(), BillingError>,
    ) -> Result<(), BillingError> {
        let mut invoices = self.write();
        let invoice = Self::resolve_mut(&mut invoices, ctx, invoice_id)?;
        let old = invoice.status();
        op(invoice)?;
        self.record_transition(invoice, old);
        Ok(())
    }

    /// Mutations against a foreign invoice fail loudly, unlike reads
    fn resolve_mut<'a>(
        invoices: &'a mut HashMap<InvoiceId, Invoice>,
        ctx: &TenantContext,
        invoice_id: InvoiceId,
    ) -> Result<&'a mut Invoice, BillingError> {
        let invoice = invoices
            .get_mut(&invoice_id)
            .ok_or_else(|| BillingError::InvoiceNotFound(invoice_id.to_string()))?;
        ctx.authorize(invoice.partner_id())?;
        Ok(invoice)
    }

    fn begin_settlement(
        &self,
        invoice_id: InvoiceId,
        status: InvoiceStatus,
    ) -> Result<(), BillingError> {
        if !self.settling().insert(invoice_id) {
            return Err(BillingError::InvalidStateTransition {
                message: "Invoice settlement is already in progress",
                status,
            });
        }
        Ok(())
    }

    fn finish_settlement(&self, invoice_id: InvoiceId) {
        self.settling().remove(&invoice_id);
    }

    fn ensure_not_settling(
        &self,
        invoice_id: InvoiceId,
        status: InvoiceStatus,
    ) -> Result<(), BillingError> {
        if self.settling().contains(&invoice_id) {
            return Err(BillingError::InvalidStateTransition {
                message: "Invoice settlement is already in progress",
                status,
            });
        }
        Ok(())
    }

    fn record_transition(&self, invoice: &Invoice, old: InvoiceStatus) {
        info!(
            invoice = %invoice.id(),
            from = old.as_str(),
            to = invoice.status().as_str(),
            "invoice status changed"
        );
        self.audit.record(AuditEvent::updated(
            invoice.partner_id(),
            None,
            "invoice",
            *invoice.id().as_uuid(),
            serde_json::to_value(old).ok(),
            serde_json::to_value(invoice.status()).ok(),
        ));
    }

    fn label(invoice: &Invoice) -> String {
        invoice
            .invoice_number()
            .map(str::to_string)
            .unwrap_or_else(|| invoice.id().to_string())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<InvoiceId, Invoice>> {
        self.invoices.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<InvoiceId, Invoice>> {
        self.invoices.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn settling(&self) -> std::sync::MutexGuard<'_, HashSet<InvoiceId>> {
        self.settling.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
