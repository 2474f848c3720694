//! Invoice aggregate and state machine
//!
//! An invoice is created as a draft, accumulates items, and is then issued.
//! From that point its amounts are frozen: `subtotal`, `tax`, and `total`
//! reject every write, while the status keeps moving (paid, refunded,
//! failed). Operational corrections need the status; auditors need the
//! amounts.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use core_kernel::{ClientId, InvoiceId, ItemId, Money, PartnerId};

use crate::error::BillingError;
use crate::item::{InvoiceItem, NewItem};

/// Invoice status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    /// Being drafted; items and amounts freely editable
    Draft,
    /// Issued and awaiting payment
    Issued,
    /// Settled against the partner wallet
    Paid,
    /// Payment reversed back to the wallet
    Refunded,
    /// Payment attempt failed; terminal
    Failed,
}

impl InvoiceStatus {
    /// Stable tag used in storage and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Issued => "issued",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Refunded => "refunded",
            InvoiceStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An invoice billed to a partner's client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    id: InvoiceId,
    partner_id: PartnerId,
    client_id: ClientId,
    invoice_number: Option<String>,
    status: InvoiceStatus,
    subtotal: Money,
    tax: Money,
    total: Money,
    items: Vec<InvoiceItem>,
    issued_at: Option<DateTime<Utc>>,
    due_at: Option<DateTime<Utc>>,
    paid_at: Option<DateTime<Utc>>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
}

impl Invoice {
    /// Creates a new draft invoice with zero totals
    pub fn draft(partner_id: PartnerId, client_id: ClientId) -> Self {
        Self {
            id: InvoiceId::new_v7(),
            partner_id,
            client_id,
            invoice_number: None,
            status: InvoiceStatus::Draft,
            subtotal: Money::zero(),
            tax: Money::zero(),
            total: Money::zero(),
            items: Vec::new(),
            issued_at: None,
            due_at: None,
            paid_at: None,
            notes: None,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> InvoiceId {
        self.id
    }

    pub fn partner_id(&self) -> PartnerId {
        self.partner_id
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    pub fn invoice_number(&self) -> Option<&str> {
        self.invoice_number.as_deref()
    }

    pub fn status(&self) -> InvoiceStatus {
        self.status
    }

    pub fn subtotal(&self) -> Money {
        self.subtotal
    }

    pub fn tax(&self) -> Money {
        self.tax
    }

    pub fn total(&self) -> Money {
        self.total
    }

    pub fn items(&self) -> &[InvoiceItem] {
        &self.items
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.issued_at
    }

    pub fn due_at(&self) -> Option<DateTime<Utc>> {
        self.due_at
    }

    pub fn paid_at(&self) -> Option<DateTime<Utc>> {
        self.paid_at
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Guard invoked before any write to subtotal/tax/total
    ///
    /// Enforced here, at the aggregate, so no caller path can slip an amount
    /// change past an issued invoice.
    pub fn guard_amounts_mutable(&self) -> Result<(), BillingError> {
        if self.status == InvoiceStatus::Draft {
            Ok(())
        } else {
            Err(BillingError::ImmutableRecord(
                "Invoice amounts cannot be modified after issuance",
            ))
        }
    }

    fn guard_items_mutable(&self, message: &'static str) -> Result<(), BillingError> {
        if self.status == InvoiceStatus::Draft {
            Ok(())
        } else {
            Err(BillingError::ImmutableRecord(message))
        }
    }

    /// Adds a line item; draft only
    pub fn add_item(&mut self, new: NewItem) -> Result<ItemId, BillingError> {
        self.guard_items_mutable("Invoice items cannot be modified after issuance")?;
        let item = InvoiceItem::from_new(self.id, new)?;
        let item_id = item.id;
        self.items.push(item);
        self.calculate_totals()?;
        Ok(item_id)
    }

    /// Replaces an item's billable fields; draft only
    pub fn update_item(&mut self, item_id: ItemId, new: NewItem) -> Result<(), BillingError> {
        self.guard_items_mutable("Invoice items cannot be modified after issuance")?;
        let replacement = InvoiceItem::from_new(self.id, new)?;
        let slot = self
            .items
            .iter_mut()
            .find(|i| i.id == item_id)
            .ok_or_else(|| BillingError::ItemNotFound(item_id.to_string()))?;
        *slot = InvoiceItem { id: item_id, ..replacement };
        self.calculate_totals()
    }

    /// Removes an item; draft only
    pub fn remove_item(&mut self, item_id: ItemId) -> Result<(), BillingError> {
        self.guard_items_mutable("Invoice items cannot be deleted after issuance")?;
        let before = self.items.len();
        self.items.retain(|i| i.id != item_id);
        if self.items.len() == before {
            return Err(BillingError::ItemNotFound(item_id.to_string()));
        }
        self.calculate_totals()
    }

    /// Sets the tax amount; draft only
    pub fn set_tax(&mut self, tax: Money) -> Result<(), BillingError> {
        self.guard_amounts_mutable()?;
        if tax.is_negative() {
            return Err(BillingError::validation(format!(
                "tax cannot be negative, got {tax}"
            )));
        }
        self.tax = tax.settle();
        self.calculate_totals()
    }

    /// Notes stay editable for the life of the invoice
    pub fn set_notes(&mut self, notes: impl Into<String>) {
        self.notes = Some(notes.into());
    }

    /// Recomputes subtotal and total from the current items
    pub fn calculate_totals(&mut self) -> Result<(), BillingError> {
        self.guard_amounts_mutable()?;
        self.subtotal = self.items.iter().map(|i| i.total).sum::<Money>().settle();
        self.total = (self.subtotal + self.tax).settle();
        Ok(())
    }

    /// Assigns the generated invoice number, once
    pub fn assign_number(&mut self, invoice_number: String) -> Result<(), BillingError> {
        if self.invoice_number.is_some() {
            return Err(BillingError::validation("invoice number already assigned"));
        }
        self.invoice_number = Some(invoice_number);
        Ok(())
    }

    /// Transitions draft → issued and stamps the payment window
    pub fn issue(&mut self, terms_days: i64) -> Result<(), BillingError> {
        if self.status != InvoiceStatus::Draft {
            return Err(BillingError::invalid_transition(
                "Only draft invoices can be issued",
                self.status,
            ));
        }
        let now = Utc::now();
        self.status = InvoiceStatus::Issued;
        self.issued_at = Some(now);
        self.due_at = Some(now + Duration::days(terms_days));
        Ok(())
    }

    /// Transitions issued → paid
    ///
    /// The wallet debit happens in the engine, before this is called; when
    /// the debit fails the invoice never reaches this method and stays issued.
    pub fn mark_paid(&mut self) -> Result<(), BillingError> {
        if self.status != InvoiceStatus::Issued {
            return Err(BillingError::invalid_transition(
                "Invoice cannot be marked as paid; only issued invoices can be paid",
                self.status,
            ));
        }
        self.status = InvoiceStatus::Paid;
        self.paid_at = Some(Utc::now());
        Ok(())
    }

    /// Transitions paid → refunded
    pub fn refund(&mut self) -> Result<(), BillingError> {
        if self.status != InvoiceStatus::Paid {
            return Err(BillingError::invalid_transition(
                "Only paid invoices can be refunded",
                self.status,
            ));
        }
        self.status = InvoiceStatus::Refunded;
        Ok(())
    }

    /// Transitions issued → failed (terminal)
    pub fn mark_failed(&mut self) -> Result<(), BillingError> {
        if self.status != InvoiceStatus::Issued {
            return Err(BillingError::invalid_transition(
                "Only issued invoices can be marked failed",
                self.status,
            ));
        }
        self.status = InvoiceStatus::Failed;
        Ok(())
    }
}
