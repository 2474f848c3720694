//! Invoice line items
//!
//! Items are created while the parent invoice is draft and freeze with it.
//! The item total derives from quantity × unit price, settled to 2 decimal
//! places, unless the caller supplies an explicit override (e.g., a price
//! honored from an earlier quote).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use core_kernel::{DomainId, InvoiceId, ItemId, Money};

use crate::error::BillingError;

/// What a line item bills for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ItemReference {
    /// The domain this charge covers
    Domain(DomainId),
}

impl ItemReference {
    /// Storage discriminator
    pub fn kind(&self) -> &'static str {
        match self {
            ItemReference::Domain(_) => "domain",
        }
    }

    /// Referenced entity id
    pub fn id(&self) -> Uuid {
        match self {
            ItemReference::Domain(id) => *id.as_uuid(),
        }
    }
}

/// Input for creating a line item on a draft invoice
#[derive(Debug, Clone)]
pub struct NewItem {
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Money,
    /// Explicit total; when absent the total derives from quantity × unit price
    pub total_override: Option<Money>,
    pub reference: Option<ItemReference>,
}

impl NewItem {
    /// A single-quantity item at the given unit price
    pub fn new(description: impl Into<String>, unit_price: Money) -> Self {
        Self {
            description: description.into(),
            quantity: Decimal::ONE,
            unit_price,
            total_override: None,
            reference: None,
        }
    }

    /// Sets the quantity
    pub fn with_quantity(mut self, quantity: Decimal) -> Self {
        self.quantity = quantity;
        self
    }

    /// Overrides the derived total
    pub fn with_total(mut self, total: Money) -> Self {
        self.total_override = Some(total);
        self
    }

    /// Points the item at the domain it bills for
    pub fn for_domain(mut self, domain_id: DomainId) -> Self {
        self.reference = Some(ItemReference::Domain(domain_id));
        self
    }
}

/// A line item on an invoice
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceItem {
    /// Item identifier
    pub id: ItemId,
    /// Parent invoice
    pub invoice_id: InvoiceId,
    /// Description
    pub description: String,
    /// Quantity
    pub quantity: Decimal,
    /// Unit price
    pub unit_price: Money,
    /// Line total, settled at creation
    pub total: Money,
    /// Optional reference to the billed entity
    pub reference: Option<ItemReference>,
}

impl InvoiceItem {
    /// Materializes a new item; the total is derived here, once
    pub(crate) fn from_new(invoice_id: InvoiceId, new: NewItem) -> Result<Self, BillingError> {
        if new.description.trim().is_empty() {
            return Err(BillingError::validation("item description is required"));
        }
        if new.quantity <= Decimal::ZERO {
            return Err(BillingError::validation(format!(
                "item quantity must be positive, got {}",
                new.quantity
            )));
        }
        if new.unit_price.is_negative() {
            return Err(BillingError::validation(format!(
                "item unit price cannot be negative, got {}",
                new.unit_price
            )));
        }

        let total = new
            .total_override
            .unwrap_or_else(|| new.unit_price.multiply(new.quantity))
            .settle();

        Ok(Self {
            id: ItemId::new_v7(),
            invoice_id,
            description: new.description,
            quantity: new.quantity,
            unit_price: new.unit_price,
            total,
            reference: new.reference,
        })
    }
}
