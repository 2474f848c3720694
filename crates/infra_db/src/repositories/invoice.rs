//! Invoice repository
//!
//! Persists invoices and their line items. Status transitions are guarded
//! optimistically: every transition UPDATE names the status it expects, so a
//! concurrent transition loses cleanly instead of double-applying. Amount
//! columns only change while the invoice is a draft; the freeze triggers
//! back this up at the database level.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::info;
use uuid::Uuid;

use core_kernel::TenantContext;

use crate::error::DatabaseError;
use crate::repositories::scope_of;

/// A persisted invoice
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct InvoiceRow {
    pub invoice_id: Uuid,
    pub partner_id: Uuid,
    pub client_id: Uuid,
    pub invoice_number: Option<String>,
    pub sequence: Option<i64>,
    pub status: String,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub issued_at: Option<DateTime<Utc>>,
    pub due_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A persisted line item
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ItemRow {
    pub item_id: Uuid,
    pub invoice_id: Uuid,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub total: Decimal,
    pub reference_type: Option<String>,
    pub reference_id: Option<Uuid>,
}

/// Input for a new line item
#[derive(Debug, Clone)]
pub struct NewItemRow {
    pub invoice_id: Uuid,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub total: Decimal,
    pub reference_type: Option<String>,
    pub reference_id: Option<Uuid>,
}

const INVOICE_COLUMNS: &str = "invoice_id, partner_id, client_id, invoice_number, sequence, \
     status, subtotal, tax, total, issued_at, due_at, paid_at, notes, created_at";

/// Repository for invoices and line items
#[derive(Debug, Clone)]
pub struct InvoiceRepository {
    pool: PgPool,
}

impl InvoiceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates a draft invoice for the acting partner
    pub async fn create_draft(
        &self,
        ctx: &TenantContext,
        client_id: Uuid,
        notes: Option<String>,
    ) -> Result<InvoiceRow, DatabaseError> {
        let partner_id = *ctx
            .require_partner()
            .map_err(|e| DatabaseError::Configuration(e.to_string()))?
            .as_uuid();

        let row: InvoiceRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO invoices (invoice_id, partner_id, client_id, status, subtotal, tax, total, notes, created_at)
            VALUES ($1, $2, $3, 'draft', 0, 0, 0, $4, now())
            RETURNING {INVOICE_COLUMNS}
            "#,
        ))
        .bind(Uuid::now_v7())
        .bind(partner_id)
        .bind(client_id)
        .bind(notes)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DatabaseError::from(&e))?;

        info!(invoice = %row.invoice_id, partner = %partner_id, "draft invoice created");
        Ok(row)
    }

    /// Adds a line item and recomputes the invoice totals; draft only
    pub async fn add_item(
        &self,
        ctx: &TenantContext,
        new: NewItemRow,
    ) -> Result<ItemRow, DatabaseError> {
        let mut tx = self.pool.begin().await?;
        self.lock_draft(&mut tx, ctx, new.invoice_id).await?;

        let row: ItemRow = sqlx::query_as(
            r#"
            INSERT INTO invoice_items (
                item_id, invoice_id, description, quantity, unit_price, total,
                reference_type, reference_id
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING item_id, invoice_id, description, quantity, unit_price, total,
                      reference_type, reference_id
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(new.invoice_id)
        .bind(&new.description)
        .bind(new.quantity)
        .bind(new.unit_price)
        .bind(new.total)
        .bind(&new.reference_type)
        .bind(new.reference_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| DatabaseError::from(&e))?;

        Self::recalculate_totals(&mut tx, new.invoice_id).await?;
        tx.commit().await?;
        Ok(row)
    }

    /// Removes a line item and recomputes the invoice totals; draft only
    pub async fn remove_item(
        &self,
        ctx: &TenantContext,
        invoice_id: Uuid,
        item_id: Uuid,
    ) -> Result<(), DatabaseError> {
        let mut tx = self.pool.begin().await?;
        self.lock_draft(&mut tx, ctx, invoice_id).await?;

        let result = sqlx::query("DELETE FROM invoice_items WHERE item_id = $1 AND invoice_id = $2")
            .bind(item_id)
            .bind(invoice_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| DatabaseError::from(&e))?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::not_found("Invoice item", item_id));
        }

        Self::recalculate_totals(&mut tx, invoice_id).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Sets the tax amount and recomputes the total; draft only
    pub async fn set_tax(
        &self,
        ctx: &TenantContext,
        invoice_id: Uuid,
        tax: Decimal,
    ) -> Result<(), DatabaseError> {
        if tax.is_sign_negative() && !tax.is_zero() {
            return Err(DatabaseError::ConstraintViolation(format!(
                "tax cannot be negative, got {tax}"
            )));
        }

        let mut tx = self.pool.begin().await?;
        self.lock_draft(&mut tx, ctx, invoice_id).await?;

        sqlx::query("UPDATE invoices SET tax = $2 WHERE invoice_id = $1")
            .bind(invoice_id)
            .bind(tax)
            .execute(&mut *tx)
            .await
            .map_err(|e| DatabaseError::from(&e))?;

        Self::recalculate_totals(&mut tx, invoice_id).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Issues a draft invoice
    ///
    /// Allocates the next per-partner sequence under a transaction-scoped
    /// advisory lock keyed on the partner, so concurrent issuance of
    /// different drafts serializes instead of colliding on the unique
    /// `(partner_id, sequence)` index. The invoice row lock alone covers
    /// only the draft being issued.
    pub async fn issue(
        &self,
        ctx: &TenantContext,
        invoice_id: Uuid,
        terms_days: i32,
    ) -> Result<InvoiceRow, DatabaseError> {
        let mut tx = self.pool.begin().await?;
        let invoice = self.lock_draft(&mut tx, ctx, invoice_id).await?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::text, 0))")
            .bind(invoice.partner_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| DatabaseError::from(&e))?;

        let (sequence,): (i64,) = sqlx::query_as(
            "SELECT COALESCE(MAX(sequence), 0) + 1 FROM invoices WHERE partner_id = $1",
        )
        .bind(invoice.partner_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| DatabaseError::from(&e))?;
        let invoice_number = format!("INV-{}-{}", invoice.partner_id.simple(), sequence);

        let row: InvoiceRow = sqlx::query_as(&format!(
            r#"
            UPDATE invoices
            SET status = 'issued',
                invoice_number = $2,
                sequence = $3,
                issued_at = now(),
                due_at = now() + make_interval(days => $4)
            WHERE invoice_id = $1
            RETURNING {INVOICE_COLUMNS}
            "#,
        ))
        .bind(invoice_id)
        .bind(&invoice_number)
        .bind(sequence)
        .bind(terms_days)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| DatabaseError::from(&e))?;

        tx.commit().await?;
        info!(invoice = %invoice_id, number = %invoice_number, "invoice issued");
        Ok(row)
    }

    /// Transitions issued -> paid
    pub async fn mark_paid(
        &self,
        ctx: &TenantContext,
        invoice_id: Uuid,
    ) -> Result<(), DatabaseError> {
        self.transition(ctx, invoice_id, "issued", "paid", true).await
    }

    /// Transitions paid -> refunded
    pub async fn mark_refunded(
        &self,
        ctx: &TenantContext,
        invoice_id: Uuid,
    ) -> Result<(), DatabaseError> {
        self.transition(ctx, invoice_id, "paid", "refunded", false).await
    }

    /// Transitions issued -> failed
    pub async fn mark_failed(
        &self,
        ctx: &TenantContext,
        invoice_id: Uuid,
    ) -> Result<(), DatabaseError> {
        self.transition(ctx, invoice_id, "issued", "failed", false).await
    }

    /// Fetches an invoice visible to the acting tenant
    pub async fn find_invoice(
        &self,
        ctx: &TenantContext,
        invoice_id: Uuid,
    ) -> Result<InvoiceRow, DatabaseError> {
        sqlx::query_as(&format!(
            r#"
            SELECT {INVOICE_COLUMNS}
            FROM invoices
            WHERE invoice_id = $2
              AND ($1::uuid IS NULL OR partner_id = $1)
            "#,
        ))
        .bind(scope_of(ctx))
        .bind(invoice_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DatabaseError::from(&e))?
        .ok_or_else(|| DatabaseError::not_found("Invoice", invoice_id))
    }

    /// Line items of a visible invoice
    pub async fn list_items(
        &self,
        ctx: &TenantContext,
        invoice_id: Uuid,
    ) -> Result<Vec<ItemRow>, DatabaseError> {
        self.find_invoice(ctx, invoice_id).await?;

        sqlx::query_as(
            r#"
            SELECT item_id, invoice_id, description, quantity, unit_price, total,
                   reference_type, reference_id
            FROM invoice_items
            WHERE invoice_id = $1
            ORDER BY item_id
            "#,
        )
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DatabaseError::from(&e))
    }

    /// All invoices visible to the acting tenant, oldest first
    pub async fn list_invoices(&self, ctx: &TenantContext) -> Result<Vec<InvoiceRow>, DatabaseError> {
        sqlx::query_as(&format!(
            r#"
            SELECT {INVOICE_COLUMNS}
            FROM invoices
            WHERE ($1::uuid IS NULL OR partner_id = $1)
            ORDER BY created_at, invoice_id
            "#,
        ))
        .bind(scope_of(ctx))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DatabaseError::from(&e))
    }

    /// Count of invoices visible to the acting tenant
    pub async fn count_invoices(&self, ctx: &TenantContext) -> Result<i64, DatabaseError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM invoices WHERE ($1::uuid IS NULL OR partner_id = $1)",
        )
        .bind(scope_of(ctx))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DatabaseError::from(&e))?;
        Ok(count)
    }

    /// Locks an invoice row for update and requires it to be a draft
    async fn lock_draft(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        ctx: &TenantContext,
        invoice_id: Uuid,
    ) -> Result<InvoiceRow, DatabaseError> {
        let invoice: Option<InvoiceRow> = sqlx::query_as(&format!(
            r#"
            SELECT {INVOICE_COLUMNS}
            FROM invoices
            WHERE invoice_id = $2
              AND ($1::uuid IS NULL OR partner_id = $1)
            FOR UPDATE
            "#,
        ))
        .bind(scope_of(ctx))
        .bind(invoice_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| DatabaseError::from(&e))?;

        let invoice = invoice.ok_or_else(|| DatabaseError::not_found("Invoice", invoice_id))?;
        if invoice.status != "draft" {
            return Err(DatabaseError::ImmutableRecord(format!(
                "invoice amounts are frozen after issuance (current status: {})",
                invoice.status
            )));
        }
        Ok(invoice)
    }

    async fn recalculate_totals(
        tx: &mut Transaction<'_, Postgres>,
        invoice_id: Uuid,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            UPDATE invoices
            SET subtotal = COALESCE(
                    (SELECT SUM(total) FROM invoice_items WHERE invoice_id = $1), 0),
                total = COALESCE(
                    (SELECT SUM(total) FROM invoice_items WHERE invoice_id = $1), 0) + tax
            WHERE invoice_id = $1
            "#,
        )
        .bind(invoice_id)
        .execute(&mut **tx)
        .await
        .map_err(|e| DatabaseError::from(&e))?;
        Ok(())
    }

    async fn transition(
        &self,
        ctx: &TenantContext,
        invoice_id: Uuid,
        expected: &'static str,
        target: &'static str,
        stamp_paid_at: bool,
    ) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE invoices
            SET status = $4,
                paid_at = CASE WHEN $5 THEN now() ELSE paid_at END
            WHERE invoice_id = $2
              AND ($1::uuid IS NULL OR partner_id = $1)
              AND status = $3
            "#,
        )
        .bind(scope_of(ctx))
        .bind(invoice_id)
        .bind(expected)
        .bind(target)
        .bind(stamp_paid_at)
        .execute(&self.pool)
        .await
        .map_err(|e| DatabaseError::from(&e))?;

        if result.rows_affected() == 0 {
            // Distinguish a missing invoice from one in the wrong state.
            let invoice = self.find_invoice(ctx, invoice_id).await?;
            return Err(DatabaseError::ConstraintViolation(format!(
                "invoice cannot move to '{target}' from '{}'",
                invoice.status
            )));
        }

        info!(invoice = %invoice_id, from = expected, to = target, "invoice status changed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invoice_number_format() {
        let partner_id = Uuid::now_v7();
        let number = format!("INV-{}-{}", partner_id.simple(), 7);
        assert!(number.starts_with("INV-"));
        assert!(number.ends_with("-7"));
        assert!(!number.contains(' '));
    }
}
