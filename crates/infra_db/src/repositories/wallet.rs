//! Wallet repository
//!
//! Persists wallets and their append-only transaction journal. Balance
//! changes lock the wallet row with `SELECT ... FOR UPDATE`, so concurrent
//! debits against the same wallet serialize and the overdraft check always
//! sees the latest balance. The journal is append-only: the repository
//! exposes no update or delete path, and the database trigger rejects any
//! that bypasses it.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use core_kernel::TenantContext;

use crate::error::DatabaseError;
use crate::repositories::scope_of;

/// A persisted wallet
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WalletRow {
    pub wallet_id: Uuid,
    pub partner_id: Uuid,
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
}

/// A persisted journal entry
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TransactionRow {
    pub txn_id: Uuid,
    pub wallet_id: Uuid,
    pub partner_id: Uuid,
    pub kind: String,
    pub amount: Decimal,
    pub description: String,
    pub reference_type: Option<String>,
    pub reference_id: Option<Uuid>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Input for a new journal entry
///
/// `amount` is unsigned for credit, debit, and refund; for an adjustment it
/// carries the sign of the correction.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub wallet_id: Uuid,
    pub kind: String,
    pub amount: Decimal,
    pub description: String,
    pub reference_type: Option<String>,
    pub reference_id: Option<Uuid>,
    pub created_by: Option<Uuid>,
}

impl NewTransaction {
    /// The balance delta this entry applies
    fn delta(&self) -> Decimal {
        match self.kind.as_str() {
            "debit" => -self.amount,
            _ => self.amount,
        }
    }
}

/// Repository for wallets and their transaction journal
#[derive(Debug, Clone)]
pub struct WalletRepository {
    pool: PgPool,
}

impl WalletRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the wallet for the acting partner
    ///
    /// The unique index on `partner_id` enforces one wallet per partner.
    pub async fn create_wallet(&self, ctx: &TenantContext) -> Result<WalletRow, DatabaseError> {
        let partner_id = *ctx.require_partner().map_err(|e| {
            DatabaseError::Configuration(e.to_string())
        })?.as_uuid();

        let row: WalletRow = sqlx::query_as(
            r#"
            INSERT INTO wallets (wallet_id, partner_id, balance, created_at)
            VALUES ($1, $2, 0, now())
            RETURNING wallet_id, partner_id, balance, created_at
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(partner_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DatabaseError::from(&e))?;

        info!(wallet = %row.wallet_id, partner = %partner_id, "wallet created");
        Ok(row)
    }

    /// Fetches a wallet visible to the acting tenant
    pub async fn find_wallet(
        &self,
        ctx: &TenantContext,
        wallet_id: Uuid,
    ) -> Result<WalletRow, DatabaseError> {
        sqlx::query_as(
            r#"
            SELECT wallet_id, partner_id, balance, created_at
            FROM wallets
            WHERE wallet_id = $2
              AND ($1::uuid IS NULL OR partner_id = $1)
            "#,
        )
        .bind(scope_of(ctx))
        .bind(wallet_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DatabaseError::from(&e))?
        .ok_or_else(|| DatabaseError::not_found("Wallet", wallet_id))
    }

    /// Fetches the acting partner's wallet
    pub async fn find_wallet_for_partner(
        &self,
        ctx: &TenantContext,
    ) -> Result<WalletRow, DatabaseError> {
        let partner_id = *ctx
            .require_partner()
            .map_err(|e| DatabaseError::Configuration(e.to_string()))?
            .as_uuid();

        sqlx::query_as(
            r#"
            SELECT wallet_id, partner_id, balance, created_at
            FROM wallets
            WHERE partner_id = $1
            "#,
        )
        .bind(partner_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DatabaseError::from(&e))?
        .ok_or_else(|| DatabaseError::not_found("Wallet for partner", partner_id))
    }

    /// Appends a journal entry and applies its delta to the wallet balance
    ///
    /// The wallet row is locked for the duration of the transaction. When
    /// `allow_negative` is false a debit that would overdraw fails and
    /// nothing is written.
    pub async fn append_transaction(
        &self,
        ctx: &TenantContext,
        new: NewTransaction,
        allow_negative: bool,
    ) -> Result<TransactionRow, DatabaseError> {
        let mut tx = self.pool.begin().await?;

        let wallet: Option<WalletRow> = sqlx::query_as(
            r#"
            SELECT wallet_id, partner_id, balance, created_at
            FROM wallets
            WHERE wallet_id = $2
              AND ($1::uuid IS NULL OR partner_id = $1)
            FOR UPDATE
            "#,
        )
        .bind(scope_of(ctx))
        .bind(new.wallet_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| DatabaseError::from(&e))?;

        let wallet = wallet.ok_or_else(|| DatabaseError::not_found("Wallet", new.wallet_id))?;

        let new_balance = wallet.balance + new.delta();
        if new_balance.is_sign_negative() && !new_balance.is_zero() && !allow_negative {
            return Err(DatabaseError::ConstraintViolation(format!(
                "insufficient balance: available {}, requested {}",
                wallet.balance, new.amount
            )));
        }

        let row: TransactionRow = sqlx::query_as(
            r#"
            INSERT INTO wallet_transactions (
                txn_id, wallet_id, partner_id, kind, amount, description,
                reference_type, reference_id, created_by, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, now())
            RETURNING txn_id, wallet_id, partner_id, kind, amount, description,
                      reference_type, reference_id, created_by, created_at
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(new.wallet_id)
        .bind(wallet.partner_id)
        .bind(&new.kind)
        .bind(new.amount)
        .bind(&new.description)
        .bind(&new.reference_type)
        .bind(new.reference_id)
        .bind(new.created_by)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| DatabaseError::from(&e))?;

        sqlx::query("UPDATE wallets SET balance = $2 WHERE wallet_id = $1")
            .bind(new.wallet_id)
            .bind(new_balance)
            .execute(&mut *tx)
            .await
            .map_err(|e| DatabaseError::from(&e))?;

        tx.commit().await?;

        info!(
            wallet = %new.wallet_id,
            kind = %row.kind,
            amount = %row.amount,
            balance = %new_balance,
            "journal entry appended"
        );
        Ok(row)
    }

    /// All journal entries for a wallet, oldest first
    pub async fn list_transactions(
        &self,
        ctx: &TenantContext,
        wallet_id: Uuid,
    ) -> Result<Vec<TransactionRow>, DatabaseError> {
        // Visibility check first, so an out-of-scope wallet reads as absent
        // rather than as an empty journal.
        self.find_wallet(ctx, wallet_id).await?;

        sqlx::query_as(
            r#"
            SELECT txn_id, wallet_id, partner_id, kind, amount, description,
                   reference_type, reference_id, created_by, created_at
            FROM wallet_transactions
            WHERE wallet_id = $1
            ORDER BY created_at, txn_id
            "#,
        )
        .bind(wallet_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DatabaseError::from(&e))
    }

    /// Rebuilds a wallet balance from its journal
    pub async fn reconstruct_balance(
        &self,
        ctx: &TenantContext,
        wallet_id: Uuid,
    ) -> Result<Decimal, DatabaseError> {
        self.find_wallet(ctx, wallet_id).await?;

        let (sum,): (Decimal,) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(CASE WHEN kind = 'debit' THEN -amount ELSE amount END), 0)
            FROM wallet_transactions
            WHERE wallet_id = $1
            "#,
        )
        .bind(wallet_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DatabaseError::from(&e))?;

        Ok(sum)
    }

    /// Journal entries are append-only; updating one is always an error
    pub async fn update_transaction(
        &self,
        _ctx: &TenantContext,
        _txn_id: Uuid,
    ) -> Result<(), DatabaseError> {
        Err(DatabaseError::ImmutableRecord(
            "wallet transactions are append-only and cannot be updated".to_string(),
        ))
    }

    /// Journal entries are append-only; deleting one is always an error
    pub async fn delete_transaction(
        &self,
        _ctx: &TenantContext,
        _txn_id: Uuid,
    ) -> Result<(), DatabaseError> {
        Err(DatabaseError::ImmutableRecord(
            "wallet transactions are append-only and cannot be deleted".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn entry(kind: &str, amount: Decimal) -> NewTransaction {
        NewTransaction {
            wallet_id: Uuid::now_v7(),
            kind: kind.to_string(),
            amount,
            description: "test".to_string(),
            reference_type: None,
            reference_id: None,
            created_by: None,
        }
    }

    #[test]
    fn test_delta_signs() {
        assert_eq!(entry("credit", Decimal::TEN).delta(), Decimal::TEN);
        assert_eq!(entry("refund", Decimal::TEN).delta(), Decimal::TEN);
        assert_eq!(entry("debit", Decimal::TEN).delta(), -Decimal::TEN);
        assert_eq!(entry("adjustment", -Decimal::TEN).delta(), -Decimal::TEN);
    }
}
