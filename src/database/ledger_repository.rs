use crate::database::error::DatabaseError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

/// Direction of a ledger movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[sqlx(type_name = "ledger_direction", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LedgerDirection {
    Credit,
    Debit,
}

/// Settlement state of a ledger entry. A debit is written as `pending`
/// when the transfer is initiated and finalized once the gateway confirms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[sqlx(type_name = "ledger_entry_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LedgerEntryStatus {
    Pending,
    Completed,
    Failed,
}

/// Immutable ledger record. One debit per payout attempt, one compensating
/// credit per refund; rows are never updated except to finalize a pending
/// debit's status.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub seller_id: Uuid,
    pub payout_request_id: Uuid,
    pub amount: Decimal,
    pub direction: LedgerDirection,
    pub status: LedgerEntryStatus,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Append-only repository for the ledger log. Deliberately exposes no
/// update or delete beyond debit finalization.
pub struct LedgerRepository {
    pool: PgPool,
}

impl LedgerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Append an entry within the caller's transaction.
    pub async fn insert_in_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        seller_id: Uuid,
        payout_request_id: Uuid,
        amount: Decimal,
        direction: LedgerDirection,
        status: LedgerEntryStatus,
        description: &str,
    ) -> Result<LedgerEntry, DatabaseError> {
        sqlx::query_as::<_, LedgerEntry>(
            "INSERT INTO ledger_entries
             (id, seller_id, payout_request_id, amount, direction, status, description, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
             RETURNING id, seller_id, payout_request_id, amount, direction, status,
                       description, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(seller_id)
        .bind(payout_request_id)
        .bind(amount)
        .bind(direction)
        .bind(status)
        .bind(description)
        .fetch_one(&mut **tx)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Finalize the pending debit for a payout request once the gateway
    /// confirms or fails the transfer. Returns the number of rows touched
    /// (zero when there was no pending debit, e.g. a repeat reconcile).
    pub async fn finalize_pending_debit(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        payout_request_id: Uuid,
        status: LedgerEntryStatus,
    ) -> Result<u64, DatabaseError> {
        let result = sqlx::query(
            "UPDATE ledger_entries SET status = $1
             WHERE payout_request_id = $2 AND direction = 'debit' AND status = 'pending'",
        )
        .bind(status)
        .bind(payout_request_id)
        .execute(&mut **tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(result.rows_affected())
    }

    /// All entries for a payout request, oldest first.
    pub async fn find_by_payout_request(
        &self,
        payout_request_id: Uuid,
    ) -> Result<Vec<LedgerEntry>, DatabaseError> {
        sqlx::query_as::<_, LedgerEntry>(
            "SELECT id, seller_id, payout_request_id, amount, direction, status,
                    description, created_at
             FROM ledger_entries
             WHERE payout_request_id = $1
             ORDER BY created_at ASC",
        )
        .bind(payout_request_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}
