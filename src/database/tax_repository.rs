use crate::database::error::DatabaseError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

/// Withholding tax collected at source from an approved payout, recorded
/// for later remittance.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WithholdingTaxEntry {
    pub id: Uuid,
    pub seller_id: Uuid,
    pub payout_request_id: Uuid,
    pub amount: Decimal,
    pub rate: Decimal,
    pub category: String,
    pub collected_at: DateTime<Utc>,
    pub remitted: bool,
}

/// Append-only repository for withholding tax entries
pub struct TaxRepository {
    pool: PgPool,
}

impl TaxRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Record the withholding for an approved payout. At most one entry
    /// per request: a repeat insert (e.g. a retried approval outcome) is a
    /// no-op thanks to the unique constraint on `payout_request_id`.
    pub async fn insert_in_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        seller_id: Uuid,
        payout_request_id: Uuid,
        amount: Decimal,
        rate: Decimal,
        category: &str,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO withholding_tax_entries
             (id, seller_id, payout_request_id, amount, rate, category, collected_at, remitted)
             VALUES ($1, $2, $3, $4, $5, $6, NOW(), false)
             ON CONFLICT (payout_request_id) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(seller_id)
        .bind(payout_request_id)
        .bind(amount)
        .bind(rate)
        .bind(category)
        .execute(&mut **tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(())
    }

    pub async fn find_by_payout_request(
        &self,
        payout_request_id: Uuid,
    ) -> Result<Option<WithholdingTaxEntry>, DatabaseError> {
        sqlx::query_as::<_, WithholdingTaxEntry>(
            "SELECT id, seller_id, payout_request_id, amount, rate, category,
                    collected_at, remitted
             FROM withholding_tax_entries WHERE payout_request_id = $1",
        )
        .bind(payout_request_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Entries not yet remitted to the revenue authority, oldest first.
    pub async fn find_unremitted(
        &self,
        limit: i64,
    ) -> Result<Vec<WithholdingTaxEntry>, DatabaseError> {
        sqlx::query_as::<_, WithholdingTaxEntry>(
            "SELECT id, seller_id, payout_request_id, amount, rate, category,
                    collected_at, remitted
             FROM withholding_tax_entries
             WHERE remitted = false
             ORDER BY collected_at ASC
             LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}
