use crate::database::error::DatabaseError;
use crate::payouts::types::{ActionContext, AuditAction};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

/// One entry in a payout request's audit trail.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PayoutAuditEntry {
    pub id: Uuid,
    pub payout_request_id: Uuid,
    pub action: String,
    pub actor: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One entry in the platform-wide admin action log.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AdminActionRecord {
    pub id: Uuid,
    pub actor: String,
    pub action_type: String,
    pub payout_request_id: Uuid,
    pub seller_id: Uuid,
    pub amount_requested: Decimal,
    pub amount_paid: Option<Decimal>,
    pub withholding_tax: Option<Decimal>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Append-only repository for the payout audit trail and the admin action
/// log. Neither table is ever updated or deleted from.
pub struct AuditRepository {
    pool: PgPool,
}

impl AuditRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Append to a payout request's audit trail within the caller's
    /// transaction.
    pub async fn append_in_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        payout_request_id: Uuid,
        action: AuditAction,
        ctx: &ActionContext,
        note: Option<&str>,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO payout_audit_log
             (id, payout_request_id, action, actor, ip, user_agent, note, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())",
        )
        .bind(Uuid::new_v4())
        .bind(payout_request_id)
        .bind(action.as_str())
        .bind(&ctx.actor)
        .bind(&ctx.ip)
        .bind(&ctx.user_agent)
        .bind(note)
        .execute(&mut **tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(())
    }

    /// Record an admin action with its money context.
    #[allow(clippy::too_many_arguments)]
    pub async fn record_admin_action_in_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        actor: &str,
        action_type: AuditAction,
        payout_request_id: Uuid,
        seller_id: Uuid,
        amount_requested: Decimal,
        amount_paid: Option<Decimal>,
        withholding_tax: Option<Decimal>,
        metadata: Option<serde_json::Value>,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO admin_action_log
             (id, actor, action_type, payout_request_id, seller_id, amount_requested,
              amount_paid, withholding_tax, metadata, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW())",
        )
        .bind(Uuid::new_v4())
        .bind(actor)
        .bind(action_type.as_str())
        .bind(payout_request_id)
        .bind(seller_id)
        .bind(amount_requested)
        .bind(amount_paid)
        .bind(withholding_tax)
        .bind(metadata)
        .execute(&mut **tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(())
    }

    /// The ordered audit trail for a payout request.
    pub async fn trail_for_request(
        &self,
        payout_request_id: Uuid,
    ) -> Result<Vec<PayoutAuditEntry>, DatabaseError> {
        sqlx::query_as::<_, PayoutAuditEntry>(
            "SELECT id, payout_request_id, action, actor, ip, user_agent, note, created_at
             FROM payout_audit_log
             WHERE payout_request_id = $1
             ORDER BY created_at ASC",
        )
        .bind(payout_request_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}
