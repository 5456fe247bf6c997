use crate::database::error::DatabaseError;
use crate::database::repository::{Repository, TransactionalRepository};
use crate::error::ValidationError;
use crate::payouts::types::{PaymentDetails, PaymentMethodKind, PayoutStatus, PayoutVariant};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

/// A seller's request to withdraw funds.
///
/// Rows from the legacy payment-request model and the current
/// withdrawal-request model are unified into this one shape; the `variant`
/// column records the origin and is resolved here only; the engine
/// operates on a single entity.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PayoutRequest {
    pub id: Uuid,
    pub seller_id: Uuid,
    pub variant: PayoutVariant,
    pub amount_requested: Decimal,
    pub amount_paid_to_seller: Option<Decimal>,
    pub withholding_tax: Option<Decimal>,
    pub withholding_tax_rate: Option<Decimal>,
    pub payment_method: PaymentMethodKind,
    pub payment_details: serde_json::Value,
    pub recipient_code: Option<String>,
    pub transfer_id: Option<String>,
    pub transfer_code: Option<String>,
    pub reference: Option<String>,
    pub requires_pin: bool,
    pub pin_submitted: bool,
    pub is_active: bool,
    pub reversed: bool,
    pub status: PayoutStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PayoutRequest {
    /// Decode the method-specific destination details.
    pub fn details(&self) -> Result<PaymentDetails, ValidationError> {
        PaymentDetails::from_stored(self.payment_method, &self.payment_details)
    }

    /// A request with any gateway identifier set has already had a
    /// transfer initiated; approving it again would double-pay.
    pub fn has_gateway_linkage(&self) -> bool {
        self.recipient_code.is_some()
            || self.transfer_id.is_some()
            || self.transfer_code.is_some()
            || self.reference.is_some()
    }
}

/// Repository for payout requests (both model variants)
pub struct PayoutRepository {
    pool: PgPool,
}

impl PayoutRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Load a payout request with a row lock for the lifetime of the
    /// caller's transaction.
    pub async fn lock_for_update(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        id: Uuid,
    ) -> Result<Option<PayoutRequest>, DatabaseError> {
        sqlx::query_as::<_, PayoutRequest>(
            "SELECT id, seller_id, variant, amount_requested, amount_paid_to_seller,
                    withholding_tax, withholding_tax_rate, payment_method, payment_details,
                    recipient_code, transfer_id, transfer_code, reference,
                    requires_pin, pin_submitted, is_active, reversed, status,
                    created_at, updated_at
             FROM payout_requests WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Persist every engine-mutable field within the caller's transaction.
    pub async fn save_in_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        request: &PayoutRequest,
    ) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            "UPDATE payout_requests
             SET amount_paid_to_seller = $1, withholding_tax = $2, withholding_tax_rate = $3,
                 recipient_code = $4, transfer_id = $5, transfer_code = $6, reference = $7,
                 requires_pin = $8, pin_submitted = $9, is_active = $10, reversed = $11,
                 status = $12, updated_at = NOW()
             WHERE id = $13",
        )
        .bind(request.amount_paid_to_seller)
        .bind(request.withholding_tax)
        .bind(request.withholding_tax_rate)
        .bind(&request.recipient_code)
        .bind(&request.transfer_id)
        .bind(&request.transfer_code)
        .bind(&request.reference)
        .bind(request.requires_pin)
        .bind(request.pin_submitted)
        .bind(request.is_active)
        .bind(request.reversed)
        .bind(request.status)
        .bind(request.id)
        .execute(&mut **tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::not_found(
                "PayoutRequest",
                request.id.to_string(),
            ));
        }

        Ok(())
    }

    /// Requests stuck in a non-terminal gateway state past the cutoff.
    pub async fn find_stuck(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<PayoutRequest>, DatabaseError> {
        sqlx::query_as::<_, PayoutRequest>(
            "SELECT id, seller_id, variant, amount_requested, amount_paid_to_seller,
                    withholding_tax, withholding_tax_rate, payment_method, payment_details,
                    recipient_code, transfer_id, transfer_code, reference,
                    requires_pin, pin_submitted, is_active, reversed, status,
                    created_at, updated_at
             FROM payout_requests
             WHERE status IN ('processing', 'awaiting_gateway_confirmation')
               AND reversed = false
               AND updated_at < $1
             ORDER BY updated_at ASC
             LIMIT $2",
        )
        .bind(cutoff)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Claim a stuck request for timeout resolution. The conditional
    /// update makes concurrent sweepers safe: whichever transaction wins
    /// the claim gets the row back, the loser gets `None` and skips it.
    pub async fn claim_for_timeout(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> Result<Option<PayoutRequest>, DatabaseError> {
        sqlx::query_as::<_, PayoutRequest>(
            "UPDATE payout_requests
             SET status = 'failed', updated_at = NOW()
             WHERE id = $1
               AND status IN ('processing', 'awaiting_gateway_confirmation')
               AND reversed = false
               AND updated_at < $2
             RETURNING id, seller_id, variant, amount_requested, amount_paid_to_seller,
                       withholding_tax, withholding_tax_rate, payment_method, payment_details,
                       recipient_code, transfer_id, transfer_code, reference,
                       requires_pin, pin_submitted, is_active, reversed, status,
                       created_at, updated_at",
        )
        .bind(id)
        .bind(cutoff)
        .fetch_optional(&mut **tx)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Look up a request by its gateway transfer reference (webhook path).
    pub async fn find_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<PayoutRequest>, DatabaseError> {
        sqlx::query_as::<_, PayoutRequest>(
            "SELECT id, seller_id, variant, amount_requested, amount_paid_to_seller,
                    withholding_tax, withholding_tax_rate, payment_method, payment_details,
                    recipient_code, transfer_id, transfer_code, reference,
                    requires_pin, pin_submitted, is_active, reversed, status,
                    created_at, updated_at
             FROM payout_requests WHERE reference = $1",
        )
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}

#[async_trait]
impl Repository for PayoutRepository {
    type Entity = PayoutRequest;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Self::Entity>, DatabaseError> {
        sqlx::query_as::<_, PayoutRequest>(
            "SELECT id, seller_id, variant, amount_requested, amount_paid_to_seller,
                    withholding_tax, withholding_tax_rate, payment_method, payment_details,
                    recipient_code, transfer_id, transfer_code, reference,
                    requires_pin, pin_submitted, is_active, reversed, status,
                    created_at, updated_at
             FROM payout_requests WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}

impl TransactionalRepository for PayoutRepository {
    fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request() -> PayoutRequest {
        PayoutRequest {
            id: Uuid::new_v4(),
            seller_id: Uuid::new_v4(),
            variant: PayoutVariant::WithdrawalRequest,
            amount_requested: Decimal::from(200),
            amount_paid_to_seller: None,
            withholding_tax: None,
            withholding_tax_rate: None,
            payment_method: PaymentMethodKind::Bank,
            payment_details: json!({
                "account_name": "Ama Mensah",
                "account_number": "0012345678",
                "bank_code": "030100"
            }),
            recipient_code: None,
            transfer_id: None,
            transfer_code: None,
            reference: None,
            requires_pin: false,
            pin_submitted: false,
            is_active: true,
            reversed: false,
            status: PayoutStatus::Pending,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn fresh_request_has_no_gateway_linkage() {
        assert!(!request().has_gateway_linkage());
    }

    #[test]
    fn any_gateway_identifier_counts_as_linkage() {
        let mut with_recipient = request();
        with_recipient.recipient_code = Some("RCP_abc".to_string());
        assert!(with_recipient.has_gateway_linkage());

        let mut with_reference = request();
        with_reference.reference = Some("po_123".to_string());
        assert!(with_reference.has_gateway_linkage());
    }

    #[test]
    fn details_decode_according_to_method() {
        let decoded = request().details().unwrap();
        assert_eq!(decoded.kind(), PaymentMethodKind::Bank);
    }
}
