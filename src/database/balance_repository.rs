use crate::database::error::DatabaseError;
use crate::database::repository::{Repository, TransactionalRepository};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use tracing::warn;
use uuid::Uuid;

/// Per-seller monetary state.
///
/// `withdrawable_balance` is a derived, cached value. It is recomputed by
/// every mutating operation on this struct and must never be assigned
/// anywhere else; the mutation methods below are the only legal way to
/// move money on a seller account.
#[derive(Debug, Clone, FromRow)]
pub struct SellerBalance {
    pub seller_id: Uuid,
    /// Total accrued revenue. Decreases only when a payout settles.
    pub balance: Decimal,
    /// Funds held for disputes/holds, independent of the payout flow.
    pub locked_balance: Decimal,
    /// Funds reserved for payout requests not yet finalized.
    pub pending_balance: Decimal,
    /// Cached: balance - locked_balance - pending_balance.
    pub withdrawable_balance: Decimal,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Post-operation snapshot returned to admin callers.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BalanceSnapshot {
    pub total_revenue: Decimal,
    pub locked_balance: Decimal,
    pub pending_balance: Decimal,
    pub available_balance: Decimal,
}

impl SellerBalance {
    fn recompute_withdrawable(&mut self) {
        self.withdrawable_balance = self.balance - self.locked_balance - self.pending_balance;
    }

    /// Hold funds back for a dispute. Does not touch the payout flow.
    pub fn lock_funds(&mut self, amount: Decimal) {
        self.locked_balance += amount;
        self.recompute_withdrawable();
    }

    /// Release a dispute hold, clamped so the hold never goes negative.
    pub fn unlock_funds(&mut self, amount: Decimal) {
        let released = amount.min(self.locked_balance);
        if released < amount {
            warn!(
                seller_id = %self.seller_id,
                requested = %amount,
                held = %self.locked_balance,
                "unlock_funds clamped: hold smaller than requested release"
            );
        }
        self.locked_balance -= released;
        self.recompute_withdrawable();
    }

    /// Return a payout reservation to availability. Clamped at zero: a
    /// refund must never drive the reservation negative, so a shortfall is
    /// logged and the remainder ignored. Returns the amount actually
    /// released.
    pub fn release_pending(&mut self, amount: Decimal) -> Decimal {
        let released = amount.min(self.pending_balance);
        if released < amount {
            warn!(
                seller_id = %self.seller_id,
                requested = %amount,
                reserved = %self.pending_balance,
                "release_pending clamped: reservation smaller than refund"
            );
        }
        self.pending_balance -= released;
        self.recompute_withdrawable();
        released
    }

    /// Confirmed payout: the money has left the platform. Debits `balance`
    /// and releases the pending reservation in the same step.
    pub fn settle_payout(&mut self, amount: Decimal) {
        self.balance -= amount;
        self.release_pending(amount);
    }

    /// Unwind of an already-disbursed payout: credit the money back to
    /// `balance`. Used only when the request had reached a paid state.
    pub fn refund_to_balance(&mut self, amount: Decimal) {
        self.balance += amount;
        self.recompute_withdrawable();
    }

    pub fn snapshot(&self) -> BalanceSnapshot {
        BalanceSnapshot {
            total_revenue: self.balance,
            locked_balance: self.locked_balance,
            pending_balance: self.pending_balance,
            available_balance: self.withdrawable_balance,
        }
    }
}

/// Repository for seller balance records
pub struct BalanceRepository {
    pool: PgPool,
}

impl BalanceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_seller(
        &self,
        seller_id: Uuid,
    ) -> Result<Option<SellerBalance>, DatabaseError> {
        sqlx::query_as::<_, SellerBalance>(
            "SELECT seller_id, balance, locked_balance, pending_balance, withdrawable_balance,
                    created_at, updated_at
             FROM seller_balances WHERE seller_id = $1",
        )
        .bind(seller_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Load a seller's balance with a row lock, serializing balance
    /// mutations per seller for the lifetime of the transaction.
    pub async fn lock_for_update(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        seller_id: Uuid,
    ) -> Result<Option<SellerBalance>, DatabaseError> {
        sqlx::query_as::<_, SellerBalance>(
            "SELECT seller_id, balance, locked_balance, pending_balance, withdrawable_balance,
                    created_at, updated_at
             FROM seller_balances WHERE seller_id = $1 FOR UPDATE",
        )
        .bind(seller_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Persist all four money fields atomically within the caller's
    /// transaction.
    pub async fn save_in_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        balance: &SellerBalance,
    ) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            "UPDATE seller_balances
             SET balance = $1, locked_balance = $2, pending_balance = $3,
                 withdrawable_balance = $4, updated_at = NOW()
             WHERE seller_id = $5",
        )
        .bind(balance.balance)
        .bind(balance.locked_balance)
        .bind(balance.pending_balance)
        .bind(balance.withdrawable_balance)
        .bind(balance.seller_id)
        .execute(&mut **tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::not_found(
                "SellerBalance",
                balance.seller_id.to_string(),
            ));
        }

        Ok(())
    }
}

#[async_trait]
impl Repository for BalanceRepository {
    type Entity = SellerBalance;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Self::Entity>, DatabaseError> {
        self.find_by_seller(id).await
    }
}

impl TransactionalRepository for BalanceRepository {
    fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn balance(balance: i64, locked: i64, pending: i64) -> SellerBalance {
        let mut record = SellerBalance {
            seller_id: Uuid::new_v4(),
            balance: Decimal::from(balance),
            locked_balance: Decimal::from(locked),
            pending_balance: Decimal::from(pending),
            withdrawable_balance: Decimal::ZERO,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        record.recompute_withdrawable();
        record
    }

    fn invariant_holds(record: &SellerBalance) -> bool {
        record.withdrawable_balance
            == record.balance - record.locked_balance - record.pending_balance
    }

    #[test]
    fn withdrawable_is_derived_from_base_fields() {
        let record = balance(1000, 100, 200);
        assert_eq!(record.withdrawable_balance, Decimal::from(700));
    }

    #[test]
    fn invariant_holds_across_operation_sequences() {
        let mut record = balance(1000, 0, 200);

        record.lock_funds(Decimal::from(50));
        assert!(invariant_holds(&record));

        record.release_pending(Decimal::from(80));
        assert!(invariant_holds(&record));

        record.settle_payout(Decimal::from(120));
        assert!(invariant_holds(&record));

        record.refund_to_balance(Decimal::from(120));
        assert!(invariant_holds(&record));

        record.unlock_funds(Decimal::from(50));
        assert!(invariant_holds(&record));
    }

    #[test]
    fn release_pending_clamps_at_zero() {
        let mut record = balance(1000, 0, 50);
        let released = record.release_pending(Decimal::from(80));
        assert_eq!(released, Decimal::from(50));
        assert_eq!(record.pending_balance, Decimal::ZERO);
        assert!(invariant_holds(&record));
    }

    #[test]
    fn unlock_clamps_at_zero() {
        let mut record = balance(1000, 30, 0);
        record.unlock_funds(Decimal::from(100));
        assert_eq!(record.locked_balance, Decimal::ZERO);
        assert!(invariant_holds(&record));
    }

    #[test]
    fn settle_payout_debits_balance_and_releases_reservation() {
        let mut record = balance(1000, 0, 200);
        record.settle_payout(Decimal::from(200));
        assert_eq!(record.balance, Decimal::from(800));
        assert_eq!(record.pending_balance, Decimal::ZERO);
        assert_eq!(record.withdrawable_balance, Decimal::from(800));
    }

    #[test]
    fn refund_to_balance_credits_balance_only() {
        let mut record = balance(800, 0, 0);
        record.refund_to_balance(Decimal::from(200));
        assert_eq!(record.balance, Decimal::from(1000));
        assert_eq!(record.pending_balance, Decimal::ZERO);
        assert_eq!(record.withdrawable_balance, Decimal::from(1000));
    }

    #[test]
    fn snapshot_mirrors_current_fields() {
        let record = balance(1000, 100, 200);
        let snapshot = record.snapshot();
        assert_eq!(snapshot.total_revenue, Decimal::from(1000));
        assert_eq!(snapshot.locked_balance, Decimal::from(100));
        assert_eq!(snapshot.pending_balance, Decimal::from(200));
        assert_eq!(snapshot.available_balance, Decimal::from(700));
    }
}
