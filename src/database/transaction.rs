use crate::database::error::{DatabaseError, DatabaseErrorKind};
use sqlx::Transaction as SqlxTransaction;
use sqlx::{PgPool, Postgres};
use tracing::{debug, error as log_error};

/// Database transaction wrapper for atomic units of work.
///
/// Dropping an uncommitted transaction rolls it back via sqlx, and an
/// explicit `rollback` after the transaction has already completed is a
/// no-op: abort paths in the payout engine may run more than once (e.g. a
/// gateway failure handler followed by a guard failure) and must not fail
/// on the second attempt.
pub struct DatabaseTransaction {
    transaction: Option<SqlxTransaction<'static, Postgres>>,
}

impl DatabaseTransaction {
    /// Begin a new transaction
    pub async fn begin(pool: &PgPool) -> Result<Self, DatabaseError> {
        debug!("Beginning database transaction");

        let transaction = pool.begin().await.map_err(|e| {
            log_error!("Failed to begin transaction: {}", e);
            DatabaseError::from_sqlx(e)
        })?;

        Ok(Self {
            transaction: Some(transaction),
        })
    }

    /// Commit the transaction. Committing twice is a programming error and
    /// reports `TransactionError`.
    pub async fn commit(mut self) -> Result<(), DatabaseError> {
        if let Some(tx) = self.transaction.take() {
            debug!("Committing transaction");

            tx.commit().await.map_err(|e| {
                log_error!("Failed to commit transaction: {}", e);
                DatabaseError::from_sqlx(e)
            })?;

            Ok(())
        } else {
            Err(DatabaseError::new(DatabaseErrorKind::TransactionError {
                message: "Transaction already completed".to_string(),
            }))
        }
    }

    /// Roll back the transaction. Idempotent: rolling back an already
    /// completed transaction does nothing.
    pub async fn rollback(mut self) -> Result<(), DatabaseError> {
        if let Some(tx) = self.transaction.take() {
            debug!("Rolling back transaction");

            tx.rollback().await.map_err(|e| {
                log_error!("Failed to rollback transaction: {}", e);
                DatabaseError::from_sqlx(e)
            })?;
        }

        Ok(())
    }

    /// Get a mutable reference to the transaction for executing queries
    pub fn tx_mut(&mut self) -> &mut SqlxTransaction<'static, Postgres> {
        self.transaction
            .as_mut()
            .expect("Transaction was already completed")
    }
}
