use crate::database::error::DatabaseError;
use async_trait::async_trait;
use uuid::Uuid;

/// Base repository trait for record-keyed aggregates.
///
/// The append-only logs (ledger, tax, audit) deliberately do not implement
/// this: they expose insert-and-scan methods only, so nothing in the crate
/// can update or delete a ledger row.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Associated type for the entity this repository manages
    type Entity: Send + Sync;

    /// Find an entity by its ID
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Self::Entity>, DatabaseError>;

    /// Check if an entity exists by ID
    async fn exists(&self, id: Uuid) -> Result<bool, DatabaseError> {
        match self.find_by_id(id).await {
            Ok(Some(_)) => Ok(true),
            Ok(None) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Trait for repositories that expose their pool for transactional work
#[async_trait]
pub trait TransactionalRepository: Repository {
    /// Get a reference to the connection pool
    fn pool(&self) -> &sqlx::PgPool;
}
