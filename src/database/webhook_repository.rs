use crate::database::error::DatabaseError;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// A gateway webhook delivery, stored before processing so a crash between
/// receipt and resolution can be replayed.
#[derive(Debug, Clone, FromRow)]
pub struct WebhookEvent {
    pub id: Uuid,
    pub event_type: String,
    pub source: String,
    pub payload: serde_json::Value,
    pub processed: bool,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Webhook Repository for webhook event storage and tracking
pub struct WebhookRepository {
    pool: PgPool,
}

impl WebhookRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Store a new webhook event
    pub async fn log_event(
        &self,
        event_type: &str,
        source: &str,
        payload: serde_json::Value,
    ) -> Result<WebhookEvent, DatabaseError> {
        sqlx::query_as::<_, WebhookEvent>(
            "INSERT INTO webhook_events
             (id, event_type, source, payload, processed, attempts, created_at)
             VALUES ($1, $2, $3, $4, false, 0, NOW())
             RETURNING id, event_type, source, payload, processed, attempts, last_error,
                       created_at, processed_at",
        )
        .bind(Uuid::new_v4())
        .bind(event_type)
        .bind(source)
        .bind(payload)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Unprocessed events that have not exhausted their attempts
    pub async fn get_pending_events(&self, limit: i64) -> Result<Vec<WebhookEvent>, DatabaseError> {
        sqlx::query_as::<_, WebhookEvent>(
            "SELECT id, event_type, source, payload, processed, attempts, last_error,
                    created_at, processed_at
             FROM webhook_events
             WHERE processed = false AND attempts < 5
             ORDER BY created_at ASC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Mark webhook event as processed
    pub async fn mark_processed(&self, event_id: Uuid) -> Result<WebhookEvent, DatabaseError> {
        sqlx::query_as::<_, WebhookEvent>(
            "UPDATE webhook_events SET processed = true, processed_at = NOW() WHERE id = $1
             RETURNING id, event_type, source, payload, processed, attempts, last_error,
                       created_at, processed_at",
        )
        .bind(event_id)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Record webhook processing failure
    pub async fn record_failure(
        &self,
        event_id: Uuid,
        error: &str,
    ) -> Result<WebhookEvent, DatabaseError> {
        sqlx::query_as::<_, WebhookEvent>(
            "UPDATE webhook_events
             SET attempts = attempts + 1, last_error = $2
             WHERE id = $1
             RETURNING id, event_type, source, payload, processed, attempts, last_error,
                       created_at, processed_at",
        )
        .bind(event_id)
        .bind(error)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}
