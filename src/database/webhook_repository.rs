use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::database::error::{DatabaseError, DbResult};
use crate::payments::types::Provider;

/// Audit row for one webhook delivery
#[derive(Debug, Clone, FromRow)]
pub struct WebhookDelivery {
    pub id: String,
    pub provider: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub processed: bool,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub processed_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Repository for the webhook delivery audit log
pub struct WebhookRepository {
    pool: PgPool,
}

impl WebhookRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Record an inbound delivery before any processing happens
    pub async fn record_delivery(
        &self,
        provider: Provider,
        event_type: &str,
        payload: serde_json::Value,
    ) -> DbResult<WebhookDelivery> {
        let delivery_id = Uuid::new_v4().to_string();

        sqlx::query_as::<_, WebhookDelivery>(
            "INSERT INTO webhook_events \
             (id, provider, event_type, payload, processed, attempts, created_at) \
             VALUES ($1, $2, $3, $4, false, 0, NOW()) \
             RETURNING id, provider, event_type, payload, processed, attempts, \
                       last_error, created_at, processed_at",
        )
        .bind(&delivery_id)
        .bind(provider.as_str())
        .bind(event_type)
        .bind(payload)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Mark a delivery fully processed
    pub async fn mark_processed(&self, delivery_id: &str) -> DbResult<()> {
        sqlx::query(
            "UPDATE webhook_events SET processed = true, processed_at = NOW() WHERE id = $1",
        )
        .bind(delivery_id)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(())
    }

    /// Record a processing failure; the delivery stays unprocessed so a
    /// provider redelivery can complete it later
    pub async fn record_failure(&self, delivery_id: &str, error: &str) -> DbResult<()> {
        sqlx::query(
            "UPDATE webhook_events \
             SET attempts = attempts + 1, last_error = $2 \
             WHERE id = $1",
        )
        .bind(delivery_id)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(())
    }
}
