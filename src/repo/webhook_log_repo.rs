use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

#[derive(Debug, Clone, serde::Serialize)]
pub struct WebhookLogRow {
    pub id: Uuid,
    pub gateway_slug: String,
    pub event_reference: Option<String>,
    pub status: String,
    pub error_message: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Append-only evidence of every inbound webhook call; rows are written
/// before any processing and only their status fields ever change.
#[derive(Clone)]
pub struct WebhookLogRepo {
    pub pool: PgPool,
}

impl WebhookLogRepo {
    pub async fn insert_pending(
        &self,
        id: Uuid,
        gateway_slug: &str,
        payload: &serde_json::Value,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO webhook_logs (id, gateway_slug, payload, status) VALUES ($1, $2, $3, 'PENDING')",
        )
        .bind(id)
        .bind(gateway_slug)
        .bind(payload)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn mark_processed(
        &self,
        id: Uuid,
        event_reference: Option<&str>,
        processed_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE webhook_logs SET status = 'PROCESSED', event_reference = $2, processed_at = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(event_reference)
        .bind(processed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn mark_failed(&self, id: Uuid, error: &str, processed_at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "UPDATE webhook_logs SET status = 'FAILED', error_message = $2, processed_at = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(error)
        .bind(processed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Duplicate-delivery check: has this event already been processed?
    pub async fn processed_exists(&self, gateway_slug: &str, event_reference: &str) -> Result<bool> {
        let row = sqlx::query(
            "SELECT 1 AS one FROM webhook_logs WHERE gateway_slug = $1 AND event_reference = $2 AND status = 'PROCESSED' LIMIT 1",
        )
        .bind(gateway_slug)
        .bind(event_reference)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }

    pub async fn list_recent(&self, limit: i64) -> Result<Vec<WebhookLogRow>> {
        let rows = sqlx::query(
            r#"
            SELECT id, gateway_slug, event_reference, status, error_message, processed_at, created_at
            FROM webhook_logs
            ORDER BY created_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| WebhookLogRow {
                id: r.get("id"),
                gateway_slug: r.get("gateway_slug"),
                event_reference: r.get("event_reference"),
                status: r.get("status"),
                error_message: r.get("error_message"),
                processed_at: r.get("processed_at"),
                created_at: r.get("created_at"),
            })
            .collect())
    }
}
