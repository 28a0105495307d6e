use anyhow::Result;
use sqlx::{PgPool, Row};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EventRow {
    pub id: Uuid,
    pub name: String,
    pub price_cents: i64,
    pub currency: String,
}

/// Read-only view of the platform's events table; event CRUD lives elsewhere.
#[derive(Clone)]
pub struct EventsRepo {
    pub pool: PgPool,
}

impl EventsRepo {
    pub async fn find(&self, id: Uuid) -> Result<Option<EventRow>> {
        let row = sqlx::query("SELECT id, name, price_cents, currency FROM events WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| EventRow {
            id: r.get("id"),
            name: r.get("name"),
            price_cents: r.get("price_cents"),
            currency: r.get("currency"),
        }))
    }
}
