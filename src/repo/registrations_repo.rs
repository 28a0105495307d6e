use crate::domain::payment::Registration;
use anyhow::Result;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

#[derive(Clone)]
pub struct RegistrationsRepo {
    pub pool: PgPool,
}

impl RegistrationsRepo {
    pub async fn find_many(&self, ids: &[Uuid]) -> Result<Vec<Registration>> {
        let rows = sqlx::query("SELECT id, event_id, status FROM registrations WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|r| Registration {
                id: r.get("id"),
                event_id: r.get("event_id"),
                status: r.get("status"),
            })
            .collect())
    }

    /// Confirmation rides inside the settlement transaction so registrations
    /// and tickets commit or roll back together.
    pub async fn confirm_tx(tx: &mut Transaction<'_, Postgres>, ids: &[Uuid]) -> Result<u64> {
        let result = sqlx::query("UPDATE registrations SET status = 'CONFIRMED' WHERE id = ANY($1)")
            .bind(ids)
            .execute(tx.as_mut())
            .await?;

        Ok(result.rows_affected())
    }
}
