use anyhow::Result;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct TicketRow {
    pub id: Uuid,
    pub registration_id: Uuid,
    pub ticket_number: String,
    pub status: String,
}

#[derive(Clone)]
pub struct TicketsRepo {
    pub pool: PgPool,
}

impl TicketsRepo {
    /// Generate-once guard: the unique registration_id constraint absorbs a
    /// second settlement attempt without creating a duplicate ticket.
    pub async fn insert_if_absent_tx(
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
        registration_id: Uuid,
        ticket_number: &str,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            INSERT INTO tickets (id, registration_id, ticket_number, status)
            VALUES ($1, $2, $3, 'ACTIVE')
            ON CONFLICT (registration_id) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(registration_id)
        .bind(ticket_number)
        .execute(tx.as_mut())
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn find_by_registration(&self, registration_id: Uuid) -> Result<Option<TicketRow>> {
        let row = sqlx::query(
            "SELECT id, registration_id, ticket_number, status FROM tickets WHERE registration_id = $1",
        )
        .bind(registration_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| TicketRow {
            id: r.get("id"),
            registration_id: r.get("registration_id"),
            ticket_number: r.get("ticket_number"),
            status: r.get("status"),
        }))
    }

    pub async fn count_for_payment(&self, payment_id: Uuid) -> Result<i64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*)::BIGINT AS total
            FROM tickets t
            JOIN payment_items pi ON pi.registration_id = t.registration_id
            WHERE pi.payment_id = $1
            "#,
        )
        .bind(payment_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("total"))
    }
}
