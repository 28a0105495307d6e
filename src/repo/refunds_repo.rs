use crate::domain::refund::{Refund, RefundStatus};
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

const REFUND_COLUMNS: &str = "id, payment_id, processed_by, reference, gateway_refund_id, amount_cents, \
     currency, status, reason, processed_at, created_at";

pub struct NewRefund {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub processed_by: Uuid,
    pub reference: String,
    pub amount_cents: i64,
    pub currency: String,
    pub reason: String,
}

#[derive(Clone)]
pub struct RefundsRepo {
    pub pool: PgPool,
}

fn map_refund(r: &PgRow) -> Result<Refund> {
    let status_str: String = r.get("status");
    Ok(Refund {
        id: r.get("id"),
        payment_id: r.get("payment_id"),
        processed_by: r.get("processed_by"),
        reference: r.get("reference"),
        gateway_refund_id: r.get("gateway_refund_id"),
        amount_cents: r.get("amount_cents"),
        currency: r.get("currency"),
        status: RefundStatus::parse(&status_str)
            .ok_or_else(|| anyhow!("unknown refund status '{status_str}'"))?,
        reason: r.get("reason"),
        processed_at: r.get("processed_at"),
        created_at: r.get("created_at"),
    })
}

impl RefundsRepo {
    /// Raw sqlx error returned so the caller can retry reference collisions.
    pub async fn insert_pending(&self, refund: &NewRefund) -> std::result::Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO refunds (id, payment_id, processed_by, reference, amount_cents, currency, status, reason)
            VALUES ($1, $2, $3, $4, $5, $6, 'PENDING', $7)
            "#,
        )
        .bind(refund.id)
        .bind(refund.payment_id)
        .bind(refund.processed_by)
        .bind(&refund.reference)
        .bind(refund.amount_cents)
        .bind(&refund.currency)
        .bind(&refund.reason)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Cents already settled (or accepted for manual settlement) against the
    /// payment; the refund bound is checked against this.
    pub async fn settled_total(&self, payment_id: Uuid) -> Result<i64> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(amount_cents), 0)::BIGINT AS total
            FROM refunds
            WHERE payment_id = $1 AND status IN ('COMPLETED', 'PROCESSING')
            "#,
        )
        .bind(payment_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("total"))
    }

    pub async fn settle_tx(
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
        status: RefundStatus,
        gateway_refund_id: Option<&str>,
        processed_at: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE refunds
            SET status = $2, gateway_refund_id = $3, processed_at = $4
            WHERE id = $1 AND status = 'PENDING'
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(gateway_refund_id)
        .bind(processed_at)
        .execute(tx.as_mut())
        .await?;

        Ok(result.rows_affected())
    }

    /// Gateway refund failure: only the refund row records it, the payment's
    /// paid state stays untouched.
    pub async fn mark_failed(&self, id: Uuid, processed_at: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE refunds SET status = 'FAILED', processed_at = $2 WHERE id = $1 AND status = 'PENDING'",
        )
        .bind(id)
        .bind(processed_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Refund>> {
        let row = sqlx::query(&format!("SELECT {REFUND_COLUMNS} FROM refunds WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| map_refund(&r)).transpose()
    }

    pub async fn list_for_payment(&self, payment_id: Uuid) -> Result<Vec<Refund>> {
        let rows = sqlx::query(&format!(
            "SELECT {REFUND_COLUMNS} FROM refunds WHERE payment_id = $1 ORDER BY created_at"
        ))
        .bind(payment_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_refund).collect()
    }
}
