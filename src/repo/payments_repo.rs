use crate::domain::payment::{
    GatewayResponseLog, Payment, PaymentItem, PaymentMethod, PaymentStatus,
};
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

const PAYMENT_COLUMNS: &str = "id, reference, event_id, payer_id, gateway_slug, amount_cents, currency, \
     gateway_fee_cents, platform_fee_cents, status, payment_method, payment_phone, \
     gateway_transaction_id, gateway_response, failure_reason, paid_at, failed_at, refunded_at, created_at";

pub struct NewPayment {
    pub id: Uuid,
    pub reference: String,
    pub event_id: Uuid,
    pub payer_id: Uuid,
    pub gateway_slug: String,
    pub amount_cents: i64,
    pub currency: String,
    pub gateway_fee_cents: i64,
    pub platform_fee_cents: i64,
    pub payment_method: PaymentMethod,
    pub payment_phone: Option<String>,
}

pub struct NewPaymentItem {
    pub id: Uuid,
    pub registration_id: Uuid,
    pub description: String,
    pub amount_cents: i64,
    pub quantity: i32,
}

#[derive(Clone)]
pub struct PaymentsRepo {
    pub pool: PgPool,
}

pub fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .is_some_and(|d| matches!(d.kind(), sqlx::error::ErrorKind::UniqueViolation))
}

fn map_payment(r: &PgRow) -> Result<Payment> {
    let status_str: String = r.get("status");
    let method_str: String = r.get("payment_method");
    Ok(Payment {
        id: r.get("id"),
        reference: r.get("reference"),
        event_id: r.get("event_id"),
        payer_id: r.get("payer_id"),
        gateway_slug: r.get("gateway_slug"),
        amount_cents: r.get("amount_cents"),
        currency: r.get("currency"),
        gateway_fee_cents: r.get("gateway_fee_cents"),
        platform_fee_cents: r.get("platform_fee_cents"),
        status: PaymentStatus::parse(&status_str)
            .ok_or_else(|| anyhow!("unknown payment status '{status_str}'"))?,
        payment_method: PaymentMethod::parse(&method_str)
            .ok_or_else(|| anyhow!("unknown payment method '{method_str}'"))?,
        payment_phone: r.get("payment_phone"),
        gateway_transaction_id: r.get("gateway_transaction_id"),
        gateway_response: GatewayResponseLog::from_value(r.get("gateway_response")),
        failure_reason: r.get("failure_reason"),
        paid_at: r.get("paid_at"),
        failed_at: r.get("failed_at"),
        refunded_at: r.get("refunded_at"),
        created_at: r.get("created_at"),
    })
}

fn map_item(r: &PgRow) -> PaymentItem {
    PaymentItem {
        id: r.get("id"),
        payment_id: r.get("payment_id"),
        registration_id: r.get("registration_id"),
        description: r.get("description"),
        amount_cents: r.get("amount_cents"),
        quantity: r.get("quantity"),
    }
}

impl PaymentsRepo {
    /// Payment plus items in one transaction; partial creation is never
    /// observable. Returns the raw sqlx error so callers can retry reference
    /// collisions.
    pub async fn insert_with_items(
        &self,
        payment: &NewPayment,
        items: &[NewPaymentItem],
    ) -> std::result::Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO payments (
                id, reference, event_id, payer_id, gateway_slug, amount_cents, currency,
                gateway_fee_cents, platform_fee_cents, status, payment_method, payment_phone
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7,
                $8, $9, 'PENDING', $10, $11
            )
            "#,
        )
        .bind(payment.id)
        .bind(&payment.reference)
        .bind(payment.event_id)
        .bind(payment.payer_id)
        .bind(&payment.gateway_slug)
        .bind(payment.amount_cents)
        .bind(&payment.currency)
        .bind(payment.gateway_fee_cents)
        .bind(payment.platform_fee_cents)
        .bind(payment.payment_method.as_str())
        .bind(&payment.payment_phone)
        .execute(tx.as_mut())
        .await?;

        for item in items {
            sqlx::query(
                r#"
                INSERT INTO payment_items (id, payment_id, registration_id, description, amount_cents, quantity)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(item.id)
            .bind(payment.id)
            .bind(item.registration_id)
            .bind(&item.description)
            .bind(item.amount_cents)
            .bind(item.quantity)
            .execute(tx.as_mut())
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Payment>> {
        let row = sqlx::query(&format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| map_payment(&r)).transpose()
    }

    pub async fn find_by_reference(&self, reference: &str) -> Result<Option<Payment>> {
        let row = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE reference = $1"
        ))
        .bind(reference)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| map_payment(&r)).transpose()
    }

    /// Row lock scoping the settlement transaction; the payment row is the
    /// single serialization point for completion.
    pub async fn lock_tx(tx: &mut Transaction<'_, Postgres>, id: Uuid) -> Result<Option<Payment>> {
        let row = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(tx.as_mut())
        .await?;

        row.map(|r| map_payment(&r)).transpose()
    }

    pub async fn items(&self, payment_id: Uuid) -> Result<Vec<PaymentItem>> {
        let rows = sqlx::query(
            "SELECT id, payment_id, registration_id, description, amount_cents, quantity \
             FROM payment_items WHERE payment_id = $1 ORDER BY id",
        )
        .bind(payment_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(map_item).collect())
    }

    pub async fn items_tx(
        tx: &mut Transaction<'_, Postgres>,
        payment_id: Uuid,
    ) -> Result<Vec<PaymentItem>> {
        let rows = sqlx::query(
            "SELECT id, payment_id, registration_id, description, amount_cents, quantity \
             FROM payment_items WHERE payment_id = $1 ORDER BY id",
        )
        .bind(payment_id)
        .fetch_all(tx.as_mut())
        .await?;

        Ok(rows.iter().map(map_item).collect())
    }

    /// Of the given registrations, those already charged by a COMPLETED
    /// payment. Non-empty means the checkout must be rejected.
    pub async fn already_paid_registrations(&self, registration_ids: &[Uuid]) -> Result<Vec<Uuid>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT pi.registration_id
            FROM payment_items pi
            JOIN payments p ON p.id = pi.payment_id
            WHERE p.status = 'COMPLETED' AND pi.registration_id = ANY($1)
            "#,
        )
        .bind(registration_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(|r| r.get("registration_id")).collect())
    }

    /// Conditional PENDING → PROCESSING after successful gateway init.
    pub async fn mark_processing(&self, id: Uuid, response_entry: serde_json::Value) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = 'PROCESSING', gateway_response = gateway_response || $2::jsonb
            WHERE id = $1 AND status = 'PENDING'
            "#,
        )
        .bind(id)
        .bind(response_entry)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// The completion write: affected-rows 0 means another caller settled the
    /// payment first and this call must degrade to a no-op.
    pub async fn complete_tx(
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
        transaction_id: Option<&str>,
        gateway_fee_cents: Option<i64>,
        response_entry: serde_json::Value,
        paid_at: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = 'COMPLETED',
                gateway_transaction_id = COALESCE($2, gateway_transaction_id),
                gateway_fee_cents = COALESCE($3, gateway_fee_cents),
                gateway_response = gateway_response || $4::jsonb,
                paid_at = $5
            WHERE id = $1 AND status IN ('PENDING', 'PROCESSING')
            "#,
        )
        .bind(id)
        .bind(transaction_id)
        .bind(gateway_fee_cents)
        .bind(response_entry)
        .bind(paid_at)
        .execute(tx.as_mut())
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn mark_failed(
        &self,
        id: Uuid,
        reason: &str,
        response_entry: Option<serde_json::Value>,
        failed_at: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = 'FAILED',
                failure_reason = $2,
                gateway_response = gateway_response || COALESCE($3::jsonb, '[]'::jsonb),
                failed_at = $4
            WHERE id = $1 AND status IN ('PENDING', 'PROCESSING')
            "#,
        )
        .bind(id)
        .bind(reason)
        .bind(response_entry)
        .bind(failed_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn mark_cancelled(
        &self,
        id: Uuid,
        response_entry: Option<serde_json::Value>,
        at: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = 'CANCELLED',
                gateway_response = gateway_response || COALESCE($2::jsonb, '[]'::jsonb),
                failed_at = $3
            WHERE id = $1 AND status IN ('PENDING', 'PROCESSING')
            "#,
        )
        .bind(id)
        .bind(response_entry)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Append a gateway sub-document without touching status.
    pub async fn append_response(&self, id: Uuid, response_entry: serde_json::Value) -> Result<()> {
        sqlx::query("UPDATE payments SET gateway_response = gateway_response || $2::jsonb WHERE id = $1")
            .bind(id)
            .bind(response_entry)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// COMPLETED/PARTIALLY_REFUNDED → (PARTIALLY_)REFUNDED after a settled
    /// refund; the status guard keeps refunds off non-completed payments.
    pub async fn set_refund_status_tx(
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
        status: PaymentStatus,
        refunded_at: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = $2, refunded_at = $3
            WHERE id = $1 AND status IN ('COMPLETED', 'PARTIALLY_REFUNDED')
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(refunded_at)
        .execute(tx.as_mut())
        .await?;

        Ok(result.rows_affected())
    }
}
