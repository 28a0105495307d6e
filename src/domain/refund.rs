use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefundStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl RefundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefundStatus::Pending => "PENDING",
            RefundStatus::Processing => "PROCESSING",
            RefundStatus::Completed => "COMPLETED",
            RefundStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(RefundStatus::Pending),
            "PROCESSING" => Some(RefundStatus::Processing),
            "COMPLETED" => Some(RefundStatus::Completed),
            "FAILED" => Some(RefundStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Refund {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub processed_by: Uuid,
    pub reference: String,
    pub gateway_refund_id: Option<String>,
    pub amount_cents: i64,
    pub currency: String,
    pub status: RefundStatus,
    pub reason: String,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefundRequest {
    /// Defaults to the remaining refundable balance.
    pub amount_cents: Option<i64>,
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct RefundView {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub reference: String,
    pub gateway_refund_id: Option<String>,
    pub amount_cents: i64,
    pub currency: String,
    pub status: RefundStatus,
    pub reason: String,
    pub processed_at: Option<DateTime<Utc>>,
}

impl RefundView {
    pub fn from_refund(r: Refund) -> Self {
        RefundView {
            id: r.id,
            payment_id: r.payment_id,
            reference: r.reference,
            gateway_refund_id: r.gateway_refund_id,
            amount_cents: r.amount_cents,
            currency: r.currency,
            status: r.status,
            reason: r.reason,
            processed_at: r.processed_at,
        }
    }
}
