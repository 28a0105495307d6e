use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
    Refunded,
    PartiallyRefunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Processing => "PROCESSING",
            PaymentStatus::Completed => "COMPLETED",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Cancelled => "CANCELLED",
            PaymentStatus::Refunded => "REFUNDED",
            PaymentStatus::PartiallyRefunded => "PARTIALLY_REFUNDED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(PaymentStatus::Pending),
            "PROCESSING" => Some(PaymentStatus::Processing),
            "COMPLETED" => Some(PaymentStatus::Completed),
            "FAILED" => Some(PaymentStatus::Failed),
            "CANCELLED" => Some(PaymentStatus::Cancelled),
            "REFUNDED" => Some(PaymentStatus::Refunded),
            "PARTIALLY_REFUNDED" => Some(PaymentStatus::PartiallyRefunded),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Card,
    MobileMoney,
    Redirect,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "CARD",
            PaymentMethod::MobileMoney => "MOBILE_MONEY",
            PaymentMethod::Redirect => "REDIRECT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CARD" => Some(PaymentMethod::Card),
            "MOBILE_MONEY" => Some(PaymentMethod::MobileMoney),
            "REDIRECT" => Some(PaymentMethod::Redirect),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GatewayResponseStage {
    Initialization,
    Webhook,
    Verification,
}

/// One recorded gateway sub-document. Entries are only ever appended; the
/// log is stored as a JSONB array and grown with `||` so earlier entries are
/// never rewritten.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayResponseEntry {
    pub stage: GatewayResponseStage,
    pub recorded_at: DateTime<Utc>,
    pub body: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GatewayResponseLog(pub Vec<GatewayResponseEntry>);

impl GatewayResponseLog {
    pub fn from_value(value: serde_json::Value) -> Self {
        serde_json::from_value(value).unwrap_or_default()
    }

    pub fn append(&mut self, stage: GatewayResponseStage, body: serde_json::Value, at: DateTime<Utc>) {
        self.0.push(GatewayResponseEntry {
            stage,
            recorded_at: at,
            body,
        });
    }

    pub fn latest(&self, stage: GatewayResponseStage) -> Option<&GatewayResponseEntry> {
        self.0.iter().rev().find(|e| e.stage == stage)
    }
}

/// Single-element JSONB array suitable for `gateway_response || $n::jsonb`.
pub fn response_entry_json(
    stage: GatewayResponseStage,
    body: serde_json::Value,
    at: DateTime<Utc>,
) -> serde_json::Value {
    serde_json::json!([GatewayResponseEntry {
        stage,
        recorded_at: at,
        body,
    }])
}

#[derive(Debug, Clone)]
pub struct Payment {
    pub id: Uuid,
    pub reference: String,
    pub event_id: Uuid,
    pub payer_id: Uuid,
    pub gateway_slug: String,
    pub amount_cents: i64,
    pub currency: String,
    pub gateway_fee_cents: i64,
    pub platform_fee_cents: i64,
    pub status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub payment_phone: Option<String>,
    pub gateway_transaction_id: Option<String>,
    pub gateway_response: GatewayResponseLog,
    pub failure_reason: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct PaymentItem {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub registration_id: Uuid,
    pub description: String,
    pub amount_cents: i64,
    pub quantity: i32,
}

#[derive(Debug, Clone)]
pub struct Registration {
    pub id: Uuid,
    pub event_id: Uuid,
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InitiatePaymentRequest {
    pub event_id: Uuid,
    pub registration_ids: Vec<Uuid>,
    pub payment_gateway: String,
    pub payment_method: PaymentMethod,
    pub payment_phone: Option<String>,
    pub card_token: Option<String>,
    pub return_url: Option<String>,
    pub cancel_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PaymentItemView {
    pub registration_id: Uuid,
    pub description: String,
    pub amount_cents: i64,
    pub quantity: i32,
}

#[derive(Debug, Serialize)]
pub struct PaymentView {
    pub id: Uuid,
    pub reference: String,
    pub event_id: Uuid,
    pub gateway: String,
    pub amount_cents: i64,
    pub currency: String,
    pub gateway_fee_cents: i64,
    pub platform_fee_cents: i64,
    pub status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub gateway_transaction_id: Option<String>,
    pub failure_reason: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub items: Vec<PaymentItemView>,
}

impl PaymentView {
    pub fn from_payment(payment: Payment, items: Vec<PaymentItem>) -> Self {
        PaymentView {
            id: payment.id,
            reference: payment.reference,
            event_id: payment.event_id,
            gateway: payment.gateway_slug,
            amount_cents: payment.amount_cents,
            currency: payment.currency,
            gateway_fee_cents: payment.gateway_fee_cents,
            platform_fee_cents: payment.platform_fee_cents,
            status: payment.status,
            payment_method: payment.payment_method,
            gateway_transaction_id: payment.gateway_transaction_id,
            failure_reason: payment.failure_reason,
            paid_at: payment.paid_at,
            created_at: payment.created_at,
            items: items
                .into_iter()
                .map(|i| PaymentItemView {
                    registration_id: i.registration_id,
                    description: i.description,
                    amount_cents: i.amount_cents,
                    quantity: i.quantity,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InitiatePaymentResponse {
    pub payment: PaymentView,
    pub gateway_data: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct PaymentStatusView {
    pub reference: String,
    pub status: PaymentStatus,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub error: ErrorPayload,
}

#[derive(Debug, Serialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_log_appends_in_order() {
        let t0 = Utc::now();
        let mut log = GatewayResponseLog::default();
        log.append(GatewayResponseStage::Initialization, serde_json::json!({"a": 1}), t0);
        log.append(GatewayResponseStage::Webhook, serde_json::json!({"b": 2}), t0);
        log.append(GatewayResponseStage::Webhook, serde_json::json!({"b": 3}), t0);

        assert_eq!(log.0.len(), 3);
        assert_eq!(log.0[0].stage, GatewayResponseStage::Initialization);
        let latest = log.latest(GatewayResponseStage::Webhook).unwrap();
        assert_eq!(latest.body, serde_json::json!({"b": 3}));
    }

    #[test]
    fn response_log_round_trips_through_json() {
        let mut log = GatewayResponseLog::default();
        log.append(GatewayResponseStage::Verification, serde_json::json!({"status": "success"}), Utc::now());

        let value = serde_json::to_value(&log).unwrap();
        assert!(value.is_array());
        let back = GatewayResponseLog::from_value(value);
        assert_eq!(back.0.len(), 1);
        assert_eq!(back.0[0].stage, GatewayResponseStage::Verification);
    }

    #[test]
    fn status_strings_round_trip() {
        for status in [
            PaymentStatus::Pending,
            PaymentStatus::Processing,
            PaymentStatus::Completed,
            PaymentStatus::Failed,
            PaymentStatus::Cancelled,
            PaymentStatus::Refunded,
            PaymentStatus::PartiallyRefunded,
        ] {
            assert_eq!(PaymentStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(PaymentStatus::parse("SETTLED"), None);
    }
}
