use crate::domain::payment::Payment;
use crate::error::PaymentError;
use crate::gateways::signature::verify_timestamped_hmac;
use crate::gateways::{
    GatewayAdapter, GatewayPaymentStatus, GatewayProfile, GatewayRefundStatus, InitResult,
    InitializeOptions, RefundOutcome, VerifyOutcome, WebhookEvent,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;

const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Tokenized-card provider: the client tokenizes the card up front, we create
/// a charge against the token and hand back the client secret for any 3DS
/// challenge; settlement is reported by signed webhook or the charge endpoint.
pub struct CardGateway {
    pub slug: String,
    pub base_url: String,
    pub secret_key: String,
    pub webhook_secret: String,
    pub timeout_ms: u64,
    pub client: reqwest::Client,
}

impl CardGateway {
    pub fn from_profile(profile: &GatewayProfile, client: reqwest::Client, timeout_ms: u64) -> Self {
        Self {
            slug: profile.slug.clone(),
            base_url: profile.credential("base_url"),
            secret_key: profile.credential("secret_key"),
            webhook_secret: profile.webhook_secret.clone().unwrap_or_default(),
            timeout_ms,
            client,
        }
    }

    fn map_status(provider_status: &str) -> GatewayPaymentStatus {
        match provider_status {
            "succeeded" => GatewayPaymentStatus::Completed,
            "processing" | "requires_action" => GatewayPaymentStatus::Processing,
            "canceled" => GatewayPaymentStatus::Cancelled,
            _ => GatewayPaymentStatus::Failed,
        }
    }
}

#[async_trait]
impl GatewayAdapter for CardGateway {
    fn slug(&self) -> &str {
        &self.slug
    }

    fn signature_header(&self) -> Option<&'static str> {
        Some("X-Charge-Signature")
    }

    async fn initialize_payment(
        &self,
        payment: &Payment,
        options: &InitializeOptions,
    ) -> Result<InitResult, PaymentError> {
        let token = options.card_token.clone().ok_or_else(|| {
            PaymentError::Validation("card_token is required for card payments".to_string())
        })?;

        let url = format!("{}/v1/charges", self.base_url);
        let body = json!({
            "reference": payment.reference,
            "amount": payment.amount_cents,
            "currency": payment.currency,
            "source": token,
            "capture": true,
            "return_url": options.return_url,
        });

        let resp = self
            .client
            .post(url)
            .bearer_auth(&self.secret_key)
            .json(&body)
            .timeout(std::time::Duration::from_millis(self.timeout_ms))
            .send()
            .await;

        match resp {
            Ok(r) if r.status().is_success() => {
                let v: serde_json::Value = r.json().await.unwrap_or_default();
                let charge_id = v.get("id").and_then(|s| s.as_str()).map(str::to_string);
                Ok(InitResult {
                    gateway_data: json!({
                        "charge_id": charge_id,
                        "client_secret": v.get("client_secret"),
                        "requires_action": v.get("status").and_then(|s| s.as_str())
                            == Some("requires_action"),
                        "reference": payment.reference,
                    }),
                    raw: v,
                })
            }
            Ok(r) => {
                let status = r.status();
                let text = r.text().await.unwrap_or_default();
                Err(PaymentError::GatewayInitializationFailed(format!(
                    "HTTP_{}: {}",
                    status.as_u16(),
                    text.chars().take(200).collect::<String>()
                )))
            }
            Err(e) if e.is_timeout() => Err(PaymentError::GatewayInitializationFailed(
                "gateway timeout".to_string(),
            )),
            Err(e) => Err(PaymentError::GatewayInitializationFailed(e.to_string())),
        }
    }

    async fn verify_payment(&self, payment: &Payment) -> Result<VerifyOutcome, PaymentError> {
        let url = format!("{}/v1/charges/{}", self.base_url, payment.reference);
        let resp = self
            .client
            .get(url)
            .bearer_auth(&self.secret_key)
            .timeout(std::time::Duration::from_millis(self.timeout_ms))
            .send()
            .await;

        match resp {
            Ok(r) if r.status().is_success() => {
                let v: serde_json::Value = r.json().await.unwrap_or_default();
                let provider_status = v.get("status").and_then(|s| s.as_str()).unwrap_or("");
                Ok(VerifyOutcome {
                    status: Self::map_status(provider_status),
                    transaction_id: v.get("id").and_then(|s| s.as_str()).map(str::to_string),
                    amount_cents: v.get("amount").and_then(|a| a.as_i64()),
                    raw: v,
                })
            }
            Ok(r) => Err(PaymentError::Internal(anyhow::anyhow!(
                "verification request rejected: HTTP {}",
                r.status().as_u16()
            ))),
            Err(e) if e.is_timeout() => Ok(VerifyOutcome {
                status: GatewayPaymentStatus::Processing,
                transaction_id: None,
                amount_cents: None,
                raw: json!({"error": "verification timed out"}),
            }),
            Err(e) => Err(PaymentError::Internal(e.into())),
        }
    }

    async fn refund_payment(
        &self,
        payment: &Payment,
        amount_cents: i64,
        refund_reference: &str,
    ) -> Result<RefundOutcome, PaymentError> {
        let charge = payment
            .gateway_transaction_id
            .clone()
            .unwrap_or_else(|| payment.reference.clone());
        let url = format!("{}/v1/refunds", self.base_url);
        let body = json!({
            "charge": charge,
            "amount": amount_cents,
            "idempotency_key": refund_reference,
        });

        let resp = self
            .client
            .post(url)
            .bearer_auth(&self.secret_key)
            .json(&body)
            .timeout(std::time::Duration::from_millis(self.timeout_ms))
            .send()
            .await;

        match resp {
            Ok(r) if r.status().is_success() => {
                let v: serde_json::Value = r.json().await.unwrap_or_default();
                Ok(RefundOutcome {
                    refund_id: v.get("id").and_then(|s| s.as_str()).map(str::to_string),
                    status: GatewayRefundStatus::Completed,
                    raw: v,
                })
            }
            Ok(r) => {
                let status = r.status();
                let text = r.text().await.unwrap_or_default();
                Err(PaymentError::Internal(anyhow::anyhow!(
                    "refund rejected: HTTP_{}: {}",
                    status.as_u16(),
                    text.chars().take(200).collect::<String>()
                )))
            }
            Err(e) if e.is_timeout() => Err(PaymentError::Internal(anyhow::anyhow!(
                "refund request timed out"
            ))),
            Err(e) => Err(PaymentError::Internal(e.into())),
        }
    }

    fn handle_webhook(
        &self,
        body: &[u8],
        signature: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<WebhookEvent, PaymentError> {
        let signature = signature.ok_or(PaymentError::InvalidSignature)?;
        verify_timestamped_hmac(
            body,
            signature,
            &self.webhook_secret,
            SIGNATURE_TOLERANCE_SECS,
            now,
        )?;

        let v: serde_json::Value = serde_json::from_slice(body)
            .map_err(|_| PaymentError::Validation("malformed webhook payload".to_string()))?;

        let reference = v
            .pointer("/data/reference")
            .and_then(|s| s.as_str())
            .ok_or_else(|| PaymentError::Validation("webhook missing payment reference".to_string()))?
            .to_string();

        let status = match v.get("type").and_then(|e| e.as_str()).unwrap_or("") {
            "charge.succeeded" => GatewayPaymentStatus::Completed,
            "charge.failed" => GatewayPaymentStatus::Failed,
            "charge.canceled" => GatewayPaymentStatus::Cancelled,
            _ => GatewayPaymentStatus::Processing,
        };

        Ok(WebhookEvent {
            payment_reference: reference,
            status,
            transaction_id: v.pointer("/data/id").and_then(|s| s.as_str()).map(str::to_string),
            raw: v,
        })
    }
}
