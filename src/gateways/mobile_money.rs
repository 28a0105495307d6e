use crate::domain::payment::Payment;
use crate::error::PaymentError;
use crate::gateways::signature::verify_field_hash;
use crate::gateways::{
    GatewayAdapter, GatewayPaymentStatus, GatewayProfile, GatewayRefundStatus, InitResult,
    InitializeOptions, RefundOutcome, VerifyOutcome, WebhookEvent,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;

const DEFAULT_COUNTRY_CODE: &str = "233";

/// Mobile-money push provider: initialization fires an authorization prompt
/// to the payer's phone; status comes back via a hash-signed callback or the
/// collections status endpoint. The provider exposes no refund API.
pub struct MobileMoneyGateway {
    pub slug: String,
    pub base_url: String,
    pub api_key: String,
    pub webhook_secret: String,
    pub country_code: String,
    pub timeout_ms: u64,
    pub client: reqwest::Client,
}

impl MobileMoneyGateway {
    pub fn from_profile(profile: &GatewayProfile, client: reqwest::Client, timeout_ms: u64) -> Self {
        Self {
            slug: profile.slug.clone(),
            base_url: profile.credential("base_url"),
            api_key: profile.credential("api_key"),
            webhook_secret: profile.webhook_secret.clone().unwrap_or_default(),
            country_code: profile
                .setting_str("country_code")
                .unwrap_or_else(|| DEFAULT_COUNTRY_CODE.to_string()),
            timeout_ms,
            client,
        }
    }

    fn map_status(provider_status: &str) -> GatewayPaymentStatus {
        match provider_status {
            "SUCCESSFUL" | "PAID" => GatewayPaymentStatus::Completed,
            "FAILED" | "REJECTED" => GatewayPaymentStatus::Failed,
            "CANCELLED" | "EXPIRED" => GatewayPaymentStatus::Cancelled,
            _ => GatewayPaymentStatus::Processing,
        }
    }
}

/// Canonical MSISDN form: digits only, international prefix, no plus sign.
/// A leading national trunk `0` is swapped for the country code; bare local
/// numbers get the country code prepended. Applying it twice is a no-op.
pub fn normalize_msisdn(raw: &str, country_code: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.starts_with(country_code) {
        digits
    } else if let Some(rest) = digits.strip_prefix('0') {
        format!("{country_code}{rest}")
    } else {
        format!("{country_code}{digits}")
    }
}

#[async_trait]
impl GatewayAdapter for MobileMoneyGateway {
    fn slug(&self) -> &str {
        &self.slug
    }

    async fn initialize_payment(
        &self,
        payment: &Payment,
        options: &InitializeOptions,
    ) -> Result<InitResult, PaymentError> {
        let phone = options
            .phone
            .clone()
            .or_else(|| payment.payment_phone.clone())
            .ok_or_else(|| {
                PaymentError::Validation("payment_phone is required for mobile money".to_string())
            })?;
        let msisdn = normalize_msisdn(&phone, &self.country_code);

        let url = format!("{}/v1/collections/push", self.base_url);
        let body = json!({
            "reference": payment.reference,
            "amount": payment.amount_cents,
            "currency": payment.currency,
            "msisdn": msisdn,
        });

        let resp = self
            .client
            .post(url)
            .header("X-Api-Key", &self.api_key)
            .json(&body)
            .timeout(std::time::Duration::from_millis(self.timeout_ms))
            .send()
            .await;

        match resp {
            Ok(r) if r.status().is_success() => {
                let v: serde_json::Value = r.json().await.unwrap_or_default();
                Ok(InitResult {
                    gateway_data: json!({
                        "reference": payment.reference,
                        "msisdn": msisdn,
                        "instructions": "approve the payment prompt sent to your phone",
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
        let url = format!("{}/v1/collections/{}", self.base_url, payment.reference);
        let resp = self
            .client
            .get(url)
            .header("X-Api-Key", &self.api_key)
            .timeout(std::time::Duration::from_millis(self.timeout_ms))
            .send()
            .await;

        match resp {
            Ok(r) if r.status().is_success() => {
                let v: serde_json::Value = r.json().await.unwrap_or_default();
                let provider_status = v.get("status").and_then(|s| s.as_str()).unwrap_or("");
                Ok(VerifyOutcome {
                    status: Self::map_status(provider_status),
                    transaction_id: v
                        .get("transaction_id")
                        .and_then(|s| s.as_str())
                        .map(str::to_string),
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
        _payment: &Payment,
        _amount_cents: i64,
        _refund_reference: &str,
    ) -> Result<RefundOutcome, PaymentError> {
        // No provider refund API; the refund record is settled out of band.
        Ok(RefundOutcome {
            refund_id: None,
            status: GatewayRefundStatus::ManualProcessingRequired,
            raw: json!({"note": "provider exposes no refund API"}),
        })
    }

    fn handle_webhook(
        &self,
        body: &[u8],
        _signature: Option<&str>,
        _now: DateTime<Utc>,
    ) -> Result<WebhookEvent, PaymentError> {
        let v: serde_json::Value = serde_json::from_slice(body)
            .map_err(|_| PaymentError::Validation("malformed webhook payload".to_string()))?;

        let provided = v
            .get("hash")
            .and_then(|h| h.as_str())
            .ok_or(PaymentError::InvalidSignature)?;

        // Hash covers the non-hash fields in documented order.
        let reference = field_string(&v, "reference");
        let status = field_string(&v, "status");
        let transaction_id = field_string(&v, "transaction_id");
        let amount = field_string(&v, "amount");
        verify_field_hash(
            &[&reference, &status, &transaction_id, &amount],
            provided,
            &self.webhook_secret,
        )?;

        if reference.is_empty() {
            return Err(PaymentError::Validation(
                "webhook missing payment reference".to_string(),
            ));
        }

        Ok(WebhookEvent {
            payment_reference: reference,
            status: Self::map_status(&status),
            transaction_id: if transaction_id.is_empty() {
                None
            } else {
                Some(transaction_id)
            },
            raw: v,
        })
    }
}

fn field_string(v: &serde_json::Value, key: &str) -> String {
    match v.get(key) {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateways::signature::field_hash;

    #[test]
    fn normalizes_trunk_prefixed_numbers() {
        assert_eq!(normalize_msisdn("0244123456", "233"), "233244123456");
    }

    #[test]
    fn normalizes_bare_local_numbers() {
        assert_eq!(normalize_msisdn("244123456", "233"), "233244123456");
    }

    #[test]
    fn strips_formatting_characters() {
        assert_eq!(normalize_msisdn("+233 24 412-3456", "233"), "233244123456");
    }

    #[test]
    fn normalization_is_idempotent() {
        for raw in ["0244123456", "244123456", "+233244123456", "233244123456"] {
            let once = normalize_msisdn(raw, "233");
            assert_eq!(normalize_msisdn(&once, "233"), once);
        }
    }

    fn gateway() -> MobileMoneyGateway {
        MobileMoneyGateway {
            slug: "momo".to_string(),
            base_url: "http://localhost".to_string(),
            api_key: "k".to_string(),
            webhook_secret: "cb_secret".to_string(),
            country_code: "233".to_string(),
            timeout_ms: 1000,
            client: reqwest::Client::new(),
        }
    }

    #[test]
    fn accepts_webhook_with_valid_hash() {
        let hash = field_hash(&["PAY-ABC", "SUCCESSFUL", "txn_1", "2000"], "cb_secret");
        let body = serde_json::to_vec(&json!({
            "reference": "PAY-ABC",
            "status": "SUCCESSFUL",
            "transaction_id": "txn_1",
            "amount": 2000,
            "hash": hash,
        }))
        .unwrap();

        let event = gateway().handle_webhook(&body, None, Utc::now()).unwrap();
        assert_eq!(event.payment_reference, "PAY-ABC");
        assert_eq!(event.status, GatewayPaymentStatus::Completed);
        assert_eq!(event.transaction_id.as_deref(), Some("txn_1"));
    }

    #[test]
    fn rejects_webhook_with_tampered_hash() {
        let hash = field_hash(&["PAY-ABC", "SUCCESSFUL", "txn_1", "2000"], "cb_secret");
        let body = serde_json::to_vec(&json!({
            "reference": "PAY-ABC",
            "status": "SUCCESSFUL",
            "transaction_id": "txn_1",
            "amount": 9000,
            "hash": hash,
        }))
        .unwrap();

        let err = gateway().handle_webhook(&body, None, Utc::now()).unwrap_err();
        assert!(matches!(err, PaymentError::InvalidSignature));
    }

    #[test]
    fn rejects_webhook_without_hash() {
        let body = serde_json::to_vec(&json!({
            "reference": "PAY-ABC",
            "status": "SUCCESSFUL",
        }))
        .unwrap();

        let err = gateway().handle_webhook(&body, None, Utc::now()).unwrap_err();
        assert!(matches!(err, PaymentError::InvalidSignature));
    }
}
