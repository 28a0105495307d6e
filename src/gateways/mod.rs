use crate::domain::payment::{Payment, PaymentMethod};
use crate::error::PaymentError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

pub mod card;
pub mod mobile_money;
pub mod redirect;
pub mod signature;

#[derive(Debug, Clone, Default)]
pub struct InitializeOptions {
    pub method: Option<PaymentMethod>,
    pub phone: Option<String>,
    pub card_token: Option<String>,
    pub return_url: Option<String>,
    pub cancel_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct InitResult {
    /// Client-facing payload: redirect URL, client secret, push instructions.
    pub gateway_data: serde_json::Value,
    /// Raw provider response, recorded under the initialization stage of the
    /// payment's response log.
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GatewayPaymentStatus {
    Completed,
    Processing,
    Cancelled,
    Failed,
}

#[derive(Debug, Clone)]
pub struct VerifyOutcome {
    pub status: GatewayPaymentStatus,
    pub transaction_id: Option<String>,
    pub amount_cents: Option<i64>,
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayRefundStatus {
    Completed,
    /// The provider has no refund API; the ledger-side record is kept and
    /// finance settles it out of band.
    ManualProcessingRequired,
}

#[derive(Debug, Clone)]
pub struct RefundOutcome {
    pub refund_id: Option<String>,
    pub status: GatewayRefundStatus,
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub payment_reference: String,
    pub status: GatewayPaymentStatus,
    pub transaction_id: Option<String>,
    pub raw: serde_json::Value,
}

/// One provider integration. Adapters translate protocol detail and report
/// provider truth; they never finalize a payment themselves.
#[async_trait]
pub trait GatewayAdapter: Send + Sync {
    fn slug(&self) -> &str;

    /// Header carrying the webhook signature, for providers that sign via
    /// header rather than embedding a hash in the payload.
    fn signature_header(&self) -> Option<&'static str> {
        None
    }

    async fn initialize_payment(
        &self,
        payment: &Payment,
        options: &InitializeOptions,
    ) -> Result<InitResult, PaymentError>;

    /// Pull-based reconciliation. Safe to call repeatedly; returns current
    /// provider truth without side effects.
    async fn verify_payment(&self, payment: &Payment) -> Result<VerifyOutcome, PaymentError>;

    async fn refund_payment(
        &self,
        payment: &Payment,
        amount_cents: i64,
        refund_reference: &str,
    ) -> Result<RefundOutcome, PaymentError>;

    /// Parse and authenticate a provider push payload. Signature verification
    /// happens here, before the caller touches any payment row.
    fn handle_webhook(
        &self,
        body: &[u8],
        signature: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<WebhookEvent, PaymentError>;
}

/// Runtime gateway configuration loaded from a `payment_gateways` row. The
/// credentials blob is opaque here; deployment tooling seals it before
/// insert and this service only reads the keys its adapters need.
#[derive(Debug, Clone)]
pub struct GatewayProfile {
    pub slug: String,
    pub name: String,
    pub adapter_type: String,
    pub credentials: serde_json::Value,
    pub settings: serde_json::Value,
    pub webhook_secret: Option<String>,
    pub supported_currencies: Vec<String>,
}

impl GatewayProfile {
    pub fn credential(&self, key: &str) -> String {
        self.credentials
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    }

    pub fn setting_str(&self, key: &str) -> Option<String> {
        self.settings.get(key).and_then(|v| v.as_str()).map(str::to_string)
    }
}

/// Slug → adapter map, built once at startup from the active gateway rows.
pub struct GatewayRegistry {
    adapters: HashMap<String, Arc<dyn GatewayAdapter>>,
}

impl GatewayRegistry {
    pub fn build(profiles: &[GatewayProfile], http: reqwest::Client, timeout_ms: u64) -> Self {
        let mut adapters: HashMap<String, Arc<dyn GatewayAdapter>> = HashMap::new();
        for profile in profiles {
            let adapter: Arc<dyn GatewayAdapter> = match profile.adapter_type.as_str() {
                "REDIRECT" => Arc::new(redirect::RedirectGateway::from_profile(
                    profile,
                    http.clone(),
                    timeout_ms,
                )),
                "MOBILE_MONEY" => Arc::new(mobile_money::MobileMoneyGateway::from_profile(
                    profile,
                    http.clone(),
                    timeout_ms,
                )),
                "CARD" => Arc::new(card::CardGateway::from_profile(profile, http.clone(), timeout_ms)),
                other => {
                    tracing::warn!(slug = %profile.slug, adapter_type = %other, "unknown adapter type, skipping");
                    continue;
                }
            };
            adapters.insert(profile.slug.clone(), adapter);
        }

        Self { adapters }
    }

    pub fn empty() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    pub fn resolve(&self, slug: &str) -> Option<Arc<dyn GatewayAdapter>> {
        self.adapters.get(slug).cloned()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
