use crate::clock::Clock;
use crate::domain::payment::{response_entry_json, GatewayResponseStage, PaymentStatus};
use crate::error::PaymentError;
use crate::gateways::{GatewayPaymentStatus, GatewayRegistry};
use crate::repo::payments_repo::PaymentsRepo;
use crate::repo::webhook_log_repo::WebhookLogRepo;
use crate::service::settlement::{SettlementData, SettlementEngine};
use std::sync::Arc;
use uuid::Uuid;

/// Outcome reported to the provider. Either way the response body is the
/// generic `{status}` JSON; the webhook log is the diagnostic trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Processed,
    Rejected,
}

#[derive(Clone)]
pub struct WebhookIngest {
    pub webhook_log_repo: WebhookLogRepo,
    pub payments_repo: PaymentsRepo,
    pub engine: SettlementEngine,
    pub registry: Arc<GatewayRegistry>,
    pub clock: Arc<dyn Clock>,
}

impl WebhookIngest {
    /// Protocol per inbound call: log first (a crash mid-processing must
    /// still leave evidence the webhook arrived), then authenticate, dedupe,
    /// and hand the mapped status to the settlement engine.
    pub async fn ingest(
        &self,
        gateway_slug: &str,
        signature: Option<String>,
        body: &[u8],
    ) -> IngestOutcome {
        let payload = serde_json::from_slice::<serde_json::Value>(body)
            .unwrap_or_else(|_| serde_json::json!({ "raw": String::from_utf8_lossy(body) }));

        let log_id = Uuid::new_v4();
        if let Err(e) = self
            .webhook_log_repo
            .insert_pending(log_id, gateway_slug, &payload)
            .await
        {
            tracing::error!(gateway = gateway_slug, error = %e, "failed to record webhook");
            return IngestOutcome::Rejected;
        }

        match self.process(gateway_slug, signature.as_deref(), body).await {
            Ok(event_reference) => {
                if let Err(e) = self
                    .webhook_log_repo
                    .mark_processed(log_id, event_reference.as_deref(), self.clock.now())
                    .await
                {
                    tracing::error!(gateway = gateway_slug, error = %e, "failed to update webhook log");
                }
                IngestOutcome::Processed
            }
            Err(e) => {
                tracing::warn!(gateway = gateway_slug, error = %e, "webhook processing failed");
                if let Err(log_err) = self
                    .webhook_log_repo
                    .mark_failed(log_id, &e.to_string(), self.clock.now())
                    .await
                {
                    tracing::error!(gateway = gateway_slug, error = %log_err, "failed to update webhook log");
                }
                IngestOutcome::Rejected
            }
        }
    }

    async fn process(
        &self,
        gateway_slug: &str,
        signature: Option<&str>,
        body: &[u8],
    ) -> Result<Option<String>, PaymentError> {
        let adapter = self.registry.resolve(gateway_slug).ok_or_else(|| {
            PaymentError::GatewayUnavailable(format!("unknown gateway '{gateway_slug}'"))
        })?;

        // Authenticity first: a tampered payload never reaches payment lookup.
        let event = adapter.handle_webhook(body, signature, self.clock.now())?;

        let event_reference = match &event.transaction_id {
            Some(txn) => format!("{}:{txn}", event.payment_reference),
            None => event.payment_reference.clone(),
        };
        if self
            .webhook_log_repo
            .processed_exists(gateway_slug, &event_reference)
            .await?
        {
            tracing::info!(gateway = gateway_slug, event = %event_reference, "duplicate webhook acknowledged");
            return Ok(Some(event_reference));
        }

        let payment = self
            .payments_repo
            .find_by_reference(&event.payment_reference)
            .await?
            .ok_or(PaymentError::NotFound("payment"))?;

        let now = self.clock.now();
        match event.status {
            GatewayPaymentStatus::Completed => {
                if payment.status != PaymentStatus::Completed {
                    self.engine
                        .mark_as_paid(
                            payment.id,
                            SettlementData {
                                stage: GatewayResponseStage::Webhook,
                                transaction_id: event.transaction_id.clone(),
                                raw: event.raw.clone(),
                            },
                        )
                        .await?;
                }
            }
            GatewayPaymentStatus::Failed => {
                let entry = response_entry_json(GatewayResponseStage::Webhook, event.raw.clone(), now);
                self.payments_repo
                    .mark_failed(payment.id, "gateway webhook reported failure", Some(entry), now)
                    .await?;
            }
            GatewayPaymentStatus::Cancelled => {
                let entry = response_entry_json(GatewayResponseStage::Webhook, event.raw.clone(), now);
                self.payments_repo.mark_cancelled(payment.id, Some(entry), now).await?;
            }
            GatewayPaymentStatus::Processing => {
                let entry = response_entry_json(GatewayResponseStage::Webhook, event.raw.clone(), now);
                self.payments_repo.append_response(payment.id, entry).await?;
            }
        }

        Ok(Some(event_reference))
    }
}
