use crate::clock::Clock;
use crate::domain::payment::{
    response_entry_json, GatewayResponseStage, Payment, PaymentStatus, PaymentStatusView,
};
use crate::domain::refund::{Refund, RefundRequest, RefundStatus};
use crate::error::PaymentError;
use crate::gateways::{
    GatewayAdapter, GatewayPaymentStatus, GatewayRefundStatus, GatewayRegistry, InitializeOptions,
};
use crate::repo::payments_repo::PaymentsRepo;
use crate::repo::refunds_repo::{NewRefund, RefundsRepo};
use crate::repo::registrations_repo::RegistrationsRepo;
use crate::repo::tickets_repo::TicketsRepo;
use crate::service::ledger::generate_reference;
use crate::settlement::state::{completion_action, refund_target, refundable, CompletionAction};
use anyhow::anyhow;
use serde::Serialize;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

const MAX_REFERENCE_ATTEMPTS: usize = 5;

/// Gateway evidence accompanying a completion: which stage reported it, the
/// provider transaction id, and the raw document to append to the log.
pub struct SettlementData {
    pub stage: GatewayResponseStage,
    pub transaction_id: Option<String>,
    pub raw: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct VerificationView {
    pub reference: String,
    pub status: PaymentStatus,
    /// Absent when verification short-circuited without a gateway call.
    pub gateway_status: Option<GatewayPaymentStatus>,
}

/// Owns every status transition of a payment. Request handlers and webhook
/// ingestion both funnel through here; nothing else writes payment items,
/// tickets, or refunds.
#[derive(Clone)]
pub struct SettlementEngine {
    pub pool: PgPool,
    pub payments_repo: PaymentsRepo,
    pub refunds_repo: RefundsRepo,
    pub registry: Arc<GatewayRegistry>,
    pub clock: Arc<dyn Clock>,
}

impl SettlementEngine {
    fn adapter(&self, slug: &str) -> Result<Arc<dyn GatewayAdapter>, PaymentError> {
        self.registry
            .resolve(slug)
            .ok_or_else(|| PaymentError::GatewayUnavailable(format!("no adapter registered for '{slug}'")))
    }

    /// Gateway initialization. The gateway call runs with no transaction
    /// open; whatever the outcome, the resulting state is durably recorded
    /// before this returns.
    pub async fn initiate(
        &self,
        payment: &Payment,
        options: &InitializeOptions,
    ) -> Result<serde_json::Value, PaymentError> {
        if payment.status != PaymentStatus::Pending {
            return Err(PaymentError::InvalidStateTransition {
                from: payment.status,
                to: PaymentStatus::Processing,
            });
        }

        let adapter = self.adapter(&payment.gateway_slug)?;
        match adapter.initialize_payment(payment, options).await {
            Ok(init) => {
                let entry = response_entry_json(
                    GatewayResponseStage::Initialization,
                    init.raw,
                    self.clock.now(),
                );
                let updated = self.payments_repo.mark_processing(payment.id, entry).await?;
                if updated == 0 {
                    tracing::warn!(payment = %payment.reference, "initialization raced another transition");
                }
                tracing::info!(payment = %payment.reference, gateway = %payment.gateway_slug, "payment processing");
                Ok(init.gateway_data)
            }
            Err(e) => {
                // Failed payments stay failed; retrying means a new payment.
                let now = self.clock.now();
                let entry = response_entry_json(
                    GatewayResponseStage::Initialization,
                    serde_json::json!({"error": e.to_string()}),
                    now,
                );
                self.payments_repo
                    .mark_failed(payment.id, &e.to_string(), Some(entry), now)
                    .await?;
                tracing::warn!(payment = %payment.reference, error = %e, "gateway initialization failed");
                Err(e)
            }
        }
    }

    /// The at-most-once completion transition. Runs in a single transaction
    /// with the payment row locked: exactly one caller applies the cascade
    /// (registrations confirmed, tickets created); every other caller sees
    /// COMPLETED and returns success without side effects.
    pub async fn mark_as_paid(
        &self,
        payment_id: Uuid,
        data: SettlementData,
    ) -> Result<(), PaymentError> {
        let now = self.clock.now();
        let mut tx = self.pool.begin().await?;

        let payment = PaymentsRepo::lock_tx(&mut tx, payment_id)
            .await?
            .ok_or(PaymentError::NotFound("payment"))?;

        match completion_action(payment.status) {
            CompletionAction::AlreadyCompleted => {
                tx.rollback().await?;
                return Ok(());
            }
            CompletionAction::Reject => {
                tx.rollback().await?;
                return Err(PaymentError::InvalidStateTransition {
                    from: payment.status,
                    to: PaymentStatus::Completed,
                });
            }
            CompletionAction::Apply => {}
        }

        // Providers that itemize their fee report it alongside the status.
        let gateway_fee_cents = data.raw.get("fees").and_then(|f| f.as_i64());
        let entry = response_entry_json(data.stage, data.raw, now);
        let updated = PaymentsRepo::complete_tx(
            &mut tx,
            payment_id,
            data.transaction_id.as_deref(),
            gateway_fee_cents,
            entry,
            now,
        )
        .await?;
        if updated == 0 {
            // Lost the race despite the lock; someone else settled it.
            tx.rollback().await?;
            return Ok(());
        }

        let items = PaymentsRepo::items_tx(&mut tx, payment_id).await?;
        let registration_ids: Vec<Uuid> = items.iter().map(|i| i.registration_id).collect();
        RegistrationsRepo::confirm_tx(&mut tx, &registration_ids).await?;

        for registration_id in &registration_ids {
            TicketsRepo::insert_if_absent_tx(
                &mut tx,
                Uuid::new_v4(),
                *registration_id,
                &generate_reference("TKT"),
            )
            .await?;
        }

        tx.commit().await?;
        tracing::info!(
            payment = %payment.reference,
            registrations = registration_ids.len(),
            "payment settled"
        );
        Ok(())
    }

    /// Pull-based reconciliation. Completed payments short-circuit without a
    /// gateway call; otherwise the adapter reports and the reported outcome
    /// is applied through the same transitions the webhook path uses.
    pub async fn verify(&self, payment: &Payment) -> Result<VerificationView, PaymentError> {
        if payment.status == PaymentStatus::Completed {
            return Ok(VerificationView {
                reference: payment.reference.clone(),
                status: payment.status,
                gateway_status: None,
            });
        }

        let adapter = self.adapter(&payment.gateway_slug)?;
        let outcome = adapter.verify_payment(payment).await?;
        let now = self.clock.now();
        let entry = response_entry_json(GatewayResponseStage::Verification, outcome.raw.clone(), now);

        match outcome.status {
            GatewayPaymentStatus::Completed => {
                self.mark_as_paid(
                    payment.id,
                    SettlementData {
                        stage: GatewayResponseStage::Verification,
                        transaction_id: outcome.transaction_id.clone(),
                        raw: outcome.raw.clone(),
                    },
                )
                .await?;
            }
            GatewayPaymentStatus::Failed => {
                self.payments_repo
                    .mark_failed(payment.id, "gateway reported failure", Some(entry), now)
                    .await?;
            }
            GatewayPaymentStatus::Cancelled => {
                self.payments_repo
                    .mark_cancelled(payment.id, Some(entry), now)
                    .await?;
            }
            GatewayPaymentStatus::Processing => {
                self.payments_repo.append_response(payment.id, entry).await?;
            }
        }

        let current = self
            .payments_repo
            .find_by_id(payment.id)
            .await?
            .ok_or(PaymentError::NotFound("payment"))?;

        Ok(VerificationView {
            reference: current.reference,
            status: current.status,
            gateway_status: Some(outcome.status),
        })
    }

    /// Refunds never touch the payment's paid state unless the gateway call
    /// succeeds: a failed provider refund leaves only a FAILED refund row.
    pub async fn process_refund(
        &self,
        payment: &Payment,
        req: &RefundRequest,
        actor: Uuid,
    ) -> Result<Refund, PaymentError> {
        if !refundable(payment.status) {
            return Err(PaymentError::InvalidRefundAmount(format!(
                "payment {} is not refundable in status {}",
                payment.reference,
                payment.status.as_str()
            )));
        }

        let settled = self.refunds_repo.settled_total(payment.id).await?;
        let requested = req.amount_cents.unwrap_or(payment.amount_cents - settled);
        let target = refund_target(payment.amount_cents, settled, requested).ok_or_else(|| {
            PaymentError::InvalidRefundAmount(format!(
                "requested {requested} cents with {settled} of {} already refunded",
                payment.amount_cents
            ))
        })?;

        let (refund_id, refund_reference) =
            self.insert_refund(payment, requested, &req.reason, actor).await?;

        let adapter = self.adapter(&payment.gateway_slug)?;
        let outcome = match adapter.refund_payment(payment, requested, &refund_reference).await {
            Ok(o) => o,
            Err(e) => {
                self.refunds_repo.mark_failed(refund_id, self.clock.now()).await?;
                tracing::warn!(payment = %payment.reference, error = %e, "gateway refund failed");
                return Err(e);
            }
        };

        let now = self.clock.now();
        let refund_status = match outcome.status {
            GatewayRefundStatus::Completed => RefundStatus::Completed,
            GatewayRefundStatus::ManualProcessingRequired => RefundStatus::Processing,
        };

        let mut tx = self.pool.begin().await?;
        RefundsRepo::settle_tx(&mut tx, refund_id, refund_status, outcome.refund_id.as_deref(), now)
            .await?;
        let updated = PaymentsRepo::set_refund_status_tx(&mut tx, payment.id, target, now).await?;
        if updated == 0 {
            tx.rollback().await?;
            return Err(PaymentError::InvalidStateTransition {
                from: payment.status,
                to: target,
            });
        }
        tx.commit().await?;

        tracing::info!(
            payment = %payment.reference,
            amount_cents = requested,
            status = target.as_str(),
            "refund settled"
        );

        self.refunds_repo
            .find_by_id(refund_id)
            .await?
            .ok_or_else(|| PaymentError::Internal(anyhow!("refund {refund_id} vanished after settle")))
    }

    async fn insert_refund(
        &self,
        payment: &Payment,
        amount_cents: i64,
        reason: &str,
        actor: Uuid,
    ) -> Result<(Uuid, String), PaymentError> {
        use crate::repo::payments_repo::is_unique_violation;

        for _ in 0..MAX_REFERENCE_ATTEMPTS {
            let refund = NewRefund {
                id: Uuid::new_v4(),
                payment_id: payment.id,
                processed_by: actor,
                reference: generate_reference("REF"),
                amount_cents,
                currency: payment.currency.clone(),
                reason: reason.to_string(),
            };
            match self.refunds_repo.insert_pending(&refund).await {
                Ok(()) => return Ok((refund.id, refund.reference)),
                Err(e) if is_unique_violation(&e) => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Err(PaymentError::Internal(anyhow!(
            "could not allocate a unique refund reference"
        )))
    }
}

pub fn status_view(payment: &Payment) -> PaymentStatusView {
    PaymentStatusView {
        reference: payment.reference.clone(),
        status: payment.status,
        paid_at: payment.paid_at,
    }
}
