use crate::domain::payment::{InitiatePaymentRequest, Payment, PaymentMethod, Registration};
use crate::error::PaymentError;
use crate::repo::events_repo::EventsRepo;
use crate::repo::gateways_repo::{GatewayRow, GatewaysRepo};
use crate::repo::payments_repo::{is_unique_violation, NewPayment, NewPaymentItem, PaymentsRepo};
use crate::repo::registrations_repo::RegistrationsRepo;
use anyhow::anyhow;
use rand::Rng;
use std::collections::HashSet;
use uuid::Uuid;

const MAX_REFERENCE_ATTEMPTS: usize = 5;

// No 0/O/1/I so references survive being read over the phone.
const REFERENCE_CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

pub fn generate_reference(prefix: &str) -> String {
    let mut rng = rand::thread_rng();
    let token: String = (0..12)
        .map(|_| REFERENCE_CHARSET[rng.gen_range(0..REFERENCE_CHARSET.len())] as char)
        .collect();
    format!("{prefix}-{token}")
}

pub fn platform_fee(amount_cents: i64, fee_bps: i64) -> i64 {
    amount_cents * fee_bps / 10_000
}

/// Checkout may only cover registrations that exist, belong to the event,
/// are not cancelled, and are not already settled by a completed payment.
pub fn validate_registration_set(
    event_id: Uuid,
    requested: &[Uuid],
    found: &[Registration],
    already_paid: &[Uuid],
) -> Result<(), PaymentError> {
    let found_ids: HashSet<Uuid> = found.iter().map(|r| r.id).collect();

    let missing: Vec<String> = requested
        .iter()
        .filter(|id| !found_ids.contains(id))
        .map(|id| id.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(PaymentError::InvalidRegistrationSet(format!(
            "unknown registrations: {}",
            missing.join(", ")
        )));
    }

    let foreign: Vec<String> = found
        .iter()
        .filter(|r| r.event_id != event_id)
        .map(|r| r.id.to_string())
        .collect();
    if !foreign.is_empty() {
        return Err(PaymentError::InvalidRegistrationSet(format!(
            "registrations belong to a different event: {}",
            foreign.join(", ")
        )));
    }

    let cancelled: Vec<String> = found
        .iter()
        .filter(|r| r.status == "CANCELLED")
        .map(|r| r.id.to_string())
        .collect();
    if !cancelled.is_empty() {
        return Err(PaymentError::InvalidRegistrationSet(format!(
            "registrations are cancelled: {}",
            cancelled.join(", ")
        )));
    }

    if !already_paid.is_empty() {
        let paid: Vec<String> = already_paid.iter().map(|id| id.to_string()).collect();
        return Err(PaymentError::InvalidRegistrationSet(format!(
            "registrations already paid: {}",
            paid.join(", ")
        )));
    }

    Ok(())
}

fn validate_checkout(req: &InitiatePaymentRequest) -> Result<(), PaymentError> {
    if req.registration_ids.is_empty() {
        return Err(PaymentError::Validation(
            "registration_ids must not be empty".to_string(),
        ));
    }

    let unique: HashSet<Uuid> = req.registration_ids.iter().copied().collect();
    if unique.len() != req.registration_ids.len() {
        return Err(PaymentError::InvalidRegistrationSet(
            "duplicate registration ids in request".to_string(),
        ));
    }

    if req.payment_method == PaymentMethod::MobileMoney && req.payment_phone.is_none() {
        return Err(PaymentError::Validation(
            "payment_phone is required for mobile money".to_string(),
        ));
    }

    Ok(())
}

/// Creates and persists the payment aggregate. Status transitions after
/// creation belong to the settlement engine, never to the ledger.
#[derive(Clone)]
pub struct PaymentLedger {
    pub payments_repo: PaymentsRepo,
    pub events_repo: EventsRepo,
    pub registrations_repo: RegistrationsRepo,
    pub gateways_repo: GatewaysRepo,
}

impl PaymentLedger {
    pub async fn create_payment(
        &self,
        payer_id: Uuid,
        req: &InitiatePaymentRequest,
    ) -> Result<(Payment, GatewayRow), PaymentError> {
        validate_checkout(req)?;

        let event = self
            .events_repo
            .find(req.event_id)
            .await?
            .ok_or(PaymentError::NotFound("event"))?;

        let registrations = self.registrations_repo.find_many(&req.registration_ids).await?;
        let already_paid = self
            .payments_repo
            .already_paid_registrations(&req.registration_ids)
            .await?;
        validate_registration_set(event.id, &req.registration_ids, &registrations, &already_paid)?;

        let gateway = self
            .gateways_repo
            .find_by_slug(&req.payment_gateway)
            .await?
            .ok_or_else(|| {
                PaymentError::GatewayUnavailable(format!("unknown gateway '{}'", req.payment_gateway))
            })?;
        if !gateway.is_active {
            return Err(PaymentError::GatewayUnavailable(format!(
                "gateway '{}' is disabled",
                gateway.slug
            )));
        }
        if !gateway.supports_currency(&event.currency) {
            return Err(PaymentError::GatewayUnavailable(format!(
                "gateway '{}' does not support {}",
                gateway.slug, event.currency
            )));
        }

        let amount_cents = event.price_cents * req.registration_ids.len() as i64;
        let platform_fee_cents = platform_fee(amount_cents, gateway.platform_fee_bps());

        // References are unique by constraint, not by hope: collide, retry.
        for _ in 0..MAX_REFERENCE_ATTEMPTS {
            let payment_id = Uuid::new_v4();
            let payment = NewPayment {
                id: payment_id,
                reference: generate_reference("PAY"),
                event_id: event.id,
                payer_id,
                gateway_slug: gateway.slug.clone(),
                amount_cents,
                currency: event.currency.clone(),
                gateway_fee_cents: 0,
                platform_fee_cents,
                payment_method: req.payment_method,
                payment_phone: req.payment_phone.clone(),
            };
            let items: Vec<NewPaymentItem> = registrations
                .iter()
                .map(|reg| NewPaymentItem {
                    id: Uuid::new_v4(),
                    registration_id: reg.id,
                    description: format!("{} registration {}", event.name, reg.id),
                    amount_cents: event.price_cents,
                    quantity: 1,
                })
                .collect();

            match self.payments_repo.insert_with_items(&payment, &items).await {
                Ok(()) => {
                    let created = self
                        .payments_repo
                        .find_by_id(payment_id)
                        .await?
                        .ok_or_else(|| anyhow!("payment {payment_id} vanished after insert"))?;
                    tracing::info!(
                        payment = %created.reference,
                        event = %event.id,
                        amount_cents,
                        registrations = req.registration_ids.len(),
                        "payment created"
                    );
                    return Ok((created, gateway));
                }
                Err(e) if is_unique_violation(&e) => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Err(PaymentError::Internal(anyhow!(
            "could not allocate a unique payment reference"
        )))
    }
}
