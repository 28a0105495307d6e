use chrono::Utc;
use event_payments::error::PaymentError;
use event_payments::gateways::card::CardGateway;
use event_payments::gateways::redirect::RedirectGateway;
use event_payments::gateways::signature::timestamped_hmac_hex;
use event_payments::gateways::{GatewayAdapter, GatewayPaymentStatus};
use serde_json::json;

const WEBHOOK_SECRET: &str = "whsec_test_secret";

fn redirect_gateway() -> RedirectGateway {
    RedirectGateway {
        slug: "hostedpay".to_string(),
        base_url: "http://localhost:9".to_string(),
        secret_key: "sk_test".to_string(),
        webhook_secret: WEBHOOK_SECRET.to_string(),
        timeout_ms: 1000,
        client: reqwest::Client::new(),
    }
}

fn card_gateway() -> CardGateway {
    CardGateway {
        slug: "cardpay".to_string(),
        base_url: "http://localhost:9".to_string(),
        secret_key: "sk_test".to_string(),
        webhook_secret: WEBHOOK_SECRET.to_string(),
        timeout_ms: 1000,
        client: reqwest::Client::new(),
    }
}

fn signed_header(body: &[u8]) -> String {
    let ts = Utc::now().timestamp();
    format!("t={},v1={}", ts, timestamped_hmac_hex(body, WEBHOOK_SECRET, ts))
}

#[test]
fn redirect_webhook_maps_completed_event() {
    let body = serde_json::to_vec(&json!({
        "event": "checkout.completed",
        "data": {"reference": "PAY-ABC123", "transaction_id": "txn_42", "amount": 2000}
    }))
    .unwrap();
    let header = signed_header(&body);

    let event = redirect_gateway()
        .handle_webhook(&body, Some(&header), Utc::now())
        .unwrap();
    assert_eq!(event.payment_reference, "PAY-ABC123");
    assert_eq!(event.status, GatewayPaymentStatus::Completed);
    assert_eq!(event.transaction_id.as_deref(), Some("txn_42"));
}

#[test]
fn redirect_webhook_maps_failed_and_cancelled_events() {
    for (name, expected) in [
        ("checkout.failed", GatewayPaymentStatus::Failed),
        ("checkout.cancelled", GatewayPaymentStatus::Cancelled),
        ("checkout.updated", GatewayPaymentStatus::Processing),
    ] {
        let body = serde_json::to_vec(&json!({
            "event": name,
            "data": {"reference": "PAY-ABC123"}
        }))
        .unwrap();
        let header = signed_header(&body);
        let event = redirect_gateway()
            .handle_webhook(&body, Some(&header), Utc::now())
            .unwrap();
        assert_eq!(event.status, expected, "event {name}");
    }
}

#[test]
fn redirect_webhook_rejects_tampered_body() {
    let body = serde_json::to_vec(&json!({
        "event": "checkout.completed",
        "data": {"reference": "PAY-ABC123"}
    }))
    .unwrap();
    let header = signed_header(&body);

    let tampered = serde_json::to_vec(&json!({
        "event": "checkout.completed",
        "data": {"reference": "PAY-OTHER"}
    }))
    .unwrap();

    let err = redirect_gateway()
        .handle_webhook(&tampered, Some(&header), Utc::now())
        .unwrap_err();
    assert!(matches!(err, PaymentError::InvalidSignature));
}

#[test]
fn redirect_webhook_rejects_missing_signature() {
    let body = serde_json::to_vec(&json!({
        "event": "checkout.completed",
        "data": {"reference": "PAY-ABC123"}
    }))
    .unwrap();

    let err = redirect_gateway()
        .handle_webhook(&body, None, Utc::now())
        .unwrap_err();
    assert!(matches!(err, PaymentError::InvalidSignature));
}

#[test]
fn redirect_webhook_requires_a_payment_reference() {
    let body = serde_json::to_vec(&json!({
        "event": "checkout.completed",
        "data": {"transaction_id": "txn_42"}
    }))
    .unwrap();
    let header = signed_header(&body);

    let err = redirect_gateway()
        .handle_webhook(&body, Some(&header), Utc::now())
        .unwrap_err();
    assert!(matches!(err, PaymentError::Validation(_)));
}

#[test]
fn card_webhook_maps_charge_events() {
    for (name, expected) in [
        ("charge.succeeded", GatewayPaymentStatus::Completed),
        ("charge.failed", GatewayPaymentStatus::Failed),
        ("charge.canceled", GatewayPaymentStatus::Cancelled),
    ] {
        let body = serde_json::to_vec(&json!({
            "type": name,
            "data": {"reference": "PAY-CARD01", "id": "ch_7"}
        }))
        .unwrap();
        let header = signed_header(&body);
        let event = card_gateway()
            .handle_webhook(&body, Some(&header), Utc::now())
            .unwrap();
        assert_eq!(event.status, expected, "event {name}");
        assert_eq!(event.transaction_id.as_deref(), Some("ch_7"));
    }
}

#[test]
fn card_webhook_rejects_replayed_signature() {
    let body = serde_json::to_vec(&json!({
        "type": "charge.succeeded",
        "data": {"reference": "PAY-CARD01", "id": "ch_7"}
    }))
    .unwrap();
    // Signed ten minutes ago, outside the replay window.
    let stale = Utc::now().timestamp() - 600;
    let header = format!("t={},v1={}", stale, timestamped_hmac_hex(&body, WEBHOOK_SECRET, stale));

    let err = card_gateway()
        .handle_webhook(&body, Some(&header), Utc::now())
        .unwrap_err();
    assert!(matches!(err, PaymentError::InvalidSignature));
}
