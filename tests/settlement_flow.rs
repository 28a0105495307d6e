//! End-to-end settlement tests against a live PostgreSQL instance.
//!
//! Run with:
//!   DATABASE_URL=postgres://... cargo test --test settlement_flow -- --ignored

use event_payments::clock::system_clock;
use event_payments::domain::payment::{
    GatewayResponseStage, InitiatePaymentRequest, PaymentMethod, PaymentStatus,
};
use event_payments::error::PaymentError;
use event_payments::gateways::GatewayRegistry;
use event_payments::repo::events_repo::EventsRepo;
use event_payments::repo::gateways_repo::GatewaysRepo;
use event_payments::repo::payments_repo::PaymentsRepo;
use event_payments::repo::refunds_repo::RefundsRepo;
use event_payments::repo::registrations_repo::RegistrationsRepo;
use event_payments::repo::tickets_repo::TicketsRepo;
use event_payments::service::ledger::PaymentLedger;
use event_payments::service::settlement::{SettlementData, SettlementEngine};
use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

async fn test_pool() -> PgPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for this test");
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .expect("connect to test database");
    sqlx::migrate!("./migrations").run(&pool).await.expect("run migrations");
    pool
}

struct Fixture {
    ledger: PaymentLedger,
    engine: SettlementEngine,
    tickets_repo: TicketsRepo,
    registrations_repo: RegistrationsRepo,
    event_id: Uuid,
    gateway_slug: String,
    registration_ids: Vec<Uuid>,
}

async fn seed(pool: PgPool, price_cents: i64, registrations: usize) -> Fixture {
    let event_id = Uuid::new_v4();
    sqlx::query("INSERT INTO events (id, name, price_cents, currency) VALUES ($1, 'Launch Summit', $2, 'USD')")
        .bind(event_id)
        .bind(price_cents)
        .execute(&pool)
        .await
        .expect("seed event");

    let mut registration_ids = Vec::new();
    for _ in 0..registrations {
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO registrations (id, event_id, attendee_name) VALUES ($1, $2, 'Attendee')")
            .bind(id)
            .bind(event_id)
            .execute(&pool)
            .await
            .expect("seed registration");
        registration_ids.push(id);
    }

    let gateway_slug = format!("testpay-{}", Uuid::new_v4().simple());
    sqlx::query(
        r#"
        INSERT INTO payment_gateways (name, slug, adapter_type, is_active, supported_currencies, webhook_secret)
        VALUES ('Test Pay', $1, 'REDIRECT', true, $2, 'whsec_test')
        "#,
    )
    .bind(&gateway_slug)
    .bind(vec!["USD".to_string()])
    .execute(&pool)
    .await
    .expect("seed gateway");

    let payments_repo = PaymentsRepo { pool: pool.clone() };
    let registrations_repo = RegistrationsRepo { pool: pool.clone() };
    let tickets_repo = TicketsRepo { pool: pool.clone() };

    let ledger = PaymentLedger {
        payments_repo: payments_repo.clone(),
        events_repo: EventsRepo { pool: pool.clone() },
        registrations_repo: registrations_repo.clone(),
        gateways_repo: GatewaysRepo { pool: pool.clone() },
    };

    let engine = SettlementEngine {
        pool: pool.clone(),
        payments_repo,
        refunds_repo: RefundsRepo { pool: pool.clone() },
        registry: Arc::new(GatewayRegistry::empty()),
        clock: system_clock(),
    };

    Fixture {
        ledger,
        engine,
        tickets_repo,
        registrations_repo,
        event_id,
        gateway_slug,
        registration_ids,
    }
}

fn checkout_request(fx: &Fixture) -> InitiatePaymentRequest {
    InitiatePaymentRequest {
        event_id: fx.event_id,
        registration_ids: fx.registration_ids.clone(),
        payment_gateway: fx.gateway_slug.clone(),
        payment_method: PaymentMethod::Redirect,
        payment_phone: None,
        card_token: None,
        return_url: None,
        cancel_url: None,
    }
}

fn settlement_data(txn: &str) -> SettlementData {
    SettlementData {
        stage: GatewayResponseStage::Webhook,
        transaction_id: Some(txn.to_string()),
        raw: json!({"status": "success", "transaction_id": txn}),
    }
}

#[tokio::test]
#[ignore = "requires PostgreSQL; set DATABASE_URL and run with --ignored"]
async fn concurrent_mark_as_paid_settles_exactly_once() {
    let fx = seed(test_pool().await, 1000, 2).await;
    let payer = Uuid::new_v4();

    let (payment, _) = fx
        .ledger
        .create_payment(payer, &checkout_request(&fx))
        .await
        .expect("create payment");
    assert_eq!(payment.amount_cents, 2000);
    assert_eq!(payment.status, PaymentStatus::Pending);

    let (a, b) = tokio::join!(
        fx.engine.mark_as_paid(payment.id, settlement_data("txn_a")),
        fx.engine.mark_as_paid(payment.id, settlement_data("txn_b")),
    );
    a.expect("first settlement call succeeds");
    b.expect("second settlement call succeeds");

    let settled = fx
        .engine
        .payments_repo
        .find_by_id(payment.id)
        .await
        .expect("load payment")
        .expect("payment exists");
    assert_eq!(settled.status, PaymentStatus::Completed);
    assert!(settled.paid_at.is_some());

    // Exactly one ticket per registration, no duplicates from the race.
    let tickets = fx
        .tickets_repo
        .count_for_payment(payment.id)
        .await
        .expect("count tickets");
    assert_eq!(tickets, 2);

    let regs = fx
        .registrations_repo
        .find_many(&fx.registration_ids)
        .await
        .expect("load registrations");
    assert!(regs.iter().all(|r| r.status == "CONFIRMED"));

    // A later duplicate delivery is a no-op, not an error.
    fx.engine
        .mark_as_paid(payment.id, settlement_data("txn_c"))
        .await
        .expect("duplicate settlement is a no-op");
    let tickets_after = fx
        .tickets_repo
        .count_for_payment(payment.id)
        .await
        .expect("count tickets");
    assert_eq!(tickets_after, 2);
}

#[tokio::test]
#[ignore = "requires PostgreSQL; set DATABASE_URL and run with --ignored"]
async fn paid_registrations_cannot_be_charged_again() {
    let fx = seed(test_pool().await, 1000, 1).await;
    let payer = Uuid::new_v4();

    let (payment, _) = fx
        .ledger
        .create_payment(payer, &checkout_request(&fx))
        .await
        .expect("create payment");
    fx.engine
        .mark_as_paid(payment.id, settlement_data("txn_1"))
        .await
        .expect("settle payment");

    let err = fx
        .ledger
        .create_payment(payer, &checkout_request(&fx))
        .await
        .expect_err("second checkout over a paid registration must fail");
    assert!(matches!(err, PaymentError::InvalidRegistrationSet(_)));
}

#[tokio::test]
#[ignore = "requires PostgreSQL; set DATABASE_URL and run with --ignored"]
async fn amount_invariant_holds_after_creation() {
    let fx = seed(test_pool().await, 2500, 3).await;
    let payer = Uuid::new_v4();

    let (payment, _) = fx
        .ledger
        .create_payment(payer, &checkout_request(&fx))
        .await
        .expect("create payment");

    let items = fx
        .engine
        .payments_repo
        .items(payment.id)
        .await
        .expect("load items");
    let item_total: i64 = items.iter().map(|i| i.amount_cents * i.quantity as i64).sum();
    assert_eq!(payment.amount_cents, item_total);
    assert_eq!(payment.amount_cents, 7500);
}
