use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;
use event_payments::clock::system_clock;
use event_payments::config::AppConfig;
use event_payments::gateways::{GatewayProfile, GatewayRegistry};
use event_payments::repo::events_repo::EventsRepo;
use event_payments::repo::gateways_repo::GatewaysRepo;
use event_payments::repo::payments_repo::PaymentsRepo;
use event_payments::repo::refunds_repo::RefundsRepo;
use event_payments::repo::registrations_repo::RegistrationsRepo;
use event_payments::repo::webhook_log_repo::WebhookLogRepo;
use event_payments::service::ledger::PaymentLedger;
use event_payments::service::settlement::SettlementEngine;
use event_payments::service::webhook_ingest::WebhookIngest;
use event_payments::AppState;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cfg = AppConfig::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&cfg.database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    let payments_repo = PaymentsRepo { pool: pool.clone() };
    let events_repo = EventsRepo { pool: pool.clone() };
    let registrations_repo = RegistrationsRepo { pool: pool.clone() };
    let gateways_repo = GatewaysRepo { pool: pool.clone() };
    let refunds_repo = RefundsRepo { pool: pool.clone() };
    let webhook_log_repo = WebhookLogRepo { pool: pool.clone() };

    // Adapters are resolved once at startup, never reflectively per request.
    let profiles: Vec<GatewayProfile> = gateways_repo
        .list_active()
        .await?
        .iter()
        .map(|row| row.profile())
        .collect();
    let registry = Arc::new(GatewayRegistry::build(
        &profiles,
        reqwest::Client::new(),
        cfg.gateway_timeout_ms,
    ));
    tracing::info!(gateways = registry.len(), "gateway registry built");

    let clock = system_clock();

    let ledger = PaymentLedger {
        payments_repo: payments_repo.clone(),
        events_repo,
        registrations_repo,
        gateways_repo: gateways_repo.clone(),
    };

    let engine = SettlementEngine {
        pool: pool.clone(),
        payments_repo: payments_repo.clone(),
        refunds_repo,
        registry: registry.clone(),
        clock: clock.clone(),
    };

    let webhook_ingest = WebhookIngest {
        webhook_log_repo: webhook_log_repo.clone(),
        payments_repo: payments_repo.clone(),
        engine: engine.clone(),
        registry,
        clock,
    };

    let state = AppState {
        pool,
        ledger,
        engine,
        webhook_ingest,
        payments_repo,
        gateways_repo,
        webhook_log_repo,
    };

    let admin_key = cfg.internal_api_key.clone();
    let admin_routes = Router::new()
        .route(
            "/payments/:payment_id/refund",
            post(event_payments::http::handlers::payments::refund_payment),
        )
        .route(
            "/gateways",
            get(event_payments::http::handlers::gateways::list_gateways),
        )
        .route(
            "/webhooks/logs",
            get(event_payments::http::handlers::webhooks::list_webhook_logs),
        )
        .layer(from_fn_with_state(
            admin_key,
            event_payments::http::middleware::admin_auth::require_internal_api_key,
        ));

    let app = Router::new()
        .route("/health", get(event_payments::http::handlers::ops::health))
        .route(
            "/payments/initiate",
            post(event_payments::http::handlers::payments::initiate_payment),
        )
        .route(
            "/payments/:payment_id",
            get(event_payments::http::handlers::payments::get_payment),
        )
        .route(
            "/payments/:payment_id/status",
            get(event_payments::http::handlers::payments::get_payment_status),
        )
        .route(
            "/payments/:payment_id/verify",
            post(event_payments::http::handlers::payments::verify_payment),
        )
        .route(
            "/webhooks/:gateway_slug",
            post(event_payments::http::handlers::webhooks::receive_webhook),
        )
        .route("/ops/readiness", get(event_payments::http::handlers::ops::readiness))
        .route("/ops/liveness", get(event_payments::http::handlers::ops::liveness))
        .merge(admin_routes)
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    tracing::info!("listening on {}", cfg.bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
